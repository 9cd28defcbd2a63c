pub mod archive;
pub mod cli;
pub mod config;
pub mod launch;
pub mod locator;
pub mod platform;
pub mod provision;
pub mod state;

#[cfg(test)]
mod test_support;

/// Run the launcher and return the exit code to finish with.
pub fn run_cli() -> i32 {
    cli::run()
}

/// Provision the binary without running it and return an exit code.
pub fn run_setup() -> i32 {
    cli::run_setup()
}
