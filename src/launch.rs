use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

use thiserror::Error;
use tracing::{debug, warn};

use crate::locator::BinaryDescriptor;
use crate::provision::{Fetcher, HttpFetcher, ProvisionError, Provisioner};

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error(transparent)]
    Provision(#[from] ProvisionError),
    #[error("{} not found when spawning (binary or its interpreter)", .path.display())]
    SpawnMissing { path: PathBuf },
    #[error("failed to execute {}", .path.display())]
    SpawnFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// How a child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildOutcome {
    Exited(i32),
    Signaled(Option<i32>),
}

impl ChildOutcome {
    /// Exit code the launcher should finish with.
    ///
    /// A signal maps to `128 + signal` like a shell would report it, so a
    /// killed child never looks like a success.
    pub fn exit_code(self) -> i32 {
        match self {
            ChildOutcome::Exited(code) => code,
            ChildOutcome::Signaled(Some(signal)) => 128 + signal,
            ChildOutcome::Signaled(None) => 1,
        }
    }
}

impl From<ExitStatus> for ChildOutcome {
    fn from(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return ChildOutcome::Exited(code);
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            ChildOutcome::Signaled(status.signal())
        }

        #[cfg(not(unix))]
        {
            ChildOutcome::Signaled(None)
        }
    }
}

/// Runs a program to completion.
pub trait Spawner {
    fn run(&self, program: &Path, args: &[OsString]) -> io::Result<ChildOutcome>;
}

/// Spawns directly (no shell) with the parent's stdin, stdout and stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessSpawner;

impl Spawner for ProcessSpawner {
    fn run(&self, program: &Path, args: &[OsString]) -> io::Result<ChildOutcome> {
        let status = Command::new(program)
            .args(args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()?;
        Ok(status.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    Initial,
    Retried,
}

pub struct Launcher<F = HttpFetcher, S = ProcessSpawner> {
    descriptor: BinaryDescriptor,
    provisioner: Provisioner<F>,
    spawner: S,
}

impl<F: Fetcher, S: Spawner> Launcher<F, S> {
    pub fn new(descriptor: BinaryDescriptor, provisioner: Provisioner<F>, spawner: S) -> Self {
        Self {
            descriptor,
            provisioner,
            spawner,
        }
    }

    pub fn descriptor(&self) -> &BinaryDescriptor {
        &self.descriptor
    }

    pub fn provisioner(&self) -> &Provisioner<F> {
        &self.provisioner
    }

    /// Provision if needed, run the binary with `args` and return its exit code.
    ///
    /// The binary is spawned at most twice: a "not found" on the first
    /// attempt re-provisions once, a second one is fatal.
    pub fn run(&self, args: &[OsString]) -> Result<i32, LaunchError> {
        let mut program = self.descriptor.local_path.clone();
        if !program.is_file() {
            program = self.provisioner.ensure(&self.descriptor)?;
        }

        for attempt in [Attempt::Initial, Attempt::Retried] {
            match self.spawner.run(&program, args) {
                Ok(outcome) => {
                    if let ChildOutcome::Signaled(signal) = outcome {
                        warn!("{} terminated by signal {signal:?}", program.display());
                    }
                    debug!(?outcome, "child finished");
                    return Ok(outcome.exit_code());
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    if attempt == Attempt::Initial {
                        warn!("Binary not found: {}", program.display());
                        warn!("Attempting to download...");
                        program = self.provisioner.ensure(&self.descriptor)?;
                    }
                }
                Err(source) => {
                    return Err(LaunchError::SpawnFailed {
                        path: program,
                        source,
                    });
                }
            }
        }

        Err(LaunchError::SpawnMissing { path: program })
    }
}
