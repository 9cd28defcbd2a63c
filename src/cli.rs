use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::LauncherConfig;
use crate::launch::{Launcher, ProcessSpawner};
use crate::locator::BinaryDescriptor;
use crate::platform::PlatformKey;
use crate::provision::{HttpFetcher, Provisioner};
use crate::state::state_file_path;

/// Filter for launcher diagnostics, in `EnvFilter` syntax.
pub const LOG_ENV: &str = "DOPLAN_LAUNCHER_LOG";

#[derive(Debug, Parser)]
#[command(
    name = "doplan-setup",
    version,
    about = "Download the platform-specific doplan binary ahead of first use"
)]
pub struct SetupCli {
    /// Exit with a failure status when the binary cannot be provisioned
    #[arg(long)]
    strict: bool,
}

/// Launcher entry point: provision, delegate, return the child's exit code.
///
/// Arguments are taken straight from the OS and forwarded untouched; running
/// them through an argument parser would swallow things like `--`.
pub fn run() -> i32 {
    init_logging();
    let args: Vec<OsString> = std::env::args_os().skip(1).collect();

    let config = match LauncherConfig::load() {
        Ok(config) => config,
        Err(err) => {
            report(&err, &LauncherConfig::default().releases_page());
            return 1;
        }
    };

    match launch(&config, std::env::consts::OS, std::env::consts::ARCH, &args) {
        Ok(code) => code,
        Err(err) => {
            report(&err, &config.releases_page());
            1
        }
    }
}

/// Setup entry point, run after a package install.
///
/// Failures only warn unless `--strict` is given, so an offline install
/// still succeeds and the launcher retries on first use.
pub fn run_setup() -> i32 {
    let cli = SetupCli::parse();
    init_logging();

    info!("Setting up platform-specific binary...");
    let (result, releases_page) = match LauncherConfig::load() {
        Ok(config) => (
            setup(&config, std::env::consts::OS, std::env::consts::ARCH),
            config.releases_page(),
        ),
        Err(err) => (Err(err), LauncherConfig::default().releases_page()),
    };

    match result {
        Ok(path) => {
            info!("Installation complete: {}", path.display());
            0
        }
        Err(err) if cli.strict => {
            report(&err, &releases_page);
            1
        }
        Err(err) => {
            warn!("Installation warning: {err:#}");
            warn!("You may need to download the binary manually from: {releases_page}");
            0
        }
    }
}

fn launch(config: &LauncherConfig, os: &str, arch: &str, args: &[OsString]) -> anyhow::Result<i32> {
    let launcher = launcher_for_host(config, os, arch)?;
    Ok(launcher.run(args)?)
}

fn setup(config: &LauncherConfig, os: &str, arch: &str) -> anyhow::Result<PathBuf> {
    let launcher = launcher_for_host(config, os, arch)?;
    let path = launcher.provisioner().ensure(launcher.descriptor())?;
    Ok(path)
}

/// Wire the production launcher for a host. Fails before any filesystem or
/// network access when the host is unsupported.
pub fn launcher_for_host(
    config: &LauncherConfig,
    os: &str,
    arch: &str,
) -> anyhow::Result<Launcher<HttpFetcher, ProcessSpawner>> {
    let platform = PlatformKey::from_host(os, arch)?;
    let install_root = config.install_root()?;
    let descriptor =
        BinaryDescriptor::locate(platform, &config.binary_name, &config.version, &install_root);
    let provisioner = build_provisioner(config, &install_root)?;
    Ok(Launcher::new(descriptor, provisioner, ProcessSpawner))
}

fn build_provisioner(config: &LauncherConfig, install_root: &Path) -> anyhow::Result<Provisioner> {
    let timeout = config.download_timeout_secs.map(Duration::from_secs);
    let fetcher = HttpFetcher::new(timeout).context("building HTTP client")?;

    let mut provisioner = Provisioner::new(fetcher, config.release_base_url.as_str())
        .with_ledger(state_file_path(install_root));
    if let Some(temp_root) = &config.temp_root {
        provisioner = provisioner.with_temp_root(temp_root.clone());
    }
    Ok(provisioner)
}

fn report(err: &anyhow::Error, releases_page: &str) {
    eprintln!("error: {err:#}");
    eprintln!();
    eprintln!("Please install manually from: {releases_page}");
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .try_init();
}
