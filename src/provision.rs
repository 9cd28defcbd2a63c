use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::archive;
use crate::locator::BinaryDescriptor;
use crate::platform::Os;
use crate::state::{ProvisionRecord, add_provision_record};

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("creating install directory {}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("creating temporary download directory")]
    TempDir {
        #[source]
        source: io::Error,
    },
    #[error("failed to download {url}: {reason}")]
    DownloadFailed { url: String, reason: String },
    #[error("failed to extract {archive}: {reason}")]
    ExtractionFailed { archive: String, reason: String },
    #[error("binary '{binary}' not found in downloaded archive. Searched in: {}", .searched.display())]
    BinaryNotFoundInArchive { binary: String, searched: PathBuf },
    #[error("installing binary to {}", .path.display())]
    Install {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Transfers a release archive to a local file.
pub trait Fetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<(), ProvisionError>;
}

/// Blocking HTTP download. Redirects are followed, which release hosts rely on.
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    /// `None` disables the timeout entirely.
    pub fn new(timeout: Option<Duration>) -> reqwest::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<(), ProvisionError> {
        let failed = |reason: String| ProvisionError::DownloadFailed {
            url: url.to_string(),
            reason,
        };

        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|err| failed(format!("{:#}", anyhow::Error::new(err))))?;

        if !response.status().is_success() {
            return Err(failed(format!("server responded with {}", response.status())));
        }

        let mut file = File::create(dest)
            .map_err(|err| failed(format!("creating {}: {err}", dest.display())))?;
        let bytes = response
            .copy_to(&mut file)
            .map_err(|err| failed(format!("{:#}", anyhow::Error::new(err))))?;

        debug!(url, bytes, "download complete");
        Ok(())
    }
}

/// The published archive for one descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseArchive {
    pub file_name: String,
    pub url: String,
}

impl ReleaseArchive {
    pub fn for_descriptor(descriptor: &BinaryDescriptor, release_base_url: &str) -> Self {
        let file_name = format!(
            "{}_{}_{}_{}.tar.gz",
            descriptor.name,
            descriptor.version,
            descriptor.platform.os.as_str(),
            descriptor.platform.arch.as_str()
        );
        let url = format!(
            "{}/releases/download/v{}/{}",
            release_base_url.trim_end_matches('/'),
            descriptor.version,
            file_name
        );
        Self { file_name, url }
    }
}

type MarkExecutable = Box<dyn Fn(&Path) -> io::Result<()>>;

pub struct Provisioner<F = HttpFetcher> {
    fetcher: F,
    release_base_url: String,
    temp_root: Option<PathBuf>,
    ledger: Option<PathBuf>,
    mark_executable: MarkExecutable,
}

impl<F: Fetcher> Provisioner<F> {
    pub fn new(fetcher: F, release_base_url: impl Into<String>) -> Self {
        Self {
            fetcher,
            release_base_url: release_base_url.into(),
            temp_root: None,
            ledger: None,
            mark_executable: Box::new(mark_executable),
        }
    }

    /// Parent for per-download temp directories. Defaults to the system temp dir.
    pub fn with_temp_root(mut self, root: PathBuf) -> Self {
        self.temp_root = Some(root);
        self
    }

    /// Append a [`ProvisionRecord`] to this file after each download.
    pub fn with_ledger(mut self, path: PathBuf) -> Self {
        self.ledger = Some(path);
        self
    }

    pub fn with_mark_executable<M>(mut self, mark: M) -> Self
    where
        M: Fn(&Path) -> io::Result<()> + 'static,
    {
        self.mark_executable = Box::new(mark);
        self
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn release_for(&self, descriptor: &BinaryDescriptor) -> ReleaseArchive {
        ReleaseArchive::for_descriptor(descriptor, &self.release_base_url)
    }

    /// Make sure an executable binary exists at `descriptor.local_path`.
    ///
    /// An existing file that can be marked executable is returned as is,
    /// without touching the network. Anything else triggers a download.
    pub fn ensure(&self, descriptor: &BinaryDescriptor) -> Result<PathBuf, ProvisionError> {
        let install_dir = descriptor.install_dir();
        fs::create_dir_all(install_dir).map_err(|source| ProvisionError::CreateDir {
            path: install_dir.to_path_buf(),
            source,
        })?;

        if descriptor.local_path.is_file() {
            match (self.mark_executable)(descriptor.local_path.as_path()) {
                Ok(()) => {
                    debug!(path = %descriptor.local_path.display(), "binary already provisioned");
                    return Ok(descriptor.local_path.clone());
                }
                Err(err) => warn!(
                    "Binary at {} exists but may be corrupted ({err}), re-downloading...",
                    descriptor.local_path.display()
                ),
            }
        }

        let release = self.release_for(descriptor);
        info!(
            "Downloading {} v{} for {}...",
            descriptor.name, descriptor.version, descriptor.platform
        );
        info!("URL: {}", release.url);

        // Dropping `temp` on an early return removes it best-effort.
        let temp = self.temp_dir(descriptor)?;
        let archive_path = temp.path().join(&release.file_name);
        self.fetcher.fetch(&release.url, &archive_path)?;

        let zip_fallback = descriptor.platform.os == Os::Windows;
        archive::extract(&archive_path, temp.path(), zip_fallback).map_err(|err| {
            ProvisionError::ExtractionFailed {
                archive: release.file_name.clone(),
                reason: format!("{err:#}"),
            }
        })?;

        let binary = descriptor.file_name();
        let found = archive::find_binary(temp.path(), &binary)
            .map_err(|err| ProvisionError::ExtractionFailed {
                archive: release.file_name.clone(),
                reason: format!("reading extracted files: {err}"),
            })?
            .ok_or_else(|| ProvisionError::BinaryNotFoundInArchive {
                binary: binary.clone(),
                searched: temp.path().to_path_buf(),
            })?;

        self.install(&found, &descriptor.local_path)?;

        let temp_path = temp.path().to_path_buf();
        if let Err(err) = temp.close() {
            warn!("could not remove temporary directory {}: {err}", temp_path.display());
        }

        self.record(descriptor);
        info!(
            "Successfully downloaded {} v{}",
            descriptor.name, descriptor.version
        );
        Ok(descriptor.local_path.clone())
    }

    fn temp_dir(&self, descriptor: &BinaryDescriptor) -> Result<TempDir, ProvisionError> {
        let prefix = format!("{}-{}-", descriptor.name, Utc::now().timestamp_millis());
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);

        let created = match &self.temp_root {
            Some(root) => fs::create_dir_all(root).and_then(|()| builder.tempdir_in(root)),
            None => builder.tempdir(),
        };
        created.map_err(|source| ProvisionError::TempDir { source })
    }

    /// Copy into a staging file beside `target`, then rename it into place so
    /// `target` is never observed half written.
    fn install(&self, source: &Path, target: &Path) -> Result<(), ProvisionError> {
        let install_err = |source: io::Error| ProvisionError::Install {
            path: target.to_path_buf(),
            source,
        };

        let file_name = target
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let staging = target.with_file_name(format!(".{file_name}.{}.partial", std::process::id()));

        if let Err(err) = fs::copy(source, &staging).and_then(|_| fs::rename(&staging, target)) {
            let _ = fs::remove_file(&staging);
            return Err(install_err(err));
        }

        (self.mark_executable)(target).map_err(install_err)
    }

    fn record(&self, descriptor: &BinaryDescriptor) {
        let Some(ledger) = &self.ledger else {
            return;
        };

        let result = ProvisionRecord::for_installed(descriptor)
            .and_then(|record| add_provision_record(ledger, record));
        if let Err(err) = result {
            warn!("could not update provision ledger {}: {err:#}", ledger.display());
        }
    }
}

/// Set mode 0755. Only checks the file is reachable on non-Unix hosts.
pub fn mark_executable(path: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))
    }

    #[cfg(not(unix))]
    {
        fs::metadata(path).map(|_| ())
    }
}
