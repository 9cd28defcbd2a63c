use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_BINARY_NAME: &str = "doplan";
pub const DEFAULT_RELEASE_BASE_URL: &str = "https://github.com/DoPlan-dev/CLI";

pub const CONFIG_PATH_ENV: &str = "DOPLAN_LAUNCHER_CONFIG";
pub const VERSION_ENV: &str = "DOPLAN_LAUNCHER_VERSION";
pub const INSTALL_ROOT_ENV: &str = "DOPLAN_LAUNCHER_INSTALL_ROOT";
pub const RELEASE_URL_ENV: &str = "DOPLAN_LAUNCHER_RELEASE_URL";

const APP_DIR: &str = "doplan-launcher";

/// Everything the launcher needs to know about the binary it delegates to.
///
/// The version is carried here rather than read from a global so the core
/// can be driven with any release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherConfig {
    pub binary_name: String,
    pub version: String,
    pub release_base_url: String,
    pub install_root: Option<PathBuf>,
    pub temp_root: Option<PathBuf>,
    pub download_timeout_secs: Option<u64>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config missing required field: {0}")]
    MissingField(String),
    #[error("binary name must be a bare file name, found '{0}'")]
    InvalidBinaryName(String),
    #[error("version '{version}' is not a valid release version: {source}")]
    InvalidVersion {
        version: String,
        #[source]
        source: semver::Error,
    },
    #[error("release URL '{0}' must be an absolute http(s) URL")]
    InvalidReleaseUrl(String),
    #[error("download timeout must be greater than zero")]
    ZeroTimeout,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            binary_name: DEFAULT_BINARY_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            release_base_url: DEFAULT_RELEASE_BASE_URL.to_string(),
            install_root: None,
            temp_root: None,
            download_timeout_secs: None,
        }
    }
}

impl LauncherConfig {
    /// Defaults, then the optional config file, then environment overrides.
    pub fn load() -> anyhow::Result<Self> {
        let config = match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) => Self::load_file(Path::new(&path))?,
            None => match default_config_path() {
                Some(path) if path.is_file() => Self::load_file(&path)?,
                _ => Self::default(),
            },
        };

        config
            .with_overrides(|key| std::env::var(key).ok())
            .validate()
            .context("validating launcher configuration")
    }

    pub fn load_file(path: &Path) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading launcher config at {}", path.display()))?;
        let config: LauncherConfig = serde_json::from_str(&data)
            .with_context(|| format!("parsing launcher config at {}", path.display()))?;
        Ok(config)
    }

    /// Apply `DOPLAN_LAUNCHER_*` overrides. Blank values are ignored.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(version) = lookup(VERSION_ENV) {
            self.version = version;
        }
        if let Some(root) = lookup(INSTALL_ROOT_ENV) {
            self.install_root = Some(PathBuf::from(root));
        }
        if let Some(url) = lookup(RELEASE_URL_ENV) {
            self.release_base_url = url;
        }
        self
    }

    /// Normalize and check the config. A leading `v` on the version is dropped
    /// since the release tag adds its own.
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        self.binary_name = self.binary_name.trim().to_string();
        if self.binary_name.is_empty() {
            return Err(ConfigError::MissingField("binary_name".to_string()));
        }
        if self.binary_name.contains(['/', '\\']) || self.binary_name == ".." {
            return Err(ConfigError::InvalidBinaryName(self.binary_name));
        }

        let version = self.version.trim();
        if version.is_empty() {
            return Err(ConfigError::MissingField("version".to_string()));
        }
        let version = version.strip_prefix('v').unwrap_or(version).to_string();
        if let Err(source) = semver::Version::parse(&version) {
            return Err(ConfigError::InvalidVersion { version, source });
        }
        self.version = version;

        self.release_base_url = self.release_base_url.trim().trim_end_matches('/').to_string();
        match reqwest::Url::parse(&self.release_base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            _ => return Err(ConfigError::InvalidReleaseUrl(self.release_base_url)),
        }

        if self.download_timeout_secs == Some(0) {
            return Err(ConfigError::ZeroTimeout);
        }

        Ok(self)
    }

    /// Absolute install root; relative roots are taken from the current directory.
    pub fn install_root(&self) -> anyhow::Result<PathBuf> {
        let root = match &self.install_root {
            Some(root) => root.clone(),
            None => dirs::data_dir()
                .ok_or_else(|| anyhow!("could not determine platform data directory"))?
                .join(APP_DIR)
                .join("bin"),
        };
        resolve_root(&root)
    }

    /// Where users can fetch the binary by hand when provisioning fails.
    pub fn releases_page(&self) -> String {
        format!("{}/releases", self.release_base_url.trim_end_matches('/'))
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.json"))
}

fn resolve_root(root: &Path) -> anyhow::Result<PathBuf> {
    if root.is_absolute() {
        return Ok(root.to_path_buf());
    }

    let cwd = std::env::current_dir().context("resolving install root")?;
    Ok(cwd.join(root))
}
