use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
    Linux,
    Darwin,
    Windows,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    Amd64,
    Arm64,
}

/// Canonical `(os, arch)` pair used for every path and URL the launcher builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlatformKey {
    pub os: Os,
    pub arch: Arch,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlatformError {
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),
    #[error("unsupported architecture: {0}")]
    UnsupportedArchitecture(String),
}

impl Os {
    pub fn as_str(self) -> &'static str {
        match self {
            Os::Linux => "linux",
            Os::Darwin => "darwin",
            Os::Windows => "windows",
        }
    }

    pub fn executable_extension(self) -> &'static str {
        match self {
            Os::Windows => ".exe",
            Os::Linux | Os::Darwin => "",
        }
    }
}

impl Arch {
    pub fn as_str(self) -> &'static str {
        match self {
            Arch::Amd64 => "amd64",
            Arch::Arm64 => "arm64",
        }
    }
}

impl PlatformKey {
    /// Resolve the platform of the running process.
    pub fn current() -> Result<Self, PlatformError> {
        Self::from_host(std::env::consts::OS, std::env::consts::ARCH)
    }

    /// Map raw host identifiers to a canonical key. The OS is checked first.
    pub fn from_host(os: &str, arch: &str) -> Result<Self, PlatformError> {
        let os = normalize_os(os)?;
        let arch = normalize_arch(arch)?;
        Ok(Self { os, arch })
    }
}

impl fmt::Display for PlatformKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.os.as_str(), self.arch.as_str())
    }
}

fn normalize_os(raw: &str) -> Result<Os, PlatformError> {
    match raw {
        "linux" => Ok(Os::Linux),
        "macos" | "darwin" => Ok(Os::Darwin),
        "windows" | "win32" => Ok(Os::Windows),
        other => Err(PlatformError::UnsupportedPlatform(other.to_string())),
    }
}

fn normalize_arch(raw: &str) -> Result<Arch, PlatformError> {
    match raw {
        "x86_64" | "x86-64" | "x64" | "amd64" => Ok(Arch::Amd64),
        "aarch64" | "arm64" => Ok(Arch::Arm64),
        other => Err(PlatformError::UnsupportedArchitecture(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::{Arch, Os, PlatformError, PlatformKey};

    #[test]
    fn maps_supported_hosts_to_canonical_keys() {
        let cases = [
            ("linux", "x86_64", Os::Linux, Arch::Amd64),
            ("linux", "aarch64", Os::Linux, Arch::Arm64),
            ("macos", "aarch64", Os::Darwin, Arch::Arm64),
            ("darwin", "x64", Os::Darwin, Arch::Amd64),
            ("windows", "x86-64", Os::Windows, Arch::Amd64),
            ("win32", "arm64", Os::Windows, Arch::Arm64),
        ];

        for (os, arch, want_os, want_arch) in cases {
            let key = PlatformKey::from_host(os, arch).expect("supported host");
            assert_eq!(key.os, want_os, "{os}/{arch}");
            assert_eq!(key.arch, want_arch, "{os}/{arch}");
        }
    }

    #[test]
    fn rejects_unknown_operating_system() {
        let err = PlatformKey::from_host("freebsd", "x86_64").unwrap_err();
        assert_eq!(err, PlatformError::UnsupportedPlatform("freebsd".into()));
    }

    #[test]
    fn rejects_unknown_architecture_with_raw_value() {
        let err = PlatformKey::from_host("linux", "mips").unwrap_err();
        assert_eq!(err, PlatformError::UnsupportedArchitecture("mips".into()));
        assert!(err.to_string().contains("mips"));
    }

    #[test]
    fn displays_as_directory_name() {
        let key = PlatformKey::from_host("linux", "x86_64").unwrap();
        assert_eq!(key.to_string(), "linux-amd64");
        assert_eq!(Os::Windows.executable_extension(), ".exe");
        assert_eq!(Os::Darwin.executable_extension(), "");
    }
}
