use std::path::{Path, PathBuf};

use crate::platform::PlatformKey;

/// Where the binary for one platform and version is expected to live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryDescriptor {
    pub name: String,
    pub version: String,
    pub platform: PlatformKey,
    pub local_path: PathBuf,
    pub extension: &'static str,
}

impl BinaryDescriptor {
    /// Derive the descriptor without touching the filesystem.
    ///
    /// The layout is `{install_root}/{os}-{arch}/{name}{extension}`.
    pub fn locate(platform: PlatformKey, name: &str, version: &str, install_root: &Path) -> Self {
        let extension = platform.os.executable_extension();
        let local_path = install_root
            .join(platform.to_string())
            .join(format!("{name}{extension}"));

        Self {
            name: name.to_string(),
            version: version.to_string(),
            platform,
            local_path,
            extension,
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}{}", self.name, self.extension)
    }

    pub fn install_dir(&self) -> &Path {
        self.local_path.parent().unwrap_or_else(|| Path::new("."))
    }
}

#[cfg(test)]
mod tests {
    use super::BinaryDescriptor;
    use crate::platform::PlatformKey;
    use std::path::Path;

    #[test]
    fn places_binary_in_platform_directory() {
        let platform = PlatformKey::from_host("linux", "x86_64").unwrap();
        let desc = BinaryDescriptor::locate(platform, "doplan", "1.2.0", Path::new("/opt/doplan"));

        assert_eq!(desc.local_path, Path::new("/opt/doplan/linux-amd64/doplan"));
        assert_eq!(desc.install_dir(), Path::new("/opt/doplan/linux-amd64"));
        assert_eq!(desc.extension, "");
    }

    #[test]
    fn windows_binaries_get_exe_suffix() {
        let platform = PlatformKey::from_host("windows", "x86_64").unwrap();
        let desc = BinaryDescriptor::locate(platform, "doplan", "1.2.0", Path::new("/opt/doplan"));

        assert_eq!(desc.file_name(), "doplan.exe");
        assert!(desc.local_path.ends_with("windows-amd64/doplan.exe"));
    }

    #[test]
    fn locate_is_deterministic() {
        let platform = PlatformKey::from_host("darwin", "arm64").unwrap();
        let root = Path::new("/srv/bin");
        let a = BinaryDescriptor::locate(platform, "doplan", "2.0.1", root);
        let b = BinaryDescriptor::locate(platform, "doplan", "2.0.1", root);
        assert_eq!(a, b);
    }
}
