use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::locator::BinaryDescriptor;

/// Oldest records are dropped past this many.
const MAX_RECORDS: usize = 50;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ProvisionRecord {
    pub binary_name: String,
    pub version: String,
    pub platform: String,
    pub path: PathBuf,
    pub sha256: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct State {
    #[serde(default)]
    pub provisions: Vec<ProvisionRecord>,
}

impl ProvisionRecord {
    /// Describe the binary currently installed for `descriptor`.
    pub fn for_installed(descriptor: &BinaryDescriptor) -> anyhow::Result<Self> {
        Ok(Self {
            binary_name: descriptor.name.clone(),
            version: descriptor.version.clone(),
            platform: descriptor.platform.to_string(),
            path: descriptor.local_path.clone(),
            sha256: sha256_file(&descriptor.local_path)?,
            timestamp: Utc::now(),
        })
    }
}

pub fn state_file_path(install_root: &Path) -> PathBuf {
    install_root.join("state.json")
}

pub fn load_state(path: &Path) -> anyhow::Result<State> {
    if !path.exists() {
        return Ok(State::default());
    }

    let data = fs::read_to_string(path)
        .with_context(|| format!("reading state file at {}", path.display()))?;
    let state: State = serde_json::from_str(&data)
        .with_context(|| format!("parsing state file at {}", path.display()))?;
    Ok(state)
}

pub fn save_state(path: &Path, state: &State) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating state directory {}", parent.display()))?;
    }

    let tmp_path = path.with_extension(format!("{}.tmp", std::process::id()));
    let data = serde_json::to_string_pretty(state)?;
    fs::write(&tmp_path, data)
        .with_context(|| format!("writing temp state file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .with_context(|| format!("committing state file to {}", path.display()))?;
    Ok(())
}

pub fn add_provision_record(path: &Path, record: ProvisionRecord) -> anyhow::Result<()> {
    let mut state = load_state(path)?;
    state.provisions.push(record);
    if state.provisions.len() > MAX_RECORDS {
        let excess = state.provisions.len() - MAX_RECORDS;
        state.provisions.drain(..excess);
    }
    save_state(path, &state)
}

pub fn sha256_file(path: &Path) -> anyhow::Result<String> {
    let mut file =
        File::open(path).with_context(|| format!("opening {} for hashing", path.display()))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).with_context(|| format!("hashing {}", path.display()))?;
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::{
        MAX_RECORDS, ProvisionRecord, add_provision_record, load_state, sha256_file,
        state_file_path,
    };
    use crate::locator::BinaryDescriptor;
    use crate::platform::PlatformKey;

    fn installed(dir: &std::path::Path) -> BinaryDescriptor {
        let platform = PlatformKey::from_host("linux", "x86_64").unwrap();
        let desc = BinaryDescriptor::locate(platform, "doplan", "1.2.0", dir);
        std::fs::create_dir_all(desc.install_dir()).unwrap();
        std::fs::write(&desc.local_path, b"abc").unwrap();
        desc
    }

    #[test]
    fn missing_state_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let state = load_state(&state_file_path(dir.path())).unwrap();
        assert!(state.provisions.is_empty());
    }

    #[test]
    fn records_are_appended_with_digest() {
        let dir = tempfile::tempdir().unwrap();
        let desc = installed(dir.path());
        let path = state_file_path(dir.path());

        let record = ProvisionRecord::for_installed(&desc).unwrap();
        add_provision_record(&path, record.clone()).unwrap();
        add_provision_record(&path, record).unwrap();

        let state = load_state(&path).unwrap();
        assert_eq!(state.provisions.len(), 2);
        assert_eq!(state.provisions[0].platform, "linux-amd64");
        assert_eq!(
            state.provisions[0].sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn ledger_keeps_most_recent_records() {
        let dir = tempfile::tempdir().unwrap();
        let desc = installed(dir.path());
        let path = state_file_path(dir.path());

        for i in 0..MAX_RECORDS + 3 {
            let mut record = ProvisionRecord::for_installed(&desc).unwrap();
            record.version = format!("1.0.{i}");
            add_provision_record(&path, record).unwrap();
        }

        let state = load_state(&path).unwrap();
        assert_eq!(state.provisions.len(), MAX_RECORDS);
        assert_eq!(state.provisions[0].version, "1.0.3");
    }

    #[test]
    fn hashing_missing_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = sha256_file(&dir.path().join("nope")).unwrap_err();
        assert!(err.to_string().contains("nope"));
    }
}
