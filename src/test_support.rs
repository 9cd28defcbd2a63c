//! Fixtures and fakes shared by unit tests.

use std::cell::RefCell;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use flate2::Compression;
use flate2::write::GzEncoder;

use crate::locator::BinaryDescriptor;
use crate::platform::PlatformKey;
use crate::provision::{Fetcher, ProvisionError, Provisioner};

pub fn write_tar_gz(path: &Path, entries: &[(&str, &str)]) {
    let file = File::create(path).expect("archive file should be created");
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for (name, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        builder
            .append_data(&mut header, name, data.as_bytes())
            .expect("entry should be appended");
    }

    builder
        .into_inner()
        .expect("tar stream should finish")
        .finish()
        .expect("gzip stream should finish");
}

pub fn write_zip(path: &Path, entries: &[(&str, &str)]) {
    let file = File::create(path).expect("archive file should be created");
    let mut writer = zip::ZipWriter::new(file);

    for (name, data) in entries {
        writer
            .start_file(*name, zip::write::FileOptions::default())
            .expect("zip entry should start");
        writer.write_all(data.as_bytes()).expect("zip entry should be written");
    }

    writer.finish().expect("zip archive should finish");
}

/// Serves a fixed tar.gz and records every URL it was asked for.
pub struct FakeFetcher {
    entries: Vec<(&'static str, &'static str)>,
    fail: bool,
    pub urls: RefCell<Vec<String>>,
}

impl FakeFetcher {
    pub fn serving(entries: Vec<(&'static str, &'static str)>) -> Self {
        Self {
            entries,
            fail: false,
            urls: RefCell::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::serving(Vec::new())
        }
    }

    pub fn calls(&self) -> usize {
        self.urls.borrow().len()
    }
}

impl Fetcher for FakeFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<(), ProvisionError> {
        self.urls.borrow_mut().push(url.to_string());
        if self.fail {
            return Err(ProvisionError::DownloadFailed {
                url: url.to_string(),
                reason: "server responded with 404 Not Found".to_string(),
            });
        }
        write_tar_gz(dest, &self.entries);
        Ok(())
    }
}

pub fn linux_descriptor(root: &Path) -> BinaryDescriptor {
    let platform = PlatformKey::from_host("linux", "x86_64").expect("linux is supported");
    BinaryDescriptor::locate(platform, "doplan", "1.2.0", root)
}

pub fn provisioner(fetcher: FakeFetcher, temp_root: &Path) -> Provisioner<FakeFetcher> {
    Provisioner::new(fetcher, "https://github.com/DoPlan-dev/CLI")
        .with_temp_root(temp_root.to_path_buf())
}
