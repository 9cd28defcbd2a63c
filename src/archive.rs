use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, anyhow};
use flate2::read::GzDecoder;
use tracing::{debug, warn};

/// Unpack `archive` into `dest`.
///
/// Release archives are gzip tar. When `zip_fallback` is set (Windows hosts)
/// a failed tar read is retried as a zip archive.
pub fn extract(archive: &Path, dest: &Path, zip_fallback: bool) -> anyhow::Result<()> {
    match extract_tar_gz(archive, dest) {
        Ok(()) => Ok(()),
        Err(err) if zip_fallback => {
            warn!("tar extraction failed ({err:#}), retrying as zip");
            extract_zip(archive, dest)
                .with_context(|| format!("zip fallback after tar failure: {err:#}"))
        }
        Err(err) => Err(err),
    }
}

pub fn extract_tar_gz(archive_path: &Path, dest: &Path) -> anyhow::Result<()> {
    fs::create_dir_all(dest)?;

    let file = File::open(archive_path)
        .with_context(|| format!("opening archive {}", archive_path.display()))?;
    let mut archive = tar::Archive::new(GzDecoder::new(BufReader::new(file)));
    archive
        .unpack(dest)
        .with_context(|| format!("unpacking gzip tar {}", archive_path.display()))?;

    debug!(archive = %archive_path.display(), "unpacked tar archive");
    Ok(())
}

/// Zip reader used only as the Windows fallback. The file keeps its
/// `.tar.gz` name because the release host names every asset that way, so
/// the format is decided by content, not by extension.
pub fn extract_zip(archive_path: &Path, dest: &Path) -> anyhow::Result<()> {
    fs::create_dir_all(dest)?;

    let file = File::open(archive_path)
        .with_context(|| format!("opening archive {}", archive_path.display()))?;
    let mut archive = zip::ZipArchive::new(file)
        .with_context(|| format!("reading zip archive {}", archive_path.display()))?;

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        let outpath = sanitize_extract_path(dest, file.name())?;

        if file.is_dir() {
            fs::create_dir_all(&outpath)?;
        } else {
            if let Some(parent) = outpath.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut outfile = File::create(&outpath)?;
            io::copy(&mut file, &mut outfile)?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Some(mode) = file.unix_mode() {
                    fs::set_permissions(&outpath, fs::Permissions::from_mode(mode))?;
                }
            }
        }
    }

    debug!(archive = %archive_path.display(), "unpacked zip archive");
    Ok(())
}

fn sanitize_extract_path(dest: &Path, name: &str) -> anyhow::Result<PathBuf> {
    let path = PathBuf::from(name);
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(anyhow!("archive entry escapes destination: {name}"));
    }

    if path.is_absolute() || path.has_root() {
        return Err(anyhow!("archive entry has absolute path: {name}"));
    }

    Ok(dest.join(path))
}

/// Depth-first search for a regular file called `file_name`.
///
/// Files in a directory are checked before its subdirectories and entries are
/// visited in name order, so a binary at the root wins over a nested copy.
pub fn find_binary(root: &Path, file_name: &str) -> io::Result<Option<PathBuf>> {
    let mut entries = fs::read_dir(root)?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    let mut subdirs = Vec::new();
    for entry in entries {
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            subdirs.push(entry.path());
        } else if file_type.is_file() && entry.file_name() == file_name {
            return Ok(Some(entry.path()));
        }
    }

    for dir in subdirs {
        if let Some(found) = find_binary(&dir, file_name)? {
            return Ok(Some(found));
        }
    }

    Ok(None)
}
