//! Zip archive access for xapk, apkm and apk files.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};
use zip::ZipArchive;

fn open(path: &Path) -> Result<ZipArchive<File>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    ZipArchive::new(file).with_context(|| format!("{} is not a zip archive", path.display()))
}

/// Names of every entry in the archive, in archive order.
pub fn entry_names(path: &Path) -> Result<Vec<String>> {
    let archive = open(path)?;
    Ok(archive.file_names().map(String::from).collect())
}

/// Read one entry; `None` when the archive has no such entry.
pub fn read_entry(path: &Path, name: &str) -> Result<Option<Vec<u8>>> {
    let mut archive = open(path)?;
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| format!("failed to read {} from {}", name, path.display()))
        }
    };

    let mut data = Vec::with_capacity(entry.size() as usize);
    entry
        .read_to_end(&mut data)
        .with_context(|| format!("failed to read {} from {}", name, path.display()))?;
    Ok(Some(data))
}

/// Extract every entry into `dest`, returning the written file paths.
///
/// Entries whose names would escape `dest` are skipped.
pub fn extract_all(path: &Path, dest: &Path) -> Result<Vec<PathBuf>> {
    let mut archive = open(path)?;
    let mut written = Vec::new();

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .with_context(|| format!("failed to read entry {} of {}", index, path.display()))?;

        let Some(relative) = entry.enclosed_name() else {
            warn!(entry = entry.name(), "skipping archive entry outside the extraction root");
            continue;
        };
        let target = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&target)
                .with_context(|| format!("failed to create {}", target.display()))?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let mut out = File::create(&target)
            .with_context(|| format!("failed to create {}", target.display()))?;
        io::copy(&mut entry, &mut out)
            .with_context(|| format!("failed to extract {}", target.display()))?;
        written.push(target);
    }

    debug!(archive = %path.display(), files = written.len(), "extracted");
    Ok(written)
}
