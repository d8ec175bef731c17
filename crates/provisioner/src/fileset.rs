//! Discovery and copying of files in the deployment bundle.

use macdeploy_common::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// Recursively find entries under `dir` whose name ends with `extension`
/// (case-insensitive, e.g. `".pkg"`). Matching directories such as `.app`
/// bundles are returned without descending into them. Unreadable entries
/// below `dir` are logged and skipped.
pub fn find_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let extension = extension.to_lowercase();
    let mut found = Vec::new();
    let mut walker = WalkDir::new(dir).min_depth(1).sort_by_file_name().into_iter();

    while let Some(entry) = walker.next() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => {
                return Err(Error::Other(format!("walking {}: {}", dir.display(), e)));
            }
            Err(e) => {
                warn!("Skipping unreadable entry under {}: {}", dir.display(), e);
                continue;
            }
        };
        let name = entry.file_name().to_string_lossy().to_lowercase();
        if name.is_empty() || !name.ends_with(&extension) {
            continue;
        }
        if entry.file_type().is_dir() {
            walker.skip_current_dir();
        }
        found.push(entry.into_path());
    }

    Ok(found)
}

/// Copy `source` (file or directory) into `target_dir`, keeping its name.
/// Symlinks inside bundles are recreated, not followed.
pub fn copy_into(source: &Path, target_dir: &Path) -> Result<PathBuf> {
    let name = source
        .file_name()
        .ok_or_else(|| Error::Other(format!("{} has no file name", source.display())))?;
    let destination = target_dir.join(name);

    if !source.is_dir() {
        fs::copy(source, &destination)?;
        return Ok(destination);
    }

    for entry in WalkDir::new(source) {
        let entry = entry.map_err(|e| Error::Other(format!("walking {}: {}", source.display(), e)))?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| Error::Other(e.to_string()))?;
        let target = destination.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }

    Ok(destination)
}

#[cfg(unix)]
fn copy_symlink(link: &Path, target: &Path) -> Result<()> {
    let points_to = fs::read_link(link)?;
    if target.symlink_metadata().is_ok() {
        fs::remove_file(target)?;
    }
    std::os::unix::fs::symlink(points_to, target)?;
    Ok(())
}

#[cfg(not(unix))]
fn copy_symlink(link: &Path, target: &Path) -> Result<()> {
    fs::copy(link, target)?;
    Ok(())
}

/// File names (lowercased) directly inside `dir`.
pub fn list_names(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_lowercase();
        if !name.is_empty() {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}
