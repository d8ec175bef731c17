//! Removal of the deployment bundle after a run.

use crate::fileset::list_names;
use macdeploy_common::{Error, Result};
use macdeploy_report_schema::EntityResult;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tracing::{error, info};

pub struct CleanupGuard {
    project_name: String,
}

impl CleanupGuard {
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            project_name: project_name.into().to_lowercase(),
        }
    }

    /// Refuse to clean inside the tool's own source checkout.
    pub fn check_location(&self, cwd: &Path) -> Result<()> {
        if cwd.to_string_lossy().to_lowercase().contains(&self.project_name) {
            return Err(Error::CleanupRefused(format!(
                "{} is inside the {} project directory",
                cwd.display(),
                self.project_name
            )));
        }
        Ok(())
    }

    /// Delete entries present both in `targets` (lowercased names) and in
    /// `dir`. Per-entry failures are recorded and skipped.
    pub fn remove_files(&self, targets: &BTreeSet<String>, dir: &Path) -> Result<Vec<EntityResult>> {
        let mut results = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if !targets.contains(&name.to_lowercase()) {
                continue;
            }

            let path = entry.path();
            let removed = match entry.file_type() {
                Ok(t) if t.is_dir() => fs::remove_dir_all(&path),
                Ok(_) => fs::remove_file(&path),
                Err(e) => Err(e),
            };
            match removed {
                Ok(()) => {
                    info!("Removed {}", path.display());
                    results.push(EntityResult::completed(name));
                }
                Err(e) => {
                    error!("Failed to remove {}: {}", path.display(), e);
                    results.push(EntityResult::failed(name, e.to_string()));
                }
            }
        }
        results.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(results)
    }

    /// Location check followed by removal in `cwd`.
    pub fn run(&self, targets: &BTreeSet<String>, cwd: &Path) -> Result<Vec<EntityResult>> {
        self.check_location(cwd)?;
        let present = list_names(cwd)?;
        if !present.iter().any(|n| targets.contains(n)) {
            info!("Nothing to clean up in {}", cwd.display());
        }
        self.remove_files(targets, cwd)
    }
}
