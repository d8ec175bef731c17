//! Package installation.

use crate::commands;
use crate::executor::CommandRunner;
use crate::search_index::SearchIndex;
use macdeploy_common::{Architecture, Error, Result};
use macdeploy_report_schema::EntityResult;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Lowercase every package name. Later duplicates overwrite earlier ones.
pub fn normalize_packages(packages: &BTreeMap<String, Vec<String>>) -> BTreeMap<String, Vec<String>> {
    packages
        .iter()
        .map(|(name, markers)| (name.to_lowercase(), markers.clone()))
        .collect()
}

/// Parse `name[/marker]*`. Returns `None` for a blank name.
pub fn parse_package_token(token: &str) -> Option<(String, Vec<String>)> {
    let mut parts = token.split('/');
    let name = parts.next()?.trim().to_lowercase();
    if name.is_empty() {
        return None;
    }
    let markers = parts.map(|m| m.trim().to_string()).collect();
    Some((name, markers))
}

/// Whether the package looks installed according to `index`.
///
/// An empty marker forces installation, as does an empty marker list.
pub fn is_installed(markers: &[String], index: &SearchIndex) -> bool {
    for marker in markers {
        if marker.is_empty() {
            return false;
        }
        if index.contains_fragment(marker) {
            return true;
        }
    }
    false
}

pub struct PackageInstaller {
    runner: Arc<dyn CommandRunner>,
    arch: Architecture,
    desired: BTreeMap<String, Vec<String>>,
}

impl PackageInstaller {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        arch: Architecture,
        packages: &BTreeMap<String, Vec<String>>,
    ) -> Self {
        Self {
            runner,
            arch,
            desired: normalize_packages(packages),
        }
    }

    pub fn packages(&self) -> &BTreeMap<String, Vec<String>> {
        &self.desired
    }

    /// Add or overwrite packages from `name[/marker]*` tokens.
    pub fn add_packages(&mut self, tokens: &[String]) {
        for token in tokens {
            match parse_package_token(token) {
                Some((name, markers)) => {
                    debug!("Including package {} with markers {:?}", name, markers);
                    self.desired.insert(name, markers);
                }
                None => warn!("Ignoring blank package token {:?}", token),
            }
        }
    }

    pub fn remove_packages(&mut self, names: &[String]) {
        for name in names {
            let key = name.trim().to_lowercase();
            if self.desired.remove(&key).is_some() {
                debug!("Excluded package {}", key);
            }
        }
    }

    /// Apply `--include` then `--exclude`, so an exclusion always wins.
    pub fn apply_overrides(&mut self, include: &[String], exclude: &[String]) {
        self.add_packages(include);
        self.remove_packages(exclude);
    }

    /// Install Rosetta 2 on Apple silicon when it is missing.
    pub async fn install_rosetta(&self) -> Result<()> {
        if !self.arch.needs_rosetta() {
            debug!("Rosetta not needed on {}", self.arch);
            return Ok(());
        }

        // grep exits 1 when nothing matches; only the output matters
        let present = match self.runner.run(&commands::rosetta_check()).await {
            Ok(output) => !output.stdout.trim().is_empty(),
            Err(e) => {
                debug!("Rosetta check failed, assuming absent: {}", e);
                false
            }
        };
        if present {
            debug!("Rosetta already installed");
            return Ok(());
        }

        info!("Installing Rosetta");
        let command = commands::rosetta_install();
        let output = self.runner.run(&command).await?;
        if !output.success() {
            return Err(Error::command(
                command.label,
                format!("exit status {:?}", output.exit_code),
                output.combined(),
            ));
        }
        info!("Rosetta installed");
        Ok(())
    }

    /// Install every desired package not already present. Each package is
    /// independent: a failure is recorded and the loop moves on.
    pub async fn install_packages(
        &self,
        available: &[PathBuf],
        index: &SearchIndex,
    ) -> Vec<EntityResult> {
        let mut results = Vec::with_capacity(self.desired.len());

        for (name, markers) in &self.desired {
            if is_installed(markers, index) {
                info!("{} is already installed", name);
                results.push(EntityResult::skipped(name, "already installed"));
                continue;
            }

            let Some(file) = available
                .iter()
                .find(|p| p.to_string_lossy().to_lowercase().contains(name.as_str()))
            else {
                warn!("Package {} not found", name);
                results.push(EntityResult::failed(name, "not found"));
                continue;
            };

            let command = commands::install_package(file);
            match self.runner.run(&command).await {
                Ok(output) if output.success() => {
                    info!("Installed {}", name);
                    results.push(EntityResult::completed(name));
                }
                Ok(output) => {
                    error!("Failed to install {}: {}", name, output.combined());
                    results.push(EntityResult::failed(name, output.combined()));
                }
                Err(e) => {
                    error!("Failed to install {}: {}", name, e);
                    results.push(EntityResult::failed(name, e.to_string()));
                }
            }
        }

        results
    }
}
