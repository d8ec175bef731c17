//! Operator scripts run at fixed points of the pipeline.

use crate::commands;
use crate::executor::CommandRunner;
use macdeploy_report_schema::EntityResult;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptPhase {
    Pre,
    Inter,
    Post,
}

impl fmt::Display for ScriptPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptPhase::Pre => write!(f, "pre"),
            ScriptPhase::Inter => write!(f, "inter"),
            ScriptPhase::Post => write!(f, "post"),
        }
    }
}

fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

pub struct ScriptRunner {
    runner: Arc<dyn CommandRunner>,
    /// Lowercased base name to path, filled while scanning on a miss.
    cache: HashMap<String, PathBuf>,
}

impl ScriptRunner {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            cache: HashMap::new(),
        }
    }

    /// Find `name` among `known`. Exact base names are preferred, then any
    /// path containing the name.
    pub fn resolve(&mut self, name: &str, known: &[PathBuf]) -> Option<PathBuf> {
        let wanted = name.trim().to_lowercase();
        if let Some(path) = self.cache.get(&wanted) {
            return Some(path.clone());
        }

        let mut partial = None;
        for path in known {
            let base = base_name(path);
            self.cache.entry(base.clone()).or_insert_with(|| path.clone());
            if base == wanted {
                return Some(path.clone());
            }
            if partial.is_none() && path.to_string_lossy().to_lowercase().contains(&wanted) {
                partial = Some(path.clone());
            }
        }
        partial
    }

    /// Run every named script of a phase. A failing or missing script never
    /// stops the ones after it.
    pub async fn execute_scripts(
        &mut self,
        phase: ScriptPhase,
        names: &[String],
        known: &[PathBuf],
    ) -> Vec<EntityResult> {
        let mut results = Vec::new();
        for name in names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
            let Some(path) = self.resolve(name, known) else {
                warn!("{} script {} not found", phase, name);
                results.push(EntityResult::skipped(name, "not found"));
                continue;
            };

            info!("Running {} script {}", phase, path.display());
            match self.runner.run(&commands::run_script(&path)).await {
                Ok(output) if output.success() => {
                    info!("Script {} finished", name);
                    results.push(EntityResult::completed(name));
                }
                Ok(output) => {
                    error!("Script {} failed: {}", name, output.combined());
                    results.push(EntityResult::failed(name, output.combined()));
                }
                Err(e) => {
                    error!("Script {} failed: {}", name, e);
                    results.push(EntityResult::failed(name, e.to_string()));
                }
            }
        }
        results
    }
}
