//! Names of software already present on the machine.

use crate::fileset::list_names;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Lowercased file and app names from the configured search directories.
/// Built once before installation, read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct SearchIndex {
    entries: BTreeSet<String>,
}

impl SearchIndex {
    /// List each directory (non-recursively). Unreadable directories are
    /// skipped with a warning.
    pub fn build(directories: &[PathBuf]) -> Self {
        let mut entries = BTreeSet::new();
        for dir in directories {
            match list_names(dir) {
                Ok(names) => {
                    debug!("Indexed {} entries from {}", names.len(), dir.display());
                    entries.extend(names);
                }
                Err(e) => warn!("Cannot read search directory {}: {}", dir.display(), e),
            }
        }
        Self { entries }
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            entries: names.into_iter().map(|n| n.as_ref().to_lowercase()).collect(),
        }
    }

    /// True when any entry contains `fragment`, ignoring case.
    pub fn contains_fragment(&self, fragment: &str) -> bool {
        let fragment = fragment.to_lowercase();
        self.entries.iter().any(|e| e.contains(&fragment))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_build_merges_directories_and_skips_missing() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        fs::create_dir(a.path().join("TeamViewer.app")).unwrap();
        fs::write(b.path().join("Zoom.us.plist"), "").unwrap();

        let index = SearchIndex::build(&[
            a.path().to_path_buf(),
            PathBuf::from("/definitely/not/here"),
            b.path().to_path_buf(),
        ]);
        assert_eq!(index.len(), 2);
        assert!(index.contains_fragment("TEAMVIEWER"));
        assert!(index.contains_fragment("zoom.us"));
        assert!(!index.contains_fragment("slack"));
    }

    #[test]
    fn test_empty_index() {
        let index = SearchIndex::build(&[]);
        assert!(index.is_empty());
        assert!(!index.contains_fragment("anything"));
    }
}
