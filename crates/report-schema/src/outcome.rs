//! Per-run provisioning outcome.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    PreScripts,
    AccountCreation,
    SearchIndex,
    DiskImages,
    PackageInstallation,
    AppBundles,
    InterScripts,
    FileVault,
    Firewall,
    PasswordPolicy,
    PostScripts,
    Connectivity,
    Reporting,
    Cleanup,
}

/// What happened to a single account, package, script or volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum Outcome {
    Completed,
    Skipped(String),
    Failed(String),
}

impl Outcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed)
    }
}

/// Named outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityResult {
    pub name: String,
    pub outcome: Outcome,
}

impl EntityResult {
    pub fn completed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            outcome: Outcome::Completed,
        }
    }

    pub fn skipped(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            outcome: Outcome::Skipped(reason.into()),
        }
    }

    pub fn failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            outcome: Outcome::Failed(reason.into()),
        }
    }
}

/// Enabled/disabled state of a security feature; `Unknown` when the query
/// answered with something unrecognised or was never made.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToggleState {
    Enabled,
    Disabled,
    #[default]
    Unknown,
}

/// Everything a pipeline run did, for logging and tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningResult {
    pub run_id: Uuid,
    pub serial_tag: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub accounts: Vec<EntityResult>,
    pub packages: Vec<EntityResult>,
    pub volumes: Vec<EntityResult>,
    pub app_bundles: Vec<EntityResult>,
    pub scripts: Vec<EntityResult>,
    pub policies: Vec<EntityResult>,
    pub filevault: ToggleState,
    pub firewall: ToggleState,
    pub filevault_key_generated: bool,
    pub key_delivered: bool,
    pub log_delivered: bool,
    pub cleanup: Option<Outcome>,
}

impl ProvisioningResult {
    pub fn new(serial_tag: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            serial_tag: serial_tag.into(),
            started_at: Utc::now(),
            completed_at: None,
            accounts: Vec::new(),
            packages: Vec::new(),
            volumes: Vec::new(),
            app_bundles: Vec::new(),
            scripts: Vec::new(),
            policies: Vec::new(),
            filevault: ToggleState::Unknown,
            firewall: ToggleState::Unknown,
            filevault_key_generated: false,
            key_delivered: false,
            log_delivered: false,
            cleanup: None,
        }
    }

    /// Look up an account outcome by its canonical or configured name.
    pub fn account(&self, name: &str) -> Option<&EntityResult> {
        self.accounts.iter().find(|a| a.name == name)
    }

    /// Look up a package outcome by its lowercased name.
    pub fn package(&self, name: &str) -> Option<&EntityResult> {
        self.packages.iter().find(|p| p.name == name)
    }

    /// All failed entities across every stage.
    pub fn failures(&self) -> Vec<&EntityResult> {
        self.accounts
            .iter()
            .chain(&self.packages)
            .chain(&self.volumes)
            .chain(&self.app_bundles)
            .chain(&self.scripts)
            .chain(&self.policies)
            .filter(|e| e.outcome.is_failed())
            .collect()
    }

    pub fn finish(&mut self) {
        self.completed_at = Some(Utc::now());
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failures_span_all_stages() {
        let mut result = ProvisioningResult::new("C02XYZ");
        result.accounts.push(EntityResult::completed("john.smith"));
        result.accounts.push(EntityResult::skipped("client", "no name given"));
        result.packages.push(EntityResult::failed("teamviewer.pkg", "exit 1"));
        result.scripts.push(EntityResult::failed("setup.sh", "exit 2"));

        let failures = result.failures();
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].name, "teamviewer.pkg");
        assert!(result.account("john.smith").unwrap().outcome.is_completed());
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_value(EntityResult::failed("x.pkg", "not found")).unwrap();
        assert_eq!(json["name"], "x.pkg");
        assert_eq!(json["outcome"]["status"], "failed");
        assert_eq!(json["outcome"]["reason"], "not found");

        let json = serde_json::to_value(EntityResult::completed("y.pkg")).unwrap();
        assert_eq!(json["outcome"]["status"], "completed");
    }
}
