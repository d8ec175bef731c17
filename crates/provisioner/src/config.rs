//! YAML deployment configuration.

use crate::commands;
use crate::executor::{run_checked, CommandRunner};
use crate::names::format_username;
use crate::policy::PasswordPolicy;
use crate::prompt::Prompter;
use macdeploy_common::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Keyed by a free-form label; only the values matter.
    pub accounts: BTreeMap<String, AccountSpec>,
    /// Package file-name fragment to installed markers.
    pub packages: BTreeMap<String, Vec<String>>,
    pub search_directories: Vec<PathBuf>,
    pub admin: AdminCredential,
    pub server_host: String,
    pub filevault: bool,
    pub firewall: bool,
    pub policy: PasswordPolicy,
    /// Log output directory, empty for the default.
    pub log: String,
    pub always_cleanup: bool,
    pub scripts: ScriptPhases,
}

#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct AccountSpec {
    /// Display name; blank means ask the operator.
    pub username: String,
    pub password: String,
    pub ignore_admin: bool,
    pub change_password: bool,
    pub apply_policy: bool,
}

impl fmt::Debug for AccountSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountSpec")
            .field("username", &self.username)
            .field("password", &"<hidden>")
            .field("ignore_admin", &self.ignore_admin)
            .field("change_password", &self.change_password)
            .field("apply_policy", &self.apply_policy)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScriptPhases {
    pub pre: Vec<String>,
    pub inter: Vec<String>,
    pub post: Vec<String>,
}

/// Operator account used for sudo and secure token grants.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct AdminCredential {
    pub username: String,
    pub password: String,
    pub apply_policy: bool,
}

impl fmt::Debug for AdminCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminCredential")
            .field("username", &self.username)
            .field("password", &"<hidden>")
            .field("apply_policy", &self.apply_policy)
            .finish()
    }
}

impl AdminCredential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            apply_policy: false,
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.username.trim().is_empty() && !self.password.is_empty()
    }

    /// Prompt for whatever the config left blank. Still blank is an error.
    pub fn fill_missing(&mut self, prompter: &dyn Prompter) -> Result<()> {
        if self.username.trim().is_empty() {
            let answer = prompter.ask("Enter the admin username: ")?;
            self.username = format_username(&answer);
            if self.username.is_empty() {
                return Err(Error::Config("admin username is required".to_string()));
            }
        }
        if self.password.is_empty() {
            self.password = prompter.ask("Enter the admin password: ")?;
            if self.password.is_empty() {
                return Err(Error::Config("admin password is required".to_string()));
            }
        }
        Ok(())
    }

    /// Open (or refresh) the sudo session with the admin password.
    pub async fn initialize_sudo(&self, runner: &dyn CommandRunner) -> Result<()> {
        run_checked(runner, &commands::sudo_session(&self.password)).await?;
        debug!("sudo session refreshed for {}", self.username);
        Ok(())
    }
}

impl Config {
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let config = Self::from_yaml_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let host = self.server_host.trim();
        if !host.is_empty() && !(host.starts_with("http://") || host.starts_with("https://")) {
            return Err(Error::Config(format!(
                "server_host must start with http:// or https://, got {}",
                host
            )));
        }
        Ok(())
    }

    /// Every password in the config, for log redaction.
    pub fn secrets(&self) -> Vec<String> {
        std::iter::once(self.admin.password.clone())
            .chain(self.accounts.values().map(|a| a.password.clone()))
            .filter(|s| !s.is_empty())
            .collect()
    }
}
