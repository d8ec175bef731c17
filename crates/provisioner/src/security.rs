//! FileVault and application firewall.

use crate::commands;
use crate::executor::{run_checked, CommandRunner};
use macdeploy_common::{Error, Result};
use macdeploy_report_schema::ToggleState;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Recovery key printed by `fdesetup enable`: the text inside the first
/// pair of single quotes.
pub fn parse_recovery_key(output: &str) -> Option<String> {
    let start = output.find('\'')? + 1;
    let len = output[start..].find('\'')?;
    let key = output[start..start + len].trim();
    if key.is_empty() {
        None
    } else {
        Some(key.to_string())
    }
}

fn parse_filevault_state(stdout: &str) -> Result<ToggleState> {
    match stdout.trim().to_lowercase().as_str() {
        "" => Err(Error::StatusUnavailable("fdesetup isactive".to_string())),
        "true" => Ok(ToggleState::Enabled),
        "false" => Ok(ToggleState::Disabled),
        other => {
            debug!("Unrecognised FileVault status {:?}", other);
            Ok(ToggleState::Unknown)
        }
    }
}

fn parse_firewall_state(stdout: &str) -> Result<ToggleState> {
    let text = stdout.trim().to_lowercase();
    if text.is_empty() {
        return Err(Error::StatusUnavailable("socketfilterfw --getglobalstate".to_string()));
    }
    if text.contains("enabled") {
        Ok(ToggleState::Enabled)
    } else {
        Ok(ToggleState::Disabled)
    }
}

pub struct SecurityHardener {
    runner: Arc<dyn CommandRunner>,
}

impl SecurityHardener {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// `fdesetup isactive` exits 1 when FileVault is off, so only its
    /// output is inspected. Empty output is an error, never "disabled".
    pub async fn filevault_status(&self) -> Result<ToggleState> {
        let output = self.runner.run(&commands::filevault_status()).await?;
        parse_filevault_state(&output.stdout)
    }

    /// Enable FileVault once and return the recovery key. Any failure is
    /// logged and yields `None`; there is no retry.
    pub async fn filevault_enable(&self, username: &str, password: &str) -> Option<String> {
        let output = match self
            .runner
            .run(&commands::filevault_enable(username, password))
            .await
        {
            Ok(output) => output,
            Err(e) => {
                warn!("Failed to enable FileVault: {}", e);
                return None;
            }
        };
        if !output.success() {
            warn!("Failed to enable FileVault: {}", output.combined());
            return None;
        }
        let key = parse_recovery_key(&output.stdout);
        if key.is_none() {
            warn!("FileVault enable produced no recovery key");
        }
        key
    }

    pub async fn firewall_status(&self) -> Result<ToggleState> {
        let output = self.runner.run(&commands::firewall_status()).await?;
        parse_firewall_state(&output.stdout)
    }

    pub async fn firewall_enable(&self) -> Result<()> {
        run_checked(self.runner.as_ref(), &commands::firewall_enable()).await?;
        info!("Firewall enabled");
        Ok(())
    }
}
