//! Password policy (`pwpolicy`) generation and application.

use crate::commands;
use crate::executor::{run_checked, CommandRunner};
use macdeploy_common::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

/// macOS keeps at most this many previous passwords.
pub const MAX_REUSE_HISTORY: u32 = 15;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordPolicy {
    pub reuse_password: u32,
    pub require_alpha: bool,
    pub require_numeric: bool,
    pub min_characters: u32,
    pub max_characters: u32,
    pub change_on_login: bool,
}

impl PasswordPolicy {
    /// Policy that only forces a password change at next login.
    pub fn reset_on_login() -> Self {
        Self {
            change_on_login: true,
            ..Self::default()
        }
    }

    /// Space separated `key=value` list understood by `pwpolicy -setpolicy`.
    pub fn policy_string(&self) -> String {
        let mut parts = Vec::new();
        if self.change_on_login {
            parts.push("newPasswordRequired=1".to_string());
        }
        if self.require_alpha {
            parts.push("requiresAlpha=1".to_string());
        }
        if self.require_numeric {
            parts.push("requiresNumeric=1".to_string());
        }
        if self.max_characters > 0 {
            parts.push(format!("maxChars={}", self.max_characters));
        }
        if self.min_characters > 0 {
            parts.push(format!("minChars={}", self.min_characters));
        }
        let history = self.reuse_password.min(MAX_REUSE_HISTORY);
        if history > 0 {
            parts.push(format!("usingHistory={}", history));
        }
        parts.join(" ")
    }

    pub fn is_empty(&self) -> bool {
        self.policy_string().is_empty()
    }
}

/// Apply `policy` to `user`, or the account policies in `plist` when given.
pub async fn apply_policy(
    runner: &dyn CommandRunner,
    user: &str,
    policy: &PasswordPolicy,
    plist: Option<&Path>,
) -> Result<()> {
    let command = match plist {
        Some(path) => {
            if !policy.change_on_login {
                warn!(
                    "Password reset on login is not enforced, run: sudo pwpolicy -u '{}' -setpolicy 'newPasswordRequired=1'",
                    user
                );
            }
            commands::set_account_policies(user, path)
        }
        None => {
            let policies = policy.policy_string();
            if policies.is_empty() {
                debug!("No password policy configured for {}", user);
                return Ok(());
            }
            debug!("Password policy for {}: {}", user, policies);
            commands::set_policy(user, &policies)
        }
    };

    run_checked(runner, &command).await?;
    info!("Applied password policy to {}", user);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::CommandOutput;
    use crate::testing::RecordingRunner;
    use macdeploy_common::Error;

    fn full_policy() -> PasswordPolicy {
        PasswordPolicy {
            reuse_password: 3,
            require_alpha: true,
            require_numeric: true,
            min_characters: 5,
            max_characters: 15,
            change_on_login: true,
        }
    }

    #[test]
    fn test_policy_string_contains_every_rule() {
        let s = full_policy().policy_string();
        for part in [
            "requiresAlpha=1",
            "requiresNumeric=1",
            "newPasswordRequired=1",
            "usingHistory=3",
            "minChars=5",
            "maxChars=15",
        ] {
            assert!(s.contains(part), "{} missing from {}", part, s);
        }
        assert_eq!(
            s,
            "newPasswordRequired=1 requiresAlpha=1 requiresNumeric=1 maxChars=15 minChars=5 usingHistory=3"
        );
    }

    #[test]
    fn test_reuse_history_is_clamped() {
        let policy = PasswordPolicy {
            reuse_password: 40,
            ..Default::default()
        };
        assert_eq!(policy.policy_string(), "usingHistory=15");
    }

    #[test]
    fn test_reset_on_login_only() {
        assert_eq!(
            PasswordPolicy::reset_on_login().policy_string(),
            "newPasswordRequired=1"
        );
        assert!(PasswordPolicy::default().is_empty());
    }

    #[tokio::test]
    async fn test_apply_policy_passes_user_and_policy() {
        let runner = RecordingRunner::new();
        apply_policy(&runner, "john.smith", &full_policy(), None)
            .await
            .unwrap();
        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].args[0], "john.smith");
        assert!(calls[0].args[1].starts_with("newPasswordRequired=1"));
    }

    #[tokio::test]
    async fn test_apply_empty_policy_runs_nothing() {
        let runner = RecordingRunner::new();
        apply_policy(&runner, "john", &PasswordPolicy::default(), None)
            .await
            .unwrap();
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_apply_plist_policy() {
        let runner = RecordingRunner::new();
        runner.respond("password policy", CommandOutput::failed(1, "bad plist"));
        let err = apply_policy(
            &runner,
            "john",
            &PasswordPolicy::default(),
            Some(Path::new("/tmp/p.plist")),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::CommandExecution { .. }));
        assert!(runner.calls()[0].script.contains("-setaccountpolicies"));
    }
}
