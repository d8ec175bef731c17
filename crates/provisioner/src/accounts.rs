//! Local account creation with secure token and rollback.

use crate::commands;
use crate::config::{AccountSpec, AdminCredential};
use crate::executor::{run_checked, CommandRunner};
use crate::names::format_account_name;
use crate::prompt::Prompter;
use macdeploy_common::{Error, Result, Rollback};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountOutcome {
    Created {
        account_name: String,
        display_name: String,
        admin: bool,
    },
    /// The operator left the prompted name blank.
    Skipped,
}

pub struct AccountProvisioner {
    runner: Arc<dyn CommandRunner>,
    prompter: Arc<dyn Prompter>,
    admin: AdminCredential,
    users_directory: PathBuf,
}

impl AccountProvisioner {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        prompter: Arc<dyn Prompter>,
        admin: AdminCredential,
        users_directory: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runner,
            prompter,
            admin,
            users_directory: users_directory.into(),
        }
    }

    /// Create the account described by `spec`. It receives admin rights
    /// when `grant_admin` is set and the account does not opt out.
    ///
    /// A failed secure token grant deletes the new account again before
    /// the error is returned.
    pub async fn create_account(
        &self,
        spec: &AccountSpec,
        grant_admin: bool,
    ) -> Result<AccountOutcome> {
        let display_name = if spec.username.trim().is_empty() {
            let answer = self
                .prompter
                .ask("Enter the name of the user (leave blank to skip): ")?;
            if answer.is_empty() {
                info!("No name given, skipping account");
                return Ok(AccountOutcome::Skipped);
            }
            answer
        } else {
            spec.username.trim().to_string()
        };

        let account_name = format_account_name(&display_name);
        if account_name.is_empty() {
            return Err(Error::Config(format!(
                "{:?} does not produce a valid account name",
                display_name
            )));
        }
        if spec.password.is_empty() {
            return Err(Error::Config(format!(
                "no password configured for {}",
                account_name
            )));
        }
        if self.account_exists(&account_name)? {
            return Err(Error::AccountExists(account_name));
        }

        let admin = grant_admin && !spec.ignore_admin;
        info!("Creating account {} (admin: {})", account_name, admin);
        run_checked(
            self.runner.as_ref(),
            &commands::create_account(&display_name, &account_name, &spec.password, admin),
        )
        .await?;

        if let Err(e) = self.grant_secure_token(&account_name, &spec.password).await {
            error!("Secure token grant for {} failed: {}", account_name, e);
            let rollback = match self.delete_account(&account_name).await {
                Ok(()) => Rollback::Deleted,
                Err(e) => {
                    warn!("Account {} needs manual deletion: {}", account_name, e);
                    Rollback::ManualDeletionRequired(e.to_string())
                }
            };
            return Err(Error::SecureToken {
                account: account_name,
                rollback,
            });
        }

        info!("Created account {}", account_name);
        Ok(AccountOutcome::Created {
            account_name,
            display_name,
            admin,
        })
    }

    /// Exact, case-insensitive match against the home directories.
    pub fn account_exists(&self, account_name: &str) -> Result<bool> {
        let wanted = account_name.to_lowercase();
        for entry in fs::read_dir(&self.users_directory)? {
            let entry = entry?;
            if entry.file_name().to_string_lossy().to_lowercase() == wanted {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn grant_secure_token(&self, account_name: &str, password: &str) -> Result<()> {
        run_checked(
            self.runner.as_ref(),
            &commands::secure_token(
                account_name,
                password,
                &self.admin.username,
                &self.admin.password,
            ),
        )
        .await?;
        info!("Granted secure token to {}", account_name);
        Ok(())
    }

    pub async fn delete_account(&self, account_name: &str) -> Result<()> {
        run_checked(self.runner.as_ref(), &commands::delete_account(account_name)).await?;
        info!("Deleted account {}", account_name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::CommandOutput;
    use crate::testing::{RecordingRunner, ScriptedPrompter};
    use tempfile::TempDir;

    struct Fixture {
        runner: Arc<RecordingRunner>,
        prompter: Arc<ScriptedPrompter>,
        users: TempDir,
    }

    impl Fixture {
        fn new(answers: &[&str]) -> Self {
            Self {
                runner: Arc::new(RecordingRunner::new()),
                prompter: Arc::new(ScriptedPrompter::new(answers.iter().copied())),
                users: TempDir::new().unwrap(),
            }
        }

        fn provisioner(&self) -> AccountProvisioner {
            AccountProvisioner::new(
                self.runner.clone(),
                self.prompter.clone(),
                AdminCredential::new("admin", "adminpw"),
                self.users.path(),
            )
        }
    }

    fn spec(username: &str) -> AccountSpec {
        AccountSpec {
            username: username.to_string(),
            password: "userpw".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_account_grants_token_with_admin_credential() {
        let fx = Fixture::new(&[]);
        let outcome = fx
            .provisioner()
            .create_account(&spec("John  Smith"), true)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            AccountOutcome::Created {
                account_name: "john.smith".to_string(),
                display_name: "John  Smith".to_string(),
                admin: true,
            }
        );

        let calls = fx.runner.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].args[3], "true");
        assert_eq!(calls[1].label, "secure token john.smith");
        assert_eq!(calls[1].args[2..], ["admin".to_string(), "adminpw".to_string()]);
    }

    #[tokio::test]
    async fn test_ignore_admin_overrides_grant() {
        let fx = Fixture::new(&[]);
        let mut s = spec("Jane Doe");
        s.ignore_admin = true;
        let outcome = fx.provisioner().create_account(&s, true).await.unwrap();
        assert!(matches!(outcome, AccountOutcome::Created { admin: false, .. }));
        assert_eq!(fx.runner.calls()[0].args[3], "false");
    }

    #[tokio::test]
    async fn test_blank_prompt_is_a_skip() {
        let fx = Fixture::new(&[""]);
        let outcome = fx.provisioner().create_account(&spec(""), false).await.unwrap();
        assert_eq!(outcome, AccountOutcome::Skipped);
        assert!(fx.runner.calls().is_empty());
        assert_eq!(fx.prompter.asked().len(), 1);
    }

    #[tokio::test]
    async fn test_prompted_name_is_used() {
        let fx = Fixture::new(&["Mary Ann"]);
        let outcome = fx.provisioner().create_account(&spec(" "), false).await.unwrap();
        assert!(matches!(
            outcome,
            AccountOutcome::Created { ref account_name, .. } if account_name == "mary.ann"
        ));
    }

    #[tokio::test]
    async fn test_existing_account_is_rejected() {
        let fx = Fixture::new(&[]);
        fs::create_dir(fx.users.path().join("John.Smith")).unwrap();
        fs::create_dir(fx.users.path().join("john.smithers")).unwrap();
        let err = fx
            .provisioner()
            .create_account(&spec("John Smith"), false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AccountExists(ref n) if n == "john.smith"));
        assert!(fx.runner.calls().is_empty());

        // prefix of an existing account is not a match
        assert!(fx
            .provisioner()
            .create_account(&spec("John Smi"), false)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_secure_token_failure_deletes_account_once() {
        let fx = Fixture::new(&[]);
        fx.runner
            .respond("secure token", CommandOutput::failed(1, "Operation is not permitted"));
        let err = fx
            .provisioner()
            .create_account(&spec("John Smith"), false)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::SecureToken { ref account, rollback: Rollback::Deleted } if account == "john.smith"
        ));
        assert_eq!(fx.runner.count("delete account"), 1);
        assert_eq!(fx.runner.calls()[2].args, vec!["john.smith"]);
    }

    #[tokio::test]
    async fn test_failed_rollback_requires_manual_deletion() {
        let fx = Fixture::new(&[]);
        fx.runner.respond("secure token", CommandOutput::failed(1, "error"));
        fx.runner.respond("delete account", CommandOutput::failed(1, "busy"));
        let err = fx
            .provisioner()
            .create_account(&spec("John Smith"), false)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::SecureToken { rollback: Rollback::ManualDeletionRequired(_), .. }
        ));
        assert!(err.to_string().contains("manual deletion required"));
    }

    #[tokio::test]
    async fn test_creation_failure_skips_token() {
        let fx = Fixture::new(&[]);
        fx.runner.respond("create account", CommandOutput::failed(1, "exists"));
        let err = fx
            .provisioner()
            .create_account(&spec("John Smith"), false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CommandExecution { .. }));
        assert!(err.to_string().ends_with("exit status 1: exists"));
        assert_eq!(fx.runner.count("secure token"), 0);
        assert_eq!(fx.runner.count("delete account"), 0);
    }

    #[tokio::test]
    async fn test_missing_password_is_rejected() {
        let fx = Fixture::new(&[]);
        let mut s = spec("John");
        s.password.clear();
        let err = fx.provisioner().create_account(&s, false).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
