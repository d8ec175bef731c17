//! Provisioning pipeline.
//!
//! Stages run strictly in sequence. A stage failure is recorded in the
//! [`ProvisioningResult`] and the pipeline moves on; nothing short of
//! process termination stops a run.

use crate::accounts::{AccountOutcome, AccountProvisioner};
use crate::cleanup::CleanupGuard;
use crate::config::Config;
use crate::deploy_log::DeploymentLog;
use crate::device::Metadata;
use crate::executor::CommandRunner;
use crate::fileset::{copy_into, find_files};
use crate::installer::PackageInstaller;
use crate::policy::{apply_policy, PasswordPolicy};
use crate::prompt::{confirm, Prompter};
use crate::reporter::ResultReporter;
use crate::scripts::{ScriptPhase, ScriptRunner};
use crate::search_index::SearchIndex;
use crate::security::SecurityHardener;
use crate::volumes::VolumeMounter;
use macdeploy_common::{Architecture, Error};
use macdeploy_report_schema::{
    EntityResult, FileVaultPayload, LogPayload, Outcome, ProvisioningResult, Stage, ToggleState,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Command-line switches that shape a run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Give created accounts admin rights unless they opt out.
    pub grant_admin: bool,
    /// `name[/marker]*` tokens added to the package list.
    pub include: Vec<String>,
    /// Package names removed from the list. Applied after `include`.
    pub exclude: Vec<String>,
    /// Account policy plist replacing the generated pwpolicy string.
    pub plist: Option<PathBuf>,
    pub remove_files: bool,
    /// Skip the log upload. A FileVault key is still sent.
    pub no_send: bool,
    /// Stage packages from disk images in the bundle.
    pub mount: bool,
}

struct PolicyTarget {
    user: String,
    policy: PasswordPolicy,
}

/// Cross-stage state of one run.
struct RunState {
    result: ProvisioningResult,
    policy_targets: Vec<PolicyTarget>,
    filevault_key: Option<String>,
    server_failed: bool,
}

impl RunState {
    fn new(serial_tag: &str) -> Self {
        Self {
            result: ProvisioningResult::new(serial_tag),
            policy_targets: Vec::new(),
            filevault_key: None,
            server_failed: false,
        }
    }
}

pub struct Orchestrator {
    runner: Arc<dyn CommandRunner>,
    prompter: Arc<dyn Prompter>,
    config: Config,
    options: RunOptions,
    metadata: Metadata,
    log: DeploymentLog,
    arch: Architecture,
    working_dir: PathBuf,
}

impl Orchestrator {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        prompter: Arc<dyn Prompter>,
        config: Config,
        options: RunOptions,
        metadata: Metadata,
        log: DeploymentLog,
    ) -> Self {
        Self {
            runner,
            prompter,
            config,
            options,
            metadata,
            log,
            arch: Architecture::current(),
            working_dir: PathBuf::from("."),
        }
    }

    pub fn with_architecture(mut self, arch: Architecture) -> Self {
        self.arch = arch;
        self
    }

    /// Directory holding the bundle; cleanup operates here too.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    fn dist_dir(&self) -> PathBuf {
        self.working_dir.join(&self.metadata.dist_directory)
    }

    /// Persist everything logged so far.
    fn checkpoint(&self) {
        if let Err(e) = self.log.write_file() {
            warn!("Failed to write {}: {}", self.log.path().display(), e);
        }
    }

    /// sudo sessions expire silently; renew before elevated stages.
    async fn refresh_sudo(&self) {
        if let Err(e) = self.config.admin.initialize_sudo(self.runner.as_ref()).await {
            warn!("Failed to refresh the sudo session: {}", e);
        }
    }

    fn enter(&self, stage: Stage) {
        debug!(?stage, "Entering stage");
    }

    /// Run the full pipeline.
    pub async fn run(&self) -> ProvisioningResult {
        let serial = self.metadata.serial_tag.clone();
        info!("Starting deployment for {}", serial);
        println!("Starting deployment for {}", serial);

        let mut state = RunState::new(&serial);
        let known_scripts = self.discover_scripts();
        let mut scripts = ScriptRunner::new(self.runner.clone());

        self.enter(Stage::PreScripts);
        self.run_scripts(&mut scripts, ScriptPhase::Pre, &known_scripts, &mut state)
            .await;

        // Accounts
        self.enter(Stage::AccountCreation);
        self.refresh_sudo().await;
        self.create_accounts(self.options.grant_admin, false, &mut state)
            .await;
        self.checkpoint();

        self.enter(Stage::SearchIndex);
        let index = SearchIndex::build(&self.config.search_directories);
        debug!("Search index holds {} entries", index.len());

        if self.options.mount {
            self.enter(Stage::DiskImages);
            self.refresh_sudo().await;
            let dist = self.dist_dir();
            state.result.volumes = VolumeMounter::new(self.runner.clone())
                .stage_disk_images(&dist, &dist)
                .await;
        }

        // Software
        self.enter(Stage::PackageInstallation);
        self.refresh_sudo().await;
        self.install_packages(&index, &mut state).await;

        self.enter(Stage::AppBundles);
        self.copy_app_bundles(&mut state);

        self.enter(Stage::InterScripts);
        self.run_scripts(&mut scripts, ScriptPhase::Inter, &known_scripts, &mut state)
            .await;
        self.checkpoint();

        // Security
        self.refresh_sudo().await;
        if self.config.filevault {
            self.enter(Stage::FileVault);
            self.enable_filevault(&mut state).await;
        }
        self.checkpoint();

        if self.config.firewall {
            self.enter(Stage::Firewall);
            self.refresh_sudo().await;
            self.enable_firewall(&mut state).await;
        }

        // Must stay after every secure token and elevated step.
        self.enter(Stage::PasswordPolicy);
        self.apply_password_policies(&mut state).await;

        self.enter(Stage::PostScripts);
        self.run_scripts(&mut scripts, ScriptPhase::Post, &known_scripts, &mut state)
            .await;

        self.enter(Stage::Reporting);
        self.report(&mut state).await;

        self.enter(Stage::Cleanup);
        self.cleanup(&mut state);

        self.finish(state)
    }

    /// Only the account stage and the policies of the accounts it created.
    pub async fn run_accounts_only(&self, apply_policy: bool) -> ProvisioningResult {
        let serial = self.metadata.serial_tag.clone();
        info!("Creating accounts for {}", serial);

        let mut state = RunState::new(&serial);
        self.enter(Stage::AccountCreation);
        self.refresh_sudo().await;
        self.create_accounts(self.options.grant_admin, apply_policy, &mut state)
            .await;
        self.checkpoint();

        self.enter(Stage::PasswordPolicy);
        self.apply_password_policies(&mut state).await;
        self.finish(state)
    }

    fn finish(&self, mut state: RunState) -> ProvisioningResult {
        state.result.finish();
        match state.result.to_json() {
            Ok(json) => debug!("Provisioning result: {}", json),
            Err(e) => warn!("Failed to serialize the provisioning result: {}", e),
        }
        let failures = state.result.failures().len();
        if failures > 0 {
            warn!("{} step(s) failed, see the log for details", failures);
        }
        self.checkpoint();

        println!("Completed deployment for {}", state.result.serial_tag);
        println!("Log output: {}", self.log.path().display());
        state.result
    }

    fn discover_scripts(&self) -> Vec<PathBuf> {
        let phases = &self.config.scripts;
        if phases.pre.is_empty() && phases.inter.is_empty() && phases.post.is_empty() {
            return Vec::new();
        }
        find_files(&self.dist_dir(), ".sh").unwrap_or_else(|e| {
            warn!("Cannot search for scripts: {}", e);
            Vec::new()
        })
    }

    async fn run_scripts(
        &self,
        scripts: &mut ScriptRunner,
        phase: ScriptPhase,
        known: &[PathBuf],
        state: &mut RunState,
    ) {
        let names = match phase {
            ScriptPhase::Pre => &self.config.scripts.pre,
            ScriptPhase::Inter => &self.config.scripts.inter,
            ScriptPhase::Post => &self.config.scripts.post,
        };
        if names.is_empty() {
            return;
        }
        info!("Running {} scripts", phase);
        let results = scripts.execute_scripts(phase, names, known).await;
        state.result.scripts.extend(results);
    }

    async fn create_accounts(&self, grant_admin: bool, force_policy: bool, state: &mut RunState) {
        if self.config.accounts.is_empty() {
            info!("No accounts configured");
        }
        let provisioner = AccountProvisioner::new(
            self.runner.clone(),
            self.prompter.clone(),
            self.config.admin.clone(),
            &self.metadata.users_directory,
        );

        for (label, spec) in &self.config.accounts {
            match provisioner.create_account(spec, grant_admin).await {
                Ok(AccountOutcome::Created { account_name, .. }) => {
                    let policy = if spec.apply_policy || force_policy {
                        Some(self.config.policy.clone())
                    } else if spec.change_password {
                        Some(PasswordPolicy::reset_on_login())
                    } else {
                        None
                    };
                    if let Some(policy) = policy {
                        state.policy_targets.push(PolicyTarget {
                            user: account_name.clone(),
                            policy,
                        });
                    }
                    state.result.accounts.push(EntityResult::completed(account_name));
                }
                Ok(AccountOutcome::Skipped) => {
                    state
                        .result
                        .accounts
                        .push(EntityResult::skipped(label, "no name given"));
                }
                Err(e) => {
                    error!("Failed to create account {}: {}", label, e);
                    let name = match &e {
                        Error::SecureToken { account, .. } | Error::AccountExists(account) => {
                            account.clone()
                        }
                        _ => label.clone(),
                    };
                    state
                        .result
                        .accounts
                        .push(EntityResult::failed(name, e.to_string()));
                }
            }
        }

        if self.config.admin.apply_policy {
            state.policy_targets.push(PolicyTarget {
                user: self.config.admin.username.clone(),
                policy: self.config.policy.clone(),
            });
        }
    }

    async fn install_packages(&self, index: &SearchIndex, state: &mut RunState) {
        let mut installer =
            PackageInstaller::new(self.runner.clone(), self.arch, &self.config.packages);
        installer.apply_overrides(&self.options.include, &self.options.exclude);

        if let Err(e) = installer.install_rosetta().await {
            error!("Failed to install Rosetta: {}", e);
        }
        if installer.packages().is_empty() {
            info!("No packages to install");
            return;
        }

        let available = find_files(&self.dist_dir(), ".pkg").unwrap_or_else(|e| {
            error!("Cannot search for packages: {}", e);
            Vec::new()
        });
        debug!("Found {} package files", available.len());
        state.result.packages = installer.install_packages(&available, index).await;
    }

    fn copy_app_bundles(&self, state: &mut RunState) {
        let bundles = match find_files(&self.dist_dir(), ".app") {
            Ok(bundles) => bundles,
            Err(e) => {
                warn!("Cannot search for app bundles: {}", e);
                return;
            }
        };

        let target = &self.metadata.applications_directory;
        for bundle in bundles {
            let name = bundle
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            match copy_into(&bundle, target) {
                Ok(path) => {
                    info!("Copied {} to {}", name, path.display());
                    state.result.app_bundles.push(EntityResult::completed(name));
                }
                Err(e) => {
                    error!("Failed to copy {}: {}", name, e);
                    state
                        .result
                        .app_bundles
                        .push(EntityResult::failed(name, e.to_string()));
                }
            }
        }
    }

    async fn enable_filevault(&self, state: &mut RunState) {
        let hardener = SecurityHardener::new(self.runner.clone());
        match hardener.filevault_status().await {
            Ok(ToggleState::Enabled) => {
                info!("FileVault is already enabled");
                state.result.filevault = ToggleState::Enabled;
                return;
            }
            Ok(ToggleState::Disabled) => state.result.filevault = ToggleState::Disabled,
            Ok(ToggleState::Unknown) => {
                error!("FileVault status is unrecognised, not enabling it");
                return;
            }
            Err(e) => {
                error!("Failed to check FileVault status: {}", e);
                return;
            }
        }

        let admin = &self.config.admin;
        match hardener.filevault_enable(&admin.username, &admin.password).await {
            Some(key) => {
                info!("Generated FileVault key {}", key);
                // only copy of the key until the collector has it
                self.checkpoint();
                state.result.filevault = ToggleState::Enabled;
                state.result.filevault_key_generated = true;
                state.filevault_key = Some(key);
            }
            None => match hardener.filevault_status().await {
                Ok(ToggleState::Enabled) => state.result.filevault = ToggleState::Enabled,
                Ok(status) => {
                    warn!("FileVault key failed to generate, FileVault is not enabled");
                    state.result.filevault = status;
                }
                Err(e) => warn!("Failed to re-check FileVault status: {}", e),
            },
        }
    }

    async fn enable_firewall(&self, state: &mut RunState) {
        let hardener = SecurityHardener::new(self.runner.clone());
        match hardener.firewall_status().await {
            Ok(ToggleState::Enabled) => {
                info!("Firewall is already enabled");
                state.result.firewall = ToggleState::Enabled;
            }
            Ok(_) => match hardener.firewall_enable().await {
                Ok(()) => state.result.firewall = ToggleState::Enabled,
                Err(e) => {
                    error!("Failed to enable the firewall: {}", e);
                    state.result.firewall = ToggleState::Disabled;
                }
            },
            Err(e) => error!("Failed to check firewall status: {}", e),
        }
    }

    async fn apply_password_policies(&self, state: &mut RunState) {
        if state.policy_targets.is_empty() {
            return;
        }
        self.refresh_sudo().await;
        for target in &state.policy_targets {
            let plist = self.options.plist.as_deref();
            match apply_policy(self.runner.as_ref(), &target.user, &target.policy, plist).await {
                Ok(()) => state
                    .result
                    .policies
                    .push(EntityResult::completed(&target.user)),
                Err(e) => {
                    error!("Failed to apply password policy to {}: {}", target.user, e);
                    state
                        .result
                        .policies
                        .push(EntityResult::failed(&target.user, e.to_string()));
                }
            }
        }
    }

    /// Keep the key in front of the operator when it could not be sent.
    fn preserve_key(&self, key: &str) {
        error!("The FileVault key must be saved manually: {}", key);
        println!("The key must be saved manually: {}", key);
        self.checkpoint();
    }

    fn fail_delivery(&self, state: &mut RunState) {
        state.server_failed = true;
        if let Some(key) = state.filevault_key.as_deref() {
            self.preserve_key(key);
        }
    }

    async fn report(&self, state: &mut RunState) {
        if state.filevault_key.is_none() && self.options.no_send {
            debug!("Nothing to send to the collector");
            return;
        }
        if !self.metadata.has_serial() {
            warn!("Serial number is unknown, nothing is sent to the collector");
            self.fail_delivery(state);
            return;
        }
        if self.config.server_host.trim().is_empty() {
            warn!("No server_host configured, nothing is sent to the collector");
            self.fail_delivery(state);
            return;
        }

        let reporter = match ResultReporter::new(&self.config.server_host) {
            Ok(reporter) => reporter,
            Err(e) => {
                error!("{}", e);
                self.fail_delivery(state);
                return;
            }
        };

        self.enter(Stage::Connectivity);
        match reporter.verify_connection().await {
            Ok(true) => debug!("Collector {} is reachable", reporter.host()),
            Ok(false) => {
                error!("Collector {} did not answer with 200", reporter.host());
                self.fail_delivery(state);
                return;
            }
            Err(e) => {
                error!("{}", e);
                self.fail_delivery(state);
                return;
            }
        }

        if let Some(key) = state.filevault_key.clone() {
            let payload = FileVaultPayload::new(key, &self.metadata.serial_tag);
            match reporter.send(&payload).await {
                Ok(_) => state.result.key_delivered = true,
                Err(e) => {
                    error!("Failed to send the FileVault key: {}", e);
                    self.fail_delivery(state);
                    return;
                }
            }
        }

        if self.options.no_send {
            return;
        }
        self.checkpoint();
        let mut payload = LogPayload::new(self.log.file_name());
        payload.set_body(self.log.contents());
        match reporter.send(&payload).await {
            Ok(_) => state.result.log_delivered = true,
            Err(e) => {
                error!("Failed to send the log: {}", e);
                state.server_failed = true;
            }
        }
    }

    fn cleanup(&self, state: &mut RunState) {
        if !(self.options.remove_files || self.config.always_cleanup) {
            return;
        }

        if state.server_failed {
            let question = "Sending results failed. Remove the deployment files anyway? [y/N]: ";
            match confirm(self.prompter.as_ref(), question) {
                Ok(true) => {}
                Ok(false) => {
                    info!("Keeping the deployment files");
                    state.result.cleanup =
                        Some(Outcome::Skipped("declined after failed send".to_string()));
                    return;
                }
                Err(e) => {
                    warn!("Keeping the deployment files: {}", e);
                    state.result.cleanup = Some(Outcome::Skipped(e.to_string()));
                    return;
                }
            }
        }

        let guard = CleanupGuard::new(&self.metadata.project_name);
        let outcome = match guard.run(&self.metadata.cleanup_targets(), &self.working_dir) {
            Ok(results) => {
                let failed = results.iter().filter(|r| r.outcome.is_failed()).count();
                if failed == 0 {
                    Outcome::Completed
                } else {
                    Outcome::Failed(format!("{} entries could not be removed", failed))
                }
            }
            Err(e) => {
                error!("Cleanup failed: {}", e);
                Outcome::Failed(e.to_string())
            }
        };
        state.result.cleanup = Some(outcome);
    }
}
