//! macdeploy provisioner - stages that turn a freshly imaged Mac into a
//! deployable machine, and the orchestrator that sequences them.

pub mod accounts;
pub mod cleanup;
pub mod commands;
pub mod config;
pub mod deploy_log;
pub mod device;
pub mod executor;
pub mod fileset;
pub mod installer;
pub mod names;
pub mod orchestrator;
pub mod policy;
pub mod prompt;
pub mod reporter;
pub mod scripts;
pub mod search_index;
pub mod security;
pub mod volumes;

#[cfg(test)]
pub(crate) mod testing;

pub use config::Config;
pub use deploy_log::{DeploymentLog, LogBuffer};
pub use device::Metadata;
pub use executor::{CommandOutput, CommandRunner, LocalRunner, ShellCommand};
pub use orchestrator::{Orchestrator, RunOptions};
pub use prompt::{Prompter, StdinPrompter};
