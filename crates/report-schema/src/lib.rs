//! Report schema definitions for macdeploy.
//!
//! This crate defines the records exchanged with the collector and the
//! per-run provisioning outcome.

pub mod outcome;
pub mod payload;

pub use outcome::{EntityResult, Outcome, ProvisioningResult, Stage, ToggleState};
pub use payload::{CollectorResponse, FileVaultPayload, LogPayload, Payload, SUCCESS_STATUS};
