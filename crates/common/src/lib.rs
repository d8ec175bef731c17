//! Common utilities and types shared across macdeploy crates.

pub mod arch;
pub mod error;
pub mod timestamp;

pub use arch::Architecture;
pub use error::{Error, Result, Rollback};
pub use timestamp::Timestamp;
