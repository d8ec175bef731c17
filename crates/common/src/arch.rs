//! CPU architecture of the machine being provisioned.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Host CPU architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    Arm64,
    X86_64,
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Architecture::Arm64 => write!(f, "arm64"),
            Architecture::X86_64 => write!(f, "x86_64"),
        }
    }
}

impl FromStr for Architecture {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "arm64" | "aarch64" => Ok(Architecture::Arm64),
            "x86_64" | "amd64" => Ok(Architecture::X86_64),
            _ => Err(crate::Error::Config(format!("unsupported architecture: {}", s))),
        }
    }
}

impl Architecture {
    /// Architecture this binary was compiled for.
    pub fn current() -> Self {
        if cfg!(target_arch = "aarch64") {
            Architecture::Arm64
        } else {
            Architecture::X86_64
        }
    }

    /// Intel binaries run natively; Apple silicon needs the Rosetta translation layer.
    pub fn needs_rosetta(&self) -> bool {
        matches!(self, Architecture::Arm64)
    }
}
