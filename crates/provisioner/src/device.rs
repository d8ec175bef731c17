//! Facts about the machine and the deployment bundle for one run.

use crate::commands;
use crate::executor::CommandRunner;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::warn;

/// Name of the tool's own source checkout; cleanup refuses to run inside it.
pub const PROJECT_NAME: &str = "macdeploy";
/// Directory holding packages, disk images, scripts and app bundles.
pub const DIST_DIRECTORY: &str = "dist";
/// Archive the bundle was shipped in.
pub const ARCHIVE_FILE: &str = "deploy.zip";
/// Serial used when discovery fails. Collector sends are suppressed for it.
pub const UNKNOWN_SERIAL: &str = "UNKNOWN";

#[derive(Debug, Clone)]
pub struct Metadata {
    pub serial_tag: String,
    pub project_name: String,
    /// Relative to the working directory unless absolute.
    pub dist_directory: PathBuf,
    pub archive_file: String,
    pub home: PathBuf,
    pub users_directory: PathBuf,
    pub applications_directory: PathBuf,
}

impl Metadata {
    pub fn new(serial_tag: impl Into<String>) -> Self {
        Self {
            serial_tag: serial_tag.into(),
            project_name: PROJECT_NAME.to_string(),
            dist_directory: PathBuf::from(DIST_DIRECTORY),
            archive_file: ARCHIVE_FILE.to_string(),
            home: std::env::var_os("HOME").map(PathBuf::from).unwrap_or_default(),
            users_directory: PathBuf::from("/Users"),
            applications_directory: PathBuf::from("/Applications"),
        }
    }

    /// False when the serial could not be discovered.
    pub fn has_serial(&self) -> bool {
        self.serial_tag != UNKNOWN_SERIAL
    }

    /// Lowercased names cleanup may delete from the working directory.
    pub fn cleanup_targets(&self) -> BTreeSet<String> {
        let mut targets = BTreeSet::new();
        if let Some(name) = self.dist_directory.file_name() {
            targets.insert(name.to_string_lossy().to_lowercase());
        }
        targets.insert(self.archive_file.to_lowercase());
        targets
    }
}

/// Extract the serial from an `IOPlatformSerialNumber` line of `ioreg -l`.
pub fn parse_serial_tag(output: &str) -> Option<String> {
    let line = output
        .lines()
        .find(|l| l.contains("IOPlatformSerialNumber"))?;
    let segments: Vec<&str> = line.split('"').collect();
    if segments.len() < 5 {
        return None;
    }
    let serial = segments[segments.len() - 2].trim();
    if serial.is_empty() {
        None
    } else {
        Some(serial.to_string())
    }
}

/// Query the hardware serial, falling back to [`UNKNOWN_SERIAL`].
pub async fn read_serial_tag(runner: &dyn CommandRunner) -> String {
    match runner.run(&commands::serial_number()).await {
        Ok(output) if output.success() => match parse_serial_tag(&output.stdout) {
            Some(serial) => serial,
            None => {
                warn!("Could not parse the serial number from ioreg output");
                UNKNOWN_SERIAL.to_string()
            }
        },
        Ok(output) => {
            warn!("Serial number lookup failed: {}", output.combined());
            UNKNOWN_SERIAL.to_string()
        }
        Err(e) => {
            warn!("Serial number lookup failed: {}", e);
            UNKNOWN_SERIAL.to_string()
        }
    }
}
