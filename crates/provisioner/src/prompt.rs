//! Interactive operator input.

use macdeploy_common::{Error, Result};
use std::io::{self, BufRead, Write};

/// Source of operator answers. Implementations return the answer trimmed;
/// end of input yields an empty answer.
pub trait Prompter: Send + Sync {
    fn ask(&self, message: &str) -> Result<String>;
}

/// Reads answers from the controlling terminal's stdin.
pub struct StdinPrompter;

impl Prompter for StdinPrompter {
    fn ask(&self, message: &str) -> Result<String> {
        let mut stdout = io::stdout().lock();
        stdout
            .write_all(message.as_bytes())
            .and_then(|_| stdout.flush())
            .map_err(|e| Error::Prompt(e.to_string()))?;
        drop(stdout);

        let mut line = String::new();
        io::stdin()
            .lock()
            .read_line(&mut line)
            .map_err(|e| Error::Prompt(e.to_string()))?;
        Ok(line.trim().to_string())
    }
}

/// Ask a yes/no question until the answer is `y`, `n` or blank (no).
pub fn confirm(prompter: &dyn Prompter, message: &str) -> Result<bool> {
    loop {
        let answer = prompter.ask(message)?.to_lowercase();
        match answer.as_str() {
            "y" | "yes" => return Ok(true),
            "" | "n" | "no" => return Ok(false),
            other => println!("Invalid answer {:?}, expected y or n", other),
        }
    }
}
