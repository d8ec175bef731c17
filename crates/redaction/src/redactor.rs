//! Main redactor implementation.

use crate::patterns;
use crate::{MIN_LITERAL_SECRET_LEN, REDACTED_PLACEHOLDER};
use regex::{Captures, Regex};
use tracing::trace;

/// Result of redaction.
#[derive(Debug)]
pub struct RedactionResult {
    /// The redacted content.
    pub content: String,
    /// Statistics about what was redacted.
    pub stats: RedactionStats,
}

/// Statistics about redactions performed.
#[derive(Debug, Default, Clone)]
pub struct RedactionStats {
    /// Number of literal secret replacements.
    pub literal_redactions: usize,
    /// Number of pattern-based redactions.
    pub pattern_redactions: usize,
    /// Names of patterns that matched.
    pub matched_patterns: Vec<String>,
}

impl RedactionStats {
    /// Total number of redactions.
    pub fn total(&self) -> usize {
        self.literal_redactions + self.pattern_redactions
    }
}

/// Masks known secrets and password-shaped arguments.
#[derive(Debug, Clone, Default)]
pub struct Redactor {
    secrets: Vec<String>,
}

impl Redactor {
    /// Create a redactor that only applies the built-in patterns.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a redactor that also masks the given literal values.
    pub fn with_secrets<I, S>(secrets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut redactor = Self::new();
        for secret in secrets {
            redactor.register_secret(secret);
        }
        redactor
    }

    /// Register a literal value that must never appear in output.
    pub fn register_secret(&mut self, secret: impl Into<String>) {
        let secret = secret.into();
        if secret.len() < MIN_LITERAL_SECRET_LEN || self.secrets.contains(&secret) {
            return;
        }
        self.secrets.push(secret);
        // Longest first so a secret that contains another is masked whole.
        self.secrets.sort_by_key(|s| std::cmp::Reverse(s.len()));
    }

    /// Number of registered literal secrets.
    pub fn secret_count(&self) -> usize {
        self.secrets.len()
    }

    /// Redact sensitive content from a string.
    pub fn redact(&self, content: &str) -> RedactionResult {
        let mut stats = RedactionStats::default();
        let mut result = content.to_string();

        for secret in &self.secrets {
            let hits = result.matches(secret.as_str()).count();
            if hits > 0 {
                result = result.replace(secret.as_str(), REDACTED_PLACEHOLDER);
                stats.literal_redactions += hits;
            }
        }

        for (name, pattern) in patterns::all_redaction_patterns() {
            let before = stats.pattern_redactions;
            result = apply_pattern_redaction(&result, pattern, &mut stats);
            if stats.pattern_redactions != before {
                stats.matched_patterns.push(name.to_string());
            }
        }

        RedactionResult {
            content: result,
            stats,
        }
    }

    /// Shorthand for callers that only need the masked text.
    pub fn redact_str(&self, content: &str) -> String {
        self.redact(content).content
    }
}

/// Keep capture group 1, replace the rest of each match.
fn apply_pattern_redaction(content: &str, pattern: &Regex, stats: &mut RedactionStats) -> String {
    pattern
        .replace_all(content, |caps: &Captures| {
            let whole = &caps[0];
            let keep = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            if whole.ends_with(REDACTED_PLACEHOLDER) {
                return whole.to_string();
            }
            stats.pattern_redactions += 1;
            trace!("Redacted pattern match of {} chars", whole.len());
            format!("{} {}", keep.trim_end(), REDACTED_PLACEHOLDER)
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_redact_secure_token_command() {
        let redactor = Redactor::new();
        let result = redactor.redact(
            "sysadminctl -secureTokenOn 'john.smith' -password 'pw123' -adminUser 'admin' -adminPassword 'adm!n'",
        );
        assert_eq!(
            result.content,
            "sysadminctl -secureTokenOn 'john.smith' -password [REDACTED] -adminUser 'admin' -adminPassword [REDACTED]"
        );
        assert_eq!(result.stats.pattern_redactions, 2);
    }

    #[test]
    fn test_literal_secret_is_masked_everywhere() {
        let redactor = Redactor::with_secrets(["hunter22"]);
        let result = redactor.redact("bash -c script john john.smith hunter22 false");
        assert_eq!(result.content, "bash -c script john john.smith [REDACTED] false");
        assert_eq!(result.stats.literal_redactions, 1);
    }

    #[test]
    fn test_short_secrets_are_ignored() {
        let mut redactor = Redactor::new();
        redactor.register_secret("ab");
        redactor.register_secret("abc");
        redactor.register_secret("abc");
        assert_eq!(redactor.secret_count(), 1);
    }

    #[test]
    fn test_longer_secret_wins() {
        let redactor = Redactor::with_secrets(["pass", "password1"]);
        assert_eq!(redactor.redact_str("x password1 y"), "x [REDACTED] y");
    }

    #[test]
    fn test_filevault_key_passes_through() {
        let redactor = Redactor::with_secrets(["adminpw"]);
        let line = "Generated FileVault key ABCD-EFGH-IJKL-MNOP-QRST-UVWX";
        let result = redactor.redact(line);
        assert_eq!(result.content, line);
        assert_eq!(result.stats.total(), 0);
    }

    #[test]
    fn test_literal_and_flag_redaction_combine() {
        let redactor = Redactor::with_secrets(["s3cret!"]);
        let result = redactor.redact("sysadminctl -password 's3cret!'");
        assert!(!result.content.contains("s3cret!"));
        assert_eq!(result.stats.total(), 2);
    }
}
