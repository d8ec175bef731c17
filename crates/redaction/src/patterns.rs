//! Regex patterns for credentials that show up in macOS provisioning commands.

use regex::Regex;
use std::sync::LazyLock;

/// `sysadminctl -password <pw>` / `-adminPassword <pw>` and `dscl ... -passwd <pw>`.
/// Group 1 is the flag, group 2 the value.
pub static PASSWORD_FLAG_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(-(?:admin)?password|-passwd)\s+('[^']*'|"[^"]*"|\S+)"#).unwrap()
});

/// Here-strings used to feed a password to `sudo -S` or `fdesetup`.
pub static HERE_STRING_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(<<<)\s*('[^']*'|"[^"]*"|\S+)"#).unwrap());

/// JSON keys that hold a password.
pub static JSON_PASSWORD_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)("(?:admin_?)?password"\s*:\s*)"[^"]*""#).unwrap()
});

/// YAML keys that hold a password.
pub static YAML_PASSWORD_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^(\s*password:)\s*\S.*$").unwrap());

/// All patterns that should trigger redaction. Every pattern keeps group 1
/// and replaces the remainder of the match.
pub fn all_redaction_patterns() -> Vec<(&'static str, &'static Regex)> {
    vec![
        ("password_flag", &PASSWORD_FLAG_PATTERN),
        ("here_string", &HERE_STRING_PATTERN),
        ("json_password", &JSON_PASSWORD_PATTERN),
        ("yaml_password", &YAML_PASSWORD_PATTERN),
    ]
}
