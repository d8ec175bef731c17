//! Account name normalisation.

/// Characters macOS refuses in account short names.
const ILLEGAL_ACCOUNT_CHARS: &[char] = &['/', ';', ',', '\\', '=', '%', ':', '\n'];

/// Derive the account short name from a display name: lowercased, illegal
/// characters stripped, whitespace runs collapsed and joined with `.`.
///
/// `"  John   Smith "` becomes `john.smith`.
pub fn format_account_name(display_name: &str) -> String {
    let cleaned: String = display_name
        .to_lowercase()
        .chars()
        .filter(|c| !ILLEGAL_ACCOUNT_CHARS.contains(c))
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(".")
}

/// Normalise an operator-typed username: lowercase, keep only
/// `[a-z0-9_.-]`, drop leading dots. A name without any letter is prefixed
/// with `a` since macOS rejects all-numeric short names.
pub fn format_username(raw: &str) -> String {
    let kept: String = raw
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '.' | '-'))
        .collect();
    let trimmed = kept.trim_start_matches('.');
    if trimmed.is_empty() {
        return String::new();
    }
    if trimmed.chars().any(|c| c.is_ascii_lowercase()) {
        trimmed.to_string()
    } else {
        format!("a{}", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_name_collapses_whitespace() {
        assert_eq!(format_account_name("  John   Smith "), "john.smith");
        assert_eq!(format_account_name("Mary\tAnn  Lee"), "mary.ann.lee");
        assert_eq!(format_account_name("single"), "single");
    }

    #[test]
    fn test_account_name_strips_illegal_characters() {
        assert_eq!(format_account_name("Jo/hn; Sm,ith=%"), "john.smith");
        assert_eq!(format_account_name(" / "), "");
    }

    #[test]
    fn test_username_normalisation() {
        let cases = [
            ("...john ..-doe", "john..-doe"),
            ("12345!@#67%$#8*&^(9[]{}0", "a1234567890"),
            ("-...-!!/\\", "a-...-"),
            ("....a", "a"),
            ("..-a!!;'", "-a"),
            (".-ab", "-ab"),
            (
                "!@#$%^&*()lebron.   !~`:\"?<>,;'|\\{[]]}james!!++==",
                "lebron.james",
            ),
            ("sold!@ier_   //fro   m-tf??<>:\\.\\2", "soldier_from-tf.2"),
        ];
        for (input, expected) in cases {
            assert_eq!(format_username(input), expected, "input {:?}", input);
        }
    }

    #[test]
    fn test_username_empty_after_filtering() {
        assert_eq!(format_username(""), "");
        assert_eq!(format_username("!!!..."), "");
    }
}
