//! Normalization applied at every comparison and lookup site.
//!
//! Stored values keep the spelling they were entered with; these helpers
//! produce the key used whenever two values are compared.

/// Owner names compare case-insensitively and ignore a leading `@`.
pub fn normalize_owner(raw: &str) -> String {
    raw.trim().trim_start_matches('@').trim().to_lowercase()
}

/// Aliases follow the same rules as owner names.
pub fn normalize_alias(raw: &str) -> String {
    normalize_owner(raw)
}

/// Numbers compare on their digits only.
pub fn normalize_number(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}
