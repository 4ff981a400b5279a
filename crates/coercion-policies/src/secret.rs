/// Whole-word, case-insensitive secret-indicating patterns.
const SECRET_PATTERNS: &[&str] = &["password", "passwd", "secret", "token", "key", "signing", "credential", "auth"];

/// One field of a plugin's declared Request/Response schema. Rust has no
/// runtime reflection over an arbitrary value's fields, so plugins here
/// declare their schema explicitly as a list of named fields instead of a
/// prototype struct.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SchemaField {
    pub name: String,
    /// Explicit `secure` annotation: exempts a field whose name would
    /// otherwise match a secret pattern.
    pub secure: bool,
}

impl SchemaField {
    pub fn plain(name: impl Into<String>) -> Self {
        Self { name: name.into(), secure: false }
    }

    pub fn secure(name: impl Into<String>) -> Self {
        Self { name: name.into(), secure: true }
    }
}

/// A plugin's Request or Response schema: an ordered list of fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Schema(pub Vec<SchemaField>);

impl Schema {
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Returns the first field name that looks secret but is not annotated
    /// `secure`.
    pub fn first_unmarked_secret(&self) -> Option<&str> {
        self.0.iter().find(|f| !f.secure && is_secret_field_name(&f.name)).map(|f| f.name.as_str())
    }
}

/// Whole-word match against the secret pattern list, case-insensitive. "whole
/// word" here means the pattern must appear as a delimited token within the
/// field name when split on common separators (`_`, `-`, camelCase
/// boundaries), so `api_key` matches `key` but `keyboard` does not.
pub fn is_secret_field_name(name: &str) -> bool {
    let words = split_identifier_words(name);
    words.iter().any(|w| SECRET_PATTERNS.iter().any(|p| w.eq_ignore_ascii_case(p)))
}

fn split_identifier_words(name: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for ch in name.chars() {
        if ch == '_' || ch == '-' || ch == ' ' {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if ch.is_uppercase() && prev_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        prev_lower = ch.is_lowercase();
        current.push(ch);
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_exact_and_case_insensitive() {
        assert!(is_secret_field_name("password"));
        assert!(is_secret_field_name("Password"));
        assert!(is_secret_field_name("API_KEY"));
        assert!(is_secret_field_name("signingSecret"));
    }

    #[test]
    fn does_not_match_substrings_inside_a_word() {
        assert!(!is_secret_field_name("keyboard"));
        assert!(!is_secret_field_name("monkey"));
    }

    #[test]
    fn schema_flags_first_unmarked_secret() {
        let schema = Schema(vec![SchemaField::plain("plan_id"), SchemaField::plain("api_token"), SchemaField::secure("signing_key")]);
        assert_eq!(schema.first_unmarked_secret(), Some("api_token"));
    }

    #[test]
    fn secure_annotation_exempts_a_field() {
        let schema = Schema(vec![SchemaField::secure("password")]);
        assert_eq!(schema.first_unmarked_secret(), None);
    }
}
