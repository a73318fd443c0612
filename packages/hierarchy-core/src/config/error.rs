//! Configuration error types

use thiserror::Error;

/// Suggestions further away than this are replaced by the list of valid fields
const MAX_SUGGESTION_DISTANCE: usize = 3;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// Value outside of its accepted range
    #[error("Invalid value {value} for '{field}': expected {min}..={max}. {hint}")]
    Range {
        field: &'static str,
        value: String,
        min: String,
        max: String,
        hint: &'static str,
    },

    #[error("Unknown field '{field}' in '{section}'. {suggestion}")]
    UnknownField {
        field: String,
        section: String,
        suggestion: String,
    },

    /// Mapping key that is not a string, e.g. `1: foo`
    #[error("Non-string key in '{section}'")]
    NonStringKey { section: String },

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

impl ConfigError {
    pub fn range_with_hint(
        field: &'static str,
        value: impl ToString,
        min: impl ToString,
        max: impl ToString,
        hint: &'static str,
    ) -> Self {
        Self::Range {
            field,
            value: value.to_string(),
            min: min.to_string(),
            max: max.to_string(),
            hint,
        }
    }

    pub fn unknown_field(field: &str, section: &str, valid: &[&str]) -> Self {
        Self::UnknownField {
            field: field.to_string(),
            section: section.to_string(),
            suggestion: suggest(field, valid),
        }
    }
}

fn suggest(field: &str, valid: &[&str]) -> String {
    let closest = valid
        .iter()
        .map(|candidate| (edit_distance(field, candidate), *candidate))
        .min();
    match closest {
        Some((distance, candidate)) if distance <= MAX_SUGGESTION_DISTANCE => {
            format!("Did you mean '{}'?", candidate)
        }
        _ if valid.is_empty() => "This section takes no fields".to_string(),
        _ => format!("Valid fields: {}", valid.join(", ")),
    }
}

/// Levenshtein distance over chars
fn edit_distance(lhs: &str, rhs: &str) -> usize {
    let rhs: Vec<char> = rhs.chars().collect();
    let mut row: Vec<usize> = (0..=rhs.len()).collect();
    for (i, l) in lhs.chars().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, r) in rhs.iter().enumerate() {
            let substitution = diagonal + usize::from(l != *r);
            diagonal = row[j + 1];
            row[j + 1] = substitution.min(row[j] + 1).min(row[j + 1] + 1);
        }
    }
    row[rhs.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edit_distance() {
        assert_eq!(edit_distance("kitten", "sitting"), 3);
        assert_eq!(edit_distance("cache_size", "cache_size"), 0);
        assert_eq!(edit_distance("", "abc"), 3);
    }

    #[test]
    fn test_suggestion() {
        let valid = ["query_concurrency", "cache_size", "localized_strings"];
        assert_eq!(suggest("cache_sise", &valid), "Did you mean 'cache_size'?");
        assert_eq!(
            suggest("completely_different", &valid),
            "Valid fields: query_concurrency, cache_size, localized_strings"
        );
    }

    #[test]
    fn test_range_message_carries_hint() {
        let msg = ConfigError::range_with_hint(
            "query_concurrency",
            0,
            1,
            usize::MAX,
            "At least one query must be allowed to run",
        )
        .to_string();
        assert!(msg.contains("query_concurrency"));
        assert!(msg.contains("At least one query"));
    }
}
