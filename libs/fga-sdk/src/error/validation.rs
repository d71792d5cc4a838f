//! Field/value extraction from validation error messages.

use std::sync::LazyLock;

use regex::Regex;

/// Offending field (and value, when the server quotes it) of a `400`/`422`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationDetails {
    pub invalid_field: Option<String>,
    pub invalid_value: Option<String>,
}

impl ValidationDetails {
    fn field(field: &str) -> Self {
        Self {
            invalid_field: Some(field.to_owned()),
            invalid_value: None,
        }
    }

    fn field_value(field: &str, value: &str) -> Self {
        Self {
            invalid_field: Some(field.to_owned()),
            invalid_value: Some(value.to_owned()),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.invalid_field.is_none() && self.invalid_value.is_none()
    }
}

#[allow(clippy::expect_used)] // good regex, it doesn't panic
static RELATION_NOT_FOUND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"relation '([^']+)' not found").expect("static regex should not panic")
});
#[allow(clippy::expect_used)] // good regex, it doesn't panic
static TYPE_NOT_FOUND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"type '([^']+)' not found").expect("static regex should not panic")
});
/// `invalid CheckRequestTupleKey.User: value does not match regex`
#[allow(clippy::expect_used)] // good regex, it doesn't panic
static QUALIFIED_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"invalid \w+\.(\w+):").expect("static regex should not panic")
});
#[allow(clippy::expect_used)] // good regex, it doesn't panic
static MUST_NOT_BE_EMPTY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"'?(\w+)'? must not be empty").expect("static regex should not panic")
});

/// Try the known message shapes in order; the first one found anywhere in
/// the message wins.
pub(crate) fn extract(message: &str) -> ValidationDetails {
    quoted_not_found(&RELATION_NOT_FOUND, message, "relation")
        .or_else(|| quoted_not_found(&TYPE_NOT_FOUND, message, "type"))
        .or_else(|| field_only(&QUALIFIED_FIELD, message))
        .or_else(|| field_only(&MUST_NOT_BE_EMPTY, message))
        .unwrap_or_default()
}

fn quoted_not_found(re: &Regex, message: &str, field: &str) -> Option<ValidationDetails> {
    let value = re.captures(message)?.get(1)?;
    Some(ValidationDetails::field_value(field, value.as_str()))
}

fn field_only(re: &Regex, message: &str) -> Option<ValidationDetails> {
    let field = re.captures(message)?.get(1)?;
    Some(ValidationDetails::field(field.as_str()))
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn relation_not_found() {
        let details = extract("relation 'document#viewer' not found");
        assert_eq!(details, ValidationDetails::field_value("relation", "document#viewer"));
    }

    #[test]
    fn type_not_found() {
        let details = extract("type 'user' not found");
        assert_eq!(details, ValidationDetails::field_value("type", "user"));
    }

    #[test]
    fn relation_wins_over_type() {
        let details = extract("relation 'viewer' not found for type 'doc'");
        assert_eq!(details.invalid_field.as_deref(), Some("relation"));
        assert_eq!(details.invalid_value.as_deref(), Some("viewer"));
    }

    #[test]
    fn qualified_field_names() {
        let details = extract("invalid CheckRequestTupleKey.User: value does not match regex pattern");
        assert_eq!(details, ValidationDetails::field("User"));

        let details = extract("invalid TupleKey.Object: value length must be at most 256");
        assert_eq!(details, ValidationDetails::field("Object"));
    }

    #[test]
    fn later_occurrence_is_found() {
        let details = extract("type 'document' is valid but type 'user' not found");
        assert_eq!(details, ValidationDetails::field_value("type", "user"));

        let details = extract("invalid request: invalid TupleKey.Object: value too long");
        assert_eq!(details, ValidationDetails::field("Object"));
    }

    #[test]
    fn must_not_be_empty_takes_preceding_word() {
        assert_eq!(extract("object must not be empty"), ValidationDetails::field("object"));
        assert_eq!(
            extract("invalid request: 'user' must not be empty"),
            ValidationDetails::field("user")
        );
    }

    #[test]
    fn unknown_messages_yield_nothing() {
        for message in ["", "something went wrong", "type '' not found", "invalid request: nope"] {
            assert!(extract(message).is_empty(), "message {message:?}");
        }
    }
}
