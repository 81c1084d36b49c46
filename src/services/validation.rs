//! Field-level input validation shared by the services

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is valid")
});

/// One violated rule on one input field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }

    pub(crate) fn blank(field: &str) -> Self {
        Self::new(field, format!("{} can't be blank", field))
    }
}

/// Whether `email` has the shape `local@domain.tld`
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Treat an empty string as "not supplied".
///
/// Optional fields arriving from forms are sent as `""` when left untouched.
pub fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Push a blank-field error when `value` is empty or only whitespace
pub(crate) fn require(errors: &mut Vec<FieldError>, field: &str, value: &str) {
    if value.trim().is_empty() {
        errors.push(FieldError::blank(field));
    }
}

/// Require a non-blank, well-formed email
pub(crate) fn require_email(errors: &mut Vec<FieldError>, value: &str) {
    if value.trim().is_empty() {
        errors.push(FieldError::blank("email"));
    } else if !is_valid_email(value) {
        errors.push(FieldError::new("email", "email is invalid"));
    }
}
