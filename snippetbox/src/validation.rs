//! Form validation
//!
//! [`Validator`] accumulates field-keyed and general error messages for one
//! form submission. The free functions are pure predicates over already
//! decoded values.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;

/// Email shape check used by the signup and login forms.
pub static EMAIL_RX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
    )
    .unwrap_or_else(|err| unreachable!("email pattern is a valid regex: {err}"))
});

/// Error accumulator embedded in every form
///
/// The first error recorded for a field wins; later errors for the same field
/// are dropped. General errors keep their insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Validator {
    /// Errors keyed by form field name
    pub field_errors: BTreeMap<String, String>,
    /// Errors not tied to a single field
    pub non_field_errors: Vec<String>,
}

impl Validator {
    /// True when no error of either kind has been recorded
    #[must_use]
    pub fn valid(&self) -> bool {
        self.field_errors.is_empty() && self.non_field_errors.is_empty()
    }

    /// Record an error for `key` unless that field already has one
    pub fn add_field_error(&mut self, key: impl Into<String>, message: impl Into<String>) {
        self.field_errors
            .entry(key.into())
            .or_insert_with(|| message.into());
    }

    /// Record an error that applies to the form as a whole
    pub fn add_non_field_error(&mut self, message: impl Into<String>) {
        self.non_field_errors.push(message.into());
    }

    /// Record `message` against `key` when `ok` is false
    pub fn check_field(&mut self, ok: bool, key: &str, message: &str) {
        if !ok {
            self.add_field_error(key, message);
        }
    }

    /// Error message for `key`, if any
    #[must_use]
    pub fn field_error(&self, key: &str) -> Option<&str> {
        self.field_errors.get(key).map(String::as_str)
    }
}

/// Value contains at least one non-whitespace character
#[must_use]
pub fn not_blank(value: &str) -> bool {
    !value.trim().is_empty()
}

/// Value has at most `n` characters (not bytes)
#[must_use]
pub fn max_chars(value: &str, n: usize) -> bool {
    value.chars().count() <= n
}

/// Value has at least `n` characters (not bytes)
#[must_use]
pub fn min_chars(value: &str, n: usize) -> bool {
    value.chars().count() >= n
}

/// Value matches the given pattern
#[must_use]
pub fn matches(value: &str, rx: &Regex) -> bool {
    rx.is_match(value)
}

/// Value is one of `permitted`
#[must_use]
pub fn permitted_value<T: PartialEq>(value: &T, permitted: &[T]) -> bool {
    permitted.contains(value)
}
