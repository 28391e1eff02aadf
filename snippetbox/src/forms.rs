//! Form decoding and the forms posted by the application
//!
//! Decoding happens before validation: a body that cannot be turned into the
//! target struct is a client error (400), while a struct that cannot be decoded
//! from a form at all is a programmer error and stops the process.

use crate::error::AppError;
use crate::validation::{self, Validator, EMAIL_RX};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Permitted snippet lifetimes in days
pub const PERMITTED_EXPIRES: [i64; 3] = [1, 7, 365];

/// Minimum password length for signup and password changes
pub const MIN_PASSWORD_CHARS: usize = 8;

/// Form decoding failure
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The submitted body does not fit the form: missing field, bad integer,
    /// duplicate key
    #[error("malformed form: {0}")]
    Malformed(String),

    /// The target type cannot be populated from form data at all
    #[error("type `{target}` cannot be decoded from a form: {reason}")]
    InvalidTarget {
        /// Rust type name of the target
        target: &'static str,
        /// Decoder message
        reason: String,
    },
}

/// Decode an `application/x-www-form-urlencoded` body into `T`
///
/// # Errors
///
/// [`DecodeError::InvalidTarget`] when `T` is not shaped like a form (the
/// decoder reports a type mismatch against the map or one of the fields), and
/// [`DecodeError::Malformed`] for everything caused by the submitted data.
pub fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, DecodeError> {
    serde_urlencoded::from_bytes::<T>(body).map_err(|err| {
        let reason = err.to_string();
        // Form values are always strings, so a type mismatch can only come from
        // the declaration of `T`, never from user input.
        if reason.starts_with("invalid type:") {
            DecodeError::InvalidTarget {
                target: std::any::type_name::<T>(),
                reason,
            }
        } else {
            DecodeError::Malformed(reason)
        }
    })
}

/// Decode a POST body for a handler
///
/// Malformed input becomes a 400. A mis-declared form type aborts the process.
///
/// # Errors
///
/// Returns [`AppError::Client`] when the body is malformed.
pub fn decode_post_form<T: DeserializeOwned>(body: &[u8]) -> Result<T, AppError> {
    match decode(body) {
        Ok(form) => Ok(form),
        Err(DecodeError::Malformed(reason)) => {
            tracing::debug!(%reason, "rejecting undecodable form");
            Err(AppError::Client(http::StatusCode::BAD_REQUEST))
        }
        Err(err @ DecodeError::InvalidTarget { .. }) => invalid_target(&err),
    }
}

#[cold]
fn invalid_target(err: &DecodeError) -> ! {
    tracing::error!(error = %err, "form type is not decodable, aborting");
    std::process::abort()
}

/// Snippet creation form
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SnippetCreateForm {
    /// Snippet title
    pub title: String,
    /// Snippet body
    pub content: String,
    /// Lifetime in days
    pub expires: i64,
    /// Accumulated errors
    #[serde(skip_deserializing)]
    pub validator: Validator,
}

impl Default for SnippetCreateForm {
    fn default() -> Self {
        Self {
            title: String::new(),
            content: String::new(),
            expires: 365,
            validator: Validator::default(),
        }
    }
}

impl SnippetCreateForm {
    /// Run the field checks
    pub fn validate(&mut self) {
        let v = &mut self.validator;
        v.check_field(
            validation::not_blank(&self.title),
            "title",
            "This field cannot be blank",
        );
        v.check_field(
            validation::max_chars(&self.title, 100),
            "title",
            "This field cannot be more than 100 characters long",
        );
        v.check_field(
            validation::not_blank(&self.content),
            "content",
            "This field cannot be blank",
        );
        v.check_field(
            validation::permitted_value(&self.expires, &PERMITTED_EXPIRES),
            "expires",
            "This field must equal 1, 7 or 365",
        );
    }
}

/// Account signup form
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct UserSignupForm {
    /// Display name
    pub name: String,
    /// Login email
    pub email: String,
    /// Plain-text password, never rendered back
    #[serde(skip_serializing)]
    pub password: String,
    /// Accumulated errors
    #[serde(skip_deserializing)]
    pub validator: Validator,
}

impl UserSignupForm {
    /// Run the field checks
    pub fn validate(&mut self) {
        let v = &mut self.validator;
        v.check_field(
            validation::not_blank(&self.name),
            "name",
            "This field cannot be blank",
        );
        v.check_field(
            validation::not_blank(&self.email),
            "email",
            "This field cannot be blank",
        );
        v.check_field(
            validation::matches(&self.email, &EMAIL_RX),
            "email",
            "This field must be a valid email address",
        );
        v.check_field(
            validation::not_blank(&self.password),
            "password",
            "This field cannot be blank",
        );
        v.check_field(
            validation::min_chars(&self.password, MIN_PASSWORD_CHARS),
            "password",
            "This field must be at least 8 characters long",
        );
    }
}

/// Login form
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct UserLoginForm {
    /// Login email
    pub email: String,
    /// Plain-text password, never rendered back
    #[serde(skip_serializing)]
    pub password: String,
    /// Accumulated errors
    #[serde(skip_deserializing)]
    pub validator: Validator,
}

impl UserLoginForm {
    /// Run the field checks
    pub fn validate(&mut self) {
        let v = &mut self.validator;
        v.check_field(
            validation::not_blank(&self.email),
            "email",
            "This field cannot be blank",
        );
        v.check_field(
            validation::matches(&self.email, &EMAIL_RX),
            "email",
            "This field must be a valid email address",
        );
        v.check_field(
            validation::not_blank(&self.password),
            "password",
            "This field cannot be blank",
        );
    }
}

/// Password change form
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AccountPasswordUpdateForm {
    /// Password the user has now
    #[serde(rename = "currentPassword", skip_serializing)]
    pub current_password: String,
    /// Replacement password
    #[serde(rename = "newPassword", skip_serializing)]
    pub new_password: String,
    /// Replacement password, typed again
    #[serde(rename = "newPasswordConfirmation", skip_serializing)]
    pub new_password_confirmation: String,
    /// Accumulated errors
    #[serde(skip_deserializing)]
    pub validator: Validator,
}

impl AccountPasswordUpdateForm {
    /// Run the field checks
    pub fn validate(&mut self) {
        let v = &mut self.validator;
        v.check_field(
            validation::not_blank(&self.current_password),
            "currentPassword",
            "This field cannot be blank",
        );
        v.check_field(
            validation::not_blank(&self.new_password),
            "newPassword",
            "This field cannot be blank",
        );
        v.check_field(
            validation::min_chars(&self.new_password, MIN_PASSWORD_CHARS),
            "newPassword",
            "This field must be at least 8 characters long",
        );
        v.check_field(
            validation::not_blank(&self.new_password_confirmation),
            "newPasswordConfirmation",
            "This field cannot be blank",
        );
        v.check_field(
            self.new_password == self.new_password_confirmation,
            "newPasswordConfirmation",
            "Passwords do not match",
        );
    }
}
