//! Input bounds shared by the server and the client.
//!
//! The server rejects requests that violate these bounds before any store
//! transaction starts; the client uses the same checks to fail fast.

use thiserror::Error;

/// Maximum task title length in characters.
pub const MAX_TASK_TITLE_LENGTH: usize = 200;

/// Maximum task description length in characters.
pub const MAX_TASK_DESCRIPTION_LENGTH: usize = 1000;

/// Maximum project name length in characters.
pub const MAX_PROJECT_NAME_LENGTH: usize = 100;

/// Maximum project description length in characters.
pub const MAX_PROJECT_DESCRIPTION_LENGTH: usize = 500;

/// Minimum password length in characters.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Maximum display name length in characters.
pub const MAX_DISPLAY_NAME_LENGTH: usize = 100;

/// Malformed request input.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A required text field is empty or whitespace only.
    #[error("{field} must not be empty")]
    Empty {
        /// Field name as it appears on the wire.
        field: &'static str,
    },
    /// A text field exceeds its maximum length.
    #[error("{field} must be at most {max} characters")]
    TooLong {
        /// Field name as it appears on the wire.
        field: &'static str,
        /// Maximum allowed length in characters.
        max: usize,
    },
    /// The password is shorter than [`MIN_PASSWORD_LENGTH`].
    #[error("password must be at least {MIN_PASSWORD_LENGTH} characters")]
    PasswordTooShort,
    /// The email address is not of the form `local@domain`.
    #[error("email must be a valid email address")]
    InvalidEmail,
}

/// Checks that `value` is non-blank and at most `max` characters.
///
/// # Errors
///
/// Returns [`ValidationError::Empty`] or [`ValidationError::TooLong`].
pub fn require_text(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Empty { field });
    }
    limit_text(field, value, max)
}

/// Checks that `value` is at most `max` characters. Empty is allowed.
///
/// # Errors
///
/// Returns [`ValidationError::TooLong`].
pub fn limit_text(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(())
}

/// Checks an email address for a non-empty local part and domain.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidEmail`].
pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain))
            if !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !email.contains(char::is_whitespace) =>
        {
            Ok(())
        }
        _ => Err(ValidationError::InvalidEmail),
    }
}

/// Checks the minimum password length.
///
/// # Errors
///
/// Returns [`ValidationError::PasswordTooShort`].
pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::PasswordTooShort);
    }
    Ok(())
}
