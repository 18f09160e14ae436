use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::models::{LoginRequest, SetupRequest, WaitlistRequest};

// Local part may not start with a dot or contain "..", checked separately (no lookahead).
static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[a-z0-9_'+\-.]*[a-z0-9_+\-]@([a-z0-9][a-z0-9\-]*\.)+[a-z]{2,}$")
        .expect("email pattern is valid")
});

const FULL_NAME_MIN: usize = 2;
const FULL_NAME_MAX: usize = 100;
const EMAIL_MAX: usize = 255;
const USERNAME_MIN: usize = 3;
const PASSWORD_MIN: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

/// Every field-level problem found in one submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationError {
    pub errors: Vec<FieldError>,
}

impl ValidationError {
    fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.errors.push(FieldError {
            field,
            message: message.into(),
        });
    }

    fn into_result<T>(self, value: T) -> Result<T, Self> {
        if self.errors.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }

    #[cfg(test)]
    pub fn has_field(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

impl std::error::Error for ValidationError {}

/// A waitlist submission that passed validation. Both fields are trimmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewWaitlistEntry {
    pub full_name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

pub fn is_valid_email(email: &str) -> bool {
    let local = email.split('@').next().unwrap_or("");
    EMAIL_RE.is_match(email) && !local.starts_with('.') && !local.contains("..")
}

pub fn validate_waitlist(req: WaitlistRequest) -> Result<NewWaitlistEntry, ValidationError> {
    let mut errors = ValidationError::default();
    let full_name = req.full_name.trim().to_string();
    let email = req.email.trim().to_string();

    let name_len = full_name.chars().count();
    if name_len < FULL_NAME_MIN {
        errors.push("fullName", "Full name must be at least 2 characters long");
    } else if name_len > FULL_NAME_MAX {
        errors.push("fullName", "Full name cannot exceed 100 characters");
    }

    if !is_valid_email(&email) {
        errors.push("email", "Please enter a valid email address");
    }
    if email.chars().count() > EMAIL_MAX {
        errors.push("email", "Email cannot exceed 255 characters");
    }

    errors.into_result(NewWaitlistEntry { full_name, email })
}

/// Usernames are trimmed the same way at setup and at login, so any account
/// setup creates can also sign in.
fn check_username(raw: &str, errors: &mut ValidationError) -> String {
    let username = raw.trim().to_string();
    if username.is_empty() {
        errors.push("username", "Username is required");
    } else if username.chars().count() < USERNAME_MIN {
        errors.push("username", "Username must be at least 3 characters");
    }
    username
}

/// Same username rule as the setup endpoint, for the command-line bootstrap.
pub fn validate_username(raw: &str) -> Result<String, ValidationError> {
    let mut errors = ValidationError::default();
    let username = check_username(raw, &mut errors);
    errors.into_result(username)
}

pub fn validate_login(req: LoginRequest) -> Result<Credentials, ValidationError> {
    let mut errors = ValidationError::default();
    let username = check_username(&req.username, &mut errors);

    if req.password.chars().count() < PASSWORD_MIN {
        errors.push("password", "Password must be at least 6 characters");
    }

    errors.into_result(Credentials {
        username,
        password: req.password,
    })
}

pub fn validate_setup(req: SetupRequest) -> Result<Credentials, ValidationError> {
    let mut errors = ValidationError::default();
    let username = check_username(&req.username, &mut errors);

    if req.password.is_empty() {
        errors.push("password", "Password is required");
    } else if req.password.chars().count() < PASSWORD_MIN {
        errors.push("password", "Password must be at least 6 characters");
    }

    errors.into_result(Credentials {
        username,
        password: req.password,
    })
}
