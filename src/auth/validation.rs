//! Checks on login and signup input before anything reaches the provider.

use std::fmt;

use crate::error::AuthError;

/// Minimum password length accepted by the signup form.
pub const MIN_PASSWORD_LEN: usize = 6;

/// Fields of the signup form.
#[derive(Clone, Default)]
pub struct SignupForm {
    pub email: String,
    pub password: String,
    pub password_confirm: String,
}

impl fmt::Debug for SignupForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignupForm")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

impl SignupForm {
    pub fn new(
        email: impl Into<String>,
        password: impl Into<String>,
        password_confirm: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            password_confirm: password_confirm.into(),
        }
    }

    pub fn validate(&self) -> Result<(), AuthError> {
        if self.email.trim().is_empty() || self.password.is_empty() || self.password_confirm.is_empty()
        {
            return Err(credential("Please fill in all fields"));
        }
        if self.password != self.password_confirm {
            return Err(credential("Passwords don't match"));
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(credential(&format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        if !looks_like_email(&self.email) {
            return Err(credential("Please enter a valid email address"));
        }
        Ok(())
    }
}

/// Both login fields must be filled in.
pub fn validate_login(email: &str, password: &str) -> Result<(), AuthError> {
    if email.trim().is_empty() || password.is_empty() {
        return Err(credential("Please enter both email and password"));
    }
    Ok(())
}

fn credential(msg: &str) -> AuthError {
    AuthError::Credential(msg.to_string())
}

/// Shape check only; the provider is the authority on addresses.
fn looks_like_email(email: &str) -> bool {
    let email = email.trim();
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}
