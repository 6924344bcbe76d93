//! Error taxonomy for session persistence.
//!
//! Each layer recovers what it can and only the caller-facing
//! [`AuthError`] ever reaches the user:
//!
//! - [`CodecError`] and [`TransportError`] are swallowed by the stores and
//!   reported as an absent session (logged, never raised).
//! - [`GatewayError`] is what an identity provider returns. On login/signup
//!   it becomes an [`AuthError`]; on restoration it becomes a
//!   [`RestoreFailure`] and the session falls back to the login screen.

use thiserror::Error;

/// Failure reported to the caller of `login` / `signup`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Bad email/password or a rejected form. No state was changed.
    #[error("{0}")]
    Credential(String),
    /// Network or provider outage.
    #[error("identity provider unavailable: {0}")]
    ProviderUnavailable(String),
}

impl AuthError {
    /// Whether the failure is the user's to fix (as opposed to an outage).
    pub fn is_credential(&self) -> bool {
        matches!(self, Self::Credential(_))
    }
}

impl From<GatewayError> for AuthError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Credentials(msg) | GatewayError::Rejected(msg) => Self::Credential(msg),
            GatewayError::Unavailable(msg) | GatewayError::Malformed(msg) => {
                Self::ProviderUnavailable(msg)
            }
        }
    }
}

/// Raw failure from an identity provider call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// Sign-in or sign-up refused the supplied email/password.
    #[error("invalid credentials: {0}")]
    Credentials(String),
    /// A stored token pair was refused (expired, revoked, unknown).
    #[error("session rejected: {0}")]
    Rejected(String),
    /// Transport failure, timeout, rate limit or 5xx.
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
    /// The provider answered with something we could not interpret.
    #[error("malformed provider response: {0}")]
    Malformed(String),
}

/// Why a restoration attempt ended in `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RestoreFailure {
    /// The provider refused the stored tokens.
    #[error("stored tokens rejected: {0}")]
    TokenInvalid(String),
    /// The provider could not be reached. Treated like an invalid token.
    #[error("provider unavailable during restore: {0}")]
    ProviderUnavailable(String),
    /// The provider accepted the call but returned no session.
    #[error("provider returned no session")]
    NoSession,
}

impl From<GatewayError> for RestoreFailure {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Credentials(msg) | GatewayError::Rejected(msg) => Self::TokenInvalid(msg),
            GatewayError::Unavailable(msg) | GatewayError::Malformed(msg) => {
                Self::ProviderUnavailable(msg)
            }
        }
    }
}

/// A token pair that could not be encoded for, or decoded from, a channel.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("payload is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("payload has no token separator")]
    MissingSeparator,
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("payload contains an empty token")]
    EmptyToken,
    #[error("access token contains the query-parameter separator")]
    SeparatorInAccessToken,
}

/// A browser-side channel could not be reached.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("cookie jar unavailable: {0}")]
    CookieJar(String),
    #[error("script host unavailable: {0}")]
    ScriptHost(String),
    #[error("cookie file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cookie file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_errors_map_to_caller_errors() {
        let err: AuthError = GatewayError::Credentials("Invalid login credentials".into()).into();
        assert!(err.is_credential());
        assert_eq!(err.to_string(), "Invalid login credentials");

        let err: AuthError = GatewayError::Unavailable("connection refused".into()).into();
        assert!(!err.is_credential());
        assert!(err.to_string().contains("unavailable"));
    }

    #[test]
    fn gateway_errors_map_to_restore_failures() {
        assert_eq!(
            RestoreFailure::from(GatewayError::Rejected("expired".into())),
            RestoreFailure::TokenInvalid("expired".into())
        );
        assert_eq!(
            RestoreFailure::from(GatewayError::Malformed("html".into())),
            RestoreFailure::ProviderUnavailable("html".into())
        );
    }
}
