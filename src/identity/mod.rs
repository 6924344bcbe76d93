//! Identity provider boundary.
//!
//! [`IdentityGateway`] is the contract the session manager consumes: sign-up,
//! sign-in, sign-out and restore-by-token-pair. Providers report failures as
//! [`GatewayError`]s; [`validate_tokens`] turns a restore call into an
//! explicit [`Validation`] so the restoration state machine matches on
//! variants instead of errors.
//!
//! Implementations:
//! - [`SupabaseGateway`](crate::integrations::supabase::SupabaseGateway):
//!   Supabase GoTrue over HTTP
//! - [`MemoryGateway`]: in-process provider for local development and tests

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, RestoreFailure};
use crate::token::{SessionRecord, TokenPair};

pub use memory::{GatewayCalls, MemoryGateway};

/// The user half of a provider response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: String,
}

/// What sign-up, sign-in and restore return.
///
/// `session` is `None` when sign-up requires email verification first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthResponse {
    pub user: AuthUser,
    pub session: Option<TokenPair>,
}

impl AuthResponse {
    /// Combine into a session record when a session was issued.
    pub fn into_record(self) -> Option<SessionRecord> {
        let user = self.user;
        self.session
            .map(|tokens| SessionRecord::new(user.id, user.email, tokens))
    }
}

/// External identity provider.
#[async_trait]
pub trait IdentityGateway: Send + Sync {
    /// Provider name for logs.
    fn name(&self) -> &str;

    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthResponse, GatewayError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthResponse, GatewayError>;

    /// Revoke the session behind `access_token`. Callers treat this as best-effort.
    async fn sign_out(&self, access_token: &str) -> Result<(), GatewayError>;

    /// Re-establish a session from a stored pair. The provider may rotate
    /// the pair, in which case the returned session differs from `tokens`.
    async fn restore_session(&self, tokens: &TokenPair) -> Result<AuthResponse, GatewayError>;
}

/// Outcome of validating stored tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    Valid(SessionRecord),
    Rejected(RestoreFailure),
}

/// Ask the provider to restore `tokens`, folding every failure mode into
/// [`Validation::Rejected`].
pub async fn validate_tokens(gateway: &dyn IdentityGateway, tokens: &TokenPair) -> Validation {
    match gateway.restore_session(tokens).await {
        Ok(response) => match response.into_record() {
            Some(record) => Validation::Valid(record),
            None => Validation::Rejected(RestoreFailure::NoSession),
        },
        Err(e) => {
            tracing::info!(
                provider = gateway.name(),
                fingerprint = %tokens.fingerprint(),
                "Restore error: {e}"
            );
            Validation::Rejected(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn validate_accepts_live_session() {
        let gateway = MemoryGateway::new();
        let signed_up = gateway.sign_up("test@example.com", "password123").await.unwrap();
        let tokens = signed_up.session.unwrap();

        match validate_tokens(&gateway, &tokens).await {
            Validation::Valid(record) => {
                assert_eq!(record.email, "test@example.com");
                assert_eq!(record.tokens, tokens);
            }
            other => panic!("expected Valid, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn validate_folds_errors_into_rejection() {
        let gateway = MemoryGateway::new();
        let unknown = TokenPair::new("nope", "nope");
        assert!(matches!(
            validate_tokens(&gateway, &unknown).await,
            Validation::Rejected(RestoreFailure::TokenInvalid(_))
        ));

        gateway.set_unavailable(true);
        assert!(matches!(
            validate_tokens(&gateway, &unknown).await,
            Validation::Rejected(RestoreFailure::ProviderUnavailable(_))
        ));
    }

    #[test]
    fn response_without_session_has_no_record() {
        let response = AuthResponse {
            user: AuthUser {
                id: "u1".into(),
                email: "a@b.co".into(),
            },
            session: None,
        };
        assert!(response.into_record().is_none());
    }
}
