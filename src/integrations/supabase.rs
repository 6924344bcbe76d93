//! Supabase Auth (GoTrue) identity gateway.
//!
//! Talks to the project's `/auth/v1` REST endpoints:
//! - `POST /signup`: create an account (session only if auto-confirm is on)
//! - `POST /token?grant_type=password`: sign in
//! - `POST /logout`: revoke the caller's session
//! - `GET /user`: check a stored access token
//! - `POST /token?grant_type=refresh_token`: rotate an expired pair
//!
//! ## Design
//! - HTTP client (reqwest) with the project's anon key on every request
//! - Restoring a pair checks the access token first and only refreshes when
//!   the provider answers 401/403, so a live pair comes back unchanged
//! - 4xx answers are credential/token problems; 5xx, 429 and transport
//!   failures mean the provider is unavailable

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::identity::{AuthResponse, AuthUser, IdentityGateway};
use crate::token::TokenPair;

/// Default HTTP timeout for auth calls.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

// ── Configuration ────────────────────────────────────────────────

/// Supabase connection configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupabaseConfig {
    /// Supabase project URL (e.g., https://xxxx.supabase.co).
    pub url: String,
    /// Project anon key (client-side key; RLS applies).
    pub anon_key: String,
    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl SupabaseConfig {
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            anon_key: anon_key.into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Load from `SUPABASE_URL` and `SUPABASE_KEY` (or `SUPABASE_ANON_KEY`).
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let url = lookup("SUPABASE_URL")?;
        let anon_key = lookup("SUPABASE_KEY").or_else(|| lookup("SUPABASE_ANON_KEY"))?;

        if url.trim().is_empty() || anon_key.trim().is_empty() {
            return None;
        }

        Some(Self::new(url.trim(), anon_key.trim()))
    }
}

// ── Wire models ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct GoTrueUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

impl From<GoTrueUser> for AuthUser {
    fn from(user: GoTrueUser) -> Self {
        Self {
            id: user.id,
            email: user.email.unwrap_or_default(),
        }
    }
}

/// Body of a successful `/token` call (and of `/signup` with auto-confirm).
#[derive(Debug, Deserialize)]
struct SessionBody {
    access_token: String,
    refresh_token: String,
    user: GoTrueUser,
}

impl From<SessionBody> for AuthResponse {
    fn from(body: SessionBody) -> Self {
        Self {
            user: body.user.into(),
            session: Some(TokenPair::new(body.access_token, body.refresh_token)),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignUpBody {
    Session(SessionBody),
    PendingVerification(GoTrueUser),
}

/// GoTrue has used several error shapes over time.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    error_description: Option<String>,
    msg: Option<String>,
    message: Option<String>,
    error: Option<String>,
}

impl ErrorBody {
    fn into_message(self) -> Option<String> {
        self.error_description
            .or(self.msg)
            .or(self.message)
            .or(self.error)
            .filter(|m| !m.trim().is_empty())
    }
}

/// Which kind of call failed, to pick the 4xx error variant.
#[derive(Debug, Clone, Copy)]
enum Call {
    Credentials,
    Restore,
}

// ── Gateway ──────────────────────────────────────────────────────

/// Supabase HTTP client implementing [`IdentityGateway`].
pub struct SupabaseGateway {
    config: SupabaseConfig,
    http: reqwest::Client,
}

impl SupabaseGateway {
    /// Create a new Supabase gateway.
    pub fn new(config: SupabaseConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, http })
    }

    /// Build the GoTrue URL for an endpoint.
    fn auth_url(&self, endpoint: &str) -> String {
        format!(
            "{}/auth/v1/{}",
            self.config.url.trim_end_matches('/'),
            endpoint
        )
    }

    fn post(&self, endpoint: &str) -> reqwest::RequestBuilder {
        self.http
            .post(self.auth_url(endpoint))
            .header("apikey", &self.config.anon_key)
    }

    fn get(&self, endpoint: &str) -> reqwest::RequestBuilder {
        self.http
            .get(self.auth_url(endpoint))
            .header("apikey", &self.config.anon_key)
    }

    /// Fetch the user behind an access token. `Ok(None)` means the token
    /// is expired or revoked and a refresh may still work.
    async fn fetch_user(&self, access_token: &str) -> Result<Option<AuthUser>, GatewayError> {
        let resp = self
            .get("user")
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(transport_error)?;

        match resp.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(None),
            status if status.is_success() => {
                let user: GoTrueUser = resp.json().await.map_err(transport_error)?;
                Ok(Some(user.into()))
            }
            _ => Err(error_from_response(resp, Call::Restore).await),
        }
    }

    /// Exchange a refresh token for a new pair.
    async fn refresh(&self, refresh_token: &str) -> Result<AuthResponse, GatewayError> {
        let resp = self
            .post("token?grant_type=refresh_token")
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .map_err(transport_error)?;

        if !resp.status().is_success() {
            return Err(error_from_response(resp, Call::Restore).await);
        }
        let body: SessionBody = resp.json().await.map_err(transport_error)?;
        Ok(body.into())
    }
}

#[async_trait]
impl IdentityGateway for SupabaseGateway {
    fn name(&self) -> &str {
        "supabase"
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthResponse, GatewayError> {
        let resp = self
            .post("signup")
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(transport_error)?;

        if !resp.status().is_success() {
            return Err(error_from_response(resp, Call::Credentials).await);
        }

        match resp.json::<SignUpBody>().await.map_err(transport_error)? {
            SignUpBody::Session(body) => Ok(body.into()),
            SignUpBody::PendingVerification(user) => Ok(AuthResponse {
                user: user.into(),
                session: None,
            }),
        }
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthResponse, GatewayError> {
        let resp = self
            .post("token?grant_type=password")
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(transport_error)?;

        if !resp.status().is_success() {
            return Err(error_from_response(resp, Call::Credentials).await);
        }
        let body: SessionBody = resp.json().await.map_err(transport_error)?;
        Ok(body.into())
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), GatewayError> {
        let resp = self
            .post("logout")
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(transport_error)?;

        match resp.status() {
            status if status.is_success() => Ok(()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
                tracing::debug!("Sign-out: session already gone on the provider");
                Ok(())
            }
            _ => Err(error_from_response(resp, Call::Restore).await),
        }
    }

    async fn restore_session(&self, tokens: &TokenPair) -> Result<AuthResponse, GatewayError> {
        if let Some(user) = self.fetch_user(tokens.access_token()).await? {
            return Ok(AuthResponse {
                user,
                session: Some(tokens.clone()),
            });
        }

        tracing::debug!(fingerprint = %tokens.fingerprint(), "Access token expired, refreshing");
        self.refresh(tokens.refresh_token()).await
    }
}

fn transport_error(e: reqwest::Error) -> GatewayError {
    if e.is_decode() {
        GatewayError::Malformed(e.to_string())
    } else {
        GatewayError::Unavailable(e.to_string())
    }
}

async fn error_from_response(resp: reqwest::Response, call: Call) -> GatewayError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(ErrorBody::into_message)
        .unwrap_or_else(|| format!("HTTP {status}"));

    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        return GatewayError::Unavailable(format!("({status}) {message}"));
    }
    if status.is_client_error() {
        return match call {
            Call::Credentials => GatewayError::Credentials(message),
            Call::Restore => GatewayError::Rejected(message),
        };
    }
    GatewayError::Malformed(format!("unexpected status {status}: {message}"))
}

// ── Tests ────────────────────────────────────────────────────────
