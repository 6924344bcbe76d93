//! In-process identity provider.
//!
//! Behaves like a hosted provider closely enough to exercise every session
//! path without a network: refresh tokens are single-use and restoring with
//! an expired access token rotates the pair. Switches simulate email
//! verification, outages and a failing sign-out.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

use super::{AuthResponse, AuthUser, IdentityGateway};
use crate::error::GatewayError;
use crate::token::TokenPair;

/// Minimum password length accepted at sign-up.
const MIN_PASSWORD_LEN: usize = 6;

/// Number of calls made to each gateway operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GatewayCalls {
    pub sign_up: u32,
    pub sign_in: u32,
    pub sign_out: u32,
    pub restore: u32,
}

#[derive(Debug, Clone)]
struct StoredUser {
    id: String,
    email: String,
    password: String,
    confirmed: bool,
}

#[derive(Debug, Default)]
struct ProviderState {
    /// Keyed by lowercased email.
    users: HashMap<String, StoredUser>,
    /// access token → (user id, refresh token)
    sessions: HashMap<String, (String, String)>,
    /// refresh token → user id
    refresh_tokens: HashMap<String, String>,
    require_verification: bool,
    unavailable: bool,
    fail_sign_out: bool,
    rotate_on_restore: bool,
    calls: GatewayCalls,
}

impl ProviderState {
    fn issue(&mut self, user_id: &str) -> TokenPair {
        let access = format!("at-{}", uuid::Uuid::new_v4().simple());
        let refresh = format!("rt-{}", uuid::Uuid::new_v4().simple());
        self.sessions
            .insert(access.clone(), (user_id.to_string(), refresh.clone()));
        self.refresh_tokens
            .insert(refresh.clone(), user_id.to_string());
        TokenPair::new(access, refresh)
    }

    fn user_by_id(&self, user_id: &str) -> Option<AuthUser> {
        self.users
            .values()
            .find(|u| u.id == user_id)
            .map(|u| AuthUser {
                id: u.id.clone(),
                email: u.email.clone(),
            })
    }

    fn check_available(&self) -> Result<(), GatewayError> {
        if self.unavailable {
            return Err(GatewayError::Unavailable("provider is offline".into()));
        }
        Ok(())
    }
}

/// [`IdentityGateway`] backed by in-memory maps.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    state: Mutex<ProviderState>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sign-up returns no session until [`confirm_email`](Self::confirm_email).
    pub fn require_verification(self, required: bool) -> Self {
        self.state.lock().require_verification = required;
        self
    }

    /// Simulate an outage: every call fails with `Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unavailable = unavailable;
    }

    pub fn set_fail_sign_out(&self, fail: bool) {
        self.state.lock().fail_sign_out = fail;
    }

    /// Rotate the pair on every restore, even when the access token is live.
    pub fn set_rotate_on_restore(&self, rotate: bool) {
        self.state.lock().rotate_on_restore = rotate;
    }

    /// Register a confirmed user directly. Returns the user id.
    pub fn add_user(&self, email: &str, password: &str) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.state.lock().users.insert(
            email.to_lowercase(),
            StoredUser {
                id: id.clone(),
                email: email.to_string(),
                password: password.to_string(),
                confirmed: true,
            },
        );
        id
    }

    pub fn confirm_email(&self, email: &str) -> bool {
        match self.state.lock().users.get_mut(&email.to_lowercase()) {
            Some(user) => {
                user.confirmed = true;
                true
            }
            None => false,
        }
    }

    /// Drop an access token as if it had expired. Its refresh token stays usable.
    pub fn expire_access_token(&self, access_token: &str) {
        self.state.lock().sessions.remove(access_token);
    }

    /// Revoke everything, as a provider-side "sign out everywhere".
    pub fn revoke_all(&self) {
        let mut state = self.state.lock();
        state.sessions.clear();
        state.refresh_tokens.clear();
    }

    pub fn calls(&self) -> GatewayCalls {
        self.state.lock().calls
    }

    pub fn active_sessions(&self) -> usize {
        self.state.lock().sessions.len()
    }
}

#[async_trait]
impl IdentityGateway for MemoryGateway {
    fn name(&self) -> &str {
        "memory"
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthResponse, GatewayError> {
        let mut state = self.state.lock();
        state.calls.sign_up += 1;
        state.check_available()?;

        let key = email.trim().to_lowercase();
        if key.is_empty() {
            return Err(GatewayError::Credentials("Email is required".into()));
        }
        if password.len() < MIN_PASSWORD_LEN {
            return Err(GatewayError::Credentials(format!(
                "Password should be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        if state.users.contains_key(&key) {
            return Err(GatewayError::Credentials("User already registered".into()));
        }

        let confirmed = !state.require_verification;
        let user = StoredUser {
            id: uuid::Uuid::new_v4().to_string(),
            email: email.trim().to_string(),
            password: password.to_string(),
            confirmed,
        };
        let auth_user = AuthUser {
            id: user.id.clone(),
            email: user.email.clone(),
        };
        state.users.insert(key, user);

        let session = confirmed.then(|| state.issue(&auth_user.id));
        Ok(AuthResponse {
            user: auth_user,
            session,
        })
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthResponse, GatewayError> {
        let mut state = self.state.lock();
        state.calls.sign_in += 1;
        state.check_available()?;

        let user = state
            .users
            .get(&email.trim().to_lowercase())
            .filter(|u| u.password == password)
            .cloned()
            .ok_or_else(|| GatewayError::Credentials("Invalid login credentials".into()))?;
        if !user.confirmed {
            return Err(GatewayError::Credentials("Email not confirmed".into()));
        }

        let session = state.issue(&user.id);
        Ok(AuthResponse {
            user: AuthUser {
                id: user.id,
                email: user.email,
            },
            session: Some(session),
        })
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), GatewayError> {
        let mut state = self.state.lock();
        state.calls.sign_out += 1;
        state.check_available()?;
        if state.fail_sign_out {
            return Err(GatewayError::Unavailable("sign-out endpoint failed".into()));
        }
        if let Some((_, refresh)) = state.sessions.remove(access_token) {
            state.refresh_tokens.remove(&refresh);
        }
        Ok(())
    }

    async fn restore_session(&self, tokens: &TokenPair) -> Result<AuthResponse, GatewayError> {
        let mut state = self.state.lock();
        state.calls.restore += 1;
        state.check_available()?;

        let live_user = state
            .sessions
            .get(tokens.access_token())
            .filter(|(_, refresh)| refresh == tokens.refresh_token())
            .map(|(user_id, _)| user_id.clone());

        let (user_id, session) = match live_user {
            Some(user_id) if !state.rotate_on_restore => (user_id, tokens.clone()),
            _ => {
                // Refresh: the old refresh token is consumed either way.
                let user_id = state
                    .refresh_tokens
                    .remove(tokens.refresh_token())
                    .ok_or_else(|| GatewayError::Rejected("Invalid Refresh Token".into()))?;
                state.sessions.remove(tokens.access_token());
                let session = state.issue(&user_id);
                (user_id, session)
            }
        };

        let user = state
            .user_by_id(&user_id)
            .ok_or_else(|| GatewayError::Rejected("User not found".into()))?;
        Ok(AuthResponse {
            user,
            session: Some(session),
        })
    }
}
