//! Login, signup, logout and page-load session restoration.
//!
//! [`SessionServices`] holds the long-lived collaborators (active store,
//! identity gateway, re-render trigger). Each render borrows them together
//! with the host's [`PageState`] through [`SessionServices::begin_render`],
//! producing a [`SessionManager`] that every component needing
//! authentication is handed explicitly.
//!
//! ## Restoration
//!
//! ```text
//!  NotAttempted ──read: Absent────────────────▸ NotFound
//!       │        ──read: Pending──▸ Pending ─(next render, read again)─┐
//!       │                                                             │
//!       └──read: payload──▸ gateway.restore ──ok──▸ Restored           │
//!                                   └──────err──▸ Failed (stores cleared)
//! ```
//!
//! Terminal states short-circuit every later `check_stored_session` call
//! of the page load, so the provider sees at most one restore call.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use super::state::{PageState, RestoreStatus};
use super::validation::{validate_login, SignupForm};
use crate::config::SessionConfig;
use crate::error::AuthError;
use crate::identity::{validate_tokens, IdentityGateway, Validation};
use crate::store::{self, BrowserChannels, SessionStore, StoreRead};
use crate::token::{SessionRecord, TokenPair};

/// Host capability to run another render pass.
pub trait RerenderTrigger: Send + Sync {
    fn request_rerender(&self);
}

/// [`RerenderTrigger`] that counts requests for the host loop to drain.
#[derive(Debug, Default)]
pub struct RerenderRequests {
    requested: AtomicU32,
}

impl RerenderRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests not yet consumed.
    pub fn pending(&self) -> u32 {
        self.requested.load(Ordering::SeqCst)
    }

    /// Consume outstanding requests. True if at least one was made.
    pub fn take(&self) -> bool {
        self.requested.swap(0, Ordering::SeqCst) > 0
    }
}

impl RerenderTrigger for RerenderRequests {
    fn request_rerender(&self) {
        self.requested.fetch_add(1, Ordering::SeqCst);
    }
}

/// Result of a successful signup call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignupOutcome {
    /// The provider issued a session right away; the user is signed in.
    SignedIn(SessionRecord),
    /// The account exists but the email must be verified before sign-in.
    VerificationPending { email: String },
}

/// Long-lived collaborators shared by every render of a page load.
pub struct SessionServices {
    store: Arc<dyn SessionStore>,
    fallback_stores: Vec<Arc<dyn SessionStore>>,
    gateway: Arc<dyn IdentityGateway>,
    rerender: Arc<dyn RerenderTrigger>,
}

impl SessionServices {
    pub fn new(
        store: Arc<dyn SessionStore>,
        gateway: Arc<dyn IdentityGateway>,
        rerender: Arc<dyn RerenderTrigger>,
    ) -> Self {
        Self {
            store,
            fallback_stores: Vec::new(),
            gateway,
            rerender,
        }
    }

    /// Extra channels to wipe when a restore fails.
    pub fn with_fallback_stores(mut self, stores: Vec<Arc<dyn SessionStore>>) -> Self {
        self.fallback_stores = stores;
        self
    }

    /// Wire the store chosen by `config` over the host's channels.
    pub fn from_config(
        config: &SessionConfig,
        channels: &BrowserChannels,
        gateway: Arc<dyn IdentityGateway>,
        rerender: Arc<dyn RerenderTrigger>,
    ) -> Self {
        let active = store::build_store(config.store, config, channels);
        let fallbacks = if config.clear_all_channels_on_failure {
            store::build_fallback_stores(config.store, config, channels)
        } else {
            Vec::new()
        };
        tracing::debug!(store = %config.store, gateway = gateway.name(), "Session services ready");
        Self::new(active, gateway, rerender).with_fallback_stores(fallbacks)
    }

    pub fn store(&self) -> &dyn SessionStore {
        self.store.as_ref()
    }

    pub fn gateway(&self) -> &dyn IdentityGateway {
        self.gateway.as_ref()
    }

    /// Start a render: pair the services with this page load's state.
    pub fn begin_render<'a>(&'a self, page: &'a mut PageState) -> SessionManager<'a> {
        SessionManager {
            services: self,
            page,
        }
    }
}

/// Per-render view of the session. Construct with [`SessionServices::begin_render`].
pub struct SessionManager<'a> {
    services: &'a SessionServices,
    page: &'a mut PageState,
}

impl SessionManager<'_> {
    pub fn is_authenticated(&self) -> bool {
        self.page.is_authenticated()
    }

    pub fn current_session(&self) -> Option<&SessionRecord> {
        self.page.session()
    }

    pub fn status(&self) -> &RestoreStatus {
        self.page.status()
    }

    /// See [`PageState::take_just_signed_up`].
    pub fn take_just_signed_up(&mut self) -> bool {
        self.page.take_just_signed_up()
    }

    // ── Restoration ─────────────────────────────────────────────

    /// Restore a stored session if one exists. Returns whether the page
    /// is authenticated afterwards.
    ///
    /// Call once per render. A `Pending` read requests one more render and
    /// returns `false`; the next call picks up where this one left off.
    pub async fn check_stored_session(&mut self) -> bool {
        if let Some(record) = self.page.session() {
            if !self.page.status().is_terminal() {
                let record = record.clone();
                self.page.advance(RestoreStatus::Restored(record));
            }
            return true;
        }

        if self.page.status().is_terminal() {
            return false;
        }

        let services = self.services;
        let store = services.store.as_ref();
        match store.read() {
            StoreRead::Absent => {
                tracing::debug!(page_load = %self.page.page_load_id(), store = %store.kind(), "No stored session");
                self.page.advance(RestoreStatus::NotFound);
                false
            }
            StoreRead::Pending => {
                self.page.advance(RestoreStatus::Pending);
                services.rerender.request_rerender();
                false
            }
            StoreRead::Payload(tokens) => self.restore(tokens).await,
        }
    }

    async fn restore(&mut self, stored: TokenPair) -> bool {
        self.page.record_restore_attempt();
        let services = self.services;

        match validate_tokens(services.gateway.as_ref(), &stored).await {
            Validation::Valid(record) => {
                if record.tokens != stored {
                    tracing::debug!(
                        page_load = %self.page.page_load_id(),
                        old = %stored.fingerprint(),
                        new = %record.tokens.fingerprint(),
                        "Persisting rotated tokens"
                    );
                    self.services.store.write(&record.tokens);
                }
                tracing::info!(
                    page_load = %self.page.page_load_id(),
                    store = %self.services.store.kind(),
                    user_id = %record.user_id,
                    "Session restored"
                );
                self.page.install(record.clone());
                self.page.advance(RestoreStatus::Restored(record));
                true
            }
            Validation::Rejected(reason) => {
                tracing::info!(
                    page_load = %self.page.page_load_id(),
                    store = %self.services.store.kind(),
                    "Stored session discarded: {reason}"
                );
                self.clear_all_stores();
                self.page.take_session();
                self.page.advance(RestoreStatus::Failed(reason));
                false
            }
        }
    }

    fn clear_all_stores(&self) {
        self.services.store.clear();
        for store in &self.services.fallback_stores {
            store.clear();
        }
    }

    // ── Login / signup / logout ─────────────────────────────────

    /// Sign in and persist the session. Exactly one store write on success,
    /// none on failure.
    pub async fn login(&mut self, email: &str, password: &str) -> Result<SessionRecord, AuthError> {
        validate_login(email, password)?;
        let email = email.trim();

        let response = self
            .services
            .gateway
            .sign_in(email, password)
            .await
            .map_err(|e| {
                tracing::warn!(page_load = %self.page.page_load_id(), "Login failed: {e}");
                AuthError::from(e)
            })?;

        let record = response.into_record().ok_or_else(|| {
            AuthError::ProviderUnavailable("sign-in returned no session".to_string())
        })?;

        self.persist(record.clone());
        tracing::info!(page_load = %self.page.page_load_id(), user_id = %record.user_id, "Logged in");
        Ok(record)
    }

    /// Create an account. Signs in immediately when the provider issues a
    /// session; otherwise the email must be verified first. Never retried.
    pub async fn signup(&mut self, email: &str, password: &str) -> Result<SignupOutcome, AuthError> {
        validate_login(email, password)?;
        let email = email.trim();

        let response = self
            .services
            .gateway
            .sign_up(email, password)
            .await
            .map_err(|e| {
                tracing::warn!(page_load = %self.page.page_load_id(), "Signup failed: {e}");
                AuthError::from(e)
            })?;

        let user_email = if response.user.email.is_empty() {
            email.to_string()
        } else {
            response.user.email.clone()
        };

        match response.into_record() {
            Some(record) => {
                self.persist(record.clone());
                self.page.mark_just_signed_up();
                tracing::info!(page_load = %self.page.page_load_id(), user_id = %record.user_id, "Account created and signed in");
                Ok(SignupOutcome::SignedIn(record))
            }
            None => {
                tracing::info!(page_load = %self.page.page_load_id(), "Account created, email verification pending");
                Ok(SignupOutcome::VerificationPending { email: user_email })
            }
        }
    }

    /// Validate the signup form, then [`signup`](Self::signup).
    pub async fn signup_with_form(&mut self, form: &SignupForm) -> Result<SignupOutcome, AuthError> {
        form.validate()?;
        self.signup(&form.email, &form.password).await
    }

    /// Sign out locally and, best-effort, on the provider. Idempotent.
    pub async fn logout(&mut self) {
        if let Some(record) = self.page.take_session() {
            if let Err(e) = self
                .services
                .gateway
                .sign_out(record.tokens.access_token())
                .await
            {
                tracing::warn!(page_load = %self.page.page_load_id(), "Provider sign-out failed: {e}");
            }
            tracing::info!(page_load = %self.page.page_load_id(), user_id = %record.user_id, "Logged out");
        }

        self.services.store.clear();
        if !self.page.status().is_terminal() {
            self.page.advance(RestoreStatus::NotFound);
        }
    }

    fn persist(&mut self, record: SessionRecord) {
        self.services.store.write(&record.tokens);
        self.page.install(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayError;
    use crate::identity::{AuthResponse, AuthUser, MemoryGateway};
    use crate::store::{CookieStore, MemoryCookieJar, StoreKind, SESSION_KEY};
    use parking_lot::Mutex;
    use std::time::Duration;

    /// Store that records every call and answers reads from a script.
    #[derive(Default)]
    struct RecordingStore {
        reads: Mutex<Vec<StoreRead>>,
        writes: Mutex<Vec<TokenPair>>,
        clears: AtomicU32,
    }

    impl RecordingStore {
        fn answering(reads: Vec<StoreRead>) -> Self {
            Self {
                reads: Mutex::new(reads),
                ..Self::default()
            }
        }

        fn writes(&self) -> Vec<TokenPair> {
            self.writes.lock().clone()
        }

        fn clears(&self) -> u32 {
            self.clears.load(Ordering::SeqCst)
        }
    }

    impl SessionStore for RecordingStore {
        fn kind(&self) -> StoreKind {
            StoreKind::Cookie
        }

        fn read(&self) -> StoreRead {
            let mut reads = self.reads.lock();
            if reads.is_empty() {
                StoreRead::Absent
            } else {
                reads.remove(0)
            }
        }

        fn write(&self, tokens: &TokenPair) {
            self.writes.lock().push(tokens.clone());
        }

        fn clear(&self) {
            self.clears.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Harness {
        store: Arc<RecordingStore>,
        gateway: Arc<MemoryGateway>,
        rerender: Arc<RerenderRequests>,
        services: SessionServices,
    }

    fn harness(reads: Vec<StoreRead>) -> Harness {
        let store = Arc::new(RecordingStore::answering(reads));
        let gateway = Arc::new(MemoryGateway::new());
        let rerender = Arc::new(RerenderRequests::new());
        let services = SessionServices::new(store.clone(), gateway.clone(), rerender.clone());
        Harness {
            store,
            gateway,
            rerender,
            services,
        }
    }

    #[tokio::test]
    async fn absent_store_marks_not_found_without_gateway_call() {
        let h = harness(vec![]);
        let mut page = PageState::new();

        assert!(!h.services.begin_render(&mut page).check_stored_session().await);
        assert_eq!(page.status(), &RestoreStatus::NotFound);
        assert_eq!(h.gateway.calls().restore, 0);
        assert_eq!(h.rerender.pending(), 0);
    }

    #[tokio::test]
    async fn pending_requests_one_rerender_per_observation() {
        let h = harness(vec![StoreRead::Pending, StoreRead::Pending]);
        let mut page = PageState::new();

        for _ in 0..2 {
            assert!(!h.services.begin_render(&mut page).check_stored_session().await);
            assert_eq!(page.status(), &RestoreStatus::Pending);
            assert!(h.rerender.take());
        }
        assert_eq!(h.gateway.calls().restore, 0);

        assert!(!h.services.begin_render(&mut page).check_stored_session().await);
        assert_eq!(page.status(), &RestoreStatus::NotFound);
        assert!(!h.rerender.take());
    }

    #[tokio::test]
    async fn valid_tokens_restore_without_rewrite() {
        let h = harness(vec![]);
        h.gateway.add_user("a@b.co", "password123");
        let tokens = h
            .gateway
            .sign_in("a@b.co", "password123")
            .await
            .unwrap()
            .session
            .unwrap();
        h.store.reads.lock().push(StoreRead::Payload(tokens.clone()));

        let mut page = PageState::new();
        assert!(h.services.begin_render(&mut page).check_stored_session().await);
        assert_eq!(page.session().unwrap().tokens, tokens);
        assert!(matches!(page.status(), RestoreStatus::Restored(r) if r.email == "a@b.co"));
        assert!(h.store.writes().is_empty());
        assert_eq!(page.restore_attempts(), 1);
    }

    #[tokio::test]
    async fn rotated_tokens_are_persisted() {
        let h = harness(vec![]);
        h.gateway.add_user("a@b.co", "password123");
        let original = h
            .gateway
            .sign_in("a@b.co", "password123")
            .await
            .unwrap()
            .session
            .unwrap();
        h.gateway.expire_access_token(original.access_token());
        h.store.reads.lock().push(StoreRead::Payload(original.clone()));

        let mut page = PageState::new();
        assert!(h.services.begin_render(&mut page).check_stored_session().await);

        let restored = page.session().unwrap().tokens.clone();
        assert_ne!(restored, original);
        assert_eq!(h.store.writes(), vec![restored]);
    }

    #[tokio::test]
    async fn live_pair_rotated_by_provider_is_persisted() {
        let h = harness(vec![]);
        h.gateway.add_user("a@b.co", "password123");
        let original = h
            .gateway
            .sign_in("a@b.co", "password123")
            .await
            .unwrap()
            .session
            .unwrap();
        h.gateway.set_rotate_on_restore(true);
        h.store.reads.lock().push(StoreRead::Payload(original.clone()));

        let mut page = PageState::new();
        assert!(h.services.begin_render(&mut page).check_stored_session().await);

        let restored = page.session().unwrap().tokens.clone();
        assert_ne!(restored.access_token(), original.access_token());
        assert_eq!(h.store.writes(), vec![restored]);
    }

    /// Provider that keeps the access token and rotates only the refresh token.
    struct RefreshOnlyRotation;

    #[async_trait::async_trait]
    impl IdentityGateway for RefreshOnlyRotation {
        fn name(&self) -> &str {
            "refresh-only"
        }

        async fn sign_up(&self, _: &str, _: &str) -> Result<AuthResponse, GatewayError> {
            Err(GatewayError::Unavailable("not used".into()))
        }

        async fn sign_in(&self, _: &str, _: &str) -> Result<AuthResponse, GatewayError> {
            Err(GatewayError::Unavailable("not used".into()))
        }

        async fn sign_out(&self, _: &str) -> Result<(), GatewayError> {
            Ok(())
        }

        async fn restore_session(&self, tokens: &TokenPair) -> Result<AuthResponse, GatewayError> {
            Ok(AuthResponse {
                user: AuthUser {
                    id: "u1".into(),
                    email: "a@b.co".into(),
                },
                session: Some(TokenPair::new(tokens.access_token(), "rt-next")),
            })
        }
    }

    #[tokio::test]
    async fn refresh_only_rotation_is_persisted() {
        let stored = TokenPair::new("at-same", "rt-first");
        let store = Arc::new(RecordingStore::answering(vec![StoreRead::Payload(
            stored.clone(),
        )]));
        let services = SessionServices::new(
            store.clone(),
            Arc::new(RefreshOnlyRotation),
            Arc::new(RerenderRequests::new()),
        );

        let mut page = PageState::new();
        assert!(services.begin_render(&mut page).check_stored_session().await);

        let expected = TokenPair::new("at-same", "rt-next");
        assert_eq!(store.writes(), vec![expected.clone()]);
        assert_eq!(page.session().unwrap().tokens, expected);
    }

    #[tokio::test]
    async fn rejected_tokens_clear_every_store() {
        let store = Arc::new(RecordingStore::answering(vec![StoreRead::Payload(
            TokenPair::new("dead", "dead"),
        )]));
        let fallback = Arc::new(RecordingStore::default());
        let gateway = Arc::new(MemoryGateway::new());
        let services = SessionServices::new(
            store.clone(),
            gateway.clone(),
            Arc::new(RerenderRequests::new()),
        )
        .with_fallback_stores(vec![fallback.clone() as Arc<dyn SessionStore>]);

        let mut page = PageState::new();
        assert!(!services.begin_render(&mut page).check_stored_session().await);
        assert!(matches!(page.status(), RestoreStatus::Failed(_)));
        assert!(!page.is_authenticated());
        assert_eq!(store.clears(), 1);
        assert_eq!(fallback.clears(), 1);

        // Terminal: no second gateway call.
        assert!(!services.begin_render(&mut page).check_stored_session().await);
        assert_eq!(gateway.calls().restore, 1);
    }

    #[tokio::test]
    async fn outage_during_restore_fails_safe() {
        let h = harness(vec![StoreRead::Payload(TokenPair::new("A", "B"))]);
        h.gateway.set_unavailable(true);
        let mut page = PageState::new();

        assert!(!h.services.begin_render(&mut page).check_stored_session().await);
        assert!(matches!(
            page.status(),
            RestoreStatus::Failed(crate::error::RestoreFailure::ProviderUnavailable(_))
        ));
        assert_eq!(h.store.clears(), 1);
    }

    #[tokio::test]
    async fn login_persists_exactly_once() {
        let h = harness(vec![]);
        h.gateway.add_user("a@b.co", "password123");
        let mut page = PageState::new();
        let mut session = h.services.begin_render(&mut page);

        let record = session.login(" a@b.co ", "password123").await.unwrap();
        assert!(session.is_authenticated());
        assert_eq!(h.store.writes(), vec![record.tokens.clone()]);

        // Already authenticated: restoration short-circuits to Restored.
        assert!(session.check_stored_session().await);
        assert!(matches!(session.status(), RestoreStatus::Restored(_)));
        assert_eq!(h.gateway.calls().restore, 0);
    }

    #[tokio::test]
    async fn failed_login_writes_nothing() {
        let h = harness(vec![]);
        h.gateway.add_user("a@b.co", "password123");
        let mut page = PageState::new();
        let mut session = h.services.begin_render(&mut page);

        let err = session.login("a@b.co", "wrong").await.unwrap_err();
        assert!(err.is_credential());
        assert!(!session.is_authenticated());
        assert!(h.store.writes().is_empty());

        let err = session.login("", "").await.unwrap_err();
        assert_eq!(err.to_string(), "Please enter both email and password");
        assert_eq!(h.gateway.calls().sign_in, 1);
    }

    #[tokio::test]
    async fn login_during_outage_reports_unavailable() {
        let h = harness(vec![]);
        h.gateway.set_unavailable(true);
        let mut page = PageState::new();
        let err = h
            .services
            .begin_render(&mut page)
            .login("a@b.co", "password123")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::ProviderUnavailable(_)));
    }

    #[tokio::test]
    async fn signup_with_immediate_session_signs_in() {
        let h = harness(vec![]);
        let mut page = PageState::new();
        let mut session = h.services.begin_render(&mut page);

        let outcome = session
            .signup_with_form(&SignupForm::new("new@b.co", "secret1", "secret1"))
            .await
            .unwrap();
        assert!(matches!(outcome, SignupOutcome::SignedIn(_)));
        assert!(session.is_authenticated());
        assert_eq!(h.store.writes().len(), 1);
        assert!(session.take_just_signed_up());
        assert!(!session.take_just_signed_up());
    }

    #[tokio::test]
    async fn signup_requiring_verification_stays_signed_out() {
        let store = Arc::new(RecordingStore::default());
        let gateway = Arc::new(MemoryGateway::new().require_verification(true));
        let services =
            SessionServices::new(store.clone(), gateway, Arc::new(RerenderRequests::new()));
        let mut page = PageState::new();
        let mut session = services.begin_render(&mut page);

        let outcome = session.signup("new@b.co", "secret1").await.unwrap();
        assert_eq!(
            outcome,
            SignupOutcome::VerificationPending {
                email: "new@b.co".into()
            }
        );
        assert!(!session.is_authenticated());
        assert!(store.writes().is_empty());
        assert!(!session.take_just_signed_up());
    }

    #[tokio::test]
    async fn invalid_form_never_reaches_gateway() {
        let h = harness(vec![]);
        let mut page = PageState::new();
        let err = h
            .services
            .begin_render(&mut page)
            .signup_with_form(&SignupForm::new("new@b.co", "secret1", "secret2"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Passwords don't match");
        assert_eq!(h.gateway.calls().sign_up, 0);
    }

    #[tokio::test]
    async fn logout_is_idempotent_and_best_effort() {
        let h = harness(vec![]);
        h.gateway.add_user("a@b.co", "password123");
        h.gateway.set_fail_sign_out(true);
        let mut page = PageState::new();
        let mut session = h.services.begin_render(&mut page);
        session.login("a@b.co", "password123").await.unwrap();

        session.logout().await;
        assert!(!session.is_authenticated());
        session.logout().await;
        assert!(!session.is_authenticated());

        assert_eq!(h.gateway.calls().sign_out, 1);
        assert_eq!(h.store.clears(), 2);
        assert_eq!(session.status(), &RestoreStatus::NotFound);
        assert!(!session.check_stored_session().await);
    }

    #[tokio::test]
    async fn services_from_config_use_configured_store() {
        let jar = Arc::new(MemoryCookieJar::new());
        let channels = BrowserChannels {
            cookies: jar.clone(),
            query: crate::store::QueryParams::new(),
            scripts: Arc::new(crate::store::SimulatedBrowser::new()),
        };
        let gateway = Arc::new(MemoryGateway::new());
        gateway.add_user("a@b.co", "password123");
        let services = SessionServices::from_config(
            &SessionConfig::default(),
            &channels,
            gateway,
            Arc::new(RerenderRequests::new()),
        );
        assert_eq!(services.store().kind(), StoreKind::Cookie);

        let mut page = PageState::new();
        let record = services
            .begin_render(&mut page)
            .login("a@b.co", "password123")
            .await
            .unwrap();

        let cookie_store = CookieStore::new(jar, SESSION_KEY, Duration::from_secs(60));
        assert_eq!(cookie_store.read(), StoreRead::Payload(record.tokens));
    }
}
