//! `localStorage` session store reached through an asynchronous script bridge.
//!
//! The host evaluates a snippet in the browser and hands the result back on
//! a *later* render, so the first read of a page load always comes back
//! [`StoreRead::Pending`]. Reads reuse one stable invocation key so the
//! next render picks up the same evaluation's result; writes and clears use
//! a fresh, monotonically increasing key each time so every call is
//! evaluated again rather than served from the host's cache.
//!
//! The stored value is the JSON token pair. A missing item comes back as
//! [`NO_SESSION_SENTINEL`], which lets "checked, nothing there" be told apart
//! from "not evaluated yet" (`None`).

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::{SessionStore, StoreKind, StoreRead};
use crate::codec::{self, Transport};
use crate::error::TransportError;
use crate::token::TokenPair;

/// Returned by the read snippet when the item is not set.
pub const NO_SESSION_SENTINEL: &str = "__NO_SESSION__";

/// Stable invocation key of the read snippet.
const LOAD_INVOCATION: &str = "load_session";

/// A storage operation to run in the browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageScript {
    Get { key: String },
    Set { key: String, value: String },
    Remove { key: String },
}

impl StorageScript {
    /// JavaScript source for hosts that evaluate real snippets.
    pub fn to_javascript(&self) -> String {
        match self {
            Self::Get { key } => format!(
                "localStorage.getItem({}) || {}",
                js_string(key),
                js_string(NO_SESSION_SENTINEL)
            ),
            Self::Set { key, value } => format!(
                "localStorage.setItem({}, {}); true",
                js_string(key),
                js_string(value)
            ),
            Self::Remove { key } => {
                format!("localStorage.removeItem({}); true", js_string(key))
            }
        }
    }
}

/// JSON string literals are valid JavaScript string literals.
fn js_string(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

/// Evaluates storage snippets in the browser.
pub trait ScriptHost: Send + Sync {
    /// Submit `script` under `invocation`. Returns `Ok(None)` while the
    /// evaluation has not completed; once it has, every call with the same
    /// `invocation` returns the same result.
    fn eval(&self, script: &StorageScript, invocation: &str)
        -> Result<Option<String>, TransportError>;
}

// ── Store ───────────────────────────────────────────────────────

/// [`SessionStore`] over `localStorage`.
pub struct BrowserStorageBridge {
    host: Arc<dyn ScriptHost>,
    key: String,
    invocations: AtomicU64,
}

impl BrowserStorageBridge {
    pub fn new(host: Arc<dyn ScriptHost>, key: &str) -> Self {
        Self {
            host,
            key: key.to_string(),
            invocations: AtomicU64::new(0),
        }
    }

    fn next_invocation(&self, prefix: &str) -> String {
        let n = self.invocations.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{prefix}_{n}")
    }

    fn fire(&self, script: StorageScript, prefix: &str) {
        let invocation = self.next_invocation(prefix);
        if let Err(e) = self.host.eval(&script, &invocation) {
            tracing::warn!(store = "local_storage", %invocation, "Storage script failed: {e}");
        }
    }
}

impl SessionStore for BrowserStorageBridge {
    fn kind(&self) -> StoreKind {
        StoreKind::LocalStorage
    }

    fn read(&self) -> StoreRead {
        let script = StorageScript::Get {
            key: self.key.clone(),
        };
        let raw = match self.host.eval(&script, LOAD_INVOCATION) {
            Ok(Some(raw)) => raw,
            Ok(None) => return StoreRead::Pending,
            Err(e) => {
                tracing::warn!(store = "local_storage", "Load session error: {e}");
                return StoreRead::Absent;
            }
        };

        let raw = raw.trim();
        if raw.is_empty() || raw == NO_SESSION_SENTINEL || raw == "null" {
            return StoreRead::Absent;
        }
        match codec::decode(raw, Transport::Json) {
            Ok(tokens) => StoreRead::Payload(tokens),
            Err(e) => {
                tracing::warn!(store = "local_storage", "Ignoring unreadable stored session: {e}");
                StoreRead::Absent
            }
        }
    }

    fn write(&self, tokens: &TokenPair) {
        let value = match codec::encode(tokens, Transport::Json) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(store = "local_storage", "Not saving session: {e}");
                return;
            }
        };
        let script = StorageScript::Set {
            key: self.key.clone(),
            value,
        };
        self.fire(script, "save_session");
    }

    fn clear(&self) {
        let script = StorageScript::Remove {
            key: self.key.clone(),
        };
        self.fire(script, "clear_session");
    }
}

// ── Simulated host ──────────────────────────────────────────────

/// In-process [`ScriptHost`] with its own `localStorage`.
///
/// Submitted snippets run on the next call to [`next_render`](Self::next_render),
/// in submission order, the way a real page runs them after the render that
/// emitted them has reached the browser.
#[derive(Debug, Default)]
pub struct SimulatedBrowser {
    state: Mutex<BrowserState>,
}

#[derive(Debug, Default)]
struct BrowserState {
    local_storage: HashMap<String, String>,
    queued: VecDeque<(String, StorageScript)>,
    submitted: HashSet<String>,
    results: HashMap<String, String>,
    evaluations: u64,
    unavailable: bool,
}

impl SimulatedBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with an existing `localStorage` (e.g. loaded from disk).
    pub fn with_local_storage(items: HashMap<String, String>) -> Self {
        let browser = Self::default();
        browser.state.lock().local_storage = items;
        browser
    }

    /// Run every queued snippet. Returns how many ran.
    pub fn next_render(&self) -> usize {
        let mut state = self.state.lock();
        let mut ran = 0;
        while let Some((invocation, script)) = state.queued.pop_front() {
            let result = match script {
                StorageScript::Get { key } => state
                    .local_storage
                    .get(&key)
                    .cloned()
                    .unwrap_or_else(|| NO_SESSION_SENTINEL.to_string()),
                StorageScript::Set { key, value } => {
                    state.local_storage.insert(key, value);
                    "true".to_string()
                }
                StorageScript::Remove { key } => {
                    state.local_storage.remove(&key);
                    "true".to_string()
                }
            };
            state.results.insert(invocation, result);
            state.evaluations += 1;
            ran += 1;
        }
        ran
    }

    /// Forget cached results, as a full page reload does. `localStorage` is kept.
    pub fn reload(&self) {
        let mut state = self.state.lock();
        state.queued.clear();
        state.submitted.clear();
        state.results.clear();
    }

    pub fn local_storage_item(&self, key: &str) -> Option<String> {
        self.state.lock().local_storage.get(key).cloned()
    }

    pub fn set_local_storage_item(&self, key: &str, value: &str) {
        self.state
            .lock()
            .local_storage
            .insert(key.to_string(), value.to_string());
    }

    pub fn local_storage(&self) -> HashMap<String, String> {
        self.state.lock().local_storage.clone()
    }

    /// Snippets evaluated so far.
    pub fn evaluations(&self) -> u64 {
        self.state.lock().evaluations
    }

    /// Make every `eval` fail, as when the bridge component is missing.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unavailable = unavailable;
    }
}

impl ScriptHost for SimulatedBrowser {
    fn eval(
        &self,
        script: &StorageScript,
        invocation: &str,
    ) -> Result<Option<String>, TransportError> {
        let mut state = self.state.lock();
        if state.unavailable {
            return Err(TransportError::ScriptHost("bridge component not loaded".into()));
        }
        if let Some(result) = state.results.get(invocation) {
            return Ok(Some(result.clone()));
        }
        if state.submitted.insert(invocation.to_string()) {
            state
                .queued
                .push_back((invocation.to_string(), script.clone()));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SESSION_KEY;

    fn bridge() -> (Arc<SimulatedBrowser>, BrowserStorageBridge) {
        let browser = Arc::new(SimulatedBrowser::new());
        let store = BrowserStorageBridge::new(browser.clone(), SESSION_KEY);
        (browser, store)
    }

    #[test]
    fn first_read_is_pending_then_absent() {
        let (browser, store) = bridge();
        assert_eq!(store.read(), StoreRead::Pending);
        assert_eq!(store.read(), StoreRead::Pending, "same render, still pending");
        browser.next_render();
        assert_eq!(store.read(), StoreRead::Absent);
    }

    #[test]
    fn first_read_is_pending_then_payload() {
        let (browser, store) = bridge();
        browser.set_local_storage_item(
            SESSION_KEY,
            r#"{"access_token":"A","refresh_token":"B"}"#,
        );
        assert_eq!(store.read(), StoreRead::Pending);
        browser.next_render();
        assert_eq!(store.read(), StoreRead::Payload(TokenPair::new("A", "B")));
    }

    #[test]
    fn write_then_reload_round_trips() {
        let (browser, store) = bridge();
        let tokens = TokenPair::new("access-1", "refresh-1");
        store.write(&tokens);
        browser.next_render();

        browser.reload();
        let store = BrowserStorageBridge::new(browser.clone(), SESSION_KEY);
        assert_eq!(store.read(), StoreRead::Pending);
        browser.next_render();
        assert_eq!(store.read(), StoreRead::Payload(tokens));
    }

    #[test]
    fn repeated_writes_and_clears_each_evaluate() {
        let (browser, store) = bridge();
        store.write(&TokenPair::new("A", "B"));
        store.write(&TokenPair::new("A", "B"));
        store.clear();
        store.clear();
        assert_eq!(browser.next_render(), 4);
        assert_eq!(browser.evaluations(), 4);
        assert_eq!(browser.local_storage_item(SESSION_KEY), None);

        // Repeated reads within a page load share one evaluation.
        store.read();
        store.read();
        browser.next_render();
        store.read();
        assert_eq!(browser.evaluations(), 5);
    }

    #[test]
    fn unreadable_or_failed_reads_are_absent() {
        let (browser, store) = bridge();
        browser.set_local_storage_item(SESSION_KEY, "garbage");
        store.read();
        browser.next_render();
        assert_eq!(store.read(), StoreRead::Absent);

        let (browser, store) = bridge();
        browser.set_unavailable(true);
        assert_eq!(store.read(), StoreRead::Absent);
        store.write(&TokenPair::new("A", "B"));
        store.clear();
    }

    #[test]
    fn javascript_escapes_values() {
        let script = StorageScript::Set {
            key: SESSION_KEY.into(),
            value: r#"{"access_token":"a'b"}"#.into(),
        };
        let js = script.to_javascript();
        assert!(js.starts_with("localStorage.setItem(\"saas_dashboard_session\""));
        assert!(js.contains(r#"\"access_token\""#));

        let get = StorageScript::Get {
            key: SESSION_KEY.into(),
        };
        assert!(get.to_javascript().contains(NO_SESSION_SENTINEL));
    }
}
