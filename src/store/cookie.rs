//! Cookie-backed session store.
//!
//! The payload is the JSON form of the token pair under
//! [`SESSION_KEY`](super::SESSION_KEY) with a bounded max-age. Any jar error
//! is logged and treated as "no cookie".

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::{SessionStore, StoreKind, StoreRead};
use crate::codec::{self, Transport};
use crate::error::TransportError;
use crate::token::TokenPair;

/// Access to the browser's cookies for the current page.
pub trait CookieJar: Send + Sync {
    /// Current value of `name`, or `None` if unset or expired.
    fn get(&self, name: &str) -> Result<Option<String>, TransportError>;

    fn set(&self, name: &str, value: &str, max_age: Duration) -> Result<(), TransportError>;

    /// Delete `name`. Deleting a missing cookie is not an error.
    fn remove(&self, name: &str) -> Result<(), TransportError>;
}

/// A stored cookie with its absolute expiry (Unix seconds).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredCookie {
    value: String,
    expires_at: i64,
}

impl StoredCookie {
    fn new(value: &str, max_age: Duration) -> Self {
        let max_age = i64::try_from(max_age.as_secs()).unwrap_or(i64::MAX);
        Self {
            value: value.to_string(),
            expires_at: Utc::now().timestamp().saturating_add(max_age),
        }
    }

    fn is_live(&self, now: i64) -> bool {
        self.expires_at > now
    }
}

// ── Cookie jars ─────────────────────────────────────────────────

/// In-process cookie jar that honours max-age.
#[derive(Debug, Default)]
pub struct MemoryCookieJar {
    cookies: Mutex<HashMap<String, StoredCookie>>,
}

impl MemoryCookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a raw value, bypassing any encoding. Useful to seed a jar.
    pub fn insert_raw(&self, name: &str, value: &str, max_age: Duration) {
        self.cookies
            .lock()
            .insert(name.to_string(), StoredCookie::new(value, max_age));
    }

    pub fn len(&self) -> usize {
        let now = Utc::now().timestamp();
        self.cookies.lock().values().filter(|c| c.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CookieJar for MemoryCookieJar {
    fn get(&self, name: &str) -> Result<Option<String>, TransportError> {
        let now = Utc::now().timestamp();
        let mut cookies = self.cookies.lock();
        let found = cookies
            .get(name)
            .map(|cookie| (cookie.is_live(now), cookie.value.clone()));
        match found {
            Some((true, value)) => Ok(Some(value)),
            Some((false, _)) => {
                cookies.remove(name);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set(&self, name: &str, value: &str, max_age: Duration) -> Result<(), TransportError> {
        self.insert_raw(name, value, max_age);
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<(), TransportError> {
        self.cookies.lock().remove(name);
        Ok(())
    }
}

/// Cookie jar persisted as a JSON file, so separate process runs share
/// cookies the way separate page loads share a browser profile.
#[derive(Debug)]
pub struct FileCookieJar {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileCookieJar {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<HashMap<String, StoredCookie>, TransportError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) if contents.trim().is_empty() => Ok(HashMap::new()),
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, cookies: &HashMap<String, StoredCookie>) -> Result<(), TransportError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(cookies)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl CookieJar for FileCookieJar {
    fn get(&self, name: &str) -> Result<Option<String>, TransportError> {
        let _guard = self.lock.lock();
        let now = Utc::now().timestamp();
        Ok(self
            .load()?
            .remove(name)
            .filter(|c| c.is_live(now))
            .map(|c| c.value))
    }

    fn set(&self, name: &str, value: &str, max_age: Duration) -> Result<(), TransportError> {
        let _guard = self.lock.lock();
        let now = Utc::now().timestamp();
        let mut cookies = self.load()?;
        cookies.retain(|_, c| c.is_live(now));
        cookies.insert(name.to_string(), StoredCookie::new(value, max_age));
        self.save(&cookies)
    }

    fn remove(&self, name: &str) -> Result<(), TransportError> {
        let _guard = self.lock.lock();
        let mut cookies = self.load()?;
        if cookies.remove(name).is_some() {
            self.save(&cookies)?;
        }
        Ok(())
    }
}

// ── Store ───────────────────────────────────────────────────────

/// [`SessionStore`] over a [`CookieJar`].
pub struct CookieStore {
    jar: Arc<dyn CookieJar>,
    key: String,
    max_age: Duration,
}

impl CookieStore {
    pub fn new(jar: Arc<dyn CookieJar>, key: &str, max_age: Duration) -> Self {
        Self {
            jar,
            key: key.to_string(),
            max_age,
        }
    }
}

impl SessionStore for CookieStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Cookie
    }

    fn read(&self) -> StoreRead {
        let raw = match self.jar.get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return StoreRead::Absent,
            Err(e) => {
                tracing::warn!(store = "cookie", "Load cookie error: {e}");
                return StoreRead::Absent;
            }
        };

        match codec::decode(&raw, Transport::Json) {
            Ok(tokens) => StoreRead::Payload(tokens),
            Err(e) => {
                tracing::warn!(store = "cookie", "Ignoring unreadable session cookie: {e}");
                StoreRead::Absent
            }
        }
    }

    fn write(&self, tokens: &TokenPair) {
        let payload = match codec::encode(tokens, Transport::Json) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(store = "cookie", "Not saving session cookie: {e}");
                return;
            }
        };
        match self.jar.set(&self.key, &payload, self.max_age) {
            Ok(()) => tracing::debug!(
                store = "cookie",
                fingerprint = %tokens.fingerprint(),
                max_age_secs = self.max_age.as_secs(),
                "Session cookie saved"
            ),
            Err(e) => tracing::warn!(store = "cookie", "Save cookie error: {e}"),
        }
    }

    fn clear(&self) {
        if let Err(e) = self.jar.remove(&self.key) {
            tracing::warn!(store = "cookie", "Clear cookie error: {e}");
        }
    }
}
