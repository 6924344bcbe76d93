//! Session persistence channels.
//!
//! Every channel implements [`SessionStore`], so the session manager never
//! knows which one it is talking to. Only the browser-storage bridge ever
//! answers [`StoreRead::Pending`], but the contract allows it everywhere.
//!
//! | Kind | Channel | Payload | Sync |
//! |------|---------|---------|------|
//! | `cookie` | browser cookie | JSON | yes |
//! | `query` | URL query parameter `s` | URL-safe base64 | yes |
//! | `local_storage` | `localStorage` via script bridge | JSON + sentinel | no |
//! | `none` | nothing | n/a | yes |

pub mod bridge;
pub mod cookie;
pub mod noop;
pub mod query;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::SessionConfig;
use crate::token::TokenPair;

pub use bridge::{BrowserStorageBridge, ScriptHost, SimulatedBrowser, StorageScript};
pub use cookie::{CookieJar, CookieStore, FileCookieJar, MemoryCookieJar};
pub use noop::NoopStore;
pub use query::{QueryParamStore, QueryParams};

/// Default cookie and `localStorage` key.
pub const SESSION_KEY: &str = "saas_dashboard_session";

/// Default query parameter name.
pub const QUERY_PARAM_KEY: &str = "s";

/// Default cookie lifetime: 24 hours.
pub const COOKIE_MAX_AGE_SECS: u64 = 24 * 3600;

/// Result of reading a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreRead {
    /// A decoded token pair.
    Payload(TokenPair),
    /// The channel has not answered yet; ask again on the next render.
    Pending,
    /// Nothing stored, unreadable, or the channel is unavailable.
    Absent,
}

/// Uniform get/set/clear of a token pair against one physical channel.
///
/// Implementations never fail: channel errors are logged and reads degrade
/// to [`StoreRead::Absent`]. All methods are safe on first use.
pub trait SessionStore: Send + Sync {
    fn kind(&self) -> StoreKind;

    fn read(&self) -> StoreRead;

    fn write(&self, tokens: &TokenPair);

    fn clear(&self);
}

/// Which channel a deployment persists sessions in.
///
/// Config files, the environment and the CLI all accept the same spellings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum StoreKind {
    #[default]
    Cookie,
    Query,
    LocalStorage,
    None,
}

impl StoreKind {
    pub const ALL: [StoreKind; 4] = [Self::Cookie, Self::Query, Self::LocalStorage, Self::None];

    pub fn label(self) -> &'static str {
        match self {
            Self::Cookie => "cookie",
            Self::Query => "query",
            Self::LocalStorage => "local_storage",
            Self::None => "none",
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for StoreKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cookie" | "cookies" => Ok(Self::Cookie),
            "query" | "query_param" | "url" => Ok(Self::Query),
            "local_storage" | "localstorage" | "storage" => Ok(Self::LocalStorage),
            "none" | "off" => Ok(Self::None),
            other => anyhow::bail!(
                "Unknown session store '{other}' (expected cookie, query, local_storage or none)"
            ),
        }
    }
}

impl TryFrom<String> for StoreKind {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Host-provided handles to the browser-side channels.
#[derive(Clone)]
pub struct BrowserChannels {
    pub cookies: Arc<dyn CookieJar>,
    pub query: QueryParams,
    pub scripts: Arc<dyn ScriptHost>,
}

/// Build the store for `kind` using the names and lifetimes from `config`.
pub fn build_store(
    kind: StoreKind,
    config: &SessionConfig,
    channels: &BrowserChannels,
) -> Arc<dyn SessionStore> {
    match kind {
        StoreKind::Cookie => Arc::new(CookieStore::new(
            Arc::clone(&channels.cookies),
            &config.cookie_key,
            config.cookie_max_age(),
        )),
        StoreKind::Query => Arc::new(QueryParamStore::new(
            channels.query.clone(),
            &config.query_param,
        )),
        StoreKind::LocalStorage => Arc::new(BrowserStorageBridge::new(
            Arc::clone(&channels.scripts),
            &config.storage_key,
        )),
        StoreKind::None => Arc::new(NoopStore),
    }
}

/// Every channel other than `active`, for cleanup after a failed restore.
pub fn build_fallback_stores(
    active: StoreKind,
    config: &SessionConfig,
    channels: &BrowserChannels,
) -> Vec<Arc<dyn SessionStore>> {
    StoreKind::ALL
        .into_iter()
        .filter(|kind| *kind != active && *kind != StoreKind::None)
        .map(|kind| build_store(kind, config, channels))
        .collect()
}
