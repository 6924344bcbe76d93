//! Session configuration.
//!
//! Loaded from `~/.dashboard-session/config.toml` (or an explicit path),
//! then overridden from the environment:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `SUPABASE_URL`, `SUPABASE_KEY` | `[supabase]` |
//! | `DASHBOARD_SESSION_STORE` | `store` |
//! | `DASHBOARD_SESSION_LOG` | `log_level` |
//!
//! ```toml
//! store = "local_storage"
//! cookie_max_age_secs = 86400
//!
//! [supabase]
//! url = "https://xxxx.supabase.co"
//! anon_key = "eyJ..."
//! ```

use anyhow::Context;
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::integrations::supabase::SupabaseConfig;
use crate::store::{StoreKind, COOKIE_MAX_AGE_SECS, QUERY_PARAM_KEY, SESSION_KEY};

/// Directory under the home directory holding config and CLI state.
const APP_DIR: &str = ".dashboard-session";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Channel the session is persisted in.
    pub store: StoreKind,
    pub cookie_key: String,
    pub cookie_max_age_secs: u64,
    pub query_param: String,
    pub storage_key: String,
    /// On a failed restore, also clear the channels that are not active.
    pub clear_all_channels_on_failure: bool,
    /// Default `tracing` filter when `RUST_LOG` is unset.
    pub log_level: String,
    pub supabase: Option<SupabaseConfig>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            store: StoreKind::default(),
            cookie_key: SESSION_KEY.to_string(),
            cookie_max_age_secs: COOKIE_MAX_AGE_SECS,
            query_param: QUERY_PARAM_KEY.to_string(),
            storage_key: SESSION_KEY.to_string(),
            clear_all_channels_on_failure: true,
            log_level: "info".to_string(),
            supabase: None,
        }
    }
}

impl SessionConfig {
    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(contents).context("Failed to parse session config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml_str(&contents).with_context(|| format!("Invalid config {}", path.display()))
    }

    /// Load `path` (or the default location), falling back to defaults when
    /// the file does not exist, then apply environment overrides.
    pub fn load_or_default(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = path.map(Path::to_path_buf).or_else(Self::default_path);
        let mut config = match path {
            Some(ref p) if p.exists() => Self::load(p)?,
            _ => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// `~/.dashboard-session`, if a home directory can be found.
    pub fn app_dir() -> Option<PathBuf> {
        UserDirs::new().map(|u| u.home_dir().join(APP_DIR))
    }

    pub fn default_path() -> Option<PathBuf> {
        Self::app_dir().map(|dir| dir.join("config.toml"))
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    pub(crate) fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(supabase) = SupabaseConfig::from_lookup(&lookup) {
            let timeout_secs = self
                .supabase
                .as_ref()
                .map_or(supabase.timeout_secs, |s| s.timeout_secs);
            self.supabase = Some(SupabaseConfig {
                timeout_secs,
                ..supabase
            });
        }

        if let Some(raw) = lookup("DASHBOARD_SESSION_STORE") {
            match raw.parse::<StoreKind>() {
                Ok(kind) => self.store = kind,
                Err(e) => tracing::warn!("Ignoring DASHBOARD_SESSION_STORE: {e}"),
            }
        }

        if let Some(level) = lookup("DASHBOARD_SESSION_LOG").filter(|l| !l.trim().is_empty()) {
            self.log_level = level;
        }
    }

    pub fn cookie_max_age(&self) -> Duration {
        Duration::from_secs(self.cookie_max_age_secs)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.cookie_key.trim().is_empty() {
            anyhow::bail!("cookie_key cannot be empty");
        }
        if self.storage_key.trim().is_empty() {
            anyhow::bail!("storage_key cannot be empty");
        }
        if self.query_param.trim().is_empty() {
            anyhow::bail!("query_param cannot be empty");
        }
        if self.cookie_max_age_secs == 0 {
            anyhow::bail!("cookie_max_age_secs must be positive");
        }
        Ok(())
    }
}
