//! Options for a mirrored collection.
//!
//! Options can be built in code or read from the application settings file,
//! where they live under an `"offline"` key next to the application `"name"`.

use serde::Deserialize;

use crate::codec;
use crate::error::{CodecError, Result};
use crate::types::Runtime;

/// Default staleness threshold: 15 days.
pub const DEFAULT_STALE_AFTER_SECS: u64 = 15 * 24 * 60 * 60;
/// Default rehydration debounce window.
pub const DEFAULT_REHYDRATE_DEBOUNCE_SECS: u64 = 60;
/// Default number of retained sync history entries.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Configuration shared by every mirrored collection of one application.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MirrorOptions {
    /// Application namespace, used to name the durable stores.
    pub namespace: String,
    /// `need_sync` turns true once the last sync is older than this.
    pub stale_after_secs: u64,
    /// Minimum spacing between two unforced rehydrations.
    pub rehydrate_debounce_secs: u64,
    /// Sync history entries kept in the control record.
    pub history_limit: usize,
    pub runtime: Runtime,
}

impl Default for MirrorOptions {
    fn default() -> Self {
        Self {
            namespace: "app".to_string(),
            stale_after_secs: DEFAULT_STALE_AFTER_SECS,
            rehydrate_debounce_secs: DEFAULT_REHYDRATE_DEBOUNCE_SECS,
            history_limit: DEFAULT_HISTORY_LIMIT,
            runtime: Runtime::Client,
        }
    }
}

#[derive(Deserialize)]
struct SettingsFile {
    name: Option<String>,
    #[serde(default)]
    offline: Option<OfflineSection>,
}

#[derive(Default, Deserialize)]
struct OfflineSection {
    namespace: Option<String>,
    #[serde(flatten)]
    options: MirrorOptions,
}

impl MirrorOptions {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    /// Read options from a settings document such as
    /// `{ "name": "todo", "offline": { "staleAfterSecs": 86400 } }`.
    ///
    /// The top-level `name` becomes the namespace unless the `offline`
    /// section names one explicitly.
    pub fn from_settings_json(settings: &str) -> Result<Self> {
        let parsed: SettingsFile = serde_json::from_str(settings).map_err(CodecError::Parse)?;
        let OfflineSection { namespace, mut options } = parsed.offline.unwrap_or_default();
        if let Some(namespace) = namespace.or(parsed.name) {
            options.namespace = namespace;
        }
        Ok(options)
    }

    pub fn stale_after(&self) -> chrono::Duration {
        codec::duration_from_secs(self.stale_after_secs)
    }

    pub fn rehydrate_debounce(&self) -> chrono::Duration {
        codec::duration_from_secs(self.rehydrate_debounce_secs)
    }

    pub fn with_runtime(mut self, runtime: Runtime) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn with_stale_after_secs(mut self, secs: u64) -> Self {
        self.stale_after_secs = secs;
        self
    }

    pub fn with_rehydrate_debounce_secs(mut self, secs: u64) -> Self {
        self.rehydrate_debounce_secs = secs;
        self
    }
}
