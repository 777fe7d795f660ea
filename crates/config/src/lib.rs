//! Configuration snapshots for the wake-phrase listener.
//!
//! `RuntimeConfig` is a value type: the controller never mutates it in
//! place, and a change is detected purely by equality comparison. That
//! comparison is the reconciliation guard that decides whether the
//! recognition source must be restarted.

use serde::{Deserialize, Serialize};

/// Configuration a recognition source run is started with.
///
/// Two configs are equal iff all three fields are equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfig {
    /// Trigger phrases in priority order. Empty or whitespace-only entries
    /// are tolerated; the matcher ignores them.
    pub triggers: Vec<String>,
    /// Input device identifier, or the platform default when absent.
    #[serde(default)]
    pub microphone_id: Option<String>,
    /// Recognition locale identifier, or the platform default when absent.
    #[serde(default)]
    pub locale_id: Option<String>,
}

impl RuntimeConfig {
    /// Convenience constructor for a trigger-only config.
    pub fn with_triggers<I, S>(triggers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            triggers: triggers.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }
}

/// Settings push delivered to the controller.
///
/// The permission decision is externally determined and travels alongside
/// the snapshot, not inside it, so it never participates in config equality.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsSnapshot {
    /// Whether the listener should run at all.
    pub enabled: bool,
    /// The configuration to run with while enabled.
    #[serde(flatten)]
    pub config: RuntimeConfig,
}

impl SettingsSnapshot {
    pub fn enabled(config: RuntimeConfig) -> Self {
        Self {
            enabled: true,
            config,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            config: RuntimeConfig::default(),
        }
    }
}
