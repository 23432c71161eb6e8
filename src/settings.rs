//! User-editable settings.
//!
//! One JSON document persisted by the storage layer and edited through the
//! dashboard. The engine only reads it, through a `watch` channel, so an
//! update is visible from the next tick.
//!
//! Stored documents are merged over the defaults key by key at the top
//! level, and missing fields inside a section fall back to that section's
//! defaults, so older documents keep loading as fields are added.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::tracker::{IsolationPolicy, TrackerParams};
use crate::types::{ContractType, WatchError};

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionSettings {
    pub app_id: String,
    /// Cluster count at which a `pattern` alert is raised.
    pub alert_threshold: u32,
    pub auto_trade: bool,
    pub selected_volatility: String,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            app_id: "1089".to_string(),
            alert_threshold: 5,
            auto_trade: false,
            selected_volatility: "R_25".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AutoTradeSettings {
    pub enabled: bool,
    pub trade_amount: Decimal,
    /// Contract length in ticks.
    pub trade_duration: u32,
    pub min_cluster_size: u32,
    pub contract_type: ContractType,
}

impl Default for AutoTradeSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            trade_amount: Decimal::ONE,
            trade_duration: 1,
            min_cluster_size: 5,
            contract_type: ContractType::DigitDiffers,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SoundSettings {
    pub enabled: bool,
}

impl Default for SoundSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PaperSettings {
    pub enabled: bool,
}

impl Default for PaperSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub connection_settings: ConnectionSettings,
    pub auto_trade_settings: AutoTradeSettings,
    pub sound_settings: SoundSettings,
    pub paper_settings: PaperSettings,
}

impl Settings {
    /// Merge a stored (or submitted) document over the defaults.
    pub fn merged(stored: Value) -> Result<Self, WatchError> {
        let Value::Object(overrides) = stored else {
            return Err(WatchError::InvalidSettings(
                "settings must be a JSON object".into(),
            ));
        };

        let mut base = match serde_json::to_value(Settings::default()) {
            Ok(Value::Object(map)) => map,
            _ => return Err(WatchError::InvalidSettings("defaults not an object".into())),
        };
        for (key, value) in overrides {
            base.insert(key, value);
        }

        serde_json::from_value(Value::Object(base))
            .map_err(|e| WatchError::InvalidSettings(e.to_string()))
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), WatchError> {
        let auto = &self.auto_trade_settings;
        if auto.min_cluster_size < 2 {
            return Err(WatchError::InvalidSettings(format!(
                "minClusterSize must be at least 2 (got {})",
                auto.min_cluster_size
            )));
        }
        if auto.trade_amount <= Decimal::ZERO {
            return Err(WatchError::InvalidSettings(format!(
                "tradeAmount must be positive (got {})",
                auto.trade_amount
            )));
        }
        if auto.trade_duration < 1 {
            return Err(WatchError::InvalidSettings(
                "tradeDuration must be at least 1 tick".into(),
            ));
        }
        if self.connection_settings.alert_threshold < 1 {
            return Err(WatchError::InvalidSettings(
                "alertThreshold must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Auto-trading needs both the connection toggle and the auto-trade
    /// section enabled.
    pub fn auto_trade_enabled(&self) -> bool {
        self.connection_settings.auto_trade && self.auto_trade_settings.enabled
    }

    pub fn paper_trading(&self) -> bool {
        self.paper_settings.enabled
    }

    pub fn min_cluster_size(&self) -> u32 {
        self.auto_trade_settings.min_cluster_size
    }

    pub fn alert_threshold(&self) -> u32 {
        self.connection_settings.alert_threshold
    }

    pub fn tracker_params(&self, isolation: IsolationPolicy) -> TrackerParams {
        TrackerParams {
            min_cluster_size: self.min_cluster_size(),
            isolation,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
