//! Core configuration parameters.
//!
//! All tunable parameters for the pour-accounting core. Values can be
//! overridden through the [`ConfigStore`](crate::app::ports::ConfigStore)
//! collaborator (one named setting per field).

use serde::{Deserialize, Serialize};

use crate::app::ports::ConfigStore;

/// Core system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    // --- Flows ---
    /// Seconds a flow may sit without meter activity before it is ended.
    pub idle_timeout_secs: u32,
    /// Pours smaller than this are discarded instead of recorded.
    pub minimum_volume_ml: f64,
    /// Meter calibration used for taps without their own value.
    pub default_ticks_per_ml: f64,

    // --- Sessions ---
    /// Drinks separated by more than this gap start a new session.
    pub session_gap_minutes: u32,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            // Flows
            idle_timeout_secs: 30,
            minimum_volume_ml: 10.0,
            // YF-S201-class meters as shipped with the kegboard
            default_ticks_per_ml: 2.2,

            // Sessions
            session_gap_minutes: 180,
        }
    }
}

impl CoreConfig {
    pub const KEY_IDLE_TIMEOUT_SECS: &'static str = "idle_timeout_secs";
    pub const KEY_MINIMUM_VOLUME_ML: &'static str = "minimum_volume_ml";
    pub const KEY_TICKS_PER_ML: &'static str = "ticks_per_ml";
    pub const KEY_SESSION_GAP_MINUTES: &'static str = "session_gap_minutes";

    /// Build a config from the store's named settings, falling back to
    /// defaults for anything unset.
    pub fn from_store(store: &dyn ConfigStore) -> Self {
        let defaults = Self::default();
        Self {
            idle_timeout_secs: store
                .get_i64(Self::KEY_IDLE_TIMEOUT_SECS)
                .map_or(defaults.idle_timeout_secs, |v| v.max(0) as u32),
            minimum_volume_ml: store
                .get_string(Self::KEY_MINIMUM_VOLUME_ML)
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.minimum_volume_ml),
            default_ticks_per_ml: store
                .get_string(Self::KEY_TICKS_PER_ML)
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.default_ticks_per_ml),
            session_gap_minutes: store
                .get_i64(Self::KEY_SESSION_GAP_MINUTES)
                .map_or(defaults.session_gap_minutes, |v| v.max(0) as u32),
        }
    }

    /// Validate field ranges. Invalid values are rejected, not clamped.
    pub fn validate(&self) -> crate::Result<()> {
        if self.idle_timeout_secs == 0 {
            return Err(crate::Error::Config("idle_timeout_secs must be > 0"));
        }
        if !self.minimum_volume_ml.is_finite() || self.minimum_volume_ml < 0.0 {
            return Err(crate::Error::Config("minimum_volume_ml must be >= 0"));
        }
        if !self.default_ticks_per_ml.is_finite() || self.default_ticks_per_ml <= 0.0 {
            return Err(crate::Error::Config("default_ticks_per_ml must be > 0"));
        }
        if self.session_gap_minutes == 0 {
            return Err(crate::Error::Config("session_gap_minutes must be > 0"));
        }
        Ok(())
    }

    /// Idle timeout in milliseconds, as consumed by the flow manager.
    pub fn idle_timeout_ms(&self) -> u64 {
        u64::from(self.idle_timeout_secs) * 1000
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mem_store::MemStore;

    #[test]
    fn default_config_is_sane() {
        let c = CoreConfig::default();
        assert!(c.validate().is_ok());
        assert!(c.idle_timeout_secs > 0);
        assert!(c.default_ticks_per_ml > 0.0);
        assert_eq!(c.idle_timeout_ms(), 30_000);
    }

    #[test]
    fn serde_roundtrip() {
        let c = CoreConfig::default();
        let json = serde_json::to_string(&c).unwrap();
        let c2: CoreConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(c.idle_timeout_secs, c2.idle_timeout_secs);
        assert!((c.default_ticks_per_ml - c2.default_ticks_per_ml).abs() < 1e-9);
    }

    #[test]
    fn from_store_overrides_defaults() {
        let mut store = MemStore::new();
        store.put_i64(CoreConfig::KEY_IDLE_TIMEOUT_SECS, 90);
        store.put_string(CoreConfig::KEY_MINIMUM_VOLUME_ML, "25.0");

        let c = CoreConfig::from_store(&store);
        assert_eq!(c.idle_timeout_secs, 90);
        assert!((c.minimum_volume_ml - 25.0).abs() < 1e-9);
        // Unset keys keep defaults.
        assert_eq!(c.session_gap_minutes, 180);
    }

    #[test]
    fn rejects_zero_idle_timeout() {
        let c = CoreConfig {
            idle_timeout_secs: 0,
            ..Default::default()
        };
        assert!(matches!(c.validate(), Err(crate::Error::Config(_))));
    }
}
