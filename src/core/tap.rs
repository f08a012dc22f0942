//! A draft tap: one flow meter, optionally one attached keg.

use serde::{Deserialize, Serialize};

/// Default flow-meter calibration (Vision FT330 class meters).
pub const DEFAULT_TICKS_PER_ML: f64 = 2.2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tap {
    /// Registry id, assigned by the tap manager on registration. Zero
    /// until then.
    pub id: u32,
    /// Meter identity as reported on the wire, e.g. `kegboard.flow0`.
    /// Unique within the registry.
    pub meter_name: String,
    /// Display name, e.g. `Main Tap`.
    pub tap_name: String,
    /// Meter calibration. Must be positive.
    pub ticks_per_ml: f64,
    /// Relay controlling this tap's valve, if wired.
    pub relay_name: Option<String>,
    /// Temperature sensor associated with this tap's keg, if wired.
    pub thermo_sensor_name: Option<String>,
    /// Keg currently attached, if any.
    pub current_keg_id: Option<u32>,
}

impl Tap {
    pub fn new(meter_name: impl Into<String>, tap_name: impl Into<String>) -> Self {
        Self {
            id: 0,
            meter_name: meter_name.into(),
            tap_name: tap_name.into(),
            ticks_per_ml: DEFAULT_TICKS_PER_ML,
            relay_name: None,
            thermo_sensor_name: None,
            current_keg_id: None,
        }
    }

    pub fn with_ticks_per_ml(mut self, ticks_per_ml: f64) -> Self {
        self.ticks_per_ml = ticks_per_ml;
        self
    }

    pub fn with_relay(mut self, relay_name: impl Into<String>) -> Self {
        self.relay_name = Some(relay_name.into());
        self
    }

    pub fn with_thermo_sensor(mut self, sensor_name: impl Into<String>) -> Self {
        self.thermo_sensor_name = Some(sensor_name.into());
        self
    }

    pub fn volume_ml_for_ticks(&self, ticks: u32) -> f64 {
        f64::from(ticks) / self.ticks_per_ml
    }

    pub fn has_active_keg(&self) -> bool {
        self.current_keg_id.is_some()
    }
}
