//! Accounting records: kegs, drinks, sessions, sensor logs.
//!
//! All records are plain serde values. `postcard` carries them through the
//! durable pending queue; `serde_json` renders them for diagnostics and the
//! replay binary.

use serde::{Deserialize, Serialize};

/// A keg attached to (or previously attached to) a tap.
///
/// Volume bookkeeping invariant: `served_volume_ml + spilled_volume_ml +
/// remaining_volume_ml() == full_volume_ml`. Remaining may go negative on
/// overpour; the deficit is reported as-is rather than clamped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keg {
    pub id: u32,
    pub beverage_name: String,
    /// Brewer or producer, recorded as given.
    pub producer_name: String,
    /// Beverage style, recorded as given.
    pub style_name: String,
    /// Keg size label, e.g. `half-barrel`. See [`super::keg_sizes`].
    pub keg_type: String,
    pub full_volume_ml: f64,
    pub served_volume_ml: f64,
    pub spilled_volume_ml: f64,
    pub online: bool,
    pub start_time_millis: u64,
    pub end_time_millis: Option<u64>,
}

impl Keg {
    pub fn remaining_volume_ml(&self) -> f64 {
        self.full_volume_ml - self.served_volume_ml - self.spilled_volume_ml
    }

    /// Fraction of the keg still available, in `[0, 1]` except under
    /// overpour, where it goes negative.
    pub fn percent_full(&self) -> f64 {
        if self.full_volume_ml <= 0.0 {
            return 0.0;
        }
        self.remaining_volume_ml() / self.full_volume_ml
    }
}

/// One committed pour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Drink {
    pub id: u32,
    pub keg_id: u32,
    /// Meter name of the tap the drink was poured on, so the ledger entry
    /// stands alone without the keg record.
    pub meter_name: String,
    pub session_id: u32,
    pub ticks: u32,
    pub volume_ml: f64,
    /// `None` for anonymous pours.
    pub username: Option<String>,
    pub pour_time_millis: u64,
    pub duration_seconds: u32,
    pub shout: Option<String>,
}

/// Drinks grouped by proximity in time. A new session opens when a drink
/// arrives more than the configured gap after the previous one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: u32,
    pub start_time_millis: u64,
    /// Time of the most recent drink in the session.
    pub last_drink_millis: u64,
    pub volume_ml: f64,
    pub drink_count: u32,
    /// Aggregates (per-user volumes and the like), schema-free.
    pub stats: serde_json::Value,
}

/// One temperature sample accepted by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThermoLog {
    pub id: u32,
    pub sensor_name: String,
    pub temp_c: f64,
    pub record_time_millis: u64,
}

/// Notable state changes, kept as an audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemEvent {
    pub id: u32,
    pub kind: SystemEventKind,
    pub time_millis: u64,
    pub drink_id: Option<u32>,
    pub keg_id: Option<u32>,
    pub session_id: Option<u32>,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemEventKind {
    DrinkPoured,
    SessionStarted,
    SessionJoined,
    KegTapped,
    KegEnded,
}

/// A pour ready to commit, or to queue when the backend is unreachable.
///
/// Everything needed to reconstruct the drink later is captured here, so a
/// queued record survives process restarts intact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PourRecord {
    pub meter_name: String,
    pub ticks: u32,
    pub volume_ml: f64,
    pub username: Option<String>,
    pub pour_time_millis: u64,
    pub duration_seconds: u32,
    pub shout: Option<String>,
    /// Space-separated `seconds:ticks` activity samples from the flow.
    pub tick_time_series: Option<String>,
    /// Counted against the keg as spillage instead of a served drink.
    pub spilled: bool,
}

/// A temperature sample to commit, or to queue when the backend is
/// unreachable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemperatureRecord {
    pub sensor_name: String,
    pub temp_c: f64,
    pub record_time_millis: u64,
}
