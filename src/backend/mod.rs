//! Accounting backend boundary.
//!
//! The core records pours and sensor readings through the [`Backend`]
//! trait. [`local::LocalBackend`] is the in-process implementation; tests
//! substitute failing backends to exercise the durable pending queue.

pub mod keg_sizes;
pub mod local;
pub mod models;

use core::fmt;

use models::{Drink, Keg, PourRecord, Session, SystemEvent, TemperatureRecord, ThermoLog};

/// Errors from accounting operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The backend cannot accept writes right now. Records should be queued
    /// and retried; the condition is expected to clear.
    Unavailable(String),
    /// Referenced keg, tap, or session does not exist.
    NotFound(String),
    /// The request is structurally invalid and will never succeed.
    InvalidArgument(String),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable(msg) => write!(f, "backend unavailable: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
        }
    }
}

impl std::error::Error for BackendError {}

impl From<BackendError> for crate::error::Error {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Unavailable(msg) => Self::BackendUnavailable(msg),
            BackendError::NotFound(msg) => Self::NotFound(msg),
            BackendError::InvalidArgument(msg) => Self::InvalidArgument(msg),
        }
    }
}

/// Drink, keg, and sensor accounting.
///
/// Implementations must be internally consistent but need not be durable;
/// durability for unreachable backends is the pending queue's job, layered
/// above this trait.
pub trait Backend {
    /// Attach a new keg to the tap identified by `meter_name`. A keg
    /// already online on that tap is ended first. Beverage metadata
    /// (producer, style) is recorded verbatim, never interpreted.
    fn start_keg(
        &mut self,
        meter_name: &str,
        beverage_name: &str,
        producer_name: &str,
        style_name: &str,
        keg_type: &str,
    ) -> Result<Keg, BackendError>;

    /// Take a keg offline. Idempotent for already-ended kegs.
    fn end_keg(&mut self, keg_id: u32) -> Result<Keg, BackendError>;

    fn keg(&self, keg_id: u32) -> Result<Keg, BackendError>;

    /// The keg currently online at a tap, if any.
    fn keg_on_tap(&self, meter_name: &str) -> Option<Keg>;

    /// Commit a pour against the keg on the record's tap.
    ///
    /// Returns `None` when the record was counted as spillage; spilled
    /// volume debits the keg without creating a drink.
    fn record_drink(&mut self, record: &PourRecord) -> Result<Option<Drink>, BackendError>;

    fn record_temperature(
        &mut self,
        record: &TemperatureRecord,
    ) -> Result<ThermoLog, BackendError>;

    /// The session that would absorb a drink poured right now, if one is
    /// open.
    fn current_session(&self) -> Option<Session>;

    /// Aggregate stats for one session, or `None` for unknown ids.
    fn session_stats(&self, session_id: u32) -> Option<serde_json::Value>;

    fn drinks(&self) -> Vec<Drink>;

    fn events(&self) -> Vec<SystemEvent>;

    /// Distinct usernames seen on recorded drinks, first-pour order.
    /// Empty when nothing authenticated has poured yet.
    fn users(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for drink in self.drinks() {
            if let Some(name) = drink.username {
                if !seen.contains(&name) {
                    seen.push(name);
                }
            }
        }
        seen
    }

    /// Events with ids strictly greater than `after_id`, oldest first.
    fn events_since(&self, after_id: u32) -> Vec<SystemEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.id > after_id)
            .collect()
    }
}
