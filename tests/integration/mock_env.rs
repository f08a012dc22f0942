//! Test doubles: deterministic clock, recording event sink, and a backend
//! with an injectable outage.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use kegcore::app::events::CoreEvent;
use kegcore::app::ports::{Clock, EventSink};
use kegcore::backend::local::LocalBackend;
use kegcore::backend::models::{
    Drink, Keg, PourRecord, Session, SystemEvent, TemperatureRecord, ThermoLog,
};
use kegcore::backend::{Backend, BackendError};

pub struct FakeClock(AtomicU64);

impl FakeClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self(AtomicU64::new(0)))
    }

    pub fn advance(&self, millis: u64) {
        self.0.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for FakeClock {
    fn elapsed_millis(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Sink that records every event; the test keeps a handle to the shared
/// vector.
pub struct RecordingSink(pub Arc<Mutex<Vec<CoreEvent>>>);

impl RecordingSink {
    pub fn new() -> (Self, Arc<Mutex<Vec<CoreEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        (Self(events.clone()), events)
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &CoreEvent) {
        self.0.lock().unwrap().push(event.clone());
    }
}

/// Wraps [`LocalBackend`] and rejects writes as unavailable while the
/// shared flag is down.
pub struct FlakyBackend {
    inner: LocalBackend,
    available: Arc<AtomicBool>,
}

impl FlakyBackend {
    pub fn new(inner: LocalBackend) -> (Self, Arc<AtomicBool>) {
        let available = Arc::new(AtomicBool::new(true));
        (
            Self {
                inner,
                available: available.clone(),
            },
            available,
        )
    }

    pub fn inner(&self) -> &LocalBackend {
        &self.inner
    }

    fn check(&self) -> Result<(), BackendError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BackendError::Unavailable("injected outage".into()))
        }
    }
}

impl Backend for FlakyBackend {
    fn start_keg(
        &mut self,
        meter_name: &str,
        beverage_name: &str,
        producer_name: &str,
        style_name: &str,
        keg_type: &str,
    ) -> Result<Keg, BackendError> {
        self.check()?;
        self.inner
            .start_keg(meter_name, beverage_name, producer_name, style_name, keg_type)
    }

    fn end_keg(&mut self, keg_id: u32) -> Result<Keg, BackendError> {
        self.check()?;
        self.inner.end_keg(keg_id)
    }

    fn keg(&self, keg_id: u32) -> Result<Keg, BackendError> {
        self.inner.keg(keg_id)
    }

    fn keg_on_tap(&self, meter_name: &str) -> Option<Keg> {
        self.inner.keg_on_tap(meter_name)
    }

    fn record_drink(&mut self, record: &PourRecord) -> Result<Option<Drink>, BackendError> {
        self.check()?;
        self.inner.record_drink(record)
    }

    fn record_temperature(
        &mut self,
        record: &TemperatureRecord,
    ) -> Result<ThermoLog, BackendError> {
        self.check()?;
        self.inner.record_temperature(record)
    }

    fn current_session(&self) -> Option<Session> {
        self.inner.current_session()
    }

    fn session_stats(&self, session_id: u32) -> Option<serde_json::Value> {
        self.inner.session_stats(session_id)
    }

    fn drinks(&self) -> Vec<Drink> {
        self.inner.drinks()
    }

    fn events(&self) -> Vec<SystemEvent> {
        self.inner.events()
    }
}
