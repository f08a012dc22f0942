//! In-process accounting backend.
//!
//! Keeps kegs, drinks, sessions, and sensor logs in memory and assigns ids
//! monotonically. Sessions are formed by the drink-gap rule: a drink more
//! than the configured gap after the previous one opens a new session.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;

use crate::app::ports::Clock;
use crate::backend::models::{
    Drink, Keg, PourRecord, Session, SystemEvent, SystemEventKind, TemperatureRecord, ThermoLog,
};
use crate::backend::{keg_sizes, Backend, BackendError};

pub struct LocalBackend {
    clock: Arc<dyn Clock>,
    session_gap_millis: u64,

    kegs: Vec<Keg>,
    drinks: Vec<Drink>,
    sessions: Vec<Session>,
    thermo_logs: Vec<ThermoLog>,
    events: Vec<SystemEvent>,
    /// Meter name of the tap each online keg is attached to.
    tap_kegs: HashMap<String, u32>,

    next_keg_id: u32,
    next_drink_id: u32,
    next_session_id: u32,
    next_thermo_id: u32,
    next_event_id: u32,
}

impl LocalBackend {
    pub fn new(clock: Arc<dyn Clock>, session_gap_minutes: u32) -> Self {
        Self {
            clock,
            session_gap_millis: u64::from(session_gap_minutes) * 60_000,
            kegs: Vec::new(),
            drinks: Vec::new(),
            sessions: Vec::new(),
            thermo_logs: Vec::new(),
            events: Vec::new(),
            tap_kegs: HashMap::new(),
            next_keg_id: 1,
            next_drink_id: 1,
            next_session_id: 1,
            next_thermo_id: 1,
            next_event_id: 1,
        }
    }

    pub fn thermo_logs(&self) -> &[ThermoLog] {
        &self.thermo_logs
    }

    /// Most recent reading per sensor name.
    pub fn latest_temperature(&self, sensor_name: &str) -> Option<&ThermoLog> {
        self.thermo_logs
            .iter()
            .rev()
            .find(|l| l.sensor_name == sensor_name)
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    fn push_event(
        &mut self,
        kind: SystemEventKind,
        drink_id: Option<u32>,
        keg_id: Option<u32>,
        session_id: Option<u32>,
        username: Option<String>,
    ) {
        let event = SystemEvent {
            id: self.next_event_id,
            kind,
            time_millis: self.clock.elapsed_millis(),
            drink_id,
            keg_id,
            session_id,
            username,
        };
        self.next_event_id += 1;
        self.events.push(event);
    }

    /// Session for a drink at `pour_time_millis`. Joins the latest session
    /// when the gap rule allows, otherwise opens a new one.
    fn assign_session(&mut self, pour_time_millis: u64, username: Option<&str>) -> u32 {
        let gap = self.session_gap_millis;
        let joined = self
            .sessions
            .last_mut()
            .filter(|s| pour_time_millis.saturating_sub(s.last_drink_millis) <= gap)
            .map(|session| {
                session.last_drink_millis = session.last_drink_millis.max(pour_time_millis);
                session.id
            });
        if let Some(id) = joined {
            self.push_event(
                SystemEventKind::SessionJoined,
                None,
                None,
                Some(id),
                username.map(str::to_owned),
            );
            id
        } else {
            let id = self.next_session_id;
            self.next_session_id += 1;
            self.sessions.push(Session {
                id,
                start_time_millis: pour_time_millis,
                last_drink_millis: pour_time_millis,
                volume_ml: 0.0,
                drink_count: 0,
                stats: json!({ "volume_by_user": {} }),
            });
            self.push_event(
                SystemEventKind::SessionStarted,
                None,
                None,
                Some(id),
                username.map(str::to_owned),
            );
            id
        }
    }

    fn update_session_stats(&mut self, session_id: u32, volume_ml: f64, username: Option<&str>) {
        let Some(session) = self.sessions.iter_mut().find(|s| s.id == session_id) else {
            return;
        };
        session.volume_ml += volume_ml;
        session.drink_count += 1;
        let user_key = username.unwrap_or("");
        if let Some(by_user) = session
            .stats
            .get_mut("volume_by_user")
            .and_then(|v| v.as_object_mut())
        {
            let prior = by_user.get(user_key).and_then(|v| v.as_f64()).unwrap_or(0.0);
            by_user.insert(user_key.to_owned(), json!(prior + volume_ml));
        }
    }
}

impl Backend for LocalBackend {
    fn start_keg(
        &mut self,
        meter_name: &str,
        beverage_name: &str,
        producer_name: &str,
        style_name: &str,
        keg_type: &str,
    ) -> Result<Keg, BackendError> {
        let full_volume_ml = keg_sizes::volume_ml(keg_type).ok_or_else(|| {
            BackendError::InvalidArgument(format!("unknown keg size '{keg_type}'"))
        })?;

        if let Some(previous) = self.tap_kegs.get(meter_name).copied() {
            self.end_keg(previous)?;
        }

        let keg = Keg {
            id: self.next_keg_id,
            beverage_name: beverage_name.to_owned(),
            producer_name: producer_name.to_owned(),
            style_name: style_name.to_owned(),
            keg_type: keg_type.to_owned(),
            full_volume_ml,
            served_volume_ml: 0.0,
            spilled_volume_ml: 0.0,
            online: true,
            start_time_millis: self.clock.elapsed_millis(),
            end_time_millis: None,
        };
        self.next_keg_id += 1;
        self.tap_kegs.insert(meter_name.to_owned(), keg.id);
        self.kegs.push(keg.clone());
        self.push_event(SystemEventKind::KegTapped, None, Some(keg.id), None, None);
        log::info!("keg {} ({beverage_name}) tapped on {meter_name}", keg.id);
        Ok(keg)
    }

    fn end_keg(&mut self, keg_id: u32) -> Result<Keg, BackendError> {
        let now = self.clock.elapsed_millis();
        let keg = self
            .kegs
            .iter_mut()
            .find(|k| k.id == keg_id)
            .ok_or_else(|| BackendError::NotFound(format!("keg {keg_id}")))?;
        if keg.online {
            keg.online = false;
            keg.end_time_millis = Some(now);
            let snapshot = keg.clone();
            self.tap_kegs.retain(|_, id| *id != keg_id);
            self.push_event(SystemEventKind::KegEnded, None, Some(keg_id), None, None);
            log::info!("keg {keg_id} ended");
            Ok(snapshot)
        } else {
            Ok(keg.clone())
        }
    }

    fn keg(&self, keg_id: u32) -> Result<Keg, BackendError> {
        self.kegs
            .iter()
            .find(|k| k.id == keg_id)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(format!("keg {keg_id}")))
    }

    fn keg_on_tap(&self, meter_name: &str) -> Option<Keg> {
        let keg_id = *self.tap_kegs.get(meter_name)?;
        self.kegs.iter().find(|k| k.id == keg_id).cloned()
    }

    fn record_drink(&mut self, record: &PourRecord) -> Result<Option<Drink>, BackendError> {
        let keg_id = *self.tap_kegs.get(&record.meter_name).ok_or_else(|| {
            BackendError::NotFound(format!("no keg on tap '{}'", record.meter_name))
        })?;

        {
            let keg = self
                .kegs
                .iter_mut()
                .find(|k| k.id == keg_id)
                .ok_or_else(|| BackendError::NotFound(format!("keg {keg_id}")))?;
            if record.spilled {
                keg.spilled_volume_ml += record.volume_ml;
            } else {
                keg.served_volume_ml += record.volume_ml;
            }
            if keg.remaining_volume_ml() < 0.0 {
                log::warn!(
                    "keg {keg_id} overpoured, remaining {:.1} ml",
                    keg.remaining_volume_ml()
                );
            }
        }

        if record.spilled {
            return Ok(None);
        }

        let session_id =
            self.assign_session(record.pour_time_millis, record.username.as_deref());
        let drink = Drink {
            id: self.next_drink_id,
            keg_id,
            meter_name: record.meter_name.clone(),
            session_id,
            ticks: record.ticks,
            volume_ml: record.volume_ml,
            username: record.username.clone(),
            pour_time_millis: record.pour_time_millis,
            duration_seconds: record.duration_seconds,
            shout: record.shout.clone(),
        };
        self.next_drink_id += 1;
        self.drinks.push(drink.clone());
        self.update_session_stats(session_id, record.volume_ml, record.username.as_deref());
        self.push_event(
            SystemEventKind::DrinkPoured,
            Some(drink.id),
            Some(keg_id),
            Some(session_id),
            record.username.clone(),
        );
        log::info!(
            "drink {}: {:.1} ml ({} ticks) on keg {keg_id} by {}",
            drink.id,
            drink.volume_ml,
            drink.ticks,
            drink.username.as_deref().unwrap_or("<anonymous>")
        );
        Ok(Some(drink))
    }

    fn record_temperature(
        &mut self,
        record: &TemperatureRecord,
    ) -> Result<ThermoLog, BackendError> {
        if record.sensor_name.is_empty() {
            return Err(BackendError::InvalidArgument("empty sensor name".into()));
        }
        let entry = ThermoLog {
            id: self.next_thermo_id,
            sensor_name: record.sensor_name.clone(),
            temp_c: record.temp_c,
            record_time_millis: record.record_time_millis,
        };
        self.next_thermo_id += 1;
        self.thermo_logs.push(entry.clone());
        Ok(entry)
    }

    fn current_session(&self) -> Option<Session> {
        let session = self.sessions.last()?;
        let now = self.clock.elapsed_millis();
        if now.saturating_sub(session.last_drink_millis) <= self.session_gap_millis {
            Some(session.clone())
        } else {
            None
        }
    }

    fn session_stats(&self, session_id: u32) -> Option<serde_json::Value> {
        self.sessions
            .iter()
            .find(|s| s.id == session_id)
            .map(|s| {
                serde_json::json!({
                    "session_id": s.id,
                    "volume_ml": s.volume_ml,
                    "drink_count": s.drink_count,
                    "stats": s.stats,
                })
            })
    }

    fn drinks(&self) -> Vec<Drink> {
        self.drinks.clone()
    }

    fn events(&self) -> Vec<SystemEvent> {
        self.events.clone()
    }
}
