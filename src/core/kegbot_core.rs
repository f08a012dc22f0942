//! Top-level orchestrator.
//!
//! Owns one instance of each manager behind its own mutex and wires the
//! byte stream, the accounting backend, the durable pending queue, and the
//! event sink together. Mutexes are always taken in the fixed order
//! taps, flows, factory, backend, store, sink; no callback runs while a
//! manager lock is held.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::app::events::CoreEvent;
use crate::app::ports::{Clock, ConfigStore, EventSink, PendingKind, PendingStore};
use crate::backend::models::{Drink, Keg, PourRecord, TemperatureRecord};
use crate::backend::{Backend, BackendError};
use crate::config::CoreConfig;
use crate::core::flow::Flow;
use crate::core::flow_manager::FlowManager;
use crate::core::tap::Tap;
use crate::core::tap_manager::TapManager;
use crate::error::Result;
use crate::kegboard::{KegboardMessage, MessageFactory};

/// Event collector used while manager locks are held; contents are
/// forwarded to the real sink after the locks drop.
#[derive(Default)]
struct BufferSink {
    events: Vec<CoreEvent>,
}

impl EventSink for BufferSink {
    fn emit(&mut self, event: &CoreEvent) {
        self.events.push(event.clone());
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct KegbotCore<B, S, E>
where
    B: Backend,
    S: ConfigStore + PendingStore,
    E: EventSink,
{
    config: CoreConfig,
    clock: Arc<dyn Clock>,
    taps: Mutex<TapManager>,
    flows: Mutex<FlowManager>,
    factory: Mutex<MessageFactory>,
    backend: Mutex<B>,
    store: Mutex<S>,
    sink: Mutex<E>,
}

impl<B, S, E> KegbotCore<B, S, E>
where
    B: Backend,
    S: ConfigStore + PendingStore,
    E: EventSink,
{
    pub fn new(config: CoreConfig, clock: Arc<dyn Clock>, backend: B, store: S, sink: E) -> Self {
        let flows = FlowManager::new(
            clock.clone(),
            config.idle_timeout_ms(),
            config.default_ticks_per_ml,
        );
        Self {
            config,
            clock,
            taps: Mutex::new(TapManager::new()),
            flows: Mutex::new(flows),
            factory: Mutex::new(MessageFactory::new()),
            backend: Mutex::new(backend),
            store: Mutex::new(store),
            sink: Mutex::new(sink),
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    // ── byte stream ────────────────────────────────────────────

    /// Feed raw serial bytes and process every complete message they
    /// yield. Malformed frames are skipped inside the factory.
    pub fn handle_bytes(&self, bytes: &[u8]) {
        let messages = {
            let mut factory = lock(&self.factory);
            factory.add_bytes(bytes);
            factory.drain_messages()
        };
        for message in messages {
            self.handle_message(&message);
        }
    }

    pub fn handle_message(&self, message: &KegboardMessage) {
        match message {
            KegboardMessage::MeterStatus(status) => {
                self.handle_meter_status(&status.meter_name, status.reading);
            }
            KegboardMessage::TemperatureReading(reading) => {
                let record = TemperatureRecord {
                    sensor_name: reading.sensor_name.clone(),
                    temp_c: reading.temp_c,
                    record_time_millis: self.clock.elapsed_millis(),
                };
                self.commit_temperature(&record);
            }
            KegboardMessage::Hello(hello) => {
                log::info!(
                    "controller hello: serial '{}', firmware {:?}",
                    hello.serial_number(),
                    hello.firmware_version()
                );
            }
            KegboardMessage::AuthToken(token) => {
                log::info!(
                    "auth token {} on '{}' ({:?}); no authentication manager bound",
                    token.token,
                    token.device_name,
                    token.status
                );
            }
            other => {
                log::debug!("ignoring message type {:#04x}", other.message_type());
            }
        }
    }

    fn handle_meter_status(&self, meter_name: &str, reading: u32) {
        let tap = lock(&self.taps).tap(meter_name).cloned();
        let mut buffer = BufferSink::default();
        lock(&self.flows).handle_meter_activity(meter_name, reading, tap.as_ref(), &mut buffer);
        self.dispatch(buffer);
    }

    // ── flows ──────────────────────────────────────────────────

    /// Bind a user to the given tap's flow, starting one if needed.
    pub fn activate_user(&self, meter_name: &str, username: &str) {
        let tap = lock(&self.taps).tap(meter_name).cloned();
        let mut buffer = BufferSink::default();
        lock(&self.flows).activate_user(meter_name, username, tap.as_ref(), &mut buffer);
        let ended: Vec<Flow> = buffer.events.iter().filter_map(ended_flow).collect();
        self.dispatch(buffer);
        for flow in ended {
            self.commit_flow(&flow);
        }
    }

    /// End the tap's active flow and commit the pour.
    pub fn end_flow(&self, meter_name: &str) -> Option<Flow> {
        let mut buffer = BufferSink::default();
        let flow = lock(&self.flows).end_flow(meter_name, &mut buffer);
        self.dispatch(buffer);
        if let Some(ref flow) = flow {
            self.commit_flow(flow);
        }
        flow
    }

    /// End and commit every flow that has exceeded the idle timeout.
    /// Call periodically from the driving loop.
    pub fn end_idle_flows(&self) -> Vec<Flow> {
        let mut buffer = BufferSink::default();
        let ended = lock(&self.flows).end_idle_flows(&mut buffer);
        self.dispatch(buffer);
        for flow in &ended {
            self.commit_flow(flow);
        }
        ended
    }

    pub fn active_flows(&self) -> Vec<Flow> {
        lock(&self.flows).flows().to_vec()
    }

    pub fn set_flow_shout(&self, meter_name: &str, shout: &str) {
        lock(&self.flows).set_shout(meter_name, shout);
    }

    // ── taps and kegs ──────────────────────────────────────────

    /// Register a tap, returning its assigned registry id.
    pub fn add_tap(&self, tap: Tap) -> Result<u32> {
        let mut buffer = BufferSink::default();
        let id = lock(&self.taps).add_tap(tap, &mut buffer);
        self.dispatch(buffer);
        id
    }

    pub fn remove_tap(&self, meter_name: &str) -> Result<Tap> {
        let mut buffer = BufferSink::default();
        let removed = lock(&self.taps).remove_tap(meter_name, &mut buffer);
        self.dispatch(buffer);
        removed
    }

    pub fn taps(&self) -> Vec<Tap> {
        lock(&self.taps).taps().to_vec()
    }

    pub fn visible_taps(&self) -> Vec<Tap> {
        let taps = lock(&self.taps);
        let store = lock(&self.store);
        taps.visible_taps(&*store).into_iter().cloned().collect()
    }

    pub fn set_tap_visibility(&self, tap_id: u32, visible: bool) {
        let mut taps = lock(&self.taps);
        let mut store = lock(&self.store);
        taps.set_tap_visibility(tap_id, visible, &mut *store);
    }

    pub fn calibrate_meter(&self, meter_name: &str, ticks_per_ml: f64) -> Result<()> {
        lock(&self.taps).calibrate_meter(meter_name, ticks_per_ml)
    }

    /// Attach a fresh keg to a tap, ending any keg already on it.
    pub fn start_keg(
        &self,
        meter_name: &str,
        beverage_name: &str,
        producer_name: &str,
        style_name: &str,
        keg_type: &str,
    ) -> Result<Keg> {
        let mut taps = lock(&self.taps);
        if taps.tap(meter_name).is_none() {
            return Err(crate::error::Error::NotFound(format!("tap '{meter_name}'")));
        }
        let keg = lock(&self.backend).start_keg(
            meter_name,
            beverage_name,
            producer_name,
            style_name,
            keg_type,
        )?;
        let mut buffer = BufferSink::default();
        taps.attach_keg(meter_name, keg.id, &mut buffer)?;
        drop(taps);
        self.dispatch(buffer);
        Ok(keg)
    }

    /// Take the tap's keg offline. The registry keeps the keg attached
    /// until the backend accepts the end, so a failed call leaves both
    /// views agreeing.
    pub fn end_keg(&self, meter_name: &str) -> Result<Option<Keg>> {
        let mut taps = lock(&self.taps);
        let keg_id = taps
            .tap(meter_name)
            .ok_or_else(|| crate::error::Error::NotFound(format!("tap '{meter_name}'")))?
            .current_keg_id;
        let Some(keg_id) = keg_id else {
            return Ok(None);
        };
        let keg = lock(&self.backend).end_keg(keg_id)?;
        let mut buffer = BufferSink::default();
        let _ = taps.detach_keg(meter_name, &mut buffer)?;
        drop(taps);
        self.dispatch(buffer);
        Ok(Some(keg))
    }

    /// All drinks the backend has accepted so far.
    pub fn drinks(&self) -> Vec<Drink> {
        lock(&self.backend).drinks()
    }

    /// Read-only access to the backend, for reporting and tests.
    pub fn with_backend<T>(&self, f: impl FnOnce(&B) -> T) -> T {
        f(&lock(&self.backend))
    }

    /// Read-only access to the store, for reporting and tests.
    pub fn with_store<T>(&self, f: impl FnOnce(&S) -> T) -> T {
        f(&lock(&self.store))
    }

    // ── accounting and the pending queue ───────────────────────

    fn commit_flow(&self, flow: &Flow) {
        if flow.volume_ml() < self.config.minimum_volume_ml {
            log::info!(
                "discarding flow {} below minimum volume ({:.1} ml)",
                flow.id(),
                flow.volume_ml()
            );
            return;
        }
        let record = PourRecord {
            meter_name: flow.meter_name().to_owned(),
            ticks: flow.ticks(),
            volume_ml: flow.volume_ml(),
            username: flow.username().map(str::to_owned),
            pour_time_millis: flow.start_millis(),
            duration_seconds: flow.duration_seconds(),
            shout: flow.shout().map(str::to_owned),
            tick_time_series: Some(flow.tick_time_series()),
            spilled: false,
        };
        self.commit_pour(&record);
    }

    fn commit_pour(&self, record: &PourRecord) {
        let result = lock(&self.backend).record_drink(record);
        match result {
            Ok(Some(drink)) => self.emit_drink(drink),
            Ok(None) => {}
            Err(BackendError::Unavailable(msg)) => {
                log::warn!("backend unavailable ({msg}), queueing pour");
                self.queue_record(PendingKind::Pour, record);
            }
            Err(err) => {
                log::warn!("dropping pour on '{}': {err}", record.meter_name);
            }
        }
    }

    fn commit_temperature(&self, record: &TemperatureRecord) {
        let result = lock(&self.backend).record_temperature(record);
        match result {
            Ok(entry) => {
                log::debug!("logged {:.2} C from '{}'", entry.temp_c, entry.sensor_name);
            }
            Err(BackendError::Unavailable(msg)) => {
                log::warn!("backend unavailable ({msg}), queueing temperature");
                self.queue_record(PendingKind::Temperature, record);
            }
            Err(err) => {
                log::warn!("dropping temperature from '{}': {err}", record.sensor_name);
            }
        }
    }

    fn queue_record<R: serde::Serialize>(&self, kind: PendingKind, record: &R) {
        let bytes = match postcard::to_allocvec(record) {
            Ok(bytes) => bytes,
            Err(err) => {
                log::error!("cannot serialize {kind} record: {err}");
                return;
            }
        };
        if let Err(err) = lock(&self.store).insert(kind, &bytes) {
            log::error!("cannot queue {kind} record: {err}");
        }
    }

    /// Retry queued records oldest-first. Stops at the first record the
    /// backend refuses as unavailable; corrupt rows are discarded. Returns
    /// the number of records committed.
    pub fn drain_pending(&self) -> usize {
        let mut committed = 0;
        loop {
            let head = {
                let store = lock(&self.store);
                store.head()
            };
            let row = match head {
                Ok(Some(row)) => row,
                Ok(None) => break,
                Err(err) => {
                    log::error!("cannot read pending queue: {err}");
                    break;
                }
            };

            // `delivered` distinguishes a real commit from a corrupt row
            // that is merely discarded.
            let mut delivered = false;
            let result = match row.kind {
                PendingKind::Pour => match postcard::from_bytes::<PourRecord>(&row.record) {
                    Ok(record) => lock(&self.backend).record_drink(&record).map(|d| {
                        delivered = true;
                        if let Some(drink) = d {
                            self.emit_drink(drink);
                        }
                    }),
                    Err(_) => {
                        log::warn!("discarding corrupt pending pour (row {})", row.row_id);
                        Ok(())
                    }
                },
                PendingKind::Temperature => {
                    match postcard::from_bytes::<TemperatureRecord>(&row.record) {
                        Ok(record) => lock(&self.backend).record_temperature(&record).map(|_| {
                            delivered = true;
                        }),
                        Err(_) => {
                            log::warn!(
                                "discarding corrupt pending temperature (row {})",
                                row.row_id
                            );
                            Ok(())
                        }
                    }
                }
            };

            match result {
                Ok(()) => {
                    if delivered {
                        committed += 1;
                    }
                    if let Err(err) = lock(&self.store).remove(row.row_id) {
                        log::error!("cannot remove pending row {}: {err}", row.row_id);
                        break;
                    }
                }
                Err(BackendError::Unavailable(msg)) => {
                    log::debug!("backend still unavailable ({msg}), keeping queue");
                    break;
                }
                Err(err) => {
                    log::warn!("discarding unprocessable pending row {}: {err}", row.row_id);
                    if lock(&self.store).remove(row.row_id).is_err() {
                        break;
                    }
                }
            }
        }
        committed
    }

    fn emit_drink(&self, drink: Drink) {
        lock(&self.sink).emit(&CoreEvent::DrinkRecorded(drink));
    }

    fn dispatch(&self, buffer: BufferSink) {
        if buffer.events.is_empty() {
            return;
        }
        let mut sink = lock(&self.sink);
        for event in &buffer.events {
            sink.emit(event);
        }
    }
}

fn ended_flow(event: &CoreEvent) -> Option<Flow> {
    match event {
        CoreEvent::FlowEnded(flow) => Some(flow.clone()),
        _ => None,
    }
}
