use std::sync::Arc;

use kegcore::adapters::MemStore;
use kegcore::app::events::CoreEvent;
use kegcore::backend::local::LocalBackend;
use kegcore::backend::Backend;
use kegcore::core::{KegbotCore, Tap};
use kegcore::kegboard::message::{encode_frame, TagMap, MESSAGE_TYPE_METER_STATUS, MESSAGE_TYPE_TEMPERATURE};
use kegcore::CoreConfig;

use crate::mock_env::{FakeClock, FlakyBackend, RecordingSink};

const METER: &str = "kegboard.flow0";

type TestCore = KegbotCore<FlakyBackend, MemStore, RecordingSink>;

struct Env {
    clock: Arc<FakeClock>,
    core: TestCore,
    events: Arc<std::sync::Mutex<Vec<CoreEvent>>>,
    backend_up: Arc<std::sync::atomic::AtomicBool>,
}

fn env() -> Env {
    let clock = FakeClock::new();
    let config = CoreConfig::default();
    let local = LocalBackend::new(clock.clone(), config.session_gap_minutes);
    let (backend, backend_up) = FlakyBackend::new(local);
    let (sink, events) = RecordingSink::new();
    let core = KegbotCore::new(config, clock.clone(), backend, MemStore::new(), sink);

    core.add_tap(Tap::new(METER, "Main Tap")).unwrap();
    core.start_keg(METER, "Test IPA", "Ale Works", "IPA", "half-barrel")
        .unwrap();
    Env {
        clock,
        core,
        events,
        backend_up,
    }
}

fn meter_frame(meter: &str, reading: u32) -> Vec<u8> {
    let mut tags = TagMap::new();
    tags.insert(0x01, meter.as_bytes().to_vec());
    tags.insert(0x02, reading.to_le_bytes().to_vec());
    encode_frame(MESSAGE_TYPE_METER_STATUS, &tags)
}

fn temperature_frame(sensor: &str, micro_c: i32) -> Vec<u8> {
    let mut tags = TagMap::new();
    tags.insert(0x01, sensor.as_bytes().to_vec());
    tags.insert(0x02, micro_c.to_le_bytes().to_vec());
    encode_frame(MESSAGE_TYPE_TEMPERATURE, &tags)
}

#[test]
fn bytes_to_drink() {
    let env = env();

    env.core.handle_bytes(&meter_frame(METER, 0));
    env.clock.advance(5_000);
    env.core.handle_bytes(&meter_frame(METER, 2200));

    // Let the flow idle out.
    env.clock.advance(31_000);
    let ended = env.core.end_idle_flows();
    assert_eq!(ended.len(), 1);

    let drinks = env.core.drinks();
    assert_eq!(drinks.len(), 1);
    assert_eq!(drinks[0].ticks, 2200);
    assert!((drinks[0].volume_ml - 1000.0).abs() < 1e-9);
    assert_eq!(drinks[0].username, None);

    let keg = env.core.with_backend(|b| b.keg_on_tap(METER)).unwrap();
    assert!((keg.served_volume_ml - 1000.0).abs() < 1e-9);
    assert!((keg.remaining_volume_ml() - (58673.9 - 1000.0)).abs() < 1e-9);

    let events = env.events.lock().unwrap();
    assert!(events.iter().any(|e| matches!(e, CoreEvent::FlowStarted(_))));
    assert!(events.iter().any(|e| matches!(e, CoreEvent::FlowEnded(_))));
    assert!(events.iter().any(|e| matches!(e, CoreEvent::DrinkRecorded(_))));
}

#[test]
fn chunked_delivery_produces_same_drink() {
    let env = env();
    let mut stream = meter_frame(METER, 0);
    stream.extend_from_slice(&meter_frame(METER, 1100));

    for chunk in stream.chunks(5) {
        env.core.handle_bytes(chunk);
    }
    let _ = env.core.end_flow(METER);

    let drinks = env.core.drinks();
    assert_eq!(drinks.len(), 1);
    assert_eq!(drinks[0].ticks, 1100);
}

#[test]
fn tiny_pour_is_discarded() {
    let env = env();
    env.core.handle_bytes(&meter_frame(METER, 0));
    // 11 ticks is 5 ml, under the 10 ml minimum.
    env.core.handle_bytes(&meter_frame(METER, 11));
    let _ = env.core.end_flow(METER);

    assert!(env.core.drinks().is_empty());
}

#[test]
fn pour_during_outage_is_queued_then_drained() {
    let env = env();
    env.core.handle_bytes(&meter_frame(METER, 0));
    env.core.handle_bytes(&meter_frame(METER, 2200));

    env.backend_up
        .store(false, std::sync::atomic::Ordering::SeqCst);
    let _ = env.core.end_flow(METER);

    assert!(env.core.drinks().is_empty());
    assert_eq!(env.core.with_store(MemStore::pending_len), 1);

    // Still down: drain commits nothing and keeps the row.
    assert_eq!(env.core.drain_pending(), 0);
    assert_eq!(env.core.with_store(MemStore::pending_len), 1);

    env.backend_up
        .store(true, std::sync::atomic::Ordering::SeqCst);
    assert_eq!(env.core.drain_pending(), 1);
    assert_eq!(env.core.with_store(MemStore::pending_len), 0);

    let drinks = env.core.drinks();
    assert_eq!(drinks.len(), 1);
    assert_eq!(drinks[0].ticks, 2200);
}

#[test]
fn temperature_is_logged_and_queued_during_outage() {
    let env = env();
    env.core.handle_bytes(&temperature_frame("thermo-keg", 4_500_000));

    let latest = env
        .core
        .with_backend(|b| b.inner().latest_temperature("thermo-keg").cloned())
        .unwrap();
    assert!((latest.temp_c - 4.5).abs() < 1e-9);

    env.backend_up
        .store(false, std::sync::atomic::Ordering::SeqCst);
    env.core.handle_bytes(&temperature_frame("thermo-keg", 5_000_000));
    assert_eq!(env.core.with_store(MemStore::pending_len), 1);

    env.backend_up
        .store(true, std::sync::atomic::Ordering::SeqCst);
    assert_eq!(env.core.drain_pending(), 1);
    let latest = env
        .core
        .with_backend(|b| b.inner().latest_temperature("thermo-keg").cloned())
        .unwrap();
    assert!((latest.temp_c - 5.0).abs() < 1e-9);
}

#[test]
fn user_replacement_commits_first_pour() {
    let env = env();
    env.core.activate_user(METER, "alice");
    env.core.handle_bytes(&meter_frame(METER, 0));
    env.core.handle_bytes(&meter_frame(METER, 220));

    // Bob authenticates at the same tap: alice's pour is committed, a
    // fresh flow opens for bob.
    env.core.activate_user(METER, "bob");

    let drinks = env.core.drinks();
    assert_eq!(drinks.len(), 1);
    assert_eq!(drinks[0].username.as_deref(), Some("alice"));
    assert_eq!(drinks[0].ticks, 220);

    let flows = env.core.active_flows();
    assert_eq!(flows.len(), 1);
    assert_eq!(flows[0].username(), Some("bob"));
    assert_eq!(flows[0].ticks(), 0);
}

#[test]
fn pour_on_unregistered_meter_is_tracked_but_dropped() {
    let env = env();
    env.core.handle_bytes(&meter_frame("kegboard.flow7", 0));
    env.core.handle_bytes(&meter_frame("kegboard.flow7", 2200));

    // Flow exists even though no tap was registered.
    assert_eq!(env.core.active_flows().len(), 1);

    // No keg on that meter, so the commit is dropped without queueing.
    let _ = env.core.end_flow("kegboard.flow7");
    assert!(env.core.drinks().is_empty());
    assert_eq!(env.core.with_store(MemStore::pending_len), 0);
}

#[test]
fn keg_lifecycle_through_core() {
    let env = env();
    let first_keg = env.core.taps()[0].current_keg_id.unwrap();

    // Tapping a new keg on the same tap retires the old one.
    let second = env
        .core
        .start_keg(METER, "Brown Ale", "Hop Barn", "Brown Ale", "corny")
        .unwrap();
    assert_ne!(first_keg, second.id);
    assert!(!env.core.with_backend(|b| b.keg(first_keg)).unwrap().online);

    let ended = env.core.end_keg(METER).unwrap().unwrap();
    assert_eq!(ended.id, second.id);
    assert!(env.core.taps()[0].current_keg_id.is_none());
    assert!(env.core.with_backend(|b| b.keg_on_tap(METER)).is_none());
}

#[test]
fn end_keg_during_outage_keeps_tap_and_backend_agreeing() {
    let env = env();

    env.backend_up
        .store(false, std::sync::atomic::Ordering::SeqCst);
    assert!(env.core.end_keg(METER).is_err());

    // The tap still reports the keg the backend still has online.
    let tap_keg = env.core.taps()[0].current_keg_id;
    let backend_keg = env.core.with_backend(|b| b.keg_on_tap(METER)).unwrap();
    assert_eq!(tap_keg, Some(backend_keg.id));
    assert!(backend_keg.online);

    env.backend_up
        .store(true, std::sync::atomic::Ordering::SeqCst);
    let ended = env.core.end_keg(METER).unwrap().unwrap();
    assert!(!ended.online);
    assert!(env.core.taps()[0].current_keg_id.is_none());
}

#[test]
fn garbage_on_the_wire_does_not_disturb_accounting() {
    let env = env();
    let mut stream = Vec::new();
    stream.extend_from_slice(b"\xff\xfeboot noise\r\n");
    stream.extend_from_slice(&meter_frame(METER, 0));
    let mut corrupt = meter_frame(METER, 500);
    corrupt[20] ^= 0xa5;
    stream.extend_from_slice(&corrupt);
    stream.extend_from_slice(&meter_frame(METER, 2200));

    env.core.handle_bytes(&stream);
    let _ = env.core.end_flow(METER);

    let drinks = env.core.drinks();
    assert_eq!(drinks.len(), 1);
    assert_eq!(drinks[0].ticks, 2200);
}
