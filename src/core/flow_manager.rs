//! Flow lifecycle: meter activity in, finished pours out.
//!
//! The manager owns every active [`Flow`], one per meter at most, plus the
//! last raw reading seen from each meter. Meter counters are cumulative and
//! survive across pours, but reset when a controller reboots; the delta
//! computation below absorbs both.

use std::collections::HashMap;
use std::sync::Arc;

use crate::app::events::CoreEvent;
use crate::app::ports::{Clock, EventSink};
use crate::core::flow::{Flow, FlowId};
use crate::core::tap::{Tap, DEFAULT_TICKS_PER_ML};

pub struct FlowManager {
    clock: Arc<dyn Clock>,
    idle_timeout_millis: u64,
    default_ticks_per_ml: f64,

    flows: Vec<Flow>,
    /// Last raw cumulative reading per meter. Retained across flows.
    last_readings: HashMap<String, u32>,
    next_flow_id: FlowId,
}

impl FlowManager {
    pub fn new(clock: Arc<dyn Clock>, idle_timeout_millis: u64, default_ticks_per_ml: f64) -> Self {
        Self {
            clock,
            idle_timeout_millis,
            default_ticks_per_ml,
            flows: Vec::new(),
            last_readings: HashMap::new(),
            next_flow_id: 1,
        }
    }

    pub fn flow(&self, meter_name: &str) -> Option<&Flow> {
        self.flows
            .iter()
            .find(|f| f.meter_name() == meter_name)
    }

    pub fn flow_by_id(&self, id: FlowId) -> Option<&Flow> {
        self.flows.iter().find(|f| f.id() == id)
    }

    pub fn flows(&self) -> &[Flow] {
        &self.flows
    }

    /// Process one cumulative meter reading.
    ///
    /// The first reading from a meter (or the first after a counter
    /// rollback, e.g. a controller reboot) only establishes a baseline and
    /// contributes zero ticks; subsequent readings contribute the positive
    /// delta. A flow is started on demand, so a pour that begins with an
    /// unknown meter still gets tracked.
    pub fn handle_meter_activity(
        &mut self,
        meter_name: &str,
        reading: u32,
        tap: Option<&Tap>,
        events: &mut impl EventSink,
    ) -> FlowId {
        let now = self.clock.elapsed_millis();
        let delta = match self.last_readings.get(meter_name) {
            Some(&last) if reading >= last => reading - last,
            Some(_) => {
                log::info!("meter '{meter_name}' rolled back, rebaselining at {reading}");
                0
            }
            None => 0,
        };
        self.last_readings.insert(meter_name.to_owned(), reading);

        let id = self.get_or_start_flow(meter_name, tap, events);
        let flow = self
            .flows
            .iter_mut()
            .find(|f| f.id() == id)
            .map(|f| {
                f.add_ticks(delta, now);
                f.clone()
            });
        if let Some(flow) = flow {
            events.emit(&CoreEvent::FlowUpdated(flow));
        }
        id
    }

    /// Start a flow on a meter if none is active, with an explicit idle
    /// timeout; returns the active flow's id either way.
    pub fn start_flow(
        &mut self,
        meter_name: &str,
        max_idle_millis: u64,
        tap: Option<&Tap>,
        events: &mut impl EventSink,
    ) -> FlowId {
        self.start_flow_with_idle(meter_name, max_idle_millis, tap, events)
    }

    /// Bind a user to the meter's flow.
    ///
    /// Re-authenticating the already-bound user is a no-op. An anonymous
    /// flow is taken over in place, keeping its id and accumulated ticks.
    /// A flow bound to a different user is ended and a fresh flow is opened
    /// for the new user.
    pub fn activate_user(
        &mut self,
        meter_name: &str,
        username: &str,
        tap: Option<&Tap>,
        events: &mut impl EventSink,
    ) -> FlowId {
        let now = self.clock.elapsed_millis();
        match self.flow(meter_name) {
            Some(flow) if flow.username() == Some(username) => flow.id(),
            Some(flow) if flow.is_anonymous() => {
                let id = flow.id();
                let snapshot = self
                    .flows
                    .iter_mut()
                    .find(|f| f.id() == id)
                    .map(|f| {
                        f.bind_user(username, now);
                        f.clone()
                    });
                if let Some(flow) = snapshot {
                    log::info!("user '{username}' took over flow {id} on '{meter_name}'");
                    events.emit(&CoreEvent::FlowUpdated(flow));
                }
                id
            }
            Some(_) => {
                let _ = self.end_flow(meter_name, events);
                let id = self.get_or_start_flow(meter_name, tap, events);
                self.bind_new_user(id, username, now, events);
                id
            }
            None => {
                let id = self.get_or_start_flow(meter_name, tap, events);
                self.bind_new_user(id, username, now, events);
                id
            }
        }
    }

    /// End the meter's active flow, returning the finished snapshot.
    pub fn end_flow(&mut self, meter_name: &str, events: &mut impl EventSink) -> Option<Flow> {
        let idx = self.flows.iter().position(|f| f.meter_name() == meter_name)?;
        let mut flow = self.flows.remove(idx);
        flow.finish();
        log::info!(
            "flow {} ended on '{meter_name}': {} ticks, {:.1} ml",
            flow.id(),
            flow.ticks(),
            flow.volume_ml()
        );
        events.emit(&CoreEvent::FlowEnded(flow.clone()));
        Some(flow)
    }

    /// End every flow idle past the timeout, returning finished snapshots.
    pub fn end_idle_flows(&mut self, events: &mut impl EventSink) -> Vec<Flow> {
        let now = self.clock.elapsed_millis();
        let idle: Vec<String> = self
            .flows
            .iter()
            .filter(|f| f.is_idle(now))
            .map(|f| f.meter_name().to_owned())
            .collect();
        idle.iter()
            .filter_map(|meter| self.end_flow(meter, events))
            .collect()
    }

    /// Attach a caller-supplied note to the meter's active flow.
    pub fn set_shout(&mut self, meter_name: &str, shout: &str) {
        if let Some(flow) = self
            .flows
            .iter_mut()
            .find(|f| f.meter_name() == meter_name)
        {
            flow.set_shout(shout);
        }
    }

    fn get_or_start_flow(
        &mut self,
        meter_name: &str,
        tap: Option<&Tap>,
        events: &mut impl EventSink,
    ) -> FlowId {
        self.start_flow_with_idle(meter_name, self.idle_timeout_millis, tap, events)
    }

    fn start_flow_with_idle(
        &mut self,
        meter_name: &str,
        max_idle_millis: u64,
        tap: Option<&Tap>,
        events: &mut impl EventSink,
    ) -> FlowId {
        if let Some(flow) = self.flow(meter_name) {
            return flow.id();
        }
        let now = self.clock.elapsed_millis();
        let ticks_per_ml = match tap {
            Some(t) if t.ticks_per_ml > 0.0 => t.ticks_per_ml,
            Some(t) => {
                log::warn!(
                    "tap '{}' has non-positive calibration, using default",
                    t.meter_name
                );
                self.default_ticks_per_ml
            }
            None => {
                log::info!("meter '{meter_name}' has no registered tap, using default calibration");
                self.default_ticks_per_ml
            }
        };
        let id = self.next_flow_id;
        self.next_flow_id += 1;
        let flow = Flow::new(id, meter_name, ticks_per_ml, max_idle_millis, now);
        log::info!("flow {id} started on '{meter_name}'");
        events.emit(&CoreEvent::FlowStarted(flow.clone()));
        self.flows.push(flow);
        id
    }

    fn bind_new_user(
        &mut self,
        id: FlowId,
        username: &str,
        now: u64,
        events: &mut impl EventSink,
    ) {
        let snapshot = self
            .flows
            .iter_mut()
            .find(|f| f.id() == id)
            .map(|f| {
                f.bind_user(username, now);
                f.clone()
            });
        if let Some(flow) = snapshot {
            events.emit(&CoreEvent::FlowUpdated(flow));
        }
    }
}

impl FlowManager {
    /// Default manager for tests and tools: 30 s idle timeout, stock
    /// calibration.
    pub fn with_defaults(clock: Arc<dyn Clock>) -> Self {
        Self::new(clock, 30_000, DEFAULT_TICKS_PER_ML)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::NullSink;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct TestClock(AtomicU64);

    impl TestClock {
        fn advance(&self, millis: u64) {
            self.0.fetch_add(millis, Ordering::SeqCst);
        }
    }

    impl Clock for TestClock {
        fn elapsed_millis(&self) -> u64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn fixture() -> (Arc<TestClock>, FlowManager) {
        let clock = Arc::new(TestClock(AtomicU64::new(0)));
        let mgr = FlowManager::with_defaults(clock.clone());
        (clock, mgr)
    }

    const METER: &str = "kegboard.flow0";

    #[test]
    fn first_reading_is_baseline_only() {
        let (_, mut mgr) = fixture();
        let mut sink = NullSink;
        mgr.handle_meter_activity(METER, 100, None, &mut sink);
        assert_eq!(mgr.flow(METER).unwrap().ticks(), 0);
    }

    #[test]
    fn deltas_accumulate() {
        let (_, mut mgr) = fixture();
        let mut sink = NullSink;
        mgr.handle_meter_activity(METER, 100, None, &mut sink);
        mgr.handle_meter_activity(METER, 200, None, &mut sink);
        assert_eq!(mgr.flow(METER).unwrap().ticks(), 100);
    }

    #[test]
    fn rollback_rebaselines_without_losing_ticks() {
        let (_, mut mgr) = fixture();
        let mut sink = NullSink;
        mgr.handle_meter_activity(METER, 100, None, &mut sink);
        mgr.handle_meter_activity(METER, 200, None, &mut sink);
        // Counter rolled back (controller reboot).
        mgr.handle_meter_activity(METER, 10, None, &mut sink);
        assert_eq!(mgr.flow(METER).unwrap().ticks(), 100);
        mgr.handle_meter_activity(METER, 11, None, &mut sink);
        assert_eq!(mgr.flow(METER).unwrap().ticks(), 101);
    }

    #[test]
    fn baseline_survives_across_flows() {
        let (_, mut mgr) = fixture();
        let mut sink = NullSink;
        mgr.handle_meter_activity(METER, 100, None, &mut sink);
        mgr.handle_meter_activity(METER, 200, None, &mut sink);
        mgr.end_flow(METER, &mut sink).unwrap();

        mgr.handle_meter_activity(METER, 300, None, &mut sink);
        let flow = mgr.flow(METER).unwrap().clone();
        assert_eq!(flow.ticks(), 100);
        assert_eq!(mgr.flow_by_id(flow.id()), Some(&flow));
    }

    #[test]
    fn idle_flow_is_ended() {
        let (clock, mut mgr) = fixture();
        let mut sink = NullSink;
        mgr.handle_meter_activity(METER, 100, None, &mut sink);
        mgr.handle_meter_activity(METER, 150, None, &mut sink);

        clock.advance(30_000);
        assert!(mgr.end_idle_flows(&mut sink).is_empty());

        clock.advance(1);
        let ended = mgr.end_idle_flows(&mut sink);
        assert_eq!(ended.len(), 1);
        assert_eq!(ended[0].ticks(), 50);
        assert!(ended[0].is_finished());
        assert!(mgr.flow(METER).is_none());
    }

    #[test]
    fn explicit_start_honors_custom_idle_timeout() {
        let (clock, mut mgr) = fixture();
        let mut sink = NullSink;
        mgr.start_flow(METER, 5_000, None, &mut sink);

        clock.advance(5_000);
        assert!(mgr.end_idle_flows(&mut sink).is_empty());

        clock.advance(1);
        assert_eq!(mgr.end_idle_flows(&mut sink).len(), 1);
    }

    #[test]
    fn activity_resets_idle_clock() {
        let (clock, mut mgr) = fixture();
        let mut sink = NullSink;
        mgr.handle_meter_activity(METER, 100, None, &mut sink);
        clock.advance(29_000);
        mgr.handle_meter_activity(METER, 120, None, &mut sink);
        clock.advance(29_000);
        assert!(mgr.end_idle_flows(&mut sink).is_empty());
    }

    #[test]
    fn same_user_reactivation_is_noop() {
        let (_, mut mgr) = fixture();
        let mut sink = NullSink;
        let a = mgr.activate_user(METER, "alice", None, &mut sink);
        let b = mgr.activate_user(METER, "alice", None, &mut sink);
        assert_eq!(a, b);
        assert_eq!(mgr.flow(METER).unwrap().username(), Some("alice"));
    }

    #[test]
    fn user_takes_over_anonymous_flow() {
        let (_, mut mgr) = fixture();
        let mut sink = NullSink;
        mgr.handle_meter_activity(METER, 100, None, &mut sink);
        mgr.handle_meter_activity(METER, 150, None, &mut sink);
        let anonymous_id = mgr.flow(METER).unwrap().id();

        let id = mgr.activate_user(METER, "alice", None, &mut sink);
        assert_eq!(id, anonymous_id);
        let flow = mgr.flow(METER).unwrap();
        assert_eq!(flow.username(), Some("alice"));
        assert_eq!(flow.ticks(), 50);
    }

    #[test]
    fn different_user_gets_fresh_flow() {
        let (_, mut mgr) = fixture();
        let mut sink = NullSink;
        let alice_id = mgr.activate_user(METER, "alice", None, &mut sink);
        mgr.handle_meter_activity(METER, 0, None, &mut sink);
        mgr.handle_meter_activity(METER, 60, None, &mut sink);

        let bob_id = mgr.activate_user(METER, "bob", None, &mut sink);
        assert_ne!(alice_id, bob_id);
        let flow = mgr.flow(METER).unwrap();
        assert_eq!(flow.username(), Some("bob"));
        assert_eq!(flow.ticks(), 0);
    }

    #[test]
    fn tap_calibration_is_captured_at_start() {
        let (_, mut mgr) = fixture();
        let mut sink = NullSink;
        let tap = Tap::new(METER, "Main").with_ticks_per_ml(4.4);
        mgr.handle_meter_activity(METER, 0, Some(&tap), &mut sink);
        mgr.handle_meter_activity(METER, 440, Some(&tap), &mut sink);
        assert!((mgr.flow(METER).unwrap().volume_ml() - 100.0).abs() < 1e-9);
    }
}
