//! One in-progress pour.

use serde::{Deserialize, Serialize};

pub type FlowId = u32;

/// An active pour on one meter.
///
/// A flow accumulates tick deltas handed to it by the flow manager; it never
/// sees raw meter readings. Volume is derived from the calibration captured
/// when the flow started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    id: FlowId,
    meter_name: String,
    ticks: u32,
    ticks_per_ml: f64,
    username: Option<String>,
    shout: Option<String>,
    start_millis: u64,
    /// Last activity (ticks or user change).
    updated_millis: u64,
    max_idle_millis: u64,
    /// `(millis since flow start, tick delta)` per burst of meter activity.
    tick_events: Vec<(u64, u32)>,
    finished: bool,
}

impl Flow {
    pub(crate) fn new(
        id: FlowId,
        meter_name: impl Into<String>,
        ticks_per_ml: f64,
        max_idle_millis: u64,
        now_millis: u64,
    ) -> Self {
        Self {
            id,
            meter_name: meter_name.into(),
            ticks: 0,
            ticks_per_ml,
            username: None,
            shout: None,
            start_millis: now_millis,
            updated_millis: now_millis,
            max_idle_millis,
            tick_events: Vec::new(),
            finished: false,
        }
    }

    pub fn id(&self) -> FlowId {
        self.id
    }

    pub fn meter_name(&self) -> &str {
        &self.meter_name
    }

    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    pub fn volume_ml(&self) -> f64 {
        if self.ticks_per_ml <= 0.0 {
            return 0.0;
        }
        f64::from(self.ticks) / self.ticks_per_ml
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn is_anonymous(&self) -> bool {
        self.username.is_none()
    }

    pub fn shout(&self) -> Option<&str> {
        self.shout.as_deref()
    }

    pub fn set_shout(&mut self, shout: impl Into<String>) {
        self.shout = Some(shout.into());
    }

    pub fn start_millis(&self) -> u64 {
        self.start_millis
    }

    pub fn duration_seconds(&self) -> u32 {
        ((self.updated_millis - self.start_millis) / 1000) as u32
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Idle longer than the configured timeout.
    pub fn is_idle(&self, now_millis: u64) -> bool {
        now_millis.saturating_sub(self.updated_millis) > self.max_idle_millis
    }

    /// `(seconds-since-start, tick delta)` pairs, space separated, the
    /// format pour records carry downstream.
    pub fn tick_time_series(&self) -> String {
        self.tick_events
            .iter()
            .map(|(offset_ms, delta)| format!("{}:{delta}", offset_ms / 1000))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn tick_events(&self) -> &[(u64, u32)] {
        &self.tick_events
    }

    pub(crate) fn add_ticks(&mut self, delta: u32, now_millis: u64) {
        self.ticks += delta;
        if delta > 0 {
            self.tick_events
                .push((now_millis.saturating_sub(self.start_millis), delta));
        }
        self.updated_millis = now_millis;
    }

    pub(crate) fn bind_user(&mut self, username: impl Into<String>, now_millis: u64) {
        self.username = Some(username.into());
        self.updated_millis = now_millis;
    }

    pub(crate) fn finish(&mut self) {
        self.finished = true;
    }
}
