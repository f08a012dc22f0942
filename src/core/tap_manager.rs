//! Tap registry.
//!
//! Owns the set of known taps and the persisted visibility set. Taps are
//! unique by meter name and get a registry id on insertion. Visibility
//! lives in the preference store keyed by tap id so it survives restarts;
//! the stored set is always updated read-modify-write, so entries for taps
//! that no longer exist are preserved rather than dropped.

use crate::app::events::CoreEvent;
use crate::app::ports::{ConfigStore, EventSink};
use crate::core::tap::Tap;
use crate::error::{Error, Result};

/// Preference key holding the set of hidden tap ids (decimal strings).
pub const KEY_HIDDEN_TAP_IDS: &str = "hidden_tap_ids";

#[derive(Default)]
pub struct TapManager {
    taps: Vec<Tap>,
    next_tap_id: u32,
}

impl TapManager {
    pub fn new() -> Self {
        Self {
            taps: Vec::new(),
            next_tap_id: 1,
        }
    }

    /// Register a tap and assign its registry id. Meter names are unique;
    /// registering a second tap on the same meter is rejected.
    pub fn add_tap(&mut self, mut tap: Tap, events: &mut impl EventSink) -> Result<u32> {
        if self.taps.iter().any(|t| t.meter_name == tap.meter_name) {
            return Err(Error::InvalidArgument(format!(
                "duplicate tap meter name '{}'",
                tap.meter_name
            )));
        }
        if tap.ticks_per_ml <= 0.0 {
            return Err(Error::InvalidArgument(format!(
                "tap '{}' has non-positive calibration {}",
                tap.meter_name, tap.ticks_per_ml
            )));
        }
        tap.id = self.next_tap_id;
        self.next_tap_id += 1;
        let id = tap.id;
        log::info!("tap {id} registered on '{}'", tap.meter_name);
        self.taps.push(tap);
        events.emit(&CoreEvent::TapListChanged);
        Ok(id)
    }

    pub fn remove_tap(&mut self, meter_name: &str, events: &mut impl EventSink) -> Result<Tap> {
        let idx = self
            .taps
            .iter()
            .position(|t| t.meter_name == meter_name)
            .ok_or_else(|| Error::NotFound(format!("tap '{meter_name}'")))?;
        let tap = self.taps.remove(idx);
        events.emit(&CoreEvent::TapListChanged);
        Ok(tap)
    }

    pub fn tap(&self, meter_name: &str) -> Option<&Tap> {
        self.taps.iter().find(|t| t.meter_name == meter_name)
    }

    pub fn tap_by_id(&self, tap_id: u32) -> Option<&Tap> {
        self.taps.iter().find(|t| t.id == tap_id)
    }

    /// All taps in registration order.
    pub fn taps(&self) -> &[Tap] {
        &self.taps
    }

    pub fn taps_with_active_keg(&self) -> Vec<&Tap> {
        self.taps.iter().filter(|t| t.has_active_keg()).collect()
    }

    /// Update a tap's meter calibration.
    pub fn calibrate_meter(&mut self, meter_name: &str, ticks_per_ml: f64) -> Result<()> {
        if !(ticks_per_ml.is_finite() && ticks_per_ml > 0.0) {
            return Err(Error::InvalidArgument(format!(
                "calibration must be positive, got {ticks_per_ml}"
            )));
        }
        let tap = self
            .taps
            .iter_mut()
            .find(|t| t.meter_name == meter_name)
            .ok_or_else(|| Error::NotFound(format!("tap '{meter_name}'")))?;
        tap.ticks_per_ml = ticks_per_ml;
        log::info!("tap '{meter_name}' recalibrated to {ticks_per_ml} ticks/ml");
        Ok(())
    }

    /// Taps not hidden by the persisted visibility set, in registration
    /// order.
    pub fn visible_taps(&self, store: &dyn ConfigStore) -> Vec<&Tap> {
        let hidden = store.get_string_set(KEY_HIDDEN_TAP_IDS);
        self.taps
            .iter()
            .filter(|t| !hidden.contains(&t.id.to_string()))
            .collect()
    }

    pub fn is_tap_visible(&self, tap_id: u32, store: &dyn ConfigStore) -> bool {
        !store
            .get_string_set(KEY_HIDDEN_TAP_IDS)
            .contains(&tap_id.to_string())
    }

    /// Persist a visibility change. Entries for other taps, including taps
    /// that have since been deleted, are left untouched.
    pub fn set_tap_visibility(
        &mut self,
        tap_id: u32,
        visible: bool,
        store: &mut dyn ConfigStore,
    ) {
        let mut hidden = store.get_string_set(KEY_HIDDEN_TAP_IDS);
        let key = tap_id.to_string();
        let changed = if visible {
            hidden.remove(&key)
        } else {
            hidden.insert(key)
        };
        if changed {
            store.put_string_set(KEY_HIDDEN_TAP_IDS, &hidden);
        }
    }

    /// Bind a keg to a tap's registry entry.
    pub fn attach_keg(
        &mut self,
        meter_name: &str,
        keg_id: u32,
        events: &mut impl EventSink,
    ) -> Result<()> {
        let tap = self
            .taps
            .iter_mut()
            .find(|t| t.meter_name == meter_name)
            .ok_or_else(|| Error::NotFound(format!("tap '{meter_name}'")))?;
        tap.current_keg_id = Some(keg_id);
        events.emit(&CoreEvent::TapListChanged);
        Ok(())
    }

    /// Clear a tap's keg binding, returning the previously attached keg id.
    pub fn detach_keg(
        &mut self,
        meter_name: &str,
        events: &mut impl EventSink,
    ) -> Result<Option<u32>> {
        let tap = self
            .taps
            .iter_mut()
            .find(|t| t.meter_name == meter_name)
            .ok_or_else(|| Error::NotFound(format!("tap '{meter_name}'")))?;
        let previous = tap.current_keg_id.take();
        if previous.is_some() {
            events.emit(&CoreEvent::TapListChanged);
        }
        Ok(previous)
    }
}
