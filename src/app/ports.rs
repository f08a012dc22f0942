//! Port traits — the boundary between the accounting core and the outside
//! world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ managers / orchestrator (domain)
//! ```
//!
//! Driven adapters (clocks, preference stores, durable queues, event sinks)
//! implement these traits. The domain consumes them via generics or trait
//! objects injected at construction or at call sites, so the core never
//! touches wall clocks, files, or databases directly.

use std::collections::BTreeSet;

use core::fmt;

use serde::{Deserialize, Serialize};

// ───────────────────────────────────────────────────────────────
// Clock port
// ───────────────────────────────────────────────────────────────

/// Monotonic time source for flow timekeeping.
///
/// Injected rather than read from the system so that idle-timeout logic is
/// deterministic under test. Implementations must be monotonic; wall-clock
/// adjustments must not move this value backwards.
pub trait Clock: Send + Sync {
    /// Milliseconds since an arbitrary fixed origin (e.g. process start).
    fn elapsed_millis(&self) -> u64;
}

// ───────────────────────────────────────────────────────────────
// Configuration / preference port
// ───────────────────────────────────────────────────────────────

/// Named string/bool/integer settings plus string sets, as exposed by the
/// platform preference store.
///
/// `get_*` return `None` for unset keys; callers supply their own defaults.
/// String-set updates must be read-modify-write against the currently
/// persisted value — see `TapManager::set_tap_visibility`.
pub trait ConfigStore {
    fn get_string(&self, key: &str) -> Option<String>;
    fn put_string(&mut self, key: &str, value: &str);

    fn get_bool(&self, key: &str) -> Option<bool>;
    fn put_bool(&mut self, key: &str, value: bool);

    fn get_i64(&self, key: &str) -> Option<i64>;
    fn put_i64(&mut self, key: &str, value: i64);

    /// Returns the empty set for unset keys.
    fn get_string_set(&self, key: &str) -> BTreeSet<String>;
    fn put_string_set(&mut self, key: &str, value: &BTreeSet<String>);
}

// ───────────────────────────────────────────────────────────────
// Pending-record store port (durable at-least-once queue)
// ───────────────────────────────────────────────────────────────

/// Record kinds held in the pending queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PendingKind {
    Pour,
    Temperature,
}

impl fmt::Display for PendingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pour => write!(f, "pour"),
            Self::Temperature => write!(f, "temperature"),
        }
    }
}

/// Durable queue for accounting records that could not reach the backend.
///
/// The core treats this purely as an at-least-once queue: rows are inserted
/// when the backend is unavailable, read back oldest-first on drain, and
/// deleted only after the backend accepts them. Duplicate delivery after a
/// crash between accept and delete is acceptable.
pub trait PendingStore {
    /// Append a serialized record of the given kind.
    fn insert(&mut self, kind: PendingKind, record: &[u8]) -> Result<(), StoreError>;

    /// Oldest row of any kind, or `None` when the queue is empty.
    fn head(&self) -> Result<Option<PendingRow>, StoreError>;

    /// Delete a row by id. Deleting an absent row is not an error.
    fn remove(&mut self, row_id: u64) -> Result<(), StoreError>;
}

/// One row read back from the pending queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRow {
    pub row_id: u64,
    pub kind: PendingKind,
    pub record: Vec<u8>,
}

/// Errors from [`PendingStore`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    /// Storage is full.
    Full,
    /// Generic I/O error from the storage backend.
    IoError,
    /// Stored row failed deserialization.
    Corrupted,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "store full"),
            Self::IoError => write!(f, "I/O error"),
            Self::Corrupted => write!(f, "record corrupted"),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Event sink port
// ───────────────────────────────────────────────────────────────

/// The core emits structured [`CoreEvent`](super::events::CoreEvent)s
/// through this port. Adapters decide where they go — log output, a UI
/// event bus, a network notifier.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::CoreEvent);
}

/// Sink that drops every event. Useful for callers that poll state instead
/// of listening.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&mut self, _event: &super::events::CoreEvent) {}
}
