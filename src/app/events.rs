//! Outbound core events.
//!
//! Managers emit these through the [`EventSink`](super::ports::EventSink)
//! port. Adapters on the other side decide what to do with them — log them,
//! post them to a UI bus, forward them to a remote notifier. The core never
//! depends on a specific dispatch mechanism.

use crate::backend::models::Drink;
use crate::core::flow::Flow;

/// Structured events emitted by the accounting core.
///
/// Flow events carry a snapshot of the flow at emission time; the live flow
/// keeps changing after the event is delivered.
#[derive(Debug, Clone)]
pub enum CoreEvent {
    /// A new flow was started (by meter activity, user arrival, or an
    /// explicit call).
    FlowStarted(Flow),

    /// An active flow accumulated ticks or changed its bound user.
    FlowUpdated(Flow),

    /// A flow ended (idle timeout, explicit end, or user replacement).
    FlowEnded(Flow),

    /// The tap registry changed (tap added, removed, or keg attached or
    /// detached).
    TapListChanged,

    /// A drink was committed to the accounting backend.
    DrinkRecorded(Drink),
}
