//! Driven adapters implementing the [`crate::app::ports`] traits.

pub mod clock;
pub mod log_sink;
pub mod mem_store;

pub use clock::SystemClock;
pub use log_sink::LogSink;
pub use mem_store::MemStore;
