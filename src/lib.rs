//! kegcore: kegboard protocol decoding and pour accounting.
//!
//! Turns the raw serial byte stream from a kegboard controller into typed
//! telemetry, tracks pours as they happen, and commits finished pours to an
//! accounting backend. Layout:
//!
//! - [`kegboard`]: CRC, frame parsing, and the streaming message factory.
//! - [`core`]: tap registry, flow lifecycle, and the [`core::KegbotCore`]
//!   orchestrator.
//! - [`backend`]: drink/keg/session accounting behind the
//!   [`backend::Backend`] trait.
//! - [`app`]: port traits and outbound events.
//! - [`adapters`]: clock, preference store, and log-sink implementations.

pub mod adapters;
pub mod app;
pub mod backend;
pub mod config;
pub mod core;
pub mod error;
pub mod kegboard;

pub use config::CoreConfig;
pub use error::{Error, Result};
