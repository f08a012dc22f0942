//! Domain managers and the orchestrator.

pub mod flow;
pub mod flow_manager;
pub mod kegbot_core;
pub mod tap;
pub mod tap_manager;

pub use flow::{Flow, FlowId};
pub use flow_manager::FlowManager;
pub use kegbot_core::KegbotCore;
pub use tap::Tap;
pub use tap_manager::TapManager;
