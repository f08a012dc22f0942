//! Kegboard serial protocol: CRC, frame layout, typed messages, and the
//! streaming extractor.

pub mod crc;
pub mod factory;
pub mod message;

pub use factory::MessageFactory;
pub use message::{KegboardMessage, TagMap};
