//! Core data types, parsing, and hour arithmetic for sensorhub
//!
//! This crate provides the sensor kinds and their typed field sets, the
//! inbound message parser, the outbound message shapes, and the record
//! store interface shared by the session engine and the store backends.

pub mod clock;
pub mod hours;
pub mod message;
pub mod parser;
pub mod store;
pub mod types;

pub use clock::*;
pub use hours::*;
pub use message::*;
pub use parser::*;
pub use store::*;
pub use types::*;
