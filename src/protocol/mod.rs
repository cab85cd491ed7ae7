//! Peek/poke protocol over a serial link
//!
//! - [`frame`] - request/response layout and the peer-side frame decoder
//! - [`codec`] - type-tag driven value encoding
//! - [`channel`] - byte channel seam, serial implementation and port discovery
//! - [`session`] - the echo-verified exchange state machine
//! - [`device`] - simulated target firmware for tests and demos
//! - [`stats`] - exchange timing statistics

pub mod channel;
pub mod codec;
pub mod device;
pub mod frame;
pub mod session;
pub mod stats;

pub use channel::{detect_ports, ByteChannel, DetectedPorts, PortInfo, SerialChannel};
pub use codec::{PokeValue, TypeCodec, TypeTag, Value};
pub use device::{Fault, SimulatedDevice};
pub use frame::{Command, ExchangeContext, HandshakeStep, RequestFrame, StatusCode};
pub use session::{SessionState, TransportSession};
pub use stats::ExchangeStats;
