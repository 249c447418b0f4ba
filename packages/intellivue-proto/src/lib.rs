//! # intellivue-proto
//!
//! Wire-format support for the Philips IntelliVue Data Export protocol
//! as described in the Philips Interface Programming Guide (PIPG,
//! id 4535 642 59271).
//!
//! The protocol is a chain of nested big-endian records carried in UDP
//! datagrams. Monitors announce themselves with a broadcast beacon on the
//! connection-indication port; a client then associates on the protocol
//! port and polls the monitor's MDIB for numeric observations.
//!
//! This crate is used by:
//! - `gateway`: decoding inbound datagrams and building association /
//!   handshake / poll requests
//! - `monitor-sim`: producing the monitor side of the same exchange
//!
//! Modules, leaves first:
//! - [`wire`]: decode/encode primitives, length encodings, error type
//! - [`float`]: the protocol's custom 32-bit decimal float
//! - [`nomenclature`]: the partitioned identifier space
//! - [`attrs`]: attribute payload types and attribute lists
//! - [`pdu`]: remote-operation envelopes and poll bodies
//! - [`assoc`]: association control (session headers, request templates)

pub mod assoc;
pub mod attrs;
pub mod float;
pub mod nomenclature;
pub mod pdu;
pub mod wire;

pub use attrs::MacAddr;
pub use float::FloatValue;
pub use wire::{Decode, Encode, WireError};

/// UDP port monitors broadcast connection indications on (PIPG-279).
pub const PORT_CONNECTION_INDICATION: u16 = 24005;

/// UDP port for association control and data export traffic (PIPG-29).
pub const PORT_PROTOCOL: u16 = 24105;
