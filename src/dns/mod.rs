//! DNS wire format: header, question, EDNS(0), and the full message
//! envelope (spec §4.A "Decode"/"Response assembly").
//!
//! Grounded on heimdall's `dns/mod.rs` module layout (header + sections +
//! a packet type tying them together) but rebuilt around
//! [`crate::name::Name`]'s compressed decode/encode and
//! [`crate::rr::RData`]'s closed rdata enum instead of heimdall's
//! recursive-resolver-shaped `DNSPacket`.

pub mod edns;
pub mod header;
pub mod message;
pub mod question;

pub use edns::Edns;
pub use header::{Header, Opcode, Rcode};
pub use message::{Message, TsigRr};
pub use question::Question;
