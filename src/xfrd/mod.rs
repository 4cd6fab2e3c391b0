//! Transfer daemon (spec §4.H): per-zone SOA probe / IXFR / AXFR state
//! machine, NOTIFY handling, and a bounded outgoing TCP pool.
//!
//! Grounded on heimdall's `server.rs` reactor shape (an `Arc`-shared
//! socket plus a `tokio::select!` loop driving per-connection state) but
//! retargeted from "answer one query" to "drive one zone's refresh
//! cycle" — each [`ZoneXfr`] is the per-zone analogue of heimdall's
//! per-connection handler, and [`TcpPool`] generalizes heimdall's single
//! shared listener into a bounded set of outbound slots.

pub mod state;
pub mod tcp_pool;

pub use state::{Primary, ZoneState, ZoneXfr};
pub use tcp_pool::TcpPool;
