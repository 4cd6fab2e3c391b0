//! Crate-wide error type, grounded on heimdall's `HeimdallError` (a single
//! `thiserror` enum covering every subsystem) but trimmed to the taxonomy
//! spec §7 actually describes: malformed input, resource exhaustion, policy
//! denial, I/O failure, and peer protocol violations.

use std::sync::Arc;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, NsdError>;

#[derive(Debug, Clone, Error)]
pub enum NsdError {
    // --- Malformed input (§7 "Malformed input") ---
    #[error("invalid domain name: {0}")]
    InvalidName(String),
    #[error("malformed DNS message at offset {offset}: {reason}")]
    Parse { offset: usize, reason: String },
    #[error("zone file parse error in {path}:{line}: {reason}")]
    ZoneFile {
        path: String,
        line: usize,
        reason: String,
    },

    // --- Resource exhaustion (§7) ---
    #[error("out of memory")]
    OutOfMemory,
    #[error("too many concurrent connections")]
    TooManyConnections,

    // --- Policy denial (§7) ---
    #[error("refused: {0}")]
    Refused(String),
    #[error("not authoritative for {0}")]
    NotAuth(String),

    // --- I/O / storage failure (§7) ---
    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),
    #[error("storage error during {op}: {source}")]
    Storage { op: String, source: String },
    #[error("udb image corrupt: {0}")]
    UdbCorrupt(String),
    #[error("journal file corrupt: {0}")]
    JournalCorrupt(String),

    // --- Peer protocol violation (§7) ---
    #[error("protocol violation from peer: {0}")]
    ProtocolViolation(String),
    #[error("unexpected response from primary {0}")]
    UnexpectedResponse(String),

    // --- Store / zone invariants ---
    #[error("zone not found: {0}")]
    ZoneNotFound(String),
    #[error("zone {0} is missing its SOA record")]
    MissingSoa(String),
    #[error("zone {0} already has an SOA record")]
    DuplicateSoa(String),
    #[error("RRset TTL mismatch for {0}")]
    TtlMismatch(String),
    #[error("CNAME coexistence violation at {0}")]
    CnameCoexistence(String),
    #[error("class mismatch for {0}")]
    ClassMismatch(String),

    // --- TSIG (§4.L) ---
    #[error("TSIG key not found: {0}")]
    TsigKeyNotFound(String),
    #[error("TSIG verification failed")]
    TsigVerificationFailed,
    #[error("TSIG time skew too large: {0}s")]
    TsigBadTime(i64),

    // --- Config ---
    #[error("configuration error: {0}")]
    Config(String),

    // --- Catalog zones (§4.J) ---
    #[error("invalid catalog zone {0}: {1}")]
    InvalidCatalog(String, String),
}

impl From<std::io::Error> for NsdError {
    fn from(err: std::io::Error) -> Self {
        NsdError::Io(Arc::new(err))
    }
}
