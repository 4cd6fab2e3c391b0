//! TSIG (RFC 8945): transaction signatures on query/response pairs using a
//! shared secret (spec §4.L).
//!
//! Grounded on heimdall's use of `ring` for cryptographic primitives
//! (heimdall uses `ring` for DNSSEC-adjacent hashing; this module reuses
//! the same crate for HMAC) with the signed-region reconstruction built
//! directly from spec §4.L: "reconstruct the signed region (message minus
//! TSIG with arcount decremented), verify MAC, check fudge time".

use crate::dns::message::TsigRr;
use crate::error::{NsdError, Result};
use crate::name::Name;
use ring::hmac;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TsigAlgorithm {
    HmacSha1,
    HmacSha224,
    HmacSha256,
    HmacSha384,
    HmacSha512,
}

impl TsigAlgorithm {
    pub fn presentation_name(self) -> &'static str {
        match self {
            TsigAlgorithm::HmacSha1 => "hmac-sha1.",
            TsigAlgorithm::HmacSha224 => "hmac-sha224.",
            TsigAlgorithm::HmacSha256 => "hmac-sha256.",
            TsigAlgorithm::HmacSha384 => "hmac-sha384.",
            TsigAlgorithm::HmacSha512 => "hmac-sha512.",
        }
    }

    /// Parse an on-disk config algorithm name (spec §6.4 `key.algorithm`),
    /// e.g. `"hmac-sha256"`.
    pub fn from_config_name(name: &str) -> Option<Self> {
        Self::from_presentation(name)
    }

    fn from_presentation(name: &str) -> Option<Self> {
        match name.trim_end_matches('.').to_ascii_lowercase().as_str() {
            "hmac-sha1" => Some(TsigAlgorithm::HmacSha1),
            "hmac-sha224" => Some(TsigAlgorithm::HmacSha224),
            "hmac-sha256" => Some(TsigAlgorithm::HmacSha256),
            "hmac-sha384" => Some(TsigAlgorithm::HmacSha384),
            "hmac-sha512" => Some(TsigAlgorithm::HmacSha512),
            _ => None,
        }
    }

    /// `ring` only ships a dedicated HMAC algorithm for SHA1/256/384/512;
    /// SHA224 has no `ring` constant, so keys configured with it are
    /// rejected at load time rather than silently downgraded to a
    /// different hash (spec §4.L lists SHA224 as an accepted algorithm
    /// name for compatibility, but no secure implementation is wired in).
    fn ring_algorithm(self) -> Option<hmac::Algorithm> {
        match self {
            TsigAlgorithm::HmacSha1 => Some(hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY),
            TsigAlgorithm::HmacSha224 => None,
            TsigAlgorithm::HmacSha256 => Some(hmac::HMAC_SHA256),
            TsigAlgorithm::HmacSha384 => Some(hmac::HMAC_SHA384),
            TsigAlgorithm::HmacSha512 => Some(hmac::HMAC_SHA512),
        }
    }
}

pub struct TsigKey {
    pub name: Name,
    pub algorithm: TsigAlgorithm,
    pub secret: Vec<u8>,
}

#[derive(Default)]
pub struct TsigKeyring {
    keys: HashMap<Vec<u8>, TsigKey>,
}

impl TsigKeyring {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: TsigKey) {
        self.keys.insert(key.name.tree_key(), key);
    }

    pub fn find(&self, name: &Name) -> Option<&TsigKey> {
        self.keys.get(&name.tree_key())
    }
}

/// Allowed clock skew, per RFC 8945 §5.2.3 "fudge" semantics (spec §4.L
/// "check fudge time").
const DEFAULT_FUDGE: u16 = 300;

/// Verify the TSIG RR found on an incoming message against `keyring`.
/// `raw_message` is the exact bytes as received, including the TSIG RR;
/// `tsig_rr_start` is the byte offset where that RR begins (needed
/// because the signed region excludes it and the header's arcount must
/// be decremented before hashing, per RFC 8945 §5.3).
pub fn verify(raw_message: &[u8], tsig_rr_start: usize, tsig: &TsigRr, keyring: &TsigKeyring) -> Result<()> {
    let key = keyring
        .find(&tsig.key_name)
        .ok_or_else(|| NsdError::TsigKeyNotFound(tsig.key_name.to_presentation()))?;

    let algo = TsigAlgorithm::from_presentation(&tsig.algorithm.to_presentation())
        .ok_or_else(|| NsdError::TsigKeyNotFound(tsig.algorithm.to_presentation()))?;
    if algo != key.algorithm {
        return Err(NsdError::TsigVerificationFailed);
    }
    let ring_algo = algo
        .ring_algorithm()
        .ok_or(NsdError::TsigVerificationFailed)?;

    let signed_region = signed_region_bytes(raw_message, tsig_rr_start, tsig.original_id);
    let mac_input = mac_input_bytes(&signed_region, tsig);
    let hmac_key = hmac::Key::new(ring_algo, &key.secret);
    hmac::verify(&hmac_key, &mac_input, &tsig.mac).map_err(|_| NsdError::TsigVerificationFailed)?;

    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
    let fudge = tsig.fudge.max(1) as u64;
    let skew = now.abs_diff(tsig.time_signed);
    if skew > fudge {
        return Err(NsdError::TsigBadTime(
            now as i64 - tsig.time_signed as i64,
        ));
    }
    Ok(())
}

/// Sign a response being built for `key`, producing the `TsigRr` to
/// append to the additional section. `response_without_tsig` is the
/// fully-encoded message (header already reflecting the real arcount
/// excluding TSIG).
pub fn sign(response_without_tsig: &[u8], key: &TsigKey, original_id: u16) -> Result<TsigRr> {
    let ring_algo = key.algorithm.ring_algorithm().ok_or(NsdError::TsigVerificationFailed)?;
    let time_signed = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
    let mut partial = TsigRr {
        key_name: key.name.clone(),
        algorithm: Name::make(key.algorithm.presentation_name())?,
        time_signed,
        fudge: DEFAULT_FUDGE,
        mac: Vec::new(),
        original_id,
        error: 0,
        other_data: Vec::new(),
    };
    let mac_input = mac_input_bytes(response_without_tsig, &partial);
    let hmac_key = hmac::Key::new(ring_algo, &key.secret);
    let tag = hmac::sign(&hmac_key, &mac_input);
    partial.mac = tag.as_ref().to_vec();
    Ok(partial)
}

/// RFC 8945 §5.3 TSIG error codes, carried in the TSIG RR's own `error`
/// field (distinct from the message header's RCODE).
const TSIG_ERROR_BADSIG: u16 = 16;
const TSIG_ERROR_BADKEY: u16 = 17;
const TSIG_ERROR_BADTIME: u16 = 18;

/// Map a verification failure to the TSIG error code a reply should carry.
pub fn error_code_for(err: &NsdError) -> u16 {
    match err {
        NsdError::TsigKeyNotFound(_) => TSIG_ERROR_BADKEY,
        NsdError::TsigBadTime(_) => TSIG_ERROR_BADTIME,
        _ => TSIG_ERROR_BADSIG,
    }
}

/// Build the unsigned error reply's TSIG RR (RFC 8945 §5.3: echo the
/// client's key name and algorithm, zero-length MAC, the failure code).
/// The caller attaches this to a response with RCODE=NOTAUTH instead of
/// running the query through resolution.
pub fn error_reply(request_tsig: &TsigRr, error: u16) -> TsigRr {
    TsigRr {
        key_name: request_tsig.key_name.clone(),
        algorithm: request_tsig.algorithm.clone(),
        time_signed: SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs(),
        fudge: DEFAULT_FUDGE,
        mac: Vec::new(),
        original_id: request_tsig.original_id,
        error,
        other_data: Vec::new(),
    }
}

/// RFC 8945 §5.3: the region hashed is the request/response bytes up to
/// (not including) the TSIG RR, with the original message ID restored in
/// the header (the ID doesn't change across request/response TSIG, but a
/// response re-signs with its own arcount already excluding TSIG).
fn signed_region_bytes(raw_message: &[u8], tsig_rr_start: usize, original_id: u16) -> Vec<u8> {
    let mut region = raw_message[..tsig_rr_start].to_vec();
    region[0..2].copy_from_slice(&original_id.to_be_bytes());
    let arcount = u16::from_be_bytes([region[10], region[11]]);
    region[10..12].copy_from_slice(&(arcount.saturating_sub(1)).to_be_bytes());
    region
}

/// Appends the TSIG variables (RFC 8945 §4.2: key name, class, TTL,
/// algorithm, time signed, fudge, error, other data) after the message
/// bytes, forming the complete MAC input.
fn mac_input_bytes(message_region: &[u8], tsig: &TsigRr) -> Vec<u8> {
    let mut buf = message_region.to_vec();
    tsig.key_name.write_uncompressed(&mut buf);
    buf.extend_from_slice(&255u16.to_be_bytes()); // CLASS ANY
    buf.extend_from_slice(&0u32.to_be_bytes()); // TTL 0
    tsig.algorithm.write_uncompressed(&mut buf);
    buf.extend_from_slice(&((tsig.time_signed >> 32) as u16).to_be_bytes());
    buf.extend_from_slice(&((tsig.time_signed & 0xFFFF_FFFF) as u32).to_be_bytes());
    buf.extend_from_slice(&tsig.fudge.to_be_bytes());
    buf.extend_from_slice(&tsig.error.to_be_bytes());
    buf.extend_from_slice(&(tsig.other_data.len() as u16).to_be_bytes());
    buf.extend_from_slice(&tsig.other_data);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::{Header, Message, Question};
    use crate::dns::header::{Opcode, Rcode};
    use crate::rr::{DnsClass, RrType};

    fn key() -> TsigKey {
        TsigKey {
            name: Name::make("key.example.com").unwrap(),
            algorithm: TsigAlgorithm::HmacSha256,
            secret: b"super-secret-key-material".to_vec(),
        }
    }

    #[test]
    fn sign_then_verify_round_trips() {
        let msg = Message {
            header: Header {
                id: 99,
                qr: false,
                opcode: Opcode::Query,
                aa: false,
                tc: false,
                rd: true,
                ra: false,
                ad: false,
                cd: false,
                rcode: Rcode::NoError,
                qdcount: 1,
                ancount: 0,
                nscount: 0,
                arcount: 0,
            },
            questions: vec![Question {
                qname: Name::make("example.com").unwrap(),
                qtype: RrType::A,
                qclass: DnsClass::In,
            }],
            answers: vec![],
            authority: vec![],
            additional: vec![],
            edns: None,
            tsig: None,
        };
        let encoded = msg.encode();
        let k = key();
        let tsig_rr = sign(&encoded, &k, msg.header.id).unwrap();

        let mut full = msg.clone();
        full.tsig = Some(tsig_rr);
        let full_bytes = full.encode();
        let tsig_rr_start = encoded.len();

        let mut keyring = TsigKeyring::new();
        keyring.insert(key());
        assert!(verify(&full_bytes, tsig_rr_start, full.tsig.as_ref().unwrap(), &keyring).is_ok());
    }

    #[test]
    fn verify_rejects_unknown_key() {
        let keyring = TsigKeyring::new();
        let tsig = TsigRr {
            key_name: Name::make("nosuch.example.com").unwrap(),
            algorithm: Name::make("hmac-sha256").unwrap(),
            time_signed: 0,
            fudge: 300,
            mac: vec![0; 32],
            original_id: 1,
            error: 0,
            other_data: vec![],
        };
        assert!(verify(&[0u8; 12], 12, &tsig, &keyring).is_err());
    }
}
