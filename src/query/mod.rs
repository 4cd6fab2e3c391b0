//! Query engine: decode, zone selection, authoritative name resolution,
//! and response assembly (spec §4.E).
//!
//! Grounded on heimdall's `resolver.rs` (the module that turns a decoded
//! question into an answered packet) generalized from recursive/cache
//! lookup to authoritative zone-tree walking, and on its `server.rs`
//! call site for how a decode error maps to a best-effort error response.

mod resolve;
mod special;

pub use resolve::{resolve, Resolution};

use crate::dns::header::{Opcode, Rcode};
use crate::dns::Message;
use crate::rr::{DnsClass, RrType};
use crate::store::ZoneTable;

/// Which socket a query arrived on (spec §6.1: UDP answers are capped to
/// the negotiated EDNS/512-byte payload size with TC set on overflow; TCP
/// answers carry the full message up to the 65535-byte frame limit).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Udp,
    Tcp,
}

impl Transport {
    pub fn label(self) -> &'static str {
        match self {
            Transport::Udp => "udp",
            Transport::Tcp => "tcp",
        }
    }

    pub fn is_tcp(self) -> bool {
        matches!(self, Transport::Tcp)
    }
}

/// Top-level entry point for one incoming datagram (spec §4.E steps 1-6;
/// RRL gating, step 7, happens in the caller since it needs the source
/// address that this function doesn't take).
pub fn handle_query(raw: &[u8], zones: &ZoneTable, transport: Transport) -> Vec<u8> {
    let mut msg = match Message::decode(raw) {
        Ok(msg) => msg,
        Err(_) => return formerr_from_raw(raw),
    };

    if !msg.is_query() {
        // Not something we answer; NOTIFY replies and update acks are
        // built by xfrd/the update handler, not this path.
        return Vec::new();
    }

    msg.header.qr = true;
    msg.header.ra = false;
    msg.answers.clear();
    msg.authority.clear();
    msg.additional.clear();

    if msg.header.opcode != Opcode::Query {
        msg.set_rcode(Rcode::NotImp);
        return finish(msg, transport);
    }

    let question = match msg.questions.first().cloned() {
        Some(q) if msg.questions.len() == 1 => q,
        _ => {
            msg.set_rcode(Rcode::FormErr);
            return finish(msg, transport);
        }
    };

    if let Some(answer) = special::answer_special_name(&question) {
        msg.answers.push(answer);
        msg.header.aa = true;
        return finish(msg, transport);
    }

    if question.qclass != DnsClass::In && question.qclass != DnsClass::Any {
        msg.set_rcode(Rcode::Refused);
        return finish(msg, transport);
    }

    if question.qtype.is_meta() && question.qtype != RrType::Any {
        // AXFR/IXFR never arrive over this path (spec §4.E is the
        // UDP/short-TCP query path; transfers are handled by the zone
        // transfer listener, which inspects qtype before dispatching
        // here).
        msg.set_rcode(Rcode::NotImp);
        return finish(msg, transport);
    }

    let do_bit = msg.edns.as_ref().is_some_and(|e| e.do_bit);
    match resolve::resolve(zones, &question.qname, question.qtype, do_bit) {
        Resolution::Refused => {
            msg.set_rcode(Rcode::Refused);
        }
        Resolution::Answer {
            aa,
            answers,
            authority,
            additional,
        } => {
            msg.header.aa = aa;
            msg.answers = answers;
            msg.authority = authority;
            msg.additional = additional;
        }
        Resolution::NoData { aa, authority } => {
            msg.header.aa = aa;
            msg.authority = authority;
        }
        Resolution::NxDomain { authority } => {
            msg.set_rcode(Rcode::NxDomain);
            msg.header.aa = true;
            msg.authority = authority;
        }
        Resolution::Delegation { authority, additional } => {
            msg.header.aa = false;
            msg.authority = authority;
            msg.additional = additional;
        }
    }

    finish(msg, transport)
}

/// Apply the EDNS payload-size limit, truncating the answer/authority/
/// additional sections from the back if the encoded message would
/// overflow (spec §4.E step 5, "On truncation set TC"). TCP carries the
/// full message regardless of EDNS payload size (spec §6.1) — that cap
/// only governs UDP.
fn finish(mut msg: Message, transport: Transport) -> Vec<u8> {
    if transport.is_tcp() {
        return msg.encode();
    }
    let limit = match &msg.edns {
        Some(edns) => edns.udp_payload_size.max(512) as usize,
        None => 512,
    };
    let mut encoded = msg.encode();
    while encoded.len() > limit {
        if !msg.additional.is_empty() {
            msg.additional.pop();
        } else if !msg.authority.is_empty() {
            msg.authority.pop();
        } else if !msg.answers.is_empty() {
            msg.answers.pop();
            msg.header.tc = true;
        } else {
            msg.header.tc = true;
            break;
        }
        encoded = msg.encode();
    }
    encoded
}

/// A message too malformed to decode at all still gets a best-effort
/// FORMERR with the original ID copied through if the first two bytes
/// are present (spec §4.E step 1).
fn formerr_from_raw(raw: &[u8]) -> Vec<u8> {
    let id = if raw.len() >= 2 {
        u16::from_be_bytes([raw[0], raw[1]])
    } else {
        0
    };
    let header = crate::dns::Header {
        id,
        qr: true,
        opcode: Opcode::Query,
        aa: false,
        tc: false,
        rd: false,
        ra: false,
        ad: false,
        cd: false,
        rcode: Rcode::FormErr,
        qdcount: 0,
        ancount: 0,
        nscount: 0,
        arcount: 0,
    };
    let mut out = Vec::with_capacity(12);
    header.encode(&mut out);
    out
}
