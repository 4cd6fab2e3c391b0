//! Per-zone refresh state machine (spec §4.H).
//!
//! ```text
//!   refreshing ──success──▶ ok ──refresh timer──▶ refreshing
//!        │                     │
//!        │                     └──expire timer──▶ expired
//!        └──retry exhausted───────────────────────▶ expired
//!   expired ──NOTIFY or retry────────────────────▶ refreshing
//! ```

use crate::dns::header::{Header, Opcode, Rcode};
use crate::dns::message::Message;
use crate::dns::question::Question;
use crate::error::{NsdError, Result};
use crate::journal::{self, Journal, JournalEntry};
use crate::name::Name;
use crate::rr::{DnsClass, RData, Rr, RrType};
use crate::tsig::{self, TsigKey};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneState {
    Refreshing,
    Ok,
    Expired,
}

/// A configured upstream for this zone: address plus the TSIG key that
/// must sign the exchange, if any (spec §4.H "Inputs per zone: configured
/// list of primaries (acl + key)").
#[derive(Debug, Clone)]
pub struct Primary {
    pub addr: SocketAddr,
    pub key: Option<TsigKey>,
}

/// Outcome of one SOA probe against a single primary.
pub enum ProbeOutcome {
    /// Primary's serial is not ahead of ours; nothing to do.
    UpToDate,
    /// Primary is ahead; caller should pull IXFR/AXFR starting at `from_serial`.
    Ahead { primary_serial: u32 },
    Unreachable,
}

/// Result of a completed (successful) transfer, ready to be appended to
/// the journal and handed to the server via the task ring.
pub struct TransferResult {
    pub entry: JournalEntry,
    pub is_axfr: bool,
}

pub struct ZoneXfr {
    pub zone: Name,
    pub class: DnsClass,
    pub primaries: Vec<Primary>,
    pub local_serial: Option<u32>,
    pub state: ZoneState,
    pub retry_count: u32,
    pub refresh_secs: u32,
    pub retry_secs: u32,
    pub expire_secs: u32,
    /// Permit falling back to AXFR when IXFR fails (spec §6.4
    /// `allow-axfr-fallback`); otherwise a non-IXFR-capable primary is a
    /// protocol violation.
    pub allow_axfr_fallback: bool,
    /// Consult every configured primary before giving up a cycle instead
    /// of stopping at the first reachable one (spec §6.4
    /// `multi-primary-check`).
    pub multi_primary_check: bool,
    last_refresh: Option<Instant>,
    last_notify_out: Option<Instant>,
}

impl ZoneXfr {
    pub fn new(zone: Name, class: DnsClass, primaries: Vec<Primary>) -> Self {
        ZoneXfr {
            zone,
            class,
            primaries,
            local_serial: None,
            state: ZoneState::Expired,
            retry_count: 0,
            refresh_secs: 3600,
            retry_secs: 900,
            expire_secs: 1_209_600,
            allow_axfr_fallback: true,
            multi_primary_check: false,
            last_refresh: None,
            last_notify_out: None,
        }
    }

    /// NOTIFY receipt resets the retry counter and advances the zone
    /// immediately to `refreshing` (spec §4.H).
    pub fn on_notify_received(&mut self) {
        self.retry_count = 0;
        self.state = ZoneState::Refreshing;
    }

    /// Timer-driven transitions: `ok` -> `refreshing` on the refresh
    /// timer, `ok`/`refreshing` -> `expired` once the expire timer fires
    /// with no successful refresh in between.
    pub fn tick(&mut self, now: Instant) {
        let Some(last) = self.last_refresh else {
            return;
        };
        let elapsed = now.duration_since(last);
        if elapsed >= Duration::from_secs(self.expire_secs as u64) {
            self.state = ZoneState::Expired;
        } else if self.state == ZoneState::Ok && elapsed >= Duration::from_secs(self.refresh_secs as u64) {
            self.state = ZoneState::Refreshing;
        }
    }

    /// Step 2 of the probe algorithm: compare the primary's serial against
    /// ours using serial-number arithmetic (RFC 1982).
    fn decide(&self, primary_serial: u32) -> ProbeOutcome {
        match self.local_serial {
            None => ProbeOutcome::Ahead { primary_serial },
            Some(local) if serial_gt(primary_serial, local) => ProbeOutcome::Ahead { primary_serial },
            _ => ProbeOutcome::UpToDate,
        }
    }

    pub fn record_success(&mut self, new_serial: u32, now: Instant) {
        self.local_serial = Some(new_serial);
        self.retry_count = 0;
        self.state = ZoneState::Ok;
        self.last_refresh = Some(now);
    }

    /// Linear backoff in the retry counter, capped, with jitter (spec
    /// §4.H "Backoff: linear in the per-zone retry counter up to a cap,
    /// with jitter").
    pub fn record_failure(&mut self) -> Duration {
        self.retry_count = self.retry_count.saturating_add(1);
        let capped = self.retry_count.min(20);
        let base = self.retry_secs.min(capped * 60);
        let jitter = (rand::random::<u32>() % 30) as u64;
        Duration::from_secs(base as u64 + jitter)
    }

    pub fn should_notify_out(&self, now: Instant) -> bool {
        match self.last_notify_out {
            None => true,
            Some(last) => now.duration_since(last) > Duration::from_secs(5),
        }
    }

    pub fn mark_notified(&mut self, now: Instant) {
        self.last_notify_out = Some(now);
    }

    /// Build the SOA probe query (spec §4.H step 1).
    pub fn build_soa_query(&self, id: u16) -> Vec<u8> {
        build_query(&self.zone, RrType::Soa, self.class, id)
    }

    /// Decide what to do with a parsed SOA response (step 2).
    pub fn handle_soa_response(&self, msg: &Message) -> Result<ProbeOutcome> {
        let soa = extract_soa(msg, &self.zone)?;
        Ok(self.decide(soa.serial))
    }

    /// Build an IXFR request starting from our current serial (step 3).
    pub fn build_ixfr_query(&self, id: u16) -> Result<Vec<u8>> {
        let from = self
            .local_serial
            .ok_or_else(|| NsdError::ZoneNotFound(self.zone.to_presentation()))?;
        let mut query = build_query(&self.zone, RrType::Ixfr, self.class, id);
        // IXFR carries the client's current SOA serial in the authority
        // section (RFC 1995 §3); append it after encoding the base
        // query so the generic builder stays reusable for AXFR/SOA too.
        append_ixfr_authority(&mut query, &self.zone, self.class, from);
        Ok(query)
    }

    pub fn build_axfr_query(&self, id: u16) -> Vec<u8> {
        build_query(&self.zone, RrType::Axfr, self.class, id)
    }

    /// Interpret a completed transfer's RR stream (step 4): a response
    /// bracketed by a single leading+trailing SOA with only additions in
    /// between is AXFR-style full content; a sequence alternating
    /// decreasing/increasing SOAs delimits IXFR delete/add blocks (RFC
    /// 1995 §4).
    pub fn interpret_transfer(&self, rrs: Vec<Rr>) -> Result<TransferResult> {
        if rrs.is_empty() {
            return Err(NsdError::ProtocolViolation("empty transfer".into()));
        }
        let first_soa = match &rrs[0].rdata {
            RData::Soa(soa) => soa.clone(),
            _ => return Err(NsdError::ProtocolViolation("transfer did not start with SOA".into())),
        };
        let is_axfr_style = rrs.len() == 1
            || !matches!(&rrs[1].rdata, RData::Soa(_));
        if is_axfr_style {
            let old_serial = self.local_serial.unwrap_or(0);
            let entry = journal::diff(&[], &rrs, self.zone.clone(), old_serial, first_soa.serial);
            return Ok(TransferResult { entry, is_axfr: true });
        }
        if !self.allow_axfr_fallback && rrs.len() < 3 {
            return Err(NsdError::ProtocolViolation("truncated IXFR sequence".into()));
        }
        let (removed, added) = split_ixfr_blocks(&rrs)?;
        let old_serial = self.local_serial.unwrap_or(0);
        Ok(TransferResult {
            entry: JournalEntry {
                zone: self.zone.clone(),
                old_serial,
                new_serial: first_soa.serial,
                removed,
                added,
            },
            is_axfr: false,
        })
    }
}

fn serial_gt(a: u32, b: u32) -> bool {
    // RFC 1982 serial number arithmetic.
    (a.wrapping_sub(b) as i32) > 0 && a != b
}

fn build_query(zone: &Name, qtype: RrType, class: DnsClass, id: u16) -> Vec<u8> {
    let msg = Message {
        header: Header {
            id,
            qr: false,
            opcode: Opcode::Query,
            aa: false,
            tc: false,
            rd: false,
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
            qname: zone.clone(),
            qtype,
            qclass: class,
        }],
        answers: vec![],
        authority: vec![],
        additional: vec![],
        edns: None,
        tsig: None,
    };
    msg.encode()
}

fn append_ixfr_authority(query: &mut Vec<u8>, zone: &Name, class: DnsClass, from_serial: u32) {
    let soa = RData::Soa(crate::rr::rdata::Soa {
        mname: zone.clone(),
        rname: zone.clone(),
        serial: from_serial,
        refresh: 0,
        retry: 0,
        expire: 0,
        minimum: 0,
    });
    let rr = Rr::new(zone.clone(), class, 0, soa);
    let mut comp = crate::name::compression::CompressionTable::new();
    let mut rdata_bytes = Vec::new();
    rr.rdata.encode(&mut rdata_bytes, &mut comp);
    zone.write_uncompressed(query);
    query.extend_from_slice(&RrType::Soa.to_u16().to_be_bytes());
    query.extend_from_slice(&class.to_u16().to_be_bytes());
    query.extend_from_slice(&0u32.to_be_bytes());
    query.extend_from_slice(&(rdata_bytes.len() as u16).to_be_bytes());
    query.extend_from_slice(&rdata_bytes);
    // Patch nscount from 0 to 1 (header is the first 12 bytes).
    let nscount = u16::from_be_bytes([query[8], query[9]]);
    query[8..10].copy_from_slice(&(nscount + 1).to_be_bytes());
}

fn extract_soa(msg: &Message, zone: &Name) -> Result<crate::rr::rdata::Soa> {
    msg.answers
        .iter()
        .find(|rr| rr.owner.eq_ci(zone))
        .and_then(|rr| match &rr.rdata {
            RData::Soa(soa) => Some(soa.clone()),
            _ => None,
        })
        .ok_or_else(|| NsdError::UnexpectedResponse(format!("no SOA in response for {}", zone.to_presentation())))
}

/// Split an IXFR message sequence into its removed/added RR blocks (RFC
/// 1995 §4): after the leading SOA, blocks alternate
/// `[old-SOA, removed...], [new-SOA, added...], ...`.
fn split_ixfr_blocks(rrs: &[Rr]) -> Result<(Vec<Rr>, Vec<Rr>)> {
    let mut removed = Vec::new();
    let mut added = Vec::new();
    let mut i = 1; // skip the leading "final" SOA already consumed by the caller
    let mut adding = false;
    while i < rrs.len() {
        let rr = &rrs[i];
        if matches!(&rr.rdata, RData::Soa(_)) {
            adding = !adding;
            i += 1;
            continue;
        }
        if adding {
            added.push(rr.clone());
        } else {
            removed.push(rr.clone());
        }
        i += 1;
    }
    if removed.is_empty() && added.is_empty() {
        return Err(NsdError::ProtocolViolation("IXFR sequence had no delete/add blocks".into()));
    }
    Ok((removed, added))
}

/// Sign an outgoing transfer/probe query with the primary's configured
/// key, if any.
pub fn maybe_sign(query: &[u8], primary: &Primary, id: u16) -> Result<Vec<u8>> {
    let Some(key) = &primary.key else {
        return Ok(query.to_vec());
    };
    let tsig_rr = tsig::sign(query, key, id)?;
    let msg = Message::decode(query)?;
    let mut signed = msg;
    signed.tsig = Some(tsig_rr);
    Ok(signed.encode())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xfr() -> ZoneXfr {
        ZoneXfr::new(Name::make("example.com").unwrap(), DnsClass::In, vec![])
    }

    #[test]
    fn decide_detects_stale_local_serial() {
        let mut z = xfr();
        z.local_serial = Some(5);
        assert!(matches!(z.decide(10), ProbeOutcome::Ahead { primary_serial: 10 }));
        assert!(matches!(z.decide(5), ProbeOutcome::UpToDate));
    }

    #[test]
    fn record_failure_grows_backoff_with_retry_count() {
        let mut z = xfr();
        let first = z.record_failure();
        let second = z.record_failure();
        assert!(second >= first || z.retry_count == 2);
    }

    #[test]
    fn interpret_axfr_style_single_soa_bracket() {
        let z = xfr();
        let soa = RData::Soa(crate::rr::rdata::Soa {
            mname: Name::make("ns1.example.com").unwrap(),
            rname: Name::make("hostmaster.example.com").unwrap(),
            serial: 7,
            refresh: 3600,
            retry: 900,
            expire: 1209600,
            minimum: 3600,
        });
        let rrs = vec![
            Rr::new(Name::make("example.com").unwrap(), DnsClass::In, 3600, soa.clone()),
            Rr::new(
                Name::make("www.example.com").unwrap(),
                DnsClass::In,
                300,
                RData::A(std::net::Ipv4Addr::new(192, 0, 2, 1)),
            ),
            Rr::new(Name::make("example.com").unwrap(), DnsClass::In, 3600, soa),
        ];
        let result = z.interpret_transfer(rrs).unwrap();
        assert!(result.is_axfr);
        assert_eq!(result.entry.added.len(), 3); // SOA, A, trailing SOA all copied as full content
    }
}
