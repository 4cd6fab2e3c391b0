//! Resource records: RR tuples, typed rdata atoms, and RRsets.
//!
//! Grounded on heimdall's `dns/resource_record.rs` (`RData` enum matched to
//! `DnsResourceRecord`) and `dns/enums.rs` (closed, data-carrying type
//! enum), generalised per spec §3 "RR"/"RRset": rdata is "a sequence of
//! typed atoms: fixed-width integers, wire dnames ..., opaque byte
//! strings, or service-binding key/value lists".

pub mod rdata;

pub use rdata::RData;

use crate::error::{NsdError, Result};
use crate::name::Name;
use std::fmt;

/// DNS record class. Spec §3: "`class` is always IN in normal operation;
/// CH is reserved for `version.bind`/`id.server` style probes."
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DnsClass {
    In,
    Ch,
    Any,
    Unknown(u16),
}

impl DnsClass {
    pub fn to_u16(self) -> u16 {
        match self {
            DnsClass::In => 1,
            DnsClass::Ch => 3,
            DnsClass::Any => 255,
            DnsClass::Unknown(v) => v,
        }
    }

    pub fn from_u16(v: u16) -> Self {
        match v {
            1 => DnsClass::In,
            3 => DnsClass::Ch,
            255 => DnsClass::Any,
            other => DnsClass::Unknown(other),
        }
    }
}

impl fmt::Display for DnsClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DnsClass::In => write!(f, "IN"),
            DnsClass::Ch => write!(f, "CH"),
            DnsClass::Any => write!(f, "ANY"),
            DnsClass::Unknown(v) => write!(f, "CLASS{v}"),
        }
    }
}

/// DNS record/query type. A closed, data-carrying enum (spec §9 "Dynamic
/// dispatch on RR type" redesign note: "a tagged-variant RR data enum...
/// no open polymorphism is needed because the type set is closed and known
/// at build time").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RrType {
    A,
    Ns,
    Cname,
    Soa,
    Ptr,
    Mx,
    Txt,
    Aaaa,
    Srv,
    Naptr,
    Dname,
    Ds,
    Dnskey,
    Rrsig,
    Nsec,
    Nsec3,
    Nsec3Param,
    Caa,
    Sshfp,
    Tlsa,
    Svcb,
    Https,
    Opt,
    Tsig,
    // Meta-types valid only in the question section.
    Axfr,
    Ixfr,
    Any,
    Unknown(u16),
}

impl RrType {
    pub fn to_u16(self) -> u16 {
        use RrType::*;
        match self {
            A => 1,
            Ns => 2,
            Cname => 5,
            Soa => 6,
            Ptr => 12,
            Mx => 15,
            Txt => 16,
            Aaaa => 28,
            Srv => 33,
            Naptr => 35,
            Dname => 39,
            Opt => 41,
            Ds => 43,
            Sshfp => 44,
            Rrsig => 46,
            Nsec => 47,
            Dnskey => 48,
            Nsec3 => 50,
            Nsec3Param => 51,
            Tlsa => 52,
            Svcb => 64,
            Https => 65,
            Caa => 257,
            Tsig => 250,
            Ixfr => 251,
            Axfr => 252,
            Any => 255,
            Unknown(v) => v,
        }
    }

    pub fn from_u16(v: u16) -> Self {
        use RrType::*;
        match v {
            1 => A,
            2 => Ns,
            5 => Cname,
            6 => Soa,
            12 => Ptr,
            15 => Mx,
            16 => Txt,
            28 => Aaaa,
            33 => Srv,
            35 => Naptr,
            39 => Dname,
            41 => Opt,
            43 => Ds,
            44 => Sshfp,
            46 => Rrsig,
            47 => Nsec,
            48 => Dnskey,
            50 => Nsec3,
            51 => Nsec3Param,
            52 => Tlsa,
            64 => Svcb,
            65 => Https,
            257 => Caa,
            250 => Tsig,
            251 => Ixfr,
            252 => Axfr,
            255 => Any,
            other => Unknown(other),
        }
    }

    /// `true` for the meta-types that can only appear as a qtype, never
    /// stored in a zone.
    pub fn is_meta(self) -> bool {
        matches!(self, RrType::Axfr | RrType::Ixfr | RrType::Any)
    }
}

impl fmt::Display for RrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use RrType::*;
        let s = match self {
            A => "A",
            Ns => "NS",
            Cname => "CNAME",
            Soa => "SOA",
            Ptr => "PTR",
            Mx => "MX",
            Txt => "TXT",
            Aaaa => "AAAA",
            Srv => "SRV",
            Naptr => "NAPTR",
            Dname => "DNAME",
            Ds => "DS",
            Dnskey => "DNSKEY",
            Rrsig => "RRSIG",
            Nsec => "NSEC",
            Nsec3 => "NSEC3",
            Nsec3Param => "NSEC3PARAM",
            Caa => "CAA",
            Sshfp => "SSHFP",
            Tlsa => "TLSA",
            Svcb => "SVCB",
            Https => "HTTPS",
            Opt => "OPT",
            Tsig => "TSIG",
            Axfr => "AXFR",
            Ixfr => "IXFR",
            Any => "ANY",
            Unknown(v) => return write!(f, "TYPE{v}"),
        };
        write!(f, "{s}")
    }
}

/// A single resource record: `(owner, class, type, TTL, rdata)` (spec §3).
#[derive(Debug, Clone)]
pub struct Rr {
    pub owner: Name,
    pub class: DnsClass,
    pub rtype: RrType,
    pub ttl: u32,
    pub rdata: RData,
}

impl Rr {
    pub fn new(owner: Name, class: DnsClass, ttl: u32, rdata: RData) -> Self {
        Rr {
            owner,
            class,
            rtype: rdata.rtype(),
            ttl,
            rdata,
        }
    }
}

/// All RRs sharing `(owner, class, type)` — the atomic unit of storage
/// (spec §3 "RRset", GLOSSARY). Invariant: every member has the same TTL;
/// [`RrSet::push`] normalises (and rejects mismatches) on insert.
#[derive(Debug, Clone)]
pub struct RrSet {
    pub owner: Name,
    pub class: DnsClass,
    pub rtype: RrType,
    pub ttl: u32,
    pub data: Vec<RData>,
}

impl RrSet {
    pub fn new(owner: Name, class: DnsClass, rtype: RrType, ttl: u32) -> Self {
        RrSet {
            owner,
            class,
            rtype,
            ttl,
            data: Vec::new(),
        }
    }

    /// Insert `rdata`, deduplicating and enforcing the equal-TTL invariant
    /// (spec §4.C `add_rr`: "deduplicates within the RRset, enforces
    /// equal-TTL").
    pub fn push(&mut self, ttl: u32, rdata: RData) -> Result<()> {
        if rdata.rtype() != self.rtype {
            return Err(NsdError::ClassMismatch(format!(
                "{} rdata pushed into {} rrset",
                rdata.rtype(),
                self.rtype
            )));
        }
        if self.data.is_empty() {
            self.ttl = ttl;
        } else if ttl != self.ttl {
            // The store normalises on insert: lowest TTL wins, matching
            // BIND/NSD convention for TTL disagreement within an RRset.
            self.ttl = self.ttl.min(ttl);
        }
        if !self.data.iter().any(|d| d.eq_rdata(&rdata)) {
            self.data.push(rdata);
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn remove(&mut self, rdata: &RData) -> bool {
        let before = self.data.len();
        self.data.retain(|d| !d.eq_rdata(rdata));
        self.data.len() != before
    }

    pub fn iter_rrs(&self) -> impl Iterator<Item = Rr> + '_ {
        self.data.iter().map(move |d| Rr {
            owner: self.owner.clone(),
            class: self.class,
            rtype: self.rtype,
            ttl: self.ttl,
            rdata: d.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn rrset_normalizes_ttl_and_dedups() {
        let owner = Name::make("www.example.com").unwrap();
        let mut set = RrSet::new(owner, DnsClass::In, RrType::A, 300);
        set.push(300, RData::A(Ipv4Addr::new(192, 0, 2, 1))).unwrap();
        set.push(100, RData::A(Ipv4Addr::new(192, 0, 2, 1))).unwrap();
        set.push(300, RData::A(Ipv4Addr::new(192, 0, 2, 2))).unwrap();
        assert_eq!(set.data.len(), 2);
        assert_eq!(set.ttl, 100);
    }

    #[test]
    fn rrset_rejects_type_mismatch() {
        let owner = Name::make("www.example.com").unwrap();
        let mut set = RrSet::new(owner, DnsClass::In, RrType::A, 300);
        let err = set.push(300, RData::Txt(vec![b"hi".to_vec()]));
        assert!(err.is_err());
    }
}
