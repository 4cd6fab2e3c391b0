//! Typed rdata atoms (spec §3: "a sequence of typed atoms: fixed-width
//! integers, wire dnames ..., opaque byte strings, or service-binding
//! key/value lists").
//!
//! Grounded on heimdall's `dns/resource_record.rs` `RData` enum, widened to
//! cover the RR types an authoritative, DNSSEC-serving nameserver needs
//! (spec §4.E step 4: "NSEC/NSEC3 answer synthesis, RRSIG pass-through").

use super::RrType;
use crate::error::{NsdError, Result};
use crate::name::{CompressionTable, Name};
use std::net::{Ipv4Addr, Ipv6Addr};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Soa {
    pub mname: Name,
    pub rname: Name,
    pub serial: u32,
    pub refresh: u32,
    pub retry: u32,
    pub expire: u32,
    pub minimum: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mx {
    pub preference: u16,
    pub exchange: Name,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Srv {
    pub priority: u16,
    pub weight: u16,
    pub port: u16,
    pub target: Name,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Naptr {
    pub order: u16,
    pub preference: u16,
    pub flags: Vec<u8>,
    pub services: Vec<u8>,
    pub regexp: Vec<u8>,
    pub replacement: Name,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caa {
    pub flag: u8,
    pub tag: Vec<u8>,
    pub value: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sshfp {
    pub algorithm: u8,
    pub fp_type: u8,
    pub fingerprint: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tlsa {
    pub usage: u8,
    pub selector: u8,
    pub matching_type: u8,
    pub cert_data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ds {
    pub key_tag: u16,
    pub algorithm: u8,
    pub digest_type: u8,
    pub digest: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dnskey {
    pub flags: u16,
    pub protocol: u8,
    pub algorithm: u8,
    pub public_key: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rrsig {
    pub type_covered: RrType,
    pub algorithm: u8,
    pub labels: u8,
    pub original_ttl: u32,
    pub expiration: u32,
    pub inception: u32,
    pub key_tag: u16,
    pub signer_name: Name,
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nsec {
    pub next_owner: Name,
    pub type_bitmap: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nsec3 {
    pub hash_algorithm: u8,
    pub flags: u8,
    pub iterations: u16,
    pub salt: Vec<u8>,
    pub next_hashed_owner: Vec<u8>,
    pub type_bitmap: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nsec3Param {
    pub hash_algorithm: u8,
    pub flags: u8,
    pub iterations: u16,
    pub salt: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SvcbParam {
    pub key: u16,
    pub value: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Svcb {
    pub priority: u16,
    pub target: Name,
    pub params: Vec<SvcbParam>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RData {
    A(Ipv4Addr),
    Aaaa(Ipv6Addr),
    Ns(Name),
    Cname(Name),
    Ptr(Name),
    Dname(Name),
    Soa(Soa),
    Mx(Mx),
    Txt(Vec<Vec<u8>>),
    Srv(Srv),
    Naptr(Naptr),
    Caa(Caa),
    Sshfp(Sshfp),
    Tlsa(Tlsa),
    Ds(Ds),
    Dnskey(Dnskey),
    Rrsig(Rrsig),
    Nsec(Nsec),
    Nsec3(Nsec3),
    Nsec3Param(Nsec3Param),
    Svcb(Svcb),
    Https(Svcb),
    /// Any type this crate doesn't interpret: carried opaquely, per RFC
    /// 3597 "unknown RR" semantics, so zones can hold forward-compatible
    /// record types without falling over.
    Unknown(RrType, Vec<u8>),
}

impl RData {
    pub fn rtype(&self) -> RrType {
        match self {
            RData::A(_) => RrType::A,
            RData::Aaaa(_) => RrType::Aaaa,
            RData::Ns(_) => RrType::Ns,
            RData::Cname(_) => RrType::Cname,
            RData::Ptr(_) => RrType::Ptr,
            RData::Dname(_) => RrType::Dname,
            RData::Soa(_) => RrType::Soa,
            RData::Mx(_) => RrType::Mx,
            RData::Txt(_) => RrType::Txt,
            RData::Srv(_) => RrType::Srv,
            RData::Naptr(_) => RrType::Naptr,
            RData::Caa(_) => RrType::Caa,
            RData::Sshfp(_) => RrType::Sshfp,
            RData::Tlsa(_) => RrType::Tlsa,
            RData::Ds(_) => RrType::Ds,
            RData::Dnskey(_) => RrType::Dnskey,
            RData::Rrsig(_) => RrType::Rrsig,
            RData::Nsec(_) => RrType::Nsec,
            RData::Nsec3(_) => RrType::Nsec3,
            RData::Nsec3Param(_) => RrType::Nsec3Param,
            RData::Svcb(_) => RrType::Svcb,
            RData::Https(_) => RrType::Https,
            RData::Unknown(t, _) => *t,
        }
    }

    /// Byte-exact equality, used by [`super::RrSet::push`]/`remove` to
    /// dedupe within an RRset (spec §4.C).
    pub fn eq_rdata(&self, other: &RData) -> bool {
        self == other
    }

    /// Decode rdata of `rtype` occupying `msg[start..start+len]`, following
    /// name-compression pointers against the whole message where the RR
    /// type allows it.
    pub fn decode(rtype: RrType, msg: &[u8], start: usize, len: usize) -> Result<RData> {
        let end = start
            .checked_add(len)
            .filter(|&e| e <= msg.len())
            .ok_or_else(|| NsdError::Parse {
                offset: start,
                reason: "rdata length exceeds message".into(),
            })?;
        let bad = |reason: &str| NsdError::Parse {
            offset: start,
            reason: reason.to_string(),
        };
        match rtype {
            RrType::A => {
                if len != 4 {
                    return Err(bad("A rdata must be 4 bytes"));
                }
                Ok(RData::A(Ipv4Addr::new(
                    msg[start],
                    msg[start + 1],
                    msg[start + 2],
                    msg[start + 3],
                )))
            }
            RrType::Aaaa => {
                if len != 16 {
                    return Err(bad("AAAA rdata must be 16 bytes"));
                }
                let mut octets = [0u8; 16];
                octets.copy_from_slice(&msg[start..end]);
                Ok(RData::Aaaa(Ipv6Addr::from(octets)))
            }
            RrType::Ns => Ok(RData::Ns(Name::from_wire_compressed(msg, start)?.0)),
            RrType::Cname => Ok(RData::Cname(Name::from_wire_compressed(msg, start)?.0)),
            RrType::Ptr => Ok(RData::Ptr(Name::from_wire_compressed(msg, start)?.0)),
            RrType::Dname => Ok(RData::Dname(Name::from_wire_compressed(msg, start)?.0)),
            RrType::Soa => {
                let (mname, p1) = Name::from_wire_compressed(msg, start)?;
                let (rname, p2) = Name::from_wire_compressed(msg, p1)?;
                if p2 + 20 > end {
                    return Err(bad("truncated SOA"));
                }
                Ok(RData::Soa(Soa {
                    mname,
                    rname,
                    serial: be_u32(msg, p2),
                    refresh: be_u32(msg, p2 + 4),
                    retry: be_u32(msg, p2 + 8),
                    expire: be_u32(msg, p2 + 12),
                    minimum: be_u32(msg, p2 + 16),
                }))
            }
            RrType::Mx => {
                if start + 2 > end {
                    return Err(bad("truncated MX"));
                }
                let preference = be_u16(msg, start);
                let (exchange, _) = Name::from_wire_compressed(msg, start + 2)?;
                Ok(RData::Mx(Mx {
                    preference,
                    exchange,
                }))
            }
            RrType::Txt => {
                let mut strings = Vec::new();
                let mut pos = start;
                while pos < end {
                    let slen = msg[pos] as usize;
                    if pos + 1 + slen > end {
                        return Err(bad("truncated TXT character-string"));
                    }
                    strings.push(msg[pos + 1..pos + 1 + slen].to_vec());
                    pos += 1 + slen;
                }
                Ok(RData::Txt(strings))
            }
            RrType::Srv => {
                if start + 6 > end {
                    return Err(bad("truncated SRV"));
                }
                let priority = be_u16(msg, start);
                let weight = be_u16(msg, start + 2);
                let port = be_u16(msg, start + 4);
                let (target, _) = Name::from_wire_compressed(msg, start + 6)?;
                Ok(RData::Srv(Srv {
                    priority,
                    weight,
                    port,
                    target,
                }))
            }
            RrType::Naptr => {
                if start + 4 > end {
                    return Err(bad("truncated NAPTR"));
                }
                let order = be_u16(msg, start);
                let preference = be_u16(msg, start + 2);
                let mut pos = start + 4;
                let flags = read_char_string(msg, &mut pos, end)?;
                let services = read_char_string(msg, &mut pos, end)?;
                let regexp = read_char_string(msg, &mut pos, end)?;
                let (replacement, _) = Name::from_wire_compressed(msg, pos)?;
                Ok(RData::Naptr(Naptr {
                    order,
                    preference,
                    flags,
                    services,
                    regexp,
                    replacement,
                }))
            }
            RrType::Caa => {
                if start + 2 > end {
                    return Err(bad("truncated CAA"));
                }
                let flag = msg[start];
                let tag_len = msg[start + 1] as usize;
                if start + 2 + tag_len > end {
                    return Err(bad("truncated CAA tag"));
                }
                let tag = msg[start + 2..start + 2 + tag_len].to_vec();
                let value = msg[start + 2 + tag_len..end].to_vec();
                Ok(RData::Caa(Caa { flag, tag, value }))
            }
            RrType::Sshfp => {
                if start + 2 > end {
                    return Err(bad("truncated SSHFP"));
                }
                Ok(RData::Sshfp(Sshfp {
                    algorithm: msg[start],
                    fp_type: msg[start + 1],
                    fingerprint: msg[start + 2..end].to_vec(),
                }))
            }
            RrType::Tlsa => {
                if start + 3 > end {
                    return Err(bad("truncated TLSA"));
                }
                Ok(RData::Tlsa(Tlsa {
                    usage: msg[start],
                    selector: msg[start + 1],
                    matching_type: msg[start + 2],
                    cert_data: msg[start + 3..end].to_vec(),
                }))
            }
            RrType::Ds => {
                if start + 4 > end {
                    return Err(bad("truncated DS"));
                }
                Ok(RData::Ds(Ds {
                    key_tag: be_u16(msg, start),
                    algorithm: msg[start + 2],
                    digest_type: msg[start + 3],
                    digest: msg[start + 4..end].to_vec(),
                }))
            }
            RrType::Dnskey => {
                if start + 4 > end {
                    return Err(bad("truncated DNSKEY"));
                }
                Ok(RData::Dnskey(Dnskey {
                    flags: be_u16(msg, start),
                    protocol: msg[start + 2],
                    algorithm: msg[start + 3],
                    public_key: msg[start + 4..end].to_vec(),
                }))
            }
            RrType::Rrsig => {
                if start + 18 > end {
                    return Err(bad("truncated RRSIG"));
                }
                let type_covered = RrType::from_u16(be_u16(msg, start));
                let algorithm = msg[start + 2];
                let labels = msg[start + 3];
                let original_ttl = be_u32(msg, start + 4);
                let expiration = be_u32(msg, start + 8);
                let inception = be_u32(msg, start + 12);
                let key_tag = be_u16(msg, start + 16);
                let (signer_name, sig_start) = Name::from_wire_compressed(msg, start + 18)?;
                if sig_start > end {
                    return Err(bad("truncated RRSIG signer name"));
                }
                Ok(RData::Rrsig(Rrsig {
                    type_covered,
                    algorithm,
                    labels,
                    original_ttl,
                    expiration,
                    inception,
                    key_tag,
                    signer_name,
                    signature: msg[sig_start..end].to_vec(),
                }))
            }
            RrType::Nsec => {
                let (next_owner, bitmap_start) = Name::from_wire_compressed(msg, start)?;
                if bitmap_start > end {
                    return Err(bad("truncated NSEC"));
                }
                Ok(RData::Nsec(Nsec {
                    next_owner,
                    type_bitmap: msg[bitmap_start..end].to_vec(),
                }))
            }
            RrType::Nsec3 => {
                if start + 5 > end {
                    return Err(bad("truncated NSEC3"));
                }
                let hash_algorithm = msg[start];
                let flags = msg[start + 1];
                let iterations = be_u16(msg, start + 2);
                let salt_len = msg[start + 4] as usize;
                let mut pos = start + 5;
                if pos + salt_len > end {
                    return Err(bad("truncated NSEC3 salt"));
                }
                let salt = msg[pos..pos + salt_len].to_vec();
                pos += salt_len;
                if pos >= end {
                    return Err(bad("truncated NSEC3 hash"));
                }
                let hash_len = msg[pos] as usize;
                pos += 1;
                if pos + hash_len > end {
                    return Err(bad("truncated NSEC3 next hashed owner"));
                }
                let next_hashed_owner = msg[pos..pos + hash_len].to_vec();
                pos += hash_len;
                Ok(RData::Nsec3(Nsec3 {
                    hash_algorithm,
                    flags,
                    iterations,
                    salt,
                    next_hashed_owner,
                    type_bitmap: msg[pos..end].to_vec(),
                }))
            }
            RrType::Nsec3Param => {
                if start + 5 > end {
                    return Err(bad("truncated NSEC3PARAM"));
                }
                let salt_len = msg[start + 4] as usize;
                if start + 5 + salt_len != end {
                    return Err(bad("NSEC3PARAM length mismatch"));
                }
                Ok(RData::Nsec3Param(Nsec3Param {
                    hash_algorithm: msg[start],
                    flags: msg[start + 1],
                    iterations: be_u16(msg, start + 2),
                    salt: msg[start + 5..end].to_vec(),
                }))
            }
            RrType::Svcb | RrType::Https => {
                if start + 2 > end {
                    return Err(bad("truncated SVCB/HTTPS"));
                }
                let priority = be_u16(msg, start);
                let (target, params_start) = Name::from_wire_compressed(msg, start + 2)?;
                let mut pos = params_start;
                let mut params = Vec::new();
                while pos < end {
                    if pos + 4 > end {
                        return Err(bad("truncated SVCB param header"));
                    }
                    let key = be_u16(msg, pos);
                    let vlen = be_u16(msg, pos + 2) as usize;
                    pos += 4;
                    if pos + vlen > end {
                        return Err(bad("truncated SVCB param value"));
                    }
                    params.push(SvcbParam {
                        key,
                        value: msg[pos..pos + vlen].to_vec(),
                    });
                    pos += vlen;
                }
                let svcb = Svcb {
                    priority,
                    target,
                    params,
                };
                Ok(if rtype == RrType::Https {
                    RData::Https(svcb)
                } else {
                    RData::Svcb(svcb)
                })
            }
            other => Ok(RData::Unknown(other, msg[start..end].to_vec())),
        }
    }

    /// Append the wire encoding of this rdata to `out`, compressing names
    /// where the RR type's defining RFC permits it (SOA/MX/NS/CNAME/PTR/
    /// SRV — RFC 1035/2782 "MUST NOT" case-mangle but compression of these
    /// is conventional in NSD/BIND output). RRSIG/NSEC/etc. embed names
    /// uncompressed since signatures are computed over the canonical
    /// uncompressed form.
    pub fn encode(&self, out: &mut Vec<u8>, comp: &mut CompressionTable) {
        match self {
            RData::A(addr) => out.extend_from_slice(&addr.octets()),
            RData::Aaaa(addr) => out.extend_from_slice(&addr.octets()),
            RData::Ns(n) | RData::Cname(n) | RData::Ptr(n) => n.write_compressed(out, comp),
            RData::Dname(n) => n.write_uncompressed(out),
            RData::Soa(soa) => {
                soa.mname.write_compressed(out, comp);
                soa.rname.write_compressed(out, comp);
                out.extend_from_slice(&soa.serial.to_be_bytes());
                out.extend_from_slice(&soa.refresh.to_be_bytes());
                out.extend_from_slice(&soa.retry.to_be_bytes());
                out.extend_from_slice(&soa.expire.to_be_bytes());
                out.extend_from_slice(&soa.minimum.to_be_bytes());
            }
            RData::Mx(mx) => {
                out.extend_from_slice(&mx.preference.to_be_bytes());
                mx.exchange.write_compressed(out, comp);
            }
            RData::Txt(strings) => {
                for s in strings {
                    out.push(s.len() as u8);
                    out.extend_from_slice(s);
                }
            }
            RData::Srv(srv) => {
                out.extend_from_slice(&srv.priority.to_be_bytes());
                out.extend_from_slice(&srv.weight.to_be_bytes());
                out.extend_from_slice(&srv.port.to_be_bytes());
                srv.target.write_uncompressed(out);
            }
            RData::Naptr(n) => {
                out.extend_from_slice(&n.order.to_be_bytes());
                out.extend_from_slice(&n.preference.to_be_bytes());
                out.push(n.flags.len() as u8);
                out.extend_from_slice(&n.flags);
                out.push(n.services.len() as u8);
                out.extend_from_slice(&n.services);
                out.push(n.regexp.len() as u8);
                out.extend_from_slice(&n.regexp);
                n.replacement.write_uncompressed(out);
            }
            RData::Caa(caa) => {
                out.push(caa.flag);
                out.push(caa.tag.len() as u8);
                out.extend_from_slice(&caa.tag);
                out.extend_from_slice(&caa.value);
            }
            RData::Sshfp(s) => {
                out.push(s.algorithm);
                out.push(s.fp_type);
                out.extend_from_slice(&s.fingerprint);
            }
            RData::Tlsa(t) => {
                out.push(t.usage);
                out.push(t.selector);
                out.push(t.matching_type);
                out.extend_from_slice(&t.cert_data);
            }
            RData::Ds(ds) => {
                out.extend_from_slice(&ds.key_tag.to_be_bytes());
                out.push(ds.algorithm);
                out.push(ds.digest_type);
                out.extend_from_slice(&ds.digest);
            }
            RData::Dnskey(k) => {
                out.extend_from_slice(&k.flags.to_be_bytes());
                out.push(k.protocol);
                out.push(k.algorithm);
                out.extend_from_slice(&k.public_key);
            }
            RData::Rrsig(r) => {
                out.extend_from_slice(&r.type_covered.to_u16().to_be_bytes());
                out.push(r.algorithm);
                out.push(r.labels);
                out.extend_from_slice(&r.original_ttl.to_be_bytes());
                out.extend_from_slice(&r.expiration.to_be_bytes());
                out.extend_from_slice(&r.inception.to_be_bytes());
                out.extend_from_slice(&r.key_tag.to_be_bytes());
                r.signer_name.write_uncompressed(out);
                out.extend_from_slice(&r.signature);
            }
            RData::Nsec(n) => {
                n.next_owner.write_uncompressed(out);
                out.extend_from_slice(&n.type_bitmap);
            }
            RData::Nsec3(n) => {
                out.push(n.hash_algorithm);
                out.push(n.flags);
                out.extend_from_slice(&n.iterations.to_be_bytes());
                out.push(n.salt.len() as u8);
                out.extend_from_slice(&n.salt);
                out.push(n.next_hashed_owner.len() as u8);
                out.extend_from_slice(&n.next_hashed_owner);
                out.extend_from_slice(&n.type_bitmap);
            }
            RData::Nsec3Param(n) => {
                out.push(n.hash_algorithm);
                out.push(n.flags);
                out.extend_from_slice(&n.iterations.to_be_bytes());
                out.push(n.salt.len() as u8);
                out.extend_from_slice(&n.salt);
            }
            RData::Svcb(s) | RData::Https(s) => {
                out.extend_from_slice(&s.priority.to_be_bytes());
                s.target.write_uncompressed(out);
                for p in &s.params {
                    out.extend_from_slice(&p.key.to_be_bytes());
                    out.extend_from_slice(&(p.value.len() as u16).to_be_bytes());
                    out.extend_from_slice(&p.value);
                }
            }
            RData::Unknown(_, bytes) => out.extend_from_slice(bytes),
        }
    }
}

fn read_char_string(msg: &[u8], pos: &mut usize, end: usize) -> Result<Vec<u8>> {
    if *pos >= end {
        return Err(NsdError::Parse {
            offset: *pos,
            reason: "truncated character-string".into(),
        });
    }
    let len = msg[*pos] as usize;
    if *pos + 1 + len > end {
        return Err(NsdError::Parse {
            offset: *pos,
            reason: "truncated character-string".into(),
        });
    }
    let s = msg[*pos + 1..*pos + 1 + len].to_vec();
    *pos += 1 + len;
    Ok(s)
}

fn be_u16(msg: &[u8], pos: usize) -> u16 {
    u16::from_be_bytes([msg[pos], msg[pos + 1]])
}

fn be_u32(msg: &[u8], pos: usize) -> u32 {
    u32::from_be_bytes([msg[pos], msg[pos + 1], msg[pos + 2], msg[pos + 3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_record_roundtrip() {
        let rdata = RData::A(Ipv4Addr::new(192, 0, 2, 1));
        let mut out = Vec::new();
        let mut comp = CompressionTable::new();
        rdata.encode(&mut out, &mut comp);
        let decoded = RData::decode(RrType::A, &out, 0, out.len()).unwrap();
        assert_eq!(decoded, rdata);
    }

    #[test]
    fn soa_roundtrip_with_compression_context() {
        let soa = Soa {
            mname: Name::make("ns1.example.com").unwrap(),
            rname: Name::make("hostmaster.example.com").unwrap(),
            serial: 2024010100,
            refresh: 3600,
            retry: 900,
            expire: 1209600,
            minimum: 3600,
        };
        let mut out = Vec::new();
        let mut comp = CompressionTable::new();
        RData::Soa(soa.clone()).encode(&mut out, &mut comp);
        let decoded = RData::decode(RrType::Soa, &out, 0, out.len()).unwrap();
        assert_eq!(decoded, RData::Soa(soa));
    }

    #[test]
    fn txt_handles_multiple_character_strings() {
        let rdata = RData::Txt(vec![b"hello".to_vec(), b"world".to_vec()]);
        let mut out = Vec::new();
        let mut comp = CompressionTable::new();
        rdata.encode(&mut out, &mut comp);
        let decoded = RData::decode(RrType::Txt, &out, 0, out.len()).unwrap();
        assert_eq!(decoded, rdata);
    }

    #[test]
    fn unknown_type_round_trips_opaquely() {
        let rdata = RData::Unknown(RrType::Unknown(65280), vec![1, 2, 3, 4]);
        let mut out = Vec::new();
        let mut comp = CompressionTable::new();
        rdata.encode(&mut out, &mut comp);
        let decoded = RData::decode(RrType::Unknown(65280), &out, 0, out.len()).unwrap();
        assert_eq!(decoded, rdata);
    }
}
