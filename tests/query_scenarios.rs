//! End-to-end query scenarios (spec §8 "Concrete scenarios" 1-3): build
//! a zone, encode a wire query, run it through [`wyrdns::query::handle_query`],
//! and check the decoded response.
//!
//! Grounded on heimdall's integration-style tests under `tests/`
//! (build real input, call the public entry point, assert on decoded
//! output) rather than reaching into private resolution internals.

use std::net::Ipv4Addr;
use wyrdns::dns::edns::Edns;
use wyrdns::dns::header::{Header, Opcode, Rcode};
use wyrdns::dns::message::Message;
use wyrdns::dns::question::Question;
use wyrdns::name::Name;
use wyrdns::query::{handle_query, Transport};
use wyrdns::rr::rdata::{Nsec, Soa};
use wyrdns::rr::{DnsClass, RData, RrType};
use wyrdns::store::ZoneTable;

fn example_zone() -> ZoneTable {
    let mut zones = ZoneTable::new();
    let apex = Name::make("example.com").unwrap();
    zones.add_zone(apex.clone(), DnsClass::In);
    let zone = zones.find_zone_mut(&apex).unwrap();
    zone.add_rr(
        &apex,
        DnsClass::In,
        3600,
        RData::Soa(Soa {
            mname: Name::make("ns1.example.com").unwrap(),
            rname: Name::make("hostmaster.example.com").unwrap(),
            serial: 1,
            refresh: 3600,
            retry: 900,
            expire: 1_209_600,
            minimum: 3600,
        }),
    )
    .unwrap();
    zone.add_rr(
        &Name::make("www.example.com").unwrap(),
        DnsClass::In,
        300,
        RData::A(Ipv4Addr::new(192, 0, 2, 1)),
    )
    .unwrap();
    zone.add_rr(
        &Name::make("sub.example.com").unwrap(),
        DnsClass::In,
        3600,
        RData::Ns(Name::make("ns1.sub.example.com").unwrap()),
    )
    .unwrap();
    zone.add_rr(
        &Name::make("ns1.sub.example.com").unwrap(),
        DnsClass::In,
        3600,
        RData::A(Ipv4Addr::new(192, 0, 2, 2)),
    )
    .unwrap();
    zones
}

fn query_for(qname: &str, qtype: RrType) -> Vec<u8> {
    query_msg(qname, qtype, None)
}

fn query_for_dnssec(qname: &str, qtype: RrType) -> Vec<u8> {
    let mut edns = Edns::new(4096);
    edns.do_bit = true;
    query_msg(qname, qtype, Some(edns))
}

fn query_msg(qname: &str, qtype: RrType, edns: Option<Edns>) -> Vec<u8> {
    let msg = Message {
        header: Header {
            id: 0x1234,
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
            qname: Name::make(qname).unwrap(),
            qtype,
            qclass: DnsClass::In,
        }],
        answers: vec![],
        authority: vec![],
        additional: vec![],
        edns,
        tsig: None,
    };
    msg.encode()
}

#[test]
fn basic_positive_answer() {
    let zones = example_zone();
    let query = query_for("www.example.com", RrType::A);
    let response = Message::decode(&handle_query(&query, &zones, Transport::Udp)).unwrap();

    assert_eq!(response.header.rcode, Rcode::NoError);
    assert!(response.header.aa);
    assert_eq!(response.answers.len(), 1);
    assert_eq!(response.answers[0].rdata, RData::A(Ipv4Addr::new(192, 0, 2, 1)));
}

#[test]
fn nxdomain_carries_soa_in_authority() {
    let zones = example_zone();
    let query = query_for("absent.example.com", RrType::A);
    let response = Message::decode(&handle_query(&query, &zones, Transport::Udp)).unwrap();

    assert_eq!(response.header.rcode, Rcode::NxDomain);
    assert!(response.header.aa);
    assert!(response.authority.iter().any(|rr| rr.rdata.rtype() == RrType::Soa));
}

#[test]
fn delegation_returns_referral_with_glue() {
    let zones = example_zone();
    let query = query_for("x.sub.example.com", RrType::A);
    let response = Message::decode(&handle_query(&query, &zones, Transport::Udp)).unwrap();

    assert!(!response.header.aa);
    assert!(response.authority.iter().any(|rr| rr.rdata.rtype() == RrType::Ns));
    assert!(response
        .additional
        .iter()
        .any(|rr| rr.rdata == RData::A(Ipv4Addr::new(192, 0, 2, 2))));
}

#[test]
fn dname_synthesises_cname_to_queried_name() {
    let mut zones = example_zone();
    let apex = Name::make("example.com").unwrap();
    let zone = zones.find_zone_mut(&apex).unwrap();
    zone.add_rr(
        &Name::make("alias.example.com").unwrap(),
        DnsClass::In,
        3600,
        RData::Dname(Name::make("www.example.com").unwrap()),
    )
    .unwrap();
    // The DNAME's target, spliced with the queried name's relative
    // prefix, must itself resolve for the chase to produce an answer.
    zone.add_rr(
        &Name::make("sub.www.example.com").unwrap(),
        DnsClass::In,
        300,
        RData::A(Ipv4Addr::new(192, 0, 2, 9)),
    )
    .unwrap();

    let query = query_for("sub.alias.example.com", RrType::A);
    let response = Message::decode(&handle_query(&query, &zones, Transport::Udp)).unwrap();

    assert_eq!(response.header.rcode, Rcode::NoError);
    assert!(response.answers.iter().any(|rr| rr.rdata.rtype() == RrType::Dname));
    let synthesized = response
        .answers
        .iter()
        .find(|rr| rr.rdata.rtype() == RrType::Cname)
        .expect("DNAME ancestor should synthesize a CNAME at the queried name");
    assert_eq!(synthesized.owner, Name::make("sub.alias.example.com").unwrap());
    assert_eq!(synthesized.rdata, RData::Cname(Name::make("sub.www.example.com").unwrap()));
    assert!(response
        .answers
        .iter()
        .any(|rr| rr.rdata == RData::A(Ipv4Addr::new(192, 0, 2, 9))));
}

#[test]
fn dnssec_ok_nxdomain_carries_covering_nsec() {
    let mut zones = example_zone();
    let apex = Name::make("example.com").unwrap();
    let zone = zones.find_zone_mut(&apex).unwrap();
    zone.add_rr(
        &Name::make("www.example.com").unwrap(),
        DnsClass::In,
        3600,
        RData::Nsec(Nsec {
            next_owner: Name::make("example.com").unwrap(),
            type_bitmap: vec![],
        }),
    )
    .unwrap();

    let query = query_for_dnssec("zzz.example.com", RrType::A);
    let response = Message::decode(&handle_query(&query, &zones, Transport::Udp)).unwrap();

    assert_eq!(response.header.rcode, Rcode::NxDomain);
    assert!(response.authority.iter().any(|rr| rr.rdata.rtype() == RrType::Nsec));
}

#[test]
fn tcp_responses_are_never_truncated_to_udp_payload_size() {
    let mut zones = ZoneTable::new();
    let apex = Name::make("example.com").unwrap();
    zones.add_zone(apex.clone(), DnsClass::In);
    let zone = zones.find_zone_mut(&apex).unwrap();
    zone.add_rr(
        &apex,
        DnsClass::In,
        3600,
        RData::Soa(Soa {
            mname: Name::make("ns1.example.com").unwrap(),
            rname: Name::make("hostmaster.example.com").unwrap(),
            serial: 1,
            refresh: 3600,
            retry: 900,
            expire: 1_209_600,
            minimum: 3600,
        }),
    )
    .unwrap();
    // Enough TXT records at one name that a UDP reply would need to
    // truncate at the default 512-byte cap.
    for i in 0..40u8 {
        zone.add_rr(
            &Name::make("big.example.com").unwrap(),
            DnsClass::In,
            300,
            RData::Txt(vec![vec![b'a' + (i % 26); 200]]),
        )
        .unwrap();
    }

    let query = query_for("big.example.com", RrType::Txt);
    let tcp_response = Message::decode(&handle_query(&query, &zones, Transport::Tcp)).unwrap();
    assert!(!tcp_response.header.tc);
    assert_eq!(tcp_response.answers.len(), 40);

    let udp_response = Message::decode(&handle_query(&query, &zones, Transport::Udp)).unwrap();
    assert!(udp_response.header.tc || udp_response.answers.len() < 40);
}
