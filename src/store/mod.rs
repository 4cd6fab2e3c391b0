//! RR store: zones, domain nodes, and the per-zone name index built atop
//! [`crate::nametree`] (spec §4.C).
//!
//! Grounded on heimdall's layering in `dns/resolver.rs` (a lookup table
//! keyed by name sitting above the raw record types) but replacing
//! upstream-cache semantics with authoritative zone ownership: every name
//! belongs to exactly one [`Zone`], found by longest-suffix match over
//! configured apex names.

use crate::error::{NsdError, Result};
use crate::name::Name;
use crate::nametree::RadixTree;
use crate::rr::{DnsClass, RrSet, RrType};
use std::collections::HashMap;

/// Precomputed answer hints carried by every domain node (spec §4.C:
/// "wildcard existence under this node, NSEC3 hash, and whether the node
/// is a delegation point").
#[derive(Debug, Clone, Default)]
pub struct DomainHints {
    pub wildcard_child: bool,
    pub nsec3_hash: Option<Vec<u8>>,
    pub is_delegation_point: bool,
    pub is_apex: bool,
}

/// All RRsets owned by one domain name within a zone.
#[derive(Debug, Clone)]
pub struct Domain {
    pub name: Name,
    pub rrsets: HashMap<RrType, RrSet>,
    pub hints: DomainHints,
}

impl Domain {
    fn new(name: Name) -> Self {
        Domain {
            name,
            rrsets: HashMap::new(),
            hints: DomainHints::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rrsets.values().all(RrSet::is_empty)
    }

    pub fn has_cname(&self) -> bool {
        self.rrsets.contains_key(&RrType::Cname)
    }
}

/// One authoritative zone: its apex name, SOA serial (cached for fast
/// comparison during xfrd probes), and the domain table beneath it.
pub struct Zone {
    pub apex: Name,
    pub class: DnsClass,
    tree: RadixTree<Domain>,
}

impl Zone {
    pub fn new(apex: Name, class: DnsClass) -> Self {
        Zone {
            apex,
            class,
            tree: RadixTree::new(),
        }
    }

    pub fn serial(&self) -> Option<u32> {
        let apex_domain = self.tree.search(&self.apex.tree_key())?;
        match apex_domain.rrsets.get(&RrType::Soa)?.data.first()? {
            crate::rr::RData::Soa(soa) => Some(soa.serial),
            _ => None,
        }
    }

    pub fn find_domain(&self, name: &Name) -> Option<&Domain> {
        self.tree.search(&name.tree_key())
    }

    /// The domain immediately preceding `name` in canonical tree order,
    /// used to find the NSEC/NSEC3 record that covers a name with no
    /// domain node of its own (spec §4.E step 4 NXDOMAIN proof).
    pub fn find_covering(&self, name: &Name) -> Option<&Domain> {
        self.tree
            .search_closest(&name.tree_key(), crate::nametree::Direction::Lt)
            .map(|(_, domain)| domain)
    }

    pub fn find_or_create_domain(&mut self, name: &Name) -> &mut Domain {
        let key = name.tree_key();
        if self.tree.search(&key).is_none() {
            self.tree.insert(key.clone(), Domain::new(name.clone()));
        }
        self.tree.search_mut(&key).expect("just inserted")
    }

    /// Ordered traversal producing the SOA first, then every other RR in
    /// canonical order, stopping before crossing into a sub-zone (spec
    /// §4.C `iterate_zone`).
    pub fn iterate(&self) -> Vec<crate::rr::Rr> {
        let mut out = Vec::new();
        if let Some(apex_domain) = self.find_domain(&self.apex) {
            if let Some(soa) = apex_domain.rrsets.get(&RrType::Soa) {
                out.extend(soa.iter_rrs());
            }
        }
        let mut cursor = self.tree.first();
        while let Some((path, domain)) = cursor {
            let crosses_cut = !domain.name.eq_ci(&self.apex)
                && domain.hints.is_delegation_point
                && domain.name.is_subdomain_of(&self.apex);
            if !(domain.name.eq_ci(&self.apex)) {
                let mut types: Vec<&RrType> = domain.rrsets.keys().collect();
                types.sort_by_key(|t| t.to_u16());
                for t in types {
                    // Below a delegation point, only NS and glue (A/AAAA)
                    // belong to the parent zone's iteration; everything
                    // else is the child zone's content.
                    if crosses_cut && !matches!(t, RrType::Ns | RrType::A | RrType::Aaaa) {
                        continue;
                    }
                    out.extend(domain.rrsets[t].iter_rrs());
                }
            }
            cursor = self.tree.next(&path);
        }
        out
    }

    pub fn add_rr(&mut self, owner: &Name, class: DnsClass, ttl: u32, rdata: crate::rr::RData) -> Result<()> {
        if class != self.class {
            return Err(NsdError::ClassMismatch(owner.to_presentation()));
        }
        let rtype = rdata.rtype();
        let domain = self.find_or_create_domain(owner);
        if rtype == RrType::Cname && !domain.rrsets.is_empty() && !domain.rrsets.contains_key(&RrType::Cname) {
            return Err(NsdError::CnameCoexistence(owner.to_presentation()));
        }
        if domain.has_cname() && rtype != RrType::Cname {
            return Err(NsdError::CnameCoexistence(owner.to_presentation()));
        }
        if rtype == RrType::Soa && owner.eq_ci(&self.apex) {
            if domain.rrsets.contains_key(&RrType::Soa) && !domain.rrsets[&RrType::Soa].is_empty() {
                return Err(NsdError::DuplicateSoa(self.apex.to_presentation()));
            }
            domain.hints.is_apex = true;
        }
        if rtype == RrType::Ns && !owner.eq_ci(&self.apex) {
            domain.hints.is_delegation_point = true;
        }
        let set = domain
            .rrsets
            .entry(rtype)
            .or_insert_with(|| RrSet::new(owner.clone(), class, rtype, ttl));
        set.push(ttl, rdata)?;
        if owner.label(0) == Some(b"*") {
            if let Some(parent) = strip_one_label(owner) {
                if let Some(parent_domain) = self.tree.search_mut(&parent.tree_key()) {
                    parent_domain.hints.wildcard_child = true;
                }
            }
        }
        Ok(())
    }

    pub fn delete_rr(&mut self, owner: &Name, rdata: &crate::rr::RData) -> Result<bool> {
        let key = owner.tree_key();
        let Some(domain) = self.tree.search_mut(&key) else {
            return Ok(false);
        };
        let rtype = rdata.rtype();
        let removed = domain
            .rrsets
            .get_mut(&rtype)
            .map(|set| set.remove(rdata))
            .unwrap_or(false);
        if removed {
            if domain.rrsets.get(&rtype).is_some_and(RrSet::is_empty) {
                domain.rrsets.remove(&rtype);
            }
            if domain.rrsets.is_empty() {
                self.tree.delete(&key);
            }
        }
        Ok(removed)
    }
}

/// Table of all configured zones, keyed by apex (spec §4.C). Backed by
/// the same radix tree as per-zone domain tables so `find_zone` is a
/// single closest-encloser search.
#[derive(Default)]
pub struct ZoneTable {
    tree: RadixTree<Zone>,
}

impl ZoneTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_zone(&mut self, apex: Name, class: DnsClass) {
        let key = apex.tree_key();
        self.tree.insert(key, Zone::new(apex, class));
    }

    pub fn remove_zone(&mut self, apex: &Name) -> Option<Zone> {
        self.tree.delete(&apex.tree_key())
    }

    /// Find the zone that most closely encloses `name` (spec §4.E step
    /// 3): the longest configured apex that is a suffix of `name`.
    pub fn find_zone(&self, name: &Name) -> Option<&Zone> {
        let mut candidate = name.clone();
        loop {
            if let Some(zone) = self.tree.search(&candidate.tree_key()) {
                return Some(zone);
            }
            if candidate.label_count() == 0 {
                return None;
            }
            candidate = strip_one_label(&candidate)?;
        }
    }

    pub fn find_zone_mut(&mut self, name: &Name) -> Option<&mut Zone> {
        let mut candidate = name.clone();
        loop {
            let key = candidate.tree_key();
            if self.tree.search(&key).is_some() {
                return self.tree.search_mut(&key);
            }
            if candidate.label_count() == 0 {
                return None;
            }
            candidate = strip_one_label(&candidate)?;
        }
    }

    pub fn zones(&self) -> Vec<&Zone> {
        let mut out = Vec::new();
        let mut cursor = self.tree.first();
        while let Some((path, zone)) = cursor {
            out.push(zone);
            cursor = self.tree.next(&path);
        }
        out
    }
}

pub(crate) fn strip_one_label(name: &Name) -> Option<Name> {
    if name.label_count() == 0 {
        return None;
    }
    let parent_labels = name.label_count() - 1;
    // Reconstruct by walking labels 1.. (drop leftmost), via presentation
    // round-trip — zone apexes are shallow so this isn't a hot path.
    let mut parts = Vec::new();
    for i in 1..=parent_labels {
        parts.push(String::from_utf8_lossy(name.label(i).unwrap_or(&[])).into_owned());
    }
    if parts.is_empty() {
        return Some(Name::root());
    }
    Name::make(&parts.join(".")).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rr::RData;
    use std::net::Ipv4Addr;

    fn soa_rdata() -> RData {
        RData::Soa(crate::rr::rdata::Soa {
            mname: Name::make("ns1.example.com").unwrap(),
            rname: Name::make("hostmaster.example.com").unwrap(),
            serial: 1,
            refresh: 3600,
            retry: 900,
            expire: 1209600,
            minimum: 3600,
        })
    }

    #[test]
    fn add_rr_builds_domain_and_rrset() {
        let apex = Name::make("example.com").unwrap();
        let mut zone = Zone::new(apex.clone(), DnsClass::In);
        zone.add_rr(&apex, DnsClass::In, 3600, soa_rdata()).unwrap();
        let www = Name::make("www.example.com").unwrap();
        zone.add_rr(&www, DnsClass::In, 300, RData::A(Ipv4Addr::new(192, 0, 2, 1)))
            .unwrap();
        assert_eq!(zone.serial(), Some(1));
        let domain = zone.find_domain(&www).unwrap();
        assert!(domain.rrsets.contains_key(&RrType::A));
    }

    #[test]
    fn add_rr_rejects_cname_coexistence() {
        let apex = Name::make("example.com").unwrap();
        let mut zone = Zone::new(apex.clone(), DnsClass::In);
        let www = Name::make("www.example.com").unwrap();
        zone.add_rr(&www, DnsClass::In, 300, RData::A(Ipv4Addr::new(192, 0, 2, 1)))
            .unwrap();
        let err = zone.add_rr(
            &www,
            DnsClass::In,
            300,
            RData::Cname(Name::make("target.example.com").unwrap()),
        );
        assert!(err.is_err());
    }

    #[test]
    fn zone_table_finds_closest_enclosing_zone() {
        let mut table = ZoneTable::new();
        table.add_zone(Name::make("example.com").unwrap(), DnsClass::In);
        let found = table.find_zone(&Name::make("www.example.com").unwrap());
        assert!(found.is_some());
        assert!(table.find_zone(&Name::make("example.org").unwrap()).is_none());
    }

    #[test]
    fn delete_rr_drops_empty_domain() {
        let apex = Name::make("example.com").unwrap();
        let mut zone = Zone::new(apex.clone(), DnsClass::In);
        let www = Name::make("www.example.com").unwrap();
        let rdata = RData::A(Ipv4Addr::new(192, 0, 2, 1));
        zone.add_rr(&www, DnsClass::In, 300, rdata.clone()).unwrap();
        assert!(zone.delete_rr(&www, &rdata).unwrap());
        assert!(zone.find_domain(&www).is_none());
    }
}
