//! Catalog zones, RFC 9432 (spec §4.J): consumer side derives member
//! zones from a catalog's content; producer side synthesises a catalog
//! from configured members.
//!
//! Grounded on heimdall's `dns/resolver.rs` diffing style (compare a
//! freshly decoded record set against the previously known one, emit
//! the delta) generalized from "is this answer still cached-fresh" to
//! "which member zones were added, removed, or repointed to a different
//! pattern since the catalog was last loaded".

use crate::error::{NsdError, Result};
use crate::name::Name;
use crate::rr::RData;
use crate::store::Zone;
use std::collections::BTreeMap;

const REQUIRED_VERSION: &str = "2";

/// One entry in a catalog's member list, keyed by its stable member-id
/// label under `zones.<catalog-apex>` (spec §3 "Catalog member").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub member_id: String,
    pub zone_name: Name,
    pub pattern: Option<String>,
}

#[derive(Debug, Clone)]
pub enum MemberChange {
    Add(Member),
    Delete(Member),
    /// Same member-id and zone, different pattern: implemented as
    /// delete-then-add (spec §4.J "Pattern changes are implemented as
    /// delete-then-add").
    Modify { old: Member, new: Member },
}

/// Read a catalog zone's content and produce its member list (spec §4.J
/// consumer steps 1-3).
pub fn parse_catalog(catalog_apex: &Name, zone: &Zone, default_pattern: Option<&str>) -> Result<Vec<Member>> {
    verify_version(catalog_apex, zone)?;

    let zones_apex = prepend(catalog_apex, "zones")?;
    let mut members = Vec::new();
    for rr in zone.iterate() {
        if rr.rdata.rtype() != crate::rr::RrType::Ptr {
            continue;
        }
        if !rr.owner.is_subdomain_of(&zones_apex) || rr.owner.eq_ci(&zones_apex) {
            continue;
        }
        // Depth check: PTR must live directly at `<id>.zones.<catz>`.
        if rr.owner.label_count() != zones_apex.label_count() + 1 {
            return Err(NsdError::InvalidCatalog(
                catalog_apex.to_presentation(),
                format!("PTR at unexpected depth: {}", rr.owner.to_presentation()),
            ));
        }
        let member_id = String::from_utf8_lossy(rr.owner.label(0).unwrap_or(&[])).into_owned();
        let zone_name = match &rr.rdata {
            RData::Ptr(n) => n.clone(),
            _ => unreachable!("filtered to Ptr above"),
        };
        if members.iter().any(|m: &Member| m.member_id == member_id) {
            return Err(NsdError::InvalidCatalog(
                catalog_apex.to_presentation(),
                format!("duplicate PTR for member id {member_id}"),
            ));
        }
        let pattern = read_group_pattern(catalog_apex, zone, &member_id)
            .or_else(|| default_pattern.map(str::to_string));
        members.push(Member {
            member_id,
            zone_name,
            pattern,
        });
    }
    members.sort_by(|a, b| a.member_id.cmp(&b.member_id));
    Ok(members)
}

fn verify_version(catalog_apex: &Name, zone: &Zone) -> Result<()> {
    let version_name = prepend(catalog_apex, "version")?;
    let domain = zone
        .find_domain(&version_name)
        .ok_or_else(|| NsdError::InvalidCatalog(catalog_apex.to_presentation(), "missing version TXT".into()))?;
    let txt = domain
        .rrsets
        .get(&crate::rr::RrType::Txt)
        .and_then(|set| set.data.first())
        .and_then(|rdata| match rdata {
            RData::Txt(chunks) => chunks.first().cloned(),
            _ => None,
        })
        .ok_or_else(|| NsdError::InvalidCatalog(catalog_apex.to_presentation(), "missing version TXT".into()))?;
    if String::from_utf8_lossy(&txt) != REQUIRED_VERSION {
        return Err(NsdError::InvalidCatalog(
            catalog_apex.to_presentation(),
            "unsupported catalog version".into(),
        ));
    }
    Ok(())
}

fn read_group_pattern(catalog_apex: &Name, zone: &Zone, member_id: &str) -> Option<String> {
    let group_name = Name::make(&format!("group.{member_id}.{}", catalog_apex.to_presentation())).ok()?;
    let domain = zone.find_domain(&group_name)?;
    let txt = domain.rrsets.get(&crate::rr::RrType::Txt)?.data.first()?;
    match txt {
        RData::Txt(chunks) => chunks.first().map(|c| String::from_utf8_lossy(c).into_owned()),
        _ => None,
    }
}

fn prepend(apex: &Name, label: &str) -> Result<Name> {
    Name::make(&format!("{label}.{}", apex.to_presentation()))
}

/// Diff a freshly parsed member list against the previously known one,
/// in sorted member-id order (spec §4.J consumer step 4).
pub fn diff_members(previous: &[Member], current: &[Member]) -> Vec<MemberChange> {
    let prev_map: BTreeMap<&str, &Member> = previous.iter().map(|m| (m.member_id.as_str(), m)).collect();
    let cur_map: BTreeMap<&str, &Member> = current.iter().map(|m| (m.member_id.as_str(), m)).collect();

    let mut changes = Vec::new();
    for (id, cur) in &cur_map {
        match prev_map.get(id) {
            None => changes.push(MemberChange::Add((*cur).clone())),
            Some(prev) => {
                if prev.zone_name != cur.zone_name || prev.pattern != cur.pattern {
                    changes.push(MemberChange::Modify {
                        old: (*prev).clone(),
                        new: (*cur).clone(),
                    });
                }
            }
        }
    }
    for (id, prev) in &prev_map {
        if !cur_map.contains_key(id) {
            changes.push(MemberChange::Delete((*prev).clone()));
        }
    }
    changes
}

/// Producer-side member record: a configured zone plus the random
/// member-id minted for it the first time it was published (spec §4.J
/// producer, §3 "Producer-side members additionally carry a random
/// 32-bit hex label to ensure id uniqueness").
#[derive(Debug, Clone)]
pub struct ProducerMember {
    pub member_id: String,
    pub zone_name: Name,
    pub pattern: String,
}

pub fn mint_member_id() -> String {
    format!("{:08x}", rand::random::<u32>())
}

/// Build the RRs a producer catalog zone must carry for its current
/// member list: the version TXT, one PTR per member at
/// `<id>.zones.<catz>`, and one `group.<id> TXT` per member naming its
/// pattern.
pub fn build_producer_rrs(catalog_apex: &Name, members: &[ProducerMember]) -> Result<Vec<(Name, RData)>> {
    let mut out = Vec::new();
    let version_name = prepend(catalog_apex, "version")?;
    out.push((version_name, RData::Txt(vec![REQUIRED_VERSION.as_bytes().to_vec()])));
    for member in members {
        let ptr_name = Name::make(&format!("{}.zones.{}", member.member_id, catalog_apex.to_presentation()))?;
        out.push((ptr_name, RData::Ptr(member.zone_name.clone())));
        let group_name = Name::make(&format!("group.{}.{}", member.member_id, catalog_apex.to_presentation()))?;
        out.push((group_name, RData::Txt(vec![member.pattern.as_bytes().to_vec()])));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(id: &str, zone: &str) -> Member {
        Member {
            member_id: id.to_string(),
            zone_name: Name::make(zone).unwrap(),
            pattern: Some("secondary".to_string()),
        }
    }

    #[test]
    fn diff_detects_add_delete_and_modify() {
        let previous = vec![member("aaa", "one.example.com"), member("bbb", "two.example.com")];
        let mut current = vec![member("aaa", "one.example.com"), member("ccc", "three.example.com")];
        current[0].pattern = Some("primary".to_string());

        let changes = diff_members(&previous, &current);
        assert!(changes.iter().any(|c| matches!(c, MemberChange::Add(m) if m.member_id == "ccc")));
        assert!(changes.iter().any(|c| matches!(c, MemberChange::Delete(m) if m.member_id == "bbb")));
        assert!(changes.iter().any(|c| matches!(c, MemberChange::Modify { old, .. } if old.member_id == "aaa")));
    }

    #[test]
    fn mint_member_id_is_eight_hex_digits() {
        let id = mint_member_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
