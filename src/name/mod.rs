//! Wire-format domain names: labels, the normalised [`Name`] representation,
//! canonical (DNSSEC) comparison, and the per-response compression table.
//!
//! Grounded on `heimdall`'s `dns/header.rs` bitstream style for wire I/O and
//! on `dns/common.rs`'s `PacketComponent` trait split between read and write.

pub mod compression;
mod label;

pub use compression::CompressionTable;
pub use label::Label;

use crate::error::{NsdError, Result};
use smallvec::SmallVec;
use std::fmt;

/// Maximum encoded length of a domain name on the wire, per RFC 1035 §3.1.
pub const MAX_NAME_LEN: usize = 255;
/// Maximum number of labels a name may have (each label is at least 2 bytes
/// on the wire, minus the root).
pub const MAX_LABEL_COUNT: usize = 127;
/// Maximum length of a single label.
pub const MAX_LABEL_LEN: usize = 63;

/// A normalised, immutable domain name.
///
/// Stores the wire-format bytes (length-prefixed labels, terminated by the
/// root label) plus precomputed label offsets so [`Name::label`] is O(1).
/// Two representations coexist elsewhere in the system (wire vs. normalised)
/// but `Name` always holds the decompressed, normalised form described in
/// spec §3 "Domain name".
#[derive(Clone, Eq)]
pub struct Name {
    /// Length-prefixed labels, terminated by a zero-length root label.
    wire: SmallVec<[u8; 32]>,
    /// Byte offset of each label's length octet within `wire`, in order,
    /// including the trailing root label.
    offsets: SmallVec<[u16; 16]>,
}

impl Name {
    /// The DNS root name.
    pub fn root() -> Self {
        Name {
            wire: SmallVec::from_slice(&[0u8]),
            offsets: SmallVec::from_slice(&[0u16]),
        }
    }

    /// Build a `Name` from already-decompressed wire bytes (label-length +
    /// octets, repeated, terminated by a zero length byte). Compression
    /// pointers must already be resolved by the caller (see
    /// [`crate::dns::wire::read_name`]); this constructor never follows
    /// pointers.
    pub fn from_wire(bytes: &[u8]) -> Result<Self> {
        let mut offsets = SmallVec::new();
        let mut pos = 0usize;
        let mut total_len = 0usize;
        loop {
            if pos >= bytes.len() {
                return Err(NsdError::InvalidName("truncated name".into()));
            }
            let len = bytes[pos] as usize;
            if len & 0xC0 != 0 {
                return Err(NsdError::InvalidName(
                    "compression pointer in normalised name".into(),
                ));
            }
            if len > MAX_LABEL_LEN {
                return Err(NsdError::InvalidName("label too long".into()));
            }
            offsets.push(pos as u16);
            total_len += 1 + len;
            pos += 1 + len;
            if len == 0 {
                break;
            }
            if offsets.len() > MAX_LABEL_COUNT {
                return Err(NsdError::InvalidName("too many labels".into()));
            }
        }
        if total_len > MAX_NAME_LEN {
            return Err(NsdError::InvalidName("name too long".into()));
        }
        Ok(Name {
            wire: SmallVec::from_slice(&bytes[..pos]),
            offsets,
        })
    }

    /// Parse a presentation-format name (`"www.example.com."` or
    /// `"www.example.com"`, relative names are rejected) into wire form.
    pub fn make(text: &str) -> Result<Self> {
        let text = text.trim_end_matches('.');
        let mut wire = SmallVec::new();
        let mut offsets = SmallVec::new();
        if text.is_empty() {
            return Ok(Name::root());
        }
        for label in text.split('.') {
            if label.is_empty() || label.len() > MAX_LABEL_LEN {
                return Err(NsdError::InvalidName(format!("bad label in {text:?}")));
            }
            offsets.push(wire.len() as u16);
            wire.push(label.len() as u8);
            wire.extend_from_slice(label.as_bytes());
            if offsets.len() > MAX_LABEL_COUNT {
                return Err(NsdError::InvalidName("too many labels".into()));
            }
        }
        offsets.push(wire.len() as u16);
        wire.push(0);
        if wire.len() > MAX_NAME_LEN {
            return Err(NsdError::InvalidName("name too long".into()));
        }
        Ok(Name { wire, offsets })
    }

    /// Number of labels, excluding the root label.
    pub fn label_count(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    /// The raw bytes of the `i`-th label (no length prefix), `0` being the
    /// leftmost (most specific) label.
    pub fn label(&self, i: usize) -> Option<&[u8]> {
        let off = *self.offsets.get(i)? as usize;
        let len = self.wire[off] as usize;
        Some(&self.wire[off + 1..off + 1 + len])
    }

    /// Full wire-format encoding (length-prefixed labels + root).
    pub fn as_wire(&self) -> &[u8] {
        &self.wire
    }

    pub fn wire_len(&self) -> usize {
        self.wire.len()
    }

    /// `true` if `self` is equal to or a subdomain of `other` (case
    /// insensitive on ASCII).
    pub fn is_subdomain_of(&self, other: &Name) -> bool {
        let self_labels = self.label_count();
        let other_labels = other.label_count();
        if other_labels > self_labels {
            return false;
        }
        let skip = self_labels - other_labels;
        (0..other_labels).all(|i| {
            let a = self.label(i + skip).unwrap_or(&[]);
            let b = other.label(i).unwrap_or(&[]);
            eq_ascii_ci(a, b)
        })
    }

    /// Return `self` with `suffix`'s labels stripped from the right, i.e.
    /// the labels that make `self` a subdomain of `suffix`. `None` if
    /// `self` is not a subdomain of `suffix`.
    pub fn strip_suffix(&self, suffix: &Name) -> Option<Name> {
        if !self.is_subdomain_of(suffix) {
            return None;
        }
        let keep = self.label_count() - suffix.label_count();
        if keep == 0 {
            return Some(Name::root());
        }
        let end = *self.offsets.get(keep).unwrap() as usize;
        Name::from_wire(&self.wire[..end]).ok().map(|mut n| {
            n.wire.push(0);
            n.offsets.push(n.wire.len() as u16 - 1);
            n
        })
    }

    /// Substitute the leftmost label of `self` with `*`, used for wildcard
    /// synthesis (spec §4.E step 4, "No exact match, wildcard applicable").
    pub fn wildcard_sibling(&self) -> Name {
        let mut wire = SmallVec::new();
        let mut offsets = SmallVec::new();
        offsets.push(0u16);
        wire.push(1u8);
        wire.push(b'*');
        for i in 1..self.offsets.len() {
            let off = self.offsets[i] as usize;
            offsets.push(wire.len() as u16);
            let len = self.wire[off] as usize;
            wire.extend_from_slice(&self.wire[off..off + 1 + len]);
        }
        Name { wire, offsets }
    }

    /// Prepend a single label (used to build `id.zones.<catalog-apex>`
    /// style names, spec §4.J).
    pub fn prepend_label(&self, label: &[u8]) -> Result<Name> {
        if label.len() > MAX_LABEL_LEN {
            return Err(NsdError::InvalidName("label too long".into()));
        }
        let mut wire = SmallVec::new();
        let mut offsets = SmallVec::new();
        offsets.push(0u16);
        wire.push(label.len() as u8);
        wire.extend_from_slice(label);
        let base = wire.len() as u16;
        for &off in &self.offsets {
            offsets.push(base + off);
        }
        wire.extend_from_slice(&self.wire);
        if wire.len() > MAX_NAME_LEN {
            return Err(NsdError::InvalidName("name too long".into()));
        }
        Ok(Name { wire, offsets })
    }

    /// Case-insensitive ASCII comparison, used for equality/lookup — NOT
    /// the canonical DNSSEC ordering (see [`Name::cmp_canonical`]).
    pub fn eq_ci(&self, other: &Name) -> bool {
        self.wire.len() == other.wire.len() && eq_ascii_ci(&self.wire, &other.wire)
    }

    /// Canonical (DNSSEC, RFC 4034 §6.1) ordering: label-reversed,
    /// lowercased, lexicographic comparison.
    pub fn cmp_canonical(&self, other: &Name) -> std::cmp::Ordering {
        let a_n = self.label_count();
        let b_n = other.label_count();
        let mut ai = a_n;
        let mut bi = b_n;
        loop {
            if ai == 0 && bi == 0 {
                return std::cmp::Ordering::Equal;
            }
            if ai == 0 {
                return std::cmp::Ordering::Less;
            }
            if bi == 0 {
                return std::cmp::Ordering::Greater;
            }
            ai -= 1;
            bi -= 1;
            let a = self.label(ai).unwrap_or(&[]);
            let b = other.label(bi).unwrap_or(&[]);
            match cmp_label_ci(a, b) {
                std::cmp::Ordering::Equal => continue,
                ord => return ord,
            }
        }
    }

    /// Sort key used by the nametree: reversed label order, lowercased,
    /// each label prefixed by its length so that prefix relationships
    /// (zone cuts) collapse to contiguous key ranges. This is the
    /// "permuted byte representation of the reversed-label name" from
    /// spec §4.B.
    pub fn tree_key(&self) -> Vec<u8> {
        let n = self.label_count();
        let mut key = Vec::with_capacity(self.wire.len());
        for i in (0..n).rev() {
            let label = self.label(i).unwrap_or(&[]);
            key.push(label.len() as u8);
            key.extend(label.iter().map(|b| b.to_ascii_lowercase()));
        }
        key.push(0);
        key
    }

    /// Decode a name starting at `pos` in `msg`, following at most one
    /// level of compression pointer chain (RFC 1035 §4.1.4). Returns the
    /// decoded name and the position immediately after the name's
    /// in-place encoding (i.e. *not* following a pointer counts towards
    /// the returned offset, but pointer targets do not).
    pub fn from_wire_compressed(msg: &[u8], pos: usize) -> Result<(Name, usize)> {
        let mut wire = SmallVec::<[u8; 32]>::new();
        let mut offsets = SmallVec::<[u16; 16]>::new();
        let mut cur = pos;
        let mut end_of_first_pass: Option<usize> = None;
        let mut jumps = 0;
        loop {
            if jumps > MAX_LABEL_COUNT {
                return Err(NsdError::InvalidName("compression pointer loop".into()));
            }
            if cur >= msg.len() {
                return Err(NsdError::InvalidName("truncated name".into()));
            }
            let len = msg[cur];
            if len & 0xC0 == 0xC0 {
                if cur + 1 >= msg.len() {
                    return Err(NsdError::InvalidName("truncated compression pointer".into()));
                }
                let ptr = (((len as usize) & 0x3F) << 8) | msg[cur + 1] as usize;
                if end_of_first_pass.is_none() {
                    end_of_first_pass = Some(cur + 2);
                }
                if ptr >= cur {
                    return Err(NsdError::InvalidName(
                        "compression pointer does not point backward".into(),
                    ));
                }
                cur = ptr;
                jumps += 1;
                continue;
            }
            if len & 0xC0 != 0 {
                return Err(NsdError::InvalidName("reserved label length bits set".into()));
            }
            let len = len as usize;
            if len > MAX_LABEL_LEN {
                return Err(NsdError::InvalidName("label too long".into()));
            }
            if cur + 1 + len > msg.len() {
                return Err(NsdError::InvalidName("truncated label".into()));
            }
            offsets.push(wire.len() as u16);
            wire.push(len as u8);
            wire.extend_from_slice(&msg[cur + 1..cur + 1 + len]);
            if len == 0 {
                if end_of_first_pass.is_none() {
                    end_of_first_pass = Some(cur + 1);
                }
                break;
            }
            cur += 1 + len;
            if offsets.len() > MAX_LABEL_COUNT {
                return Err(NsdError::InvalidName("too many labels".into()));
            }
        }
        if wire.len() > MAX_NAME_LEN {
            return Err(NsdError::InvalidName("name too long".into()));
        }
        Ok((Name { wire, offsets }, end_of_first_pass.unwrap()))
    }

    /// Write `self` to `out` (the message buffer under construction),
    /// compressing against any previously-written suffix recorded in
    /// `comp`, and record new suffixes of `self` at their written offsets.
    pub fn write_compressed(&self, out: &mut Vec<u8>, comp: &mut CompressionTable) {
        let base = out.len();
        match comp.find_suffix_match(self) {
            Some((start, ptr_offset)) if start < self.label_count() => {
                for i in 0..start {
                    let label = self.label(i).unwrap_or(&[]);
                    out.push(label.len() as u8);
                    out.extend_from_slice(label);
                }
                out.extend_from_slice(&(0xC000u16 | ptr_offset).to_be_bytes());
                comp.insert(self, 0, base);
            }
            Some((_, ptr_offset)) => {
                // start == label_count(): the whole name (root) matched.
                out.extend_from_slice(&(0xC000u16 | ptr_offset).to_be_bytes());
            }
            None => {
                out.extend_from_slice(self.as_wire());
                comp.insert(self, 0, base);
            }
        }
    }

    /// Write `self` uncompressed, as required for RRSIG/NSEC-style rdata
    /// that must retain literal wire names for signature stability.
    pub fn write_uncompressed(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.as_wire());
    }

    /// Presentation format (`"www.example.com."`), lowercase.
    pub fn to_presentation(&self) -> String {
        if self.label_count() == 0 {
            return ".".to_string();
        }
        let mut s = String::new();
        for i in 0..self.label_count() {
            let label = self.label(i).unwrap_or(&[]);
            for &b in label {
                match b {
                    b'.' | b'\\' => {
                        s.push('\\');
                        s.push(b as char);
                    }
                    0x21..=0x7e => s.push((b.to_ascii_lowercase()) as char),
                    _ => s.push_str(&format!("\\{:03}", b)),
                }
            }
            s.push('.');
        }
        s
    }
}

fn eq_ascii_ci(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_ascii_lowercase() == y.to_ascii_lowercase())
}

fn cmp_label_ci(a: &[u8], b: &[u8]) -> std::cmp::Ordering {
    a.iter()
        .map(|b| b.to_ascii_lowercase())
        .cmp(b.iter().map(|b| b.to_ascii_lowercase()))
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.eq_ci(other)
    }
}

impl std::hash::Hash for Name {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        for b in self.wire.iter() {
            b.to_ascii_lowercase().hash(state);
        }
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({})", self.to_presentation())
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_presentation())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn make_and_presentation_roundtrip() {
        let n = Name::make("www.Example.com.").unwrap();
        assert_eq!(n.to_presentation(), "www.example.com.");
        assert_eq!(n.label_count(), 3);
    }

    #[test]
    fn subdomain_check_is_case_insensitive() {
        let apex = Name::make("example.com").unwrap();
        let child = Name::make("WWW.example.COM").unwrap();
        assert!(child.is_subdomain_of(&apex));
        assert!(apex.is_subdomain_of(&apex));
        assert!(!Name::make("example.org").unwrap().is_subdomain_of(&apex));
    }

    #[test]
    fn canonical_ordering_matches_rfc4034_example() {
        // RFC 4034 Appendix B.1 canonical ordering sample (subset, minus
        // the escaped-octet labels which need presentation-format escape
        // decoding that this crate's loader, not Name::make, is responsible
        // for).
        let names = [
            "example.",
            "a.example.",
            "yljkjljk.a.example.",
            "Z.a.example.",
            "zABC.a.EXAMPLE.",
            "z.example.",
            "*.z.example.",
        ];
        let parsed: Vec<Name> = names.iter().map(|n| Name::make(n).unwrap()).collect();
        for w in parsed.windows(2) {
            assert_ne!(w[0].cmp_canonical(&w[1]), std::cmp::Ordering::Greater);
        }
    }

    #[test]
    fn wildcard_sibling_replaces_leftmost_label() {
        let n = Name::make("www.example.com").unwrap();
        let w = n.wildcard_sibling();
        assert_eq!(w.to_presentation(), "*.example.com.");
    }

    #[test]
    fn strip_suffix_returns_relative_part() {
        let n = Name::make("www.sub.example.com").unwrap();
        let apex = Name::make("example.com").unwrap();
        let rel = n.strip_suffix(&apex).unwrap();
        assert_eq!(rel.to_presentation(), "www.sub.");
    }

    #[test]
    fn from_wire_compressed_follows_pointer() {
        // "example.com" at offset 0, then "www" + pointer to offset 0.
        let mut msg = Vec::new();
        msg.extend_from_slice(&[7]);
        msg.extend_from_slice(b"example");
        msg.extend_from_slice(&[3]);
        msg.extend_from_slice(b"com");
        msg.push(0);
        let www_offset = msg.len();
        msg.push(3);
        msg.extend_from_slice(b"www");
        msg.extend_from_slice(&[0xC0, 0x00]);
        let (name, end) = Name::from_wire_compressed(&msg, www_offset).unwrap();
        assert_eq!(name.to_presentation(), "www.example.com.");
        assert_eq!(end, msg.len());
    }

    #[test]
    fn from_wire_compressed_rejects_forward_pointer() {
        let msg = [0xC0, 0x05, 0, 0, 0, 0];
        assert!(Name::from_wire_compressed(&msg, 0).is_err());
    }

    #[test]
    fn tree_key_reverses_labels() {
        let a = Name::make("www.example.com").unwrap();
        let b = Name::make("example.com").unwrap();
        // apex key must be a strict prefix of the child's key so the
        // nametree's subtree-contiguity invariant holds.
        assert!(a.tree_key().starts_with(&b.tree_key()[..b.tree_key().len() - 1]));
    }
}
