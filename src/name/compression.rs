//! Per-response name compression table (spec §4.A).
//!
//! Maps a name suffix to the first byte offset in the outgoing packet at
//! which that suffix was written, so later occurrences can be replaced by a
//! two-byte pointer. Reset at the start of every response.

use super::Name;
use rustc_hash::FxHashMap;

/// The wire format reserves the top two bits of the length byte to signal a
/// compression pointer; only offsets representable in the remaining 14
/// bits can be pointed at.
const MAX_POINTER_OFFSET: usize = (1 << 14) - 1;

#[derive(Default)]
pub struct CompressionTable {
    // Keyed by the lowercased wire-format suffix bytes, grounded on
    // `Name::tree_key`'s lowercasing but keeping label order as found on
    // the wire (suffix-of-name, not reversed) since this is addressed by
    // byte slice, not traversed.
    offsets: FxHashMap<Vec<u8>, u16>,
}

impl CompressionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the best (longest) previously-seen suffix of `name` and
    /// return `(suffix_label_index, offset)` — the labels before that
    /// index must be written literally, followed by a pointer to `offset`.
    pub fn find_suffix_match(&self, name: &Name) -> Option<(usize, u16)> {
        let n = name.label_count();
        for start in 0..=n {
            let key = Self::suffix_key(name, start);
            if let Some(&offset) = self.offsets.get(&key) {
                return Some((start, offset));
            }
        }
        None
    }

    /// Record that `name` (or one of its suffixes starting at label
    /// `start`) begins at `offset` in the packet currently being built.
    pub fn insert(&mut self, name: &Name, start: usize, offset: usize) {
        if offset > MAX_POINTER_OFFSET {
            return; // Pointers can't address beyond 2^14; don't record it.
        }
        for i in start..=name.label_count() {
            let key = Self::suffix_key(name, i);
            self.offsets.entry(key).or_insert(offset as u16 + suffix_byte_delta(name, start, i));
        }
    }

    fn suffix_key(name: &Name, start: usize) -> Vec<u8> {
        let n = name.label_count();
        let mut key = Vec::new();
        for i in start..n {
            let label = name.label(i).unwrap_or(&[]);
            key.push(label.len() as u8);
            key.extend(label.iter().map(|b| b.to_ascii_lowercase()));
        }
        key.push(0);
        key
    }
}

/// Byte distance from the start of the name as written (`start`) to the
/// point where suffix `i` begins, so a suffix recorded mid-name still maps
/// to its own correct offset.
fn suffix_byte_delta(name: &Name, start: usize, i: usize) -> u16 {
    let mut delta = 0u16;
    for j in start..i {
        delta += 1 + name.label(j).map(|l| l.len()).unwrap_or(0) as u16;
    }
    delta
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_exact_and_suffix_matches() {
        let mut table = CompressionTable::new();
        let apex = Name::make("example.com").unwrap();
        table.insert(&apex, 0, 12);

        let exact = Name::make("example.com").unwrap();
        assert_eq!(table.find_suffix_match(&exact), Some((0, 12)));

        let child = Name::make("www.example.com").unwrap();
        let (start, offset) = table.find_suffix_match(&child).unwrap();
        assert_eq!(start, 1);
        assert_eq!(offset, 12);
    }

    #[test]
    fn does_not_record_pointers_past_14_bits() {
        let mut table = CompressionTable::new();
        let apex = Name::make("example.com").unwrap();
        table.insert(&apex, 0, 1 << 14);
        assert_eq!(table.find_suffix_match(&apex), None);
    }
}
