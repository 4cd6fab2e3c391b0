//! Node variants for the adaptive radix tree (spec §4.B): NODE4, NODE16,
//! NODE32, NODE38 (host-name alphabet, direct-indexed), NODE48, NODE256.
//!
//! Grounded on heimdall's `dns/zero_copy.rs` preference for small inline
//! buffers (`smallvec`) over heap allocation on the hot path; the node
//! variants themselves have no heimdall analogue (heimdall has no radix
//! tree) and are built directly from spec §4.B's description of NSD's
//! `radtree.c`.

use smallvec::SmallVec;

/// Inline compressed-prefix capacity; longer common prefixes are recovered
/// from a representative leaf key on mismatch ("pessimistic" path, spec
/// §4.B).
pub const MAX_PREFIX: usize = 8;

/// Maps a byte to its NODE38 slot (letters, digits, hyphen, and the
/// 0-length label terminator), or `None` if the byte falls outside the
/// host-name alphabet and the node must use NODE48/NODE256 instead.
pub fn host_alphabet_index(b: u8) -> Option<u8> {
    match b {
        b'a'..=b'z' => Some(b - b'a'),
        b'A'..=b'Z' => Some(b - b'A'),
        b'0'..=b'9' => Some(26 + (b - b'0')),
        b'-' => Some(36),
        0 => Some(37),
        _ => None,
    }
}

pub fn is_host_alphabet(b: u8) -> bool {
    host_alphabet_index(b).is_some()
}

pub struct Node<V> {
    pub prefix: SmallVec<[u8; MAX_PREFIX]>,
    pub kind: NodeKind<V>,
}

pub enum NodeKind<V> {
    Leaf(Box<(Vec<u8>, V)>),
    Inner(ChildSet<V>),
}

impl<V> Node<V> {
    pub fn leaf(key: Vec<u8>, value: V) -> Self {
        Node {
            prefix: SmallVec::new(),
            kind: NodeKind::Leaf(Box::new((key, value))),
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf(_))
    }

    pub fn leaf_key(&self) -> Option<&[u8]> {
        match &self.kind {
            NodeKind::Leaf(b) => Some(&b.0),
            NodeKind::Inner(_) => None,
        }
    }
}

/// Fan-out storage for an inner node. Variants differ in representation,
/// not interface: NODE4/16/32/48 keep parallel (key byte, child) arrays
/// scanned linearly (the "scalar fallback" — this crate has no SIMD
/// acceleration path, unlike NSD's hand-written SSE2 routines, but the
/// scan order and results are bit-for-bit what a vectorised search would
/// return). NODE38/256 index directly by byte value.
pub enum ChildSet<V> {
    Small {
        cap: usize,
        keys: Vec<u8>,
        children: Vec<Box<Node<V>>>,
    },
    HostAlphabet {
        slots: Box<[Option<Box<Node<V>>>; 38]>,
        len: usize,
    },
    Dense {
        slots: Box<[Option<Box<Node<V>>>; 256]>,
        len: usize,
    },
}

impl<V> ChildSet<V> {
    pub fn new4() -> Self {
        ChildSet::Small {
            cap: 4,
            keys: Vec::with_capacity(4),
            children: Vec::with_capacity(4),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ChildSet::Small { keys, .. } => keys.len(),
            ChildSet::HostAlphabet { len, .. } => *len,
            ChildSet::Dense { len, .. } => *len,
        }
    }

    pub fn capacity(&self) -> usize {
        match self {
            ChildSet::Small { cap, .. } => *cap,
            ChildSet::HostAlphabet { .. } => 38,
            ChildSet::Dense { .. } => 256,
        }
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity()
    }

    pub fn get(&self, byte: u8) -> Option<&Node<V>> {
        match self {
            ChildSet::Small { keys, children, .. } => {
                keys.iter().position(|&k| k == byte).map(|i| children[i].as_ref())
            }
            ChildSet::HostAlphabet { slots, .. } => {
                host_alphabet_index(byte).and_then(|i| slots[i as usize].as_deref())
            }
            ChildSet::Dense { slots, .. } => slots[byte as usize].as_deref(),
        }
    }

    pub fn get_mut(&mut self, byte: u8) -> Option<&mut Box<Node<V>>> {
        match self {
            ChildSet::Small { keys, children, .. } => {
                keys.iter().position(|&k| k == byte).map(move |i| &mut children[i])
            }
            ChildSet::HostAlphabet { slots, .. } => {
                host_alphabet_index(byte).and_then(move |i| slots[i as usize].as_mut())
            }
            ChildSet::Dense { slots, .. } => slots[byte as usize].as_mut(),
        }
    }

    /// Insert assuming capacity is available (caller promotes first).
    pub fn insert(&mut self, byte: u8, child: Box<Node<V>>) {
        match self {
            ChildSet::Small { keys, children, .. } => {
                if let Some(i) = keys.iter().position(|&k| k == byte) {
                    children[i] = child;
                } else {
                    keys.push(byte);
                    children.push(child);
                }
            }
            ChildSet::HostAlphabet { slots, len } => {
                let i = host_alphabet_index(byte).expect("caller must check alphabet fit") as usize;
                if slots[i].is_none() {
                    *len += 1;
                }
                slots[i] = Some(child);
            }
            ChildSet::Dense { slots, len } => {
                let i = byte as usize;
                if slots[i].is_none() {
                    *len += 1;
                }
                slots[i] = Some(child);
            }
        }
    }

    pub fn remove(&mut self, byte: u8) -> Option<Box<Node<V>>> {
        match self {
            ChildSet::Small { keys, children, .. } => {
                let i = keys.iter().position(|&k| k == byte)?;
                keys.remove(i);
                Some(children.remove(i))
            }
            ChildSet::HostAlphabet { slots, len } => {
                let i = host_alphabet_index(byte)? as usize;
                let removed = slots[i].take();
                if removed.is_some() {
                    *len -= 1;
                }
                removed
            }
            ChildSet::Dense { slots, len } => {
                let removed = slots[byte as usize].take();
                if removed.is_some() {
                    *len -= 1;
                }
                removed
            }
        }
    }

    /// All (byte, &Node) pairs, ascending by byte value.
    pub fn iter_sorted(&self) -> Vec<(u8, &Node<V>)> {
        match self {
            ChildSet::Small { keys, children, .. } => {
                let mut v: Vec<(u8, &Node<V>)> = keys
                    .iter()
                    .copied()
                    .zip(children.iter().map(|c| c.as_ref()))
                    .collect();
                v.sort_by_key(|(k, _)| *k);
                v
            }
            ChildSet::HostAlphabet { slots, .. } => {
                let mut out: Vec<(u8, &Node<V>)> = slots
                    .iter()
                    .enumerate()
                    .filter_map(|(i, slot)| slot.as_deref().map(|n| (REV_HOST_ALPHABET[i], n)))
                    .collect();
                out.sort_by_key(|(k, _)| *k);
                out
            }
            ChildSet::Dense { slots, .. } => (0u16..=255)
                .filter_map(|b| slots[b as usize].as_deref().map(|n| (b as u8, n)))
                .collect(),
        }
    }

    pub fn smallest(&self) -> Option<(u8, &Node<V>)> {
        self.iter_sorted().into_iter().next()
    }

    pub fn largest(&self) -> Option<(u8, &Node<V>)> {
        self.iter_sorted().into_iter().last()
    }

    pub fn smallest_greater_than(&self, byte: u8) -> Option<(u8, &Node<V>)> {
        self.iter_sorted().into_iter().find(|(k, _)| *k > byte)
    }

    pub fn largest_less_than(&self, byte: u8) -> Option<(u8, &Node<V>)> {
        self.iter_sorted().into_iter().rev().find(|(k, _)| *k < byte)
    }
}

/// Choose the next-larger variant for a node about to overflow its
/// current capacity, given the full set of child bytes it will hold
/// (including the one being inserted). NODE38 is only reachable when
/// every byte is in the host-name alphabet (spec §4.B).
pub fn promote<V>(old: ChildSet<V>, incoming_byte: u8) -> ChildSet<V> {
    let all_host_alphabet =
        is_host_alphabet(incoming_byte) && old.iter_sorted().iter().all(|(b, _)| is_host_alphabet(*b));
    let next_cap = match old.capacity() {
        4 => 16,
        16 => 32,
        32 => {
            if all_host_alphabet {
                38
            } else {
                48
            }
        }
        38 => 48,
        48 => 256,
        _ => 256,
    };
    let mut new_set = match next_cap {
        16 => ChildSet::Small {
            cap: 16,
            keys: Vec::with_capacity(16),
            children: Vec::with_capacity(16),
        },
        32 => ChildSet::Small {
            cap: 32,
            keys: Vec::with_capacity(32),
            children: Vec::with_capacity(32),
        },
        38 => ChildSet::HostAlphabet {
            slots: Box::new(std::array::from_fn(|_| None)),
            len: 0,
        },
        48 => ChildSet::Small {
            cap: 48,
            keys: Vec::with_capacity(48),
            children: Vec::with_capacity(48),
        },
        _ => ChildSet::Dense {
            slots: Box::new(std::array::from_fn(|_| None)),
            len: 0,
        },
    };
    match old {
        ChildSet::Small { keys, children, .. } => {
            for (k, c) in keys.into_iter().zip(children.into_iter()) {
                new_set.insert(k, c);
            }
        }
        ChildSet::HostAlphabet { slots, .. } => {
            for (i, slot) in slots.into_iter().enumerate() {
                if let Some(c) = slot {
                    new_set.insert(REV_HOST_ALPHABET[i], c);
                }
            }
        }
        ChildSet::Dense { slots, .. } => {
            for (i, slot) in slots.into_iter().enumerate() {
                if let Some(c) = slot {
                    new_set.insert(i as u8, c);
                }
            }
        }
    }
    new_set
}

/// Demote a sparsely-populated inner node to a smaller variant. Called
/// after `remove` when `width < capacity/2` (spec §4.B). Returns `None`
/// if `set` is already at the smallest variant.
pub fn demote<V>(set: ChildSet<V>) -> ChildSet<V> {
    let target_cap = match set.capacity() {
        256 => 48,
        48 => 32,
        38 => 16,
        32 => 16,
        16 => 4,
        _ => return set,
    };
    let mut new_set = match target_cap {
        4 => ChildSet::new4(),
        16 => ChildSet::Small {
            cap: 16,
            keys: Vec::with_capacity(16),
            children: Vec::with_capacity(16),
        },
        32 => ChildSet::Small {
            cap: 32,
            keys: Vec::with_capacity(32),
            children: Vec::with_capacity(32),
        },
        _ => ChildSet::Small {
            cap: 48,
            keys: Vec::with_capacity(48),
            children: Vec::with_capacity(48),
        },
    };
    match set {
        ChildSet::Small { keys, children, .. } => {
            for (k, c) in keys.into_iter().zip(children.into_iter()) {
                new_set.insert(k, c);
            }
        }
        ChildSet::HostAlphabet { slots, .. } => {
            for (i, slot) in slots.into_iter().enumerate() {
                if let Some(c) = slot {
                    new_set.insert(REV_HOST_ALPHABET[i], c);
                }
            }
        }
        ChildSet::Dense { slots, .. } => {
            for (i, slot) in slots.into_iter().enumerate() {
                if let Some(c) = slot {
                    new_set.insert(i as u8, c);
                }
            }
        }
    }
    new_set
}

/// Inverse of [`host_alphabet_index`], indexed 0..38. `0'..'9'` maps past
/// the 26 letters; lowercase is used as the canonical byte since names are
/// folded case-insensitively before reaching the tree.
const REV_HOST_ALPHABET: [u8; 38] = {
    let mut table = [0u8; 38];
    let mut c = 0u8;
    while c < 26 {
        table[c as usize] = b'a' + c;
        c += 1;
    }
    let mut d = 0u8;
    while d < 10 {
        table[26 + d as usize] = b'0' + d;
        d += 1;
    }
    table[36] = b'-';
    table[37] = 0;
    table
};
