//! A single DNS label: a length byte (0-63) followed by that many octets.

use super::MAX_LABEL_LEN;

/// A borrowed view of one label's content (without its length prefix).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label<'a>(&'a [u8]);

impl<'a> Label<'a> {
    pub fn new(bytes: &'a [u8]) -> Option<Self> {
        if bytes.len() > MAX_LABEL_LEN {
            None
        } else {
            Some(Label(bytes))
        }
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `true` if every byte is drawn from the "host name" alphabet
    /// (letters, digits, hyphen) used to pick the NODE38 variant in the
    /// nametree (spec §4.B).
    pub fn is_hostname_alphabet(&self) -> bool {
        self.0
            .iter()
            .all(|&b| b.is_ascii_alphanumeric() || b == b'-')
    }
}
