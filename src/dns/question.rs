//! The question section (RFC 1035 §4.1.2): one entry in ordinary queries,
//! though the wire format allows `qdcount` to be any value.

use crate::error::{NsdError, Result};
use crate::name::{CompressionTable, Name};
use crate::rr::{DnsClass, RrType};

#[derive(Debug, Clone)]
pub struct Question {
    pub qname: Name,
    pub qtype: RrType,
    pub qclass: DnsClass,
}

impl Question {
    /// Decode a question entry starting at `pos`. Returns the question and
    /// the offset immediately following it.
    pub fn decode(msg: &[u8], pos: usize) -> Result<(Question, usize)> {
        let (qname, mut pos) = Name::from_wire_compressed(msg, pos)?;
        if pos + 4 > msg.len() {
            return Err(NsdError::Parse {
                offset: pos,
                reason: "truncated question".into(),
            });
        }
        let qtype = RrType::from_u16(u16::from_be_bytes([msg[pos], msg[pos + 1]]));
        let qclass = DnsClass::from_u16(u16::from_be_bytes([msg[pos + 2], msg[pos + 3]]));
        pos += 4;
        Ok((Question { qname, qtype, qclass }, pos))
    }

    pub fn encode(&self, out: &mut Vec<u8>, comp: &mut CompressionTable) {
        self.qname.write_compressed(out, comp);
        out.extend_from_slice(&self.qtype.to_u16().to_be_bytes());
        out.extend_from_slice(&self.qclass.to_u16().to_be_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn question_roundtrips() {
        let q = Question {
            qname: Name::make("www.example.com").unwrap(),
            qtype: RrType::A,
            qclass: DnsClass::In,
        };
        let mut out = Vec::new();
        let mut comp = CompressionTable::new();
        q.encode(&mut out, &mut comp);
        let (decoded, end) = Question::decode(&out, 0).unwrap();
        assert_eq!(end, out.len());
        assert_eq!(decoded.qname, q.qname);
        assert_eq!(decoded.qtype, RrType::A);
        assert_eq!(decoded.qclass, DnsClass::In);
    }
}
