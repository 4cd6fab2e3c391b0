//! Chaosnet identification queries answered straight from configuration,
//! never from a zone (spec §4.E step 3: `version.bind.`/`id.server.`/
//! `hostname.bind.` CH TXT).

use crate::dns::Question;
use crate::name::Name;
use crate::rr::{DnsClass, RData, Rr, RrType};

/// Values substituted at build time in a real deployment; kept as
/// constants here since `query` has no handle on `ServerConfig` (spec
/// §4.O `server.identity`/`server.version` control what's reported here).
const VERSION_STRING: &str = "wyrdns";
const HOSTNAME_FALLBACK: &str = "unknown";

pub fn answer_special_name(question: &Question) -> Option<Rr> {
    if question.qclass != DnsClass::Ch || question.qtype != RrType::Txt {
        return None;
    }
    let name = question.qname.to_presentation();
    let text = match name.as_str() {
        "version.bind." | "version.server." => VERSION_STRING,
        "id.server." => HOSTNAME_FALLBACK,
        "hostname.bind." => HOSTNAME_FALLBACK,
        _ => return None,
    };
    Some(Rr::new(
        question.qname.clone(),
        DnsClass::Ch,
        0,
        RData::Txt(vec![text.as_bytes().to_vec()]),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answers_version_bind_from_chaosnet_class() {
        let q = Question {
            qname: Name::make("version.bind").unwrap(),
            qtype: RrType::Txt,
            qclass: DnsClass::Ch,
        };
        let rr = answer_special_name(&q).unwrap();
        assert_eq!(rr.rdata, RData::Txt(vec![VERSION_STRING.as_bytes().to_vec()]));
    }

    #[test]
    fn ignores_non_chaosnet_queries() {
        let q = Question {
            qname: Name::make("version.bind").unwrap(),
            qtype: RrType::Txt,
            qclass: DnsClass::In,
        };
        assert!(answer_special_name(&q).is_none());
    }
}
