//! Response-rate limiting (spec §4.F): classify a response, track a
//! per-bucket rate estimate, and decide whether to answer, slip (truncate),
//! or drop.
//!
//! Grounded on heimdall's `rate_limiter.rs` (`DnsRateLimiter`, a
//! `dashmap`-backed per-source bucket table with a periodic decay tick)
//! generalized from a single per-IP token count to the
//! `(source, class, name)` bucket key and half-life decay spec §4.F
//! describes.

use dashmap::DashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

/// Response classes, used as part of the bucket key so e.g. a flood of
/// distinct NXDOMAIN queries against one zone shares a bucket (spec
/// §4.F).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseClass {
    NxDomain,
    Error,
    QtypeAny,
    Referral,
    Wildcard,
    NoData,
    Positive,
}

impl ResponseClass {
    /// Parse a `rrl-whitelist` entry (spec §6.4), the same names
    /// [`crate::server`]'s metrics labels use.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "nxdomain" => Some(ResponseClass::NxDomain),
            "error" => Some(ResponseClass::Error),
            "qtype_any" | "qtypeany" => Some(ResponseClass::QtypeAny),
            "referral" => Some(ResponseClass::Referral),
            "wildcard" => Some(ResponseClass::Wildcard),
            "nodata" => Some(ResponseClass::NoData),
            "positive" => Some(ResponseClass::Positive),
            _ => None,
        }
    }
}

/// The name component of the bucket key varies by class: zone apex for
/// nxdomain/nodata/error, delegation point for referrals, wildcard owner
/// for wildcards, qname otherwise (spec §4.F).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BucketKey {
    source: SourcePrefix,
    class: ResponseClass,
    name: Vec<u8>,
}

/// The client's /24 (IPv4) or /64 (IPv6) prefix, so one flooding host
/// (or a /24 of them behind NAT) shares a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum SourcePrefix {
    V4([u8; 3]),
    V6([u8; 8]),
}

impl SourcePrefix {
    fn of(addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(v4) => {
                let o = v4.octets();
                SourcePrefix::V4([o[0], o[1], o[2]])
            }
            IpAddr::V6(v6) => {
                let o = v6.octets();
                SourcePrefix::V6([o[0], o[1], o[2], o[3], o[4], o[5], o[6], o[7]])
            }
        }
    }
}

struct Bucket {
    rate: f64,
    counter: u64,
    last_tick: Instant,
    slip_counter: u32,
}

pub enum Verdict {
    Allow,
    Slip,
    Drop,
}

pub struct RateLimiter {
    buckets: DashMap<BucketKey, Bucket>,
    limit_per_sec: f64,
    slip_n: u32,
    tick_interval: Duration,
}

impl RateLimiter {
    /// `limit_per_sec`: the configured rate (spec §6.4 `rrl.ratelimit`).
    /// `slip_n`: at least every Nth blocked query gets a truncated reply
    /// instead of being silently dropped (spec §4.F, §6.4 `rrl.slip`),
    /// `0` disables slipping (every blocked query is dropped).
    pub fn new(limit_per_sec: u32, slip_n: u32) -> Self {
        RateLimiter {
            buckets: DashMap::new(),
            limit_per_sec: limit_per_sec as f64,
            slip_n,
            tick_interval: Duration::from_secs(1),
        }
    }

    pub fn classify(&self, source: IpAddr, class: ResponseClass, name: &[u8]) -> Verdict {
        if self.limit_per_sec <= 0.0 {
            return Verdict::Allow;
        }
        let key = BucketKey {
            source: SourcePrefix::of(source),
            class,
            name: name.to_vec(),
        };
        let mut entry = self.buckets.entry(key).or_insert_with(|| Bucket {
            rate: 0.0,
            counter: 0,
            last_tick: Instant::now(),
            slip_counter: 0,
        });

        let now = Instant::now();
        let elapsed_ticks = (now.duration_since(entry.last_tick).as_secs_f64()
            / self.tick_interval.as_secs_f64())
        .floor() as u32;
        if elapsed_ticks >= 1 {
            for _ in 0..elapsed_ticks.min(64) {
                entry.rate = entry.rate / 2.0 + entry.counter as f64;
                entry.counter = 0;
            }
            entry.last_tick = now;
        }
        entry.counter += 1;
        let instantaneous = entry.counter as f64 + entry.rate / 2.0;

        if instantaneous < self.limit_per_sec {
            return Verdict::Allow;
        }
        if self.slip_n == 0 {
            return Verdict::Drop;
        }
        entry.slip_counter += 1;
        if entry.slip_counter >= self.slip_n {
            entry.slip_counter = 0;
            Verdict::Slip
        } else {
            Verdict::Drop
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn allows_traffic_under_the_limit() {
        let rl = RateLimiter::new(100, 2);
        let addr = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1));
        for _ in 0..10 {
            assert!(matches!(
                rl.classify(addr, ResponseClass::Positive, b"example.com"),
                Verdict::Allow
            ));
        }
    }

    #[test]
    fn slips_every_nth_blocked_query() {
        let rl = RateLimiter::new(1, 3);
        let addr = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1));
        let mut slips = 0;
        let mut drops = 0;
        for _ in 0..20 {
            match rl.classify(addr, ResponseClass::NxDomain, b"example.com") {
                Verdict::Allow => {}
                Verdict::Slip => slips += 1,
                Verdict::Drop => drops += 1,
            }
        }
        assert!(slips > 0);
        assert!(drops > 0);
    }

    #[test]
    fn response_class_parses_whitelist_names() {
        assert_eq!(ResponseClass::parse("nxdomain"), Some(ResponseClass::NxDomain));
        assert_eq!(ResponseClass::parse("Wildcard"), Some(ResponseClass::Wildcard));
        assert_eq!(ResponseClass::parse("bogus"), None);
    }

    #[test]
    fn disabled_limit_always_allows() {
        let rl = RateLimiter::new(0, 2);
        let addr = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1));
        for _ in 0..1000 {
            assert!(matches!(
                rl.classify(addr, ResponseClass::NxDomain, b"example.com"),
                Verdict::Allow
            ));
        }
    }
}
