//! Typed configuration tree (spec §4.O / §6.4): `server:`/`key:`/
//! `pattern:`/`zone:` blocks, already parsed into structs. Parsing the
//! on-disk `server:`/`key:`/`pattern:`/`zone:` block grammar itself is out
//! of scope (spec §1); this crate owns the typed tree and its TOML
//! on-disk form.
//!
//! Grounded on heimdall's `config.rs` (one flat struct per concern, a
//! `Default` impl, doc comment per field) but restructured into the
//! `ServerConfig`/`KeyConfig`/`PatternConfig`/`ZoneConfig` shape spec
//! §4.O names, and switched from ad hoc field parsing to `serde` + the
//! `toml` crate for the on-disk representation.

use crate::error::{NsdError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub keys: Vec<KeyConfig>,
    #[serde(default)]
    pub patterns: Vec<PatternConfig>,
    #[serde(default)]
    pub zones: Vec<ZoneConfig>,
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Config> {
        toml::from_str(text).map_err(|e| NsdError::Config(e.to_string()))
    }

    /// Resolve a zone's effective options by merging in any named pattern
    /// (spec §4.O "patterns apply as named option bundles that a zone
    /// block can pull in by name"). The zone's own fields always win.
    pub fn effective_zone(&self, zone: &ZoneConfig) -> ZoneConfig {
        let Some(pattern_name) = &zone.pattern else {
            return zone.clone();
        };
        let Some(pattern) = self.patterns.iter().find(|p| &p.name == pattern_name) else {
            return zone.clone();
        };
        let mut merged = pattern.options.clone();
        merged.name = zone.name.clone();
        merged.pattern = zone.pattern.clone();
        if zone.zonefile.is_some() {
            merged.zonefile = zone.zonefile.clone();
        }
        if !zone.allow_notify.is_empty() {
            merged.allow_notify = zone.allow_notify.clone();
        }
        if !zone.request_xfr.is_empty() {
            merged.request_xfr = zone.request_xfr.clone();
        }
        if !zone.provide_xfr.is_empty() {
            merged.provide_xfr = zone.provide_xfr.clone();
        }
        merged
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_identity")]
    pub identity: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_bind_addrs")]
    pub listen: Vec<SocketAddr>,
    #[serde(default = "default_server_count")]
    pub server_count: usize,
    #[serde(default = "default_tcp_count")]
    pub tcp_count: usize,
    #[serde(default = "default_true")]
    pub tcp_reject_overflow: bool,
    #[serde(default = "default_tcp_timeout_secs")]
    pub tcp_timeout_secs: u64,
    #[serde(default = "default_udb_path")]
    pub database: PathBuf,
    #[serde(default)]
    pub zonesdir: PathBuf,
    #[serde(default = "default_verbosity")]
    pub verbosity: u8,
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    #[serde(default)]
    pub pidfile: Option<PathBuf>,
    #[serde(default)]
    pub control_socket: Option<PathBuf>,
    #[serde(default)]
    pub rrl: RrlConfig,
}

impl ServerConfig {
    pub fn tcp_timeout(&self) -> Duration {
        Duration::from_secs(self.tcp_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RrlConfig {
    #[serde(default = "default_rrl_ratelimit")]
    pub ratelimit: u32,
    #[serde(default = "default_rrl_slip")]
    pub slip: u32,
    #[serde(default)]
    pub whitelist: Vec<SocketAddr>,
}

impl Default for RrlConfig {
    fn default() -> Self {
        RrlConfig {
            ratelimit: default_rrl_ratelimit(),
            slip: default_rrl_slip(),
            whitelist: Vec::new(),
        }
    }
}

fn default_identity() -> String {
    "wyrdnsd".to_string()
}
fn default_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
fn default_bind_addrs() -> Vec<SocketAddr> {
    vec!["0.0.0.0:53".parse().unwrap(), "[::]:53".parse().unwrap()]
}
fn default_server_count() -> usize {
    4
}
fn default_tcp_count() -> usize {
    10
}
fn default_tcp_timeout_secs() -> u64 {
    120
}
fn default_udb_path() -> PathBuf {
    PathBuf::from("/var/db/wyrdns/wyrdns.db")
}
fn default_verbosity() -> u8 {
    1
}
fn default_rrl_ratelimit() -> u32 {
    200
}
fn default_rrl_slip() -> u32 {
    2
}
fn default_true() -> bool {
    true
}

/// TSIG key material (spec §4.L "Keys are `{name, algorithm, secret}`").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyConfig {
    pub name: String,
    pub algorithm: String,
    pub secret_base64: String,
}

/// ACL entry: an address/prefix and an optional TSIG key name that must
/// sign the exchange (spec §6.4 `allow-notify`/`request-xfr`/
/// `provide-xfr`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AclEntry {
    pub address: String,
    #[serde(default)]
    pub key: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CatalogRole {
    Consumer,
    Producer,
    None,
}

impl Default for CatalogRole {
    fn default() -> Self {
        CatalogRole::None
    }
}

/// Linkage for catalog-zone machinery (spec §6.4 `catalog`,
/// `catalog-producer-zone`, `catalog-member-pattern`; spec §4.J).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub role: CatalogRole,
    #[serde(default)]
    pub producer_zone: Option<String>,
    #[serde(default)]
    pub member_pattern: Option<String>,
}

/// A named bundle of zone options a zone block can pull in (spec §4.O
/// "Patterns apply as named option bundles").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternConfig {
    pub name: String,
    #[serde(flatten)]
    pub options: ZoneConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZoneConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub pattern: Option<String>,
    /// Path template; `%s` is the zone name, `%1`-`%3` its first three
    /// labels, `%z` its class, `%y` its class numeric form (spec §6.4).
    #[serde(default)]
    pub zonefile: Option<String>,
    #[serde(default)]
    pub allow_notify: Vec<AclEntry>,
    #[serde(default)]
    pub request_xfr: Vec<AclEntry>,
    #[serde(default)]
    pub provide_xfr: Vec<AclEntry>,
    /// Permit falling back to AXFR when IXFR fails (spec §6.4
    /// `allow-axfr-fallback`; supplemented feature from
    /// `original_source/`).
    #[serde(default)]
    pub allow_axfr_fallback: bool,
    /// Consult every configured primary before giving up a refresh cycle,
    /// instead of stopping at the first that answers (spec §6.4
    /// `multi-primary-check`; supplemented feature).
    #[serde(default)]
    pub multi_primary_check: bool,
    #[serde(default)]
    pub verify_zone: bool,
    #[serde(default)]
    pub verifier: Option<String>,
    #[serde(default = "default_verifier_timeout")]
    pub verifier_timeout_secs: u64,
    #[serde(default)]
    pub catalog: CatalogConfig,
    /// Response kinds (spec §4.F `ResponseClass` names) exempt from RRL
    /// for this zone (spec §6.4 `rrl-whitelist`).
    #[serde(default)]
    pub rrl_whitelist: Vec<String>,
}

fn default_verifier_timeout() -> u64 {
    30
}

impl ZoneConfig {
    pub fn zonefile_path(&self, zonesdir: &std::path::Path, class: &str) -> Option<PathBuf> {
        let template = self.zonefile.as_ref()?;
        let labels: Vec<&str> = self.name.trim_end_matches('.').split('.').collect();
        let mut path = template.replace("%s", &self.name);
        path = path.replace("%1", labels.first().copied().unwrap_or(""));
        path = path.replace("%2", labels.get(1).copied().unwrap_or(""));
        path = path.replace("%3", labels.get(2).copied().unwrap_or(""));
        path = path.replace("%z", class);
        path = path.replace("%y", &crate::rr::DnsClass::In.to_u16().to_string());
        Some(zonesdir.join(path))
    }
}

/// Environment variables exported to verifier subprocesses (spec §6.4).
pub fn verifier_env(zone_name: &str, on_stdin: bool) -> HashMap<String, String> {
    let mut env = HashMap::new();
    env.insert("VERIFY_ZONE".to_string(), zone_name.to_string());
    env.insert(
        "VERIFY_ZONE_ON_STDIN".to_string(),
        if on_stdin { "1" } else { "0" }.to_string(),
    );
    env
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let toml = r#"
            [server]
            identity = "ns1.example.com"

            [[zones]]
            name = "example.com"
            zonefile = "%s.zone"
        "#;
        let cfg = Config::from_toml_str(toml).unwrap();
        assert_eq!(cfg.server.identity, "ns1.example.com");
        assert_eq!(cfg.zones.len(), 1);
        assert_eq!(cfg.zones[0].name, "example.com");
    }

    #[test]
    fn pattern_options_merge_into_zone() {
        let toml = r#"
            [server]

            [[patterns]]
            name = "secondary"
            allow_axfr_fallback = true
            multi_primary_check = true

            [[zones]]
            name = "example.com"
            pattern = "secondary"
        "#;
        let cfg = Config::from_toml_str(toml).unwrap();
        let effective = cfg.effective_zone(&cfg.zones[0]);
        assert!(effective.allow_axfr_fallback);
        assert!(effective.multi_primary_check);
        assert_eq!(effective.name, "example.com");
    }

    #[test]
    fn zonefile_path_substitutes_templates() {
        let mut zone = ZoneConfig::default();
        zone.name = "www.example.com".to_string();
        zone.zonefile = Some("%1/%s.zone".to_string());
        let path = zone.zonefile_path(std::path::Path::new("/zones"), "IN").unwrap();
        assert_eq!(path, std::path::PathBuf::from("/zones/www/www.example.com.zone"));
    }
}
