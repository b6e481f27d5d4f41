//! The uniform in-memory DNS observation passed between workers
//! (spec.md §3, §4.A).
//!
//! `DNSMessage::new()` plays the role of the original's `DnsMessage.Init()`:
//! every sub-record is present with its zero value so that a sink or
//! transformer never has to special-case an absent field.

pub mod wire;

use std::collections::BTreeMap;
use std::net::IpAddr;

use chrono::{SecondsFormat, TimeZone, Utc};

use crate::config::matching::{MatchConstraint, MatchRule, NumericOp};
use crate::error::{DcError, DcResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DnstapOperation {
    ClientQuery,
    ClientResponse,
    Query,
    Reply,
    Other(String),
}

impl DnstapOperation {
    pub fn as_str(&self) -> &str {
        match self {
            Self::ClientQuery => crate::constants::DNSTAP_CLIENT_QUERY,
            Self::ClientResponse => crate::constants::DNSTAP_CLIENT_RESPONSE,
            Self::Query => crate::constants::DNSTAP_OPERATION_QUERY,
            Self::Reply => crate::constants::DNSTAP_OPERATION_REPLY,
            Self::Other(s) => s.as_str(),
        }
    }

    /// Short form used by the PowerDNS "quiet text" option (spec.md §4.G).
    pub fn quiet(&self) -> &'static str {
        match self {
            Self::Query | Self::ClientQuery => "Q",
            Self::Reply | Self::ClientResponse => "R",
            Self::Other(_) => "-",
        }
    }
}

impl Default for DnstapOperation {
    fn default() -> Self {
        Self::Other(String::new())
    }
}

impl std::fmt::Display for DnstapOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageDirection {
    #[default]
    Query,
    Reply,
}

impl MessageDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Query => "QUERY",
            Self::Reply => "REPLY",
        }
    }

    /// Short form used by the PowerDNS "quiet text" option.
    pub fn quiet(&self) -> &'static str {
        match self {
            Self::Query => "Q",
            Self::Reply => "R",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Family {
    #[default]
    Unknown,
    Ipv4,
    Ipv6,
}

impl Family {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "-",
            Self::Ipv4 => "IPv4",
            Self::Ipv6 => "IPv6",
        }
    }

    pub fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => Self::Ipv4,
            IpAddr::V6(_) => Self::Ipv6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Protocol {
    #[default]
    Unknown,
    Udp,
    Tcp,
    Dot,
    Doh,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "-",
            Self::Udp => crate::constants::PROTO_UDP,
            Self::Tcp => crate::constants::PROTO_TCP,
            Self::Dot => crate::constants::PROTO_DOT,
            Self::Doh => crate::constants::PROTO_DOH,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DnsTap {
    pub identity: String,
    pub operation: DnstapOperation,
    pub time_sec: u64,
    pub time_nsec: u32,
    /// Set only on REPLY events once a paired query time is known
    /// (invariant #2: `replyTime - queryTime`, else 0).
    pub latency: f64,
}

impl DnsTap {
    /// Invariant #1: always re-derived, never stored authoritatively.
    pub fn timestamp(&self) -> f64 {
        self.time_sec as f64 + self.time_nsec as f64 / 1e9
    }

    pub fn timestamp_rfc3339(&self) -> String {
        Utc.timestamp_opt(self.time_sec as i64, self.time_nsec)
            .single()
            .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Nanos, true))
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct NetworkInfo {
    pub family: Family,
    pub protocol: Protocol,
    pub query_ip: Option<IpAddr>,
    pub query_port: u16,
    pub response_ip: Option<IpAddr>,
    pub response_port: u16,
    pub as_number: Option<u32>,
    pub as_org: Option<String>,
}

impl NetworkInfo {
    /// Invariant #4: for CLIENT_RESPONSE events, query/response pairs are
    /// swapped so `query_ip` is always the client.
    pub fn swap_query_response(&mut self) {
        std::mem::swap(&mut self.query_ip, &mut self.response_ip);
        std::mem::swap(&mut self.query_port, &mut self.response_port);
    }
}

#[derive(Debug, Clone, Default)]
pub struct DnsAnswer {
    pub name: String,
    pub rdatatype: String,
    pub class: u16,
    pub ttl: u32,
    pub rdata: String,
}

#[derive(Debug, Clone, Default)]
pub struct Dns {
    pub id: u16,
    pub r#type: MessageDirection,
    pub rcode: String,
    /// Never has a trailing dot (invariant #3).
    pub qname: String,
    pub qtype: String,
    pub qname_public_suffix: String,
    pub qname_effective_tld_plus_one: String,
    pub length: u32,
    pub payload: Vec<u8>,
    pub answers: Vec<DnsAnswer>,
    pub malformed_packet: bool,
}

impl Dns {
    /// Populates `qname_public_suffix`/`qname_effective_tld_plus_one` from
    /// `qname` against the compiled-in Public Suffix List (spec.md §4.G
    /// step 3). A no-op if `qname` has no recognised public suffix.
    pub fn annotate_public_suffix(&mut self) {
        if let Some(suffix) = psl::suffix(self.qname.as_bytes()) {
            self.qname_public_suffix = String::from_utf8_lossy(suffix.as_bytes()).into_owned();
        }
        if let Some(domain) = psl::domain(self.qname.as_bytes()) {
            self.qname_effective_tld_plus_one = String::from_utf8_lossy(domain.as_bytes()).into_owned();
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Geo {
    pub continent: String,
    pub country_iso_code: String,
    pub city: String,
}

#[derive(Debug, Clone, Default)]
pub struct PowerDns {
    pub tags: Vec<String>,
    pub original_requestor_subnet: Option<IpAddr>,
}

#[derive(Debug, Clone, Default)]
pub struct Reducer {
    pub occurrences: u64,
    pub cumulative_length: u64,
}

#[derive(Debug, Clone, Default)]
pub struct MachineLearning {
    pub entropy: f64,
    pub length: usize,
    pub labels: usize,
    pub digits: usize,
    pub letters: usize,
    pub specials: usize,
    pub consecutive_chars: usize,
    pub occurrences: u64,
    pub uncommon_qtypes: bool,
}

/// The unit of work passed between workers (spec.md §3).
#[derive(Debug, Clone, Default)]
pub struct DNSMessage {
    pub dnstap: DnsTap,
    pub network: NetworkInfo,
    pub dns: Dns,
    pub geo: Geo,
    pub powerdns: PowerDns,
    pub reducer: Reducer,
    pub ml: MachineLearning,
}

impl DNSMessage {
    /// Equivalent of the original `DnsMessage.Init()`: every sub-record is
    /// already present with a zero value thanks to `#[derive(Default)]`, so
    /// this just documents the invariant at call sites.
    pub fn new() -> Self {
        Self::default()
    }

    /// Produces a flat `key -> value` mapping for the flat-json sink
    /// (spec.md §4.A, §6).
    pub fn flatten(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        out.insert("dnstap.identity".to_string(), self.dnstap.identity.clone());
        out.insert(
            "dnstap.operation".to_string(),
            self.dnstap.operation.as_str().to_string(),
        );
        out.insert(
            "dnstap.timestamp_rfc3339".to_string(),
            self.dnstap.timestamp_rfc3339(),
        );
        out.insert(
            "dnstap.latency".to_string(),
            format!("{:.6}", self.dnstap.latency),
        );
        out.insert(
            "network.family".to_string(),
            self.network.family.as_str().to_string(),
        );
        out.insert(
            "network.protocol".to_string(),
            self.network.protocol.as_str().to_string(),
        );
        out.insert(
            "network.query-ip".to_string(),
            self.network
                .query_ip
                .map(|ip| ip.to_string())
                .unwrap_or_else(|| "-".to_string()),
        );
        out.insert(
            "network.response-ip".to_string(),
            self.network
                .response_ip
                .map(|ip| ip.to_string())
                .unwrap_or_else(|| "-".to_string()),
        );
        out.insert("dns.qname".to_string(), self.dns.qname.clone());
        out.insert("dns.qtype".to_string(), self.dns.qtype.clone());
        out.insert("dns.rcode".to_string(), self.dns.rcode.clone());
        out.insert(
            "dns.type".to_string(),
            self.dns.r#type.as_str().to_string(),
        );
        out.insert(
            "dns.malformed-packet".to_string(),
            self.dns.malformed_packet.to_string(),
        );
        if !self.geo.country_iso_code.is_empty() {
            out.insert("geo.country-iso-code".to_string(), self.geo.country_iso_code.clone());
            out.insert("geo.city".to_string(), self.geo.city.clone());
        }
        out
    }

    /// Renders a text line from an ordered token list (spec.md §4.A).
    /// `boundary`, when non-empty, quotes tokens that contain `delimiter`.
    pub fn string(&self, tokens: &[String], delimiter: &str, boundary: &str) -> String {
        let flat = self.flatten();
        let mut parts = Vec::with_capacity(tokens.len());
        for token in tokens {
            let value = self.token_value(token, &flat);
            if !boundary.is_empty() && value.contains(delimiter) {
                parts.push(format!("{boundary}{value}{boundary}"));
            } else {
                parts.push(value);
            }
        }
        parts.join(delimiter)
    }

    fn token_value(&self, token: &str, flat: &BTreeMap<String, String>) -> String {
        match token {
            "timestamp" => self.dnstap.timestamp_rfc3339(),
            "identity" => self.dnstap.identity.clone(),
            "operation" => self.dnstap.operation.as_str().to_string(),
            "qname" => self.dns.qname.clone(),
            "qtype" => self.dns.qtype.clone(),
            "rcode" => self.dns.rcode.clone(),
            "latency" => format!("{:.6}", self.dnstap.latency),
            other => flat.get(other).cloned().unwrap_or_else(|| "-".to_string()),
        }
    }

    /// Evaluates a `{ field-path -> constraint }` rule set against this
    /// record. A rule set matches when every constraint in it matches
    /// (spec.md §4.A); `rules` is a list of rule sets, any one of which
    /// matching is sufficient (OR across rule sets, AND within one).
    pub fn matching(&self, rules: &[MatchRule]) -> DcResult<bool> {
        for rule in rules {
            let mut all_match = true;
            for (path, constraint) in rule {
                if !self.matches_one(path, constraint)? {
                    all_match = false;
                    break;
                }
            }
            if all_match {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn field_value(&self, path: &str) -> Option<String> {
        match path {
            "dnstap.identity" => Some(self.dnstap.identity.clone()),
            "dnstap.operation" => Some(self.dnstap.operation.as_str().to_string()),
            "network.query-ip" => self.network.query_ip.map(|ip| ip.to_string()),
            "network.response-ip" => self.network.response_ip.map(|ip| ip.to_string()),
            "network.protocol" => Some(self.network.protocol.as_str().to_string()),
            "network.family" => Some(self.network.family.as_str().to_string()),
            "dns.qname" => Some(self.dns.qname.clone()),
            "dns.qtype" => Some(self.dns.qtype.clone()),
            "dns.rcode" => Some(self.dns.rcode.clone()),
            "dns.type" => Some(self.dns.r#type.as_str().to_string()),
            "dns.length" => Some(self.dns.length.to_string()),
            _ => self.flatten().get(path).cloned(),
        }
    }

    fn matches_one(&self, path: &str, constraint: &MatchConstraint) -> DcResult<bool> {
        let value = self.field_value(path);
        match constraint {
            MatchConstraint::String(expected) => Ok(value.as_deref() == Some(expected.as_str())),
            MatchConstraint::Regexp { regex } => {
                let re = regex::Regex::new(regex)?;
                Ok(value.map(|v| re.is_match(&v)).unwrap_or(false))
            }
            MatchConstraint::Numeric { op, value: expected } => {
                let Some(actual) = value.and_then(|v| v.parse::<f64>().ok()) else {
                    return Ok(false);
                };
                Ok(match op {
                    NumericOp::Eq => (actual - expected).abs() < f64::EPSILON,
                    NumericOp::Gt => actual > *expected,
                    NumericOp::Lt => actual < *expected,
                })
            }
            MatchConstraint::Source {
                match_source,
                source_kind,
            } => {
                let loaded = crate::config::matching::load_match_source(match_source, *source_kind)?;
                let Some(value) = value else { return Ok(false) };
                Ok(match loaded {
                    crate::config::matching::LoadedSource::Strings(list) => list.contains(&value),
                    crate::config::matching::LoadedSource::Regexes(list) => {
                        list.iter().any(|re| re.is_match(&value))
                    }
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_message_has_zeroed_sub_records() {
        let dm = DNSMessage::new();
        assert_eq!(dm.dns.qname, "");
        assert_eq!(dm.ml.entropy, 0.0);
        assert!(!dm.dns.malformed_packet);
    }

    #[test]
    fn swap_query_response_swaps_both_ip_and_port() {
        let mut net = NetworkInfo {
            query_ip: Some("10.0.0.1".parse().unwrap()),
            query_port: 53000,
            response_ip: Some("10.0.0.2".parse().unwrap()),
            response_port: 53,
            ..Default::default()
        };
        net.swap_query_response();
        assert_eq!(net.query_ip, Some("10.0.0.2".parse().unwrap()));
        assert_eq!(net.response_ip, Some("10.0.0.1".parse().unwrap()));
        assert_eq!(net.query_port, 53);
        assert_eq!(net.response_port, 53000);
    }

    #[test]
    fn latency_is_zero_by_default_and_formats_to_six_decimals() {
        let mut dm = DNSMessage::new();
        // P6: queryTime=(10, 500_000us) replyTime=(10, 750_000us) -> 0.000250
        let query = 10.5_f64;
        let reply = 10.75_f64;
        dm.dnstap.latency = reply - query;
        assert_eq!(format!("{:.6}", dm.dnstap.latency), "0.000250");
    }

    #[test]
    fn string_renders_requested_tokens_in_order() {
        let mut dm = DNSMessage::new();
        dm.dns.qname = "dnscollector.dev".to_string();
        dm.dns.qtype = "A".to_string();
        dm.dns.rcode = "NOERROR".to_string();
        let line = dm.string(
            &["qname".to_string(), "qtype".to_string(), "rcode".to_string()],
            " ".into(),
            "",
        );
        assert_eq!(line, "dnscollector.dev A NOERROR");
    }

    #[test]
    fn matching_is_and_within_a_rule_and_or_across_rules() {
        let mut dm = DNSMessage::new();
        dm.dns.qname = "ads.example.com".to_string();
        dm.dns.rcode = "NOERROR".to_string();

        let mut rule = MatchRule::new();
        rule.insert(
            "dns.qname".to_string(),
            MatchConstraint::Regexp {
                regex: "^ads\\.".to_string(),
            },
        );
        rule.insert(
            "dns.rcode".to_string(),
            MatchConstraint::String("NXDOMAIN".to_string()),
        );
        assert!(!dm.matching(&[rule.clone()]).unwrap());

        rule.insert(
            "dns.rcode".to_string(),
            MatchConstraint::String("NOERROR".to_string()),
        );
        assert!(dm.matching(&[rule]).unwrap());
    }
}
