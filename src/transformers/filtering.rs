//! Drop/keep rules, ported from `transformers/filtering.go`. Evaluation
//! order is fixed: ignoreQuery -> ignoreReply -> rcode -> ip -> dropFqdn ->
//! dropDomainRegex -> keepFqdn -> keepDomainRegex -> downsample. The first
//! rule that decides drops the message; if none decide, the keep-lists
//! (when present) require a positive match before the message survives.

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU32, Ordering};

use ipnet::IpNet;
use regex::RegexSet;

use crate::config::transformers::FilteringConfig;
use crate::config::matching::{load_match_source, LoadedSource, SourceKind};
use crate::dnsmessage::{DNSMessage, MessageDirection};
use crate::error::{DcError, DcResult};

use super::{Decision, Transformer};

pub struct Filtering {
    log_queries: bool,
    log_replies: bool,
    drop_rcodes: HashSet<String>,
    drop_query_ip: Option<Vec<IpNet>>,
    keep_query_ip: Option<Vec<IpNet>>,
    drop_fqdn: Option<HashSet<String>>,
    drop_domain: Option<RegexSet>,
    keep_fqdn: Option<HashSet<String>>,
    keep_domain: Option<RegexSet>,
    downsample: u32,
    counter: AtomicU32,
}

impl Filtering {
    pub fn from_config(config: &FilteringConfig) -> DcResult<Self> {
        Ok(Self {
            log_queries: config.log_queries,
            log_replies: config.log_replies,
            drop_rcodes: config.drop_rcodes.iter().cloned().collect(),
            drop_query_ip: load_ip_set(config.drop_query_ip_file.as_deref())?,
            keep_query_ip: load_ip_set(config.keep_query_ip_file.as_deref())?,
            drop_fqdn: load_string_set(config.drop_fqdn_file.as_deref())?,
            drop_domain: load_regex_set(config.drop_domain_file.as_deref())?,
            keep_fqdn: load_string_set(config.keep_fqdn_file.as_deref())?,
            keep_domain: load_regex_set(config.keep_domain_file.as_deref())?,
            downsample: config.downsample,
            counter: AtomicU32::new(0),
        })
    }

    fn ip_filter(&self, ip: IpAddr) -> Option<bool> {
        // Keep-set wins over drop-set: an address on both lists is kept.
        if let Some(keep) = &self.keep_query_ip {
            if keep.iter().any(|net| net.contains(&ip)) {
                return Some(false);
            }
        }
        if let Some(drop) = &self.drop_query_ip {
            if drop.iter().any(|net| net.contains(&ip)) {
                return Some(true);
            }
        }
        None
    }
}

fn load_string_set(path: Option<&str>) -> DcResult<Option<HashSet<String>>> {
    let Some(path) = path else { return Ok(None) };
    let source = format!("file://{path}");
    match load_match_source(&source, SourceKind::String)? {
        LoadedSource::Strings(v) => Ok(Some(v.into_iter().collect())),
        LoadedSource::Regexes(_) => unreachable!("SourceKind::String never yields regexes"),
    }
}

/// Each line is either a bare IP (matched as a /32 or /128 host route) or a
/// CIDR, per spec.md §4.I.
fn load_ip_set(path: Option<&str>) -> DcResult<Option<Vec<IpNet>>> {
    let Some(path) = path else { return Ok(None) };
    let source = format!("file://{path}");
    let lines = match load_match_source(&source, SourceKind::String)? {
        LoadedSource::Strings(v) => v,
        LoadedSource::Regexes(_) => unreachable!("SourceKind::String never yields regexes"),
    };
    let mut nets = Vec::with_capacity(lines.len());
    for line in lines {
        let net = if line.contains('/') {
            line.parse::<IpNet>()
                .map_err(|e| DcError::msg(format!("invalid CIDR {line}: {e}")))?
        } else {
            let ip: IpAddr = line
                .parse()
                .map_err(|e| DcError::msg(format!("invalid IP {line}: {e}")))?;
            IpNet::from(ip)
        };
        nets.push(net);
    }
    Ok(Some(nets))
}

fn load_regex_set(path: Option<&str>) -> DcResult<Option<RegexSet>> {
    let Some(path) = path else { return Ok(None) };
    let source = format!("file://{path}");
    let lines = match load_match_source(&source, SourceKind::String)? {
        LoadedSource::Strings(v) => v,
        LoadedSource::Regexes(_) => unreachable!("SourceKind::String never yields regexes"),
    };
    Ok(Some(RegexSet::new(lines)?))
}

impl Transformer for Filtering {
    fn name(&self) -> &'static str {
        "filtering"
    }

    fn process(&mut self, dm: &mut DNSMessage) -> Decision {
        if !self.log_queries && dm.dns.r#type == MessageDirection::Query {
            return Decision::Drop;
        }
        if !self.log_replies && dm.dns.r#type == MessageDirection::Reply {
            return Decision::Drop;
        }
        if self.drop_rcodes.contains(&dm.dns.rcode) {
            return Decision::Drop;
        }
        if let Some(ip) = dm.network.query_ip {
            if let Some(drop) = self.ip_filter(ip) {
                if drop {
                    return Decision::Drop;
                }
            }
        }
        if let Some(drop_fqdn) = &self.drop_fqdn {
            if drop_fqdn.contains(&dm.dns.qname) {
                return Decision::Drop;
            }
        }
        if let Some(drop_domain) = &self.drop_domain {
            if drop_domain.is_match(&dm.dns.qname) {
                return Decision::Drop;
            }
        }

        let has_keep_lists = self.keep_fqdn.is_some() || self.keep_domain.is_some();
        if has_keep_lists {
            let kept_by_fqdn = self
                .keep_fqdn
                .as_ref()
                .map(|set| set.contains(&dm.dns.qname))
                .unwrap_or(false);
            let kept_by_domain = self
                .keep_domain
                .as_ref()
                .map(|set| set.is_match(&dm.dns.qname))
                .unwrap_or(false);
            if !kept_by_fqdn && !kept_by_domain {
                return Decision::Drop;
            }
        }

        if self.downsample > 1 {
            let n = self.counter.fetch_add(1, Ordering::Relaxed);
            if n % self.downsample != 0 {
                return Decision::Drop;
            }
        }

        Decision::Keep
    }

    fn reset(&mut self) {
        self.counter.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> FilteringConfig {
        FilteringConfig {
            log_queries: true,
            log_replies: true,
            ..Default::default()
        }
    }

    #[test]
    fn drops_configured_rcodes() {
        let mut f = Filtering::from_config(&FilteringConfig {
            drop_rcodes: vec!["NXDOMAIN".to_string()],
            ..base_config()
        })
        .unwrap();
        let mut dm = DNSMessage::new();
        dm.dns.rcode = "NXDOMAIN".to_string();
        assert_eq!(f.process(&mut dm), Decision::Drop);
    }

    #[test]
    fn downsample_keeps_one_in_n() {
        let mut f = Filtering::from_config(&FilteringConfig {
            downsample: 3,
            ..base_config()
        })
        .unwrap();
        let decisions: Vec<_> = (0..6)
            .map(|_| f.process(&mut DNSMessage::new()))
            .collect();
        assert_eq!(
            decisions,
            vec![
                Decision::Keep,
                Decision::Drop,
                Decision::Drop,
                Decision::Keep,
                Decision::Drop,
                Decision::Drop,
            ]
        );
    }

    #[test]
    fn drop_domain_regex_filters_matching_qnames_only() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        use std::io::Write;
        writeln!(file, "^ads\\.").unwrap();

        let mut f = Filtering::from_config(&FilteringConfig {
            drop_domain_file: Some(file.path().to_str().unwrap().to_string()),
            ..base_config()
        })
        .unwrap();

        let mut ad = DNSMessage::new();
        ad.dns.qname = "ads.example.com".to_string();
        assert_eq!(f.process(&mut ad), Decision::Drop);

        let mut plain = DNSMessage::new();
        plain.dns.qname = "example.com".to_string();
        assert_eq!(f.process(&mut plain), Decision::Keep);
    }

    #[test]
    fn drop_query_ip_matches_a_containing_cidr() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        use std::io::Write;
        writeln!(file, "10.0.0.0/8").unwrap();

        let mut f = Filtering::from_config(&FilteringConfig {
            drop_query_ip_file: Some(file.path().to_str().unwrap().to_string()),
            ..base_config()
        })
        .unwrap();

        let mut in_range = DNSMessage::new();
        in_range.network.query_ip = Some("10.1.2.3".parse().unwrap());
        assert_eq!(f.process(&mut in_range), Decision::Drop);

        let mut out_of_range = DNSMessage::new();
        out_of_range.network.query_ip = Some("192.168.1.1".parse().unwrap());
        assert_eq!(f.process(&mut out_of_range), Decision::Keep);
    }

    #[test]
    fn drop_query_ip_matches_a_bare_host_address() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        use std::io::Write;
        writeln!(file, "203.0.113.7").unwrap();

        let mut f = Filtering::from_config(&FilteringConfig {
            drop_query_ip_file: Some(file.path().to_str().unwrap().to_string()),
            ..base_config()
        })
        .unwrap();

        let mut dm = DNSMessage::new();
        dm.network.query_ip = Some("203.0.113.7".parse().unwrap());
        assert_eq!(f.process(&mut dm), Decision::Drop);
    }

    #[test]
    fn log_queries_false_drops_only_queries() {
        let mut f = Filtering::from_config(&FilteringConfig {
            log_queries: false,
            log_replies: true,
            ..Default::default()
        })
        .unwrap();
        let mut query = DNSMessage::new();
        query.dns.r#type = MessageDirection::Query;
        assert_eq!(f.process(&mut query), Decision::Drop);

        let mut reply = DNSMessage::new();
        reply.dns.r#type = MessageDirection::Reply;
        assert_eq!(f.process(&mut reply), Decision::Keep);
    }
}
