//! Renames or removes flattened keys by regex, grounded on the original
//! `transformers/relabeling.go`. Operates on the same flat key space that
//! `DNSMessage::flatten` / `DNSMessage::string` read from the text sinks,
//! so it only affects rendering, not the in-memory struct fields.

use regex::Regex;

use crate::config::transformers::{RelabelAction, RelabelingConfig};
use crate::dnsmessage::DNSMessage;
use crate::error::DcResult;

use super::{Decision, Transformer};

struct Rule {
    regex: Regex,
    action: RelabelAction,
    target: Option<String>,
}

pub struct Relabeling {
    rules: Vec<Rule>,
}

impl Relabeling {
    pub fn from_config(config: &RelabelingConfig) -> DcResult<Self> {
        let mut rules = Vec::with_capacity(config.rules.len());
        for rule in &config.rules {
            rules.push(Rule {
                regex: Regex::new(&rule.regex)?,
                action: rule.action,
                target: rule.target.clone(),
            });
        }
        Ok(Self { rules })
    }

    /// Relabels a flattened key, or returns `None` if a rule removed it.
    pub fn relabel_key(&self, key: &str) -> Option<String> {
        for rule in &self.rules {
            if rule.regex.is_match(key) {
                match rule.action {
                    RelabelAction::Remove => return None,
                    RelabelAction::Rename => {
                        if let Some(target) = &rule.target {
                            return Some(rule.regex.replace(key, target.as_str()).into_owned());
                        }
                    }
                }
            }
        }
        Some(key.to_string())
    }
}

impl Transformer for Relabeling {
    fn name(&self) -> &'static str {
        "relabeling"
    }

    /// Relabeling does not touch the in-memory record; it is applied by
    /// text sinks when they render `DNSMessage::flatten()`.
    fn process(&mut self, _dm: &mut DNSMessage) -> Decision {
        Decision::Keep
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::transformers::RelabelRule;

    #[test]
    fn rename_rule_rewrites_matching_keys() {
        let relabeling = Relabeling::from_config(&RelabelingConfig {
            rules: vec![RelabelRule {
                regex: "^dnstap\\.".to_string(),
                action: RelabelAction::Rename,
                target: "tap.".to_string().into(),
            }],
        })
        .unwrap();
        assert_eq!(
            relabeling.relabel_key("dnstap.identity"),
            Some("tap.identity".to_string())
        );
    }

    #[test]
    fn remove_rule_drops_matching_keys() {
        let relabeling = Relabeling::from_config(&RelabelingConfig {
            rules: vec![RelabelRule {
                regex: "^geo\\.".to_string(),
                action: RelabelAction::Remove,
                target: None,
            }],
        })
        .unwrap();
        assert_eq!(relabeling.relabel_key("geo.city"), None);
        assert_eq!(
            relabeling.relabel_key("dns.qname"),
            Some("dns.qname".to_string())
        );
    }
}
