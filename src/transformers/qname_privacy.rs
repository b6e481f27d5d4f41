//! Truncates qnames down to their registrable domain (eTLD+1), grounded on
//! the original `transformers/qnamedminimization.go`-style privacy pass.
//! Uses the `psl` crate (a compiled-in Public Suffix List) since neither
//! the teacher nor the rest of the pack carries a PSL parser of its own.

use crate::config::transformers::QnamePrivacyConfig;
use crate::dnsmessage::DNSMessage;

use super::{Decision, Transformer};

pub struct QnamePrivacy {
    depth: u8,
}

impl QnamePrivacy {
    pub fn new(config: QnamePrivacyConfig) -> Self {
        Self { depth: config.depth }
    }
}

impl Transformer for QnamePrivacy {
    fn name(&self) -> &'static str {
        "qname-privacy"
    }

    fn process(&mut self, dm: &mut DNSMessage) -> Decision {
        let stripped = dm.dns.qname.trim_end_matches('.');
        if let Some(domain) = psl::domain(stripped.as_bytes()) {
            let root = String::from_utf8_lossy(domain.as_bytes()).into_owned();
            if self.depth == 0 {
                dm.dns.qname = root;
            } else {
                let labels: Vec<&str> = stripped.split('.').collect();
                let root_labels = root.split('.').count();
                let keep = root_labels + self.depth as usize;
                if labels.len() > keep {
                    dm.dns.qname = labels[labels.len() - keep..].join(".");
                }
            }
        }
        Decision::Keep
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_to_etld_plus_one_at_depth_zero() {
        let mut t = QnamePrivacy::new(QnamePrivacyConfig { depth: 0 });
        let mut dm = DNSMessage::new();
        dm.dns.qname = "www.sub.example.com".to_string();
        t.process(&mut dm);
        assert_eq!(dm.dns.qname, "example.com");
    }

    #[test]
    fn keeps_one_extra_label_at_depth_one() {
        let mut t = QnamePrivacy::new(QnamePrivacyConfig { depth: 1 });
        let mut dm = DNSMessage::new();
        dm.dns.qname = "www.sub.example.com".to_string();
        t.process(&mut dm);
        assert_eq!(dm.dns.qname, "sub.example.com");
    }
}
