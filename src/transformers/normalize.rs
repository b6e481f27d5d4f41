//! Qname case normalization (spec.md §4.I). Trailing-dot stripping is
//! handled unconditionally at decode time (invariant #3); this transformer
//! only controls case folding, which the original gates behind a config
//! flag rather than always applying.

use crate::config::transformers::NormalizeConfig;
use crate::dnsmessage::DNSMessage;

use super::{Decision, Transformer};

pub struct Normalize {
    qname_lowercase: bool,
}

impl Normalize {
    pub fn new(config: NormalizeConfig) -> Self {
        Self {
            qname_lowercase: config.qname_lowercase,
        }
    }
}

impl Transformer for Normalize {
    fn name(&self) -> &'static str {
        "normalize"
    }

    fn process(&mut self, dm: &mut DNSMessage) -> Decision {
        if self.qname_lowercase {
            dm.dns.qname = dm.dns.qname.to_ascii_lowercase();
        }
        Decision::Keep
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_qname_when_enabled() {
        let mut t = Normalize::new(NormalizeConfig { qname_lowercase: true });
        let mut dm = DNSMessage::new();
        dm.dns.qname = "WWW.Example.COM".to_string();
        t.process(&mut dm);
        assert_eq!(dm.dns.qname, "www.example.com");
    }

    #[test]
    fn leaves_qname_untouched_when_disabled() {
        let mut t = Normalize::new(NormalizeConfig { qname_lowercase: false });
        let mut dm = DNSMessage::new();
        dm.dns.qname = "WWW.Example.COM".to_string();
        t.process(&mut dm);
        assert_eq!(dm.dns.qname, "WWW.Example.COM");
    }
}
