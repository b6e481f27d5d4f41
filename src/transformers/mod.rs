//! The transformer chain (spec.md §4.I): an ordered list of stages each of
//! which can rewrite a `DNSMessage` in place and either let it continue
//! (`Keep`) or short-circuit the chain (`Drop`).
//!
//! Chain order (normalize -> filtering -> geoip -> qname-privacy ->
//! ip-anonymizer -> relabeling -> machine-learning) is an Open Question the
//! distilled spec left unspecified; normalize runs first so every later
//! stage sees a canonical qname, and filtering runs next so dropped records
//! skip the more expensive enrichment stages. Recorded in DESIGN.md.

pub mod filtering;
pub mod geoip;
pub mod ip_anonymizer;
pub mod ml;
pub mod normalize;
pub mod qname_privacy;
pub mod relabeling;

use crate::config::transformers::TransformsConfig;
use crate::dnsmessage::DNSMessage;
use crate::error::DcResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Keep,
    Drop,
}

/// One stage of the chain. `process` is the hot path; `init_message` runs
/// once per message before `process` (currently unused by any stage but
/// kept as a seam, matching the original's `InitDNSMessage` hook) and
/// `reload_config`/`reset` back the SIGHUP reload path.
pub trait Transformer: Send {
    fn name(&self) -> &'static str;
    fn init_message(&mut self, _dm: &mut DNSMessage) {}
    fn process(&mut self, dm: &mut DNSMessage) -> Decision;
    fn reload_config(&mut self, _config: &TransformsConfig) -> DcResult<()> {
        Ok(())
    }
    fn reset(&mut self) {}
}

pub struct TransformChain {
    stages: Vec<Box<dyn Transformer>>,
}

impl TransformChain {
    pub fn from_config(config: &TransformsConfig) -> DcResult<Self> {
        let mut stages: Vec<Box<dyn Transformer>> = Vec::new();

        if let Some(cfg) = &config.normalize {
            stages.push(Box::new(normalize::Normalize::new(cfg.clone())));
        }
        if let Some(cfg) = &config.filtering {
            stages.push(Box::new(filtering::Filtering::from_config(cfg)?));
        }
        if let Some(cfg) = &config.geoip {
            stages.push(Box::new(geoip::GeoIp::from_config(cfg)?));
        }
        if let Some(cfg) = &config.qname_privacy {
            stages.push(Box::new(qname_privacy::QnamePrivacy::new(cfg.clone())));
        }
        if let Some(cfg) = &config.ip_anonymizer {
            stages.push(Box::new(ip_anonymizer::IpAnonymizer::new(cfg.clone())));
        }
        if let Some(cfg) = &config.relabeling {
            stages.push(Box::new(relabeling::Relabeling::from_config(cfg)?));
        }
        if config.machine_learning.is_some() {
            stages.push(Box::new(ml::MachineLearning::default()));
        }

        Ok(Self { stages })
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Runs every stage in order. The first `Drop` short-circuits the rest.
    pub fn process(&mut self, dm: &mut DNSMessage) -> Decision {
        for stage in &mut self.stages {
            stage.init_message(dm);
            if stage.process(dm) == Decision::Drop {
                return Decision::Drop;
            }
        }
        Decision::Keep
    }

    pub fn reload_config(&mut self, config: &TransformsConfig) -> DcResult<()> {
        *self = Self::from_config(config)?;
        Ok(())
    }

    pub fn reset(&mut self) {
        for stage in &mut self.stages {
            stage.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_produces_an_empty_chain_that_always_keeps() {
        let mut chain = TransformChain::from_config(&TransformsConfig::default()).unwrap();
        assert!(chain.is_empty());
        let mut dm = DNSMessage::new();
        assert_eq!(chain.process(&mut dm), Decision::Keep);
    }
}
