//! Lexical features of the qname for downstream anomaly-detection models,
//! ported from `transformers/machinelearning.go`. `letters` merges the
//! original's separate lower/upper counters; `occurrences` is populated
//! only when a reducer transformer has already aggregated the record.

use crate::constants::COMMON_QTYPES;
use crate::dnsmessage::{DNSMessage, MachineLearning as MlFeatures};

use super::{Decision, Transformer};

#[derive(Default)]
pub struct MachineLearning;

impl Transformer for MachineLearning {
    fn name(&self) -> &'static str {
        "machine-learning"
    }

    fn process(&mut self, dm: &mut DNSMessage) -> Decision {
        let qname = dm.dns.qname.clone();
        let n = qname.chars().count().max(1) as f64;

        let mut counts = std::collections::HashMap::new();
        for c in qname.chars() {
            *counts.entry(c).or_insert(0u32) += 1;
        }
        let entropy = -counts
            .values()
            .map(|&count| {
                let p = count as f64 / n;
                p * p.log2()
            })
            .sum::<f64>();

        let digits = qname.chars().filter(|c| c.is_ascii_digit()).count();
        let letters = qname.chars().filter(|c| c.is_alphabetic()).count();
        let specials = qname
            .chars()
            .filter(|c| matches!(c, '.' | '-' | '_' | '='))
            .count();
        let labels = qname.matches('.').count() + 1;

        let lower: Vec<char> = qname.to_ascii_lowercase().chars().collect();
        let mut consecutive_chars = 0;
        for i in 1..lower.len() {
            if lower[i] == lower[i - 1] {
                consecutive_chars += 1;
            }
        }

        let uncommon_qtypes = !COMMON_QTYPES.contains(&dm.dns.qtype.as_str());

        dm.ml = MlFeatures {
            entropy,
            length: qname.chars().count(),
            labels,
            digits,
            letters,
            specials,
            consecutive_chars,
            occurrences: dm.reducer.occurrences,
            uncommon_qtypes,
        };

        Decision::Keep
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn computes_entropy_and_label_count() {
        let mut t = MachineLearning;
        let mut dm = DNSMessage::new();
        dm.dns.qname = "www.example.com".to_string();
        dm.dns.qtype = "A".to_string();
        t.process(&mut dm);
        assert_eq!(dm.ml.labels, 3);
        assert!(dm.ml.entropy > 0.0);
        assert!(!dm.ml.uncommon_qtypes);
    }

    #[test]
    fn flags_uncommon_qtypes() {
        let mut t = MachineLearning;
        let mut dm = DNSMessage::new();
        dm.dns.qname = "example.com".to_string();
        dm.dns.qtype = "TXT".to_string();
        t.process(&mut dm);
        assert!(dm.ml.uncommon_qtypes);
    }
}
