//! Ordered transformer chain configuration (spec.md §4.I).
//!
//! Presence of a field enables the corresponding transformer; absence skips
//! it. Order in the chain is fixed by `transformers::chain::build`, not by
//! field declaration order here (matches the evaluation order mandated by
//! spec.md §4.I: ignoreQuery → ignoreReply → rcode → ip → dropFqdn →
//! dropDomainRegex → keepFqdn → keepDomainRegex → downsample for filtering,
//! with geoip/privacy/normalize/relabeling/ml run around it per processor).

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TransformsConfig {
    pub filtering: Option<FilteringConfig>,
    pub geoip: Option<GeoIpConfig>,
    pub qname_privacy: Option<QnamePrivacyConfig>,
    pub ip_anonymizer: Option<IpAnonymizerConfig>,
    pub normalize: Option<NormalizeConfig>,
    pub relabeling: Option<RelabelingConfig>,
    pub machine_learning: Option<MlConfig>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct FilteringConfig {
    #[serde(default = "default_true")]
    pub log_queries: bool,
    #[serde(default = "default_true")]
    pub log_replies: bool,
    #[serde(default)]
    pub drop_rcodes: Vec<String>,
    #[serde(default)]
    pub drop_query_ip_file: Option<String>,
    #[serde(default)]
    pub keep_query_ip_file: Option<String>,
    #[serde(default)]
    pub drop_fqdn_file: Option<String>,
    #[serde(default)]
    pub drop_domain_file: Option<String>,
    #[serde(default)]
    pub keep_fqdn_file: Option<String>,
    #[serde(default)]
    pub keep_domain_file: Option<String>,
    /// Keep 1-in-N. 0 disables downsampling.
    #[serde(default)]
    pub downsample: u32,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct GeoIpConfig {
    pub db_country: Option<String>,
    pub db_city: Option<String>,
    pub db_asn: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QnamePrivacyConfig {
    /// Depth kept below the eTLD+1, 0 meaning "truncate to eTLD+1 exactly".
    #[serde(default)]
    pub depth: u8,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct IpAnonymizerConfig {
    #[serde(default = "default_v4_mask")]
    pub v4_prefix_len: u8,
    #[serde(default = "default_v6_mask")]
    pub v6_prefix_len: u8,
}

fn default_v4_mask() -> u8 {
    24
}
fn default_v6_mask() -> u8 {
    48
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct NormalizeConfig {
    #[serde(default)]
    pub qname_lowercase: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RelabelingConfig {
    pub rules: Vec<RelabelRule>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelabelRule {
    pub regex: String,
    pub action: RelabelAction,
    #[serde(default)]
    pub target: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelabelAction {
    Rename,
    Remove,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct MlConfig {}
