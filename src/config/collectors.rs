use serde::Deserialize;

use super::transformers::TransformsConfig;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CollectorsConfig {
    pub dnstap: Option<DnstapCollectorConfig>,
    pub powerdns: Option<PowerDnsCollectorConfig>,
    pub dnsmessage: Option<DnsMessageCollectorConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DnstapCollectorConfig {
    #[serde(default = "default_listen_ip")]
    pub listen_ip: String,
    #[serde(default = "default_dnstap_port")]
    pub listen_port: u16,
    #[serde(default)]
    pub sock_path: Option<String>,
    #[serde(default)]
    pub tls_support: bool,
    #[serde(default = "default_tls_min_version")]
    pub tls_min_version: String,
    #[serde(default)]
    pub cert_file: Option<String>,
    #[serde(default)]
    pub key_file: Option<String>,
    #[serde(default)]
    pub rcv_buf_size: Option<usize>,
    /// Send RST instead of FIN when a connection is torn down on stop().
    #[serde(default)]
    pub reset_conn: bool,
    #[serde(default = "default_channel_buffer_size")]
    pub channel_buffer_size: usize,
    #[serde(default)]
    pub transforms: TransformsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PowerDnsCollectorConfig {
    #[serde(default = "default_listen_ip")]
    pub listen_ip: String,
    #[serde(default = "default_powerdns_port")]
    pub listen_port: u16,
    #[serde(default)]
    pub tls_support: bool,
    #[serde(default = "default_tls_min_version")]
    pub tls_min_version: String,
    #[serde(default)]
    pub cert_file: Option<String>,
    #[serde(default)]
    pub key_file: Option<String>,
    #[serde(default)]
    pub rcv_buf_size: Option<usize>,
    #[serde(default = "default_channel_buffer_size")]
    pub channel_buffer_size: usize,
    /// Map long operation/type names to short Q/R forms.
    #[serde(default)]
    pub quiet_text: bool,
    #[serde(default)]
    pub transforms: TransformsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DnsMessageCollectorConfig {
    #[serde(default = "default_channel_buffer_size")]
    pub channel_buffer_size: usize,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub transforms: TransformsConfig,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct MatchingConfig {
    #[serde(default)]
    pub include: Vec<super::matching::MatchRule>,
    #[serde(default)]
    pub exclude: Vec<super::matching::MatchRule>,
}

fn default_listen_ip() -> String {
    "0.0.0.0".to_string()
}
fn default_dnstap_port() -> u16 {
    6000
}
fn default_powerdns_port() -> u16 {
    6001
}
fn default_tls_min_version() -> String {
    "1.2".to_string()
}
pub(crate) fn default_channel_buffer_size() -> usize {
    512
}
