use serde::Deserialize;

use super::collectors::default_channel_buffer_size;
use super::transformers::TransformsConfig;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggersConfig {
    pub dnstap: Option<DnstapSenderConfig>,
    pub stdout: Option<StdoutConfig>,
    pub syslog: Option<SyslogConfig>,
    pub tcp: Option<TcpConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DnstapSenderConfig {
    pub remote_address: String,
    #[serde(default = "default_dnstap_remote_port")]
    pub remote_port: u16,
    #[serde(default)]
    pub sock_path: Option<String>,
    #[serde(default = "default_transport")]
    pub transport: String,
    #[serde(default)]
    pub tls_support: bool,
    #[serde(default = "default_tls_min_version")]
    pub tls_min_version: String,
    #[serde(default)]
    pub tls_insecure: bool,
    #[serde(default)]
    pub ca_file: Option<String>,
    #[serde(default)]
    pub cert_file: Option<String>,
    #[serde(default)]
    pub key_file: Option<String>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_retry_interval")]
    pub retry_interval_secs: u64,
    #[serde(default = "default_flush_interval")]
    pub flush_interval_secs: u64,
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    #[serde(default = "default_channel_buffer_size")]
    pub channel_buffer_size: usize,
    #[serde(default)]
    pub overwrite_identity: bool,
    #[serde(default)]
    pub server_id: Option<String>,
    #[serde(default)]
    pub transforms: TransformsConfig,
}

fn default_dnstap_remote_port() -> u16 {
    6000
}
fn default_transport() -> String {
    "tcp".to_string()
}
fn default_tls_min_version() -> String {
    "1.2".to_string()
}
fn default_connect_timeout() -> u64 {
    5
}
fn default_retry_interval() -> u64 {
    5
}
fn default_flush_interval() -> u64 {
    5
}
fn default_buffer_size() -> usize {
    100
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum StdoutMode {
    #[default]
    Text,
    Json,
    FlatJson,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StdoutConfig {
    #[serde(default)]
    pub mode: StdoutMode,
    #[serde(default = "default_text_format")]
    pub text_format: Vec<String>,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    #[serde(default)]
    pub boundary: String,
    #[serde(default = "default_channel_buffer_size")]
    pub channel_buffer_size: usize,
}

fn default_text_format() -> Vec<String> {
    vec![
        "timestamp".to_string(),
        "identity".to_string(),
        "operation".to_string(),
        "qname".to_string(),
        "qtype".to_string(),
        "rcode".to_string(),
        "latency".to_string(),
    ]
}
fn default_delimiter() -> String {
    " ".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyslogConfig {
    #[serde(default = "default_facility")]
    pub facility: String,
    #[serde(default = "default_channel_buffer_size")]
    pub channel_buffer_size: usize,
}

fn default_facility() -> String {
    "daemon".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct TcpConfig {
    pub remote_address: String,
    pub remote_port: u16,
    #[serde(default = "default_retry_interval")]
    pub retry_interval_secs: u64,
    #[serde(default = "default_channel_buffer_size")]
    pub channel_buffer_size: usize,
}
