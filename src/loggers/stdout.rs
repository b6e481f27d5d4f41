//! The reference sink: renders records to stdout as text, JSON-ish, or
//! flat key=value lines (spec.md §9 calls this out as the reference sink
//! implementation other loggers are modeled on).

use std::sync::Arc;

use log::info;

use crate::config::loggers::{StdoutConfig, StdoutMode};
use crate::dnsmessage::DNSMessage;
use crate::worker::{new_input, WorkerControl, WorkerHandle};

pub fn spawn(name: impl Into<Arc<str>>, config: StdoutConfig) -> (WorkerHandle, WorkerControl) {
    let name: Arc<str> = name.into();
    let (handle, rx) = new_input(name.clone(), config.channel_buffer_size);
    let (stop_tx, stop_rx) = flume::bounded(1);
    let task_name = name.clone();

    let join = tokio::spawn(async move {
        loop {
            tokio::select! {
                msg = rx.recv_async() => {
                    match msg {
                        Ok(dm) => write_one(&config, &dm),
                        Err(_) => return Ok(()),
                    }
                }
                _ = stop_rx.recv_async() => {
                    info!("stdout[{task_name}] stopping");
                    return Ok(());
                }
            }
        }
    });

    (handle, WorkerControl::new(name, stop_tx, join))
}

fn write_one(config: &StdoutConfig, dm: &DNSMessage) {
    match config.mode {
        StdoutMode::Text => {
            println!("{}", dm.string(&config.text_format, &config.delimiter, &config.boundary));
        }
        StdoutMode::Json => println!("{}", render_json(dm)),
        StdoutMode::FlatJson => println!("{}", render_flat_json(dm)),
    }
}

fn render_json(dm: &DNSMessage) -> String {
    format!(
        "{{\"identity\":\"{}\",\"operation\":\"{}\",\"qname\":\"{}\",\"qtype\":\"{}\",\"rcode\":\"{}\",\"latency\":{:.6}}}",
        escape(&dm.dnstap.identity),
        escape(dm.dnstap.operation.as_str()),
        escape(&dm.dns.qname),
        escape(&dm.dns.qtype),
        escape(&dm.dns.rcode),
        dm.dnstap.latency,
    )
}

fn render_flat_json(dm: &DNSMessage) -> String {
    let fields: Vec<String> = dm
        .flatten()
        .into_iter()
        .map(|(k, v)| format!("\"{}\":\"{}\"", escape(&k), escape(&v)))
        .collect();
    format!("{{{}}}", fields.join(","))
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_json_contains_flattened_keys() {
        let mut dm = DNSMessage::new();
        dm.dns.qname = "example.com".to_string();
        let rendered = render_flat_json(&dm);
        assert!(rendered.contains("\"dns.qname\":\"example.com\""));
    }
}
