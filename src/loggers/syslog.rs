//! Syslog sink, built on the teacher's `syslog` crate dependency. Connects
//! over the local unix socket, matching the original's `UnixDgram`
//! transport default.

use std::sync::Arc;

use log::{info, warn};
use syslog::{Facility, Formatter3164};

use crate::config::loggers::SyslogConfig;
use crate::error::{DcError, DcResult};
use crate::worker::{new_input, WorkerControl, WorkerHandle};

fn facility(name: &str) -> DcResult<Facility> {
    match name {
        "daemon" => Ok(Facility::LOG_DAEMON),
        "user" => Ok(Facility::LOG_USER),
        "local0" => Ok(Facility::LOG_LOCAL0),
        "local1" => Ok(Facility::LOG_LOCAL1),
        "local2" => Ok(Facility::LOG_LOCAL2),
        "local3" => Ok(Facility::LOG_LOCAL3),
        "local4" => Ok(Facility::LOG_LOCAL4),
        "local5" => Ok(Facility::LOG_LOCAL5),
        "local6" => Ok(Facility::LOG_LOCAL6),
        "local7" => Ok(Facility::LOG_LOCAL7),
        other => Err(DcError::config(format!("unknown syslog facility: {other}"))),
    }
}

pub fn spawn(name: impl Into<Arc<str>>, config: SyslogConfig) -> anyhow::Result<(WorkerHandle, WorkerControl)> {
    let name: Arc<str> = name.into();
    let (handle, rx) = new_input(name.clone(), config.channel_buffer_size);
    let (stop_tx, stop_rx) = flume::bounded(1);
    let task_name = name.clone();

    let formatter = Formatter3164 {
        facility: facility(&config.facility)?,
        hostname: None,
        process: "dnscollector".into(),
        pid: std::process::id(),
    };
    let mut writer = syslog::unix(formatter).map_err(|e| anyhow::anyhow!("connecting to syslog: {e}"))?;

    let join = tokio::spawn(async move {
        loop {
            tokio::select! {
                msg = rx.recv_async() => {
                    match msg {
                        Ok(dm) => {
                            let line = dm.string(
                                &["timestamp".into(), "identity".into(), "qname".into(), "rcode".into()],
                                " ",
                                "",
                            );
                            if let Err(e) = writer.info(line) {
                                warn!("syslog write failed: {e}");
                            }
                        }
                        Err(_) => return Ok(()),
                    }
                }
                _ = stop_rx.recv_async() => {
                    info!("syslog[{task_name}] stopping");
                    return Ok(());
                }
            }
        }
    });

    Ok((handle, WorkerControl::new(name, stop_tx, join)))
}
