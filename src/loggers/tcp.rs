//! Minimal TCP line sink: one text-rendered record per line, reconnecting
//! on failure (spec.md §4.H component share; a stripped-down sibling of the
//! dnstap sender's reconnect loop).

use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::config::loggers::TcpConfig;
use crate::worker::{new_input, WorkerControl, WorkerHandle};

pub fn spawn(name: impl Into<Arc<str>>, config: TcpConfig) -> (WorkerHandle, WorkerControl) {
    let name: Arc<str> = name.into();
    let (handle, rx) = new_input(name.clone(), config.channel_buffer_size);
    let (stop_tx, stop_rx) = flume::bounded(1);
    let task_name = name.clone();

    let join = tokio::spawn(async move {
        let addr = format!("{}:{}", config.remote_address, config.remote_port);
        let mut conn: Option<TcpStream> = None;

        loop {
            tokio::select! {
                msg = rx.recv_async() => {
                    let Ok(dm) = msg else { return Ok(()) };
                    let line = format!(
                        "{}\n",
                        dm.string(
                            &["timestamp".into(), "identity".into(), "qname".into(), "rcode".into()],
                            " ",
                            "",
                        )
                    );

                    loop {
                        if conn.is_none() {
                            match TcpStream::connect(&addr).await {
                                Ok(stream) => conn = Some(stream),
                                Err(e) => {
                                    warn!("tcp[{task_name}] connect to {addr} failed: {e}");
                                    tokio::time::sleep(Duration::from_secs(config.retry_interval_secs)).await;
                                    continue;
                                }
                            }
                        }

                        if let Some(stream) = conn.as_mut() {
                            if stream.write_all(line.as_bytes()).await.is_err() {
                                conn = None;
                                continue;
                            }
                        }
                        break;
                    }
                }
                _ = stop_rx.recv_async() => {
                    info!("tcp[{task_name}] stopping");
                    return Ok(());
                }
            }
        }
    });

    (handle, WorkerControl::new(name, stop_tx, join))
}
