//! Reconnecting dnstap (framestream) sender, ported from
//! `loggers/dnstapclient.go`: a connection loop that reconnects on
//! failure, a buffer flushed on size-or-timer, and an `fsReady` gate that
//! drops records while disconnected rather than blocking upstream.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, UnixStream};

use crate::config::loggers::DnstapSenderConfig;
use crate::dnsmessage::{wire, DNSMessage};
use crate::framestream::client as fs_client;
use crate::framestream::server::DNSTAP_CONTENT_TYPE;
use crate::worker::{new_input, WorkerControl, WorkerHandle};

/// A connected transport the sender can write frames over, hiding the
/// TCP/TLS/Unix distinction from the buffer-flush logic.
trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Transport for T {}

pub fn spawn(name: impl Into<Arc<str>>, config: DnstapSenderConfig) -> DcResultSpawn {
    let name: Arc<str> = name.into();
    let (handle, rx) = new_input(name.clone(), config.channel_buffer_size);
    let (stop_tx, stop_rx) = flume::bounded(1);
    let task_name = name.clone();
    let ready = Arc::new(AtomicBool::new(false));

    let tls_config = if config.tls_support {
        Some(crate::tls::client_config(
            config.ca_file.as_deref(),
            &config.tls_min_version,
            config.tls_insecure,
        )?)
    } else {
        None
    };

    let join = tokio::spawn(async move {
        let mut buffer: Vec<DNSMessage> = Vec::with_capacity(config.buffer_size);
        let mut flush_timer = tokio::time::interval(Duration::from_secs(config.flush_interval_secs));
        let mut retry_timer = tokio::time::interval(Duration::from_secs(config.retry_interval_secs));
        let mut conn: Option<Box<dyn Transport>> = None;

        loop {
            tokio::select! {
                msg = rx.recv_async() => {
                    let Ok(mut dm) = msg else { return Ok(()) };
                    if !ready.load(Ordering::Relaxed) {
                        // fsReady gate: drop while disconnected rather than
                        // blocking the processor feeding this sink.
                        continue;
                    }
                    if config.overwrite_identity {
                        if let Some(server_id) = &config.server_id {
                            dm.dnstap.identity = server_id.clone();
                        }
                    }
                    buffer.push(dm);
                    if buffer.len() >= config.buffer_size {
                        flush(&mut conn, &mut buffer, &ready, &config, tls_config.as_ref(), &task_name).await;
                    }
                }
                _ = flush_timer.tick() => {
                    if !buffer.is_empty() {
                        flush(&mut conn, &mut buffer, &ready, &config, tls_config.as_ref(), &task_name).await;
                    }
                }
                _ = retry_timer.tick() => {
                    // Reconnect attempts are paced independently of the
                    // flush cadence, per `retryInterval`.
                    if conn.is_none() {
                        conn = try_connect(&ready, &config, tls_config.as_ref(), &task_name).await;
                    }
                }
                _ = stop_rx.recv_async() => {
                    if !buffer.is_empty() {
                        flush(&mut conn, &mut buffer, &ready, &config, tls_config.as_ref(), &task_name).await;
                    }
                    if let Some(mut stream) = conn.take() {
                        let _ = fs_client::send_stop(&mut stream).await;
                    }
                    info!("dnstap sender[{task_name}] stopping");
                    return Ok(());
                }
            }
        }
    });

    Ok((handle, WorkerControl::new(name, stop_tx, join)))
}

type DcResultSpawn = anyhow::Result<(WorkerHandle, WorkerControl)>;

async fn try_connect(
    ready: &Arc<AtomicBool>,
    config: &DnstapSenderConfig,
    tls_config: Option<&Arc<rustls::ClientConfig>>,
    name: &str,
) -> Option<Box<dyn Transport>> {
    let raw: Box<dyn Transport> = if let Some(sock_path) = &config.sock_path {
        match UnixStream::connect(sock_path).await {
            Ok(stream) => Box::new(stream),
            Err(e) => {
                warn!("dnstap sender[{name}] connect to unix:{sock_path} failed: {e}");
                return None;
            }
        }
    } else {
        let addr = format!("{}:{}", config.remote_address, config.remote_port);
        let connected = tokio::time::timeout(
            Duration::from_secs(config.connect_timeout_secs),
            TcpStream::connect(&addr),
        )
        .await;
        match connected {
            Ok(Ok(stream)) => {
                if let Some(tls_config) = tls_config {
                    let connector = tokio_rustls::TlsConnector::from(tls_config.clone());
                    let server_name = match rustls::pki_types::ServerName::try_from(config.remote_address.clone()) {
                        Ok(n) => n,
                        Err(e) => {
                            warn!("dnstap sender[{name}] invalid server name {}: {e}", config.remote_address);
                            return None;
                        }
                    };
                    match connector.connect(server_name, stream).await {
                        Ok(tls_stream) => Box::new(tls_stream),
                        Err(e) => {
                            warn!("dnstap sender[{name}] tls handshake with {addr} failed: {e}");
                            return None;
                        }
                    }
                } else {
                    Box::new(stream)
                }
            }
            Ok(Err(e)) => {
                warn!("dnstap sender[{name}] connect to {addr} failed: {e}");
                return None;
            }
            Err(_) => {
                warn!("dnstap sender[{name}] connect to {addr} timed out");
                return None;
            }
        }
    };

    let mut raw = raw;
    match fs_client::connect_handshake(&mut raw, DNSTAP_CONTENT_TYPE).await {
        Ok(()) => {
            info!("dnstap sender[{name}] connected");
            ready.store(true, Ordering::Relaxed);
            Some(raw)
        }
        Err(e) => {
            warn!("dnstap sender[{name}] handshake failed: {e}");
            None
        }
    }
}

async fn flush(
    conn: &mut Option<Box<dyn Transport>>,
    buffer: &mut Vec<DNSMessage>,
    ready: &Arc<AtomicBool>,
    config: &DnstapSenderConfig,
    tls_config: Option<&Arc<rustls::ClientConfig>>,
    name: &str,
) {
    if conn.is_none() {
        *conn = try_connect(ready, config, tls_config, name).await;
    }
    let Some(stream) = conn.as_mut() else {
        buffer.clear();
        return;
    };

    for dm in buffer.drain(..) {
        let encoded = wire::to_dnstap(&dm);
        if let Err(e) = fs_client::send_frame(stream.as_mut(), &encoded).await {
            warn!("dnstap sender[{name}] send failed: {e}");
            ready.store(false, Ordering::Relaxed);
            *conn = None;
            break;
        }
    }
}
