//! The dnstap (framestream) collector: accepts TCP/TLS/Unix connections,
//! performs the Frame Streams handshake per connection, and forwards
//! decoded records to the worker graph (spec.md §4.E, grounded on
//! `collectors/dnstap.go`).
//!
//! Each connection only decodes frames off the wire; decoded records are
//! handed to a single shared processor task over a bounded channel using
//! the best-effort discipline (§4.E step 3b/3c, §5), so a slow transform
//! chain sheds load from the busiest connections first instead of stalling
//! every reader socket.

use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream, UnixListener};

use crate::config::collectors::DnstapCollectorConfig;
use crate::config::transformers::TransformsConfig;
use crate::framestream::server as fs_server;
use crate::processors::dnstap_processor::{self, LatencyTracker};
use crate::transformers::{Decision, TransformChain};
use crate::worker::routing::RoutingHandler;
use crate::worker::{spawn_drop_monitor, WorkerControl, WorkerHandle};

pub fn spawn(
    name: impl Into<Arc<str>>,
    config: DnstapCollectorConfig,
    routing: RoutingHandler,
) -> anyhow::Result<WorkerControl> {
    let name: Arc<str> = name.into();
    let (stop_tx, stop_rx) = flume::bounded(1);
    let (reload_tx, reload_rx) = flume::bounded(1);

    let join = tokio::spawn(run(name.clone(), config, routing, stop_rx, reload_rx));

    Ok(WorkerControl::new(name, stop_tx, join).with_reload(reload_tx))
}

async fn run(
    name: Arc<str>,
    config: DnstapCollectorConfig,
    routing: RoutingHandler,
    stop_rx: flume::Receiver<()>,
    reload_rx: flume::Receiver<Arc<TransformsConfig>>,
) -> anyhow::Result<()> {
    let transforms = TransformChain::from_config(&config.transforms)?;
    let (processor_handle, processor_rx) =
        crate::worker::new_input(format!("{name}-processor"), config.channel_buffer_size);

    let (monitor_stop_tx, monitor_stop_rx) = flume::bounded(1);
    let monitor = spawn_drop_monitor(processor_handle.clone(), monitor_stop_rx);
    let processor_task = tokio::spawn(run_processor(
        processor_rx,
        routing.clone(),
        transforms,
        stop_rx.clone(),
        reload_rx,
    ));

    let tls_config = if config.tls_support {
        let cert = config.cert_file.as_deref().ok_or_else(|| anyhow::anyhow!("tls_support set without cert_file"))?;
        let key = config.key_file.as_deref().ok_or_else(|| anyhow::anyhow!("tls_support set without key_file"))?;
        Some(crate::tls::server_config(cert, key, &config.tls_min_version)?)
    } else {
        None
    };

    let result = if let Some(sock_path) = &config.sock_path {
        let listener = UnixListener::bind(sock_path)?;
        info!("dnstap[{name}] listening on unix:{sock_path}");
        accept_loop_unix(listener, processor_handle, stop_rx).await
    } else {
        let addr = format!("{}:{}", config.listen_ip, config.listen_port);
        let listener = TcpListener::bind(&addr).await?;
        info!("dnstap[{name}] listening on {addr}");
        accept_loop_tcp(listener, tls_config, processor_handle, config.rcv_buf_size, config.reset_conn, stop_rx).await
    };

    let _ = monitor_stop_tx.send(());
    let _ = monitor.await;
    let _ = processor_task.await;
    result
}

/// Drains decoded records fed by every live connection, applies the
/// transform chain and routes the outcome. Owned exclusively by this task,
/// so a `configReload` just swaps it in between messages (§4.B, §5 ordering:
/// a reload takes effect before the next record is processed).
async fn run_processor(
    rx: flume::Receiver<crate::dnsmessage::DNSMessage>,
    routing: RoutingHandler,
    mut transforms: TransformChain,
    stop_rx: flume::Receiver<()>,
    reload_rx: flume::Receiver<Arc<TransformsConfig>>,
) {
    loop {
        tokio::select! {
            msg = rx.recv_async() => {
                let Ok(mut dm) = msg else { return };
                match transforms.process(&mut dm) {
                    Decision::Keep => routing.send_default(&dm, &stop_rx).await,
                    Decision::Drop => routing.send_dropped(&dm, &stop_rx).await,
                }
            }
            reload = reload_rx.recv_async() => {
                let Ok(new_config) = reload else { continue };
                match TransformChain::from_config(&new_config) {
                    Ok(rebuilt) => {
                        transforms = rebuilt;
                        info!("dnstap processor: transform chain reloaded");
                    }
                    Err(e) => warn!("dnstap processor: reload rejected: {e}"),
                }
            }
            _ = stop_rx.recv_async() => return,
        }
    }
}

fn tune_socket(stream: &TcpStream, rcv_buf_size: Option<usize>, reset_conn: bool) {
    let sock = socket2::SockRef::from(stream);
    if let Some(size) = rcv_buf_size {
        if let Err(e) = sock.set_recv_buffer_size(size) {
            warn!("dnstap: failed to set SO_RCVBUF to {size}: {e}");
        }
    }
    if reset_conn {
        if let Err(e) = sock.set_linger(Some(Duration::ZERO)) {
            warn!("dnstap: failed to enable reset-on-close: {e}");
        }
    }
}

async fn accept_loop_tcp(
    listener: TcpListener,
    tls_config: Option<Arc<rustls::ServerConfig>>,
    processor_handle: WorkerHandle,
    rcv_buf_size: Option<usize>,
    reset_conn: bool,
    stop_rx: flume::Receiver<()>,
) -> anyhow::Result<()> {
    let acceptor = tls_config.map(tokio_rustls::TlsAcceptor::from);
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = accepted?;
                tune_socket(&stream, rcv_buf_size, reset_conn);
                let processor_handle = processor_handle.clone();
                let acceptor = acceptor.clone();
                tokio::spawn(async move {
                    if let Some(acceptor) = acceptor {
                        match acceptor.accept(stream).await {
                            Ok(tls_stream) => handle_conn(tls_stream, processor_handle).await,
                            Err(e) => error!("dnstap tls handshake with {peer} failed: {e}"),
                        }
                    } else {
                        handle_conn(stream, processor_handle).await
                    }
                });
            }
            _ = stop_rx.recv_async() => {
                info!("dnstap collector stopping");
                return Ok(());
            }
        }
    }
}

async fn accept_loop_unix(
    listener: UnixListener,
    processor_handle: WorkerHandle,
    stop_rx: flume::Receiver<()>,
) -> anyhow::Result<()> {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, _) = accepted?;
                let processor_handle = processor_handle.clone();
                tokio::spawn(handle_conn(stream, processor_handle));
            }
            _ = stop_rx.recv_async() => {
                info!("dnstap collector stopping");
                return Ok(());
            }
        }
    }
}

async fn handle_conn<S: AsyncRead + AsyncWrite + Unpin>(mut stream: S, processor_handle: WorkerHandle) {
    if let Err(e) = fs_server::accept_handshake(&mut stream, fs_server::DNSTAP_CONTENT_TYPE).await {
        warn!("dnstap handshake failed: {e}");
        return;
    }

    let mut latency = LatencyTracker::new();
    loop {
        match fs_server::next_frame(&mut stream).await {
            Ok(Some(payload)) => match dnstap_processor::decode(&payload, "", &mut latency) {
                Ok(dm) => processor_handle.send_best_effort(dm),
                Err(e) => warn!("dnstap decode error: {e}"),
            },
            Ok(None) => break,
            Err(e) => {
                warn!("dnstap connection error: {e}");
                break;
            }
        }
    }
}
