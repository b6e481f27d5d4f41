//! The PowerDNS protobuf collector: a plain (or TLS) TCP listener carrying
//! 4-byte-length-prefixed `PBDNSMessage` frames, no framestream handshake
//! (spec.md §4.F, §6, grounded on `collectors/powerdns.go`).

use std::sync::Arc;

use log::{error, info, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};

use crate::config::collectors::PowerDnsCollectorConfig;
use crate::config::transformers::TransformsConfig;
use crate::error::DcError;
use crate::processors::powerdns_processor;
use crate::transformers::{Decision, TransformChain};
use crate::worker::routing::RoutingHandler;
use crate::worker::WorkerControl;

pub fn spawn(
    name: impl Into<Arc<str>>,
    config: PowerDnsCollectorConfig,
    routing: RoutingHandler,
) -> anyhow::Result<WorkerControl> {
    let name: Arc<str> = name.into();
    let (stop_tx, stop_rx) = flume::bounded(1);
    let (reload_tx, reload_rx): (flume::Sender<Arc<TransformsConfig>>, flume::Receiver<Arc<TransformsConfig>>) =
        flume::bounded(1);
    let task_name = name.clone();

    let join = tokio::spawn(async move {
        let addr = format!("{}:{}", config.listen_ip, config.listen_port);
        let listener = TcpListener::bind(&addr).await?;
        info!("powerdns[{task_name}] listening on {addr}");

        let tls_config = if config.tls_support {
            let cert = config
                .cert_file
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("tls_support set without cert_file"))?;
            let key = config
                .key_file
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("tls_support set without key_file"))?;
            Some(crate::tls::server_config(cert, key, &config.tls_min_version)?)
        } else {
            None
        };
        let acceptor = tls_config.map(tokio_rustls::TlsAcceptor::from);
        let quiet_text = config.quiet_text;
        let rcv_buf_size = config.rcv_buf_size;

        let transforms = Arc::new(tokio::sync::Mutex::new(TransformChain::from_config(&config.transforms)?));

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = accepted?;
                    tune_socket(&stream, rcv_buf_size);
                    let routing = routing.clone();
                    let transforms = transforms.clone();
                    let acceptor = acceptor.clone();
                    let stop_rx = stop_rx.clone();
                    tokio::spawn(async move {
                        if let Some(acceptor) = acceptor {
                            match acceptor.accept(stream).await {
                                Ok(tls_stream) => {
                                    handle_conn(tls_stream, peer.to_string(), routing, transforms, quiet_text, stop_rx).await
                                }
                                Err(e) => error!("powerdns tls handshake with {peer} failed: {e}"),
                            }
                        } else {
                            handle_conn(stream, peer.to_string(), routing, transforms, quiet_text, stop_rx).await
                        }
                    });
                }
                reload = reload_rx.recv_async() => {
                    let Ok(new_config) = reload else { continue };
                    match TransformChain::from_config(&new_config) {
                        Ok(rebuilt) => {
                            *transforms.lock().await = rebuilt;
                            info!("powerdns[{task_name}] transform chain reloaded");
                        }
                        Err(e) => warn!("powerdns[{task_name}] reload rejected: {e}"),
                    }
                }
                _ = stop_rx.recv_async() => {
                    info!("powerdns collector stopping");
                    return Ok(());
                }
            }
        }
    });

    Ok(WorkerControl::new(name, stop_tx, join).with_reload(reload_tx))
}

fn tune_socket(stream: &TcpStream, rcv_buf_size: Option<usize>) {
    if let Some(size) = rcv_buf_size {
        let sock = socket2::SockRef::from(stream);
        if let Err(e) = sock.set_recv_buffer_size(size) {
            warn!("powerdns: failed to set SO_RCVBUF to {size}: {e}");
        }
    }
}

async fn handle_conn<S: AsyncRead + AsyncWrite + Unpin>(
    mut stream: S,
    peer: String,
    routing: RoutingHandler,
    transforms: Arc<tokio::sync::Mutex<TransformChain>>,
    quiet_text: bool,
    stop_rx: flume::Receiver<()>,
) {
    info!("powerdns: new connection from {peer}");
    loop {
        match read_frame(&mut stream).await {
            Ok(Some(payload)) => match powerdns_processor::decode(&payload, &peer, quiet_text) {
                Ok(mut dm) => {
                    let decision = transforms.lock().await.process(&mut dm);
                    match decision {
                        Decision::Keep => routing.send_default(&dm, &stop_rx).await,
                        Decision::Drop => routing.send_dropped(&dm, &stop_rx).await,
                    }
                }
                Err(e) => warn!("powerdns decode error from {peer}: {e}"),
            },
            Ok(None) => {
                info!("powerdns: connection closed by {peer}");
                break;
            }
            Err(e) => {
                warn!("powerdns connection error from {peer}: {e}");
                break;
            }
        }
    }
}

async fn read_frame<S: AsyncRead + Unpin>(stream: &mut S) -> Result<Option<Vec<u8>>, DcError> {
    let mut len_buf = [0u8; 4];
    match stream.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len_buf);
    let mut body = vec![0u8; len as usize];
    stream.read_exact(&mut body).await?;
    Ok(Some(body))
}
