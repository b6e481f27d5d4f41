//! The worker runtime: every collector, processor and logger is a task
//! plugged into a bounded input channel and a [`routing::RoutingHandler`]
//! (spec.md §4.B, §5).
//!
//! The lifecycle (`new -> configured -> running -> stopping -> terminated`)
//! and the stop/done handshake mirror the teacher's thread bookkeeping in
//! `server/serve.rs` (`ThreadHandleMap`, `flume::Sender<()>` stop signal,
//! `JoinHandle<anyhow::Result<()>>`), generalised from one DNS backend per
//! listen IP to an arbitrary worker graph.

pub mod routing;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use tokio::task::JoinHandle;

use crate::config::transformers::TransformsConfig;
use crate::dnsmessage::DNSMessage;

/// Default bound used when a collector/logger config omits
/// `channel_buffer_size` (spec.md §5).
pub const DEFAULT_CHANNEL_BUFFER_SIZE: usize = 512;

const DROP_MONITOR_INTERVAL: Duration = Duration::from_secs(10);

/// A named input a worker listens on, plus the bookkeeping needed to count
/// best-effort drops (§5, "listener -> processor" discipline).
#[derive(Clone)]
pub struct WorkerHandle {
    pub name: Arc<str>,
    sender: flume::Sender<DNSMessage>,
    dropped: Arc<AtomicU64>,
}

impl WorkerHandle {
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Best-effort, non-blocking send (listener -> processor discipline).
    /// Overflow increments the drop counter instead of blocking the caller.
    pub fn send_best_effort(&self, msg: DNSMessage) {
        if self.sender.try_send(msg).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Blocking send that still honors shutdown (processor -> sink
    /// discipline, §5). Returns `Ok(false)` if `stop` fired first.
    pub async fn send_blocking(
        &self,
        msg: DNSMessage,
        stop: &flume::Receiver<()>,
    ) -> anyhow::Result<bool> {
        tokio::select! {
            res = self.sender.send_async(msg) => {
                res?;
                Ok(true)
            }
            _ = stop.recv_async() => Ok(false),
        }
    }
}

/// Creates a worker's input side: a bounded channel plus the handle other
/// workers route into, and the receiver the worker's own run loop drains.
pub fn new_input(name: impl Into<Arc<str>>, buffer: usize) -> (WorkerHandle, flume::Receiver<DNSMessage>) {
    let (tx, rx) = flume::bounded(buffer);
    (
        WorkerHandle {
            name: name.into(),
            sender: tx,
            dropped: Arc::new(AtomicU64::new(0)),
        },
        rx,
    )
}

/// Spawns the 10-second drop-counter monitor task (mirrors
/// `Dnstap.MonitorCollector` in the original collector). Runs until `stop`
/// fires.
pub fn spawn_drop_monitor(handle: WorkerHandle, stop: flume::Receiver<()>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(DROP_MONITOR_INTERVAL);
        let mut last = 0u64;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let total = handle.dropped_count();
                    let delta = total - last;
                    if delta > 0 {
                        warn!("worker {}: dropped {delta} messages in the last 10s (total {total})", handle.name);
                    }
                    last = total;
                }
                _ = stop.recv_async() => {
                    info!("worker {}: drop monitor stopping", handle.name);
                    break;
                }
            }
        }
    })
}

/// Handle to a spawned worker task, used by the runtime to drive shutdown
/// in a controlled order.
pub struct WorkerControl {
    pub name: Arc<str>,
    stop_tx: flume::Sender<()>,
    join: JoinHandle<anyhow::Result<()>>,
    reload_tx: Option<flume::Sender<Arc<TransformsConfig>>>,
}

impl WorkerControl {
    pub fn new(name: Arc<str>, stop_tx: flume::Sender<()>, join: JoinHandle<anyhow::Result<()>>) -> Self {
        Self { name, stop_tx, join, reload_tx: None }
    }

    /// Attaches the `configReload` sender a collector exposed when it was
    /// spawned, so `reload` below has somewhere to deliver new config.
    pub fn with_reload(mut self, reload_tx: flume::Sender<Arc<TransformsConfig>>) -> Self {
        self.reload_tx = Some(reload_tx);
        self
    }

    /// Pushes a new transform config to the worker's single-reader
    /// `configReload` channel (spec.md §4.B). A no-op for workers that
    /// never registered one (loggers).
    pub fn reload(&self, config: Arc<TransformsConfig>) {
        if let Some(tx) = &self.reload_tx {
            let _ = tx.try_send(config);
        }
    }

    /// Requests shutdown and waits for the task to actually terminate
    /// (`stopping -> terminated`). Closing `stop_tx` rather than sending on
    /// it wakes every clone of the paired receiver at once, which is what
    /// lets a collector's accept loop and its in-flight connection tasks
    /// all observe the same stop signal.
    pub async fn stop(self) -> anyhow::Result<()> {
        drop(self.stop_tx);
        match self.join.await {
            Ok(result) => result,
            Err(join_err) if join_err.is_panic() => {
                Err(anyhow::anyhow!("worker {} panicked", self.name))
            }
            Err(join_err) => Err(join_err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn best_effort_send_drops_on_full_channel_without_blocking() {
        let (handle, _rx) = new_input("sink", 1);
        handle.send_best_effort(DNSMessage::new());
        handle.send_best_effort(DNSMessage::new());
        assert_eq!(handle.dropped_count(), 1);
    }

    #[tokio::test]
    async fn blocking_send_honors_stop_signal() {
        let (handle, _rx) = new_input("sink", 0);
        let (stop_tx, stop_rx) = flume::bounded(1);
        stop_tx.send(()).unwrap();
        let sent = handle.send_blocking(DNSMessage::new(), &stop_rx).await.unwrap();
        assert!(!sent);
    }
}
