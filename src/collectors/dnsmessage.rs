//! The `dnsmessage` collector: turns newline-delimited qnames read from
//! stdin into a stream of minimal `DNSMessage` records, gated by an
//! include/exclude matching rule set (spec.md §4.A, grounded on
//! `collectors/dnsmessage.go`'s `MatchSource`-driven include/exclude
//! split). Richer line formats are out of this collector's scope per
//! spec.md §1.

use std::sync::Arc;

use log::{info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::config::collectors::DnsMessageCollectorConfig;
use crate::config::transformers::TransformsConfig;
use crate::dnsmessage::DNSMessage;
use crate::transformers::{Decision, TransformChain};
use crate::worker::routing::RoutingHandler;
use crate::worker::WorkerControl;

pub fn spawn(
    name: impl Into<Arc<str>>,
    config: DnsMessageCollectorConfig,
    routing: RoutingHandler,
) -> anyhow::Result<WorkerControl> {
    let name: Arc<str> = name.into();
    let (stop_tx, stop_rx) = flume::bounded(1);
    let (reload_tx, reload_rx): (flume::Sender<Arc<TransformsConfig>>, flume::Receiver<Arc<TransformsConfig>>) =
        flume::bounded(1);
    let task_name = name.clone();

    let join = tokio::spawn(async move {
        let mut transforms = TransformChain::from_config(&config.transforms)?;
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(qname) = line? else {
                        info!("dnsmessage[{task_name}]: input closed");
                        return Ok(());
                    };
                    if qname.is_empty() {
                        continue;
                    }

                    let mut dm = DNSMessage::new();
                    dm.dns.qname = qname;

                    let included = config.matching.include.is_empty()
                        || dm.matching(&config.matching.include)?;
                    let excluded = !config.matching.exclude.is_empty()
                        && dm.matching(&config.matching.exclude)?;
                    if !included || excluded {
                        continue;
                    }

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
                            info!("dnsmessage[{task_name}] transform chain reloaded");
                        }
                        Err(e) => warn!("dnsmessage[{task_name}] reload rejected: {e}"),
                    }
                }
                _ = stop_rx.recv_async() => {
                    info!("dnsmessage[{task_name}] stopping");
                    return Ok(());
                }
            }
        }
    });

    Ok(WorkerControl::new(name, stop_tx, join).with_reload(reload_tx))
}
