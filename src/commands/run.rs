//! Wires workers together from [`Config`] and drives the run loop until a
//! termination signal arrives (spec.md §4.B, §6, grounded on
//! `server/serve.rs`'s accept-loop/`Stop` pair, generalised from one
//! backend per listen IP to an arbitrary collector/logger graph).
//!
//! Worker names follow the `<kind>-in` / `<kind>-out` convention used by
//! the `routes` section of the config (a collector's route entry names the
//! loggers it feeds).

use std::collections::HashMap;
use std::sync::Arc;

use clap::Parser;
use log::{info, warn};

use crate::collectors;
use crate::config::{self, Config};
use crate::loggers;
use crate::worker::routing::RoutingHandler;
use crate::worker::{WorkerControl, WorkerHandle};

#[derive(Parser, Debug)]
pub struct Run {
    /// Path to the YAML config file.
    #[arg(value_name = "PATH")]
    pub config_path: String,
}

impl Run {
    pub async fn exec(&self) -> anyhow::Result<()> {
        let config = config::load_config(&self.config_path)?;
        run(config, self.config_path.clone()).await
    }
}

async fn run(config: Config, config_path: String) -> anyhow::Result<()> {
    let mut sinks: HashMap<String, WorkerHandle> = HashMap::new();
    let mut controls: Vec<WorkerControl> = Vec::new();

    if let Some(cfg) = config.loggers.stdout.clone() {
        let (handle, control) = loggers::stdout::spawn("stdout-out", cfg);
        sinks.insert("stdout-out".to_string(), handle);
        controls.push(control);
    }
    if let Some(cfg) = config.loggers.syslog.clone() {
        let (handle, control) = loggers::syslog::spawn("syslog-out", cfg)?;
        sinks.insert("syslog-out".to_string(), handle);
        controls.push(control);
    }
    if let Some(cfg) = config.loggers.tcp.clone() {
        let (handle, control) = loggers::tcp::spawn("tcp-out", cfg);
        sinks.insert("tcp-out".to_string(), handle);
        controls.push(control);
    }
    if let Some(cfg) = config.loggers.dnstap.clone() {
        let (handle, control) = loggers::dnstap_sender::spawn("dnstap-out", cfg)?;
        sinks.insert("dnstap-out".to_string(), handle);
        controls.push(control);
    }

    let routing_for = |name: &str| -> RoutingHandler {
        let mut routing = RoutingHandler::new();
        let Some(route) = config.routes.get(name) else {
            return routing;
        };
        for target in &route.default {
            match sinks.get(target) {
                Some(handle) => routing.add_default_route(handle.clone()),
                None => warn!("route {name}: unknown default sink {target}"),
            }
        }
        for target in &route.dropped {
            match sinks.get(target) {
                Some(handle) => routing.add_dropped_route(handle.clone()),
                None => warn!("route {name}: unknown dropped sink {target}"),
            }
        }
        routing
    };

    // Index into `controls` for every collector, so a SIGHUP reload can
    // find the worker that owns each kind's transform chain.
    let mut collector_controls: Vec<(&'static str, usize)> = Vec::new();

    if let Some(cfg) = config.collectors.dnstap.clone() {
        let routing = routing_for("dnstap-in");
        controls.push(collectors::dnstap::spawn("dnstap-in", cfg, routing)?);
        collector_controls.push(("dnstap-in", controls.len() - 1));
    }
    if let Some(cfg) = config.collectors.powerdns.clone() {
        let routing = routing_for("powerdns-in");
        controls.push(collectors::powerdns::spawn("powerdns-in", cfg, routing)?);
        collector_controls.push(("powerdns-in", controls.len() - 1));
    }
    if let Some(cfg) = config.collectors.dnsmessage.clone() {
        let routing = routing_for("dnsmessage-in");
        controls.push(collectors::dnsmessage::spawn("dnsmessage-in", cfg, routing)?);
        collector_controls.push(("dnsmessage-in", controls.len() - 1));
    }

    run_until_stopped(&config_path, &controls, &collector_controls).await?;
    info!("shutdown signal received, stopping workers");

    for control in controls {
        let name = control.name.clone();
        if let Err(e) = control.stop().await {
            warn!("worker {name} stopped with error: {e}");
        }
    }

    Ok(())
}

/// Blocks until SIGTERM or SIGINT. Each SIGHUP instead re-reads
/// `config_path` and pushes the reloaded transform chain to every live
/// collector over its `configReload` channel (spec.md §3, §4.B); the new
/// rules take effect before that collector's next record (§5 ordering, S6).
async fn run_until_stopped(
    config_path: &str,
    controls: &[WorkerControl],
    collector_controls: &[(&'static str, usize)],
) -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sighup = signal(SignalKind::hangup())?;

    loop {
        tokio::select! {
            _ = sigterm.recv() => return Ok(()),
            _ = sigint.recv() => return Ok(()),
            _ = sighup.recv() => {
                info!("SIGHUP received, reloading {config_path}");
                match config::load_config(config_path) {
                    Ok(new_config) => {
                        for (name, idx) in collector_controls {
                            let transforms = match *name {
                                "dnstap-in" => new_config.collectors.dnstap.as_ref().map(|c| c.transforms.clone()),
                                "powerdns-in" => new_config.collectors.powerdns.as_ref().map(|c| c.transforms.clone()),
                                "dnsmessage-in" => new_config.collectors.dnsmessage.as_ref().map(|c| c.transforms.clone()),
                                _ => None,
                            };
                            if let Some(transforms) = transforms {
                                controls[*idx].reload(Arc::new(transforms));
                            } else {
                                warn!("config reload: {name} missing from reloaded config, keeping old rules");
                            }
                        }
                    }
                    Err(e) => warn!("config reload failed: {e}"),
                }
            }
        }
    }
}
