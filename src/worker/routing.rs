//! Ordered fan-out to a worker's declared default/dropped routes
//! (spec.md §4.C). Order is the order routes were declared in the config's
//! `routes` section, not a `HashMap` iteration order, so downstream
//! side effects (e.g. two loggers with the same payload) stay reproducible.

use crate::dnsmessage::DNSMessage;
use crate::worker::WorkerHandle;

#[derive(Clone, Default)]
pub struct RoutingHandler {
    default: Vec<WorkerHandle>,
    dropped: Vec<WorkerHandle>,
}

impl RoutingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_default_route(&mut self, handle: WorkerHandle) {
        self.default.push(handle);
    }

    pub fn add_dropped_route(&mut self, handle: WorkerHandle) {
        self.dropped.push(handle);
    }

    pub fn has_default_routes(&self) -> bool {
        !self.default.is_empty()
    }

    /// Fans the message out to every default route, in declared order, using
    /// the blocking-with-stop discipline (§4.C, §5): processor -> sink
    /// delivery must push backpressure upstream rather than drop silently.
    pub async fn send_default(&self, msg: &DNSMessage, stop: &flume::Receiver<()>) {
        for route in &self.default {
            let _ = route.send_blocking(msg.clone(), stop).await;
        }
    }

    /// Fans a message dropped by the transformer chain out to every dropped
    /// route, in declared order, under the same discipline as `send_default`.
    pub async fn send_dropped(&self, msg: &DNSMessage, stop: &flume::Receiver<()>) {
        for route in &self.dropped {
            let _ = route.send_blocking(msg.clone(), stop).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::new_input;

    #[tokio::test]
    async fn fans_out_to_every_default_route_in_declared_order() {
        let (h1, r1) = new_input("a", 4);
        let (h2, r2) = new_input("b", 4);
        let mut routing = RoutingHandler::new();
        routing.add_default_route(h1);
        routing.add_default_route(h2);
        let (_stop_tx, stop_rx) = flume::bounded(1);

        routing.send_default(&DNSMessage::new(), &stop_rx).await;

        assert!(r1.try_recv().is_ok());
        assert!(r2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn dropped_route_only_receives_dropped_sends() {
        let (default_h, default_r) = new_input("default", 4);
        let (dropped_h, dropped_r) = new_input("dropped", 4);
        let mut routing = RoutingHandler::new();
        routing.add_default_route(default_h);
        routing.add_dropped_route(dropped_h);
        let (_stop_tx, stop_rx) = flume::bounded(1);

        routing.send_dropped(&DNSMessage::new(), &stop_rx).await;

        assert!(default_r.try_recv().is_err());
        assert!(dropped_r.try_recv().is_ok());
    }

    #[tokio::test]
    async fn send_default_returns_early_once_stop_fires() {
        let (h, r) = new_input("a", 0);
        let mut routing = RoutingHandler::new();
        routing.add_default_route(h);
        let (stop_tx, stop_rx) = flume::bounded(1);
        drop(stop_tx);

        routing.send_default(&DNSMessage::new(), &stop_rx).await;

        assert!(r.try_recv().is_err());
    }
}
