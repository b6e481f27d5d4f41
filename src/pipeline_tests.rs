//! End-to-end pipeline tests wiring a processor, the transformer chain and
//! [`RoutingHandler`] together without any network I/O, exercising the
//! same path the collectors drive per-connection.

use hickory_proto::op::{Message as DnsWireMessage, MessageType, Query};
use hickory_proto::rr::{DNSClass, Name, RecordType};

use crate::config::transformers::{FilteringConfig, NormalizeConfig, TransformsConfig};
use crate::dnsmessage::{DNSMessage, DnsTap, Family, MessageDirection, NetworkInfo, Protocol};
use crate::processors::dnstap_processor::{self, LatencyTracker};
use crate::transformers::{Decision, TransformChain};
use crate::worker::new_input;
use crate::worker::routing::RoutingHandler;

fn synth_dnstap_query(qname: &str) -> Vec<u8> {
    let name = Name::from_ascii(qname).unwrap();
    let mut query = Query::new();
    query.set_name(name).set_query_type(RecordType::A).set_query_class(DNSClass::IN);

    let mut wire = DnsWireMessage::new();
    wire.set_id(42).set_message_type(MessageType::Query).add_query(query);
    let payload = wire.to_vec().unwrap();

    let mut dm = DNSMessage::new();
    dm.dnstap = DnsTap {
        identity: "unit-test".to_string(),
        ..Default::default()
    };
    dm.dns.r#type = MessageDirection::Query;
    dm.dns.payload = payload;
    dm.network = NetworkInfo {
        family: Family::Ipv4,
        protocol: Protocol::Udp,
        query_ip: Some("127.0.0.1".parse().unwrap()),
        query_port: 5000,
        response_ip: Some("127.0.0.2".parse().unwrap()),
        response_port: 53,
        ..Default::default()
    };

    crate::dnsmessage::wire::to_dnstap(&dm)
}

#[tokio::test]
async fn query_flows_from_decode_through_keep_routing() {
    let raw = synth_dnstap_query("WWW.Example.COM.");
    let mut latency = LatencyTracker::new();
    let mut dm = dnstap_processor::decode(&raw, "", &mut latency).unwrap();

    let mut config = TransformsConfig::default();
    config.normalize = Some(NormalizeConfig { qname_lowercase: true });
    let mut chain = TransformChain::from_config(&config).unwrap();

    let (default_handle, default_rx) = new_input("default-out", 4);
    let (dropped_handle, dropped_rx) = new_input("dropped-out", 4);
    let mut routing = RoutingHandler::new();
    routing.add_default_route(default_handle);
    routing.add_dropped_route(dropped_handle);
    let (_stop_tx, stop_rx) = flume::bounded(1);

    match chain.process(&mut dm) {
        Decision::Keep => routing.send_default(&dm, &stop_rx).await,
        Decision::Drop => routing.send_dropped(&dm, &stop_rx).await,
    }

    let routed = default_rx.try_recv().expect("record should have been routed to the default sink");
    assert_eq!(routed.dns.qname, "www.example.com");
    assert!(dropped_rx.try_recv().is_err());
}

#[tokio::test]
async fn filtered_rcode_flows_to_the_dropped_route() {
    let raw = synth_dnstap_query("blocked.example.com.");
    let mut latency = LatencyTracker::new();
    let mut dm = dnstap_processor::decode(&raw, "", &mut latency).unwrap();
    dm.dns.rcode = "REFUSED".to_string();

    let mut config = TransformsConfig::default();
    config.filtering = Some(FilteringConfig {
        log_queries: true,
        log_replies: true,
        drop_rcodes: vec!["REFUSED".to_string()],
        ..Default::default()
    });
    let mut chain = TransformChain::from_config(&config).unwrap();

    let (default_handle, default_rx) = new_input("default-out", 4);
    let (dropped_handle, dropped_rx) = new_input("dropped-out", 4);
    let mut routing = RoutingHandler::new();
    routing.add_default_route(default_handle);
    routing.add_dropped_route(dropped_handle);
    let (_stop_tx, stop_rx) = flume::bounded(1);

    match chain.process(&mut dm) {
        Decision::Keep => routing.send_default(&dm, &stop_rx).await,
        Decision::Drop => routing.send_dropped(&dm, &stop_rx).await,
    }

    assert!(default_rx.try_recv().is_err());
    assert!(dropped_rx.try_recv().is_ok());
}
