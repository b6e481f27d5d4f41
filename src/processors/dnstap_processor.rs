//! Decodes a raw dnstap protobuf payload into a `DNSMessage` and applies
//! the post-decode normalization steps from `workers/dnsprocessor.go`
//! (timestamp derivation, CLIENT_RESPONSE swap + latency, qname cleanup).

use std::collections::HashMap;
use std::net::IpAddr;

use prost::Message as _;

use crate::constants::{self, DNSTAP_CLIENT_QUERY, DNSTAP_CLIENT_RESPONSE};
use crate::dnsmessage::{DNSMessage, DnsTap, DnstapOperation, Family, MessageDirection, NetworkInfo, Protocol};
use crate::error::{DcError, DcResult};
use crate::proto::dnstap as pb;

/// Tracks the last query time per (identity, query id) pair so a later
/// REPLY in the same stream can compute latency (invariant #2). Processors
/// are per-connection, so a single map scoped to the connection's lifetime
/// is sufficient, matching the original's in-memory pairing.
#[derive(Default)]
pub struct LatencyTracker {
    pending: HashMap<u16, f64>,
}

impl LatencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn pair(&mut self, id: u16, direction: MessageDirection, timestamp: f64) -> f64 {
        match direction {
            MessageDirection::Query => {
                self.pending.insert(id, timestamp);
                0.0
            }
            MessageDirection::Reply => self
                .pending
                .remove(&id)
                .map(|query_time| (timestamp - query_time).max(0.0))
                .unwrap_or(0.0),
        }
    }
}

/// Decodes one dnstap protobuf message and normalizes it into a
/// `DNSMessage`, ready for the transformer chain.
pub fn decode(raw: &[u8], identity_override: &str, latency: &mut LatencyTracker) -> DcResult<DNSMessage> {
    let envelope =
        pb::Dnstap::decode(raw).map_err(|e| DcError::msg(format!("invalid dnstap payload: {e}")))?;
    let message = envelope
        .message
        .ok_or_else(|| DcError::msg("dnstap envelope has no message"))?;

    let mut dm = DNSMessage::new();
    dm.dnstap.identity = if identity_override.is_empty() {
        envelope.identity.unwrap_or_default()
    } else {
        identity_override.to_string()
    };

    let msg_type = pb::message::Type::try_from(message.r#type).unwrap_or(pb::message::Type::ClientQuery);
    let (operation, direction, time_sec, time_nsec, payload) = match msg_type {
        pb::message::Type::ClientQuery | pb::message::Type::AuthQuery | pb::message::Type::ResolverQuery => (
            DnstapOperation::ClientQuery,
            MessageDirection::Query,
            message.query_time_sec.unwrap_or(0),
            message.query_time_nsec.unwrap_or(0),
            message.query_message.clone().unwrap_or_default(),
        ),
        _ => (
            DnstapOperation::ClientResponse,
            MessageDirection::Reply,
            message.response_time_sec.unwrap_or(0),
            message.response_time_nsec.unwrap_or(0),
            message.response_message.clone().unwrap_or_default(),
        ),
    };

    dm.dnstap.operation = operation;
    dm.dnstap.time_sec = time_sec;
    dm.dnstap.time_nsec = time_nsec;

    dm.network.family = match message.socket_family() {
        pb::SocketFamily::Inet6 => Family::Ipv6,
        pb::SocketFamily::Inet => Family::Ipv4,
    };
    dm.network.protocol = match message.socket_protocol() {
        pb::SocketProtocol::Udp => Protocol::Udp,
        pb::SocketProtocol::Tcp => Protocol::Tcp,
        pb::SocketProtocol::Dot => Protocol::Dot,
        pb::SocketProtocol::Doh => Protocol::Doh,
    };
    dm.network.query_ip = message.query_address.as_deref().and_then(to_ip);
    dm.network.response_ip = message.response_address.as_deref().and_then(to_ip);
    dm.network.query_port = message.query_port.unwrap_or(0) as u16;
    dm.network.response_port = message.response_port.unwrap_or(0) as u16;

    // Any response event gets its query/response pair swapped so query_ip
    // is always the client (invariant #4), whether it came from a
    // CLIENT_RESPONSE, AUTH_RESPONSE or RESOLVER_RESPONSE wire type.
    if direction == MessageDirection::Reply {
        dm.network.swap_query_response();
    }

    dm.dns.r#type = direction;
    dm.dns.length = payload.len() as u32;
    dm.dns.payload = payload.clone();

    match hickory_proto::op::Message::from_vec(&payload) {
        Ok(parsed) => {
            dm.dns.id = parsed.id();
            dm.dns.rcode = constants::rcode_to_string(parsed.response_code().low() as u16);
            if let Some(q) = parsed.queries().first() {
                dm.dns.qname = q.name().to_string().trim_end_matches('.').to_string();
                dm.dns.qtype = constants::qtype_to_string(u16::from(q.query_type()));
                dm.dns.annotate_public_suffix();
            }
            for answer in parsed.answers() {
                dm.dns.answers.push(crate::dnsmessage::DnsAnswer {
                    name: answer.name().to_string().trim_end_matches('.').to_string(),
                    rdatatype: constants::qtype_to_string(u16::from(answer.record_type())),
                    class: u16::from(answer.dns_class()),
                    ttl: answer.ttl(),
                    rdata: answer
                        .data()
                        .map(|d| d.to_string())
                        .unwrap_or_default(),
                });
            }
        }
        Err(_) => {
            dm.dns.malformed_packet = true;
        }
    }

    let timestamp = dm.dnstap.timestamp();
    dm.dnstap.latency = latency.pair(dm.dns.id, direction, timestamp);

    let _ = (DNSTAP_CLIENT_QUERY, DNSTAP_CLIENT_RESPONSE);
    Ok(dm)
}

fn to_ip(bytes: &[u8]) -> Option<IpAddr> {
    match bytes.len() {
        4 => Some(IpAddr::from(<[u8; 4]>::try_from(bytes).ok()?)),
        16 => Some(IpAddr::from(<[u8; 16]>::try_from(bytes).ok()?)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dnsmessage::wire;

    #[test]
    fn decode_round_trips_a_synthesised_query() {
        let mut dm = DNSMessage::new();
        dm.dnstap = DnsTap {
            identity: "collector-1".to_string(),
            time_sec: 100,
            time_nsec: 0,
            ..Default::default()
        };
        dm.dns.r#type = MessageDirection::Query;
        dm.dns.payload = vec![0, 1, 1, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0];
        dm.network = NetworkInfo {
            family: Family::Ipv4,
            protocol: Protocol::Udp,
            query_ip: Some("127.0.0.1".parse().unwrap()),
            query_port: 5000,
            response_ip: Some("127.0.0.2".parse().unwrap()),
            response_port: 53,
            ..Default::default()
        };

        let bytes = wire::to_dnstap(&dm);
        let mut tracker = LatencyTracker::new();
        let decoded = decode(&bytes, "", &mut tracker).unwrap();
        assert_eq!(decoded.dnstap.identity, "collector-1");
        assert_eq!(decoded.network.query_port, 5000);
    }

    #[test]
    fn identity_override_takes_precedence() {
        let mut dm = DNSMessage::new();
        dm.dnstap.identity = "from-wire".to_string();
        dm.dns.r#type = MessageDirection::Query;
        let bytes = wire::to_dnstap(&dm);
        let mut tracker = LatencyTracker::new();
        let decoded = decode(&bytes, "overridden", &mut tracker).unwrap();
        assert_eq!(decoded.dnstap.identity, "overridden");
    }
}
