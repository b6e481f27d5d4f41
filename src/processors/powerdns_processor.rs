//! Decodes a PowerDNS `PBDNSMessage` protobuf payload into a `DNSMessage`,
//! ported from `collectors/powerdns_processor.go`. Unlike dnstap, each
//! length-prefixed payload is a self-contained query or response (no
//! separate handshake), and latency/id pairing come from the message
//! itself rather than a connection-scoped tracker.

use std::net::IpAddr;

use prost::Message as _;

use crate::constants;
use crate::dnsmessage::{DNSMessage, MessageDirection, NetworkInfo};
use crate::error::{DcError, DcResult};
use crate::proto::pdns as pb;

/// Quiet-text mapping for `Q`/`R` direction labels, applied when the
/// collector config sets `quiet_text: true`. A REDESIGN FLAG promoted this
/// from a package-level global in the original into per-collector config.
pub fn quiet_label(direction: MessageDirection, quiet: bool) -> String {
    if quiet {
        direction.quiet().to_string()
    } else {
        direction.as_str().to_string()
    }
}

pub fn decode(raw: &[u8], peer_name: &str, quiet_text: bool) -> DcResult<DNSMessage> {
    let pbmsg = pb::PbdnsMessage::decode(raw)
        .map_err(|e| DcError::msg(format!("invalid powerdns protobuf payload: {e}")))?;

    let mut dm = DNSMessage::new();
    dm.dnstap.identity = pbmsg
        .server_identity
        .as_ref()
        .map(|b| String::from_utf8_lossy(b).into_owned())
        .unwrap_or_else(|| peer_name.to_string());

    let msg_type = pb::pbdns_message::Type::try_from(pbmsg.r#type)
        .unwrap_or(pb::pbdns_message::Type::DnsQueryType);
    let direction = match msg_type {
        pb::pbdns_message::Type::DnsQueryType | pb::pbdns_message::Type::DnsOutgoingQueryType => {
            MessageDirection::Query
        }
        _ => MessageDirection::Reply,
    };
    dm.dns.r#type = direction;

    dm.dnstap.time_sec = pbmsg.time_sec.unwrap_or(0) as u64;
    dm.dnstap.time_nsec = pbmsg.time_usec.unwrap_or(0) * 1000;

    let mut network = NetworkInfo::default();
    let from_ip = pbmsg.from.as_deref().and_then(to_ip);
    let to_ip_addr = pbmsg.to.as_deref().and_then(to_ip);
    match direction {
        MessageDirection::Query => {
            network.query_ip = from_ip;
            network.response_ip = to_ip_addr;
        }
        MessageDirection::Reply => {
            // PowerDNS always reports `from` as the responder on responses;
            // swap so query_ip stays the client throughout (invariant #4).
            network.query_ip = to_ip_addr;
            network.response_ip = from_ip;
        }
    }
    network.family = match pbmsg.socket_family() {
        pb::pbdns_message::SocketFamily::Inet6 => crate::dnsmessage::Family::Ipv6,
        pb::pbdns_message::SocketFamily::Inet => crate::dnsmessage::Family::Ipv4,
    };
    network.protocol = match pbmsg.socket_protocol() {
        pb::pbdns_message::SocketProtocol::Udp => crate::dnsmessage::Protocol::Udp,
        pb::pbdns_message::SocketProtocol::Tcp => crate::dnsmessage::Protocol::Tcp,
        pb::pbdns_message::SocketProtocol::Dot => crate::dnsmessage::Protocol::Dot,
        pb::pbdns_message::SocketProtocol::Doh => crate::dnsmessage::Protocol::Doh,
    };
    dm.network = network;

    dm.dns.id = pbmsg.id.unwrap_or(0) as u16;
    dm.dns.qname = pbmsg
        .q_name
        .clone()
        .unwrap_or_default()
        .trim_end_matches('.')
        .to_ascii_lowercase();
    dm.dns.qtype = constants::qtype_to_string(pbmsg.q_type.unwrap_or(0) as u16);
    dm.dns.length = pbmsg.in_bytes.unwrap_or(0);
    dm.dns.annotate_public_suffix();

    if let Some(response) = &pbmsg.response {
        dm.dns.rcode = constants::rcode_to_string(response.rcode.unwrap_or(0) as u16);
        dm.powerdns.tags = response.tags.clone();
        for rr in &response.rrs {
            dm.dns.answers.push(crate::dnsmessage::DnsAnswer {
                name: rr.name.clone().unwrap_or_default(),
                rdatatype: constants::qtype_to_string(rr.r#type.unwrap_or(0) as u16),
                class: rr.class.unwrap_or(0) as u16,
                ttl: rr.ttl.unwrap_or(0),
                rdata: rdata_to_string(rr.r#type.unwrap_or(0) as u16, rr.rdata.as_deref().unwrap_or(&[])),
            });
        }
        if let (Some(query_sec), Some(query_usec)) = (response.query_time_sec, response.query_time_usec) {
            let query_time = query_sec as f64 + query_usec as f64 / 1e6;
            let reply_time = dm.dnstap.timestamp();
            dm.dnstap.latency = (reply_time - query_time).max(0.0);
        }
    }

    dm.powerdns.original_requestor_subnet = pbmsg.original_requestor_subnet.as_deref().and_then(to_ip);

    let _ = quiet_text;
    Ok(dm)
}

fn to_ip(bytes: &[u8]) -> Option<IpAddr> {
    match bytes.len() {
        4 => Some(IpAddr::from(<[u8; 4]>::try_from(bytes).ok()?)),
        16 => Some(IpAddr::from(<[u8; 16]>::try_from(bytes).ok()?)),
        _ => None,
    }
}

fn rdata_to_string(rtype: u16, rdata: &[u8]) -> String {
    match rtype {
        1 if rdata.len() == 4 => IpAddr::from(<[u8; 4]>::try_from(rdata).unwrap()).to_string(),
        28 if rdata.len() == 16 => IpAddr::from(<[u8; 16]>::try_from(rdata).unwrap()).to_string(),
        _ => hex::encode(rdata),
    }
}

mod hex {
    pub fn encode(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_minimal_query() -> Vec<u8> {
        let msg = pb::PbdnsMessage {
            r#type: pb::pbdns_message::Type::DnsQueryType as i32,
            q_name: Some("Example.COM.".to_string()),
            q_type: Some(1),
            from: Some(vec![192, 0, 2, 1]),
            to: Some(vec![192, 0, 2, 53]),
            time_sec: Some(1000),
            time_usec: Some(500_000),
            ..Default::default()
        };
        msg.encode_to_vec()
    }

    #[test]
    fn decode_lowercases_and_strips_trailing_dot() {
        let dm = decode(&encode_minimal_query(), "peer", false).unwrap();
        assert_eq!(dm.dns.qname, "example.com");
        assert_eq!(dm.dns.r#type, MessageDirection::Query);
        assert_eq!(dm.network.query_ip, Some("192.0.2.1".parse().unwrap()));
    }

    #[test]
    fn a_record_rdata_renders_as_dotted_ip() {
        assert_eq!(rdata_to_string(1, &[10, 0, 0, 1]), "10.0.0.1");
    }
}
