//! Serialisation of a `DNSMessage` back to wire formats: a framed dnstap
//! protobuf event (for the dnstap sender, §4.H) and a synthetic
//! Ethernet/IPv4/UDP packet carrying the original DNS payload (for the
//! pcap-format stdout sink, §4.I / §9).

use prost::Message as _;

use super::{DNSMessage, Family, MessageDirection, Protocol};
use crate::proto::dnstap as pb;

/// Encodes this record as a single dnstap protobuf `Message`, the unit the
/// framestream codec wraps into a data frame.
pub fn to_dnstap(dm: &DNSMessage) -> Vec<u8> {
    let msg_type = match (&dm.dns.r#type, &dm.dnstap.operation) {
        (MessageDirection::Query, _) => pb::message::Type::ClientQuery,
        (MessageDirection::Reply, _) => pb::message::Type::ClientResponse,
    };

    let socket_family = match dm.network.family {
        Family::Ipv6 => Some(pb::SocketFamily::Inet6 as i32),
        Family::Ipv4 => Some(pb::SocketFamily::Inet as i32),
        Family::Unknown => None,
    };
    let socket_protocol = match dm.network.protocol {
        Protocol::Udp => Some(pb::SocketProtocol::Udp as i32),
        Protocol::Tcp => Some(pb::SocketProtocol::Tcp as i32),
        Protocol::Dot => Some(pb::SocketProtocol::Dot as i32),
        Protocol::Doh => Some(pb::SocketProtocol::Doh as i32),
        Protocol::Unknown => None,
    };

    let message = pb::Message {
        r#type: msg_type as i32,
        socket_family,
        socket_protocol,
        query_address: dm.network.query_ip.map(|ip| ip_bytes(ip)),
        response_address: dm.network.response_ip.map(|ip| ip_bytes(ip)),
        query_port: Some(dm.network.query_port as u32),
        response_port: Some(dm.network.response_port as u32),
        query_time_sec: Some(dm.dnstap.time_sec),
        query_time_nsec: Some(dm.dnstap.time_nsec),
        query_message: if dm.dns.r#type == MessageDirection::Query {
            Some(dm.dns.payload.clone())
        } else {
            None
        },
        query_zone: None,
        response_time_sec: Some(dm.dnstap.time_sec),
        response_time_nsec: Some(dm.dnstap.time_nsec),
        response_message: if dm.dns.r#type == MessageDirection::Reply {
            Some(dm.dns.payload.clone())
        } else {
            None
        },
    };

    let envelope = pb::Dnstap {
        r#type: pb::dnstap::Type::Message as i32,
        identity: Some(dm.dnstap.identity.clone()),
        version: None,
        extra: None,
        message: Some(message),
    };

    envelope.encode_to_vec()
}

fn ip_bytes(ip: std::net::IpAddr) -> Vec<u8> {
    match ip {
        std::net::IpAddr::V4(v4) => v4.octets().to_vec(),
        std::net::IpAddr::V6(v6) => v6.octets().to_vec(),
    }
}

/// Synthesises a minimal Ethernet + IPv4 + UDP frame carrying `dns.payload`,
/// for sinks that write pcap records. No pcap-writer crate is pulled in for
/// this: only the packet bytes are produced here, framing is the caller's
/// concern. IPv6 and TCP reassembly are out of scope; non-IPv4/UDP traffic
/// is not representable and returns `None`.
pub fn to_packet_layers(dm: &DNSMessage) -> Option<Vec<u8>> {
    let (std::net::IpAddr::V4(src), std::net::IpAddr::V4(dst)) =
        (dm.network.query_ip?, dm.network.response_ip?)
    else {
        return None;
    };

    let payload = &dm.dns.payload;
    let udp_len = 8 + payload.len();
    let ip_total_len = 20 + udp_len;

    let mut packet = Vec::with_capacity(14 + ip_total_len);

    // Ethernet header: broadcast-ish placeholder MACs, EtherType IPv4.
    packet.extend_from_slice(&[0u8; 6]); // dst mac
    packet.extend_from_slice(&[0u8; 6]); // src mac
    packet.extend_from_slice(&0x0800u16.to_be_bytes());

    let ip_header_start = packet.len();
    packet.push(0x45); // version 4, IHL 5
    packet.push(0x00); // DSCP/ECN
    packet.extend_from_slice(&(ip_total_len as u16).to_be_bytes());
    packet.extend_from_slice(&0u16.to_be_bytes()); // identification
    packet.extend_from_slice(&0u16.to_be_bytes()); // flags/fragment offset
    packet.push(64); // TTL
    packet.push(17); // protocol: UDP
    packet.extend_from_slice(&0u16.to_be_bytes()); // checksum placeholder
    packet.extend_from_slice(&src.octets());
    packet.extend_from_slice(&dst.octets());

    let checksum = ipv4_checksum(&packet[ip_header_start..ip_header_start + 20]);
    packet[ip_header_start + 10..ip_header_start + 12].copy_from_slice(&checksum.to_be_bytes());

    packet.extend_from_slice(&dm.network.query_port.to_be_bytes());
    packet.extend_from_slice(&dm.network.response_port.to_be_bytes());
    packet.extend_from_slice(&(udp_len as u16).to_be_bytes());
    packet.extend_from_slice(&0u16.to_be_bytes()); // UDP checksum: 0 is valid over IPv4
    packet.extend_from_slice(payload);

    Some(packet)
}

fn ipv4_checksum(header: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    for chunk in header.chunks(2) {
        let word = if chunk.len() == 2 {
            u16::from_be_bytes([chunk[0], chunk[1]])
        } else {
            u16::from_be_bytes([chunk[0], 0])
        };
        sum += word as u32;
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dnsmessage::{DnsTap, NetworkInfo};

    #[test]
    fn to_dnstap_roundtrips_through_prost() {
        let mut dm = DNSMessage::new();
        dm.dnstap = DnsTap {
            identity: "test".to_string(),
            time_sec: 10,
            time_nsec: 0,
            ..Default::default()
        };
        dm.dns.r#type = MessageDirection::Query;
        dm.dns.payload = vec![1, 2, 3, 4];
        dm.network = NetworkInfo {
            family: Family::Ipv4,
            protocol: Protocol::Udp,
            query_ip: Some("127.0.0.1".parse().unwrap()),
            query_port: 53000,
            response_ip: Some("127.0.0.2".parse().unwrap()),
            response_port: 53,
            ..Default::default()
        };

        let bytes = to_dnstap(&dm);
        let decoded = pb::Dnstap::decode(bytes.as_slice()).unwrap();
        assert_eq!(decoded.identity.as_deref(), Some("test"));
        let message = decoded.message.unwrap();
        assert_eq!(message.query_message, Some(vec![1, 2, 3, 4]));
    }

    #[test]
    fn to_packet_layers_produces_checksum_clean_ipv4_header() {
        let mut dm = DNSMessage::new();
        dm.network.query_ip = Some("192.0.2.1".parse().unwrap());
        dm.network.response_ip = Some("192.0.2.53".parse().unwrap());
        dm.network.query_port = 53000;
        dm.network.response_port = 53;
        dm.dns.payload = vec![0xAA; 12];

        let packet = to_packet_layers(&dm).unwrap();
        let ip_header = &packet[14..34];
        assert_eq!(ipv4_checksum(ip_header), 0);
    }

    #[test]
    fn to_packet_layers_returns_none_for_ipv6() {
        let mut dm = DNSMessage::new();
        dm.network.query_ip = Some("::1".parse().unwrap());
        dm.network.response_ip = Some("::2".parse().unwrap());
        assert!(to_packet_layers(&dm).is_none());
    }
}
