//! Protocol string constants, ported from the original collector's
//! `dnsutils/constants.go`.

pub const VALID_DOMAIN: &str = "dnscollector.dev.";

pub const DNSTAP_OPERATION_QUERY: &str = "QUERY";
pub const DNSTAP_OPERATION_REPLY: &str = "REPLY";
pub const DNSTAP_CLIENT_QUERY: &str = "CLIENT_QUERY";
pub const DNSTAP_CLIENT_RESPONSE: &str = "CLIENT_RESPONSE";

pub const PROTO_UDP: &str = "UDP";
pub const PROTO_TCP: &str = "TCP";
pub const PROTO_DOT: &str = "DOT";
pub const PROTO_DOH: &str = "DOH";

pub const STR_UNKNOWN: &str = "-";

/// Maps a DNS RCODE numeric value to its textual name. Unknown codes map to
/// `"UNKNOWN"`, matching the original `RcodeToString`.
pub fn rcode_to_string(rcode: u16) -> String {
    match rcode {
        0 => "NOERROR",
        1 => "FORMERR",
        2 => "SERVFAIL",
        3 => "NXDOMAIN",
        4 => "NOTIMP",
        5 => "REFUSED",
        6 => "YXDOMAIN",
        7 => "YXRRSET",
        8 => "NXRRSET",
        9 => "NOTAUTH",
        10 => "NOTZONE",
        16 => "BADSIG",
        _ => "UNKNOWN",
    }
    .to_string()
}

/// Maps a DNS QTYPE numeric value to its textual name. Unknown types map to
/// `TYPE<n>`, matching the original `RdatatypeToString`.
pub fn qtype_to_string(qtype: u16) -> String {
    match qtype {
        1 => "A".to_string(),
        2 => "NS".to_string(),
        5 => "CNAME".to_string(),
        6 => "SOA".to_string(),
        12 => "PTR".to_string(),
        15 => "MX".to_string(),
        16 => "TXT".to_string(),
        28 => "AAAA".to_string(),
        33 => "SRV".to_string(),
        41 => "OPT".to_string(),
        43 => "DS".to_string(),
        46 => "RRSIG".to_string(),
        47 => "NSEC".to_string(),
        48 => "DNSKEY".to_string(),
        65 => "HTTPS".to_string(),
        255 => "ANY".to_string(),
        other => format!("TYPE{other}"),
    }
}

/// Qtypes not considered unusual for the ML transformer (spec.md §4.I).
pub const COMMON_QTYPES: &[&str] = &["A", "AAAA", "HTTPS", "SRV", "PTR", "SOA", "NS"];
