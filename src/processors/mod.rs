//! Per-connection decode-and-normalize stages sitting between a collector
//! and the routing fan-out (spec.md §4.B "processor" role, grounded on
//! `workers/dnsprocessor.go` and `collectors/powerdns_processor.go`).

pub mod dnstap_processor;
pub mod powerdns_processor;
