//! Generated protobuf bindings, built from `proto/*.proto` by `build.rs`
//! (grounded on vector's `lib/dnstap-parser/build.rs` `prost_build` setup).

pub mod dnstap {
    include!(concat!(env!("OUT_DIR"), "/dnstap.rs"));
}

pub mod pdns {
    include!(concat!(env!("OUT_DIR"), "/pdns.rs"));
}
