fn main() -> std::io::Result<()> {
    prost_build::Config::new()
        .btree_map(["."])
        .compile_protos(&["proto/dnstap.proto", "proto/pdns.proto"], &["proto/"])?;
    Ok(())
}
