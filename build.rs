fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=build.rs");

    // The gateway messages are plain prost structs in src/gateway/proto.rs, so the
    // service stubs are generated from a Rust description instead of a .proto file.
    let codec = "tonic::codec::ProstCodec";
    let unary = |name: &str, route: &str, input: &str, output: &str| {
        tonic_build::manual::Method::builder()
            .name(name)
            .route_name(route)
            .input_type(format!("crate::gateway::proto::{input}"))
            .output_type(format!("crate::gateway::proto::{output}"))
            .codec_path(codec)
            .build()
    };

    let gateway = tonic_build::manual::Service::builder()
        .name("Gateway")
        .package("bulwark.v1")
        .method(unary("process", "Process", "ProcessRequest", "ProcessResponse"))
        .method(unary("rotate_key", "RotateKey", "RotateKeyRequest", "RotateKeyResponse"))
        .method(unary("purge_expired", "PurgeExpired", "PurgeRequest", "PurgeResponse"))
        .method(unary("export", "Export", "ExportRequest", "ExportResponse"))
        .build();

    tonic_build::manual::Builder::new()
        .build_server(true)
        .build_client(false)
        .compile(&[gateway]);

    Ok(())
}
