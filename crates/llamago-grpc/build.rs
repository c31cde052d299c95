use std::io;
use std::path::PathBuf;

use prost::Message;

/// Compile the proto definitions without requiring `protoc` on the host.
///
/// The encoded descriptor set is kept next to the generated code for the
/// reflection service.
fn main() -> io::Result<()> {
    println!("cargo:rerun-if-changed=proto/llamago.proto");

    let fds = protox::compile(["proto/llamago.proto"], ["proto"]).map_err(io::Error::other)?;

    let out_dir = PathBuf::from(std::env::var("OUT_DIR").map_err(io::Error::other)?);
    std::fs::write(out_dir.join("llamago_descriptor.bin"), fds.encode_to_vec())?;

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_fds(fds)
}
