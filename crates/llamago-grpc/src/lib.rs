//! gRPC service and HTTP+JSON gateway for llamago.
//!
//! Two services are exposed on the RPC listener: `HelloWorld`, a
//! connectivity check with a call counter, and `Generate`, which runs a
//! prompt through the shared [`llamago_core::EngineGate`]. Server
//! reflection is registered alongside them for tools such as `grpcurl`.
//!
//! The gateway is a separate axum listener that forwards JSON requests to
//! the RPC endpoint over a lazily connected channel.

pub mod proto {
    #![allow(clippy::doc_markdown)]
    #![allow(clippy::derive_partial_eq_without_eq)]
    tonic::include_proto!("llamago.v1");

    /// Encoded descriptors of every service above, served over reflection.
    pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("llamago_descriptor");
}

mod gateway;
mod service;

pub use gateway::{connect_lazy, gateway_router, http_status, serve_gateway};
pub use service::{GenerateService, HelloWorldService, serve};

#[cfg(test)]
use tokio_test as _;
