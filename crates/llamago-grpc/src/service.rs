//! RPC service implementations and the listener loop.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;
use tonic::{Request, Response, Status};
use tracing::{error, info};

use llamago_core::{EngineError, EngineGate};

use crate::proto::FILE_DESCRIPTOR_SET;
use crate::proto::generate_server::{Generate, GenerateServer};
use crate::proto::hello_world_server::{HelloWorld, HelloWorldServer};
use crate::proto::{GenerateRequest, GenerateResponse, HelloWorldRequest, HelloWorldResponse};

/// Greeting service. Counts calls over the process lifetime.
#[derive(Debug, Default)]
pub struct HelloWorldService {
    calls: AtomicU64,
}

#[tonic::async_trait]
impl HelloWorld for HelloWorldService {
    async fn say_hello_world(
        &self,
        request: Request<HelloWorldRequest>,
    ) -> Result<Response<HelloWorldResponse>, Status> {
        let count = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let message = format!("CallCount={count} request: {}", request.into_inner().referer);
        info!("{message}");
        Ok(Response::new(HelloWorldResponse { message }))
    }
}

#[derive(Debug, Clone)]
pub struct GenerateService {
    gate: EngineGate,
}

impl GenerateService {
    pub const fn new(gate: EngineGate) -> Self {
        Self { gate }
    }
}

#[tonic::async_trait]
impl Generate for GenerateService {
    async fn generate(
        &self,
        request: Request<GenerateRequest>,
    ) -> Result<Response<GenerateResponse>, Status> {
        let prompt = request.into_inner().prompt;
        if prompt.is_empty() {
            return Err(Status::invalid_argument("No prompt"));
        }

        let content = self.gate.generate(prompt).await.map_err(engine_status)?;
        Ok(Response::new(GenerateResponse { content }))
    }
}

fn engine_status(err: EngineError) -> Status {
    match err {
        EngineError::NotReady | EngineError::StartupFailed(_) => Status::unavailable(err.to_string()),
        other => {
            error!("rpc generate failed: {other}");
            Status::internal(other.to_string())
        }
    }
}

/// Serve both RPC services, plus reflection, on a pre-bound listener until
/// `cancel` fires.
pub async fn serve(
    listener: TcpListener,
    gate: EngineGate,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    let reflection = tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()?;
    info!("gRPC listening on {addr}");

    Server::builder()
        .add_service(reflection)
        .add_service(HelloWorldServer::new(HelloWorldService::default()))
        .add_service(GenerateServer::new(GenerateService::new(gate)))
        .serve_with_incoming_shutdown(
            TcpListenerStream::new(listener),
            cancel.cancelled_owned(),
        )
        .await?;

    info!("gRPC listener on {addr} shut down");
    Ok(())
}
