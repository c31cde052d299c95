//! HTTP+JSON gateway in front of the RPC listener.
//!
//! | Method | Path             | RPC                              |
//! |--------|------------------|----------------------------------|
//! | POST   | `/v1/helloworld` | `HelloWorld/SayHelloWorld`       |
//! | GET    | `/v1/helloworld` | same, `referer` from the query   |
//! | POST   | `/v1/generate`   | `Generate/Generate`              |
//!
//! RPC failures come back as `{"code", "message", "details"}` with the
//! HTTP status grpc-gateway uses for the code.

use axum::{
    Json, Router,
    extract::{Query, Request, State},
    http::{HeaderValue, Method, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::post,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tonic::transport::{Channel, Endpoint};
use tonic::{Code, Status};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::proto::generate_client::GenerateClient;
use crate::proto::hello_world_client::HelloWorldClient;
use crate::proto::{GenerateRequest, HelloWorldRequest};

const JSON_UTF8: &str = "application/json;charset=UTF-8";
const ALLOW_HEADERS: &str = "Content-Type,AccessToken,X-CSRF-Token, Authorization, Token";
const ALLOW_METHODS: &str = "POST, GET, OPTIONS, PUT, DELETE";

#[derive(Debug, Clone)]
struct GatewayState {
    hello: HelloWorldClient<Channel>,
    generate: GenerateClient<Channel>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct HelloPayload {
    referer: String,
}

#[derive(Debug, Serialize)]
struct HelloReply {
    message: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GeneratePayload {
    prompt: String,
}

#[derive(Debug, Serialize)]
struct GenerateReply {
    content: String,
}

/// RPC status rendered the way grpc-gateway does.
#[derive(Debug)]
struct GatewayError(Status);

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: i32,
    message: String,
    details: Vec<serde_json::Value>,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            code: self.0.code() as i32,
            message: self.0.message().to_string(),
            details: Vec::new(),
        };
        (http_status(self.0.code()), Json(body)).into_response()
    }
}

impl From<Status> for GatewayError {
    fn from(status: Status) -> Self {
        Self(status)
    }
}

/// HTTP status for an RPC code.
pub fn http_status(code: Code) -> StatusCode {
    match code {
        Code::Ok => StatusCode::OK,
        // client closed request
        Code::Cancelled => match StatusCode::from_u16(499) {
            Ok(status) => status,
            Err(_) => StatusCode::BAD_REQUEST,
        },
        Code::InvalidArgument | Code::FailedPrecondition | Code::OutOfRange => {
            StatusCode::BAD_REQUEST
        }
        Code::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        Code::NotFound => StatusCode::NOT_FOUND,
        Code::AlreadyExists | Code::Aborted => StatusCode::CONFLICT,
        Code::PermissionDenied => StatusCode::FORBIDDEN,
        Code::Unauthenticated => StatusCode::UNAUTHORIZED,
        Code::ResourceExhausted => StatusCode::TOO_MANY_REQUESTS,
        Code::Unimplemented => StatusCode::NOT_IMPLEMENTED,
        Code::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        Code::Unknown | Code::Internal | Code::DataLoss => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// A channel to `endpoint` (`host:port`) that connects on first use.
pub fn connect_lazy(endpoint: &str) -> Result<Channel, tonic::transport::Error> {
    Ok(Endpoint::from_shared(format!("http://{endpoint}"))?.connect_lazy())
}

/// Gateway routes over an RPC channel.
pub fn gateway_router(channel: Channel) -> Router {
    let state = GatewayState {
        hello: HelloWorldClient::new(channel.clone()),
        generate: GenerateClient::new(channel),
    };

    Router::new()
        .route("/v1/helloworld", post(say_hello).get(say_hello_query))
        .route("/v1/generate", post(generate))
        .with_state(state)
        .layer(middleware::from_fn(gateway_cors))
        .layer(TraceLayer::new_for_http())
}

/// Serve the gateway on a pre-bound listener until `cancel` fires.
pub async fn serve_gateway(
    listener: TcpListener,
    rpc_endpoint: &str,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    let app = gateway_router(connect_lazy(rpc_endpoint)?);

    info!("gRPC gateway listening on http://{addr} (rpc {rpc_endpoint})");

    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await?;

    info!("gRPC gateway on {addr} shut down");
    Ok(())
}

async fn say_hello(
    State(state): State<GatewayState>,
    body: Bytes,
) -> Result<Json<HelloReply>, GatewayError> {
    let payload: HelloPayload = decode(&body)?;
    hello(state, payload).await
}

async fn say_hello_query(
    State(state): State<GatewayState>,
    Query(payload): Query<HelloPayload>,
) -> Result<Json<HelloReply>, GatewayError> {
    hello(state, payload).await
}

async fn hello(
    mut state: GatewayState,
    payload: HelloPayload,
) -> Result<Json<HelloReply>, GatewayError> {
    let reply = state
        .hello
        .say_hello_world(HelloWorldRequest {
            referer: payload.referer,
        })
        .await?
        .into_inner();
    Ok(Json(HelloReply {
        message: reply.message,
    }))
}

async fn generate(
    State(mut state): State<GatewayState>,
    body: Bytes,
) -> Result<Json<GenerateReply>, GatewayError> {
    let payload: GeneratePayload = decode(&body)?;
    debug!(prompt_len = payload.prompt.len(), "gateway generate");
    let reply = state
        .generate
        .generate(GenerateRequest {
            prompt: payload.prompt,
        })
        .await?
        .into_inner();
    Ok(Json(GenerateReply {
        content: reply.content,
    }))
}

/// An empty body decodes to the default message.
fn decode<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, GatewayError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| GatewayError(Status::invalid_argument(e.to_string())))
}

/// Fixed permissive CORS headers; `OPTIONS` is answered with 204.
async fn gateway_cors(req: Request, next: Next) -> Response {
    let mut response = if req.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(req).await
    };

    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOW_HEADERS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOW_METHODS),
    );
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(JSON_UTF8));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_follows_grpc_gateway() {
        assert_eq!(http_status(Code::InvalidArgument), StatusCode::BAD_REQUEST);
        assert_eq!(http_status(Code::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(http_status(Code::Unavailable), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(http_status(Code::Internal), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(http_status(Code::Cancelled).as_u16(), 499);
        assert_eq!(http_status(Code::DeadlineExceeded), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn error_body_shape() {
        let response = GatewayError(Status::invalid_argument("No prompt")).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn empty_body_decodes_to_default() {
        let payload: GeneratePayload = decode(&Bytes::new()).unwrap();
        assert!(payload.prompt.is_empty());
    }
}
