//! Serving the API on a pre-bound listener.

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::routes::create_router;
use crate::state::ApiState;

/// Run the HTTP API until `cancel` fires.
///
/// The listener is bound by the caller so bind failures surface before this
/// task is spawned. In-flight requests are allowed to finish on shutdown.
pub async fn serve(
    listener: TcpListener,
    state: ApiState,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    let app = create_router(state, Some(addr));

    info!("HTTP API listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await?;

    info!("HTTP API on {addr} shut down");
    Ok(())
}
