//! Readiness polling for the `llama-server` child.

use std::time::Duration;

use tokio::process::Child;
use tokio::time::{Instant, sleep};
use tracing::{debug, info};

/// Delay between two `/health` probes.
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Outcome of a single `/health` probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Health {
    Ready,
    /// Reachable but still loading (llama-server answers 503).
    Loading,
    /// Nothing answered, or the answer was not llama-server's.
    Unreachable(String),
}

/// Probe `{base_url}/health` once.
pub async fn check_http_health(client: &reqwest::Client, base_url: &str) -> Health {
    let url = format!("{base_url}/health");
    match client.get(&url).send().await {
        Ok(resp) if resp.status().is_success() => Health::Ready,
        Ok(resp) if resp.status() == reqwest::StatusCode::SERVICE_UNAVAILABLE => Health::Loading,
        Ok(resp) => Health::Unreachable(format!("unexpected status {}", resp.status())),
        Err(e) => Health::Unreachable(e.to_string()),
    }
}

/// Poll until the server reports ready, the child exits, or `timeout` passes.
pub async fn wait_for_http_health(
    client: &reqwest::Client,
    base_url: &str,
    child: &mut Child,
    timeout: Duration,
) -> Result<(), String> {
    let deadline = Instant::now() + timeout;
    info!(%base_url, "waiting for llama-server to become ready");

    loop {
        if let Some(status) = child.try_wait().map_err(|e| e.to_string())? {
            return Err(format!("llama-server exited during startup ({status})"));
        }

        match check_http_health(client, base_url).await {
            Health::Ready => {
                info!(%base_url, "llama-server is ready");
                return Ok(());
            }
            Health::Loading => debug!("llama-server is loading the model"),
            Health::Unreachable(reason) => debug!(%reason, "health check failed, retrying"),
        }

        if Instant::now() >= deadline {
            return Err(format!(
                "llama-server did not become ready within {}s",
                timeout.as_secs()
            ));
        }
        sleep(POLL_INTERVAL).await;
    }
}
