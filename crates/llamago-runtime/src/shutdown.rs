//! Graceful shutdown of the engine child process, SIGTERM then SIGKILL.

use std::io;
use std::process::ExitStatus;
use std::time::Duration;

use tokio::process::Child;
use tracing::{debug, warn};

#[cfg(unix)]
use tokio::time::timeout;

#[cfg(unix)]
use nix::sys::signal::{self, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

/// How long a child gets to exit after SIGTERM before it is killed.
pub const GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Stop `child` and reap it.
///
/// On Unix the child receives SIGTERM and has [`GRACE_PERIOD`] to exit
/// before SIGKILL. Elsewhere it is killed immediately. A child that has
/// already exited is simply reaped.
pub async fn shutdown_child(child: Child) -> io::Result<ExitStatus> {
    shutdown_child_within(child, GRACE_PERIOD).await
}

/// [`shutdown_child`] with an explicit grace period.
pub async fn shutdown_child_within(mut child: Child, grace: Duration) -> io::Result<ExitStatus> {
    if let Some(status) = child.try_wait()? {
        debug!(?status, "child already exited");
        return Ok(status);
    }

    #[cfg(unix)]
    {
        shutdown_unix(&mut child, grace).await
    }

    #[cfg(not(unix))]
    {
        let _ = grace;
        child.kill().await?;
        child.wait().await
    }
}

#[cfg(unix)]
async fn shutdown_unix(child: &mut Child, grace: Duration) -> io::Result<ExitStatus> {
    let pid = child
        .id()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "child has no PID"))?;
    let pid = i32::try_from(pid).map_err(io::Error::other)?;

    if let Err(e) = signal::kill(Pid::from_raw(pid), Signal::SIGTERM) {
        if e == nix::errno::Errno::ESRCH {
            return child.wait().await;
        }
        return Err(io::Error::other(e));
    }

    if let Ok(result) = timeout(grace, child.wait()).await {
        return result;
    }

    warn!(pid, grace_ms = grace.as_millis(), "child ignored SIGTERM, killing");
    child.kill().await?;
    child.wait().await
}
