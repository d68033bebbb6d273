//! TCP connect probe.

use crate::error::ProbeError;
use tokio::net::TcpStream;
use tokio::time::{Duration, timeout};

/// Opens a connection to `host:port` and closes it right away.
pub async fn check(address: &str, limit: Duration) -> Result<(), ProbeError> {
    let stream = timeout(limit, TcpStream::connect(address.trim()))
        .await
        .map_err(|_| ProbeError::Timeout(limit))?
        .map_err(|e| ProbeError::Transport(format!("dial tcp {address}: {e}")))?;
    drop(stream);
    Ok(())
}
