//! ICMP echo through the platform `ping` utility.

use crate::error::ProbeError;
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::{Duration, timeout};

/// Extra time granted to the utility beyond its own wait flag.
const GRACE: Duration = Duration::from_secs(1);

/// Reduces an address to a bare host: no scheme, path or port.
pub fn ping_host(address: &str) -> &str {
    let mut host = address.trim();
    if let Some((_, rest)) = host.split_once("://") {
        host = rest;
    }
    if let Some(end) = host.find(['/', '?', '#']) {
        host = &host[..end];
    }
    if let Some((_, rest)) = host.rsplit_once('@') {
        host = rest;
    }
    if let Some(inner) = host.strip_prefix('[') {
        return inner.split(']').next().unwrap_or(inner);
    }
    // More than one colon means a bare IPv6 literal, which carries no port.
    if host.matches(':').count() == 1 {
        host = host.split(':').next().unwrap_or(host);
    }
    host
}

fn ping_command(host: &str, limit: Duration) -> Command {
    let mut cmd = Command::new("ping");
    if cfg!(windows) {
        let millis = limit.as_millis().to_string();
        cmd.args(["-n", "1", "-w", millis.as_str(), host]);
    } else {
        let secs = limit.as_secs().max(1).to_string();
        cmd.args(["-c", "1", "-W", secs.as_str(), host]);
    }
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);
    cmd
}

/// Sends a single echo request. The utility's own diagnostics are discarded.
pub async fn check(address: &str, limit: Duration) -> Result<(), ProbeError> {
    let host = ping_host(address);
    if host.is_empty() {
        return Err(ProbeError::Ping);
    }

    let mut child = ping_command(host, limit)
        .spawn()
        .map_err(|_| ProbeError::Ping)?;

    match timeout(limit.saturating_add(GRACE), child.wait()).await {
        Ok(Ok(status)) if status.success() => Ok(()),
        Ok(_) => Err(ProbeError::Ping),
        Err(_) => {
            let _ = child.kill().await;
            Err(ProbeError::Ping)
        }
    }
}
