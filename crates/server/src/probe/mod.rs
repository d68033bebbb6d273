//! One-shot health checks.
//!
//! Every probe is bounded by the timeout it is given and always produces a
//! [`Status`]; failures are recorded as down statuses, never returned as errors.

pub mod http;
pub mod ping;
pub mod tcp;

use crate::error::ProbeError;
use crate::targets::{Protocol, Status, Target};
use std::future::Future;
use std::pin::Pin;
use std::time::Instant;
use tokio::time::Duration;

/// Boxed probe future, so probers can sit behind a trait object.
pub type ProbeFuture<'a> = Pin<Box<dyn Future<Output = Status> + Send + 'a>>;

/// Something able to check a target. The scheduler only talks to this trait.
pub trait Prober: Send + Sync + 'static {
    fn probe<'a>(&'a self, target: &'a Target, timeout: Duration) -> ProbeFuture<'a>;
}

/// Prober backed by real network I/O.
#[derive(Debug, Default, Clone, Copy)]
pub struct NetworkProber;

impl Prober for NetworkProber {
    fn probe<'a>(&'a self, target: &'a Target, timeout: Duration) -> ProbeFuture<'a> {
        Box::pin(probe(target, timeout))
    }
}

/// Runs the check matching the target's protocol.
#[tracing::instrument(name = "probe", skip(target), fields(id = %target.id, protocol = %target.protocol, url = %target.url))]
pub async fn probe(target: &Target, timeout: Duration) -> Status {
    let start = Instant::now();
    let result = match &target.protocol {
        Protocol::Http => http::check(&target.url, timeout).await,
        Protocol::Tcp => tcp::check(&target.url, timeout).await,
        Protocol::Ping => ping::check(&target.url, timeout).await,
        Protocol::Unsupported(kind) => Err(ProbeError::Unsupported(kind.clone())),
    };
    let elapsed = elapsed_ms(start);

    match result {
        Ok(()) => Status::up(elapsed),
        Err(e) => {
            tracing::debug!(
                name = "probe.failed",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                error = %e,
                elapsed_ms = elapsed,
                message = "Check failed"
            );
            Status::down(elapsed, e.to_string())
        }
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
