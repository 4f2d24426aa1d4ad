//! Generic tick-and-shutdown poll loop shared by every background job.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info};

/// Runs `tick` on a fixed `period`, stopping when `shutdown` broadcasts `true`.
/// Tick errors are logged and never stop the loop (spec.md §4.7 "failures
/// are logged, not retried in-loop").
pub async fn run_loop<F, Fut>(
    job_name: &'static str,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut tick: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = crate::error::Result<()>>,
{
    info!(job = job_name, "job loop started");
    let mut interval = tokio::time::interval(period);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = tick().await {
                    error!(job = job_name, error = %e, "job tick failed");
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!(job = job_name, "job loop shutting down");
                    break;
                }
            }
        }
    }
}
