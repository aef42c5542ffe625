//! Fixed-interval polling for resource state transitions.
//!
//! Provides a generic wait loop used when a freshly created resource has to
//! reach a terminal state (e.g. an instance booting into `running`). The loop
//! re-runs the caller's check at a fixed cadence and, by contract, has no
//! timeout of its own: the only ways out are the check succeeding, the check
//! failing, or a caller-supplied cancellation token firing.

use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Default pause between state checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Configuration for the polling loop.
#[derive(Debug, Clone, Default)]
pub struct PollConfig {
    /// Pause between checks; `None` means [`DEFAULT_POLL_INTERVAL`].
    pub interval: Option<Duration>,
    /// Optional cooperative cancellation. Without one the loop is unbounded.
    pub cancel: Option<CancellationToken>,
}

impl PollConfig {
    /// Create a config polling at the given interval.
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval: Some(interval),
            ..Default::default()
        }
    }

    /// Attach a cancellation token.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Effective pause between checks.
    pub fn interval(&self) -> Duration {
        self.interval.unwrap_or(DEFAULT_POLL_INTERVAL)
    }
}

/// Poll until `check` yields a value.
///
/// # Arguments
/// * `config` - Poll configuration
/// * `check` - Async function returning `Ok(Some(value))` when the resource
///   has converged, `Ok(None)` to keep waiting
/// * `resource_name` - Name for logging
///
/// # Returns
/// * `Ok(value)` - Resource converged
/// * `Err` - Cancelled, or the check itself failed
///
/// There is deliberately no timeout arm: a resource that never converges
/// keeps the caller suspended until it is cancelled or the process exits.
pub async fn poll_until<T, F, Fut>(config: &PollConfig, check: F, resource_name: &str) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let interval = config.interval();
    let mut attempts = 0u32;

    loop {
        attempts += 1;

        if let Some(token) = &config.cancel {
            if token.is_cancelled() {
                anyhow::bail!("Wait for {} cancelled", resource_name);
            }
        }

        match check().await? {
            Some(value) => {
                debug!(resource = %resource_name, attempts, "Resource converged");
                return Ok(value);
            }
            None => {
                debug!(
                    resource = %resource_name,
                    attempt = attempts,
                    interval_ms = interval.as_millis(),
                    "Resource not ready, waiting"
                );

                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = async {
                        match &config.cancel {
                            Some(token) => token.cancelled().await,
                            None => std::future::pending::<()>().await,
                        }
                    } => {
                        anyhow::bail!("Wait for {} cancelled", resource_name);
                    }
                }
            }
        }
    }
}
