//! Artifact polling with injectable pacing.
//!
//! The Windows elevation launcher cannot synchronously wait on every
//! supported version, so completion is observed by polling for a status
//! artifact. [`wait_for`] is that loop with the knobs the reference
//! protocol lacks: a configurable interval, an optional deadline, and a
//! cancellation token. The defaults reproduce the reference behavior
//! exactly (1 second interval, no deadline).

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{ElevationError, ElevationResult};

/// Pacing policy for an artifact wait.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WaitConfig {
    /// Delay between probe attempts.
    #[serde(default = "default_poll_interval")]
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,

    /// Give up after this long. `None` polls indefinitely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(with = "humantime_serde")]
    pub deadline: Option<Duration>,
}

const fn default_poll_interval() -> Duration {
    Duration::from_secs(1)
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            deadline: None,
        }
    }
}

/// Polls `probe` until it yields a value, the deadline expires, or the
/// token is cancelled.
///
/// The probe returns `Ok(Some(value))` when the artifact qualifies,
/// `Ok(None)` to keep waiting, or an error to abort immediately.
///
/// # Errors
///
/// Propagates probe errors unchanged; deadline expiry and cancellation are
/// reported as [`ElevationError::Internal`] naming the cause.
pub async fn wait_for<P, Fut, T>(
    config: &WaitConfig,
    cancel: &CancellationToken,
    mut probe: P,
) -> ElevationResult<T>
where
    P: FnMut() -> Fut,
    Fut: Future<Output = ElevationResult<Option<T>>>,
{
    let started = tokio::time::Instant::now();
    let deadline = config.deadline.map(|d| started + d);

    loop {
        if let Some(value) = probe().await? {
            return Ok(value);
        }

        let wake = tokio::time::Instant::now() + config.poll_interval;
        if let Some(deadline) = deadline {
            if wake >= deadline {
                tokio::select! {
                    () = cancel.cancelled() => {
                        return Err(ElevationError::internal("artifact wait cancelled"));
                    },
                    () = tokio::time::sleep_until(deadline) => {
                        return Err(ElevationError::internal(format!(
                            "artifact did not appear within {:?}",
                            config.deadline.unwrap_or_default()
                        )));
                    },
                }
            }
        }

        tokio::select! {
            () = cancel.cancelled() => {
                return Err(ElevationError::internal("artifact wait cancelled"));
            },
            () = tokio::time::sleep_until(wake) => {},
        }
    }
}
