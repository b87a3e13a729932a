//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap a worker exchange with the resolved request deadline
//! - Treat a missing deadline as unbounded
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct from other errors
//! - Timed-out requests return 504 Gateway Timeout and cost the worker its life

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;

/// Stand-in for "never" when a configured wait does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// The wrapped future did not finish within its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("deadline of {0:?} exceeded")]
pub struct DeadlineExceeded(pub Duration);

/// Run `fut` under `limit`, or to completion when `limit` is `None`.
pub async fn with_deadline<F>(limit: Option<Duration>, fut: F) -> Result<F::Output, DeadlineExceeded>
where
    F: Future,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| DeadlineExceeded(limit)),
        None => Ok(fut.await),
    }
}

/// The instant `wait` from now, saturating instead of overflowing.
pub fn deadline_after(wait: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(wait).unwrap_or_else(|| now + FAR_FUTURE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unbounded_waits_for_completion() {
        let out = with_deadline(None, async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            7
        })
        .await;
        assert_eq!(out, Ok(7));
    }

    #[tokio::test]
    async fn bounded_reports_limit() {
        let limit = Duration::from_millis(10);
        let out = with_deadline(Some(limit), tokio::time::sleep(Duration::from_secs(5))).await;
        assert_eq!(out, Err(DeadlineExceeded(limit)));
    }

    #[test]
    fn huge_waits_saturate() {
        let deadline = deadline_after(Duration::from_secs(u64::MAX));
        assert!(deadline > Instant::now() + Duration::from_secs(86400 * 365));

        let near = deadline_after(Duration::from_millis(5));
        assert!(near <= Instant::now() + Duration::from_millis(5));
    }
}
