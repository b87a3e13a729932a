//! Exponential respawn backoff with jitter.

use std::time::Duration;

use rand::Rng;

/// Delay before respawning a worker after `attempt` consecutive failures.
///
/// Attempt 0 means the previous process was healthy (or was replaced on
/// purpose) and respawns immediately.
pub fn respawn_delay(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 || base_ms == 0 {
        return Duration::ZERO;
    }

    let factor = 1u64.checked_shl(attempt - 1).unwrap_or(u64::MAX);
    let capped = base_ms.saturating_mul(factor).min(max_ms);

    // Up to 10% jitter so a crashing fleet does not respawn in lockstep.
    let spread = capped / 10;
    let jitter = if spread > 0 {
        rand::thread_rng().gen_range(0..=spread)
    } else {
        0
    };

    Duration::from_millis(capped.saturating_add(jitter).min(max_ms.saturating_add(spread)))
}
