use mio::Token;
use relay_timing::{Duration, Instant};

use crate::registry::ConnectionRegistry;

/// Full idle timeout before a quiet connection is evicted.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(180);

/// Connections quiet for at least a quarter of the timeout, in either
/// direction, get a synthetic PING to probe liveness before they are
/// actually at risk of eviction.
fn half_timeout() -> Duration {
    IDLE_TIMEOUT / 4
}

pub struct IdleSweepResult {
    pub pinged: Vec<Token>,
    pub timed_out: Vec<Token>,
}

/// Scans every connection once and decides what to ping and what to evict.
/// Collect-then-act: the scan never mutates `registry`, so the caller can
/// freely close the returned tokens afterward without invalidating an
/// in-progress iteration.
pub fn sweep(registry: &ConnectionRegistry, now: Instant) -> IdleSweepResult {
    let mut pinged = Vec::new();
    let mut timed_out = Vec::new();

    for (token, record) in registry.iter() {
        let since_receive = now.saturating_duration_since(record.last_receive_time);
        let since_send = now.saturating_duration_since(record.last_send_time);

        if since_receive > IDLE_TIMEOUT {
            timed_out.push(*token);
            continue;
        }
        if since_receive > half_timeout() && since_send > half_timeout() {
            pinged.push(*token);
        }
    }

    IdleSweepResult { pinged, timed_out }
}
