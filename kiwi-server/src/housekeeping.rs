//! Periodic cleanup of stale session data
//!
//! Expired session tokens are already ignored on lookup, and abandoned
//! flash mailboxes are never read again. This loop drops both so neither
//! the user file nor memory grows with dead entries.

use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};

use crate::state::SharedState;

/// What a sweep removed
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub flash_mailboxes: usize,
    pub expired_sessions: usize,
}

/// Main housekeeping loop
pub async fn housekeeping_loop(state: SharedState) {
    // interval() panics on a zero period
    let mut ticker = interval(state.housekeeping_interval.max(Duration::from_secs(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately; nothing is stale at startup
    ticker.tick().await;

    loop {
        ticker.tick().await;

        let sweep_state = state.clone();
        match tokio::task::spawn_blocking(move || sweep(&sweep_state)).await {
            Ok(report) if report != SweepReport::default() => {
                tracing::debug!(
                    "Housekeeping: dropped {} flash mailboxes, {} expired sessions",
                    report.flash_mailboxes,
                    report.expired_sessions
                );
            }
            Ok(_) => {}
            Err(e) => tracing::error!("Housekeeping task failed: {}", e),
        }
    }
}

/// One cleanup pass. The user file may be rewritten, so this blocks.
pub fn sweep(state: &SharedState) -> SweepReport {
    let flash_mailboxes = state.flashes.purge_idle(state.flash_idle);

    let expired_sessions = state.users.purge_expired_sessions().unwrap_or_else(|e| {
        tracing::warn!("Failed to purge expired sessions: {}", e);
        0
    });

    SweepReport {
        flash_mailboxes,
        expired_sessions,
    }
}
