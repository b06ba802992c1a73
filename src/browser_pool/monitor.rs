//! Background lifecycle monitor
//!
//! Scans every slot once per `monitor_interval` and starts a replacement for
//! each slot the restart policy selects. Replacements run as their own tasks,
//! so a slow relaunch never delays the next scan. Nothing is held between
//! ticks: the loop keeps only a weak handle, so dropping the pool without
//! `shutdown()` also ends it.

use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

use super::BrowserPool;

/// Run until the shutdown flag flips to `true`, its sender is dropped, or
/// the pool is gone
pub async fn lifecycle_loop(
    pool: Weak<BrowserPool>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately; freshly started workers need no scan
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        }

        let Some(pool) = pool.upgrade() else {
            break;
        };
        let started = scan(&pool);
        drop(pool);
        if started > 0 {
            debug!("Lifecycle scan started {} replacement(s)", started);
        } else {
            trace!("Lifecycle scan: nothing to replace");
        }
    }

    debug!("Lifecycle monitor exiting");
}

/// Start a replacement for every slot that qualifies right now
///
/// Returns how many replacements were started.
pub fn scan(pool: &Arc<BrowserPool>) -> usize {
    let mut started = 0;
    for index in 0..pool.pool_size() {
        if let Some((replacement, reason)) = pool.begin_replacement(index) {
            let pool = Arc::clone(pool);
            tokio::spawn(async move {
                pool.run_replacement(replacement, reason).await;
            });
            started += 1;
        }
    }
    started
}
