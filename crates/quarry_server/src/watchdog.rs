//! Tick-thread liveness watchdog.
//!
//! The tick thread beats a heartbeat once per loop iteration. A dedicated
//! OS thread (not a tokio task, so a wedged runtime cannot starve it)
//! checks the heartbeat age and terminates the process if the tick thread
//! has been silent longer than the configured timeout. A simulation that
//! far behind has unbounded lag no client could recover from; a supervisor
//! restart is the correct outcome.

use std::process;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::error;

/// Exit code when the watchdog fires (EX_SOFTWARE).
pub const WATCHDOG_EXIT_CODE: i32 = 70;

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Shared heartbeat between the tick thread and the watchdog thread.
#[derive(Clone)]
pub struct Heartbeat {
    last_beat_millis: Arc<AtomicU64>,
    armed: Arc<AtomicBool>,
}

impl Heartbeat {
    pub fn new() -> Self {
        Self {
            last_beat_millis: Arc::new(AtomicU64::new(now_millis())),
            armed: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Called once per tick-loop iteration.
    pub fn beat(&self) {
        self.last_beat_millis.store(now_millis(), Ordering::Relaxed);
    }

    /// Stops the watchdog from firing; called on clean shutdown.
    pub fn disarm(&self) {
        self.armed.store(false, Ordering::Relaxed);
    }

    fn age(&self) -> Duration {
        Duration::from_millis(now_millis().saturating_sub(self.last_beat_millis.load(Ordering::Relaxed)))
    }

    fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Relaxed)
    }

    /// The fatal-threshold decision: armed and silent strictly longer than
    /// `timeout`.
    fn expired(&self, timeout: Duration) -> bool {
        self.is_armed() && self.age() > timeout
    }
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawns the watchdog thread. It polls at a quarter of the timeout and
/// exits the process when the heartbeat goes stale.
pub fn spawn_watchdog(heartbeat: Heartbeat, timeout: Duration) -> thread::JoinHandle<()> {
    thread::Builder::new()
        .name("quarry-watchdog".to_string())
        .spawn(move || {
            let poll = (timeout / 4).max(Duration::from_millis(250));
            loop {
                thread::sleep(poll);
                if !heartbeat.is_armed() {
                    return;
                }
                if heartbeat.expired(timeout) {
                    let age = heartbeat.age();
                    error!(
                        "Tick thread unresponsive for {:.1}s (limit {:.1}s); terminating",
                        age.as_secs_f64(),
                        timeout.as_secs_f64()
                    );
                    process::exit(WATCHDOG_EXIT_CODE);
                }
            }
        })
        .unwrap_or_else(|e| panic!("failed to spawn watchdog thread: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backdate(hb: &Heartbeat, by: Duration) {
        let then = now_millis().saturating_sub(by.as_millis() as u64);
        hb.last_beat_millis.store(then, Ordering::Relaxed);
    }

    #[test]
    fn heartbeat_age_tracks_beats() {
        let hb = Heartbeat::new();
        hb.beat();
        assert!(hb.age() < Duration::from_secs(1));
        assert!(hb.is_armed());
        hb.disarm();
        assert!(!hb.is_armed());
    }

    #[test]
    fn expires_only_past_the_fatal_threshold() {
        let hb = Heartbeat::new();
        backdate(&hb, Duration::from_secs(5));
        assert!(!hb.expired(Duration::from_secs(10)));
        assert!(hb.expired(Duration::from_secs(4)));
    }

    #[test]
    fn disarmed_heartbeat_never_expires() {
        let hb = Heartbeat::new();
        backdate(&hb, Duration::from_secs(60));
        hb.disarm();
        assert!(!hb.expired(Duration::from_secs(1)));
    }
}
