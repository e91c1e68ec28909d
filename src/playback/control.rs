use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Granularity of the pause spin and of interruptible delays.
pub const PAUSE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Level-triggered pause/stop flags shared between a Player's controller and
/// its worker. The worker only observes them at step boundaries, inside the
/// pause spin, between retries and during delays.
#[derive(Debug, Default)]
pub struct RunControl {
    stop: AtomicBool,
    pause: AtomicBool,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear both flags before a new run.
    pub fn reset(&self) {
        self.stop.store(false, Ordering::SeqCst);
        self.pause.store(false, Ordering::SeqCst);
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        self.pause.store(false, Ordering::SeqCst);
    }

    pub fn request_pause(&self) {
        self.pause.store(true, Ordering::SeqCst);
    }

    pub fn clear_pause(&self) {
        self.pause.store(false, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.pause.load(Ordering::SeqCst)
    }

    /// Park while paused. Returns `false` if a stop was requested, either
    /// before or during the wait.
    pub async fn wait_while_paused(&self) -> bool {
        while self.is_paused() {
            if self.is_stopped() {
                return false;
            }
            tokio::time::sleep(PAUSE_POLL_INTERVAL).await;
        }
        !self.is_stopped()
    }

    /// Sleep for `duration` in slices, returning early (with `false`) once a
    /// stop is requested.
    pub async fn sleep(&self, duration: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + duration;
        loop {
            if self.is_stopped() {
                return false;
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return true;
            }
            tokio::time::sleep((deadline - now).min(PAUSE_POLL_INTERVAL)).await;
        }
    }
}
