//! Clock and sleep, injectable so delay steps can be tested without waiting.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Source of wall-clock time and suspension for the executor.
#[async_trait]
pub trait Timer: Send + Sync {
    /// Current wall-clock instant, used to resolve `specific` delays.
    fn now(&self) -> DateTime<Utc>;

    /// Suspend the calling run for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Production timer: system clock plus `tokio::time::sleep`.
///
/// Under tokio's paused test clock the sleeps auto-advance, but `now()`
/// still reads the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioTimer;

#[async_trait]
impl Timer for TokioTimer {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Virtual timer: sleeps return immediately, advance `now()` by the
/// requested duration and are recorded.
#[derive(Debug)]
pub struct ManualTimer {
    now: Mutex<DateTime<Utc>>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualTimer {
    pub fn starting_at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    /// Every duration passed to `sleep`, in call order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl Timer for ManualTimer {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(duration);
        let step = chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX);
        {
            let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
            *now = now.checked_add_signed(step).unwrap_or(DateTime::<Utc>::MAX_UTC);
        }
        tokio::task::yield_now().await;
    }
}
