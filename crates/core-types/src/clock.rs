use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

/// Source of time and sleeps for every component that waits.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Monotonic instant used for budgets and elapsed-time checks.
    fn now(&self) -> Instant;

    /// Wall-clock milliseconds since the Unix epoch, used to stamp learned selectors.
    fn unix_millis(&self) -> i64;

    async fn sleep(&self, duration: Duration);
}

pub type SharedClock = Arc<dyn Clock>;

/// Real clock backed by tokio timers.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl SystemClock {
    pub fn shared() -> SharedClock {
        Arc::new(SystemClock)
    }
}

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn unix_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

/// Test clock: sleeping advances virtual time instantly and is recorded.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    epoch_millis: i64,
    state: Mutex<ManualState>,
}

#[derive(Debug, Default)]
struct ManualState {
    elapsed: Duration,
    sleeps: Vec<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::starting_at(1_700_000_000_000)
    }

    pub fn starting_at(epoch_millis: i64) -> Self {
        Self {
            origin: Instant::now(),
            epoch_millis,
            state: Mutex::new(ManualState::default()),
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Moves virtual time forward without recording a sleep.
    pub fn advance(&self, duration: Duration) {
        self.state.lock().elapsed += duration;
    }

    pub fn elapsed(&self) -> Duration {
        self.state.lock().elapsed
    }

    /// Every sleep requested so far, in call order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.state.lock().sleeps.clone()
    }

    pub fn total_slept(&self) -> Duration {
        self.state.lock().sleeps.iter().sum()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.state.lock().elapsed
    }

    fn unix_millis(&self) -> i64 {
        let elapsed = self.state.lock().elapsed;
        self.epoch_millis + elapsed.as_millis() as i64
    }

    async fn sleep(&self, duration: Duration) {
        {
            let mut state = self.state.lock();
            state.elapsed += duration;
            state.sleeps.push(duration);
        }
        // Lets other tasks on the runtime make progress between virtual sleeps.
        tokio::task::yield_now().await;
    }
}
