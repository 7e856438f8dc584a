use std::time::Duration;

use async_trait::async_trait;

/// Decides when the next cycle starts.
#[async_trait]
pub trait Pacer: Send {
    /// Resolves when the next cycle may begin.
    async fn tick(&mut self);
}

/// Runs the first cycle immediately, then waits a fixed interval after
/// each cycle before starting the next one.
#[derive(Debug, Clone)]
pub struct FixedInterval {
    interval: Duration,
    started: bool,
}

impl FixedInterval {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            started: false,
        }
    }

    pub fn from_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

#[async_trait]
impl Pacer for FixedInterval {
    async fn tick(&mut self) {
        if !self.started {
            self.started = true;
            return;
        }
        tokio::time::sleep(self.interval).await;
    }
}
