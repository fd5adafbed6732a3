use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// Token bucket refilled by a background task; the task stops when the last
/// clone is dropped.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Inner>,
}

struct Inner {
    sem: Arc<Semaphore>,
    refill: JoinHandle<()>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.refill.abort();
    }
}

impl RateLimiter {
    /// Must be called inside a tokio runtime.
    pub fn new(tokens_per_sec: u32) -> Self {
        let sem = Arc::new(Semaphore::new(0));
        let sem_bg = sem.clone();
        let interval_ms = (1000 / tokens_per_sec.max(1)).max(1) as u64;
        let refill = tokio::spawn(async move {
            let mut t = tokio::time::interval(Duration::from_millis(interval_ms));
            t.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                t.tick().await;
                // Cap the bucket so an idle limiter does not allow a burst.
                if sem_bg.available_permits() < 1 {
                    sem_bg.add_permits(1);
                }
            }
        });
        RateLimiter { inner: Arc::new(Inner { sem, refill }) }
    }

    pub async fn acquire(&self) {
        if let Ok(permit) = self.inner.sem.acquire().await {
            permit.forget();
        }
    }
}
