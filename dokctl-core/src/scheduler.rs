use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::task::JoinHandle;
use tokio::time::{ Instant, MissedTickBehavior };
use tracing::debug;

use crate::state::DEFAULT_REFRESH_INTERVAL_MS;

pub type RefreshFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// The function a tick runs. Held in a swappable cell so the timer always
/// invokes whatever was registered last.
pub struct RefreshCallback(Box<dyn Fn() -> RefreshFuture + Send + Sync>);

impl RefreshCallback {
    pub fn new<F, Fut>(f: F) -> Self
        where F: Fn() -> Fut + Send + Sync + 'static, Fut: Future<Output = ()> + Send + 'static
    {
        Self(Box::new(move || Box::pin(f())))
    }

    fn call(&self) -> RefreshFuture {
        (self.0)()
    }
}

/// Periodic refresh timer. One task at most; re-armed when the enabled flag
/// or the interval changes, aborted when disabled or dropped.
pub struct RefreshScheduler {
    current: Arc<ArcSwap<RefreshCallback>>,
    enabled: bool,
    interval: Duration,
    task: Option<JoinHandle<()>>,
}

impl RefreshScheduler {
    /// Created disabled. Must be armed from within a tokio runtime.
    pub fn new(callback: RefreshCallback) -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(callback)),
            enabled: false,
            interval: Duration::from_millis(DEFAULT_REFRESH_INTERVAL_MS),
            task: None,
        }
    }

    /// Replaces the callback without touching the timer phase.
    pub fn set_callback(&self, callback: RefreshCallback) {
        self.current.store(Arc::new(callback));
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if enabled == self.enabled {
            return;
        }
        self.enabled = enabled;
        self.rearm();
    }

    pub fn toggle(&mut self) -> bool {
        self.set_enabled(!self.enabled);
        self.enabled
    }

    pub fn set_interval(&mut self, interval: Duration) {
        if interval == self.interval || interval.is_zero() {
            return;
        }
        self.interval = interval;
        self.rearm();
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_armed(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn rearm(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if !self.enabled {
            debug!("auto refresh disarmed");
            return;
        }

        let current = self.current.clone();
        let period = self.interval;
        debug!(interval_ms = period.as_millis() as u64, "auto refresh armed");
        self.task = Some(
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    ticker.tick().await;
                    let run = current.load().call();
                    run.await;
                }
            })
        );
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{ AtomicUsize, Ordering };

    fn counting(counter: &Arc<AtomicUsize>) -> RefreshCallback {
        let counter = counter.clone();
        RefreshCallback::new(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        })
    }

    async fn advance(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_at_interval() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut scheduler = RefreshScheduler::new(counting(&hits));
        scheduler.set_enabled(true);

        advance(4_999).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        advance(2).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        advance(10_000).await;
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_uses_latest_callback() {
        let old = Arc::new(AtomicUsize::new(0));
        let new = Arc::new(AtomicUsize::new(0));
        let mut scheduler = RefreshScheduler::new(counting(&old));
        scheduler.set_enabled(true);

        advance(2_000).await;
        scheduler.set_callback(counting(&new));
        advance(3_100).await;

        assert_eq!(old.load(Ordering::SeqCst), 0);
        assert_eq!(new.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disable_stops_ticks() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut scheduler = RefreshScheduler::new(counting(&hits));
        assert!(scheduler.toggle());
        advance(5_100).await;
        assert!(!scheduler.toggle());
        assert!(!scheduler.is_armed());

        advance(20_000).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_change_rearms() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut scheduler = RefreshScheduler::new(counting(&hits));
        scheduler.set_enabled(true);

        advance(4_000).await;
        scheduler.set_interval(Duration::from_millis(2_000));
        advance(1_500).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        advance(600).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.interval(), Duration::from_millis(2_000));
    }
}
