use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Tick cadence for the failure meter.
pub const TICK_INTERVAL: Duration = Duration::from_secs(5);

// 15-minute exponentially weighted moving average, ticked every 5s.
const ALPHA: f64 = 1.0 - 0.994459848; // 1 - exp(-5/60/15)
const INTERVAL_SECS: f64 = 5.0;

#[derive(Debug, Default)]
struct MeterInner {
    uncounted: u64,
    rate: f64,
    initialized: bool,
}

/// Decaying delivery-failure rate, consulted by operators via /status.
/// Business logic never reads it.
#[derive(Clone, Debug, Default)]
pub struct FailureMeter {
    inner: Arc<Mutex<MeterInner>>,
}

impl FailureMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self) {
        let mut inner = self.inner.lock().expect("failure meter poisoned");
        inner.uncounted += 1;
    }

    /// Folds counts recorded since the last tick into the moving average.
    pub fn tick(&self) {
        let mut inner = self.inner.lock().expect("failure meter poisoned");
        let instant_rate = inner.uncounted as f64 / INTERVAL_SECS;
        inner.uncounted = 0;
        if inner.initialized {
            inner.rate += ALPHA * (instant_rate - inner.rate);
        } else {
            inner.rate = instant_rate;
            inner.initialized = true;
        }
    }

    /// Failures per second.
    pub fn rate(&self) -> f64 {
        self.inner.lock().expect("failure meter poisoned").rate
    }

    /// Background ticker; runs for the life of the process.
    pub fn start_ticker(&self) -> tokio::task::JoinHandle<()> {
        let meter = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(TICK_INTERVAL);
            loop {
                interval.tick().await;
                meter.tick();
            }
        })
    }
}
