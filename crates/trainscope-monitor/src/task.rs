//! Cancellable repeating task.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, trace};

/// A spawned task that calls a closure every `period`.
///
/// The first call happens one full period after [`RepeatingTask::start`].
/// The task ends when the closure returns `false`, when [`stop`] is called,
/// or when the handle is dropped.
///
/// [`stop`]: RepeatingTask::stop
#[derive(Debug)]
pub struct RepeatingTask {
    name: &'static str,
    period: Duration,
    handle: Option<JoinHandle<()>>,
}

impl RepeatingTask {
    /// Spawn the task on the current runtime.
    pub fn start<F>(name: &'static str, period: Duration, mut on_tick: F) -> Self
    where
        F: FnMut() -> bool + Send + 'static,
    {
        debug!(task = name, ?period, "Starting repeating task");
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                trace!(task = name, "Tick");
                if !on_tick() {
                    break;
                }
            }
        });

        Self {
            name,
            period,
            handle: Some(handle),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Whether the task is still scheduled.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Cancel the task. Returns `true` if it was still running.
    pub fn stop(&mut self) -> bool {
        match self.handle.take() {
            Some(handle) => {
                let was_running = !handle.is_finished();
                handle.abort();
                debug!(task = self.name, "Stopped repeating task");
                was_running
            }
            None => false,
        }
    }
}

impl Drop for RepeatingTask {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn counter_task(period: Duration) -> (RepeatingTask, Arc<AtomicU32>) {
        let ticks = Arc::new(AtomicU32::new(0));
        let counter = ticks.clone();
        let task = RepeatingTask::start("test", period, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        });
        (task, ticks)
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_after_one_period() {
        let (_task, ticks) = counter_task(Duration::from_secs(60));

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_future_ticks() {
        let (mut task, ticks) = counter_task(Duration::from_millis(500));

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 2);

        assert!(task.stop());
        assert!(!task.stop());
        assert!(!task.is_running());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closure_can_end_task() {
        let ticks = Arc::new(AtomicU32::new(0));
        let counter = ticks.clone();
        let task = RepeatingTask::start("once", Duration::from_secs(1), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            false
        });

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
        assert!(!task.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels() {
        let (task, ticks) = counter_task(Duration::from_secs(1));
        drop(task);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
    }
}
