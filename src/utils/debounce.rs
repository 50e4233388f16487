//! Cancellable delayed task
//!
//! Scheduling new work cancels whatever is still waiting or running, so only
//! the latest input ever completes.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::trace;

pub struct DelayedTask {
    delay: Duration,
    handle: Option<JoinHandle<()>>,
}

impl DelayedTask {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            handle: None,
        }
    }

    /// Run `work` after the delay, cancelling any previously scheduled work.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule<F>(&mut self, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        let delay = self.delay;
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            work.await;
        }));
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            if !handle.is_finished() {
                trace!("Cancelling delayed task");
            }
            handle.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.handle.as_ref().map_or(false, |h| !h.is_finished())
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Drop for DelayedTask {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    #[tokio::test(start_paused = true)]
    async fn test_runs_after_delay() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut task = DelayedTask::new(Duration::from_millis(300));

        task.schedule(async move {
            let _ = tx.send("fired");
        });
        assert!(task.is_pending());

        tokio::time::sleep(Duration::from_millis(310)).await;
        assert_eq!(rx.recv().await, Some("fired"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_schedule_cancels_previous() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut task = DelayedTask::new(Duration::from_millis(300));

        for query in ["w", "wh", "wha"] {
            let tx = tx.clone();
            task.schedule(async move {
                let _ = tx.send(query);
            });
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        drop(tx);

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(rx.recv().await, Some("wha"));
        // Senders of the cancelled tasks were dropped with them.
        task.cancel();
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_run() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut task = DelayedTask::new(Duration::from_millis(50));

        let c = Arc::clone(&counter);
        task.schedule(async move {
            c.fetch_add(1, Ordering::SeqCst);
        });
        task.cancel();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert!(!task.is_pending());
    }
}
