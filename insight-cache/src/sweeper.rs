//! Background expiry sweep
//!
//! A fixed-period tokio task, independent of request volume. The task lives as
//! long as the [`ExpirySweeper`] handle: `stop` ends it gracefully and
//! dropping the handle aborts it.

use std::future::Future;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Handle to a running sweep task
#[derive(Debug)]
pub struct ExpirySweeper {
    interval: Duration,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ExpirySweeper {
    /// Spawn the task on the current tokio runtime
    ///
    /// `sweep` runs once per `interval` (first run one interval after start)
    /// and returns how many entries it removed.
    pub fn start<F, Fut>(interval: Duration, sweep: F) -> Self
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = usize> + Send + 'static,
    {
        let (shutdown, mut stopped) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = &mut stopped => break,
                    _ = ticker.tick() => {
                        let removed = sweep().await;
                        if removed > 0 {
                            debug!(removed, "Expiry sweep removed entries");
                        }
                    }
                }
            }

            debug!("Expiry sweeper stopped");
        });

        info!("Started expiry sweeper (interval: {:?})", interval);

        Self {
            interval,
            shutdown: Some(shutdown),
            handle: Some(handle),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Signal the task and wait for it to finish. An in-progress sweep completes first.
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
