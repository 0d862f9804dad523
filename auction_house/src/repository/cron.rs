use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::Future;
use model::AuctionId;
use tokio::sync::Mutex;
use tokio::time::{Instant, MissedTickBehavior};

pub type CronFn = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    AuctionDeadline(AuctionId),
    AwardTimeout(AuctionId),
}

#[derive(Debug, Clone)]
pub struct TaskEntry {
    pub task:       Task,
    pub created_at: DateTime<Utc>,
}

/// Runs delayed and periodic jobs on the tokio runtime.
#[derive(Debug, Default)]
pub struct Cron {
    next_id: AtomicU64,
    tasks:   Arc<Mutex<HashMap<u64, TaskEntry>>>,
}

impl Cron {
    pub fn new() -> Self { Self::default() }

    /// Run `callback` every `period`, the first run happening one period
    /// from now.
    pub fn add_periodic<T>(&self, period: Duration, callback: T)
    where
        T: 'static,
        T: Fn() -> CronFn + Send + Sync,
    {
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                tokio::spawn(callback());
            }
        });
    }

    // Add a job to execute in <duration> time
    pub async fn add_oneshot<T>(
        &self,
        duration: Duration,
        task: Task,
        callback: T,
    ) where
        T: 'static,
        T: FnOnce() -> CronFn + Send,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let entry = TaskEntry { task, created_at: Utc::now() };
        self.tasks.lock().await.insert(id, entry);

        let tasks = self.tasks.clone();
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            if let Some(entry) = tasks.lock().await.remove(&id) {
                trace!("Firing {:?} armed at {}", entry.task, entry.created_at);
            }
            callback().await
        });
    }

    /// Oneshot jobs not fired yet.
    #[cfg(test)]
    pub async fn pending(&self) -> Vec<TaskEntry> {
        self.tasks.lock().await.values().cloned().collect()
    }
}

/// Time left until `at`, zero if it is already past.
pub fn until(at: DateTime<Utc>) -> Duration {
    (at - Utc::now()).to_std().unwrap_or(Duration::ZERO)
}
