//! A restartable periodic task
//!
//! Each [`ScheduledTask`] owns at most one background loop. `start` and
//! `stop` are idempotent; once `stop` returns the job will not fire again
//! until the next `start`.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveTime, Utc};
use futures_util::FutureExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::config;
use crate::core::error::AppResult;

/// How many notifier deliveries a run made and how many failed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

impl DeliveryReport {
    pub fn merge(&mut self, other: DeliveryReport) {
        self.delivered += other.delivered;
        self.failed += other.failed;
    }
}

/// Work performed on each firing
#[async_trait]
pub trait Job: Send + Sync {
    async fn run(&self) -> AppResult<DeliveryReport>;
}

/// When a task fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Every `period`, first firing one period after start
    Every(Duration),
    /// Once a day at `time` in the given UTC offset
    DailyAt { time: NaiveTime, offset: FixedOffset },
}

impl Trigger {
    /// Time left until the next firing, counted from `now`
    pub fn next_delay(&self, now: DateTime<Utc>) -> Duration {
        match *self {
            Trigger::Every(period) => period,
            Trigger::DailyAt { time, offset } => {
                let local = now.with_timezone(&offset).naive_local();
                let mut target = local.date().and_time(time);
                if target <= local {
                    target += chrono::Duration::days(1);
                }
                (target - local).to_std().unwrap_or(Duration::ZERO)
            }
        }
    }
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct ScheduledTask {
    name: &'static str,
    job: Arc<dyn Job>,
    trigger: Trigger,
    stop_grace: Duration,
    running: Mutex<Option<Running>>,
}

impl ScheduledTask {
    pub fn new(name: &'static str, job: Arc<dyn Job>, trigger: Trigger) -> Self {
        Self {
            name,
            job,
            trigger,
            stop_grace: config::scheduler::stop_grace(),
            running: Mutex::new(None),
        }
    }

    /// How long `stop` waits for an in-flight run before aborting it
    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn trigger(&self) -> Trigger {
        self.trigger
    }

    pub async fn is_running(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    /// Spawns the loop. Returns `false` if it was already running.
    pub async fn start(&self) -> bool {
        let mut running = self.running.lock().await;
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            log::debug!("Task {} already running", self.name);
            return false;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_loop(
            self.name,
            Arc::clone(&self.job),
            self.trigger,
            cancel.clone(),
        ));
        *running = Some(Running { cancel, handle });
        log::info!("Task {} started ({:?})", self.name, self.trigger);
        true
    }

    /// Cancels the loop and waits for an in-flight run up to the grace period,
    /// then aborts it. Returns `false` if the task was not running.
    pub async fn stop(&self) -> bool {
        let Some(Running { cancel, mut handle }) = self.running.lock().await.take() else {
            return false;
        };
        cancel.cancel();

        match tokio::time::timeout(self.stop_grace, &mut handle).await {
            Ok(Ok(())) => log::info!("Task {} stopped", self.name),
            Ok(Err(e)) => log::warn!("Task {} ended abnormally: {}", self.name, e),
            Err(_) => {
                handle.abort();
                log::warn!(
                    "Task {} did not finish within {}s, aborted",
                    self.name,
                    self.stop_grace.as_secs()
                );
            }
        }
        true
    }

    /// Fires the job right now, outside the schedule.
    pub async fn run_once(&self) -> AppResult<DeliveryReport> {
        log::info!("Task {} fired manually", self.name);
        self.job.run().await
    }
}

async fn run_loop(name: &'static str, job: Arc<dyn Job>, trigger: Trigger, cancel: CancellationToken) {
    loop {
        let delay = trigger.next_delay(Utc::now());
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }

        match AssertUnwindSafe(job.run()).catch_unwind().await {
            Ok(Ok(report)) => log::debug!(
                "Task {} run: {} delivered, {} failed",
                name,
                report.delivered,
                report.failed
            ),
            Ok(Err(e)) => log::error!("Task {} failed: {}", name, e),
            Err(_) => log::error!("Task {} panicked, the schedule continues", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter(AtomicUsize);

    #[async_trait]
    impl Job for Counter {
        async fn run(&self) -> AppResult<DeliveryReport> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(DeliveryReport::default())
        }
    }

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn test_daily_trigger_counts_in_local_offset() {
        let trigger = Trigger::DailyAt {
            time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            offset: FixedOffset::east_opt(3 * 3600).unwrap(),
        };
        // 05:00 UTC is 08:00 at +03:00: one hour to go
        assert_eq!(trigger.next_delay(utc(2024, 3, 15, 5, 0)), Duration::from_secs(3600));
        // 06:00 UTC is exactly 09:00 local: the next firing is tomorrow
        assert_eq!(
            trigger.next_delay(utc(2024, 3, 15, 6, 0)),
            Duration::from_secs(24 * 3600)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_task_fires_until_stopped() {
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let task = ScheduledTask::new("counter", counter.clone(), Trigger::Every(Duration::from_secs(10)));

        assert!(task.start().await);
        assert!(!task.start().await);
        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(counter.0.load(Ordering::SeqCst), 3);

        assert!(task.stop().await);
        assert!(!task.stop().await);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(counter.0.load(Ordering::SeqCst), 3);
    }
}
