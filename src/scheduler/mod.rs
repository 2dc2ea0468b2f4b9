//! Background tasks: the daily birthday check and the notification pump
//!
//! Scheduled tasks never touch the session store; they only see
//! [`Services`] and the notifier list.

pub mod jobs;
pub mod notifier;
pub mod task;

use std::sync::Arc;
use std::time::Duration;

use chrono::{FixedOffset, NaiveTime};

use crate::core::config::Config;
use crate::core::error::AppResult;
use crate::services::Services;

pub use jobs::{BirthdayJob, NotificationJob};
pub use notifier::{Notifier, NotifierId, NotifierRegistry};
pub use task::{DeliveryReport, Job, ScheduledTask, Trigger};

/// When the two tasks fire
#[derive(Debug, Clone, Copy)]
pub struct Schedule {
    pub birthday_time: NaiveTime,
    pub timezone: FixedOffset,
    pub notification_interval: Duration,
}

impl Schedule {
    pub fn from_config(config: &Config) -> Self {
        Self {
            birthday_time: config.birthday_check_time,
            timezone: config.timezone,
            notification_interval: config.notification_interval,
        }
    }
}

pub struct Scheduler {
    birthday: ScheduledTask,
    notifications: ScheduledTask,
    notifiers: Arc<NotifierRegistry>,
}

impl Scheduler {
    pub fn new(services: Arc<Services>, schedule: Schedule) -> Self {
        let notifiers = Arc::new(NotifierRegistry::new());
        let birthday = ScheduledTask::new(
            "birthday",
            Arc::new(BirthdayJob::new(Arc::clone(&services), Arc::clone(&notifiers))),
            Trigger::DailyAt {
                time: schedule.birthday_time,
                offset: schedule.timezone,
            },
        );
        let notifications = ScheduledTask::new(
            "notifications",
            Arc::new(NotificationJob::new(
                services.notifications.clone(),
                Arc::clone(&notifiers),
            )),
            Trigger::Every(schedule.notification_interval),
        );
        Self {
            birthday,
            notifications,
            notifiers,
        }
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.birthday = self.birthday.with_stop_grace(grace);
        self.notifications = self.notifications.with_stop_grace(grace);
        self
    }

    pub fn add_notification_callback(&self, notifier: Arc<dyn Notifier>) -> NotifierId {
        self.notifiers.add(notifier)
    }

    pub fn remove_notification_callback(&self, id: NotifierId) -> bool {
        self.notifiers.remove(id)
    }

    pub fn notifiers(&self) -> &NotifierRegistry {
        &self.notifiers
    }

    /// Starts both tasks; already-running tasks are left alone.
    pub async fn start(&self) {
        self.birthday.start().await;
        self.notifications.start().await;
    }

    /// Stops both tasks. Returns `false` if neither was running.
    pub async fn stop(&self) -> bool {
        let birthday = self.birthday.stop().await;
        let notifications = self.notifications.stop().await;
        birthday || notifications
    }

    pub async fn is_running(&self) -> bool {
        self.birthday.is_running().await || self.notifications.is_running().await
    }

    pub async fn run_birthday_check(&self) -> AppResult<DeliveryReport> {
        self.birthday.run_once().await
    }

    pub async fn flush_notifications(&self) -> AppResult<DeliveryReport> {
        self.notifications.run_once().await
    }
}
