//! The two scheduled jobs: birthday bonuses and queued admin notifications

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::error::AppResult;
use crate::scheduler::notifier::NotifierRegistry;
use crate::scheduler::task::{DeliveryReport, Job};
use crate::services::{birthday_summary, NotificationQueue, Services};

/// Awards today's birthday bonuses and reports them to the notifiers
pub struct BirthdayJob {
    services: Arc<Services>,
    notifiers: Arc<NotifierRegistry>,
}

impl BirthdayJob {
    pub fn new(services: Arc<Services>, notifiers: Arc<NotifierRegistry>) -> Self {
        Self { services, notifiers }
    }
}

#[async_trait]
impl Job for BirthdayJob {
    async fn run(&self) -> AppResult<DeliveryReport> {
        let awards = self.services.award_birthdays().await?;
        let Some(summary) = birthday_summary(&awards) else {
            return Ok(DeliveryReport::default());
        };
        if self.notifiers.is_empty() {
            log::info!("{} birthday award(s) made, no notifiers registered", awards.len());
        }
        Ok(self.notifiers.deliver(&summary).await)
    }
}

/// Drains the notification queue into the notifiers
pub struct NotificationJob {
    queue: NotificationQueue,
    notifiers: Arc<NotifierRegistry>,
}

impl NotificationJob {
    pub fn new(queue: NotificationQueue, notifiers: Arc<NotifierRegistry>) -> Self {
        Self { queue, notifiers }
    }
}

#[async_trait]
impl Job for NotificationJob {
    async fn run(&self) -> AppResult<DeliveryReport> {
        let messages = self.queue.drain().await;
        if messages.is_empty() {
            return Ok(DeliveryReport::default());
        }
        if self.notifiers.is_empty() {
            log::debug!("Dropping {} notification(s): no notifiers registered", messages.len());
            return Ok(DeliveryReport::default());
        }

        let mut report = DeliveryReport::default();
        for message in &messages {
            report.merge(self.notifiers.deliver(message).await);
        }
        Ok(report)
    }
}
