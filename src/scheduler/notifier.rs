//! Subscribers for scheduled-task output

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::core::error::TransportError;
use crate::scheduler::task::DeliveryReport;

/// Receives birthday summaries and queued admin notifications
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str) -> Result<(), TransportError>;
}

/// Handle returned by [`NotifierRegistry::add`], used to remove the notifier again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NotifierId(u64);

/// Observer list. Delivery goes to every notifier in registration order;
/// one notifier failing does not stop the others.
#[derive(Default)]
pub struct NotifierRegistry {
    next_id: AtomicU64,
    notifiers: DashMap<NotifierId, Arc<dyn Notifier>>,
}

impl NotifierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, notifier: Arc<dyn Notifier>) -> NotifierId {
        let id = NotifierId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.notifiers.insert(id, notifier);
        id
    }

    pub fn remove(&self, id: NotifierId) -> bool {
        self.notifiers.remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.notifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }

    fn snapshot(&self) -> Vec<(NotifierId, Arc<dyn Notifier>)> {
        let mut notifiers: Vec<_> = self
            .notifiers
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();
        notifiers.sort_by_key(|(id, _)| *id);
        notifiers
    }

    /// Sends `message` to every notifier; failures are logged and counted.
    pub async fn deliver(&self, message: &str) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        // No map guard is held across the sends
        for (id, notifier) in self.snapshot() {
            match notifier.notify(message).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    log::warn!("Notifier {:?} failed: {}", id, e);
                }
            }
        }
        report
    }
}
