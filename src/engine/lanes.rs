//! Per-chat execution lanes
//!
//! The receive loop hands events to [`EventPump::submit`]. Each chat with
//! pending events gets one worker task draining an unbounded FIFO, so events
//! from one chat run in arrival order while different chats run concurrently.
//! A worker with nothing to do for [`crate::core::config::lanes::idle`] retires.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;

use crate::engine::event::{ChatId, Event};
use crate::engine::router::Router;

struct Lane {
    id: u64,
    tx: mpsc::UnboundedSender<Event>,
}

pub struct EventPump {
    router: Arc<Router>,
    lanes: Arc<DashMap<ChatId, Lane>>,
    tracker: TaskTracker,
    idle: Duration,
    next_lane: AtomicU64,
    closed: AtomicBool,
}

impl EventPump {
    pub fn new(router: Arc<Router>, idle: Duration) -> Self {
        Self {
            router,
            lanes: Arc::new(DashMap::new()),
            tracker: TaskTracker::new(),
            idle,
            next_lane: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Queues an event on its chat's lane. Returns false once shutdown has begun.
    pub fn submit(&self, event: Event) -> bool {
        if self.closed.load(Ordering::Acquire) {
            log::warn!("Dropping update {} for chat {}: shutting down", event.update_id, event.chat);
            return false;
        }

        // Sends happen while the map entry is held so a retiring worker
        // cannot miss an event queued behind its back.
        match self.lanes.entry(event.chat) {
            Entry::Occupied(mut entry) => {
                if let Err(mpsc::error::SendError(event)) = entry.get().tx.send(event) {
                    let lane = self.spawn_lane(event.chat, event);
                    entry.insert(lane);
                }
            }
            Entry::Vacant(entry) => {
                let chat = event.chat;
                entry.insert(self.spawn_lane(chat, event));
            }
        }
        true
    }

    fn spawn_lane(&self, chat: ChatId, first: Event) -> Lane {
        let id = self.next_lane.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        // The receiver is alive, so this cannot fail
        let _ = tx.send(first);

        let router = Arc::clone(&self.router);
        let lanes = Arc::clone(&self.lanes);
        let idle = self.idle;
        self.tracker.spawn(run_lane(router, lanes, chat, id, rx, idle));
        log::trace!("Lane {} opened for chat {}", id, chat);

        Lane { id, tx }
    }

    pub fn active_lanes(&self) -> usize {
        self.lanes.len()
    }

    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Stops accepting events, lets lanes drain, abandons them after `grace`.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.closed.store(true, Ordering::Release);
        // Dropping the senders ends each worker after its queued events
        self.lanes.clear();
        self.tracker.close();

        match tokio::time::timeout(grace, self.tracker.wait()).await {
            Ok(()) => {
                log::info!("All chat lanes drained");
                true
            }
            Err(_) => {
                log::warn!(
                    "Abandoning {} chat lane(s) still busy after {}s",
                    self.tracker.len(),
                    grace.as_secs()
                );
                false
            }
        }
    }
}

async fn run_lane(
    router: Arc<Router>,
    lanes: Arc<DashMap<ChatId, Lane>>,
    chat: ChatId,
    id: u64,
    mut rx: mpsc::UnboundedReceiver<Event>,
    idle: Duration,
) {
    loop {
        match tokio::time::timeout(idle, rx.recv()).await {
            Ok(Some(event)) => {
                router.dispatch(event).await;
            }
            Ok(None) => break,
            Err(_) => {
                let retired = lanes.remove_if(&chat, |_, lane| lane.id == id && rx.is_empty());
                if retired.is_some() {
                    log::trace!("Lane {} for chat {} retired", id, chat);
                    break;
                }
            }
        }
    }
}
