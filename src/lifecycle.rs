//! Start-up and shutdown sequencing
//!
//! [`BotController`] owns the router, the per-chat event pump and the
//! scheduler. Nothing is dispatched before [`BotController::run`]; events
//! received earlier wait in the channel.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::core::config::{self, Config};
use crate::core::error::AppResult;
use crate::core::logging;
use crate::engine::event::Event;
use crate::engine::lanes::EventPump;
use crate::engine::reply::Transport;
use crate::engine::router::Router;
use crate::handlers;
use crate::scheduler::{Schedule, Scheduler};
use crate::services::Services;
use crate::workflows;

/// Tunables for the controller; `from_config` for production
#[derive(Debug, Clone, Copy)]
pub struct ControllerOptions {
    pub schedule: Schedule,
    pub session_timeout: Option<Duration>,
    pub shutdown_grace: Duration,
    pub lane_idle: Duration,
}

impl ControllerOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            schedule: Schedule::from_config(config),
            session_timeout: config.session_timeout,
            shutdown_grace: config.shutdown_grace,
            lane_idle: config::lanes::idle(),
        }
    }
}

/// What happened while shutting down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Every lane finished its queue within the grace period
    pub drained: bool,
    pub dispatched_events: u64,
}

pub struct BotController {
    router: Arc<Router>,
    pump: EventPump,
    scheduler: Scheduler,
    shutdown_grace: Duration,
}

impl BotController {
    /// Builds the router with the fixed priority table, the pump and the scheduler.
    pub fn new(services: Arc<Services>, transport: Arc<dyn Transport>, options: ControllerOptions) -> AppResult<Self> {
        let router = Router::new(
            workflows::definitions(),
            handlers::registry(),
            handlers::catch_all(),
            Arc::clone(&services),
            transport,
        )?
        .with_session_timeout(options.session_timeout);
        let router = Arc::new(router);

        let pump = EventPump::new(Arc::clone(&router), options.lane_idle);
        let scheduler = Scheduler::new(services, options.schedule).with_stop_grace(options.shutdown_grace);

        Ok(Self {
            router,
            pump,
            scheduler,
            shutdown_grace: options.shutdown_grace,
        })
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn pump(&self) -> &EventPump {
        &self.pump
    }

    /// Starts the scheduled tasks.
    pub async fn start(&self) {
        self.scheduler.start().await;
        log::info!(
            "Bot controller started: {} workflow(s), {} command(s)",
            self.router.workflow_kinds().len(),
            self.router.commands().len()
        );
    }

    /// Receive loop. Returns after `shutdown` resolves or the event stream
    /// ends, with lanes drained and schedulers stopped.
    pub async fn run<S>(&self, mut events: mpsc::UnboundedReceiver<Event>, shutdown: S) -> ShutdownReport
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut dispatched_events = 0u64;

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    log::info!("Shutdown requested, no longer accepting events");
                    break;
                }
                event = events.recv() => match event {
                    Some(event) => {
                        if self.pump.submit(event) {
                            dispatched_events += 1;
                        }
                    }
                    None => {
                        log::info!("Event stream closed");
                        break;
                    }
                },
            }
        }
        events.close();

        let drained = self.shutdown().await;
        ShutdownReport {
            drained,
            dispatched_events,
        }
    }

    /// Drains the lanes within the grace period, stops the scheduler and
    /// flushes the log. Returns `false` if some lane had to be abandoned.
    pub async fn shutdown(&self) -> bool {
        let drained = self.pump.shutdown(self.shutdown_grace).await;
        if !drained {
            log::warn!(
                "Some chats still had queued events after {}s",
                self.shutdown_grace.as_secs()
            );
        }
        self.scheduler.stop().await;
        log::info!("Bot controller stopped");
        logging::flush();
        drained
    }
}
