//! Controller start-up, receive loop and shutdown

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::{FixedOffset, NaiveTime};
use tokio::sync::mpsc;

use common::{chat_of, TestBot, BARISTA, GUEST};
use loyalty_bot::engine::{CallbackAction, Event};
use loyalty_bot::lifecycle::{BotController, ControllerOptions, ShutdownReport};
use loyalty_bot::scheduler::Schedule;
use pretty_assertions::assert_eq;

fn options() -> ControllerOptions {
    ControllerOptions {
        schedule: Schedule {
            birthday_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            timezone: FixedOffset::east_opt(3 * 3600).unwrap(),
            notification_interval: Duration::from_secs(60),
        },
        session_timeout: None,
        shutdown_grace: Duration::from_secs(5),
        lane_idle: Duration::from_secs(1),
    }
}

fn controller(bot: &TestBot) -> BotController {
    BotController::new(Arc::clone(&bot.services), bot.transport.clone(), options()).unwrap()
}

#[tokio::test]
async fn test_events_received_before_run_are_processed() {
    let bot = TestBot::new().await;
    let client = bot.client("Анна Смирнова", "+79991234567", 0).await;
    let controller = controller(&bot);
    let (tx, rx) = mpsc::unbounded_channel();
    let chat = chat_of(BARISTA);

    tx.send(Event::callback(chat, BARISTA, CallbackAction::AddPointsFor(client.id)))
        .unwrap();
    tx.send(Event::text(chat, BARISTA, "25")).unwrap();
    tx.send(Event::text(chat, BARISTA, "да")).unwrap();
    tx.send(Event::from_message(4, chat_of(GUEST), GUEST, "/start")).unwrap();
    // Nothing has been dispatched yet
    assert_eq!(bot.transport.count().await, 0);

    controller.start().await;
    assert!(controller.scheduler().is_running().await);
    drop(tx);

    let report = controller.run(rx, std::future::pending()).await;
    assert_eq!(
        report,
        ShutdownReport {
            drained: true,
            dispatched_events: 4
        }
    );
    assert_eq!(bot.balance(client.id).await, 25);
    assert_eq!(bot.transport.texts_to(chat_of(GUEST)).await.len(), 1);
    assert!(!controller.scheduler().is_running().await);
    assert!(controller.router().sessions().is_empty());
}

#[tokio::test]
async fn test_shutdown_stops_accepting_events() {
    let bot = TestBot::new().await;
    let controller = controller(&bot);
    let (tx, rx) = mpsc::unbounded_channel();

    controller.start().await;
    tx.send(Event::from_message(1, chat_of(GUEST), GUEST, "/start")).unwrap();

    let report = controller.run(rx, std::future::ready(())).await;
    assert_eq!(report.dispatched_events, 0);
    assert!(report.drained);
    assert!(!controller.scheduler().is_running().await);

    // The receiver is closed, and the pump refuses late events
    assert!(tx.send(Event::from_message(2, chat_of(GUEST), GUEST, "/start")).is_err());
    assert!(!controller
        .pump()
        .submit(Event::from_message(3, chat_of(GUEST), GUEST, "/start")));
    assert_eq!(bot.transport.count().await, 0);
}

#[tokio::test]
async fn test_session_state_survives_across_events_in_run() {
    let bot = TestBot::new().await;
    let controller = controller(&bot);
    let (tx, rx) = mpsc::unbounded_channel();
    let chat = chat_of(BARISTA);

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let feeder = tokio::spawn(async move {
        tx.send(Event::callback(chat, BARISTA, CallbackAction::RegisterClient)).unwrap();
        tx.send(Event::text(chat, BARISTA, "Иван Петров")).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        stop_tx.send(()).unwrap();
        tx
    });

    let report = controller
        .run(rx, async {
            let _ = stop_rx.await;
        })
        .await;
    let _tx = feeder.await.unwrap();

    assert_eq!(report.dispatched_events, 2);
    let session = controller
        .router()
        .sessions()
        .get(loyalty_bot::engine::WorkflowKind::Registration, chat)
        .unwrap();
    assert_eq!(session.step, loyalty_bot::engine::Step::Phone);
}
