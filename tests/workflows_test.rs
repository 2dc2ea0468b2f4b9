//! Conversation workflows driven through the router

mod common;

use std::time::Duration;

use common::{chat_of, TestBot, ADMIN, BARISTA, GUEST};
use loyalty_bot::core::error::ErrorKind;
use loyalty_bot::engine::event::{AdminAction, StaffRole};
use loyalty_bot::engine::router::SESSION_EXPIRED_NOTICE;
use loyalty_bot::engine::{CallbackAction, DraftKey, Dispatched, Step, WorkflowKind};
use loyalty_bot::services::{ClientDirectory, StaffDirectory};
use loyalty_bot::workflows::CANCELLED;
use pretty_assertions::assert_eq;

#[tokio::test]
async fn test_add_points_rejects_negative_amount_then_accepts() {
    let bot = TestBot::new().await;
    let client = bot.client("Анна Смирнова", "+79991234567", 20).await;
    let chat = chat_of(BARISTA);

    bot.text(BARISTA, "/add_points").await;
    let outcome = bot.text(BARISTA, "+7 999 123-45-67").await;
    assert_eq!(
        outcome,
        Dispatched::Workflow {
            kind: WorkflowKind::AddPoints,
            step: Some(Step::Amount)
        }
    );
    let before = bot.router.sessions().get(WorkflowKind::AddPoints, chat).unwrap();

    let outcome = bot.text(BARISTA, "-5").await;
    assert_eq!(
        outcome,
        Dispatched::Workflow {
            kind: WorkflowKind::AddPoints,
            step: Some(Step::Amount)
        }
    );
    let after = bot.router.sessions().get(WorkflowKind::AddPoints, chat).unwrap();
    assert_eq!(after.step, Step::Amount);
    assert_eq!(after.draft, before.draft);
    assert!(bot.transport.last_text(chat).await.contains("положительное"));

    bot.text(BARISTA, "50").await;
    let session = bot.router.sessions().get(WorkflowKind::AddPoints, chat).unwrap();
    assert_eq!(session.step, Step::Confirm);
    assert_eq!(session.draft.number(DraftKey::Amount).unwrap(), 50);
    assert!(bot.transport.last_offers(chat, &CallbackAction::Confirm).await);

    bot.press(BARISTA, CallbackAction::Confirm).await;
    assert_eq!(bot.balance(client.id).await, 70);
    assert!(!bot.router.sessions().contains(WorkflowKind::AddPoints, chat));
    assert!(bot.transport.last_text(chat).await.contains("70"));
}

#[tokio::test]
async fn test_registration_reprompts_on_bad_date() {
    let bot = TestBot::new().await;
    let chat = chat_of(BARISTA);

    bot.press(BARISTA, CallbackAction::RegisterClient).await;
    bot.text(BARISTA, "Иван Петров").await;
    bot.text(BARISTA, "8 (999) 765-43-21").await;
    let before = bot.router.sessions().get(WorkflowKind::Registration, chat).unwrap();
    assert_eq!(before.step, Step::BirthDate);

    bot.text(BARISTA, "not a date").await;
    let after = bot.router.sessions().get(WorkflowKind::Registration, chat).unwrap();
    assert_eq!(after.step, Step::BirthDate);
    assert_eq!(after.draft, before.draft);
    assert!(!after.draft.contains(DraftKey::BirthDate));
    assert!(bot.transport.last_text(chat).await.contains("ДД.ММ.ГГГГ"));

    bot.text(BARISTA, "15.03.1990").await;
    assert!(bot
        .transport
        .last_offers(chat, &CallbackAction::ConfirmRegistration)
        .await);
    bot.press(BARISTA, CallbackAction::ConfirmRegistration).await;

    let client = bot.store.find_by_phone("+79997654321").await.unwrap().unwrap();
    assert_eq!(client.full_name, "Иван Петров");
    assert_eq!(client.telegram_id, None);
    assert!(!bot.router.sessions().contains(WorkflowKind::Registration, chat));
    assert_eq!(bot.services.notifications.drain().await.len(), 1);
}

#[tokio::test]
async fn test_self_registration_links_the_client_account() {
    let bot = TestBot::new().await;
    let chat = chat_of(GUEST);

    bot.text(GUEST, "/start").await;
    assert!(bot.transport.last_offers(chat, &CallbackAction::RegisterSelf).await);

    bot.press(GUEST, CallbackAction::RegisterSelf).await;
    bot.text(GUEST, "Пётр Иванов").await;
    bot.text(GUEST, "9991112233").await;
    bot.text(GUEST, "01.01.1985").await;
    bot.text(GUEST, "да").await;
    // Typed answers are not enough here; the buttons confirm
    assert!(bot.router.sessions().contains(WorkflowKind::SelfRegistration, chat));

    bot.press(GUEST, CallbackAction::ConfirmSelfRegistration).await;
    let client = bot.store.find_by_telegram(GUEST.0).await.unwrap().unwrap();
    assert_eq!(client.phone, "+79991112233");

    // A second attempt reports the existing card instead of starting over
    bot.press(GUEST, CallbackAction::RegisterSelf).await;
    assert!(bot.transport.last_text(chat).await.contains(&client.card_number));
    assert!(!bot.router.sessions().contains(WorkflowKind::SelfRegistration, chat));
}

#[tokio::test]
async fn test_cancel_from_every_registration_step_commits_nothing() {
    let inputs = ["Иван Петров", "+79997654321", "15.03.1990"];

    for (depth, cancel) in (0..=inputs.len()).flat_map(|d| [(d, true), (d, false)]) {
        let bot = TestBot::new().await;
        let chat = chat_of(BARISTA);

        bot.press(BARISTA, CallbackAction::RegisterClient).await;
        for input in &inputs[..depth] {
            bot.text(BARISTA, input).await;
        }
        assert!(bot.router.sessions().contains(WorkflowKind::Registration, chat));

        let outcome = if cancel {
            bot.text(BARISTA, "/cancel").await
        } else {
            bot.press(BARISTA, CallbackAction::Cancel).await
        };
        assert_eq!(
            outcome,
            Dispatched::Workflow {
                kind: WorkflowKind::Registration,
                step: None
            },
            "depth {}",
            depth
        );
        assert!(bot.router.sessions().is_empty());
        assert!(bot.store.find_by_phone("+79997654321").await.unwrap().is_none());
        assert_eq!(bot.transport.last_text(chat).await, CANCELLED);
    }
}

#[tokio::test]
async fn test_cancel_without_a_session_is_neutral() {
    let bot = TestBot::new().await;
    let chat = chat_of(BARISTA);

    assert_eq!(
        bot.text(BARISTA, "/cancel").await,
        Dispatched::Command {
            name: "cancel".to_string()
        }
    );
    assert_eq!(
        bot.press(BARISTA, CallbackAction::Cancel).await,
        Dispatched::Callback { handled: true }
    );
    assert_eq!(bot.transport.texts_to(chat).await.len(), 2);
}

#[tokio::test]
async fn test_entry_again_restarts_the_workflow() {
    let bot = TestBot::new().await;
    bot.client("Анна Смирнова", "+79991234567", 0).await;
    let chat = chat_of(BARISTA);

    bot.text(BARISTA, "/add_points").await;
    bot.text(BARISTA, "+79991234567").await;
    assert_eq!(
        bot.router.sessions().get(WorkflowKind::AddPoints, chat).unwrap().step,
        Step::Amount
    );

    bot.text(BARISTA, "/add_points").await;
    let session = bot.router.sessions().get(WorkflowKind::AddPoints, chat).unwrap();
    assert_eq!(session.step, Step::SelectClient);
    assert!(session.draft.is_empty());
    assert_eq!(bot.router.sessions().len(), 1);
}

#[tokio::test]
async fn test_client_button_preselects_client() {
    let bot = TestBot::new().await;
    let client = bot.client("Анна Смирнова", "+79991234567", 30).await;
    let chat = chat_of(BARISTA);

    bot.press(BARISTA, CallbackAction::SpendPointsFor(client.id)).await;
    let session = bot.router.sessions().get(WorkflowKind::SpendPoints, chat).unwrap();
    assert_eq!(session.step, Step::Amount);
    assert_eq!(session.draft.number(DraftKey::ClientId).unwrap(), client.id);

    bot.text(BARISTA, "40").await;
    bot.press(BARISTA, CallbackAction::Confirm).await;
    // Not enough points: rejected, nothing spent, still waiting for confirmation
    assert_eq!(bot.balance(client.id).await, 30);
    assert!(bot.transport.last_text(chat).await.contains("Недостаточно баллов"));
    assert_eq!(
        bot.router.sessions().get(WorkflowKind::SpendPoints, chat).unwrap().step,
        Step::Confirm
    );
}

#[tokio::test]
async fn test_purchase_checks_redemption_before_confirm() {
    let bot = TestBot::new().await;
    let client = bot.client("Анна Смирнова", "+79991234567", 100).await;
    let chat = chat_of(BARISTA);

    bot.text(BARISTA, "/purchase").await;
    bot.text(BARISTA, &client.card_number).await;
    bot.text(BARISTA, "400").await;

    bot.text(BARISTA, "250").await;
    let session = bot.router.sessions().get(WorkflowKind::Purchase, chat).unwrap();
    assert_eq!(session.step, Step::PointsToRedeem);
    assert!(!session.draft.contains(DraftKey::PointsToRedeem));

    bot.text(BARISTA, "100").await;
    assert_eq!(
        bot.router.sessions().get(WorkflowKind::Purchase, chat).unwrap().step,
        Step::Confirm
    );
    bot.text(BARISTA, "да").await;

    // 100 redeemed, 5% of the remaining 300 accrued
    assert_eq!(bot.balance(client.id).await, 15);
    assert!(bot.router.sessions().is_empty());
}

#[tokio::test]
async fn test_guest_cannot_start_staff_workflows() {
    let bot = TestBot::new().await;
    let chat = chat_of(GUEST);

    for start in ["/add_points", "/spend_points", "/purchase"] {
        bot.text(GUEST, start).await;
        assert!(bot.transport.last_text(chat).await.contains("Недостаточно прав"));
    }
    bot.press(GUEST, CallbackAction::RegisterClient).await;
    bot.press(GUEST, CallbackAction::AddStaff).await;

    assert!(bot.router.sessions().is_empty());
}

#[tokio::test]
async fn test_sessions_are_per_workflow_and_chat() {
    let bot = TestBot::new().await;
    let chat = chat_of(BARISTA);

    bot.text(BARISTA, "/add_points").await;
    bot.press(BARISTA, CallbackAction::RegisterClient).await;
    bot.text(ADMIN, "/purchase").await;

    let mut active = bot.router.sessions().active_in(chat);
    active.sort();
    assert_eq!(active, vec![WorkflowKind::Registration, WorkflowKind::AddPoints]);
    assert_eq!(bot.router.sessions().active_in(chat_of(ADMIN)), vec![WorkflowKind::Purchase]);
    assert_eq!(bot.router.sessions().len(), 3);
}

#[tokio::test]
async fn test_staff_onboarding_and_linking() {
    let bot = TestBot::new().await;
    let admin_chat = chat_of(ADMIN);
    let newcomer = loyalty_bot::engine::UserId(555);

    bot.press(ADMIN, CallbackAction::AddStaff).await;
    bot.text(ADMIN, "Анна Кофейная").await;
    bot.text(ADMIN, "+79995550011").await;
    // Typed text on the role step only repeats the keyboard
    bot.text(ADMIN, "менеджер").await;
    assert_eq!(
        bot.router.sessions().get(WorkflowKind::StaffOnboarding, admin_chat).unwrap().step,
        Step::Role
    );
    bot.press(ADMIN, CallbackAction::Role(StaffRole::Manager)).await;
    bot.press(ADMIN, CallbackAction::Confirm).await;
    assert!(bot.transport.last_text(admin_chat).await.contains("/staff +79995550011"));

    assert_eq!(bot.store.role_of(newcomer).await.unwrap(), None);
    bot.text(newcomer, "/staff +7 999 555 00 11").await;
    assert_eq!(bot.store.role_of(newcomer).await.unwrap(), Some(StaffRole::Manager));
    assert!(bot
        .transport
        .last_offers(chat_of(newcomer), &CallbackAction::Statistics)
        .await);
}

#[tokio::test]
async fn test_barista_cannot_onboard_staff() {
    let bot = TestBot::new().await;

    bot.press(BARISTA, CallbackAction::AddStaff).await;
    assert!(bot.router.sessions().is_empty());
    assert_eq!(bot.store.list_staff().await.unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_idle_session_expires_before_the_next_event() {
    let bot = TestBot::with_session_timeout(Duration::from_secs(60)).await;
    let client = bot.client("Анна Смирнова", "+79991234567", 20).await;
    let chat = chat_of(BARISTA);

    bot.text(BARISTA, "/add_points").await;
    bot.text(BARISTA, "+79991234567").await;

    // Activity inside the timeout keeps the session alive
    tokio::time::advance(Duration::from_secs(45)).await;
    assert_eq!(
        bot.text(BARISTA, "много").await,
        Dispatched::Workflow {
            kind: WorkflowKind::AddPoints,
            step: Some(Step::Amount)
        }
    );
    tokio::time::advance(Duration::from_secs(45)).await;
    assert!(bot.router.sessions().contains(WorkflowKind::AddPoints, chat));

    tokio::time::advance(Duration::from_secs(20)).await;
    let sent_before = bot.transport.texts_to(chat).await.len();
    let outcome = bot.text(BARISTA, "25").await;

    // The stale session is gone and the text is routed as if it never existed
    assert_eq!(outcome, Dispatched::Ignored);
    assert!(bot.router.sessions().is_empty());
    let texts = bot.transport.texts_to(chat).await;
    assert_eq!(texts.len(), sent_before + 1);
    assert_eq!(texts.last().unwrap(), SESSION_EXPIRED_NOTICE);
    assert_eq!(bot.balance(client.id).await, 20);

    // A fresh start works normally
    assert_eq!(
        bot.text(BARISTA, "/add_points").await,
        Dispatched::Workflow {
            kind: WorkflowKind::AddPoints,
            step: Some(Step::SelectClient)
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_sessions_never_expire_without_a_timeout() {
    let bot = TestBot::new().await;
    let chat = chat_of(BARISTA);

    bot.text(BARISTA, "/add_points").await;
    tokio::time::advance(Duration::from_secs(24 * 3600)).await;

    bot.text(BARISTA, "+79990000000").await;
    assert!(bot.router.sessions().contains(WorkflowKind::AddPoints, chat));
    assert!(!bot.transport.texts_to(chat).await.iter().any(|t| t == SESSION_EXPIRED_NOTICE));
}

#[tokio::test]
async fn test_admin_panel_information_buttons() {
    let bot = TestBot::new().await;
    bot.client("Анна Смирнова", "+79991234567", 20).await;
    let chat = chat_of(ADMIN);

    let outcome = bot.press(ADMIN, CallbackAction::Admin(AdminAction::Promotions)).await;
    assert_eq!(outcome, Dispatched::Callback { handled: true });
    assert!(bot.transport.last_text(chat).await.contains("Кешбэк 5%"));

    bot.press(ADMIN, CallbackAction::Admin(AdminAction::SystemSettings)).await;
    let text = bot.transport.last_text(chat).await;
    assert!(text.contains("UTC+00:00"));
    assert!(text.contains("В день рождения: 10 баллов"));

    bot.press(ADMIN, CallbackAction::Admin(AdminAction::BackupData)).await;
    assert!(bot
        .transport
        .last_text(chat)
        .await
        .contains("LC000001;Анна Смирнова;+79991234567;1990-03-15;20;"));

    // Staff below admin are refused
    let outcome = bot.press(BARISTA, CallbackAction::Admin(AdminAction::BackupData)).await;
    assert_eq!(outcome, Dispatched::Failed { kind: ErrorKind::Business });
    assert!(bot.transport.last_text(chat_of(BARISTA)).await.contains("Недостаточно прав"));
    assert!(bot.router.sessions().is_empty());
}
