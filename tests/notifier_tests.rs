// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Change notifier tests.

use async_trait::async_trait;
use carshare_bot::bot::{ChatTransport, Menu, OutboundMessage};
use carshare_bot::config::Config;
use carshare_bot::db::CredentialStore;
use carshare_bot::error::AppError;
use carshare_bot::services::{ChangeNotifier, ChangeSignal};
use carshare_bot::AppContext;
use std::sync::Arc;

mod common;
use common::TestEnv;

fn balance_only() -> Config {
    Config {
        notify_signals: vec![ChangeSignal::Balance],
        ..Config::default()
    }
}

#[tokio::test]
async fn test_balance_change_notifies_once_and_advances_watermark() {
    let env = TestEnv::with_config(balance_only());
    env.seed_company(7, "Acme", 500.0).await;
    let mut user = env.seed_user(1, "+7", 7, true).await;
    user.last_balance = 500.0;
    env.ctx.store.save_user(&user).await.unwrap();
    let notifier = ChangeNotifier::new(&env.ctx);

    env.portal.set_balance(7, 1500.0);
    let report = notifier.tick().await;

    assert_eq!(report.companies_refreshed, 1);
    assert_eq!(report.notifications_sent, 1);
    let texts = env.transport.texts_to(1);
    assert_eq!(texts.len(), 1);
    assert!(texts[0].contains("1500.00"));
    assert_eq!(env.user(1).await.last_balance, 1500.0);

    // Nothing changed since: no second notification.
    let report = notifier.tick().await;
    assert_eq!(report.notifications_sent, 0);
    assert_eq!(env.transport.sent_to(1).len(), 1);
}

#[tokio::test]
async fn test_failed_delivery_keeps_watermark() {
    let env = TestEnv::with_config(balance_only());
    env.seed_company(7, "Acme", 500.0).await;
    let mut user = env.seed_user(1, "+7", 7, true).await;
    user.last_balance = 500.0;
    env.ctx.store.save_user(&user).await.unwrap();
    let notifier = ChangeNotifier::new(&env.ctx);

    env.portal.set_balance(7, 1500.0);
    env.transport.set_unreachable(1, true);
    let report = notifier.tick().await;

    assert_eq!(report.deliveries_failed, 1);
    assert_eq!(report.notifications_sent, 0);
    assert_eq!(env.user(1).await.last_balance, 500.0);

    // Delivered on the next tick once the chat is reachable again.
    env.transport.set_unreachable(1, false);
    let report = notifier.tick().await;
    assert_eq!(report.notifications_sent, 1);
    assert_eq!(env.user(1).await.last_balance, 1500.0);
}

#[tokio::test]
async fn test_failing_company_does_not_block_others() {
    let env = TestEnv::with_config(balance_only());
    env.seed_company(7, "Acme", 500.0).await;
    env.seed_company(8, "Globex", 500.0).await;
    env.seed_user(1, "+7", 7, true).await;
    env.seed_user(2, "+8", 8, true).await;
    let notifier = ChangeNotifier::new(&env.ctx);

    env.portal.fail_company(7);
    env.portal.set_balance(8, 2500.0);
    let report = notifier.tick().await;

    assert_eq!(report.companies_failed, 1);
    assert_eq!(report.companies_refreshed, 1);
    assert!(env.transport.sent_to(1).is_empty());
    assert_eq!(env.transport.sent_to(2).len(), 1);
    assert_eq!(env.user(2).await.last_balance, 2500.0);
}

#[tokio::test]
async fn test_user_without_access_is_skipped() {
    let env = TestEnv::with_config(balance_only());
    env.seed_company(7, "Acme", 500.0).await;
    env.portal.set_employees(7, &["79990000000"]);
    env.seed_user(2, "79990000000", 7, false).await;
    env.seed_user(3, "79990000001", 7, false).await;
    let notifier = ChangeNotifier::new(&env.ctx);

    env.portal.set_balance(7, 800.0);
    let report = notifier.tick().await;

    assert_eq!(report.users_skipped, 1);
    assert_eq!(env.transport.sent_to(2).len(), 1);
    assert!(env.transport.sent_to(3).is_empty());
    assert_eq!(env.user(3).await.last_balance, 0.0);
}

#[tokio::test]
async fn test_new_ride_notifies() {
    let env = TestEnv::new();
    env.seed_company(7, "Acme", 0.0).await;
    let mut user = env.seed_user(1, "+7", 7, true).await;
    user.last_ride_id = 41;
    env.ctx.store.save_user(&user).await.unwrap();
    let notifier = ChangeNotifier::new(&env.ctx);

    env.portal.push_ride(7, 41);
    assert_eq!(notifier.tick().await.notifications_sent, 0);

    env.portal.push_ride(7, 42);
    let report = notifier.tick().await;
    assert_eq!(report.notifications_sent, 1);
    let texts = env.transport.texts_to(1);
    assert!(texts[0].contains("New ride in Acme"));
    assert!(texts[0].contains("Tverskaya 1 → Arbat 10"));
    assert_eq!(env.user(1).await.last_ride_id, 42);
}

#[tokio::test]
async fn test_company_without_rides_yields_no_ride_notification() {
    let env = TestEnv::new();
    env.seed_company(7, "Acme", 0.0).await;
    env.seed_user(1, "+7", 7, true).await;

    let report = ChangeNotifier::new(&env.ctx).tick().await;

    assert_eq!(report.notifications_sent, 0);
    assert_eq!(env.user(1).await.last_ride_id, 0);
}

#[tokio::test]
async fn test_refreshed_session_is_reused_between_ticks() {
    let env = TestEnv::with_config(balance_only());
    env.seed_company(7, "Acme", 500.0).await;
    env.seed_user(1, "+7", 7, true).await;
    let notifier = ChangeNotifier::new(&env.ctx);

    notifier.tick().await;
    notifier.tick().await;

    assert_eq!(env.portal.login_count(), 1);
    assert!(env.company(7).await.session.token().is_some());
}

#[tokio::test]
async fn test_unbound_user_is_skipped() {
    let env = TestEnv::with_config(balance_only());
    env.seed_company(7, "Acme", 500.0).await;
    env.seed_user(5, "+7", 0, false).await;

    let report = ChangeNotifier::new(&env.ctx).tick().await;

    assert_eq!(report.users_checked, 1);
    assert_eq!(report.users_skipped, 1);
    assert!(env.transport.sent().is_empty());
}

/// Re-binds the recipient to another company while the message is in flight.
struct RebindingTransport {
    store: CredentialStore,
    rebind_to: i64,
}

#[async_trait]
impl ChatTransport for RebindingTransport {
    async fn send(&self, chat_id: i64, _message: OutboundMessage, _menu: Menu) -> Result<(), AppError> {
        self.store
            .update_user(chat_id, |u| u.company_id = self.rebind_to)
            .await?;
        Ok(())
    }

    async fn delete_message(&self, _chat_id: i64, _message_id: i64) -> Result<(), AppError> {
        Ok(())
    }

    async fn answer_callback(&self, _callback_id: &str) -> Result<(), AppError> {
        Ok(())
    }
}

#[tokio::test]
async fn test_rebinding_during_delivery_keeps_new_company_watermark() {
    let env = TestEnv::with_config(balance_only());
    env.seed_company(7, "Acme", 500.0).await;
    env.seed_company(8, "Globex", 700.0).await;
    let mut user = env.seed_user(1, "+7", 7, true).await;
    user.last_balance = 500.0;
    env.ctx.store.save_user(&user).await.unwrap();

    let rebinding = AppContext::new(
        balance_only(),
        Arc::new(env.documents.clone()),
        env.portal.clone(),
        Arc::new(RebindingTransport {
            store: env.ctx.store.clone(),
            rebind_to: 8,
        }),
    );
    env.portal.set_balance(7, 1500.0);
    let report = ChangeNotifier::new(&rebinding).tick().await;

    assert_eq!(report.notifications_sent, 1);
    assert_eq!(report.watermark_writes_failed, 0);
    let user = env.user(1).await;
    assert_eq!(user.company_id, 8);
    assert_eq!(user.last_balance, 500.0);

    // The new company's balance is still reported against the old watermark.
    let report = ChangeNotifier::new(&env.ctx).tick().await;
    assert_eq!(report.notifications_sent, 1);
    assert!(env.transport.texts_to(1)[0].contains("Globex"));
    assert_eq!(env.user(1).await.last_balance, 700.0);
}

#[tokio::test]
async fn test_roster_outage_keeps_stored_roster() {
    let env = TestEnv::with_config(balance_only());
    env.seed_company(7, "Acme", 500.0).await;
    env.ctx
        .store
        .update_company(7, |c| c.employees = vec!["79990000000".to_string()])
        .await
        .unwrap();
    env.seed_user(1, "+7", 7, true).await;
    env.seed_user(2, "79990000000", 7, false).await;
    env.portal.fail_roster(7);
    env.portal.set_balance(7, 900.0);

    let report = ChangeNotifier::new(&env.ctx).tick().await;

    assert_eq!(report.companies_failed, 0);
    assert_eq!(report.notifications_sent, 2);
    assert_eq!(env.transport.sent_to(1).len(), 1);
    assert_eq!(env.transport.sent_to(2).len(), 1);
    assert_eq!(env.company(7).await.employees, vec!["79990000000".to_string()]);
}
