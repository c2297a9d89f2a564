// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore integration tests.
//!
//! These tests require the Firestore emulator to be running
//! (`FIRESTORE_EMULATOR_HOST` set); they are skipped otherwise.

use carshare_bot::db::{CredentialStore, DocumentStore};
use carshare_bot::error::AppError;
use carshare_bot::models::{Company, User};
use std::sync::Arc;
use std::time::Duration;

mod common;
use common::{ride, test_db};

/// Unique namespace per test run for isolation.
fn unique_namespace(test: &str) -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("it{}_{}", nanos, test)
}

async fn store(test: &str) -> CredentialStore {
    CredentialStore::new(
        Arc::new(test_db().await),
        &unique_namespace(test),
        Duration::from_secs(10),
    )
}

#[tokio::test]
async fn test_user_round_trip() {
    require_emulator!();

    let store = store("user").await;
    let mut user = User::new(42, "+79990000000");
    user.company_id = 7;
    user.last_balance = 1500.25;

    assert!(matches!(store.load_user(42).await, Err(AppError::NotFound(_))));
    store.save_user(&user).await.unwrap();
    assert_eq!(store.load_user(42).await.unwrap(), user);
    assert_eq!(store.list_user_ids().await.unwrap(), vec![42]);

    store.delete_user(42).await.unwrap();
    assert!(matches!(store.load_user(42).await, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_company_round_trip() {
    require_emulator!();

    let store = store("company").await;
    let mut company = Company::new(7, "corp", "pw");
    company.employees = vec!["79990000000".to_string()];
    company.rides = vec![ride(3)];

    store.save_company(&company).await.unwrap();
    assert_eq!(store.load_company(7).await.unwrap(), company);

    let updated = store
        .update_company(7, |c| c.balance = 99.5)
        .await
        .unwrap();
    assert_eq!(updated.balance, 99.5);
    assert_eq!(store.load_company(7).await.unwrap().balance, 99.5);
}

#[tokio::test]
async fn test_raw_documents_and_missing_delete() {
    require_emulator!();

    let db = test_db().await;
    let collection = unique_namespace("raw");

    db.set(&collection, "a", b"\x00\x01binary").await.unwrap();
    assert_eq!(db.get(&collection, "a").await.unwrap(), b"\x00\x01binary".to_vec());
    db.delete(&collection, "missing").await.unwrap();
    assert_eq!(db.list_ids(&collection).await.unwrap(), vec!["a".to_string()]);
}
