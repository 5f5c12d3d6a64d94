//! HTTP surface tests: routing, middleware, status-code mapping.
//!
//! Run against a real Postgres instance:
//!   DATABASE_URL=postgres://... cargo test -- --ignored

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use sqlx::PgPool;
use sqlx::migrate::Migrator;
use std::path::Path;
use tower::ServiceExt;
use uuid::Uuid;

use ledger_core::{AppState, create_app};

async fn setup_app() -> (axum::Router, PgPool) {
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for tests");
    let pool = PgPool::connect(&database_url)
        .await
        .expect("Failed to connect to test DB");
    Migrator::new(Path::new("./migrations"))
        .await
        .expect("Failed to load migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations on test DB");

    (create_app(AppState::new(pool.clone(), 5000)), pool)
}

fn credit_request(user: Uuid, amount: &str, key: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/wallet/credit")
        .header("content-type", "application/json")
        .header("idempotency-key", key)
        .header("x-user-id", user.to_string())
        .body(Body::from(format!(
            r#"{{"userId":"{user}","amount":"{amount}","type":"deposit"}}"#
        )))
        .unwrap()
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn test_credit_returns_created_with_transaction() {
    let (app, _pool) = setup_app().await;
    let user = Uuid::new_v4();

    let response = app
        .oneshot(credit_request(user, "100.00", &Uuid::new_v4().to_string()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let tx: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(tx["status"], "success");
    assert_eq!(tx["type"], "deposit");
    assert_eq!(tx["userId"], user.to_string());
}

#[tokio::test]
#[ignore]
async fn test_duplicate_submission_is_conflict() {
    let (app, _pool) = setup_app().await;
    let user = Uuid::new_v4();
    let key = Uuid::new_v4().to_string();

    let first = app
        .clone()
        .oneshot(credit_request(user, "10.00", &key))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = app
        .oneshot(credit_request(user, "10.00", &key))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
}

#[tokio::test]
#[ignore]
async fn test_oversized_debit_is_unprocessable() {
    let (app, _pool) = setup_app().await;
    let user = Uuid::new_v4();

    let created = app
        .clone()
        .oneshot(credit_request(user, "50.00", &Uuid::new_v4().to_string()))
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/wallet/debit")
                .header("content-type", "application/json")
                .header("idempotency-key", Uuid::new_v4().to_string())
                .body(Body::from(format!(
                    r#"{{"userId":"{user}","amount":"1000.00","type":"withdrawal"}}"#
                )))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
#[ignore]
async fn test_balance_endpoint_reports_zero_for_unknown_user() {
    let (app, _pool) = setup_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/wallet/balance/{}", Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let balance: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(balance["availableBalance"], "0");
    assert_eq!(balance["frozenBalance"], "0");
}

#[tokio::test]
#[ignore]
async fn test_invalid_amount_is_bad_request() {
    let (app, _pool) = setup_app().await;
    let user = Uuid::new_v4();

    let response = app
        .oneshot(credit_request(user, "-5.00", &Uuid::new_v4().to_string()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[ignore]
async fn test_mutations_are_audited() {
    let (app, pool) = setup_app().await;
    let user = Uuid::new_v4();

    let response = app
        .oneshot(credit_request(user, "10.00", &Uuid::new_v4().to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    // Audit writes are spawned off the request path; poll until the entry
    // lands instead of guessing a delay.
    let actor = user.to_string();
    let mut entry = None;
    for _ in 0..50 {
        let entries = ledger_core::db::queries::list_audit_log(&pool, 20, 0)
            .await
            .unwrap();
        if let Some(found) = entries
            .into_iter()
            .find(|e| e.actor.as_deref() == Some(actor.as_str()))
        {
            entry = Some(found);
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    let entry = entry.expect("audit entry for the credit should exist");
    assert_eq!(entry.method, "POST");
    assert_eq!(entry.url, "/wallet/credit");
    assert_eq!(entry.status_code, Some(201));
    assert!(entry.response.is_some());
}

#[tokio::test]
#[ignore]
async fn test_status_update_route() {
    let (app, _pool) = setup_app().await;
    let user = Uuid::new_v4();

    let created = app
        .clone()
        .oneshot(credit_request(user, "10.00", &Uuid::new_v4().to_string()))
        .await
        .unwrap();
    let bytes = created.into_body().collect().await.unwrap().to_bytes();
    let tx: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    let tx_id = tx["id"].as_str().unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .method("PATCH")
                .uri("/transactions/status")
                .header("content-type", "application/json")
                .body(Body::from(format!(
                    r#"{{"transactionId":"{tx_id}","status":"cancelled"}}"#
                )))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}
