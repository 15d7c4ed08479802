//! Integration tests for all API endpoints.
//!
//! Each test boots the full Axum router (same assembly as `main.rs`) using
//! `tower::ServiceExt::oneshot`; no live server or fare provider needed.
//!
//! `build_test_app()` wires together:
//! - A `MockFareSource` with a fixed set of fares
//! - An in-memory SQLite pool behind the subscription store
//! - An `AlertEngine` whose cache is optionally warmed with one refresh
//! - Prometheus `AppMetrics`

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::NaiveDate;
use http_body_util::BodyExt;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tower::ServiceExt;

use fare_watch::{
    api::{self, ApiState},
    cache::FareCache,
    db,
    engine::{AlertEngine, RetryPolicy},
    fares::{Fare, MockFareSource},
    metrics::AppMetrics,
    repository::SqliteSubscriptionRepository,
    store::SubscriptionStore,
};

// ---- Helpers ----------------------------------------------------------------

fn fare(day: u32, price: Decimal, available: bool) -> Fare {
    Fare {
        date: NaiveDate::from_ymd_opt(2025, 3, day).unwrap(),
        price,
        currency: "MAD".to_string(),
        departure_time: chrono::NaiveTime::from_hms_opt(10, 5, 0),
        arrival_time: chrono::NaiveTime::from_hms_opt(11, 25, 0),
        available,
    }
}

fn sample_fares() -> Vec<Fare> {
    vec![
        fare(1, dec!(180), true),
        fare(4, dec!(150), true),
        fare(8, dec!(150), false),
        fare(10, dec!(210), true),
    ]
}

/// Build the complete test router. With `warm` the cache is refreshed
/// once from the mock source before the router is returned.
async fn build_test_app(warm: bool) -> (Router, Arc<AlertEngine>) {
    let pool = db::create_pool("sqlite::memory:").await.unwrap();
    let repository = Arc::new(SqliteSubscriptionRepository::new(pool));
    let store = Arc::new(SubscriptionStore::load(repository).await.unwrap());

    let source = Arc::new(MockFareSource::new().with_fares(sample_fares()));
    let metrics = Arc::new(AppMetrics::new().unwrap());
    let engine = Arc::new(
        AlertEngine::new(source, Arc::new(RwLock::new(FareCache::new())), store, 30)
            .unwrap()
            .with_retry(RetryPolicy::none())
            .with_metrics(metrics.clone()),
    );
    if warm {
        engine.refresh().await.unwrap();
    }

    let app = api::create_router(ApiState {
        engine: engine.clone(),
        metrics,
    });
    (app, engine)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn put_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::PUT)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Convenience: collect body bytes and parse as JSON.
async fn json_body(body: Body) -> Value {
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

// ---- GET /health and /metrics -----------------------------------------------

#[tokio::test]
async fn health_returns_200_with_ok_body() {
    let (app, _) = build_test_app(false).await;
    let resp = app.oneshot(get("/health")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"ok");
}

#[tokio::test]
async fn metrics_reports_refresh() {
    let (app, _) = build_test_app(true).await;
    let resp = app.oneshot(get("/metrics")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/plain; version=0.0.4"
    );
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let body = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(body.contains("fare_watch_polls_total 1"));
    assert!(body.contains("fare_watch_fares_cached 4"));
}

// ---- GET /fares/lowest ------------------------------------------------------

#[tokio::test]
async fn lowest_is_404_before_first_fetch() {
    let (app, _) = build_test_app(false).await;
    let resp = app.oneshot(get("/fares/lowest")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let json = json_body(resp.into_body()).await;
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn lowest_returns_cheapest_available_fare_with_validators() {
    let (app, _) = build_test_app(true).await;
    let resp = app.oneshot(get("/fares/lowest")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().contains_key(header::ETAG));
    assert!(resp.headers().contains_key(header::LAST_MODIFIED));
    assert!(resp.headers().contains_key(header::CACHE_CONTROL));

    let json = json_body(resp.into_body()).await;
    assert_eq!(json["fare"]["date"], "2025-03-04");
    assert_eq!(json["fare"]["price"], "150");
    assert_eq!(json["fare"]["departure_time"], "10:05:00");
    assert!(json["fetched_at"].is_string());
}

#[tokio::test]
async fn lowest_honors_if_none_match() {
    let (app, _) = build_test_app(true).await;
    let first = app.clone().oneshot(get("/fares/lowest")).await.unwrap();
    let etag = first.headers().get(header::ETAG).unwrap().clone();

    let resp = app
        .oneshot(
            Request::builder()
                .uri("/fares/lowest")
                .header(header::IF_NONE_MATCH, etag)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_MODIFIED);
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    assert!(bytes.is_empty());
}

// ---- GET /fares and /fares/stats --------------------------------------------

#[tokio::test]
async fn fares_lists_available_fares_by_date() {
    let (app, _) = build_test_app(true).await;
    let resp = app.oneshot(get("/fares")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let json = json_body(resp.into_body()).await;
    assert_eq!(json["count"], 3);
    let dates: Vec<&str> = json["fares"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["date"].as_str().unwrap())
        .collect();
    assert_eq!(dates, vec!["2025-03-01", "2025-03-04", "2025-03-10"]);
}

#[tokio::test]
async fn fares_applies_limit_and_max_price() {
    let (app, _) = build_test_app(true).await;

    let resp = app.clone().oneshot(get("/fares?limit=1")).await.unwrap();
    let json = json_body(resp.into_body()).await;
    assert_eq!(json["count"], 1);
    assert_eq!(json["fares"][0]["price"], "150");

    let resp = app.oneshot(get("/fares?max_price=185")).await.unwrap();
    let json = json_body(resp.into_body()).await;
    assert_eq!(json["count"], 2);
}

#[tokio::test]
async fn fares_rejects_negative_max_price() {
    let (app, _) = build_test_app(true).await;
    let resp = app.oneshot(get("/fares?max_price=-5")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn stats_summarize_available_fares() {
    let (app, _) = build_test_app(true).await;
    let resp = app.oneshot(get("/fares/stats")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let json = json_body(resp.into_body()).await;
    assert_eq!(json["count"], 3);
    assert_eq!(json["min"], "150");
    assert_eq!(json["max"], "210");
    assert_eq!(json["average"], "180");
    assert_eq!(json["best_date"], "2025-03-04");
}

// ---- /subscriptions/:id -----------------------------------------------------

#[tokio::test]
async fn subscribe_reports_already_at_target() {
    let (app, _) = build_test_app(true).await;
    let resp = app
        .oneshot(put_json(
            "/subscriptions/alice",
            json!({ "target_price": "160", "delivery_target": "chat-1" }),
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let json = json_body(resp.into_body()).await;
    assert_eq!(json["subscription"]["subscriber_id"], "alice");
    assert_eq!(json["subscription"]["active"], true);
    assert_eq!(json["already_at_target"], true);
    assert_eq!(json["current_lowest"]["price"], "150");
}

#[tokio::test]
async fn subscribe_rejects_non_positive_target() {
    let (app, engine) = build_test_app(true).await;
    let resp = app
        .oneshot(put_json(
            "/subscriptions/alice",
            json!({ "target_price": "0", "delivery_target": "chat-1" }),
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(engine.store().get("alice").await.is_none());
}

#[tokio::test]
async fn subscription_status_shows_remaining_distance() {
    let (app, engine) = build_test_app(true).await;
    engine.subscribe("bob", dec!(120), "chat-2").await.unwrap();

    let resp = app.oneshot(get("/subscriptions/bob")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = json_body(resp.into_body()).await;
    assert_eq!(json["reached"], false);
    assert_eq!(json["remaining"], "30");
}

#[tokio::test]
async fn unknown_subscription_is_404() {
    let (app, _) = build_test_app(true).await;
    let resp = app.oneshot(get("/subscriptions/nobody")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_deactivates_and_is_idempotent() {
    let (app, engine) = build_test_app(true).await;
    engine.subscribe("carol", dec!(200), "chat-3").await.unwrap();

    for _ in 0..2 {
        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::DELETE)
                    .uri("/subscriptions/carol")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }
    assert!(!engine.store().get("carol").await.unwrap().active);

    let resp = app
        .oneshot(
            Request::builder()
                .method(Method::DELETE)
                .uri("/subscriptions/nobody")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn resubscribe_reactivates_inactive_subscriber() {
    let (app, engine) = build_test_app(true).await;
    engine.subscribe("dave", dec!(100), "chat-4").await.unwrap();
    engine.unsubscribe("dave").await.unwrap();

    let resp = app
        .oneshot(put_json(
            "/subscriptions/dave",
            json!({ "target_price": "140.50", "delivery_target": "chat-9" }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let sub = engine.store().get("dave").await.unwrap();
    assert!(sub.active);
    assert_eq!(sub.target_price, dec!(140.50));
    assert_eq!(sub.delivery_target, "chat-9");
}
