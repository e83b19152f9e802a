//! Integration tests for the read API's HTTP surface, exercised end to end
//! through the router rather than against a bound socket.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use kalshi_signal_engine::api::{self, ApiState};
use kalshi_signal_engine::models::{Market, MarketStatus};
use kalshi_signal_engine::state::StateEngine;
use std::sync::Arc;
use tower::ServiceExt;

fn state_with_market(ticker: &str) -> Arc<StateEngine> {
    let state = StateEngine::new(100, 100);
    let mut market = Market::new(ticker, "A test market", "EVT-1");
    market.status = MarketStatus::Active;
    state.register_market(market);
    state
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_endpoint_reports_market_count() {
    let state = state_with_market("TICK-1");
    let app = api::router(ApiState::new(state));

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["markets"], 1);
}

#[tokio::test]
async fn unknown_market_404s_through_the_whole_router() {
    let state = state_with_market("TICK-1");
    let app = api::router(ApiState::new(state));

    let response = app
        .oneshot(Request::builder().uri("/markets/GHOST").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn known_market_orderbook_round_trips_through_json() {
    let state = state_with_market("TICK-1");
    state.update_from_upstream("TICK-1", vec![(60, 500)], vec![(35, 300)], 1).unwrap();
    let app = api::router(ApiState::new(state));

    let response = app
        .oneshot(Request::builder().uri("/markets/TICK-1/orderbook").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["orderbook"]["bids"][0][0], 60);
    // 10000 - 35 = 9965, the derived ask price for the lone no-bid level.
    assert_eq!(body["orderbook"]["asks"][0][0], 9_965);
}

#[tokio::test]
async fn categories_endpoint_groups_markets_without_an_explicit_category() {
    let state = state_with_market("KXSENATE-24-R");
    let app = api::router(ApiState::new(state));

    let response = app
        .oneshot(Request::builder().uri("/categories").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["categories"].as_object().unwrap().contains_key("Elections - Senate"));
}

#[tokio::test]
async fn signals_and_alerts_endpoints_start_empty() {
    let state = state_with_market("TICK-1");
    let app = api::router(ApiState::new(state));

    let response = app
        .oneshot(Request::builder().uri("/signals").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["count"], 0);
}
