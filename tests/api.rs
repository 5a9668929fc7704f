// HTTP API driven in process through the axum router

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{bridged_pools, direct_pools, market, reference_order_json, TOKEN_A, TOKEN_B};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use swap_aggr::config::PoolTables;
use swap_aggr::control::AdmissionControl;
use swap_aggr::fees::FeeSchedule;
use swap_aggr::router::router::create_api_router;
use swap_aggr::router::{GetMarketOrdersOpts, Router};
use swap_aggr::types::Source;
use tower::ServiceExt;

async fn api(pools: &PoolTables) -> axum::Router {
    let utils = market(pools).await;
    let defaults = GetMarketOrdersOpts {
        fee_schedule: FeeSchedule::from_gas_schedule(&HashMap::from([(Source::Native, 100_000)]), 0, Decimal::ONE),
        ..Default::default()
    };
    let router = Router::new(Arc::new(utils), defaults, None, AdmissionControl::new(8, None));
    create_api_router(Arc::new(router))
}

async fn post(app: axum::Router, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn sell_request(amount: &str) -> serde_json::Value {
    serde_json::json!({
        "side": "sell",
        "amount": amount,
        "orders": [reference_order_json(TOKEN_B, TOKEN_A)],
    })
}

#[tokio::test]
async fn health_and_metrics_respond() {
    let app = api(&direct_pools()).await;
    let health = app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(health.status(), StatusCode::OK);

    let metrics = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(metrics.status(), StatusCode::OK);
}

#[tokio::test]
async fn quote_returns_orders_and_sources() {
    let (status, body) = post(api(&direct_pools()).await, "/api/v1/quote", sell_request("1000")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sources"], serde_json::json!(["UniswapV2"]));
    let taker: Decimal = body["taker_amount"].as_str().unwrap().parse().unwrap();
    assert_eq!(taker, Decimal::from(1_000));
    assert!(!body["orders"].as_array().unwrap().is_empty());
    assert!(body["quote_report"]["sources_delivered"].is_array());
}

#[tokio::test]
async fn multi_hop_quote_totals_stay_in_the_pair_tokens() {
    let mut request = sell_request("1000");
    request["slippage"] = serde_json::json!("0.01");
    let (status, body) = post(api(&bridged_pools()).await, "/api/v1/quote", request).await;
    assert_eq!(status, StatusCode::OK);

    let taker: Decimal = body["taker_amount"].as_str().unwrap().parse().unwrap();
    let maker: Decimal = body["maker_amount"].as_str().unwrap().parse().unwrap();
    assert_eq!(taker, Decimal::from(1_000));
    // roughly 1000 A -> 996 WETH -> 2979 B
    assert!(maker > Decimal::from(2_500));
    assert!(maker < Decimal::from(3_000));
}

#[tokio::test]
async fn slippage_lowers_the_maker_amount() {
    let app = api(&direct_pools()).await;
    let (_, exact) = post(app.clone(), "/api/v1/quote", sell_request("1000")).await;
    let mut slipped = sell_request("1000");
    slipped["slippage"] = serde_json::json!("0.01");
    let (status, slipped) = post(app, "/api/v1/quote", slipped).await;
    assert_eq!(status, StatusCode::OK);

    let exact: Decimal = exact["maker_amount"].as_str().unwrap().parse().unwrap();
    let slipped: Decimal = slipped["maker_amount"].as_str().unwrap().parse().unwrap();
    assert!(slipped < exact);
}

#[tokio::test]
async fn price_reports_a_comparison_price() {
    let (status, body) = post(api(&direct_pools()).await, "/api/v1/price", sell_request("1000")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["maker_token"], TOKEN_B);
    assert_eq!(body["taker_token"], TOKEN_A);
    assert!(!body["comparison_price"].is_null());
}

#[tokio::test]
async fn empty_orders_are_a_bad_request() {
    let request = serde_json::json!({ "side": "sell", "amount": "1000", "orders": [] });
    let (status, body) = post(api(&direct_pools()).await, "/api/v1/quote", request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn invalid_amount_is_a_bad_request() {
    let (status, _) = post(api(&direct_pools()).await, "/api/v1/quote", sell_request("-5")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unroutable_pair_is_unprocessable() {
    let (status, body) = post(api(&PoolTables::default()).await, "/api/v1/quote", sell_request("1000")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].is_string());
}
