// End-to-end routing over static pools through the in-process sampler, with
// RFQ makers stood up on wiremock

mod common;

use common::{bridged_pools, direct_pools, market, reference_order, TOKEN_A, TOKEN_B, WETH};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use swap_aggr::config::PoolTables;
use swap_aggr::control::CircuitBreakers;
use swap_aggr::errors::AggrError;
use swap_aggr::rfq::http::HttpQuoteRequestor;
use swap_aggr::router::liquidity::RfqtOpts;
use swap_aggr::router::path::OrderKind;
use swap_aggr::router::report::QuoteReportEntry;
use swap_aggr::router::GetMarketOrdersOpts;
use swap_aggr::transport::http::{HttpClient, RetryPolicy};
use swap_aggr::types::{unix_now, Side, Source};
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn rfqt(server: &MockServer, is_indicative: bool, tx_origin: &str) -> RfqtOpts {
    let maker = HttpClient::new(Url::parse(&server.uri()).unwrap(), "rfq", Duration::from_secs(2))
        .unwrap()
        .with_retry(RetryPolicy::none());
    RfqtOpts {
        is_indicative,
        taker_address: "0xtaker".into(),
        tx_origin: tx_origin.into(),
        intent_on_filling: true,
        integrator_id: Some("tests".into()),
        quote_requestor: Arc::new(HttpQuoteRequestor::new(vec![maker], CircuitBreakers::default(), 5)),
    }
}

fn sources(set: HashSet<Source>) -> Vec<Source> {
    let mut sources: Vec<Source> = set.into_iter().collect();
    sources.sort();
    sources
}

#[tokio::test]
async fn sells_through_the_deeper_pool() {
    let utils = market(&direct_pools()).await;
    let out = utils
        .get_optimized_orders(
            &[reference_order(TOKEN_B, TOKEN_A)],
            Decimal::from(1_000),
            Side::Sell,
            &GetMarketOrdersOpts::default(),
        )
        .await
        .unwrap();

    let result = out.result;
    assert_eq!(sources(result.sources()), vec![Source::UniswapV2]);
    assert!(result.adjusted_rate > Decimal::new(19, 1));
    assert!(result.adjusted_rate < Decimal::from(2));
    let taker: Decimal = result.optimized_orders.iter().map(|o| o.taker_amount).sum();
    assert_eq!(taker, Decimal::from(1_000));
    assert!(out.quote_report.is_some());
}

#[tokio::test]
async fn buys_from_the_cheaper_pool() {
    let utils = market(&direct_pools()).await;
    let result = utils
        .get_optimized_orders(
            &[reference_order(TOKEN_B, TOKEN_A)],
            Decimal::from(500),
            Side::Buy,
            &GetMarketOrdersOpts::default(),
        )
        .await
        .unwrap()
        .result;

    assert_eq!(sources(result.sources()), vec![Source::UniswapV2]);
    let maker: Decimal = result.optimized_orders.iter().map(|o| o.maker_amount).sum();
    assert_eq!(maker, Decimal::from(500));
    // roughly 250 A for 500 B
    assert!(result.adjusted_rate > Decimal::new(19, 1));
    assert!(result.adjusted_rate < Decimal::from(2));
}

#[tokio::test]
async fn routes_through_an_intermediate_token() {
    let utils = market(&bridged_pools()).await;
    let result = utils
        .get_optimized_orders(
            &[reference_order(TOKEN_B, TOKEN_A)],
            Decimal::from(1_000),
            Side::Sell,
            &GetMarketOrdersOpts::default(),
        )
        .await
        .unwrap()
        .result;

    assert!(!result.liquidity_delivered.is_empty());
    assert!(result.liquidity_delivered.iter().all(|f| f.source == Source::MultiHop));
    assert!(result.source_flags.contains(Source::MultiHop.flag()));
    // one order per hop
    assert_eq!(result.optimized_orders.len(), 2 * result.liquidity_delivered.len());
    assert_eq!(result.optimized_orders[0].maker_token, WETH);
    assert_eq!(result.optimized_orders[1].taker_token, WETH);
}

#[tokio::test]
async fn empty_pools_have_no_path() {
    let utils = market(&PoolTables::default()).await;
    let err = utils
        .get_optimized_orders(
            &[reference_order(TOKEN_B, TOKEN_A)],
            Decimal::from(1_000),
            Side::Sell,
            &GetMarketOrdersOpts::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AggrError::NoOptimalPath));
}

#[tokio::test]
async fn indicative_maker_quote_beats_the_pools() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/price"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "maker_token": TOKEN_B,
            "taker_token": TOKEN_A,
            "maker_amount": "2500",
            "taker_amount": "1000",
            "expiry": unix_now() + 600,
        })))
        .expect(1)
        .mount(&server)
        .await;

    let utils = market(&direct_pools()).await;
    let opts = GetMarketOrdersOpts {
        rfqt: Some(rfqt(&server, true, "0xtaker")),
        ..Default::default()
    };
    let result = utils
        .get_optimized_orders(&[reference_order(TOKEN_B, TOKEN_A)], Decimal::from(1_000), Side::Sell, &opts)
        .await
        .unwrap()
        .result;

    assert_eq!(sources(result.sources()), vec![Source::Native]);
    assert!(result.adjusted_rate > Decimal::new(24, 1));
    assert!(result.adjusted_rate <= Decimal::new(25, 1));
}

#[tokio::test]
async fn firm_maker_quote_is_reported_with_its_maker() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/quote"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "order": {
                "maker": "0xmm",
                "maker_token": TOKEN_B,
                "taker_token": TOKEN_A,
                "maker_amount": "2500",
                "taker_amount": "1000",
                "expiry": unix_now() + 600,
            },
            "signature": "0xsig",
            "type": "rfq",
        })))
        .mount(&server)
        .await;

    let utils = market(&direct_pools()).await;
    let opts = GetMarketOrdersOpts {
        rfqt: Some(rfqt(&server, false, "0xtaker")),
        ..Default::default()
    };
    let out = utils
        .get_optimized_orders(&[reference_order(TOKEN_B, TOKEN_A)], Decimal::from(1_000), Side::Sell, &opts)
        .await
        .unwrap();

    let orders = &out.result.optimized_orders;
    assert!(!orders.is_empty());
    assert!(orders.iter().all(|o| o.kind == OrderKind::Rfq));

    let report = out.quote_report.unwrap();
    assert!(!report.sources_delivered.is_empty());
    for entry in &report.sources_delivered {
        match entry {
            QuoteReportEntry::Native { is_rfq, maker_uri, .. } => {
                assert!(*is_rfq);
                assert!(maker_uri.as_deref().unwrap().starts_with(&server.uri()));
            }
            other => panic!("unexpected delivered entry {other:?}"),
        }
    }
}

#[tokio::test]
async fn contract_origins_never_reach_makers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let utils = market(&direct_pools()).await;
    let opts = GetMarketOrdersOpts {
        rfqt: Some(rfqt(&server, true, "0xContract")),
        ..Default::default()
    };
    let result = utils
        .get_optimized_orders(&[reference_order(TOKEN_B, TOKEN_A)], Decimal::from(1_000), Side::Sell, &opts)
        .await
        .unwrap()
        .result;
    assert_eq!(sources(result.sources()), vec![Source::UniswapV2]);
}

#[tokio::test]
async fn failing_makers_fall_back_to_public_liquidity() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let utils = market(&direct_pools()).await;
    let opts = GetMarketOrdersOpts {
        rfqt: Some(rfqt(&server, true, "0xtaker")),
        ..Default::default()
    };
    let result = utils
        .get_optimized_orders(&[reference_order(TOKEN_B, TOKEN_A)], Decimal::from(1_000), Side::Sell, &opts)
        .await
        .unwrap()
        .result;
    assert_eq!(sources(result.sources()), vec![Source::UniswapV2]);
}

#[tokio::test]
async fn batch_buy_routes_pairs_independently() {
    let utils = market(&direct_pools()).await;
    let batch = vec![
        vec![reference_order(TOKEN_B, TOKEN_A)],
        vec![reference_order(WETH, TOKEN_A)],
    ];
    let results = utils
        .get_batch_market_buy_orders(
            &batch,
            &[Decimal::from(500), Decimal::from(500)],
            &GetMarketOrdersOpts::default(),
        )
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    let routed = results[0].as_ref().unwrap();
    assert_eq!(sources(routed.sources()), vec![Source::UniswapV2]);
    assert!(results[1].is_none());
}
