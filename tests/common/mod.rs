// Shared fixtures for the integration tests: static pools served through the
// in-process sampler, the way the binary runs without a sampler endpoint

#![allow(dead_code)]

use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use swap_aggr::cache::Refresh;
use swap_aggr::config::PoolTables;
use swap_aggr::router::source_filters::SourceFilters;
use swap_aggr::router::{ChainRouting, ChunkedDpSolver, MarketOperationUtils};
use swap_aggr::sampler::registry::{RegistrySampler, StaticChainReader};
use swap_aggr::types::{NativeOrder, NativeOrderType, SignedNativeOrder, Source};
use swap_aggr::venues::{build_registry, ConstantProductPool};

pub const TOKEN_A: &str = "0xaaaa";
pub const TOKEN_B: &str = "0xbbbb";
pub const WETH: &str = "0xweth";

pub fn pool(address: &str, token_a: &str, token_b: &str, reserve_a: i64, reserve_b: i64) -> ConstantProductPool {
    ConstantProductPool {
        address: address.into(),
        token_a: token_a.into(),
        token_b: token_b.into(),
        reserve_a: Decimal::from(reserve_a),
        reserve_b: Decimal::from(reserve_b),
        fee_bps: 30,
    }
}

/// UniswapV2 quotes A/B near 2, SushiSwap near 1.
pub fn direct_pools() -> PoolTables {
    PoolTables {
        constant_product: HashMap::from([
            (Source::UniswapV2, vec![pool("0xuni", TOKEN_A, TOKEN_B, 1_000_000, 2_000_000)]),
            (Source::SushiSwap, vec![pool("0xsushi", TOKEN_A, TOKEN_B, 1_000_000, 1_000_000)]),
        ]),
        ..Default::default()
    }
}

/// A/B only reachable through WETH.
pub fn bridged_pools() -> PoolTables {
    PoolTables {
        constant_product: HashMap::from([
            (Source::UniswapV2, vec![pool("0xuni-a", TOKEN_A, WETH, 1_000_000, 1_000_000)]),
            (Source::SushiSwap, vec![pool("0xsushi-b", WETH, TOKEN_B, 1_000_000, 3_000_000)]),
        ]),
        ..Default::default()
    }
}

pub fn routing() -> ChainRouting {
    ChainRouting {
        sell_sources: SourceFilters::all(),
        buy_sources: SourceFilters::all(),
        fee_sources: SourceFilters::all(),
        native_fee_token: WETH.into(),
        native_fee_token_amount: Decimal::from(1_000),
        vip_sources: Arc::new(HashSet::new()),
    }
}

/// Orchestrator over `pools` with warm caches.
pub async fn market(pools: &PoolTables) -> MarketOperationUtils {
    let (registry, caches) = build_registry(pools, None);
    for cache in &caches {
        cache.refresh_now().await.unwrap();
    }
    let chain = StaticChainReader::new(
        [(TOKEN_A.to_string(), 18), (TOKEN_B.to_string(), 18), (WETH.to_string(), 18)],
        ["0xcontract".to_string()],
    );
    let sampler = RegistrySampler::new(Arc::new(registry), Arc::new(chain), vec![WETH.to_string()]);
    MarketOperationUtils::new(Arc::new(sampler), routing(), Arc::new(ChunkedDpSolver))
}

/// Empty order that only fixes the pair.
pub fn reference_order(maker_token: &str, taker_token: &str) -> SignedNativeOrder {
    SignedNativeOrder {
        order: NativeOrder {
            maker: "0xnobody".into(),
            maker_token: maker_token.into(),
            taker_token: taker_token.into(),
            maker_amount: Decimal::ZERO,
            taker_amount: Decimal::ZERO,
            taker_token_fee_amount: Decimal::ZERO,
            expiry: 0,
        },
        signature: None,
        order_type: NativeOrderType::Limit,
    }
}

pub fn reference_order_json(maker_token: &str, taker_token: &str) -> serde_json::Value {
    serde_json::json!({
        "order": {
            "maker": "0xnobody",
            "maker_token": maker_token,
            "taker_token": taker_token,
            "maker_amount": "0",
            "taker_amount": "0",
        },
        "signature": null,
        "type": "limit",
    })
}
