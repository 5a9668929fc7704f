// Venue adapters module
// Off-chain price models for on-chain liquidity sources, registered by
// source at startup and queried by the in-process sampler
//
// Numan Thabit 2025 Nov

pub mod adapter;
pub mod amm;
pub mod lending;
pub mod stable;

pub use adapter::{SourceAdapter, SourceRegistry};
pub use amm::{ConstantProductAdapter, ConstantProductPool};
pub use lending::{LendingAdapter, LendingMarket};
pub use stable::{StableSwapAdapter, StablePool};

use crate::cache::{HttpPoolFetcher, PoolCache, PoolFetcher, Refresh, RefreshPolicy, StaticPoolFetcher};
use crate::config::PoolTables;
use crate::transport::http::HttpClient;
use crate::types::Source;
use serde::de::DeserializeOwned;
use std::sync::Arc;

fn pool_cache<T>(
    kind: &'static str,
    source: Source,
    table: &T,
    client: Option<&HttpClient>,
    policy: RefreshPolicy,
) -> PoolCache<T>
where
    T: Clone + DeserializeOwned + Send + Sync + 'static,
{
    let fetcher: Arc<dyn PoolFetcher<T>> = match client {
        Some(client) => Arc::new(HttpPoolFetcher::new(client.clone(), format!("pools/{kind}/{source}"))),
        None => Arc::new(StaticPoolFetcher(table.clone())),
    };
    PoolCache::new(kind, fetcher, policy)
}

/// One adapter per configured venue, each reading its own pool cache. Pools
/// come from the metadata service when `client` is set, otherwise from the
/// static tables. Reserve caches keep stale data on a failed refresh; lending
/// market lists are cleared.
pub fn build_registry(pools: &PoolTables, client: Option<&HttpClient>) -> (SourceRegistry, Vec<Arc<dyn Refresh>>) {
    let mut registry = SourceRegistry::new();
    let mut caches: Vec<Arc<dyn Refresh>> = Vec::new();

    for (&source, table) in &pools.constant_product {
        let cache = pool_cache("constant_product", source, table, client, RefreshPolicy::RetainOnFailure);
        caches.push(Arc::new(cache.clone()));
        registry.register(Arc::new(ConstantProductAdapter::new(source, cache)));
    }
    for (&source, table) in &pools.stable {
        let cache = pool_cache("stable", source, table, client, RefreshPolicy::RetainOnFailure);
        caches.push(Arc::new(cache.clone()));
        registry.register(Arc::new(StableSwapAdapter::new(source, cache)));
    }
    for (&source, table) in &pools.lending {
        let cache = pool_cache("lending", source, table, client, RefreshPolicy::ClearOnFailure);
        caches.push(Arc::new(cache.clone()));
        registry.register(Arc::new(LendingAdapter::new(source, cache)));
    }
    (registry, caches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::collections::HashMap;

    #[tokio::test]
    async fn static_tables_register_every_venue() {
        let pools = PoolTables {
            constant_product: HashMap::from([(
                Source::SushiSwap,
                vec![ConstantProductPool {
                    address: "0xpair".into(),
                    token_a: "0xa".into(),
                    token_b: "0xb".into(),
                    reserve_a: Decimal::from(1_000),
                    reserve_b: Decimal::from(1_000),
                    fee_bps: 30,
                }],
            )]),
            lending: HashMap::from([(Source::AaveV2, Vec::new())]),
            ..Default::default()
        };
        let (registry, caches) = build_registry(&pools, None);
        assert_eq!(caches.len(), 2);
        for cache in &caches {
            cache.refresh_now().await.unwrap();
        }
        let mut sources = registry.sources();
        sources.sort();
        assert_eq!(sources, vec![Source::SushiSwap, Source::AaveV2]);

        let adapter = registry.get(Source::SushiSwap).unwrap();
        let samples = adapter.sample_sell("0xa", "0xb", &[Decimal::from(10)]).await.unwrap();
        assert!(samples[0].output > Decimal::ZERO);
    }
}
