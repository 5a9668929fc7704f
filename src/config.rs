// Configuration management module
// This file handles loading of the service settings from environment
// variables and an optional config file, and of the per-chain routing
// tables from YAML
//
// Numan Thabit 2025 Nov

use crate::fees::{tiered_overhead, FeeSchedule, OverheadGas, SettlementOverhead};
use crate::router::orchestrator::ChainRouting;
use crate::router::source_filters::SourceFilters;
use crate::types::{Address, Source};
use crate::venues::{ConstantProductPool, LendingMarket, StablePool};
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Wei per gwei.
const GWEI: u64 = 1_000_000_000;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// HTTP API bind address
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
    /// External sampling service; sampling runs in process when unset
    pub sampler_endpoint: Option<Url>,
    /// Pool metadata service; pools come from the chain tables when unset
    pub pool_endpoint: Option<Url>,
    /// RFQ market makers (comma separated in the environment)
    #[serde(default)]
    pub maker_endpoints: Vec<Url>,
    #[serde(default = "default_gas_price_gwei")]
    pub gas_price_gwei: Decimal,
    #[serde(default = "default_num_samples")]
    pub num_samples: usize,
    #[serde(default = "default_sample_distribution_base")]
    pub sample_distribution_base: Decimal,
    #[serde(default = "default_router_num_samples")]
    pub router_num_samples: usize,
    /// Sources never routed through, on top of the chain tables
    #[serde(default)]
    pub excluded_sources: Vec<Source>,
    #[serde(default = "default_pool_refresh_secs")]
    pub pool_refresh_secs: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// RFQ quotes expiring sooner than this are dropped
    #[serde(default = "default_rfq_expiry_buffer_secs")]
    pub rfq_expiry_buffer_secs: u64,
    #[serde(default = "default_chain_tables")]
    pub chain_tables: PathBuf,
    /// Concurrency control
    #[serde(default = "default_max_inflight")]
    pub max_inflight: usize,
    pub rate_limit_per_sec: Option<u32>,
}

fn default_listen_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_gas_price_gwei() -> Decimal {
    Decimal::from(30)
}

fn default_num_samples() -> usize {
    13
}

fn default_sample_distribution_base() -> Decimal {
    Decimal::new(105, 2)
}

fn default_router_num_samples() -> usize {
    14
}

fn default_pool_refresh_secs() -> u64 {
    30 * 60
}

fn default_request_timeout_ms() -> u64 {
    2_000
}

fn default_rfq_expiry_buffer_secs() -> u64 {
    5
}

fn default_chain_tables() -> PathBuf {
    PathBuf::from("chain.yaml")
}

fn default_max_inflight() -> usize {
    64
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name("aggr").required(false))
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("maker_endpoints")
                    .with_list_parse_key("excluded_sources"),
            )
            .build()?;
        Ok(cfg.try_deserialize()?)
    }

    /// Gas price in wei.
    pub fn gas_price(&self) -> Decimal {
        self.gas_price_gwei * Decimal::from(GWEI)
    }

    pub fn pool_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.pool_refresh_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Static pools by venue, used when no metadata service is configured.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PoolTables {
    #[serde(default)]
    pub constant_product: HashMap<Source, Vec<ConstantProductPool>>,
    #[serde(default)]
    pub stable: HashMap<Source, Vec<StablePool>>,
    #[serde(default)]
    pub lending: HashMap<Source, Vec<LendingMarket>>,
}

/// Per-chain address books and gas tables. Loaded once at start and
/// injected; nothing reads it from global state.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainTables {
    pub native_fee_token: Address,
    /// Native units probed when pricing a token in the native asset.
    pub native_fee_token_amount: Decimal,
    #[serde(default)]
    pub token_decimals: HashMap<Address, u32>,
    /// Addresses known to be contracts; RFQ is refused for them.
    #[serde(default)]
    pub contracts: Vec<Address>,
    #[serde(default)]
    pub intermediate_tokens: Vec<Address>,
    #[serde(default)]
    pub vip_sources: Vec<Source>,
    #[serde(default)]
    pub gas_schedule: HashMap<Source, u64>,
    #[serde(default)]
    pub multihop_base_gas: u64,
    #[serde(default)]
    pub overhead_gas: OverheadGas,
    /// Unset means every source.
    pub sell_sources: Option<Vec<Source>>,
    pub buy_sources: Option<Vec<Source>>,
    pub fee_sources: Option<Vec<Source>>,
    #[serde(default)]
    pub pools: PoolTables,
}

fn filters(sources: &Option<Vec<Source>>) -> SourceFilters {
    match sources {
        Some(list) => SourceFilters::only(list.iter().copied()),
        None => SourceFilters::all(),
    }
}

impl ChainTables {
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        serde_yaml::from_str(raw).context("parse chain tables")
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read chain tables {}", path.display()))?;
        Self::from_yaml_str(&raw)
    }

    /// Routing settings with `excluded` removed from every side.
    pub fn routing(&self, excluded: &[Source]) -> ChainRouting {
        let excluded = excluded.iter().copied();
        ChainRouting {
            sell_sources: filters(&self.sell_sources).exclude(excluded.clone()),
            buy_sources: filters(&self.buy_sources).exclude(excluded),
            fee_sources: filters(&self.fee_sources),
            native_fee_token: self.native_fee_token.clone(),
            native_fee_token_amount: self.native_fee_token_amount,
            vip_sources: Arc::new(self.vip_sources.iter().copied().collect::<HashSet<_>>()),
        }
    }

    pub fn fee_schedule(&self, gas_price: Decimal) -> FeeSchedule {
        FeeSchedule::from_gas_schedule(&self.gas_schedule, self.multihop_base_gas, gas_price)
    }

    pub fn exchange_proxy_overhead(&self, gas_price: Decimal) -> SettlementOverhead {
        tiered_overhead(self.overhead_gas, &self.vip_sources, gas_price)
    }
}
