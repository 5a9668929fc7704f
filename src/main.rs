use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use std::time::Duration;
use swap_aggr::cache::Refresh;
use swap_aggr::config::{AppConfig, ChainTables};
use swap_aggr::control::{AdmissionControl, CircuitBreakers};
use swap_aggr::rfq::http::HttpQuoteRequestor;
use swap_aggr::rfq::QuoteRequestor;
use swap_aggr::router::liquidity::GetMarketOrdersOpts;
use swap_aggr::router::{ChunkedDpSolver, MarketOperationUtils, Router};
use swap_aggr::sampler::registry::{RegistrySampler, StaticChainReader};
use swap_aggr::sampler::remote::HttpSampler;
use swap_aggr::sampler::Sampler;
use swap_aggr::transport::HttpClient;
use swap_aggr::venues::build_registry;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing().context("initialize tracing subscriber")?;

    if let Err(err) = run().await {
        tracing::error!(error = ?err, "fatal aggregator error");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> Result<()> {
    let config = AppConfig::load().context("load configuration from environment")?;
    let tables = ChainTables::from_yaml_file(&config.chain_tables)?;
    let timeout = config.request_timeout();

    let pool_client = match &config.pool_endpoint {
        Some(url) => Some(HttpClient::new(url.clone(), "pools", timeout).context("initialize pool metadata client")?),
        None => None,
    };
    let (registry, caches) = build_registry(&tables.pools, pool_client.as_ref());

    let sampler: Arc<dyn Sampler> = match &config.sampler_endpoint {
        Some(url) => {
            let client = HttpClient::new(url.clone(), "sampler", timeout).context("initialize sampler client")?;
            info!(endpoint = %url, "using remote sampler");
            Arc::new(HttpSampler::new(client))
        }
        None => {
            let chain = StaticChainReader::new(tables.token_decimals.clone(), tables.contracts.clone());
            info!(sources = ?registry.sources(), "using in-process sampler");
            Arc::new(RegistrySampler::new(
                Arc::new(registry),
                Arc::new(chain),
                tables.intermediate_tokens.clone(),
            ))
        }
    };

    let quote_requestor: Option<Arc<dyn QuoteRequestor>> = if config.maker_endpoints.is_empty() {
        warn!("no RFQ makers configured; private quotes disabled");
        None
    } else {
        let makers = config
            .maker_endpoints
            .iter()
            .map(|url| HttpClient::new(url.clone(), "rfq", timeout))
            .collect::<Result<Vec<_>, _>>()
            .context("initialize RFQ maker clients")?;
        Some(Arc::new(HttpQuoteRequestor::new(
            makers,
            CircuitBreakers::default(),
            config.rfq_expiry_buffer_secs,
        )))
    };

    let gas_price = config.gas_price();
    let defaults = GetMarketOrdersOpts {
        num_samples: config.num_samples,
        sample_distribution_base: config.sample_distribution_base,
        router_num_samples: config.router_num_samples,
        fee_schedule: tables.fee_schedule(gas_price),
        exchange_proxy_overhead: tables.exchange_proxy_overhead(gas_price),
        gas_price,
        ..Default::default()
    };
    let utils = Arc::new(MarketOperationUtils::new(
        sampler,
        tables.routing(&config.excluded_sources),
        Arc::new(ChunkedDpSolver),
    ));
    let admission = AdmissionControl::new(config.max_inflight, config.rate_limit_per_sec);
    let router = Arc::new(Router::new(utils, defaults, quote_requestor, admission.clone()));

    let app = App {
        config: Arc::new(config),
        router,
        caches,
        admission,
    };
    app.run().await
}

struct App {
    config: Arc<AppConfig>,
    router: Arc<Router>,
    caches: Vec<Arc<dyn Refresh>>,
    admission: AdmissionControl,
}

impl App {
    async fn run(self) -> Result<()> {
        // warm every pool cache before serving; a cold cache only means no
        // samples from that venue until the next refresh
        for cache in &self.caches {
            if let Err(err) = cache.refresh_now().await {
                warn!(cache = cache.name(), error = %err, "pool cache warm-up failed; continuing");
            }
        }
        let every = self.config.pool_refresh_interval();
        let _refreshers: Vec<JoinHandle<()>> = self.caches.iter().map(|c| c.spawn_refresh(every)).collect();

        let api_router = swap_aggr::router::router::create_api_router(self.router.clone());
        let listener = tokio::net::TcpListener::bind(&self.config.listen_address)
            .await
            .with_context(|| format!("bind API server address {}", self.config.listen_address))?;
        info!(
            address = %self.config.listen_address,
            caches = self.caches.len(),
            gas_price_gwei = %self.config.gas_price_gwei,
            "swap aggregator online"
        );
        let _api_handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, api_router).await {
                warn!(error = %e, "API server error");
            }
        });

        let mut ticker = tokio::time::interval(Duration::from_secs(30));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    info!(
                        max_inflight = self.config.max_inflight,
                        available = self.admission.available(),
                        "aggregator heartbeat"
                    );
                }
                res = tokio::signal::ctrl_c() => {
                    if let Err(err) = res {
                        warn!(error = %err, "ctrl_c listener error");
                    }
                    info!("Shutdown signal received, exiting");
                    break;
                }
            }
        }
        Ok(())
    }
}

fn init_tracing() -> Result<()> {
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info,hyper=warn".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(env_filter))
        .with_target(false)
        .try_init()
        .map_err(|err| anyhow!("tracing subscriber init: {err}"))
}
