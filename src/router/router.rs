// Router HTTP API implementation
// This file provides HTTP endpoints for quotes, Phase-1 prices, health and
// metrics on top of the liquidity orchestrator
//
// Numan Thabit 2025 Nov

use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router as AxumRouter,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::control::AdmissionControl;
use crate::errors::AggrError;
use crate::rfq::QuoteRequestor;
use crate::router::adjustor::IdentityFillAdjustor;
use crate::router::comparison::get_comparison_prices;
use crate::router::liquidity::{GetMarketOrdersOpts, RfqtOpts};
use crate::router::orchestrator::MarketOperationUtils;
use crate::router::path::{slip_orders, OptimizedOrder};
use crate::router::report::{PriceComparisonsReport, QuoteReport};
use crate::router::validation::validate_quote_request;
use crate::types::{Address, Side, SignedNativeOrder, Source};

/// Serves quote requests through the two-phase orchestrator
pub struct Router {
    utils: Arc<MarketOperationUtils>,
    /// Per-request options start from here.
    defaults: GetMarketOrdersOpts,
    quote_requestor: Option<Arc<dyn QuoteRequestor>>,
    admission: AdmissionControl,
}

impl Router {
    pub fn new(
        utils: Arc<MarketOperationUtils>,
        defaults: GetMarketOrdersOpts,
        quote_requestor: Option<Arc<dyn QuoteRequestor>>,
        admission: AdmissionControl,
    ) -> Self {
        Self {
            utils,
            defaults,
            quote_requestor,
            admission,
        }
    }

    fn opts_for(&self, req: &QuoteRequest) -> GetMarketOrdersOpts {
        let rfqt = match (&req.rfqt, &self.quote_requestor) {
            (Some(r), Some(requestor)) => Some(RfqtOpts {
                is_indicative: r.is_indicative,
                taker_address: r.taker_address.clone(),
                tx_origin: r.tx_origin.clone(),
                intent_on_filling: r.intent_on_filling,
                integrator_id: r.integrator_id.clone(),
                quote_requestor: Arc::clone(requestor),
            }),
            _ => None,
        };
        GetMarketOrdersOpts {
            excluded_sources: req.excluded_sources.clone(),
            included_sources: req.included_sources.clone(),
            should_include_price_comparisons_report: req.include_price_comparisons,
            rfqt,
            ..self.defaults.clone()
        }
    }

    /// Two-phase routing for one request
    pub async fn quote(&self, req: &QuoteRequest) -> Result<QuoteResponse, AggrError> {
        let _permit = self.admission.acquire().await?;
        validate_quote_request(req)?.into_result()?;

        let opts = self.opts_for(req);
        let out = self
            .utils
            .get_optimized_orders(&req.orders, req.amount, req.side, &opts)
            .await?;
        let result = out.result;

        let orders = match req.slippage {
            Some(slippage) => slip_orders(req.side, &result.optimized_orders, slippage)?,
            None => result.optimized_orders.clone(),
        };
        let (maker_amount, taker_amount) = pair_totals(req, &orders);
        let mut sources: Vec<Source> = result.sources().into_iter().collect();
        sources.sort();

        info!(
            side = %req.side,
            amount = %req.amount,
            orders = orders.len(),
            sources = ?sources,
            adjusted_rate = %result.adjusted_rate,
            "quote served"
        );
        Ok(QuoteResponse {
            side: req.side,
            amount: req.amount,
            maker_amount,
            taker_amount,
            adjusted_rate: result.adjusted_rate,
            comparison_price: out.comparison_price,
            sources,
            orders,
            quote_report: out.quote_report,
            price_comparisons_report: out.price_comparisons_report,
        })
    }

    /// Phase 1 only: public liquidity, no private quotes
    pub async fn price(&self, req: &QuoteRequest) -> Result<PriceResponse, AggrError> {
        let _permit = self.admission.acquire().await?;
        validate_quote_request(req)?.into_result()?;

        let opts = GetMarketOrdersOpts { rfqt: None, ..self.opts_for(req) };
        let liquidity = match req.side {
            Side::Sell => self.utils.get_sell_liquidity(&req.orders, req.amount, &opts).await?,
            Side::Buy => self.utils.get_buy_liquidity(&req.orders, req.amount, &opts).await?,
        };
        let result = self
            .utils
            .generate_optimized_orders(&liquidity, Arc::new(IdentityFillAdjustor), &opts, "1")?;
        let comparison_price = get_comparison_prices(
            result.adjusted_rate,
            req.amount,
            &liquidity.price_context(),
            &opts.fee_schedule,
            &opts.exchange_proxy_overhead,
        )
        .whole_order;
        let mut sources: Vec<Source> = result.sources().into_iter().collect();
        sources.sort();

        let (maker_token, taker_token) = liquidity.maker_taker_tokens();
        Ok(PriceResponse {
            side: req.side,
            maker_token: maker_token.clone(),
            taker_token: taker_token.clone(),
            amount: req.amount,
            adjusted_rate: result.adjusted_rate,
            comparison_price,
            sources,
        })
    }
}

/// Maker and taker totals in the request's own tokens. Multi-hop legs
/// denominated in the intermediate token are left out.
fn pair_totals(req: &QuoteRequest, orders: &[OptimizedOrder]) -> (Decimal, Decimal) {
    let Some(first) = req.orders.first() else {
        return (Decimal::ZERO, Decimal::ZERO);
    };
    let (maker_token, taker_token) = (&first.order.maker_token, &first.order.taker_token);
    let maker = orders
        .iter()
        .filter(|o| o.maker_token.eq_ignore_ascii_case(maker_token))
        .map(|o| o.maker_amount)
        .sum();
    let taker = orders
        .iter()
        .filter(|o| o.taker_token.eq_ignore_ascii_case(taker_token))
        .map(|o| o.taker_amount)
        .sum();
    (maker, taker)
}

#[derive(Debug, Clone, Deserialize)]
pub struct RfqtRequest {
    pub is_indicative: bool,
    pub taker_address: Address,
    pub tx_origin: Address,
    #[serde(default)]
    pub intent_on_filling: bool,
    #[serde(default)]
    pub integrator_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuoteRequest {
    pub side: Side,
    /// Taker amount on sells, maker amount on buys, in base units.
    pub amount: Decimal,
    /// Reference orders; the first one fixes the pair.
    pub orders: Vec<SignedNativeOrder>,
    #[serde(default)]
    pub excluded_sources: Vec<Source>,
    #[serde(default)]
    pub included_sources: Vec<Source>,
    #[serde(default)]
    pub slippage: Option<Decimal>,
    #[serde(default)]
    pub rfqt: Option<RfqtRequest>,
    #[serde(default)]
    pub include_price_comparisons: bool,
}

#[derive(Debug, Serialize)]
pub struct QuoteResponse {
    pub side: Side,
    pub amount: Decimal,
    pub maker_amount: Decimal,
    pub taker_amount: Decimal,
    pub adjusted_rate: Decimal,
    pub comparison_price: Option<Decimal>,
    pub sources: Vec<Source>,
    pub orders: Vec<OptimizedOrder>,
    pub quote_report: Option<QuoteReport>,
    pub price_comparisons_report: Option<PriceComparisonsReport>,
}

#[derive(Debug, Serialize)]
pub struct PriceResponse {
    pub side: Side,
    pub maker_token: Address,
    pub taker_token: Address,
    pub amount: Decimal,
    pub adjusted_rate: Decimal,
    pub comparison_price: Option<Decimal>,
    pub sources: Vec<Source>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(err: AggrError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &err {
        AggrError::EmptyOrders | AggrError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        AggrError::NoOptimalPath => StatusCode::UNPROCESSABLE_ENTITY,
        AggrError::Transport(_) | AggrError::BackoffExhausted => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ErrorResponse { error: err.to_string() }))
}

/// Create the HTTP router with API endpoints
pub fn create_api_router(router: Arc<Router>) -> AxumRouter {
    AxumRouter::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/api/v1/quote", post(quote_route))
        .route("/api/v1/price", post(price_route))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(router)
}

/// Health check endpoint
async fn health_check() -> StatusCode {
    StatusCode::OK
}

async fn metrics() -> String {
    crate::metrics::render()
}

/// Quote endpoint - full two-phase routing
async fn quote_route(
    State(router): State<Arc<Router>>,
    Json(req): Json<QuoteRequest>,
) -> Result<Json<QuoteResponse>, (StatusCode, Json<ErrorResponse>)> {
    router.quote(&req).await.map(Json).map_err(error_response)
}

/// Price endpoint - Phase 1 rate and the price RFQ makers would have to beat
async fn price_route(
    State(router): State<Arc<Router>>,
    Json(req): Json<QuoteRequest>,
) -> Result<Json<PriceResponse>, (StatusCode, Json<ErrorResponse>)> {
    router.price(&req).await.map(Json).map_err(error_response)
}
