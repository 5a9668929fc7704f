// Market-side liquidity module
// Everything gathered for one side of one request, the per-request options,
// and the optimizer results handed back to callers
//
// Numan Thabit 2025 Nov

use crate::fees::{zero_overhead, FeeSchedule, SettlementOverhead};
use crate::rfq::{FirmQuote, IndicativeQuote, QuoteRequestor};
use crate::router::adjustor::{FillAdjustor, IdentityFillAdjustor};
use crate::router::comparison::PriceContext;
use crate::router::fills::Fill;
use crate::router::path::{OptimizedOrder, PathContext};
use crate::router::report::{PriceComparisonsReport, QuoteReport};
use crate::router::source_filters::SourceFilters;
use crate::types::{Address, DexSample, NativeOrderWithFillableAmounts, Side, Source, SourceFlags};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct RawQuotes {
    pub native_orders: Vec<NativeOrderWithFillableAmounts>,
    pub rfqt_indicative_quotes: Vec<IndicativeQuote>,
    /// One curve per intermediate token.
    pub two_hop_quotes: Vec<Vec<DexSample>>,
    /// One curve per source, ordered by increasing input.
    pub dex_quotes: Vec<Vec<DexSample>>,
    /// Maker endpoint per firm quote signature, for reporting.
    pub maker_uris: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct MarketSideLiquidity {
    pub side: Side,
    pub input_amount: Decimal,
    pub input_token: Address,
    pub output_token: Address,
    pub output_amount_per_eth: Decimal,
    pub input_amount_per_eth: Decimal,
    pub quote_source_filters: SourceFilters,
    pub maker_token_decimals: u32,
    pub taker_token_decimals: u32,
    pub quotes: RawQuotes,
    pub is_rfq_supported: bool,
}

impl MarketSideLiquidity {
    pub fn path_context(&self) -> PathContext {
        PathContext {
            side: self.side,
            input_token: self.input_token.clone(),
            output_token: self.output_token.clone(),
        }
    }

    pub fn price_context(&self) -> PriceContext {
        PriceContext {
            side: self.side,
            input_amount_per_eth: self.input_amount_per_eth,
            output_amount_per_eth: self.output_amount_per_eth,
            maker_token_decimals: self.maker_token_decimals,
            taker_token_decimals: self.taker_token_decimals,
        }
    }

    /// `(maker_token, taker_token)` of the pair.
    pub fn maker_taker_tokens(&self) -> (&Address, &Address) {
        match self.side {
            Side::Sell => (&self.output_token, &self.input_token),
            Side::Buy => (&self.input_token, &self.output_token),
        }
    }

    /// Copy with private quotes spliced in. Firm quotes go ahead of the
    /// existing native orders; indicative quotes are kept separately and only
    /// become candidates when the optimizer runs.
    pub fn with_private_quotes(&self, indicative: Vec<IndicativeQuote>, firm: Vec<FirmQuote>) -> Self {
        let mut next = self.clone();
        next.quotes.rfqt_indicative_quotes.extend(indicative);
        let mut native_orders = Vec::with_capacity(firm.len() + self.quotes.native_orders.len());
        for quote in firm {
            if let Some(sig) = &quote.order.signature {
                next.quotes.maker_uris.insert(sig.clone(), quote.maker_uri.clone());
            }
            native_orders.push(quote.into_fillable());
        }
        native_orders.extend(self.quotes.native_orders.iter().cloned());
        next.quotes.native_orders = native_orders;
        next
    }

    /// Copy whose dex curves are limited to `sources`. Multi-hop curves and
    /// native orders are untouched.
    pub fn restricted_to(&self, sources: &HashSet<Source>) -> Self {
        let mut next = self.clone();
        next.quotes
            .dex_quotes
            .retain(|curve| curve.first().is_some_and(|s| sources.contains(&s.source)));
        next
    }

    /// Native orders plus indicative quotes as unsigned RFQ orders.
    pub fn candidate_native_orders(&self) -> Vec<NativeOrderWithFillableAmounts> {
        self.quotes
            .native_orders
            .iter()
            .cloned()
            .chain(self.quotes.rfqt_indicative_quotes.iter().map(IndicativeQuote::to_native_order))
            .collect()
    }
}

/// Private quote solicitation for one request.
#[derive(Clone)]
pub struct RfqtOpts {
    pub is_indicative: bool,
    pub taker_address: Address,
    /// Checked on chain; contracts cannot take RFQ liquidity.
    pub tx_origin: Address,
    pub intent_on_filling: bool,
    pub integrator_id: Option<String>,
    pub quote_requestor: Arc<dyn QuoteRequestor>,
}

impl fmt::Debug for RfqtOpts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RfqtOpts")
            .field("is_indicative", &self.is_indicative)
            .field("taker_address", &self.taker_address)
            .field("tx_origin", &self.tx_origin)
            .field("intent_on_filling", &self.intent_on_filling)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct GetMarketOrdersOpts {
    pub excluded_sources: Vec<Source>,
    pub included_sources: Vec<Source>,
    pub excluded_fee_sources: Vec<Source>,
    /// Points sampled per source curve.
    pub num_samples: usize,
    /// Exponent base for the sample distribution; 1 is linear.
    pub sample_distribution_base: Decimal,
    /// Interpolation resolution handed to the solver.
    pub router_num_samples: usize,
    pub fee_schedule: FeeSchedule,
    pub exchange_proxy_overhead: SettlementOverhead,
    /// Wei per gas unit.
    pub gas_price: Decimal,
    pub should_generate_quote_report: bool,
    pub should_include_price_comparisons_report: bool,
    /// Applied in Phase 2 only.
    pub fill_adjustor: Arc<dyn FillAdjustor>,
    pub rfqt: Option<RfqtOpts>,
}

impl Default for GetMarketOrdersOpts {
    fn default() -> Self {
        Self {
            excluded_sources: Vec::new(),
            included_sources: Vec::new(),
            excluded_fee_sources: Vec::new(),
            num_samples: 13,
            sample_distribution_base: Decimal::new(105, 2),
            router_num_samples: 14,
            fee_schedule: FeeSchedule::default(),
            exchange_proxy_overhead: zero_overhead(),
            gas_price: Decimal::ONE,
            should_generate_quote_report: true,
            should_include_price_comparisons_report: false,
            fill_adjustor: Arc::new(IdentityFillAdjustor),
            rfqt: None,
        }
    }
}

impl fmt::Debug for GetMarketOrdersOpts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GetMarketOrdersOpts")
            .field("excluded_sources", &self.excluded_sources)
            .field("included_sources", &self.included_sources)
            .field("num_samples", &self.num_samples)
            .field("sample_distribution_base", &self.sample_distribution_base)
            .field("router_num_samples", &self.router_num_samples)
            .field("gas_price", &self.gas_price)
            .field("rfqt", &self.rfqt)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct OptimizerResult {
    pub optimized_orders: Vec<OptimizedOrder>,
    pub liquidity_delivered: Vec<Fill>,
    pub source_flags: SourceFlags,
    pub market_side_liquidity: MarketSideLiquidity,
    pub adjusted_rate: Decimal,
    pub taker_amount_per_eth: Decimal,
    pub maker_amount_per_eth: Decimal,
}

impl OptimizerResult {
    /// Sources of the finalized orders.
    pub fn sources(&self) -> HashSet<Source> {
        self.optimized_orders.iter().map(|o| o.source).collect()
    }
}

#[derive(Debug, Clone)]
pub struct OptimizerResultWithReport {
    pub result: OptimizerResult,
    pub comparison_price: Option<Decimal>,
    pub quote_report: Option<QuoteReport>,
    pub price_comparisons_report: Option<PriceComparisonsReport>,
}
