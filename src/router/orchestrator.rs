// Liquidity orchestrator
// Two-phase routing: gather public liquidity in one sampler batch, optimize
// over it, derive the price private makers have to beat, solicit RFQ quotes
// and optimize again with them spliced in.
//
// Numan Thabit 2025 Nov

use crate::errors::AggrError;
use crate::metrics::{NO_CONVERSION_TO_NATIVE, NO_OPTIMAL_PATH, RFQ_DURATION, ROUTER_DURATION};
use crate::rfq::{FirmQuote, IndicativeQuote, RfqRequest};
use crate::router::adjustor::{FillAdjustor, IdentityFillAdjustor};
use crate::router::comparison::get_comparison_prices;
use crate::router::liquidity::{
    GetMarketOrdersOpts, MarketSideLiquidity, OptimizerResult, OptimizerResultWithReport, RawQuotes, RfqtOpts,
};
use crate::router::optimizer::PathOptimizer;
use crate::router::path::PathPenaltyOpts;
use crate::router::report::{generate_price_comparisons_report, generate_quote_report};
use crate::router::solver::Solver;
use crate::router::source_filters::SourceFilters;
use crate::sampler::{get_sample_amounts, BatchResults, Sampler, SamplerOp};
use crate::types::{Address, NativeOrderWithFillableAmounts, Side, SignedNativeOrder, Source};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Stand-in tx origin when no RFQ is requested.
const NULL_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// Chain-level routing settings, loaded once at start.
#[derive(Debug, Clone)]
pub struct ChainRouting {
    pub sell_sources: SourceFilters,
    pub buy_sources: SourceFilters,
    /// Sources probed for native-token conversion rates.
    pub fee_sources: SourceFilters,
    pub native_fee_token: Address,
    /// Native units sold when probing a conversion rate.
    pub native_fee_token_amount: Decimal,
    pub vip_sources: Arc<HashSet<Source>>,
}

#[derive(Clone)]
pub struct MarketOperationUtils {
    sampler: Arc<dyn Sampler>,
    chain: ChainRouting,
    solver: Arc<dyn Solver>,
}

/// Pair shared by a list of reference orders.
fn pair_of(orders: &[SignedNativeOrder]) -> Result<(Address, Address), AggrError> {
    let first = orders.first().ok_or(AggrError::EmptyOrders)?;
    Ok((first.order.maker_token.clone(), first.order.taker_token.clone()))
}

fn note_missing_rate(rate: Decimal, token: &str, role: &'static str) {
    if rate.is_zero() {
        NO_CONVERSION_TO_NATIVE.with_label_values(&[role]).inc();
        info!(token, token_role = role, "no conversion to native token found");
    }
}

impl MarketOperationUtils {
    pub fn new(sampler: Arc<dyn Sampler>, chain: ChainRouting, solver: Arc<dyn Solver>) -> Self {
        Self { sampler, chain, solver }
    }

    pub fn chain(&self) -> &ChainRouting {
        &self.chain
    }

    fn fee_sources(&self, opts: &GetMarketOrdersOpts) -> Vec<Source> {
        self.chain
            .fee_sources
            .exclude(opts.excluded_fee_sources.iter().copied())
            .sources()
    }

    fn rate_op(&self, opts: &GetMarketOrdersOpts, token: &Address) -> SamplerOp {
        SamplerOp::BestNativeTokenSellRate {
            sources: self.fee_sources(opts),
            token: token.clone(),
            native_token: self.chain.native_fee_token.clone(),
            native_amount: self.chain.native_fee_token_amount,
        }
    }

    fn quote_source_filters(&self, side: Side, opts: &GetMarketOrdersOpts) -> SourceFilters {
        let chain = match side {
            Side::Sell => &self.chain.sell_sources,
            Side::Buy => &self.chain.buy_sources,
        };
        let requested = SourceFilters::all()
            .exclude(opts.excluded_sources.iter().copied())
            .include(opts.included_sources.iter().copied());
        chain.merge(&requested)
    }

    /// Public liquidity for selling `taker_amount` of the orders' taker token.
    pub async fn get_sell_liquidity(
        &self,
        native_orders: &[SignedNativeOrder],
        taker_amount: Decimal,
        opts: &GetMarketOrdersOpts,
    ) -> Result<MarketSideLiquidity, AggrError> {
        self.gather(Side::Sell, native_orders, taker_amount, opts).await
    }

    /// Public liquidity for buying `maker_amount` of the orders' maker token.
    pub async fn get_buy_liquidity(
        &self,
        native_orders: &[SignedNativeOrder],
        maker_amount: Decimal,
        opts: &GetMarketOrdersOpts,
    ) -> Result<MarketSideLiquidity, AggrError> {
        self.gather(Side::Buy, native_orders, maker_amount, opts).await
    }

    async fn gather(
        &self,
        side: Side,
        native_orders: &[SignedNativeOrder],
        amount: Decimal,
        opts: &GetMarketOrdersOpts,
    ) -> Result<MarketSideLiquidity, AggrError> {
        let (maker_token, taker_token) = pair_of(native_orders)?;
        let quote_source_filters = self.quote_source_filters(side, opts);
        let sources = quote_source_filters.sources();
        let two_hop_sources = if quote_source_filters.is_allowed(Source::MultiHop) {
            sources.clone()
        } else {
            Vec::new()
        };
        let amounts = get_sample_amounts(amount, opts.num_samples, opts.sample_distribution_base);
        let tx_origin = opts
            .rfqt
            .as_ref()
            .map(|r| r.tx_origin.clone())
            .unwrap_or_else(|| NULL_ADDRESS.to_string());

        // output token first: it prices the per-source gas penalty
        let (output_token, input_token) = match side {
            Side::Sell => (&maker_token, &taker_token),
            Side::Buy => (&taker_token, &maker_token),
        };
        let orders = native_orders.to_vec();
        let (fillable_op, quotes_op, two_hop_op) = match side {
            Side::Sell => (
                SamplerOp::LimitOrderFillableTakerAmounts { orders },
                SamplerOp::SellQuotes {
                    sources,
                    maker_token: maker_token.clone(),
                    taker_token: taker_token.clone(),
                    amounts: amounts.clone(),
                },
                SamplerOp::TwoHopSellQuotes {
                    sources: two_hop_sources,
                    maker_token: maker_token.clone(),
                    taker_token: taker_token.clone(),
                    amounts,
                },
            ),
            Side::Buy => (
                SamplerOp::LimitOrderFillableMakerAmounts { orders },
                SamplerOp::BuyQuotes {
                    sources,
                    maker_token: maker_token.clone(),
                    taker_token: taker_token.clone(),
                    amounts: amounts.clone(),
                },
                SamplerOp::TwoHopBuyQuotes {
                    sources: two_hop_sources,
                    maker_token: maker_token.clone(),
                    taker_token: taker_token.clone(),
                    amounts,
                },
            ),
        };
        let ops = vec![
            SamplerOp::BlockNumber,
            SamplerOp::TokenDecimals { tokens: vec![maker_token.clone(), taker_token.clone()] },
            fillable_op,
            self.rate_op(opts, output_token),
            self.rate_op(opts, input_token),
            quotes_op,
            two_hop_op,
            SamplerOp::IsAddressContract { address: tx_origin },
        ];

        let mut results = BatchResults::new(self.sampler.execute_batch(ops).await);
        let block_number = results.block_number();
        let decimals = results.decimals(2);
        let fillable = results.fillable(native_orders.len());
        let output_amount_per_eth = results.rate();
        let input_amount_per_eth = results.rate();
        let dex_quotes = results.quotes();
        let two_hop_quotes = results.quotes();
        let is_tx_origin_contract = results.is_contract();

        let (output_role, input_role) = match side {
            Side::Sell => ("maker", "taker"),
            Side::Buy => ("taker", "maker"),
        };
        note_missing_rate(output_amount_per_eth, output_token, output_role);
        note_missing_rate(input_amount_per_eth, input_token, input_role);

        let native_orders: Vec<NativeOrderWithFillableAmounts> = native_orders
            .iter()
            .zip(fillable)
            .map(|(order, amount)| match side {
                Side::Sell => order.clone().with_fillable_taker_amount(amount),
                Side::Buy => order.clone().with_fillable_maker_amount(amount),
            })
            .collect();
        debug!(
            block_number,
            dex_curves = dex_quotes.len(),
            two_hop_curves = two_hop_quotes.len(),
            native_orders = native_orders.len(),
            "gathered market side liquidity"
        );

        Ok(MarketSideLiquidity {
            side,
            input_amount: amount,
            input_token: input_token.clone(),
            output_token: output_token.clone(),
            output_amount_per_eth,
            input_amount_per_eth,
            quote_source_filters,
            maker_token_decimals: decimals[0],
            taker_token_decimals: decimals[1],
            quotes: RawQuotes {
                native_orders,
                dex_quotes,
                two_hop_quotes,
                ..Default::default()
            },
            is_rfq_supported: opts.rfqt.is_some() && !is_tx_origin_contract,
        })
    }

    /// Run the optimizer once over `liquidity` and finalize the best path.
    pub fn generate_optimized_orders(
        &self,
        liquidity: &MarketSideLiquidity,
        fill_adjustor: Arc<dyn FillAdjustor>,
        opts: &GetMarketOrdersOpts,
        phase: &'static str,
    ) -> Result<OptimizerResult, AggrError> {
        let penalty_opts = PathPenaltyOpts {
            output_amount_per_eth: liquidity.output_amount_per_eth,
            input_amount_per_eth: liquidity.input_amount_per_eth,
            exchange_proxy_overhead: opts.exchange_proxy_overhead.clone(),
            gas_price: opts.gas_price,
        };
        let optimizer = PathOptimizer {
            context: liquidity.path_context(),
            fees: opts.fee_schedule.clone(),
            penalty_opts,
            input_amount: liquidity.input_amount,
            router_num_samples: opts.router_num_samples,
            vip_sources: Arc::clone(&self.chain.vip_sources),
            fill_adjustor,
            solver: Arc::clone(&self.solver),
        };

        let timer = ROUTER_DURATION
            .with_label_values(&[self.solver.name(), phase])
            .start_timer();
        let best = optimizer.find_optimal_path_from_samples(
            &liquidity.quotes.dex_quotes,
            &liquidity.quotes.two_hop_quotes,
            &liquidity.candidate_native_orders(),
        );
        timer.observe_duration();

        let Some(path) = best else {
            NO_OPTIMAL_PATH.with_label_values(&[phase]).inc();
            info!(phase, side = %liquidity.side, amount = %liquidity.input_amount, "optimizer found no path");
            return Err(AggrError::NoOptimalPath);
        };

        let (taker_amount_per_eth, maker_amount_per_eth) = match liquidity.side {
            Side::Sell => (liquidity.input_amount_per_eth, liquidity.output_amount_per_eth),
            Side::Buy => (liquidity.output_amount_per_eth, liquidity.input_amount_per_eth),
        };
        Ok(OptimizerResult {
            optimized_orders: path.finalize().to_vec(),
            liquidity_delivered: path.fills.clone(),
            source_flags: path.source_flags,
            adjusted_rate: path.adjusted_rate(),
            market_side_liquidity: liquidity.clone(),
            taker_amount_per_eth,
            maker_amount_per_eth,
        })
    }

    /// Full two-phase routing for one request.
    #[tracing::instrument(skip_all, fields(side = %side, amount = %amount))]
    pub async fn get_optimized_orders(
        &self,
        native_orders: &[SignedNativeOrder],
        amount: Decimal,
        side: Side,
        opts: &GetMarketOrdersOpts,
    ) -> Result<OptimizerResultWithReport, AggrError> {
        let mut liquidity = match side {
            Side::Sell => self.get_sell_liquidity(native_orders, amount, opts).await?,
            Side::Buy => self.get_buy_liquidity(native_orders, amount, opts).await?,
        };

        // Phase 1: public liquidity with no fill adjustment
        let mut result = match self.generate_optimized_orders(&liquidity, Arc::new(IdentityFillAdjustor), opts, "1") {
            Ok(result) => Some(result),
            Err(AggrError::NoOptimalPath) => {
                info!("no optimal path in phase 1, continuing to private quotes");
                None
            }
            Err(err) => return Err(err),
        };

        let comparison_price = result.as_ref().and_then(|r| {
            get_comparison_prices(
                r.adjusted_rate,
                amount,
                &liquidity.price_context(),
                &opts.fee_schedule,
                &opts.exchange_proxy_overhead,
            )
            .whole_order
        });

        if let Some(rfqt) = opts.rfqt.as_ref() {
            if liquidity.is_rfq_supported && liquidity.quote_source_filters.is_allowed(Source::Native) {
                let phase1_sources = result.as_ref().map(OptimizerResult::sources).unwrap_or_default();
                if let Some(spliced) = self.solicit_private_quotes(&liquidity, rfqt, comparison_price).await {
                    // Phase 2: only the dex sources Phase 1 picked are offered again
                    let phase2 = spliced.restricted_to(&phase1_sources);
                    result = Some(self.generate_optimized_orders(&phase2, Arc::clone(&opts.fill_adjustor), opts, "2")?);
                    liquidity = spliced;
                }
            }
        }

        let Some(result) = result else {
            info!("no optimal path after both phases");
            return Err(AggrError::NoOptimalPath);
        };

        let quote_report = if opts.should_generate_quote_report {
            generate_quote_report(side, &liquidity.quotes, &result.liquidity_delivered, amount, comparison_price)
                .map_err(|err| warn!(error = %err, "quote report failed"))
                .ok()
        } else {
            None
        };
        let price_comparisons_report = if opts.should_include_price_comparisons_report {
            generate_price_comparisons_report(&liquidity, comparison_price, opts)
                .map_err(|err| warn!(error = %err, "price comparisons report failed"))
                .ok()
        } else {
            None
        };

        Ok(OptimizerResultWithReport {
            result,
            comparison_price,
            quote_report,
            price_comparisons_report,
        })
    }

    /// Liquidity with the makers' quotes spliced in, or `None` when no maker
    /// answered. Requestor failures count as no quotes.
    async fn solicit_private_quotes(
        &self,
        liquidity: &MarketSideLiquidity,
        rfqt: &RfqtOpts,
        comparison_price: Option<Decimal>,
    ) -> Option<MarketSideLiquidity> {
        let (maker_token, taker_token) = liquidity.maker_taker_tokens();
        let req = RfqRequest {
            side: liquidity.side,
            maker_token: maker_token.clone(),
            taker_token: taker_token.clone(),
            asset_fill_amount: liquidity.input_amount,
            comparison_price,
            taker_address: rfqt.taker_address.clone(),
            tx_origin: rfqt.tx_origin.clone(),
            intent_on_filling: rfqt.intent_on_filling,
            integrator_id: rfqt.integrator_id.clone(),
        };
        let quote_type = if rfqt.is_indicative { "indicative" } else { "firm" };
        let started = Instant::now();

        let (indicative, firm): (Vec<IndicativeQuote>, Vec<FirmQuote>) = if rfqt.is_indicative {
            let quotes = rfqt.quote_requestor.get_indicative_quotes(&req).await;
            (quotes.unwrap_or_else(|err| rfq_failed(quote_type, err)), Vec::new())
        } else {
            let quotes = rfqt.quote_requestor.get_firm_quotes(&req).await;
            (Vec::new(), quotes.unwrap_or_else(|err| rfq_failed(quote_type, err)))
        };

        let delta = started.elapsed();
        RFQ_DURATION.with_label_values(&[quote_type]).observe(delta.as_secs_f64());
        info!(
            rfq_quote_type = quote_type,
            delta_ms = delta.as_millis() as u64,
            quotes = indicative.len() + firm.len(),
            "private quotes received"
        );

        if indicative.is_empty() && firm.is_empty() {
            return None;
        }
        Some(liquidity.with_private_quotes(indicative, firm))
    }

    /// Route a buy of `maker_amounts[i]` against each order list in `batch`,
    /// sampling every pair in one sampler round trip. Pairs without a path
    /// yield `None`.
    #[tracing::instrument(skip_all, fields(pairs = batch.len()))]
    pub async fn get_batch_market_buy_orders(
        &self,
        batch: &[Vec<SignedNativeOrder>],
        maker_amounts: &[Decimal],
        opts: &GetMarketOrdersOpts,
    ) -> Result<Vec<Option<OptimizerResult>>, AggrError> {
        if batch.is_empty() {
            return Err(AggrError::EmptyOrders);
        }
        if batch.len() != maker_amounts.len() {
            return Err(AggrError::InvalidRequest(format!(
                "{} order lists but {} maker amounts",
                batch.len(),
                maker_amounts.len()
            )));
        }
        let pairs = batch.iter().map(|orders| pair_of(orders)).collect::<Result<Vec<_>, _>>()?;
        let quote_source_filters = self.quote_source_filters(Side::Buy, opts);
        let sources = quote_source_filters.sources();

        let mut ops = vec![SamplerOp::BlockNumber];
        ops.extend(batch.iter().map(|orders| SamplerOp::LimitOrderFillableMakerAmounts { orders: orders.clone() }));
        ops.extend(pairs.iter().map(|(_, taker_token)| self.rate_op(opts, taker_token)));
        ops.extend(pairs.iter().zip(maker_amounts).map(|((maker_token, taker_token), amount)| {
            SamplerOp::BuyQuotes {
                sources: sources.clone(),
                maker_token: maker_token.clone(),
                taker_token: taker_token.clone(),
                amounts: get_sample_amounts(*amount, opts.num_samples, opts.sample_distribution_base),
            }
        }));
        ops.extend(pairs.iter().map(|(maker_token, taker_token)| SamplerOp::TokenDecimals {
            tokens: vec![maker_token.clone(), taker_token.clone()],
        }));

        let mut results = BatchResults::new(self.sampler.execute_batch(ops).await);
        let block_number = results.block_number();
        let fillable: Vec<Vec<Decimal>> = batch.iter().map(|orders| results.fillable(orders.len())).collect();
        let rates: Vec<Decimal> = pairs.iter().map(|_| results.rate()).collect();
        let dex_quotes: Vec<_> = pairs.iter().map(|_| results.quotes()).collect();
        let decimals: Vec<Vec<u32>> = pairs.iter().map(|_| results.decimals(2)).collect();
        debug!(block_number, "gathered batch buy liquidity");

        let mut out = Vec::with_capacity(batch.len());
        for (i, ((maker_token, taker_token), orders)) in pairs.into_iter().zip(batch).enumerate() {
            note_missing_rate(rates[i], &taker_token, "taker");
            let native_orders = orders
                .iter()
                .zip(fillable[i].iter())
                .map(|(order, amount)| order.clone().with_fillable_maker_amount(*amount))
                .collect();
            let liquidity = MarketSideLiquidity {
                side: Side::Buy,
                input_amount: maker_amounts[i],
                input_token: maker_token,
                output_token: taker_token,
                output_amount_per_eth: rates[i],
                input_amount_per_eth: Decimal::ZERO,
                quote_source_filters: quote_source_filters.clone(),
                maker_token_decimals: decimals[i][0],
                taker_token_decimals: decimals[i][1],
                quotes: RawQuotes {
                    native_orders,
                    dex_quotes: dex_quotes[i].clone(),
                    ..Default::default()
                },
                is_rfq_supported: false,
            };
            let result = self
                .generate_optimized_orders(&liquidity, Arc::clone(&opts.fill_adjustor), opts, "batch")
                .map_err(|err| debug!(pair = i, error = %err, "no route for batch pair"))
                .ok();
            out.push(result);
        }
        Ok(out)
    }
}

fn rfq_failed<T>(quote_type: &'static str, err: AggrError) -> Vec<T> {
    warn!(rfq_quote_type = quote_type, error = %err, "private quote request failed");
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rfq::QuoteRequestor;
    use crate::router::solver::ChunkedDpSolver;
    use crate::sampler::SamplerOutput;
    use crate::types::{DexSample, FillData, NativeOrder, NativeOrderType};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Linear curves at a fixed rate per source; everything else answers
    /// with harmless defaults.
    struct LinearSampler {
        rates: HashMap<Source, Decimal>,
        is_contract: bool,
        seen: Mutex<Vec<SamplerOp>>,
    }

    impl LinearSampler {
        fn new(rates: &[(Source, i64)]) -> Self {
            Self {
                rates: rates.iter().map(|(s, r)| (*s, Decimal::from(*r))).collect(),
                is_contract: false,
                seen: Mutex::new(Vec::new()),
            }
        }

        fn curves(&self, sources: &[Source], amounts: &[Decimal], is_sell: bool) -> Vec<Vec<DexSample>> {
            sources
                .iter()
                .filter_map(|s| self.rates.get(s).map(|rate| (*s, *rate)))
                .map(|(source, rate)| {
                    amounts
                        .iter()
                        .map(|a| DexSample {
                            source,
                            input: *a,
                            output: if is_sell { a * rate } else { a / rate },
                            fill_data: FillData::None,
                        })
                        .collect()
                })
                .collect()
        }
    }

    #[async_trait]
    impl Sampler for LinearSampler {
        async fn execute_batch(&self, ops: Vec<SamplerOp>) -> Vec<Result<SamplerOutput, AggrError>> {
            self.seen.lock().unwrap().extend(ops.iter().cloned());
            ops.into_iter()
                .map(|op| {
                    Ok(match op {
                        SamplerOp::BlockNumber => SamplerOutput::BlockNumber(1),
                        SamplerOp::TokenDecimals { tokens } => SamplerOutput::Decimals(vec![18; tokens.len()]),
                        SamplerOp::LimitOrderFillableTakerAmounts { orders } => {
                            SamplerOutput::Fillable(orders.iter().map(|o| o.order.taker_amount).collect())
                        }
                        SamplerOp::LimitOrderFillableMakerAmounts { orders } => {
                            SamplerOutput::Fillable(orders.iter().map(|o| o.order.maker_amount).collect())
                        }
                        SamplerOp::BestNativeTokenSellRate { .. } => SamplerOutput::Rate(Decimal::ONE),
                        SamplerOp::SellQuotes { sources, amounts, .. } => {
                            SamplerOutput::Quotes(self.curves(&sources, &amounts, true))
                        }
                        SamplerOp::BuyQuotes { sources, amounts, .. } => {
                            SamplerOutput::Quotes(self.curves(&sources, &amounts, false))
                        }
                        SamplerOp::TwoHopSellQuotes { .. } | SamplerOp::TwoHopBuyQuotes { .. } => {
                            SamplerOutput::Quotes(Vec::new())
                        }
                        SamplerOp::IsAddressContract { .. } => SamplerOutput::IsContract(self.is_contract),
                    })
                })
                .collect()
        }
    }

    #[derive(Default)]
    struct FixedMaker {
        indicative: Vec<IndicativeQuote>,
        firm: Vec<FirmQuote>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl QuoteRequestor for FixedMaker {
        async fn get_indicative_quotes(&self, _req: &RfqRequest) -> Result<Vec<IndicativeQuote>, AggrError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.indicative.clone())
        }

        async fn get_firm_quotes(&self, _req: &RfqRequest) -> Result<Vec<FirmQuote>, AggrError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.firm.clone())
        }
    }

    fn chain() -> ChainRouting {
        ChainRouting {
            sell_sources: SourceFilters::all(),
            buy_sources: SourceFilters::all(),
            fee_sources: SourceFilters::only([Source::UniswapV2]),
            native_fee_token: "0xweth".into(),
            native_fee_token_amount: Decimal::ONE,
            vip_sources: Arc::new(HashSet::new()),
        }
    }

    fn utils(sampler: LinearSampler) -> (MarketOperationUtils, Arc<LinearSampler>) {
        let sampler = Arc::new(sampler);
        let shared: Arc<dyn Sampler> = sampler.clone();
        (MarketOperationUtils::new(shared, chain(), Arc::new(ChunkedDpSolver)), sampler)
    }

    fn reference_order() -> SignedNativeOrder {
        SignedNativeOrder {
            order: NativeOrder {
                maker: "0xmm".into(),
                maker_token: "0xusdc".into(),
                taker_token: "0xdai".into(),
                // a limit order far worse than any venue
                maker_amount: Decimal::ONE,
                taker_amount: Decimal::from(1000),
                taker_token_fee_amount: Decimal::ZERO,
                expiry: 0,
            },
            signature: Some("0xsig".into()),
            order_type: NativeOrderType::Limit,
        }
    }

    fn rfqt(maker: Arc<FixedMaker>, is_indicative: bool) -> RfqtOpts {
        RfqtOpts {
            is_indicative,
            taker_address: "0xme".into(),
            tx_origin: "0xme".into(),
            intent_on_filling: true,
            integrator_id: None,
            quote_requestor: maker,
        }
    }

    fn indicative(maker_amount: i64, taker_amount: i64) -> IndicativeQuote {
        IndicativeQuote {
            maker_token: "0xusdc".into(),
            taker_token: "0xdai".into(),
            maker_amount: Decimal::from(maker_amount),
            taker_amount: Decimal::from(taker_amount),
            expiry: u64::MAX,
            maker_uri: Some("https://mm".into()),
        }
    }

    fn assert_close(actual: Decimal, expected: i64) {
        let diff = (actual - Decimal::from(expected)).abs();
        assert!(diff < Decimal::new(1, 6), "{actual} != {expected}");
    }

    #[tokio::test]
    async fn phase_one_picks_the_best_public_source() {
        let (utils, _) = utils(LinearSampler::new(&[(Source::UniswapV2, 2), (Source::Curve, 1)]));
        let opts = GetMarketOrdersOpts::default();
        let out = utils
            .get_optimized_orders(&[reference_order()], Decimal::from(100), Side::Sell, &opts)
            .await
            .unwrap();

        assert_eq!(out.result.sources(), HashSet::from([Source::UniswapV2]));
        assert_close(out.result.adjusted_rate, 2);
        // no native fee entry, no price to beat
        assert!(out.comparison_price.is_none());
        assert!(out.quote_report.is_some());
        assert!(out.price_comparisons_report.is_none());
    }

    #[tokio::test]
    async fn indicative_quotes_win_phase_two() {
        let (utils, _) = utils(LinearSampler::new(&[(Source::UniswapV2, 2)]));
        let maker = Arc::new(FixedMaker { indicative: vec![indicative(300, 100)], ..Default::default() });
        let opts = GetMarketOrdersOpts { rfqt: Some(rfqt(maker.clone(), true)), ..Default::default() };
        let out = utils
            .get_optimized_orders(&[reference_order()], Decimal::from(100), Side::Sell, &opts)
            .await
            .unwrap();

        assert_eq!(maker.calls.load(Ordering::SeqCst), 1);
        assert_eq!(out.result.sources(), HashSet::from([Source::Native]));
        assert_close(out.result.adjusted_rate, 3);
        assert_eq!(out.result.market_side_liquidity.quotes.rfqt_indicative_quotes.len(), 1);
    }

    #[tokio::test]
    async fn firm_quotes_are_routed_as_rfq_orders() {
        let (utils, _) = utils(LinearSampler::new(&[(Source::UniswapV2, 2)]));
        let firm = FirmQuote {
            order: SignedNativeOrder {
                order: NativeOrder {
                    maker: "0xmm".into(),
                    maker_token: "0xusdc".into(),
                    taker_token: "0xdai".into(),
                    maker_amount: Decimal::from(300),
                    taker_amount: Decimal::from(100),
                    taker_token_fee_amount: Decimal::ZERO,
                    expiry: u64::MAX,
                },
                signature: Some("0xfirm".into()),
                order_type: NativeOrderType::Rfq,
            },
            maker_uri: "https://mm".into(),
        };
        let maker = Arc::new(FixedMaker { firm: vec![firm], ..Default::default() });
        let opts = GetMarketOrdersOpts { rfqt: Some(rfqt(maker, false)), ..Default::default() };
        let out = utils
            .get_optimized_orders(&[reference_order()], Decimal::from(100), Side::Sell, &opts)
            .await
            .unwrap();

        assert_eq!(out.result.sources(), HashSet::from([Source::Native]));
        let report = out.quote_report.unwrap();
        assert!(report.sources_delivered.iter().all(|e| e.source() == Source::Native));
    }

    #[tokio::test]
    async fn private_quotes_rescue_an_empty_phase_one() {
        let (utils, _) = utils(LinearSampler::new(&[]));
        let maker = Arc::new(FixedMaker { indicative: vec![indicative(150, 100)], ..Default::default() });
        let opts = GetMarketOrdersOpts { rfqt: Some(rfqt(maker, true)), ..Default::default() };
        let mut unfillable = reference_order();
        unfillable.order.maker_amount = Decimal::ZERO;
        let out = utils
            .get_optimized_orders(&[unfillable], Decimal::from(100), Side::Sell, &opts)
            .await
            .unwrap();
        assert_eq!(out.result.sources(), HashSet::from([Source::Native]));
    }

    #[tokio::test]
    async fn contract_origin_skips_private_quotes() {
        let mut sampler = LinearSampler::new(&[(Source::UniswapV2, 2)]);
        sampler.is_contract = true;
        let (utils, _) = utils(sampler);
        let maker = Arc::new(FixedMaker { indicative: vec![indicative(300, 100)], ..Default::default() });
        let opts = GetMarketOrdersOpts { rfqt: Some(rfqt(maker.clone(), true)), ..Default::default() };
        let out = utils
            .get_optimized_orders(&[reference_order()], Decimal::from(100), Side::Sell, &opts)
            .await
            .unwrap();

        assert_eq!(maker.calls.load(Ordering::SeqCst), 0);
        assert_eq!(out.result.sources(), HashSet::from([Source::UniswapV2]));
    }

    #[tokio::test]
    async fn no_liquidity_is_no_optimal_path() {
        let (utils, _) = utils(LinearSampler::new(&[]));
        let mut order = reference_order();
        order.order.maker_amount = Decimal::ZERO;
        let err = utils
            .get_optimized_orders(&[order], Decimal::from(100), Side::Sell, &GetMarketOrdersOpts::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AggrError::NoOptimalPath));
    }

    #[tokio::test]
    async fn empty_orders_are_rejected() {
        let (utils, sampler) = utils(LinearSampler::new(&[(Source::UniswapV2, 2)]));
        let err = utils
            .get_optimized_orders(&[], Decimal::from(100), Side::Buy, &GetMarketOrdersOpts::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AggrError::EmptyOrders));
        assert!(sampler.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn excluded_sources_are_not_sampled() {
        let (utils, sampler) = utils(LinearSampler::new(&[(Source::UniswapV2, 2), (Source::Curve, 1)]));
        let opts = GetMarketOrdersOpts { excluded_sources: vec![Source::UniswapV2], ..Default::default() };
        let liquidity = utils
            .get_sell_liquidity(&[reference_order()], Decimal::from(100), &opts)
            .await
            .unwrap();

        assert!(!liquidity.quote_source_filters.is_allowed(Source::UniswapV2));
        assert_eq!(liquidity.quotes.dex_quotes.len(), 1);
        assert_eq!(liquidity.quotes.dex_quotes[0][0].source, Source::Curve);
        let seen = sampler.seen.lock().unwrap();
        assert!(seen.iter().any(|op| matches!(op, SamplerOp::SellQuotes { sources, .. }
            if !sources.contains(&Source::UniswapV2))));
    }

    #[tokio::test]
    async fn buy_liquidity_reads_maker_side_amounts() {
        let (utils, _) = utils(LinearSampler::new(&[(Source::UniswapV2, 2)]));
        let liquidity = utils
            .get_buy_liquidity(&[reference_order()], Decimal::from(50), &GetMarketOrdersOpts::default())
            .await
            .unwrap();

        assert_eq!(liquidity.input_token, "0xusdc");
        assert_eq!(liquidity.output_token, "0xdai");
        assert_eq!(liquidity.quotes.native_orders[0].fillable_maker_amount, Decimal::ONE);
        assert!(!liquidity.is_rfq_supported);
    }

    #[tokio::test]
    async fn batch_buy_routes_each_pair() {
        let (utils, sampler) = utils(LinearSampler::new(&[(Source::UniswapV2, 2)]));
        let mut no_route = reference_order();
        no_route.order.maker_token = "0xnothing".into();
        no_route.order.maker_amount = Decimal::ZERO;
        let batch = vec![vec![reference_order()], vec![no_route]];
        let out = utils
            .get_batch_market_buy_orders(&batch, &[Decimal::from(50), Decimal::ZERO], &GetMarketOrdersOpts::default())
            .await
            .unwrap();

        assert_eq!(out.len(), 2);
        let first = out[0].as_ref().unwrap();
        assert_eq!(first.sources(), HashSet::from([Source::UniswapV2]));
        assert!(out[1].is_none());
        // one round trip for the whole batch
        let block_ops = sampler.seen.lock().unwrap().iter().filter(|op| matches!(op, SamplerOp::BlockNumber)).count();
        assert_eq!(block_ops, 1);
    }

    #[tokio::test]
    async fn batch_buy_rejects_an_empty_pair() {
        let (utils, _) = utils(LinearSampler::new(&[]));
        let err = utils
            .get_batch_market_buy_orders(&[vec![]], &[Decimal::ONE], &GetMarketOrdersOpts::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AggrError::EmptyOrders));
    }
}
