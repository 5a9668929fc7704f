// Path optimizer
// Turns sparse per-source sample curves, two-hop curves and native orders
// into one best adjusted path. The discrete allocation is delegated to a
// pluggable solver; fills are reconstructed from its output by interpolating
// between the original samples.
//
// Numan Thabit 2025 Nov

use crate::fees::FeeSchedule;
use crate::quant::{eth_to_output_amount, round_amount};
use crate::router::adjustor::FillAdjustor;
use crate::router::fills::{
    dex_sample_to_fill, native_order_normalized_amounts, native_order_to_fill, two_hop_sample_to_fill, Fill,
};
use crate::router::path::{Path, PathContext, PathPenaltyOpts};
use crate::router::solver::{Allocation, RouteRequest, SerializedCurve, Solver};
use crate::types::{DexSample, FillData, NativeOrderType, NativeOrderWithFillableAmounts, Side, Source};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// The solver needs at least this many points to interpolate a curve.
pub const MIN_NUM_SAMPLE_INPUTS: usize = 3;

/// Synthetic samples per native order; independent of the solver's chunking.
pub const NATIVE_ORDER_SAMPLES: usize = 13;

/// Requests at or below this many base units are not routed.
const ONE_BASE_UNIT: Decimal = Decimal::ONE;

enum Candidate {
    Dex(Vec<DexSample>),
    TwoHop(Vec<DexSample>),
    Native(NativeOrderWithFillableAmounts),
}

struct RoutablePath {
    path_id: String,
    candidate: Candidate,
    curve: SerializedCurve,
}

#[derive(Clone)]
pub struct PathOptimizer {
    pub context: PathContext,
    pub fees: FeeSchedule,
    pub penalty_opts: PathPenaltyOpts,
    pub input_amount: Decimal,
    pub router_num_samples: usize,
    pub vip_sources: Arc<HashSet<Source>>,
    pub fill_adjustor: Arc<dyn FillAdjustor>,
    pub solver: Arc<dyn Solver>,
}

impl PathOptimizer {
    fn side(&self) -> Side {
        self.context.side
    }

    /// Best adjusted path for `input_amount`, or `None` when no candidate can
    /// carry any of it.
    pub fn find_optimal_path_from_samples(
        &self,
        dex_quotes: &[Vec<DexSample>],
        two_hop_quotes: &[Vec<DexSample>],
        native_orders: &[NativeOrderWithFillableAmounts],
    ) -> Option<Path> {
        let (all_sources, vip_sources) = self.find_routes(dex_quotes, two_hop_quotes, native_orders)?;
        match (all_sources, vip_sources) {
            (None, vip) => vip,
            (Some(all), Some(vip)) if vip.is_adjusted_better_than(&all).unwrap_or(false) => Some(vip),
            (all, _) => all,
        }
    }

    fn find_routes(
        &self,
        dex_quotes: &[Vec<DexSample>],
        two_hop_quotes: &[Vec<DexSample>],
        native_orders: &[NativeOrderWithFillableAmounts],
    ) -> Option<(Option<Path>, Option<Path>)> {
        if self.input_amount <= ONE_BASE_UNIT {
            return None;
        }

        let mut routable = self.single_source_paths(dex_quotes);
        routable.extend(self.two_hop_paths(two_hop_quotes));
        routable.extend(self.native_order_paths(native_orders));
        if routable.is_empty() {
            return None;
        }

        let curves: Vec<SerializedCurve> = routable.iter().map(|r| r.curve.clone()).collect();
        let target_input = self.input_amount.to_f64()?;
        let solve = |vip_only: bool| -> Option<Path> {
            let req = RouteRequest {
                side: self.side(),
                curves: &curves,
                target_input,
                num_samples: self.router_num_samples,
                vip_only,
            };
            match self.solver.solve(&req) {
                Ok(allocations) => self.create_path_from_route(&routable, &allocations),
                Err(err) => {
                    warn!(error = %err, solver = self.solver.name(), vip_only, "solver failed");
                    None
                }
            }
        };
        let all_sources = solve(false);
        let vip_sources = solve(true);
        Some((all_sources, vip_sources))
    }

    fn single_source_paths(&self, dex_quotes: &[Vec<DexSample>]) -> Vec<RoutablePath> {
        let mut paths = Vec::new();
        for samples in dex_quotes {
            let valid_len = samples
                .iter()
                .rposition(|s| s.output > Decimal::ZERO)
                .map(|i| i + 1)
                .unwrap_or(0);
            if valid_len < MIN_NUM_SAMPLE_INPUTS {
                continue;
            }
            let samples = samples[..valid_len].to_vec();
            let source = samples[0].source;
            let mut curve = SerializedCurve {
                ids: Vec::with_capacity(valid_len),
                inputs: Vec::with_capacity(valid_len),
                outputs: Vec::with_capacity(valid_len),
                output_fees: Vec::with_capacity(valid_len),
                is_vip: self.vip_sources.contains(&source),
            };
            for (idx, sample) in samples.iter().enumerate() {
                let fill = self.create_fill_from_dex_sample(sample);
                curve.ids.push(format!("{}-{}-{}", fill.source, paths.len(), idx));
                curve.inputs.push(to_f64(fill.input));
                curve.outputs.push(to_f64(fill.output));
                curve.output_fees.push(to_f64((fill.output - fill.adjusted_output).abs()));
            }
            paths.push(RoutablePath {
                path_id: format!("{}-{}", source, paths.len()),
                candidate: Candidate::Dex(samples),
                curve,
            });
        }
        paths
    }

    fn two_hop_paths(&self, two_hop_quotes: &[Vec<DexSample>]) -> Vec<RoutablePath> {
        let mut paths = Vec::new();
        for (i, samples) in two_hop_quotes.iter().enumerate() {
            // both hops must be present; a reverted hop leaves an empty quote
            let samples: Vec<DexSample> = samples
                .iter()
                .filter(|s| s.multi_hop().is_some() && s.output > Decimal::ZERO)
                .cloned()
                .collect();
            let fills: Vec<Fill> = samples
                .iter()
                .filter_map(|s| self.create_fill_from_two_hop_sample(s))
                .collect();
            if fills.is_empty() {
                continue;
            }
            let curve = SerializedCurve {
                ids: fills.iter().map(|f| f.source_path_id.clone()).collect(),
                inputs: fills.iter().map(|f| to_f64(f.input)).collect(),
                outputs: fills.iter().map(|f| to_f64(f.output)).collect(),
                output_fees: fills
                    .iter()
                    .map(|f| to_f64((f.output - f.adjusted_output).abs()))
                    .collect(),
                is_vip: false,
            };
            paths.push(RoutablePath {
                path_id: format!("two-hop-{i}"),
                candidate: Candidate::TwoHop(samples),
                curve,
            });
        }
        paths
    }

    fn native_order_paths(&self, native_orders: &[NativeOrderWithFillableAmounts]) -> Vec<RoutablePath> {
        let mut paths = Vec::new();
        for (idx, order) in native_orders.iter().enumerate() {
            let (input, output) = native_order_normalized_amounts(self.side(), order);
            if input <= Decimal::ZERO || output <= Decimal::ZERO {
                continue;
            }
            // orders that lose money after fees never reach the solver
            let economic = native_order_to_fill(
                self.side(),
                order,
                self.input_amount,
                self.penalty_opts.output_amount_per_eth,
                self.penalty_opts.input_amount_per_eth,
                &self.fees,
                true,
            );
            if economic.is_none() {
                debug!(order = idx, "dropping native order with non-positive adjusted rate");
                continue;
            }
            let fee = to_f64(self.native_output_fee(order, input, output));
            // price is constant, so a large order is scaled down to the request
            let scale = (self.input_amount / input).min(Decimal::ONE);
            let order_type = order.order_type();
            let mut curve = SerializedCurve {
                ids: Vec::with_capacity(NATIVE_ORDER_SAMPLES),
                inputs: Vec::with_capacity(NATIVE_ORDER_SAMPLES),
                outputs: Vec::with_capacity(NATIVE_ORDER_SAMPLES),
                output_fees: Vec::with_capacity(NATIVE_ORDER_SAMPLES),
                is_vip: order_type != NativeOrderType::Limit,
            };
            for i in 1..=NATIVE_ORDER_SAMPLES {
                let fraction = Decimal::from(i) / Decimal::from(NATIVE_ORDER_SAMPLES);
                let cur_input = (input * scale * fraction).min(input);
                let cur_output = (output * scale * fraction).min(output);
                curve
                    .ids
                    .push(format!("{}-{:?}-{}-{}-{}", Source::Native, order_type, paths.len(), idx, i));
                curve.inputs.push(to_f64(cur_input));
                curve.outputs.push(to_f64(cur_output));
                curve.output_fees.push(fee);
            }
            paths.push(RoutablePath {
                path_id: format!("{}-{}", Source::Native, idx),
                candidate: Candidate::Native(order.clone()),
                curve,
            });
        }
        paths
    }

    fn native_output_fee(&self, order: &NativeOrderWithFillableAmounts, input: Decimal, output: Decimal) -> Decimal {
        let fill_data = FillData::Native(Box::new(order.clone()));
        let fee = self.fees.estimate(Source::Native, &fill_data).fee;
        eth_to_output_amount(
            input,
            output,
            fee,
            self.penalty_opts.input_amount_per_eth,
            self.penalty_opts.output_amount_per_eth,
        )
    }

    fn adjust_one(&self, fill: Fill) -> Fill {
        let fallback = fill.clone();
        self.fill_adjustor
            .adjust_fills(self.side(), vec![fill])
            .into_iter()
            .next()
            .unwrap_or(fallback)
    }

    fn create_fill_from_dex_sample(&self, sample: &DexSample) -> Fill {
        let fill = dex_sample_to_fill(
            self.side(),
            sample,
            self.penalty_opts.output_amount_per_eth,
            self.penalty_opts.input_amount_per_eth,
            &self.fees,
        );
        self.adjust_one(fill)
    }

    /// Two-hop fill adjusted by the worse of its two hops' policies.
    fn create_fill_from_two_hop_sample(&self, sample: &DexSample) -> Option<Fill> {
        let hops = sample.multi_hop()?;
        let fill = two_hop_sample_to_fill(self.side(), sample, self.penalty_opts.output_amount_per_eth, &self.fees)?;
        let first = self.adjust_one(Fill { source: hops.first_hop.source, ..fill.clone() });
        let second = self.adjust_one(Fill { source: hops.second_hop.source, ..fill });
        let worst = match self.side() {
            Side::Sell if first.adjusted_output < second.adjusted_output => first,
            Side::Sell => second,
            Side::Buy if first.adjusted_output < second.adjusted_output => second,
            Side::Buy => first,
        };
        Some(Fill { source: Source::MultiHop, ..worst })
    }

    fn create_path_from_route(&self, routable: &[RoutablePath], allocations: &[Allocation]) -> Option<Path> {
        if allocations.len() != routable.len() {
            warn!(
                expected = routable.len(),
                got = allocations.len(),
                "solver returned a mismatched allocation"
            );
            return None;
        }
        if let Some(bad) = allocations.iter().find(|a| !a.output.is_finite() || !a.input.is_finite()) {
            warn!(output = bad.output, input = bad.input, "solver returned a non-finite amount");
            return None;
        }

        let routed: Vec<Decimal> = allocations
            .iter()
            .map(|a| Decimal::from_f64(a.input.max(0.0)).unwrap_or(Decimal::ZERO))
            .collect();
        let total_routed: Decimal = routed.iter().copied().sum();
        if total_routed.is_zero() {
            return None;
        }
        // float drift in the solver; allocations must add up to the target
        let precision_scalar = self.input_amount / total_routed;

        let mut fills = Vec::new();
        for ((allocation, routed_input), path) in allocations.iter().zip(&routed).zip(routable) {
            if routed_input.is_zero() || allocation.output == 0.0 {
                continue;
            }
            let corrected = (precision_scalar * routed_input).ceil().min(self.input_amount);
            let fill = match &path.candidate {
                Candidate::Native(order) => native_order_to_fill(
                    self.side(),
                    order,
                    corrected,
                    self.penalty_opts.output_amount_per_eth,
                    self.penalty_opts.input_amount_per_eth,
                    &self.fees,
                    false,
                ),
                Candidate::Dex(samples) => {
                    let sample = interpolate_sample(samples, corrected);
                    let fill = self.create_fill_from_dex_sample(&sample);
                    Some(cap_to_samples(fill, samples))
                }
                Candidate::TwoHop(samples) => {
                    let sample = interpolate_sample(samples, corrected);
                    self.create_fill_from_two_hop_sample(&sample)
                        .map(|fill| cap_to_samples(fill, samples))
                }
            };
            if let Some(fill) = fill {
                fills.push(Fill {
                    source_path_id: path.path_id.clone(),
                    ..fill
                });
            }
        }

        if fills.is_empty() {
            return None;
        }
        debug!(fills = fills.len(), target = %self.input_amount, "reconstructed path from allocation");
        Some(Path::create(
            self.context.clone(),
            fills,
            self.input_amount,
            self.penalty_opts.clone(),
        ))
    }
}

fn to_f64(v: Decimal) -> f64 {
    round_amount(v).to_f64().unwrap_or(0.0)
}

/// Sample at `input`, interpolated linearly between the bracketing samples
/// (or the origin and the first sample). Fill metadata comes from the upper
/// bracket; past the last sample the last sample's output is kept.
fn interpolate_sample(samples: &[DexSample], input: Decimal) -> DexSample {
    let Some(last) = samples.last() else {
        return DexSample {
            source: Source::Native,
            input,
            output: Decimal::ZERO,
            fill_data: FillData::None,
        };
    };
    let Some(k) = samples.iter().position(|s| s.input >= input) else {
        return DexSample { input, ..last.clone() };
    };
    let right = &samples[k];
    let (x0, y0) = if k == 0 {
        (Decimal::ZERO, Decimal::ZERO)
    } else {
        (samples[k - 1].input, samples[k - 1].output)
    };
    let output = if right.input > x0 {
        y0 + (right.output - y0) * ((input - x0) / (right.input - x0))
    } else {
        right.output
    };
    DexSample {
        input,
        output: round_amount(output),
        ..right.clone()
    }
}

/// Never report more than the largest sampled output nor less than one base
/// unit. The fee stays what the fill was charged.
fn cap_to_samples(fill: Fill, samples: &[DexSample]) -> Fill {
    let max_sampled = samples
        .iter()
        .map(|s| round_amount(s.output))
        .max()
        .unwrap_or(Decimal::ZERO);
    let penalty = fill.output - fill.adjusted_output;
    let output = round_amount(fill.output).min(max_sampled).max(Decimal::ONE);
    Fill {
        output,
        adjusted_output: output - penalty,
        ..fill
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fees::{zero_overhead, FeeEstimate};
    use crate::router::adjustor::IdentityFillAdjustor;
    use crate::router::solver::ChunkedDpSolver;
    use crate::types::{HopSource, MultiHopFillData, NativeOrder, SignedNativeOrder};

    fn e18(v: i64) -> Decimal {
        Decimal::from(v) * Decimal::from(1_000_000_000_000_000_000i64)
    }

    fn optimizer(input: Decimal, fees: FeeSchedule) -> PathOptimizer {
        PathOptimizer {
            context: PathContext { side: Side::Sell, input_token: "0xin".into(), output_token: "0xout".into() },
            fees,
            penalty_opts: PathPenaltyOpts {
                output_amount_per_eth: Decimal::ONE,
                input_amount_per_eth: Decimal::ONE,
                exchange_proxy_overhead: zero_overhead(),
                gas_price: Decimal::ONE,
            },
            input_amount: input,
            router_num_samples: 14,
            vip_sources: Arc::new(HashSet::from([Source::UniswapV2])),
            fill_adjustor: Arc::new(IdentityFillAdjustor),
            solver: Arc::new(ChunkedDpSolver),
        }
    }

    fn linear(source: Source, rate: i64, points: i64) -> Vec<DexSample> {
        (1..=points)
            .map(|i| DexSample { source, input: e18(i), output: e18(i * rate), fill_data: FillData::None })
            .collect()
    }

    fn order(maker: Decimal, taker: Decimal, order_type: NativeOrderType) -> NativeOrderWithFillableAmounts {
        SignedNativeOrder {
            order: NativeOrder {
                maker: "0xmaker".into(),
                maker_token: "0xout".into(),
                taker_token: "0xin".into(),
                maker_amount: maker,
                taker_amount: taker,
                taker_token_fee_amount: Decimal::ZERO,
                expiry: 0,
            },
            signature: Some("0xsig".into()),
            order_type,
        }
        .with_fillable_taker_amount(taker)
    }

    #[test]
    fn selects_the_better_single_source() {
        let opt = optimizer(e18(4), FeeSchedule::default());
        let quotes = vec![linear(Source::UniswapV2, 2, 4), linear(Source::SushiSwap, 1, 4)];
        let path = opt.find_optimal_path_from_samples(&quotes, &[], &[]).unwrap();
        assert!(path.fills.iter().all(|f| f.source == Source::UniswapV2));
        assert_eq!(path.size().input, e18(4));
        assert_eq!(path.size().output, e18(8));
    }

    #[test]
    fn short_or_zero_tailed_curves_are_dropped() {
        let opt = optimizer(e18(4), FeeSchedule::default());
        let mut tail = linear(Source::Curve, 5, 4);
        tail[2].output = Decimal::ZERO;
        tail[3].output = Decimal::ZERO;
        assert!(opt.find_optimal_path_from_samples(&[tail], &[], &[]).is_none());
    }

    #[test]
    fn degenerate_or_empty_requests_have_no_path() {
        let opt = optimizer(Decimal::ONE, FeeSchedule::default());
        assert!(opt
            .find_optimal_path_from_samples(&[linear(Source::UniswapV2, 2, 4)], &[], &[])
            .is_none());
        let opt = optimizer(e18(1), FeeSchedule::default());
        assert!(opt.find_optimal_path_from_samples(&[], &[], &[]).is_none());
    }

    #[test]
    fn two_hop_beats_worse_direct_route() {
        let opt = optimizer(e18(4), FeeSchedule::default());
        let hop = DexSample {
            source: Source::MultiHop,
            input: e18(4),
            output: e18(9),
            fill_data: FillData::MultiHop(Box::new(MultiHopFillData {
                intermediate_token: "0xmid".into(),
                first_hop: HopSource { source: Source::UniswapV2, fill_data: FillData::None },
                second_hop: HopSource { source: Source::Curve, fill_data: FillData::None },
            })),
        };
        let path = opt
            .find_optimal_path_from_samples(&[linear(Source::UniswapV2, 2, 4)], &[vec![hop]], &[])
            .unwrap();
        assert_eq!(path.fills.len(), 1);
        assert_eq!(path.fills[0].source, Source::MultiHop);
        assert_eq!(path.size().output, e18(9));
        assert_eq!(path.finalize().len(), 2);
    }

    #[test]
    fn native_order_fills_are_reconstructed_at_corrected_input() {
        let opt = optimizer(e18(4), FeeSchedule::default());
        let rfq = order(e18(12), e18(4), NativeOrderType::Rfq);
        let path = opt
            .find_optimal_path_from_samples(&[linear(Source::UniswapV2, 2, 4)], &[], &[rfq])
            .unwrap();
        assert_eq!(path.fills.len(), 1);
        assert_eq!(path.fills[0].source, Source::Native);
        assert_eq!(path.size().output, e18(12));
    }

    #[test]
    fn uneconomic_native_order_contributes_nothing() {
        let mut fees = FeeSchedule::default();
        // fee larger than the order's whole output
        fees.insert(Source::Native, Arc::new(|_| Some(FeeEstimate { gas: 1, fee: e18(100) })));
        let opt = optimizer(e18(4), fees);
        let dust = order(e18(1), e18(4), NativeOrderType::Limit);
        let path = opt
            .find_optimal_path_from_samples(&[linear(Source::UniswapV2, 2, 4)], &[], &[dust])
            .unwrap();
        assert!(path.fills.iter().all(|f| f.source != Source::Native));
    }

    #[test]
    fn uneconomic_native_order_alone_has_no_path() {
        let mut fees = FeeSchedule::default();
        fees.insert(Source::Native, Arc::new(|_| Some(FeeEstimate { gas: 1, fee: e18(100) })));
        let opt = optimizer(e18(4), fees);
        let dust = order(e18(1), e18(4), NativeOrderType::Limit);
        assert!(opt.find_optimal_path_from_samples(&[], &[], &[dust]).is_none());
    }

    #[test]
    fn native_orders_get_a_fixed_sample_count() {
        let mut opt = optimizer(e18(4), FeeSchedule::default());
        opt.router_num_samples = 3;
        let paths = opt.native_order_paths(&[order(e18(12), e18(4), NativeOrderType::Rfq)]);
        assert_eq!(paths.len(), 1);
        let curve = &paths[0].curve;
        assert_eq!(curve.inputs.len(), NATIVE_ORDER_SAMPLES);
        assert_eq!(curve.ids.len(), NATIVE_ORDER_SAMPLES);
        assert_eq!(curve.inputs[NATIVE_ORDER_SAMPLES - 1], 4e18);
    }

    #[test]
    fn interpolation_brackets_and_caps() {
        let samples = linear(Source::Curve, 3, 2);
        let mid = interpolate_sample(&samples, e18(3) / Decimal::from(2));
        assert_eq!(mid.output, e18(9) / Decimal::from(2));
        let below = interpolate_sample(&samples, e18(1) / Decimal::from(2));
        assert_eq!(below.output, e18(3) / Decimal::from(2));

        let fill = Fill {
            source: Source::Curve,
            source_path_id: String::new(),
            input: e18(3),
            output: e18(9),
            adjusted_output: e18(9) - Decimal::from(5),
            gas: 0,
            flags: Source::Curve.flag(),
            fill_data: FillData::None,
        };
        let capped = cap_to_samples(fill, &samples);
        assert_eq!(capped.output, e18(6));
        assert_eq!(capped.adjusted_output, e18(6) - Decimal::from(5));
    }
}
