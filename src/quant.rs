// Rate and gas conversion module
// This file holds the exchange-rate arithmetic shared by fills, paths and
// comparison prices: native-gas to output-token conversion, marginal and
// completeness-penalized rates, and the two-hop composite rate
//
// Numan Thabit 2025 Nov

use crate::fees::{FeeSchedule, SettlementOverhead};
use crate::router::adjustor::FillAdjustor;
use crate::router::fills::Fill;
use crate::types::{DexSample, Side, Source, SourceFlags};
use rust_decimal::{Decimal, RoundingStrategy};

/// `a * b / c` without overflowing on large base-unit amounts.
pub fn mul_div(a: Decimal, b: Decimal, c: Decimal) -> Decimal {
    if c.is_zero() {
        return Decimal::ZERO;
    }
    if let Some(v) = a.checked_mul(b).and_then(|p| p.checked_div(c)) {
        return v;
    }
    a.checked_div(c)
        .and_then(|q| q.checked_mul(b))
        .unwrap_or(Decimal::MAX)
}

/// Integer rounding used for amounts: half away from zero.
pub fn round_amount(v: Decimal) -> Decimal {
    v.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
}

pub fn ten_pow(decimals: u32) -> Decimal {
    (0..decimals).fold(Decimal::ONE, |acc, _| acc.saturating_mul(Decimal::TEN))
}

/// Base units to whole token units.
pub fn to_unit_amount(amount: Decimal, decimals: u32) -> Decimal {
    amount.checked_div(ten_pow(decimals)).unwrap_or(Decimal::ZERO)
}

/// Convert a cost in native gas currency (wei) into output-token units.
///
/// Prefers the direct output-per-ETH rate. When nothing could price the output
/// token, scales the input-per-ETH rate by the sample's own output/input ratio.
/// Both rates zero yields zero, which callers read as "do not penalize".
pub fn eth_to_output_amount(
    input: Decimal,
    output: Decimal,
    eth_amount: Decimal,
    input_amount_per_eth: Decimal,
    output_amount_per_eth: Decimal,
) -> Decimal {
    if !output_amount_per_eth.is_zero() {
        return round_amount(output_amount_per_eth.saturating_mul(eth_amount));
    }
    if input.is_zero() {
        return Decimal::ZERO;
    }
    mul_div(input_amount_per_eth.saturating_mul(eth_amount), output, input)
}

/// Marginal rate: output per input for sells, input per output for buys.
pub fn get_rate(side: Side, input: Decimal, output: Decimal) -> Decimal {
    if input.is_zero() || output.is_zero() {
        return Decimal::ZERO;
    }
    match side {
        Side::Sell => output / input,
        Side::Buy => input / output,
    }
}

/// Rate penalized by how far `input` falls short of `target_input`.
pub fn get_complete_rate(side: Side, input: Decimal, output: Decimal, target_input: Decimal) -> Decimal {
    if input.is_zero() || output.is_zero() || target_input.is_zero() {
        return Decimal::ZERO;
    }
    match side {
        // penalty = input / target
        Side::Sell => output / target_input,
        // buys square the penalty
        Side::Buy => (input / output) * (input / target_input),
    }
}

/// Adjusted rate of a full-size two-hop quote.
///
/// Charges the settlement overhead implied by both hops plus the multi-hop fee,
/// then keeps the worse of the two hops' fill adjustments.
#[allow(clippy::too_many_arguments)]
pub fn get_two_hop_adjusted_rate(
    side: Side,
    quote: &DexSample,
    target_input: Decimal,
    output_amount_per_eth: Decimal,
    fees: &FeeSchedule,
    overhead: &SettlementOverhead,
    adjustor: &dyn FillAdjustor,
) -> Decimal {
    let Some(hops) = quote.multi_hop() else {
        return Decimal::ZERO;
    };
    if quote.input < target_input || quote.output.is_zero() {
        return Decimal::ZERO;
    }
    let flags: SourceFlags =
        Source::MultiHop.flag() | hops.first_hop.source.flag() | hops.second_hop.source.flag();
    let estimate = fees.estimate(Source::MultiHop, &quote.fill_data);
    let penalty = output_amount_per_eth.saturating_mul(overhead(flags) + estimate.fee);
    let adjusted_output = match side {
        Side::Sell => quote.output - penalty,
        Side::Buy => quote.output + penalty,
    };
    let fill = Fill {
        source: Source::MultiHop,
        source_path_id: String::new(),
        input: quote.input,
        output: quote.output,
        adjusted_output,
        gas: estimate.gas,
        flags,
        fill_data: quote.fill_data.clone(),
    };
    let first = adjust_single(adjustor, side, Fill { source: hops.first_hop.source, ..fill.clone() });
    let second = adjust_single(adjustor, side, Fill { source: hops.second_hop.source, ..fill });
    let worst = match side {
        Side::Sell => first.min(second),
        Side::Buy => first.max(second),
    };
    get_rate(side, quote.input, worst)
}

fn adjust_single(adjustor: &dyn FillAdjustor, side: Side, fill: Fill) -> Decimal {
    let fallback = fill.adjusted_output;
    adjustor
        .adjust_fills(side, vec![fill])
        .first()
        .map(|f| f.adjusted_output)
        .unwrap_or(fallback)
}
