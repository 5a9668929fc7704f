// Comparison price module
// Derives the whole-order price a private quote has to beat from a Phase-1
// adjusted rate, charging the fixed cost of settling one RFQ order
//
// Numan Thabit 2025 Nov

use crate::fees::{FeeSchedule, SettlementOverhead};
use crate::quant::{eth_to_output_amount, to_unit_amount};
use crate::types::{FillData, Side, Source, SourceFlags};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use tracing::warn;

pub const COMPARISON_PRICE_DECIMALS: u32 = 10;

/// Inputs the calculation needs from the market side of a request.
#[derive(Debug, Clone, Copy)]
pub struct PriceContext {
    pub side: Side,
    pub input_amount_per_eth: Decimal,
    pub output_amount_per_eth: Decimal,
    pub maker_token_decimals: u32,
    pub taker_token_decimals: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ComparisonPrice {
    /// Maker units per taker unit, in whole tokens.
    pub whole_order: Option<Decimal>,
}

/// Price for a single RFQ order to beat `adjusted_rate` at `amount`.
///
/// The order's settlement cost is added to the maker side (sells) or taken off
/// the taker side (buys), so the price is always harder to beat than the raw
/// rate. Returns no price when the native fee cannot be estimated without
/// fill metadata, when there is no native fee entry, or when the implied
/// amounts are not positive.
pub fn get_comparison_prices(
    adjusted_rate: Decimal,
    amount: Decimal,
    ctx: &PriceContext,
    fees: &FeeSchedule,
    overhead: &SettlementOverhead,
) -> ComparisonPrice {
    let Some(native_fee) = fees.get(Source::Native) else {
        return ComparisonPrice::default();
    };
    let Some(estimate) = native_fee(&FillData::None) else {
        warn!("native order fee needs fill data, skipping comparison price");
        return ComparisonPrice::default();
    };
    let fee_in_eth = estimate.fee + overhead(SourceFlags::RFQ_ORDER);

    let implied_output = match ctx.side {
        Side::Sell => adjusted_rate * amount,
        Side::Buy => amount.checked_div(adjusted_rate).unwrap_or(Decimal::ZERO),
    };
    let fee_penalty = eth_to_output_amount(
        amount,
        implied_output,
        fee_in_eth,
        ctx.input_amount_per_eth,
        ctx.output_amount_per_eth,
    );

    // adjusted rate is maker / taker; input is the taker token on sells
    let (maker_amount, taker_amount) = match ctx.side {
        Side::Sell => ((implied_output + fee_penalty).ceil(), amount),
        Side::Buy => (amount, (implied_output - fee_penalty).floor()),
    };
    if maker_amount <= Decimal::ZERO || taker_amount <= Decimal::ZERO {
        return ComparisonPrice::default();
    }

    let maker_units = to_unit_amount(maker_amount, ctx.maker_token_decimals);
    let taker_units = to_unit_amount(taker_amount, ctx.taker_token_decimals);
    let whole_order = maker_units.checked_div(taker_units).map(|p| {
        p.round_dp_with_strategy(COMPARISON_PRICE_DECIMALS, RoundingStrategy::MidpointAwayFromZero)
    });
    ComparisonPrice { whole_order }
}
