// Fill construction
// A fill is one bounded input/output allocation to a single source, carrying
// its gas-adjusted output. Built from dex samples, two-hop samples and
// native orders.
//
// Numan Thabit 2025 Nov

use crate::fees::FeeSchedule;
use crate::quant::{eth_to_output_amount, mul_div, round_amount};
use crate::types::{
    DexSample, FillData, NativeOrderType, NativeOrderWithFillableAmounts, Side, Source, SourceFlags,
};
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fill {
    pub source: Source,
    /// Identifies the curve this fill was cut from.
    pub source_path_id: String,
    pub input: Decimal,
    pub output: Decimal,
    /// `output` minus (sell) or plus (buy) the source's fee in output units.
    pub adjusted_output: Decimal,
    pub gas: u64,
    #[serde(skip)]
    pub flags: SourceFlags,
    pub fill_data: FillData,
}

impl Fill {
    pub fn native_order(&self) -> Option<&NativeOrderWithFillableAmounts> {
        match &self.fill_data {
            FillData::Native(order) => Some(order),
            _ => None,
        }
    }

    pub fn order_type(&self) -> Option<NativeOrderType> {
        self.native_order().map(|o| o.order_type())
    }
}

pub fn adjust_output(side: Side, output: Decimal, penalty: Decimal) -> Decimal {
    match side {
        Side::Sell => output - penalty,
        Side::Buy => output + penalty,
    }
}

/// Order amounts seen from the requested side: `(input, output)`.
///
/// The taker side includes the taker fee.
pub fn native_order_normalized_amounts(side: Side, order: &NativeOrderWithFillableAmounts) -> (Decimal, Decimal) {
    let maker = order.fillable_maker_amount;
    let taker = order.fillable_taker_amount + order.fillable_taker_fee_amount;
    match side {
        Side::Sell => (taker, maker),
        Side::Buy => (maker, taker),
    }
}

pub fn dex_sample_to_fill(
    side: Side,
    sample: &DexSample,
    output_amount_per_eth: Decimal,
    input_amount_per_eth: Decimal,
    fees: &FeeSchedule,
) -> Fill {
    let estimate = fees.estimate(sample.source, &sample.fill_data);
    let penalty = eth_to_output_amount(
        sample.input,
        sample.output,
        estimate.fee,
        input_amount_per_eth,
        output_amount_per_eth,
    );
    Fill {
        source: sample.source,
        source_path_id: sample.source.as_str().to_string(),
        input: sample.input,
        output: sample.output,
        adjusted_output: adjust_output(side, sample.output, penalty),
        gas: estimate.gas,
        flags: sample.source.flag(),
        fill_data: sample.fill_data.clone(),
    }
}

/// Fill for a native order clipped to `target_input`.
///
/// The penalty is a fixed per-order settlement cost, so it is not scaled with
/// the clipped size. With `filter_negative` set, orders whose adjusted rate is
/// not positive yield `None`.
#[allow(clippy::too_many_arguments)]
pub fn native_order_to_fill(
    side: Side,
    order: &NativeOrderWithFillableAmounts,
    target_input: Decimal,
    output_amount_per_eth: Decimal,
    input_amount_per_eth: Decimal,
    fees: &FeeSchedule,
    filter_negative: bool,
) -> Option<Fill> {
    let (input, output) = native_order_normalized_amounts(side, order);
    if input.is_zero() {
        return None;
    }
    let fill_data = FillData::Native(Box::new(order.clone()));
    let estimate = fees.estimate(Source::Native, &fill_data);
    let penalty = eth_to_output_amount(
        input,
        output,
        estimate.fee,
        input_amount_per_eth,
        output_amount_per_eth,
    );
    let clipped_input = target_input.min(input);
    let clipped_output = mul_div(clipped_input, output, input);
    let adjusted_output = adjust_output(side, clipped_output, penalty);
    let adjusted_rate = match side {
        Side::Sell => adjusted_output.checked_div(clipped_input),
        Side::Buy => clipped_input.checked_div(adjusted_output),
    }
    .unwrap_or(Decimal::ZERO);
    if filter_negative && adjusted_rate <= Decimal::ZERO {
        return None;
    }
    let order_type = order.order_type();
    Some(Fill {
        source: Source::Native,
        source_path_id: format!("{}-{:?}", Source::Native, order_type),
        input: clipped_input,
        output: clipped_output,
        adjusted_output,
        gas: estimate.gas,
        flags: order_type.flag(),
        fill_data,
    })
}

/// Composite fill for an A -> B -> C quote. Gas is not known at this stage.
pub fn two_hop_sample_to_fill(
    side: Side,
    sample: &DexSample,
    output_amount_per_eth: Decimal,
    fees: &FeeSchedule,
) -> Option<Fill> {
    let hops = sample.multi_hop()?;
    let flags = Source::MultiHop.flag() | hops.first_hop.source.flag() | hops.second_hop.source.flag();
    let fee = fees.estimate(Source::MultiHop, &sample.fill_data).fee;
    let penalty = round_amount(output_amount_per_eth.saturating_mul(fee));
    Some(Fill {
        source: Source::MultiHop,
        source_path_id: format!(
            "{}-{}-{}",
            Source::MultiHop,
            hops.first_hop.source,
            hops.second_hop.source
        ),
        input: sample.input,
        output: sample.output,
        adjusted_output: adjust_output(side, sample.output, penalty),
        gas: 0,
        flags,
        fill_data: sample.fill_data.clone(),
    })
}
