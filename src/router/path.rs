// Path model
// An ordered collection of fills forming one candidate execution strategy.
// Accumulates raw and penalty-adjusted sizes, compares against other paths
// and finalizes once into settlement-ready orders.
//
// Numan Thabit 2025 Nov

use crate::errors::AggrError;
use crate::fees::SettlementOverhead;
use crate::quant::{eth_to_output_amount, get_complete_rate, get_rate, mul_div};
use crate::router::fills::Fill;
use crate::types::{Address, FillData, NativeOrderType, Side, Source, SourceFlags};
use once_cell::sync::OnceCell;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathContext {
    pub side: Side,
    pub input_token: Address,
    pub output_token: Address,
}

impl PathContext {
    /// `(maker_token, taker_token)` for this side.
    pub fn maker_taker_tokens(&self) -> (&Address, &Address) {
        match self.side {
            Side::Sell => (&self.output_token, &self.input_token),
            Side::Buy => (&self.input_token, &self.output_token),
        }
    }
}

#[derive(Clone)]
pub struct PathPenaltyOpts {
    pub output_amount_per_eth: Decimal,
    pub input_amount_per_eth: Decimal,
    pub exchange_proxy_overhead: SettlementOverhead,
    pub gas_price: Decimal,
}

impl fmt::Debug for PathPenaltyOpts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathPenaltyOpts")
            .field("output_amount_per_eth", &self.output_amount_per_eth)
            .field("input_amount_per_eth", &self.input_amount_per_eth)
            .field("gas_price", &self.gas_price)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PathSize {
    pub input: Decimal,
    pub output: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    Bridge,
    Limit,
    Rfq,
    Otc,
}

impl From<NativeOrderType> for OrderKind {
    fn from(t: NativeOrderType) -> Self {
        match t {
            NativeOrderType::Limit => OrderKind::Limit,
            NativeOrderType::Rfq => OrderKind::Rfq,
            NativeOrderType::Otc => OrderKind::Otc,
        }
    }
}

/// Fill as exported on a finalized order, without the internal flag set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportedFill {
    pub source_path_id: String,
    pub input: Decimal,
    pub output: Decimal,
    pub adjusted_output: Decimal,
    pub gas: u64,
}

impl From<&Fill> for ExportedFill {
    fn from(f: &Fill) -> Self {
        Self {
            source_path_id: f.source_path_id.clone(),
            input: f.input,
            output: f.output,
            adjusted_output: f.adjusted_output,
            gas: f.gas,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizedOrder {
    pub kind: OrderKind,
    pub source: Source,
    pub maker_token: Address,
    pub taker_token: Address,
    pub maker_amount: Decimal,
    pub taker_amount: Decimal,
    pub fill_data: FillData,
    pub fill: ExportedFill,
}

/// `(maker_amount, taker_amount)` of a fill for this side.
pub fn get_fill_token_amounts(fill: &Fill, side: Side) -> (Decimal, Decimal) {
    match side {
        Side::Sell => (fill.output, fill.input),
        Side::Buy => (fill.input, fill.output),
    }
}

/// Lower maker amounts (sells) or raise taker amounts (buys) of bridge
/// orders by `max_slippage`, which must be within `[0, 1]`.
pub fn slip_orders(
    side: Side,
    orders: &[OptimizedOrder],
    max_slippage: Decimal,
) -> Result<Vec<OptimizedOrder>, AggrError> {
    if max_slippage < Decimal::ZERO || max_slippage > Decimal::ONE {
        return Err(AggrError::InvalidRequest(format!(
            "slippage must be within [0, 1], got {max_slippage}"
        )));
    }
    Ok(orders
        .iter()
        .cloned()
        .map(|mut order| {
            if order.kind == OrderKind::Bridge {
                // an open intermediate leg (Decimal::MAX) stays open
                match side {
                    Side::Sell => order.maker_amount = (order.maker_amount * (Decimal::ONE - max_slippage)).floor(),
                    Side::Buy => {
                        if let Some(slipped) = order.taker_amount.checked_mul(Decimal::ONE + max_slippage) {
                            order.taker_amount = slipped.ceil();
                        }
                    }
                }
            }
            order
        })
        .collect())
}

#[derive(Debug, Clone)]
pub struct Path {
    pub context: PathContext,
    pub fills: Vec<Fill>,
    pub target_input: Decimal,
    pub penalty_opts: PathPenaltyOpts,
    pub source_flags: SourceFlags,
    size: PathSize,
    adjusted_size: PathSize,
    orders: OnceCell<Vec<OptimizedOrder>>,
}

impl Path {
    /// Fold `fills` into a new path. The last fill is interpolated down if it
    /// would overshoot `target_input`.
    pub fn create(
        context: PathContext,
        fills: Vec<Fill>,
        target_input: Decimal,
        penalty_opts: PathPenaltyOpts,
    ) -> Self {
        let mut path = Self {
            context,
            fills: Vec::with_capacity(fills.len()),
            target_input,
            penalty_opts,
            source_flags: SourceFlags::EMPTY,
            size: PathSize::default(),
            adjusted_size: PathSize::default(),
            orders: OnceCell::new(),
        };
        for fill in fills {
            path.add_fill(fill);
        }
        path
    }

    fn add_fill(&mut self, fill: Fill) {
        self.source_flags |= fill.flags;
        if self.size.input + fill.input > self.target_input {
            let remaining = (self.target_input - self.size.input).max(Decimal::ZERO);
            let scaled_output = mul_div(fill.output, remaining, fill.input);
            self.size.input = self.target_input;
            self.size.output += scaled_output;
            // the fee is per fill, not per unit
            let penalty = fill.adjusted_output - fill.output;
            self.adjusted_size.input = self.target_input;
            self.adjusted_size.output += scaled_output + penalty;
        } else {
            self.size.input += fill.input;
            self.size.output += fill.output;
            self.adjusted_size.input += fill.input;
            self.adjusted_size.output += fill.adjusted_output;
        }
        self.fills.push(fill);
    }

    pub fn side(&self) -> Side {
        self.context.side
    }

    pub fn size(&self) -> PathSize {
        self.size
    }

    /// Adjusted totals with the settlement overhead for the current flag set
    /// applied once.
    pub fn adjusted_size(&self) -> PathSize {
        let PathSize { input, output } = self.adjusted_size;
        let opts = &self.penalty_opts;
        let overhead = (opts.exchange_proxy_overhead)(self.source_flags);
        let penalty = eth_to_output_amount(
            input,
            output,
            overhead,
            opts.input_amount_per_eth,
            opts.output_amount_per_eth,
        );
        let output = match self.side() {
            Side::Sell => output - penalty,
            Side::Buy => output + penalty,
        };
        PathSize { input, output }
    }

    pub fn adjusted_rate(&self) -> Decimal {
        let PathSize { input, output } = self.adjusted_size();
        get_rate(self.side(), input, output)
    }

    pub fn adjusted_complete_rate(&self) -> Decimal {
        let PathSize { input, output } = self.adjusted_size();
        get_complete_rate(self.side(), input, output, self.target_input)
    }

    /// Best single-fill rate. Only a lower bound signal.
    pub fn best_rate(&self) -> Decimal {
        self.fills
            .iter()
            .map(|f| get_rate(self.side(), f.input, f.output))
            .max()
            .unwrap_or(Decimal::ZERO)
    }

    /// Relative shortfall of the adjusted rate against `max_rate`.
    pub fn adjusted_slippage(&self, max_rate: Decimal) -> Decimal {
        if max_rate.is_zero() {
            return Decimal::ZERO;
        }
        (max_rate - self.adjusted_rate()) / max_rate
    }

    pub fn is_complete(&self) -> bool {
        self.size.input >= self.target_input
    }

    /// Gas of every fill plus the settlement overhead, in wei.
    pub fn estimated_gas_cost(&self) -> Decimal {
        let gas: u64 = self.fills.iter().map(|f| f.gas).sum();
        self.penalty_opts.gas_price * Decimal::from(gas)
            + (self.penalty_opts.exchange_proxy_overhead)(self.source_flags)
    }

    /// Completeness dominates price: if either path is short of target the
    /// one with more input wins, otherwise the higher complete rate.
    pub fn is_adjusted_better_than(&self, other: &Path) -> Result<bool, AggrError> {
        if self.target_input != other.target_input {
            return Err(AggrError::TargetInputMismatch(
                self.target_input.to_string(),
                other.target_input.to_string(),
            ));
        }
        let input = self.size.input;
        let other_input = other.size.input;
        if input < self.target_input || other_input < self.target_input {
            return Ok(input > other_input);
        }
        Ok(self.adjusted_complete_rate() > other.adjusted_complete_rate())
    }

    pub fn is_finalized(&self) -> bool {
        self.orders.get().is_some()
    }

    /// Settlement-ready orders. The settlement context is the one bound at
    /// `create`; computed on the first call, later calls return the same list.
    pub fn finalize(&self) -> &[OptimizedOrder] {
        self.orders.get_or_init(|| self.create_orders())
    }

    /// Finalized orders with `max_slippage` applied to every bridge order.
    pub fn slipped_orders(&self, max_slippage: Decimal) -> Result<Vec<OptimizedOrder>, AggrError> {
        slip_orders(self.side(), self.finalize(), max_slippage)
    }

    fn create_orders(&self) -> Vec<OptimizedOrder> {
        let side = self.side();
        let (maker_token, taker_token) = self.context.maker_taker_tokens();
        let mut orders = Vec::with_capacity(self.fills.len() + 1);
        for fill in &self.fills {
            match (&fill.fill_data, fill.source) {
                (FillData::Native(native), _) => {
                    let (maker_amount, taker_amount) = get_fill_token_amounts(fill, side);
                    orders.push(OptimizedOrder {
                        kind: native.order_type().into(),
                        source: Source::Native,
                        maker_token: native.order().maker_token.clone(),
                        taker_token: native.order().taker_token.clone(),
                        maker_amount,
                        taker_amount,
                        fill_data: fill.fill_data.clone(),
                        fill: fill.into(),
                    });
                }
                (FillData::MultiHop(hops), Source::MultiHop) => {
                    let mut first = Fill {
                        source: hops.first_hop.source,
                        fill_data: hops.first_hop.fill_data.clone(),
                        ..fill.clone()
                    };
                    let mut second = Fill {
                        source: hops.second_hop.source,
                        fill_data: hops.second_hop.fill_data.clone(),
                        ..fill.clone()
                    };
                    // the intermediate amount is only known at settlement
                    match side {
                        Side::Sell => {
                            first.output = Decimal::ZERO;
                            first.adjusted_output = Decimal::ZERO;
                            second.input = Decimal::MAX;
                        }
                        Side::Buy => {
                            first.input = Decimal::ZERO;
                            second.output = Decimal::MAX;
                            second.adjusted_output = Decimal::MAX;
                        }
                    }
                    orders.push(bridge_order(&first, &hops.intermediate_token, taker_token, side));
                    orders.push(bridge_order(&second, maker_token, &hops.intermediate_token, side));
                }
                _ => orders.push(bridge_order(fill, maker_token, taker_token, side)),
            }
        }
        orders
    }
}

fn bridge_order(fill: &Fill, maker_token: &Address, taker_token: &Address, side: Side) -> OptimizedOrder {
    let (maker_amount, taker_amount) = get_fill_token_amounts(fill, side);
    OptimizedOrder {
        kind: OrderKind::Bridge,
        source: fill.source,
        maker_token: maker_token.clone(),
        taker_token: taker_token.clone(),
        maker_amount,
        taker_amount,
        fill_data: fill.fill_data.clone(),
        fill: fill.into(),
    }
}
