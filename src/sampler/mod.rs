// Liquidity sampler module
// Batched read operations against on-chain liquidity: token decimals, native
// order fillable amounts, native-token conversion rates and per-source price
// curves. One batch is one round trip; every op in it succeeds or fails on
// its own.
//
// Numan Thabit 2025 Nov

pub mod registry;
pub mod remote;

use crate::errors::AggrError;
use crate::metrics::SAMPLER_OP_FAILURES;
use crate::types::{Address, DexSample, SignedNativeOrder, Source};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Decimals assumed for a token whose lookup failed.
pub const DEFAULT_TOKEN_DECIMALS: u32 = 18;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SamplerOp {
    TokenDecimals {
        tokens: Vec<Address>,
    },
    LimitOrderFillableTakerAmounts {
        orders: Vec<SignedNativeOrder>,
    },
    LimitOrderFillableMakerAmounts {
        orders: Vec<SignedNativeOrder>,
    },
    /// Output of the best fee source when selling `native_amount` of the
    /// native token for `token`, per unit sold.
    BestNativeTokenSellRate {
        sources: Vec<Source>,
        token: Address,
        native_token: Address,
        native_amount: Decimal,
    },
    SellQuotes {
        sources: Vec<Source>,
        maker_token: Address,
        taker_token: Address,
        amounts: Vec<Decimal>,
    },
    BuyQuotes {
        sources: Vec<Source>,
        maker_token: Address,
        taker_token: Address,
        amounts: Vec<Decimal>,
    },
    TwoHopSellQuotes {
        sources: Vec<Source>,
        maker_token: Address,
        taker_token: Address,
        amounts: Vec<Decimal>,
    },
    TwoHopBuyQuotes {
        sources: Vec<Source>,
        maker_token: Address,
        taker_token: Address,
        amounts: Vec<Decimal>,
    },
    IsAddressContract {
        address: Address,
    },
    BlockNumber,
}

impl SamplerOp {
    pub fn name(&self) -> &'static str {
        match self {
            SamplerOp::TokenDecimals { .. } => "token_decimals",
            SamplerOp::LimitOrderFillableTakerAmounts { .. } => "limit_order_fillable_taker_amounts",
            SamplerOp::LimitOrderFillableMakerAmounts { .. } => "limit_order_fillable_maker_amounts",
            SamplerOp::BestNativeTokenSellRate { .. } => "best_native_token_sell_rate",
            SamplerOp::SellQuotes { .. } => "sell_quotes",
            SamplerOp::BuyQuotes { .. } => "buy_quotes",
            SamplerOp::TwoHopSellQuotes { .. } => "two_hop_sell_quotes",
            SamplerOp::TwoHopBuyQuotes { .. } => "two_hop_buy_quotes",
            SamplerOp::IsAddressContract { .. } => "is_address_contract",
            SamplerOp::BlockNumber => "block_number",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SamplerOutput {
    Decimals(Vec<u32>),
    Fillable(Vec<Decimal>),
    Rate(Decimal),
    /// One curve per source (or per intermediate token for two-hop ops).
    Quotes(Vec<Vec<DexSample>>),
    IsContract(bool),
    BlockNumber(u64),
}

/// Executes a batch of ops in one logical round trip. The result vector is
/// positionally aligned with `ops`.
#[async_trait]
pub trait Sampler: Send + Sync {
    async fn execute_batch(&self, ops: Vec<SamplerOp>) -> Vec<Result<SamplerOutput, AggrError>>;
}

/// Geometrically distributed sample amounts up to `max_fill_amount`.
///
/// Step `i` weighs `base^i`; amounts are the rounded-up cumulative steps and
/// the last one is exactly `max_fill_amount`. A base of 1 is linear.
pub fn get_sample_amounts(max_fill_amount: Decimal, num_samples: usize, base: Decimal) -> Vec<Decimal> {
    if num_samples == 0 {
        return Vec::new();
    }
    let mut distribution = Vec::with_capacity(num_samples);
    let mut weight = Decimal::ONE;
    for _ in 0..num_samples {
        distribution.push(weight);
        weight = weight.saturating_mul(base);
    }
    let total: Decimal = distribution.iter().sum();

    let mut amounts = Vec::with_capacity(num_samples);
    let mut cumulative = Decimal::ZERO;
    for (i, step) in distribution.iter().enumerate() {
        if i == num_samples - 1 {
            amounts.push(max_fill_amount);
            break;
        }
        cumulative += step / total;
        amounts.push((max_fill_amount * cumulative).ceil());
    }
    amounts
}

/// Positional reader over a batch result. Each accessor consumes one entry
/// and degrades to a safe default when the op failed or returned the wrong
/// shape.
pub struct BatchResults {
    results: std::vec::IntoIter<Result<SamplerOutput, AggrError>>,
}

impl BatchResults {
    pub fn new(results: Vec<Result<SamplerOutput, AggrError>>) -> Self {
        Self { results: results.into_iter() }
    }

    fn next_output(&mut self, op: &'static str) -> Option<SamplerOutput> {
        match self.results.next() {
            Some(Ok(output)) => Some(output),
            Some(Err(err)) => {
                degraded(op, &err.to_string());
                None
            }
            None => {
                degraded(op, "missing from batch result");
                None
            }
        }
    }

    /// One entry per token; failures assume 18 decimals.
    pub fn decimals(&mut self, expected: usize) -> Vec<u32> {
        const OP: &str = "token_decimals";
        match self.next_output(OP) {
            Some(SamplerOutput::Decimals(d)) if d.len() == expected => d,
            Some(_) => {
                degraded(OP, "unexpected output shape");
                vec![DEFAULT_TOKEN_DECIMALS; expected]
            }
            None => vec![DEFAULT_TOKEN_DECIMALS; expected],
        }
    }

    /// One entry per order; failures make every order unfillable.
    pub fn fillable(&mut self, expected: usize) -> Vec<Decimal> {
        const OP: &str = "limit_order_fillable_amounts";
        match self.next_output(OP) {
            Some(SamplerOutput::Fillable(f)) if f.len() == expected => f,
            Some(_) => {
                degraded(OP, "unexpected output shape");
                vec![Decimal::ZERO; expected]
            }
            None => vec![Decimal::ZERO; expected],
        }
    }

    /// Zero when the rate is unknown.
    pub fn rate(&mut self) -> Decimal {
        const OP: &str = "best_native_token_sell_rate";
        match self.next_output(OP) {
            Some(SamplerOutput::Rate(r)) => r,
            Some(_) => {
                degraded(OP, "unexpected output shape");
                Decimal::ZERO
            }
            None => Decimal::ZERO,
        }
    }

    /// Empty when the curves are unknown.
    pub fn quotes(&mut self) -> Vec<Vec<DexSample>> {
        const OP: &str = "quotes";
        match self.next_output(OP) {
            Some(SamplerOutput::Quotes(q)) => q,
            Some(_) => {
                degraded(OP, "unexpected output shape");
                Vec::new()
            }
            None => Vec::new(),
        }
    }

    /// A failed lookup counts as a contract, which disables RFQ.
    pub fn is_contract(&mut self) -> bool {
        const OP: &str = "is_address_contract";
        match self.next_output(OP) {
            Some(SamplerOutput::IsContract(c)) => c,
            Some(_) => {
                degraded(OP, "unexpected output shape");
                true
            }
            None => true,
        }
    }

    pub fn block_number(&mut self) -> u64 {
        const OP: &str = "block_number";
        match self.next_output(OP) {
            Some(SamplerOutput::BlockNumber(b)) => b,
            Some(_) => {
                degraded(OP, "unexpected output shape");
                0
            }
            None => 0,
        }
    }
}

fn degraded(op: &'static str, reason: &str) {
    SAMPLER_OP_FAILURES.with_label_values(&[op]).inc();
    warn!(op, reason, "sampler op failed, using default");
}
