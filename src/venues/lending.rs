// Lending venue adapter module
// Wrap and unwrap of lending-market receipt tokens (Compound cTokens, Aave
// aTokens) at the market's current exchange rate
//
// Numan Thabit 2025 Nov

use crate::cache::PoolCache;
use crate::errors::AggrError;
use crate::types::{Address, BridgeFillData, DexSample, FillData, Source};
use crate::venues::adapter::{same_token, SourceAdapter};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LendingMarket {
    pub underlying: Address,
    pub wrapped: Address,
    /// Underlying base units per wrapped base unit. Aave markets are 1.
    #[serde(default = "default_exchange_rate")]
    pub exchange_rate: Decimal,
}

fn default_exchange_rate() -> Decimal {
    Decimal::ONE
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    /// Underlying in, wrapped out.
    Wrap,
    Unwrap,
}

impl LendingMarket {
    fn direction(&self, taker_token: &str, maker_token: &str) -> Option<Direction> {
        if same_token(&self.underlying, taker_token) && same_token(&self.wrapped, maker_token) {
            Some(Direction::Wrap)
        } else if same_token(&self.wrapped, taker_token) && same_token(&self.underlying, maker_token) {
            Some(Direction::Unwrap)
        } else {
            None
        }
    }

    /// Maker units out for `amount` taker units in, rounded down.
    fn sell(&self, direction: Direction, amount: Decimal) -> Decimal {
        match direction {
            Direction::Wrap => amount.checked_div(self.exchange_rate).unwrap_or(Decimal::ZERO).floor(),
            Direction::Unwrap => amount.checked_mul(self.exchange_rate).unwrap_or(Decimal::ZERO).floor(),
        }
    }

    /// Taker units in for `amount` maker units out, rounded up.
    fn buy(&self, direction: Direction, amount: Decimal) -> Decimal {
        match direction {
            Direction::Wrap => amount.checked_mul(self.exchange_rate).unwrap_or(Decimal::ZERO).ceil(),
            Direction::Unwrap => amount.checked_div(self.exchange_rate).unwrap_or(Decimal::ZERO).ceil(),
        }
    }
}

pub struct LendingAdapter {
    source: Source,
    markets: PoolCache<Vec<LendingMarket>>,
}

impl LendingAdapter {
    pub fn new(source: Source, markets: PoolCache<Vec<LendingMarket>>) -> Self {
        Self { source, markets }
    }

    async fn sample(
        &self,
        taker_token: &str,
        maker_token: &str,
        amounts: &[Decimal],
        is_sell: bool,
    ) -> Vec<DexSample> {
        let markets = self.markets.get().await;
        let market = markets
            .iter()
            .flat_map(|m| m.iter())
            .find_map(|m| m.direction(taker_token, maker_token).map(|d| (m, d)));

        amounts
            .iter()
            .map(|&amount| {
                let (output, fill_data) = match market {
                    Some((m, direction)) if amount > Decimal::ZERO => {
                        let output = if is_sell { m.sell(direction, amount) } else { m.buy(direction, amount) };
                        let data = FillData::Bridge(BridgeFillData {
                            pool: Some(m.wrapped.clone()),
                            path: vec![taker_token.to_string(), maker_token.to_string()],
                            gas_used: None,
                        });
                        (output, data)
                    }
                    _ => (Decimal::ZERO, FillData::None),
                };
                DexSample { source: self.source, input: amount, output, fill_data }
            })
            .collect()
    }
}

#[async_trait]
impl SourceAdapter for LendingAdapter {
    fn source(&self) -> Source {
        self.source
    }

    async fn sample_sell(
        &self,
        taker_token: &str,
        maker_token: &str,
        amounts: &[Decimal],
    ) -> Result<Vec<DexSample>, AggrError> {
        Ok(self.sample(taker_token, maker_token, amounts, true).await)
    }

    async fn sample_buy(
        &self,
        taker_token: &str,
        maker_token: &str,
        amounts: &[Decimal],
    ) -> Result<Vec<DexSample>, AggrError> {
        Ok(self.sample(taker_token, maker_token, amounts, false).await)
    }
}
