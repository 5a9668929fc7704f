// AMM venue adapter module
// Constant-product pools (UniswapV2 and SushiSwap style). Each sample is
// priced against the best pool for the pair at that size.
//
// Numan Thabit 2025 Nov

use crate::cache::PoolCache;
use crate::errors::AggrError;
use crate::quant::mul_div;
use crate::types::{Address, BridgeFillData, DexSample, FillData, Source};
use crate::venues::adapter::{same_token, SourceAdapter};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

const BPS: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstantProductPool {
    pub address: Address,
    pub token_a: Address,
    pub token_b: Address,
    pub reserve_a: Decimal,
    pub reserve_b: Decimal,
    /// Swap fee in basis points of the input.
    #[serde(default = "default_fee_bps")]
    pub fee_bps: u32,
}

fn default_fee_bps() -> u32 {
    30
}

impl ConstantProductPool {
    /// `(reserve_in, reserve_out)` when selling `taker_token` for `maker_token`.
    fn reserves(&self, taker_token: &str, maker_token: &str) -> Option<(Decimal, Decimal)> {
        if same_token(&self.token_a, taker_token) && same_token(&self.token_b, maker_token) {
            Some((self.reserve_a, self.reserve_b))
        } else if same_token(&self.token_b, taker_token) && same_token(&self.token_a, maker_token) {
            Some((self.reserve_b, self.reserve_a))
        } else {
            None
        }
    }

    fn fill_data(&self, taker_token: &str, maker_token: &str) -> FillData {
        FillData::Bridge(BridgeFillData {
            pool: Some(self.address.clone()),
            path: vec![taker_token.to_string(), maker_token.to_string()],
            gas_used: None,
        })
    }
}

/// Output received for `amount_in`, rounded down.
pub fn get_amount_out(amount_in: Decimal, reserve_in: Decimal, reserve_out: Decimal, fee_bps: u32) -> Decimal {
    if amount_in <= Decimal::ZERO || reserve_in <= Decimal::ZERO || reserve_out <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    let in_after_fee = mul_div(amount_in, BPS - Decimal::from(fee_bps), BPS);
    mul_div(in_after_fee, reserve_out, reserve_in + in_after_fee).floor()
}

/// Input required to receive `amount_out`, rounded up. Zero when the pool
/// cannot deliver that much.
pub fn get_amount_in(amount_out: Decimal, reserve_in: Decimal, reserve_out: Decimal, fee_bps: u32) -> Decimal {
    if amount_out <= Decimal::ZERO || reserve_in <= Decimal::ZERO || amount_out >= reserve_out {
        return Decimal::ZERO;
    }
    let fee_factor = BPS - Decimal::from(fee_bps);
    if fee_factor <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    let before_fee = mul_div(reserve_in, amount_out, reserve_out - amount_out);
    mul_div(before_fee, BPS, fee_factor).ceil()
}

pub struct ConstantProductAdapter {
    source: Source,
    pools: PoolCache<Vec<ConstantProductPool>>,
}

impl ConstantProductAdapter {
    pub fn new(source: Source, pools: PoolCache<Vec<ConstantProductPool>>) -> Self {
        Self { source, pools }
    }

    async fn pair_pools(&self, taker_token: &str, maker_token: &str) -> Vec<(ConstantProductPool, Decimal, Decimal)> {
        let Some(pools) = self.pools.get().await else {
            return Vec::new();
        };
        pools
            .iter()
            .filter_map(|p| {
                p.reserves(taker_token, maker_token)
                    .map(|(r_in, r_out)| (p.clone(), r_in, r_out))
            })
            .collect()
    }

    fn empty(&self, amount: Decimal) -> DexSample {
        DexSample { source: self.source, input: amount, output: Decimal::ZERO, fill_data: FillData::None }
    }
}

#[async_trait]
impl SourceAdapter for ConstantProductAdapter {
    fn source(&self) -> Source {
        self.source
    }

    async fn sample_sell(
        &self,
        taker_token: &str,
        maker_token: &str,
        amounts: &[Decimal],
    ) -> Result<Vec<DexSample>, AggrError> {
        let pools = self.pair_pools(taker_token, maker_token).await;
        Ok(amounts
            .iter()
            .map(|&amount| {
                pools
                    .iter()
                    .map(|(pool, r_in, r_out)| (pool, get_amount_out(amount, *r_in, *r_out, pool.fee_bps)))
                    .filter(|(_, out)| *out > Decimal::ZERO)
                    .max_by(|a, b| a.1.cmp(&b.1))
                    .map(|(pool, output)| DexSample {
                        source: self.source,
                        input: amount,
                        output,
                        fill_data: pool.fill_data(taker_token, maker_token),
                    })
                    .unwrap_or_else(|| self.empty(amount))
            })
            .collect())
    }

    async fn sample_buy(
        &self,
        taker_token: &str,
        maker_token: &str,
        amounts: &[Decimal],
    ) -> Result<Vec<DexSample>, AggrError> {
        let pools = self.pair_pools(taker_token, maker_token).await;
        Ok(amounts
            .iter()
            .map(|&amount| {
                pools
                    .iter()
                    .map(|(pool, r_in, r_out)| (pool, get_amount_in(amount, *r_in, *r_out, pool.fee_bps)))
                    .filter(|(_, cost)| *cost > Decimal::ZERO)
                    .min_by(|a, b| a.1.cmp(&b.1))
                    .map(|(pool, output)| DexSample {
                        source: self.source,
                        input: amount,
                        output,
                        fill_data: pool.fill_data(taker_token, maker_token),
                    })
                    .unwrap_or_else(|| self.empty(amount))
            })
            .collect())
    }
}
