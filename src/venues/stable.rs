// Stableswap venue adapter module
// Two-coin amplified-invariant pools (Curve and PSM style). Balances are
// normalized to whole token units before solving the invariant.
//
// Numan Thabit 2025 Nov

use crate::cache::PoolCache;
use crate::errors::AggrError;
use crate::quant::ten_pow;
use crate::types::{Address, BridgeFillData, DexSample, FillData, Source};
use crate::venues::adapter::{same_token, SourceAdapter};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

const MAX_ITERATIONS: usize = 64;
const BPS: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);
/// Relative convergence bound for the Newton iterations.
const TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 16);
const TWO: Decimal = Decimal::TWO;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StablePool {
    pub address: Address,
    pub tokens: [Address; 2],
    pub decimals: [u32; 2],
    /// Base units.
    pub balances: [Decimal; 2],
    pub amplification: Decimal,
    #[serde(default = "default_fee_bps")]
    pub fee_bps: u32,
}

fn default_fee_bps() -> u32 {
    4
}

impl StablePool {
    /// `(i, j)` coin indexes when selling `taker_token` for `maker_token`.
    fn indexes(&self, taker_token: &str, maker_token: &str) -> Option<(usize, usize)> {
        let i = self.tokens.iter().position(|t| same_token(t, taker_token))?;
        let j = self.tokens.iter().position(|t| same_token(t, maker_token))?;
        (i != j).then_some((i, j))
    }

    fn normalized(&self) -> [Decimal; 2] {
        [
            self.balances[0] / ten_pow(self.decimals[0]),
            self.balances[1] / ten_pow(self.decimals[1]),
        ]
    }

    fn fee_rate(&self) -> Decimal {
        Decimal::from(self.fee_bps) / BPS
    }

    /// Maker base units received for `amount` taker base units.
    pub fn get_dy(&self, i: usize, j: usize, amount: Decimal) -> Decimal {
        let quote = || -> Option<Decimal> {
            let xp = self.normalized();
            let d = get_d(xp, self.amplification)?;
            let x = xp[i] + amount / ten_pow(self.decimals[i]);
            let y = get_y(x, d, self.amplification)?;
            let dy = xp[j] - y;
            let out = dy - dy * self.fee_rate();
            Some((out * ten_pow(self.decimals[j])).floor())
        };
        if amount <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        quote().filter(|v| *v > Decimal::ZERO).unwrap_or(Decimal::ZERO)
    }

    /// Taker base units needed to receive `amount` maker base units. Zero
    /// when the pool cannot deliver that much.
    pub fn get_dx(&self, i: usize, j: usize, amount: Decimal) -> Decimal {
        let quote = || -> Option<Decimal> {
            let xp = self.normalized();
            let d = get_d(xp, self.amplification)?;
            let dy = (amount / ten_pow(self.decimals[j])).checked_div(Decimal::ONE - self.fee_rate())?;
            if dy >= xp[j] {
                return None;
            }
            let x = get_y(xp[j] - dy, d, self.amplification)?;
            let dx = x - xp[i];
            Some((dx * ten_pow(self.decimals[i])).ceil())
        };
        if amount <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        quote().filter(|v| *v > Decimal::ZERO).unwrap_or(Decimal::ZERO)
    }

    fn fill_data(&self, taker_token: &str, maker_token: &str) -> FillData {
        FillData::Bridge(BridgeFillData {
            pool: Some(self.address.clone()),
            path: vec![taker_token.to_string(), maker_token.to_string()],
            gas_used: None,
        })
    }
}

fn converged(next: Decimal, prev: Decimal) -> bool {
    (next - prev).abs() <= next.abs() * TOLERANCE
}

/// Invariant `D` for normalized balances `xp`.
fn get_d(xp: [Decimal; 2], amp: Decimal) -> Option<Decimal> {
    let s = xp[0] + xp[1];
    if s.is_zero() {
        return Some(Decimal::ZERO);
    }
    if xp.iter().any(|x| *x <= Decimal::ZERO) {
        return None;
    }
    let ann = amp.checked_mul(TWO)?;
    let mut d = s;
    for _ in 0..MAX_ITERATIONS {
        let mut d_p = d;
        for x in xp {
            d_p = d_p.checked_mul(d.checked_div(x.checked_mul(TWO)?)?)?;
        }
        let prev = d;
        let num = ann.checked_mul(s)?.checked_add(d_p.checked_mul(TWO)?)?;
        let den = (ann - Decimal::ONE)
            .checked_mul(d)?
            .checked_add(d_p.checked_mul(Decimal::from(3))?)?;
        d = num.checked_div(den)?.checked_mul(d)?;
        if converged(d, prev) {
            return Some(d);
        }
    }
    None
}

/// Balance of the other coin once one coin's balance moves to `x`, keeping
/// `D` constant.
fn get_y(x: Decimal, d: Decimal, amp: Decimal) -> Option<Decimal> {
    if x <= Decimal::ZERO {
        return None;
    }
    let ann = amp.checked_mul(TWO)?;
    let c = d
        .checked_mul(d.checked_div(x.checked_mul(TWO)?)?)?
        .checked_mul(d.checked_div(ann.checked_mul(TWO)?)?)?;
    let b = x + d.checked_div(ann)?;
    let mut y = d;
    for _ in 0..MAX_ITERATIONS {
        let prev = y;
        let num = y.checked_mul(y)?.checked_add(c)?;
        let den = y.checked_mul(TWO)?.checked_add(b)?.checked_sub(d)?;
        y = num.checked_div(den)?;
        if converged(y, prev) {
            return Some(y);
        }
    }
    None
}

pub struct StableSwapAdapter {
    source: Source,
    pools: PoolCache<Vec<StablePool>>,
}

impl StableSwapAdapter {
    pub fn new(source: Source, pools: PoolCache<Vec<StablePool>>) -> Self {
        Self { source, pools }
    }

    async fn sample(
        &self,
        taker_token: &str,
        maker_token: &str,
        amounts: &[Decimal],
        is_sell: bool,
    ) -> Vec<DexSample> {
        let pools = self.pools.get().await;
        let pair_pools: Vec<(&StablePool, usize, usize)> = pools
            .iter()
            .flat_map(|p| p.iter())
            .filter_map(|p| p.indexes(taker_token, maker_token).map(|(i, j)| (p, i, j)))
            .collect();

        amounts
            .iter()
            .map(|&amount| {
                let quotes = pair_pools.iter().filter_map(|(pool, i, j)| {
                    let v = if is_sell { pool.get_dy(*i, *j, amount) } else { pool.get_dx(*i, *j, amount) };
                    (v > Decimal::ZERO).then_some((*pool, v))
                });
                let best = if is_sell {
                    quotes.max_by(|a, b| a.1.cmp(&b.1))
                } else {
                    quotes.min_by(|a, b| a.1.cmp(&b.1))
                };
                match best {
                    Some((pool, output)) => DexSample {
                        source: self.source,
                        input: amount,
                        output,
                        fill_data: pool.fill_data(taker_token, maker_token),
                    },
                    None => DexSample {
                        source: self.source,
                        input: amount,
                        output: Decimal::ZERO,
                        fill_data: FillData::None,
                    },
                }
            })
            .collect()
    }
}

#[async_trait]
impl SourceAdapter for StableSwapAdapter {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{PoolFetcher, RefreshPolicy, StaticPoolFetcher};
    use std::sync::Arc;

    // usdc (6 decimals) / dai (18 decimals), one million each
    fn pool(amplification: i64) -> StablePool {
        StablePool {
            address: "0xcurve".into(),
            tokens: ["0xusdc".into(), "0xdai".into()],
            decimals: [6, 18],
            balances: [Decimal::from(1_000_000) * ten_pow(6), Decimal::from(1_000_000) * ten_pow(18)],
            amplification: Decimal::from(amplification),
            fee_bps: 4,
        }
    }

    #[test]
    fn balanced_invariant_equals_the_sum() {
        let d = get_d([Decimal::from(500), Decimal::from(500)], Decimal::from(100)).unwrap();
        assert!((d - Decimal::from(1000)).abs() < Decimal::new(1, 9));
    }

    #[test]
    fn small_trades_are_close_to_par_across_decimals() {
        let p = pool(100);
        // 1000 usdc in
        let out = p.get_dy(0, 1, Decimal::from(1000) * ten_pow(6));
        let whole = out / ten_pow(18);
        assert!(whole < Decimal::from(1000));
        assert!(whole > Decimal::new(9990, 1));
    }

    #[test]
    fn higher_amplification_means_less_slippage() {
        let size = Decimal::from(200_000) * ten_pow(6);
        let flat = pool(1000).get_dy(0, 1, size);
        let curved = pool(5).get_dy(0, 1, size);
        assert!(flat > curved);
    }

    #[test]
    fn buy_cost_covers_the_matching_sell() {
        let p = pool(100);
        let sold = Decimal::from(1000) * ten_pow(6);
        let received = p.get_dy(0, 1, sold);
        let cost = p.get_dx(0, 1, received);
        assert!(cost >= sold - Decimal::ONE);
        assert!(cost <= sold + Decimal::from(10));
        // cannot buy more than the pool holds
        assert_eq!(p.get_dx(0, 1, Decimal::from(2_000_000) * ten_pow(18)), Decimal::ZERO);
    }

    #[tokio::test]
    async fn adapter_samples_known_pairs_only() {
        let fetcher: Arc<dyn PoolFetcher<Vec<StablePool>>> = Arc::new(StaticPoolFetcher(vec![pool(100)]));
        let cache = PoolCache::new("stable", fetcher, RefreshPolicy::RetainOnFailure);
        cache.refresh_now().await.unwrap();
        let adapter = StableSwapAdapter::new(Source::Curve, cache);

        let amounts = [ten_pow(6), Decimal::from(10) * ten_pow(6)];
        let samples = adapter.sample_sell("0xUSDC", "0xdai", &amounts).await.unwrap();
        assert!(samples.iter().all(|s| s.output > Decimal::ZERO && s.source == Source::Curve));
        assert!(samples[1].output > samples[0].output);

        let unknown = adapter.sample_buy("0xusdc", "0xusdt", &amounts).await.unwrap();
        assert!(unknown.iter().all(|s| s.output.is_zero()));
    }
}
