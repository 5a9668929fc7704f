// In-process sampler
// Executes sampler batches against the registered source adapters and a
// chain reader. Ops run concurrently; a failing op or source never affects
// the others.
//
// Numan Thabit 2025 Nov

use crate::errors::AggrError;
use crate::sampler::{Sampler, SamplerOp, SamplerOutput};
use crate::types::{
    unix_now, Address, DexSample, FillData, HopSource, MultiHopFillData, SignedNativeOrder, Source,
};
use crate::venues::adapter::{same_token, SourceAdapter, SourceRegistry};
use async_trait::async_trait;
use futures::future::join_all;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Chain state the sampler needs besides prices.
#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn token_decimals(&self, token: &str) -> Result<u32, AggrError>;

    /// Taker amount still fillable on `order`.
    async fn fillable_taker_amount(&self, order: &SignedNativeOrder) -> Result<Decimal, AggrError>;

    /// Maker amount still fillable on `order`.
    async fn fillable_maker_amount(&self, order: &SignedNativeOrder) -> Result<Decimal, AggrError>;

    async fn is_contract(&self, address: &str) -> Result<bool, AggrError>;

    async fn block_number(&self) -> Result<u64, AggrError>;
}

/// Chain reader backed by the configured token tables. Orders are fully
/// fillable until they expire.
#[derive(Debug, Clone, Default)]
pub struct StaticChainReader {
    decimals: HashMap<Address, u32>,
    contracts: HashSet<Address>,
}

impl StaticChainReader {
    pub fn new(
        decimals: impl IntoIterator<Item = (Address, u32)>,
        contracts: impl IntoIterator<Item = Address>,
    ) -> Self {
        Self {
            decimals: decimals.into_iter().map(|(t, d)| (t.to_lowercase(), d)).collect(),
            contracts: contracts.into_iter().map(|a| a.to_lowercase()).collect(),
        }
    }

    fn is_expired(order: &SignedNativeOrder) -> bool {
        order.order.expiry != 0 && order.order.expiry <= unix_now()
    }
}

#[async_trait]
impl ChainReader for StaticChainReader {
    async fn token_decimals(&self, token: &str) -> Result<u32, AggrError> {
        self.decimals
            .get(&token.to_lowercase())
            .copied()
            .ok_or_else(|| AggrError::Provider(format!("unknown token {token}")))
    }

    async fn fillable_taker_amount(&self, order: &SignedNativeOrder) -> Result<Decimal, AggrError> {
        if Self::is_expired(order) {
            return Ok(Decimal::ZERO);
        }
        Ok(order.order.taker_amount)
    }

    async fn fillable_maker_amount(&self, order: &SignedNativeOrder) -> Result<Decimal, AggrError> {
        if Self::is_expired(order) {
            return Ok(Decimal::ZERO);
        }
        Ok(order.order.maker_amount)
    }

    async fn is_contract(&self, address: &str) -> Result<bool, AggrError> {
        Ok(self.contracts.contains(&address.to_lowercase()))
    }

    async fn block_number(&self) -> Result<u64, AggrError> {
        Ok(unix_now())
    }
}

pub struct RegistrySampler {
    registry: Arc<SourceRegistry>,
    chain: Arc<dyn ChainReader>,
    intermediate_tokens: Vec<Address>,
}

impl RegistrySampler {
    pub fn new(registry: Arc<SourceRegistry>, chain: Arc<dyn ChainReader>, intermediate_tokens: Vec<Address>) -> Self {
        Self { registry, chain, intermediate_tokens }
    }

    fn adapters(&self, sources: &[Source]) -> Vec<&Arc<dyn SourceAdapter>> {
        sources.iter().filter_map(|s| self.registry.get(*s)).collect()
    }

    async fn execute(&self, op: SamplerOp) -> Result<SamplerOutput, AggrError> {
        match op {
            SamplerOp::TokenDecimals { tokens } => {
                let lookups = tokens.iter().map(|t| self.chain.token_decimals(t));
                let decimals = join_all(lookups).await.into_iter().collect::<Result<Vec<_>, _>>()?;
                Ok(SamplerOutput::Decimals(decimals))
            }
            SamplerOp::LimitOrderFillableTakerAmounts { orders } => {
                let lookups = orders.iter().map(|o| self.chain.fillable_taker_amount(o));
                Ok(SamplerOutput::Fillable(per_order(join_all(lookups).await)))
            }
            SamplerOp::LimitOrderFillableMakerAmounts { orders } => {
                let lookups = orders.iter().map(|o| self.chain.fillable_maker_amount(o));
                Ok(SamplerOutput::Fillable(per_order(join_all(lookups).await)))
            }
            SamplerOp::BestNativeTokenSellRate { sources, token, native_token, native_amount } => {
                if same_token(&token, &native_token) {
                    return Ok(SamplerOutput::Rate(Decimal::ONE));
                }
                let rate = self
                    .best_sell(&sources, &native_token, &token, native_amount)
                    .await
                    .and_then(|s| s.output.checked_div(native_amount))
                    .unwrap_or(Decimal::ZERO);
                Ok(SamplerOutput::Rate(rate))
            }
            SamplerOp::SellQuotes { sources, maker_token, taker_token, amounts } => {
                let curves = self.adapters(&sources).into_iter().map(|adapter| {
                    let (taker, maker, amounts) = (&taker_token, &maker_token, &amounts);
                    async move { isolate(adapter.source(), adapter.sample_sell(taker, maker, amounts).await) }
                });
                Ok(SamplerOutput::Quotes(non_empty(join_all(curves).await)))
            }
            SamplerOp::BuyQuotes { sources, maker_token, taker_token, amounts } => {
                let curves = self.adapters(&sources).into_iter().map(|adapter| {
                    let (taker, maker, amounts) = (&taker_token, &maker_token, &amounts);
                    async move { isolate(adapter.source(), adapter.sample_buy(taker, maker, amounts).await) }
                });
                Ok(SamplerOutput::Quotes(non_empty(join_all(curves).await)))
            }
            SamplerOp::TwoHopSellQuotes { sources, maker_token, taker_token, amounts } => {
                let curves = self
                    .intermediates(&maker_token, &taker_token)
                    .map(|mid| self.two_hop_sell_curve(&sources, &taker_token, mid, &maker_token, &amounts));
                Ok(SamplerOutput::Quotes(non_empty(join_all(curves).await)))
            }
            SamplerOp::TwoHopBuyQuotes { sources, maker_token, taker_token, amounts } => {
                let curves = self
                    .intermediates(&maker_token, &taker_token)
                    .map(|mid| self.two_hop_buy_curve(&sources, &taker_token, mid, &maker_token, &amounts));
                Ok(SamplerOutput::Quotes(non_empty(join_all(curves).await)))
            }
            SamplerOp::IsAddressContract { address } => {
                Ok(SamplerOutput::IsContract(self.chain.is_contract(&address).await?))
            }
            SamplerOp::BlockNumber => Ok(SamplerOutput::BlockNumber(self.chain.block_number().await?)),
        }
    }

    fn intermediates<'a>(&'a self, maker_token: &'a str, taker_token: &'a str) -> impl Iterator<Item = &'a Address> {
        self.intermediate_tokens
            .iter()
            .filter(move |t| !same_token(t, maker_token) && !same_token(t, taker_token))
    }

    /// Highest output across `sources` for selling `amount`.
    async fn best_sell(&self, sources: &[Source], taker: &str, maker: &str, amount: Decimal) -> Option<DexSample> {
        let amounts = [amount];
        let quotes = self.adapters(sources).into_iter().map(|a| a.sample_sell(taker, maker, &amounts));
        join_all(quotes)
            .await
            .into_iter()
            .filter_map(|r| r.ok().and_then(|s| s.into_iter().next()))
            .filter(|s| s.output > Decimal::ZERO)
            .max_by(|a, b| a.output.cmp(&b.output))
    }

    /// Lowest cost across `sources` for buying `amount`.
    async fn best_buy(&self, sources: &[Source], taker: &str, maker: &str, amount: Decimal) -> Option<DexSample> {
        let amounts = [amount];
        let quotes = self.adapters(sources).into_iter().map(|a| a.sample_buy(taker, maker, &amounts));
        join_all(quotes)
            .await
            .into_iter()
            .filter_map(|r| r.ok().and_then(|s| s.into_iter().next()))
            .filter(|s| s.output > Decimal::ZERO)
            .min_by(|a, b| a.output.cmp(&b.output))
    }

    async fn two_hop_sell_curve(
        &self,
        sources: &[Source],
        taker_token: &str,
        mid: &Address,
        maker_token: &str,
        amounts: &[Decimal],
    ) -> Vec<DexSample> {
        let mut curve = Vec::with_capacity(amounts.len());
        for &amount in amounts {
            let Some(first) = self.best_sell(sources, taker_token, mid, amount).await else {
                break;
            };
            let Some(second) = self.best_sell(sources, mid, maker_token, first.output).await else {
                break;
            };
            curve.push(two_hop_sample(mid, amount, second.output, first, second));
        }
        curve
    }

    async fn two_hop_buy_curve(
        &self,
        sources: &[Source],
        taker_token: &str,
        mid: &Address,
        maker_token: &str,
        amounts: &[Decimal],
    ) -> Vec<DexSample> {
        let mut curve = Vec::with_capacity(amounts.len());
        for &amount in amounts {
            // work backwards from the maker side
            let Some(second) = self.best_buy(sources, mid, maker_token, amount).await else {
                break;
            };
            let Some(first) = self.best_buy(sources, taker_token, mid, second.output).await else {
                break;
            };
            let cost = first.output;
            curve.push(two_hop_sample(mid, amount, cost, first, second));
        }
        curve
    }
}

fn two_hop_sample(mid: &Address, input: Decimal, output: Decimal, first: DexSample, second: DexSample) -> DexSample {
    DexSample {
        source: Source::MultiHop,
        input,
        output,
        fill_data: FillData::MultiHop(Box::new(MultiHopFillData {
            intermediate_token: mid.clone(),
            first_hop: HopSource { source: first.source, fill_data: first.fill_data },
            second_hop: HopSource { source: second.source, fill_data: second.fill_data },
        })),
    }
}

/// A failed order lookup makes only that order unfillable.
fn per_order(results: Vec<Result<Decimal, AggrError>>) -> Vec<Decimal> {
    results
        .into_iter()
        .map(|r| {
            r.unwrap_or_else(|e| {
                warn!(error = %e, "fillable amount lookup failed");
                Decimal::ZERO
            })
        })
        .collect()
}

/// A failed source yields an empty curve instead of failing the op.
fn isolate(source: Source, result: Result<Vec<DexSample>, AggrError>) -> Vec<DexSample> {
    result.unwrap_or_else(|e| {
        warn!(%source, error = %e, "source sampling failed");
        Vec::new()
    })
}

fn non_empty(curves: Vec<Vec<DexSample>>) -> Vec<Vec<DexSample>> {
    curves.into_iter().filter(|c| !c.is_empty()).collect()
}

#[async_trait]
impl Sampler for RegistrySampler {
    async fn execute_batch(&self, ops: Vec<SamplerOp>) -> Vec<Result<SamplerOutput, AggrError>> {
        debug!(ops = ops.len(), "executing sampler batch");
        join_all(ops.into_iter().map(|op| self.execute(op))).await
    }
}
