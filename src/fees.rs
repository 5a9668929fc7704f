// Fee schedule module
// Per-source gas/fee estimators and the settlement overhead charged once per
// path for whichever settlement strategy its combined source flags imply
//
// Numan Thabit 2025 Nov

use crate::types::{BridgeFillData, FillData, Source, SourceFlags};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeEstimate {
    pub gas: u64,
    /// Cost in wei.
    pub fee: Decimal,
}

/// Estimator for one source. `None` means the estimate needs fill metadata
/// that was not supplied.
pub type FeeFn = Arc<dyn Fn(&FillData) -> Option<FeeEstimate> + Send + Sync>;

/// Settlement overhead in wei for a combined source flag set.
pub type SettlementOverhead = Arc<dyn Fn(SourceFlags) -> Decimal + Send + Sync>;

pub fn zero_overhead() -> SettlementOverhead {
    Arc::new(|_| Decimal::ZERO)
}

#[derive(Clone, Default)]
pub struct FeeSchedule {
    entries: HashMap<Source, FeeFn>,
}

impl fmt::Debug for FeeSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut sources: Vec<_> = self.entries.keys().collect();
        sources.sort();
        f.debug_struct("FeeSchedule").field("sources", &sources).finish()
    }
}

impl FeeSchedule {
    pub fn insert(&mut self, source: Source, fee: FeeFn) {
        self.entries.insert(source, fee);
    }

    pub fn get(&self, source: Source) -> Option<&FeeFn> {
        self.entries.get(&source)
    }

    /// Estimate for `source`, falling back to zero gas and zero fee when the
    /// source has no entry or cannot be estimated from `fill_data`.
    pub fn estimate(&self, source: Source, fill_data: &FillData) -> FeeEstimate {
        self.entries
            .get(&source)
            .and_then(|f| f(fill_data))
            .unwrap_or_default()
    }

    /// Build a schedule charging `gas * gas_price` per source.
    ///
    /// Bridge fills that report their own `gas_used` are charged that instead.
    /// Multi-hop fills are charged a fixed hop overhead plus both hops and cannot
    /// be estimated without their hop metadata.
    pub fn from_gas_schedule(gas: &HashMap<Source, u64>, multihop_base_gas: u64, gas_price: Decimal) -> Self {
        let gas = Arc::new(gas.clone());
        let mut schedule = FeeSchedule::default();
        for (&source, &units) in gas.iter() {
            if source == Source::MultiHop {
                continue;
            }
            let fee: FeeFn = Arc::new(move |data: &FillData| {
                let used = match data {
                    FillData::Bridge(b) => b.gas_used.unwrap_or(units),
                    _ => units,
                };
                Some(FeeEstimate {
                    gas: used,
                    fee: gas_price * Decimal::from(used),
                })
            });
            schedule.insert(source, fee);
        }

        let table = Arc::clone(&gas);
        let multihop: FeeFn = Arc::new(move |data: &FillData| {
            let FillData::MultiHop(hops) = data else {
                return None;
            };
            let hop_gas = |src: Source, data: &FillData| match data {
                FillData::Bridge(BridgeFillData { gas_used: Some(used), .. }) => *used,
                _ => table.get(&src).copied().unwrap_or_default(),
            };
            let used = multihop_base_gas
                + hop_gas(hops.first_hop.source, &hops.first_hop.fill_data)
                + hop_gas(hops.second_hop.source, &hops.second_hop.fill_data);
            Some(FeeEstimate {
                gas: used,
                fee: gas_price * Decimal::from(used),
            })
        });
        schedule.insert(Source::MultiHop, multihop);
        schedule
    }
}

/// Gas charged once per path for the settlement strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverheadGas {
    /// Direct call into a single VIP source.
    pub vip: u64,
    /// A lone RFQ order.
    pub rfq: u64,
    /// Anything routed through the generic multi-source transformer.
    pub transformer: u64,
}

/// Tiered overhead: an empty set costs nothing, a lone RFQ order or a single
/// VIP source costs its direct-call overhead, anything else pays for the
/// transformer.
pub fn tiered_overhead(gas: OverheadGas, vip_sources: &[Source], gas_price: Decimal) -> SettlementOverhead {
    let vip_mask = vip_sources
        .iter()
        .fold(SourceFlags::EMPTY, |acc, s| acc | s.flag());
    Arc::new(move |flags: SourceFlags| {
        let units = if flags.is_empty() {
            0
        } else if flags == SourceFlags::RFQ_ORDER {
            gas.rfq
        } else if flags.count() == 1 && vip_mask.contains(flags) {
            gas.vip
        } else {
            gas.transformer
        };
        gas_price * Decimal::from(units)
    })
}
