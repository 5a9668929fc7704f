// Fill adjustment policies
// Applied to fills before they reach the solver; Phase 1 routes with the
// identity policy, Phase 2 with the caller's
//
// Numan Thabit 2025 Nov

use crate::router::fills::Fill;
use crate::types::{Side, Source};
use rust_decimal::Decimal;
use std::collections::HashMap;

pub trait FillAdjustor: Send + Sync {
    fn adjust_fills(&self, side: Side, fills: Vec<Fill>) -> Vec<Fill>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityFillAdjustor;

impl FillAdjustor for IdentityFillAdjustor {
    fn adjust_fills(&self, _side: Side, fills: Vec<Fill>) -> Vec<Fill> {
        fills
    }
}

/// Haircut each fill's adjusted output by a per-source expected slippage in
/// basis points of its raw output.
#[derive(Debug, Clone, Default)]
pub struct SlippageFillAdjustor {
    bps: HashMap<Source, u32>,
}

impl SlippageFillAdjustor {
    pub fn new(bps: HashMap<Source, u32>) -> Self {
        Self { bps }
    }
}

impl FillAdjustor for SlippageFillAdjustor {
    fn adjust_fills(&self, side: Side, fills: Vec<Fill>) -> Vec<Fill> {
        fills
            .into_iter()
            .map(|mut fill| {
                if let Some(&bps) = self.bps.get(&fill.source) {
                    let slip = fill.output * Decimal::from(bps) / Decimal::from(10_000);
                    fill.adjusted_output = match side {
                        Side::Sell => fill.adjusted_output - slip,
                        Side::Buy => fill.adjusted_output + slip,
                    };
                }
                fill
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FillData;

    fn fill(source: Source) -> Fill {
        Fill {
            source,
            source_path_id: source.to_string(),
            input: Decimal::from(100),
            output: Decimal::from(1_000),
            adjusted_output: Decimal::from(990),
            gas: 0,
            flags: source.flag(),
            fill_data: FillData::None,
        }
    }

    #[test]
    fn slippage_applies_per_source() {
        let adj = SlippageFillAdjustor::new(HashMap::from([(Source::Curve, 50)]));
        let out = adj.adjust_fills(Side::Sell, vec![fill(Source::Curve), fill(Source::UniswapV2)]);
        assert_eq!(out[0].adjusted_output, Decimal::from(985));
        assert_eq!(out[1].adjusted_output, Decimal::from(990));

        let out = adj.adjust_fills(Side::Buy, vec![fill(Source::Curve)]);
        assert_eq!(out[0].adjusted_output, Decimal::from(995));
    }
}
