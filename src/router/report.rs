// Quote reports
// Which sources were considered for a quote and which delivered it, plus
// the per-source price comparison. Rendering is best effort; callers drop a
// failed report and keep the routing result.
//
// Numan Thabit 2025 Nov

use crate::errors::AggrError;
use crate::quant::get_two_hop_adjusted_rate;
use crate::rfq::IndicativeQuote;
use crate::router::fills::Fill;
use crate::router::liquidity::{GetMarketOrdersOpts, MarketSideLiquidity, RawQuotes};
use crate::types::{DexSample, FillData, NativeOrderType, NativeOrderWithFillableAmounts, Side, Source};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QuoteReportEntry {
    Bridge {
        liquidity_source: Source,
        maker_amount: Decimal,
        taker_amount: Decimal,
        fill_data: FillData,
    },
    MultiHop {
        maker_amount: Decimal,
        taker_amount: Decimal,
        hop_sources: [Source; 2],
        #[serde(skip_serializing_if = "Option::is_none")]
        adjusted_rate: Option<Decimal>,
        fill_data: FillData,
    },
    Native {
        is_rfq: bool,
        maker_amount: Decimal,
        taker_amount: Decimal,
        fillable_taker_amount: Decimal,
        #[serde(skip_serializing_if = "Option::is_none")]
        maker_uri: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        comparison_price: Option<Decimal>,
    },
    Indicative {
        maker_amount: Decimal,
        taker_amount: Decimal,
        #[serde(skip_serializing_if = "Option::is_none")]
        maker_uri: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        comparison_price: Option<Decimal>,
    },
}

impl QuoteReportEntry {
    pub fn source(&self) -> Source {
        match self {
            QuoteReportEntry::Bridge { liquidity_source, .. } => *liquidity_source,
            QuoteReportEntry::MultiHop { .. } => Source::MultiHop,
            QuoteReportEntry::Native { .. } | QuoteReportEntry::Indicative { .. } => Source::Native,
        }
    }

    fn amounts(&self) -> (Decimal, Decimal) {
        match self {
            QuoteReportEntry::Bridge { maker_amount, taker_amount, .. }
            | QuoteReportEntry::MultiHop { maker_amount, taker_amount, .. }
            | QuoteReportEntry::Native { maker_amount, taker_amount, .. }
            | QuoteReportEntry::Indicative { maker_amount, taker_amount, .. } => (*maker_amount, *taker_amount),
        }
    }
}

impl fmt::Display for QuoteReportEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (maker, taker) = self.amounts();
        match self {
            QuoteReportEntry::MultiHop { hop_sources, .. } => {
                write!(f, "MultiHop({} -> {})", hop_sources[0], hop_sources[1])?
            }
            QuoteReportEntry::Native { is_rfq: true, maker_uri, .. } => {
                write!(f, "Native(rfq {})", maker_uri.as_deref().unwrap_or("-"))?
            }
            QuoteReportEntry::Native { .. } => write!(f, "Native(limit)")?,
            QuoteReportEntry::Indicative { maker_uri, .. } => {
                write!(f, "Native(indicative {})", maker_uri.as_deref().unwrap_or("-"))?
            }
            QuoteReportEntry::Bridge { liquidity_source, .. } => write!(f, "{liquidity_source}")?,
        }
        write!(f, " maker={maker} taker={taker}")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QuoteReport {
    pub sources_considered: Vec<QuoteReportEntry>,
    pub sources_delivered: Vec<QuoteReportEntry>,
}

impl fmt::Display for QuoteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "sources considered: {}", self.sources_considered.len())?;
        for entry in &self.sources_considered {
            writeln!(f, "  {entry}")?;
        }
        writeln!(f, "sources delivered: {}", self.sources_delivered.len())?;
        for entry in &self.sources_delivered {
            writeln!(f, "  {entry}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PriceComparisonsReport {
    pub dex_sources: Vec<QuoteReportEntry>,
    pub multi_hop_sources: Vec<QuoteReportEntry>,
    pub native_sources: Vec<QuoteReportEntry>,
}

impl fmt::Display for PriceComparisonsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let groups = [
            ("dex", &self.dex_sources),
            ("multi-hop", &self.multi_hop_sources),
            ("native", &self.native_sources),
        ];
        for (name, entries) in groups {
            writeln!(f, "{name}:")?;
            for entry in entries {
                writeln!(f, "  {entry}")?;
            }
        }
        Ok(())
    }
}

/// `(maker_amount, taker_amount)` of a sampled point for this side.
fn sample_amounts(side: Side, input: Decimal, output: Decimal) -> (Decimal, Decimal) {
    match side {
        Side::Sell => (output, input),
        Side::Buy => (input, output),
    }
}

pub fn dex_sample_to_report_entry(sample: &DexSample, side: Side) -> Result<QuoteReportEntry, AggrError> {
    if sample.source == Source::Native {
        return Err(AggrError::Report("unexpected liquidity source Native".into()));
    }
    let (maker_amount, taker_amount) = sample_amounts(side, sample.input, sample.output);
    Ok(QuoteReportEntry::Bridge {
        liquidity_source: sample.source,
        maker_amount,
        taker_amount,
        fill_data: sample.fill_data.clone(),
    })
}

pub fn multi_hop_sample_to_report_entry(
    sample: &DexSample,
    side: Side,
    adjusted_rate: Option<Decimal>,
) -> Result<QuoteReportEntry, AggrError> {
    let hops = sample
        .multi_hop()
        .ok_or_else(|| AggrError::Report("multi-hop sample without hop metadata".into()))?;
    let (maker_amount, taker_amount) = sample_amounts(side, sample.input, sample.output);
    Ok(QuoteReportEntry::MultiHop {
        maker_amount,
        taker_amount,
        hop_sources: [hops.first_hop.source, hops.second_hop.source],
        adjusted_rate,
        fill_data: sample.fill_data.clone(),
    })
}

pub fn native_order_to_report_entry(
    order: &NativeOrderWithFillableAmounts,
    fillable_taker_amount: Decimal,
    comparison_price: Option<Decimal>,
    maker_uris: &HashMap<String, String>,
) -> QuoteReportEntry {
    let is_rfq = order.order_type() == NativeOrderType::Rfq;
    let maker_uri = if is_rfq {
        order.signed.signature.as_ref().and_then(|sig| maker_uris.get(sig).cloned())
    } else {
        None
    };
    QuoteReportEntry::Native {
        is_rfq,
        maker_amount: order.order().maker_amount,
        taker_amount: order.order().taker_amount,
        fillable_taker_amount,
        maker_uri,
        comparison_price: if is_rfq { comparison_price } else { None },
    }
}

pub fn indicative_quote_to_report_entry(quote: &IndicativeQuote, comparison_price: Option<Decimal>) -> QuoteReportEntry {
    QuoteReportEntry::Indicative {
        maker_amount: quote.maker_amount,
        taker_amount: quote.taker_amount,
        maker_uri: quote.maker_uri.clone(),
        comparison_price,
    }
}

fn native_order_id(order: &NativeOrderWithFillableAmounts) -> String {
    match &order.signed.signature {
        Some(sig) => sig.clone(),
        None => {
            let o = order.order();
            format!("{}:{}:{}:{}", o.maker, o.maker_amount, o.taker_amount, o.expiry)
        }
    }
}

/// Considered: every native order, indicative quote, full-size multi-hop
/// quote and full-size dex sample with liquidity. Delivered: one entry per
/// fill of the chosen path.
pub fn generate_quote_report(
    side: Side,
    quotes: &RawQuotes,
    liquidity_delivered: &[Fill],
    amount: Decimal,
    comparison_price: Option<Decimal>,
) -> Result<QuoteReport, AggrError> {
    let mut considered = Vec::new();
    considered.extend(quotes.native_orders.iter().map(|o| {
        native_order_to_report_entry(o, o.fillable_taker_amount, comparison_price, &quotes.maker_uris)
    }));
    considered.extend(
        quotes
            .rfqt_indicative_quotes
            .iter()
            .map(|q| indicative_quote_to_report_entry(q, comparison_price)),
    );
    for curve in &quotes.two_hop_quotes {
        if let Some(full) = curve.last() {
            considered.push(multi_hop_sample_to_report_entry(full, side, None)?);
        }
    }
    for sample in quotes.dex_quotes.iter().flatten() {
        if sample.input == amount && sample.output > Decimal::ZERO {
            considered.push(dex_sample_to_report_entry(sample, side)?);
        }
    }

    let fillable: HashMap<String, Decimal> = quotes
        .native_orders
        .iter()
        .map(|o| (native_order_id(o), o.fillable_taker_amount))
        .collect();
    let mut delivered = Vec::with_capacity(liquidity_delivered.len());
    for fill in liquidity_delivered {
        let entry = match &fill.fill_data {
            FillData::Native(order) => {
                let fillable_taker = fillable
                    .get(&native_order_id(order))
                    .copied()
                    .unwrap_or(order.fillable_taker_amount);
                native_order_to_report_entry(order, fillable_taker, comparison_price, &quotes.maker_uris)
            }
            FillData::MultiHop(_) => multi_hop_sample_to_report_entry(&fill_to_sample(fill), side, None)?,
            _ => dex_sample_to_report_entry(&fill_to_sample(fill), side)?,
        };
        delivered.push(entry);
    }
    Ok(QuoteReport { sources_considered: considered, sources_delivered: delivered })
}

fn fill_to_sample(fill: &Fill) -> DexSample {
    DexSample {
        source: fill.source,
        input: fill.input,
        output: fill.output,
        fill_data: fill.fill_data.clone(),
    }
}

/// Every sampled dex point, every multi-hop quote with its adjusted rate, and
/// every native order.
pub fn generate_price_comparisons_report(
    liquidity: &MarketSideLiquidity,
    comparison_price: Option<Decimal>,
    opts: &GetMarketOrdersOpts,
) -> Result<PriceComparisonsReport, AggrError> {
    let side = liquidity.side;
    let quotes = &liquidity.quotes;
    let dex_sources = quotes
        .dex_quotes
        .iter()
        .flatten()
        .map(|s| dex_sample_to_report_entry(s, side))
        .collect::<Result<Vec<_>, _>>()?;
    let multi_hop_sources = quotes
        .two_hop_quotes
        .iter()
        .flatten()
        .map(|s| {
            let rate = get_two_hop_adjusted_rate(
                side,
                s,
                liquidity.input_amount,
                liquidity.output_amount_per_eth,
                &opts.fee_schedule,
                &opts.exchange_proxy_overhead,
                opts.fill_adjustor.as_ref(),
            );
            multi_hop_sample_to_report_entry(s, side, Some(rate))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let native_sources = quotes
        .native_orders
        .iter()
        .map(|o| native_order_to_report_entry(o, o.fillable_taker_amount, comparison_price, &quotes.maker_uris))
        .collect();
    Ok(PriceComparisonsReport { dex_sources, multi_hop_sources, native_sources })
}
