// Core data model module
// Trade sides, liquidity sources and their flag bitset, per-source fill
// metadata, sampled curve points and native (limit / RFQ / OTC) orders
//
// Numan Thabit 2025 Nov

use crate::errors::AggrError;
use crate::quant::mul_div;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Token identifier, kept as the lowercase hex address string.
pub type Address = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Sell,
    Buy,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Sell => "sell",
            Side::Buy => "buy",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A liquidity venue the aggregator can route through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Source {
    Native,
    MultiHop,
    UniswapV2,
    SushiSwap,
    UniswapV3,
    Curve,
    Balancer,
    BalancerV2,
    Compound,
    AaveV2,
    Lido,
    LiquidityProvider,
    MakerPsm,
}

impl Source {
    pub const ALL: [Source; 13] = [
        Source::Native,
        Source::MultiHop,
        Source::UniswapV2,
        Source::SushiSwap,
        Source::UniswapV3,
        Source::Curve,
        Source::Balancer,
        Source::BalancerV2,
        Source::Compound,
        Source::AaveV2,
        Source::Lido,
        Source::LiquidityProvider,
        Source::MakerPsm,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Native => "Native",
            Source::MultiHop => "MultiHop",
            Source::UniswapV2 => "UniswapV2",
            Source::SushiSwap => "SushiSwap",
            Source::UniswapV3 => "UniswapV3",
            Source::Curve => "Curve",
            Source::Balancer => "Balancer",
            Source::BalancerV2 => "BalancerV2",
            Source::Compound => "Compound",
            Source::AaveV2 => "AaveV2",
            Source::Lido => "Lido",
            Source::LiquidityProvider => "LiquidityProvider",
            Source::MakerPsm => "MakerPsm",
        }
    }

    /// Single-bit flag identifying this source inside a [`SourceFlags`] set.
    pub fn flag(self) -> SourceFlags {
        SourceFlags(1u64 << (self as u64))
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = AggrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Source::ALL
            .iter()
            .copied()
            .find(|src| src.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| AggrError::InvalidRequest(format!("unknown source: {s}")))
    }
}

/// Bitset of the sources that contributed to a fill or a path.
///
/// Low bits are indexed by [`Source`]; the top bits mark the native order
/// flavours, which settle differently from the plain `Native` source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceFlags(pub u64);

impl SourceFlags {
    pub const EMPTY: SourceFlags = SourceFlags(0);
    pub const RFQ_ORDER: SourceFlags = SourceFlags(1 << 62);
    pub const LIMIT_ORDER: SourceFlags = SourceFlags(1 << 61);
    pub const OTC_ORDER: SourceFlags = SourceFlags(1 << 60);

    pub fn bits(self) -> u64 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: SourceFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn count(self) -> u32 {
        self.0.count_ones()
    }
}

impl BitOr for SourceFlags {
    type Output = SourceFlags;

    fn bitor(self, rhs: SourceFlags) -> SourceFlags {
        SourceFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for SourceFlags {
    fn bitor_assign(&mut self, rhs: SourceFlags) {
        self.0 |= rhs.0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NativeOrderType {
    Limit,
    Rfq,
    Otc,
}

impl NativeOrderType {
    pub fn flag(self) -> SourceFlags {
        match self {
            NativeOrderType::Limit => SourceFlags::LIMIT_ORDER,
            NativeOrderType::Rfq => SourceFlags::RFQ_ORDER,
            NativeOrderType::Otc => SourceFlags::OTC_ORDER,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeOrder {
    pub maker: Address,
    pub maker_token: Address,
    pub taker_token: Address,
    pub maker_amount: Decimal,
    pub taker_amount: Decimal,
    #[serde(default)]
    pub taker_token_fee_amount: Decimal,
    /// Unix seconds.
    #[serde(default)]
    pub expiry: u64,
}

/// An order plus its opaque signature. Indicative quotes carry none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedNativeOrder {
    pub order: NativeOrder,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(rename = "type")]
    pub order_type: NativeOrderType,
}

impl SignedNativeOrder {
    /// Attach fillable amounts derived from the remaining taker-side amount.
    pub fn with_fillable_taker_amount(self, fillable_taker: Decimal) -> NativeOrderWithFillableAmounts {
        let order = &self.order;
        let (maker, fee) = if order.taker_amount.is_zero() {
            (Decimal::ZERO, Decimal::ZERO)
        } else {
            (
                mul_div(order.maker_amount, fillable_taker, order.taker_amount).floor(),
                mul_div(order.taker_token_fee_amount, fillable_taker, order.taker_amount).ceil(),
            )
        };
        NativeOrderWithFillableAmounts {
            fillable_maker_amount: maker,
            fillable_taker_amount: fillable_taker,
            fillable_taker_fee_amount: fee,
            signed: self,
        }
    }

    /// Attach fillable amounts derived from the remaining maker-side amount.
    pub fn with_fillable_maker_amount(self, fillable_maker: Decimal) -> NativeOrderWithFillableAmounts {
        let order = &self.order;
        let (taker, fee) = if order.maker_amount.is_zero() {
            (Decimal::ZERO, Decimal::ZERO)
        } else {
            let taker = mul_div(order.taker_amount, fillable_maker, order.maker_amount).ceil();
            let fee = if order.taker_amount.is_zero() {
                Decimal::ZERO
            } else {
                mul_div(order.taker_token_fee_amount, taker, order.taker_amount).ceil()
            };
            (taker, fee)
        };
        NativeOrderWithFillableAmounts {
            fillable_maker_amount: fillable_maker,
            fillable_taker_amount: taker,
            fillable_taker_fee_amount: fee,
            signed: self,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeOrderWithFillableAmounts {
    #[serde(flatten)]
    pub signed: SignedNativeOrder,
    pub fillable_maker_amount: Decimal,
    pub fillable_taker_amount: Decimal,
    #[serde(default)]
    pub fillable_taker_fee_amount: Decimal,
}

impl NativeOrderWithFillableAmounts {
    pub fn order(&self) -> &NativeOrder {
        &self.signed.order
    }

    pub fn order_type(&self) -> NativeOrderType {
        self.signed.order_type
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BridgeFillData {
    /// Pool or router address the quote was measured against.
    #[serde(default)]
    pub pool: Option<String>,
    /// Token path through the venue, inclusive of both ends.
    #[serde(default)]
    pub path: Vec<Address>,
    /// Gas measured by the sampler for this size, when the venue reports it.
    #[serde(default)]
    pub gas_used: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HopSource {
    pub source: Source,
    pub fill_data: FillData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiHopFillData {
    pub intermediate_token: Address,
    pub first_hop: HopSource,
    pub second_hop: HopSource,
}

/// Source-specific metadata carried from a sample through to the final order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FillData {
    #[default]
    None,
    Bridge(BridgeFillData),
    Native(Box<NativeOrderWithFillableAmounts>),
    MultiHop(Box<MultiHopFillData>),
}

/// One measured point on a source's price curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DexSample {
    pub source: Source,
    pub input: Decimal,
    pub output: Decimal,
    #[serde(default)]
    pub fill_data: FillData,
}

impl DexSample {
    pub fn multi_hop(&self) -> Option<&MultiHopFillData> {
        match &self.fill_data {
            FillData::MultiHop(data) => Some(data),
            _ => None,
        }
    }
}

/// Wall-clock unix seconds, used for order and quote expiry.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
