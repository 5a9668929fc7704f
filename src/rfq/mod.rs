// Private quote (RFQ) module
// Request/quote types and the collaborator interface used between the two
// routing phases. Makers are solicited for indicative prices or firm,
// signed orders.
//
// Numan Thabit 2025 Nov

pub mod http;

use crate::errors::AggrError;
use crate::types::{
    Address, NativeOrder, NativeOrderType, NativeOrderWithFillableAmounts, Side, SignedNativeOrder,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RfqRequest {
    pub side: Side,
    pub maker_token: Address,
    pub taker_token: Address,
    /// Taker amount on sells, maker amount on buys.
    pub asset_fill_amount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comparison_price: Option<Decimal>,
    pub taker_address: Address,
    pub tx_origin: Address,
    #[serde(default)]
    pub intent_on_filling: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrator_id: Option<String>,
}

/// Unsigned price a maker is willing to quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicativeQuote {
    pub maker_token: Address,
    pub taker_token: Address,
    pub maker_amount: Decimal,
    pub taker_amount: Decimal,
    /// Unix seconds.
    pub expiry: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maker_uri: Option<String>,
}

impl IndicativeQuote {
    /// Candidate RFQ order for routing. Fully fillable, carries no signature.
    pub fn to_native_order(&self) -> NativeOrderWithFillableAmounts {
        NativeOrderWithFillableAmounts {
            signed: SignedNativeOrder {
                order: NativeOrder {
                    maker: self.maker_uri.clone().unwrap_or_default(),
                    maker_token: self.maker_token.clone(),
                    taker_token: self.taker_token.clone(),
                    maker_amount: self.maker_amount,
                    taker_amount: self.taker_amount,
                    taker_token_fee_amount: Decimal::ZERO,
                    expiry: self.expiry,
                },
                signature: None,
                order_type: NativeOrderType::Rfq,
            },
            fillable_maker_amount: self.maker_amount,
            fillable_taker_amount: self.taker_amount,
            fillable_taker_fee_amount: Decimal::ZERO,
        }
    }
}

/// Signed, fillable order returned by a maker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirmQuote {
    pub order: SignedNativeOrder,
    pub maker_uri: String,
}

impl FirmQuote {
    /// Fillable up to the full taker amount.
    pub fn into_fillable(self) -> NativeOrderWithFillableAmounts {
        let taker_amount = self.order.order.taker_amount;
        self.order.with_fillable_taker_amount(taker_amount)
    }
}

#[async_trait]
pub trait QuoteRequestor: Send + Sync {
    async fn get_indicative_quotes(&self, req: &RfqRequest) -> Result<Vec<IndicativeQuote>, AggrError>;

    async fn get_firm_quotes(&self, req: &RfqRequest) -> Result<Vec<FirmQuote>, AggrError>;
}

/// Quote sanity shared by every requestor: right pair, positive amounts and
/// not expired at `now` (unix seconds).
pub fn is_valid_quote(
    req: &RfqRequest,
    maker_token: &str,
    taker_token: &str,
    maker_amount: Decimal,
    taker_amount: Decimal,
    expiry: u64,
    now: u64,
) -> bool {
    maker_token.eq_ignore_ascii_case(&req.maker_token)
        && taker_token.eq_ignore_ascii_case(&req.taker_token)
        && maker_amount > Decimal::ZERO
        && taker_amount > Decimal::ZERO
        && expiry > now
}
