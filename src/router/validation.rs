// Quote request validation module
// Checks an incoming quote request before any liquidity is sampled
//
// Numan Thabit 2025 Nov

use crate::errors::AggrError;
use crate::router::router::QuoteRequest;
use crate::types::Source;
use rust_decimal::Decimal;
use std::collections::HashSet;
use tracing::debug;

#[derive(Debug, Default)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
        }
    }

    pub fn add_error(&mut self, error: String) {
        self.is_valid = false;
        self.errors.push(error);
    }

    pub fn into_result(self) -> Result<(), AggrError> {
        if self.is_valid {
            Ok(())
        } else {
            Err(AggrError::InvalidRequest(self.errors.join("; ")))
        }
    }
}

/// Collect every problem with `req`. A request without reference orders is
/// rejected outright since no pair can be derived from it.
pub fn validate_quote_request(req: &QuoteRequest) -> Result<ValidationResult, AggrError> {
    let first = req.orders.first().ok_or(AggrError::EmptyOrders)?;
    let mut result = ValidationResult::new();

    if req.amount <= Decimal::ZERO {
        result.add_error(format!("amount must be positive, got {}", req.amount));
    }
    if req.amount.fract() != Decimal::ZERO {
        result.add_error(format!("amount must be in base units, got {}", req.amount));
    }

    let (maker_token, taker_token) = (&first.order.maker_token, &first.order.taker_token);
    if maker_token.eq_ignore_ascii_case(taker_token) {
        result.add_error(format!("maker and taker token are both {maker_token}"));
    }
    for (i, signed) in req.orders.iter().enumerate().skip(1) {
        let o = &signed.order;
        if !o.maker_token.eq_ignore_ascii_case(maker_token) || !o.taker_token.eq_ignore_ascii_case(taker_token) {
            result.add_error(format!("order {i} trades a different pair"));
        }
    }

    let excluded: HashSet<Source> = req.excluded_sources.iter().copied().collect();
    if let Some(both) = req.included_sources.iter().find(|s| excluded.contains(s)) {
        result.add_error(format!("{both} is both included and excluded"));
    }

    if let Some(slippage) = req.slippage {
        if slippage < Decimal::ZERO || slippage > Decimal::ONE {
            result.add_error(format!("slippage must be within [0, 1], got {slippage}"));
        }
    }

    if let Some(rfqt) = &req.rfqt {
        if rfqt.taker_address.is_empty() {
            result.add_error("rfqt.taker_address is required".into());
        }
        if rfqt.tx_origin.is_empty() {
            result.add_error("rfqt.tx_origin is required".into());
        }
    }

    if !result.is_valid {
        debug!(errors = ?result.errors, "quote request rejected");
    }
    Ok(result)
}
