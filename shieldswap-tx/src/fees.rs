//! Fee arithmetic.
//!
//! Every fee is exact integer math on token minor units, rounded down. Fees
//! are layered in a fixed order:
//!
//! 1. protocol unshield fee (basis points), only when value leaves the pool
//! 2. application fee (basis points) on what remains
//! 3. relay fee, deducted here only when it is paid in the spent token
//!
//! The application and relay fees are paid inside the proof. The protocol fee
//! is withheld by the pool contract from the unshielded amount, so the proof
//! carries [`FeeBreakdown::unshield_amount`] and the pool delivers
//! [`FeeBreakdown::adjusted_amount`].

use ethers::types::{Address, U256, U512};
use serde::Serialize;
use shieldswap_common::{RelayQuote, BASIS_POINTS};

use crate::error::TxError;

/// Where the relay fee comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "source", content = "token")]
pub enum FeeSource {
    /// Deducted from the amount being spent.
    SpentToken,
    /// Paid from the shielded balance of another token.
    SeparateToken(Address),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeeInputs {
    pub amount: U256,
    /// Zero when the operation does not leave the pool.
    pub protocol_fee_bps: u32,
    pub application_fee_bps: u32,
    pub relay_fee: U256,
    pub relay_fee_source: FeeSource,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct FeeBreakdown {
    pub original_amount: U256,
    pub protocol_fee: U256,
    pub application_fee: U256,
    pub relay_fee: U256,
    pub relay_fee_source: FeeSource,
    /// Gross amount leaving the shielded balance, before the pool's fee.
    pub unshield_amount: U256,
    /// What arrives at the recipient.
    pub adjusted_amount: U256,
}

impl FeeBreakdown {
    /// Fees taken out of the spent token.
    pub fn deducted(&self) -> U256 {
        self.original_amount - self.adjusted_amount
    }
}

/// `a * b / c` without intermediate overflow, rounded down.
fn mul_div(a: U256, b: U256, c: U256) -> U256 {
    if c.is_zero() {
        return U256::zero();
    }
    let wide = a.full_mul(b) / U512::from(c);
    // `b <= c` at every call site, so the result never exceeds `a`.
    U256::try_from(wide).unwrap_or(a)
}

/// `amount` after a basis-point fee: `floor(amount * (10000 - bps) / 10000)`.
pub fn amount_after_bps(amount: U256, bps: u32) -> U256 {
    let bps = bps.min(BASIS_POINTS);
    mul_div(
        amount,
        U256::from(BASIS_POINTS - bps),
        U256::from(BASIS_POINTS),
    )
}

/// `fee_per_unit_gas * gas_estimate * gas_price / fee_rate_scale`.
pub fn relay_fee(quote: &RelayQuote, gas_estimate: U256, gas_price: U256) -> U256 {
    let scale = if quote.fee_rate_scale.is_zero() {
        U256::one()
    } else {
        quote.fee_rate_scale
    };
    quote
        .fee_per_unit_gas
        .saturating_mul(gas_estimate)
        .saturating_mul(gas_price)
        / scale
}

/// `min_out * adjusted / original`, so slippage protection follows the
/// reduced input.
pub fn scale_min_out(min_out: U256, adjusted: U256, original: U256) -> U256 {
    if original.is_zero() || adjusted >= original {
        return min_out;
    }
    mul_div(min_out, adjusted, original)
}

pub fn layer_fees(inputs: FeeInputs) -> Result<FeeBreakdown, TxError> {
    let after_protocol = amount_after_bps(inputs.amount, inputs.protocol_fee_bps);
    let after_application = amount_after_bps(after_protocol, inputs.application_fee_bps);
    let application_fee = after_protocol - after_application;

    let own_token_relay_fee = match inputs.relay_fee_source {
        FeeSource::SpentToken => inputs.relay_fee,
        FeeSource::SeparateToken(_) => U256::zero(),
    };
    let unshield_amount = inputs
        .amount
        .checked_sub(application_fee.saturating_add(own_token_relay_fee))
        .unwrap_or_default();
    // Same rounding as the pool contract applies on-chain.
    let adjusted_amount = amount_after_bps(unshield_amount, inputs.protocol_fee_bps);
    let protocol_fee = unshield_amount - adjusted_amount;

    if adjusted_amount.is_zero() {
        return Err(TxError::AmountTooSmallAfterFees {
            amount: inputs.amount,
            fees: protocol_fee
                .saturating_add(application_fee)
                .saturating_add(own_token_relay_fee),
        });
    }

    Ok(FeeBreakdown {
        original_amount: inputs.amount,
        protocol_fee,
        application_fee,
        relay_fee: inputs.relay_fee,
        relay_fee_source: inputs.relay_fee_source,
        unshield_amount,
        adjusted_amount,
    })
}
