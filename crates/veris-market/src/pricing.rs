//! Bonding curve quotes and trading fees.
//!
//! Each outcome has its own quadratic cost curve over its share supply `q`:
//!
//! ```text
//! price(q)      = SHARE_UNIT * q / K
//! C(q)          = SHARE_UNIT * q^2 / (2K)
//! cost(q, s)    = ceil (SHARE_UNIT * s * (2q + s) / (2K))    = C(q + s) - C(q), rounded up
//! refund(q, s)  = floor(SHARE_UNIT * s * (2q - s) / (2K))    = C(q) - C(q - s), rounded down
//! ```
//!
//! A market seeded with `q0` shares per side uses `K = 2 * q0`, which opens
//! both outcomes at half a share unit. Rounding costs up and refunds down
//! keeps the pool at or above `C(q_yes) + C(q_no)` and makes a buy followed
//! by a sell of the same size never profitable.

use serde::{Deserialize, Serialize};
use veris_types::{Amount, BPS_DENOMINATOR, UNITS_PER_TOKEN};

use crate::{MarketError, Result};

/// Base units paid out per winning share at a full-price outcome.
pub const SHARE_UNIT: Amount = UNITS_PER_TOKEN;

/// A priced trade.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    /// Curve amount before fees.
    pub gross: Amount,
    /// Trading fee.
    pub fee: Amount,
    /// What the trader pays (buy) or receives (sell).
    pub net: Amount,
}

fn to_amount(value: u128, what: &'static str) -> Result<Amount> {
    Amount::try_from(value).map_err(|_| MarketError::Overflow(what))
}

/// Curve constant for a market seeded with `seed_shares` per side.
pub fn curve_constant(seed_shares: u64) -> Result<u64> {
    seed_shares
        .checked_mul(2)
        .ok_or(MarketError::Overflow("curve constant"))
}

/// Marginal price of the next share at supply `supply`, in base units.
pub fn marginal_price(supply: u64, k: u64) -> Amount {
    let price = u128::from(SHARE_UNIT) * u128::from(supply) / u128::from(k.max(1));
    Amount::try_from(price).unwrap_or(Amount::MAX)
}

/// Numerator `SHARE_UNIT * s * (2q ± s)` shared by cost and refund.
fn curve_numerator(supply: u64, shares: u64, buying: bool) -> Result<u128> {
    let twice = u128::from(supply) * 2;
    let span = if buying {
        twice + u128::from(shares)
    } else {
        twice
            .checked_sub(u128::from(shares))
            .ok_or(MarketError::InsufficientShares {
                held: supply,
                requested: shares,
            })?
    };
    u128::from(SHARE_UNIT)
        .checked_mul(u128::from(shares))
        .and_then(|x| x.checked_mul(span))
        .ok_or(MarketError::Overflow("curve"))
}

/// Curve cost of buying `shares` at supply `supply`, rounded up.
///
/// # Errors
///
/// - [`MarketError::Overflow`] if the cost exceeds an [`Amount`]
pub fn curve_cost(supply: u64, shares: u64, k: u64) -> Result<Amount> {
    let numerator = curve_numerator(supply, shares, true)?;
    let denominator = u128::from(k) * 2;
    if denominator == 0 {
        return Err(MarketError::InvalidParams("curve constant is zero".to_string()));
    }
    to_amount(numerator.div_ceil(denominator), "cost")
}

/// Curve refund for selling `shares` at supply `supply`, rounded down.
///
/// # Errors
///
/// - [`MarketError::InsufficientShares`] if `shares > supply`
/// - [`MarketError::Overflow`] if the refund exceeds an [`Amount`]
pub fn curve_refund(supply: u64, shares: u64, k: u64) -> Result<Amount> {
    if shares > supply {
        return Err(MarketError::InsufficientShares {
            held: supply,
            requested: shares,
        });
    }
    let numerator = curve_numerator(supply, shares, false)?;
    let denominator = u128::from(k) * 2;
    if denominator == 0 {
        return Err(MarketError::InvalidParams("curve constant is zero".to_string()));
    }
    to_amount(numerator / denominator, "refund")
}

/// Fee of `fee_bps` on `amount`, rounded up.
pub fn trade_fee(amount: Amount, fee_bps: u64) -> Amount {
    let fee = (u128::from(amount) * u128::from(fee_bps)).div_ceil(u128::from(BPS_DENOMINATOR));
    Amount::try_from(fee).unwrap_or(Amount::MAX)
}

/// Price a purchase of `shares` at supply `supply`.
///
/// # Errors
///
/// - [`MarketError::Overflow`] if the total exceeds an [`Amount`]
pub fn quote_buy(supply: u64, shares: u64, k: u64, fee_bps: u64) -> Result<Quote> {
    let gross = curve_cost(supply, shares, k)?;
    let fee = trade_fee(gross, fee_bps);
    let net = gross
        .checked_add(fee)
        .ok_or(MarketError::Overflow("cost"))?;
    Ok(Quote { gross, fee, net })
}

/// Price a sale of `shares` at supply `supply`.
///
/// The fee never exceeds the refund.
///
/// # Errors
///
/// - [`MarketError::InsufficientShares`] if `shares > supply`
pub fn quote_sell(supply: u64, shares: u64, k: u64, fee_bps: u64) -> Result<Quote> {
    let gross = curve_refund(supply, shares, k)?;
    let fee = trade_fee(gross, fee_bps).min(gross);
    Ok(Quote {
        gross,
        fee,
        net: gross - fee,
    })
}

/// Smallest pool value that keeps both curves collateralised.
pub fn required_reserve(yes_supply: u64, no_supply: u64, k: u64) -> u128 {
    let squares = u128::from(yes_supply) * u128::from(yes_supply)
        + u128::from(no_supply) * u128::from(no_supply);
    u128::from(SHARE_UNIT).saturating_mul(squares) / (u128::from(k.max(1)) * 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    const Q0: u64 = 1_000;
    const K: u64 = 2 * Q0;

    #[test]
    fn test_opening_price_is_half() {
        assert_eq!(marginal_price(Q0, K), SHARE_UNIT / 2);
    }

    #[test]
    fn test_cost_matches_curve_integral() {
        // s = 10 at q = 1000: 1e6 * 10 * 2010 / 4000 = 5_025_000
        assert_eq!(curve_cost(Q0, 10, K).expect("cost"), 5_025_000);
        // Selling back from 1010: 1e6 * 10 * 2010 / 4000
        assert_eq!(curve_refund(Q0 + 10, 10, K).expect("refund"), 5_025_000);
    }

    #[test]
    fn test_cost_strictly_increasing() {
        let mut last = 0;
        for shares in 1..200 {
            let cost = curve_cost(Q0, shares, K).expect("cost");
            assert!(cost > last, "cost({shares}) = {cost} <= {last}");
            last = cost;
        }
    }

    #[test]
    fn test_refund_strictly_increasing() {
        let mut last = 0;
        for shares in 1..200 {
            let refund = curve_refund(Q0 + 500, shares, K).expect("refund");
            assert!(refund > last);
            last = refund;
        }
    }

    #[test]
    fn test_round_trip_never_profits() {
        for fee_bps in [0, 30, 500] {
            for shares in [1, 7, 333, 10_000] {
                let buy = quote_buy(Q0, shares, K, fee_bps).expect("buy");
                let sell = quote_sell(Q0 + shares, shares, K, fee_bps).expect("sell");
                assert!(sell.net <= buy.net);
            }
        }
    }

    #[test]
    fn test_rounding_favours_pool() {
        // K = 6 makes every division inexact.
        let cost = curve_cost(3, 1, 6).expect("cost");
        let refund = curve_refund(4, 1, 6).expect("refund");
        // 1e6 * 7 / 12 = 583_333.33
        assert_eq!(cost, 583_334);
        assert_eq!(refund, 583_333);
    }

    #[test]
    fn test_fee_rounds_up_and_caps() {
        assert_eq!(trade_fee(10_000, 30), 30);
        assert_eq!(trade_fee(1, 30), 1);
        assert_eq!(trade_fee(0, 30), 0);
        let sell = quote_sell(Q0, 1, K, 10_000).expect("sell");
        assert_eq!(sell.net, 0);
        assert_eq!(sell.fee, sell.gross);
    }

    #[test]
    fn test_sell_more_than_supply() {
        assert!(matches!(
            curve_refund(5, 6, K),
            Err(MarketError::InsufficientShares { held: 5, requested: 6 })
        ));
    }

    #[test]
    fn test_overflow_reported() {
        assert!(matches!(
            curve_cost(u64::MAX, u64::MAX, 2),
            Err(MarketError::Overflow(_))
        ));
    }

    #[test]
    fn test_reserve_at_seed() {
        // C(q0) + C(q0) = SHARE_UNIT * q0 / 2
        assert_eq!(required_reserve(Q0, Q0, K), u128::from(SHARE_UNIT * Q0 / 2));
    }
}
