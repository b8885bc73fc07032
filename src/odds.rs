//! Odds conversion and stake-sizing math
//!
//! Stateless conversions between American odds, decimal odds, and implied
//! probability, plus Kelly-criterion stake sizing. All detection math is
//! built on these primitives.
//!
//! American odds conventions:
//! - Positive (+150): profit per 100 staked. Implied prob = 100 / (odds + 100)
//! - Negative (-120): stake per 100 profit. Implied prob = |odds| / (|odds| + 100)
//! - Zero is never a valid quote.

use crate::error::DetectError;

/// Floating tolerance for round-trip conversions
pub const ODDS_EPSILON: f64 = 1e-9;

/// Kelly stake cap: never suggest more than 10% of bankroll
pub const MAX_KELLY_FRACTION: f64 = 0.10;

// =============================================================================
// Validation
// =============================================================================

/// Reject odds that cannot be a quote: zero and non-finite values.
///
/// Magnitudes below 100 are tolerated — some feeds emit prices like -90
/// mid-move — the conversion formulas remain well-defined there.
pub fn validate_american(odds: f64) -> Result<(), DetectError> {
    if odds == 0.0 {
        return Err(DetectError::InvalidOdds {
            odds,
            reason: "American odds cannot be zero".to_string(),
        });
    }
    if !odds.is_finite() {
        return Err(DetectError::InvalidOdds {
            odds,
            reason: "American odds must be finite".to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// American <-> implied probability
// =============================================================================

/// Implied probability of American odds, in (0, 1).
pub fn american_to_implied(odds: f64) -> Result<f64, DetectError> {
    validate_american(odds)?;
    if odds > 0.0 {
        Ok(100.0 / (odds + 100.0))
    } else {
        let abs = odds.abs();
        Ok(abs / (abs + 100.0))
    }
}

/// American odds equivalent of a probability in (0, 1).
///
/// Probabilities up to 0.5 map to positive odds, above 0.5 to negative.
/// Both +100 and -100 imply exactly 0.5; the inverse returns +100.
pub fn implied_to_american(prob: f64) -> Result<f64, DetectError> {
    if !prob.is_finite() || prob <= 0.0 || prob >= 1.0 {
        return Err(DetectError::InvalidOdds {
            odds: prob,
            reason: "implied probability must be in (0, 1)".to_string(),
        });
    }
    if prob <= 0.5 {
        Ok(100.0 / prob - 100.0)
    } else {
        Ok(-(prob * 100.0) / (1.0 - prob))
    }
}

// =============================================================================
// American <-> decimal odds
// =============================================================================

/// Decimal (European) odds for American odds: total return per unit staked.
pub fn american_to_decimal(odds: f64) -> Result<f64, DetectError> {
    validate_american(odds)?;
    if odds > 0.0 {
        Ok(1.0 + odds / 100.0)
    } else {
        Ok(1.0 + 100.0 / odds.abs())
    }
}

/// American odds for decimal odds > 1.0.
pub fn decimal_to_american(decimal: f64) -> Result<f64, DetectError> {
    if !decimal.is_finite() || decimal <= 1.0 {
        return Err(DetectError::InvalidOdds {
            odds: decimal,
            reason: "decimal odds must be > 1.0".to_string(),
        });
    }
    if decimal >= 2.0 {
        Ok((decimal - 1.0) * 100.0)
    } else {
        Ok(-100.0 / (decimal - 1.0))
    }
}

/// Gross payout (stake included) for a winning bet of `stake` at `odds`.
pub fn payout(stake: f64, odds: f64) -> Result<f64, DetectError> {
    Ok(stake * american_to_decimal(odds)?)
}

// =============================================================================
// Kelly stake sizing
// =============================================================================

/// Kelly-criterion bankroll fraction for a bet with `edge` at `odds`,
/// clamped to [0, 0.10].
///
/// f* = edge / b where b is the net decimal payout. A non-positive edge
/// sizes to zero rather than erroring: no bet is a valid answer.
pub fn kelly_stake(edge: f64, odds: f64) -> Result<f64, DetectError> {
    let b = american_to_decimal(odds)? - 1.0;
    if b <= 0.0 || edge <= 0.0 {
        return Ok(0.0);
    }
    Ok((edge / b).clamp(0.0, MAX_KELLY_FRACTION))
}
