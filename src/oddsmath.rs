//! Pure odds math: American/decimal conversions, vig removal, edge, Kelly, arbitrage.
//!
//! Every routine here is deterministic and side-effect free — no I/O, no clock reads —
//! so it is exercised directly by unit tests rather than through a harness.

use rust_decimal::prelude::*;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OddsMathError {
    #[error("american price cannot be zero")]
    ZeroPrice,
    #[error("decimal odds must be greater than 1.0, got {0}")]
    InvalidDecimal(String),
    #[error("two-way implied probabilities must sum to more than 1.0 to remove vig, got {0}")]
    NoVigToRemove(String),
    #[error("cannot remove vig from an empty outcome set")]
    EmptyOutcomeSet,
    #[error("decimal odds must be positive to compute payout ratio")]
    NonPositiveOdds,
}

/// American odds -> decimal odds. `p=0` is an error; the rest of the system never
/// constructs a zero-price RawOdds, so this is the only place that validates it.
pub fn american_to_decimal(p: i32) -> Result<Decimal, OddsMathError> {
    if p == 0 {
        return Err(OddsMathError::ZeroPrice);
    }
    let price = Decimal::from(p);
    let decimal = if p > 0 {
        price / dec!(100) + Decimal::ONE
    } else {
        dec!(100) / price.abs() + Decimal::ONE
    };
    Ok(decimal)
}

/// Decimal odds -> American odds, rounded to the nearest integer.
pub fn decimal_to_american(decimal: Decimal) -> Result<i32, OddsMathError> {
    if decimal <= Decimal::ONE {
        return Err(OddsMathError::InvalidDecimal(decimal.to_string()));
    }
    let american = if decimal >= dec!(2) {
        (decimal - Decimal::ONE) * dec!(100)
    } else {
        dec!(-100) / (decimal - Decimal::ONE)
    };
    let rounded = american.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    rounded
        .to_i32()
        .ok_or_else(|| OddsMathError::InvalidDecimal(decimal.to_string()))
}

/// Implied probability of an American price: `1 / decimal`.
pub fn implied(p: i32) -> Result<Decimal, OddsMathError> {
    let decimal = american_to_decimal(p)?;
    Ok(Decimal::ONE / decimal)
}

/// Remove vig from a two-way market via the multiplicative method.
///
/// Requires `q1 + q2 > 1` (i.e. there is vig to remove); the normalizer is expected
/// to skip this call entirely rather than treat a failure here as an error, since a
/// missing opposite side is a precondition-not-met case, not a domain error.
pub fn remove_vig_multiplicative(q1: Decimal, q2: Decimal) -> Result<(Decimal, Decimal), OddsMathError> {
    let total = q1 + q2;
    if total <= Decimal::ONE {
        return Err(OddsMathError::NoVigToRemove(total.to_string()));
    }
    Ok((q1 / total, q2 / total))
}

/// Remove vig from an N-way market via the additive method (three-way moneylines).
pub fn remove_vig_additive(qs: &[Decimal]) -> Result<Vec<Decimal>, OddsMathError> {
    if qs.is_empty() {
        return Err(OddsMathError::EmptyOutcomeSet);
    }
    let total: Decimal = qs.iter().sum();
    let n = Decimal::from(qs.len());
    let overround_share = (total - Decimal::ONE) / n;
    Ok(qs.iter().map(|q| q - overround_share).collect())
}

/// Edge as the ratio excess of a fair probability over an implied probability.
pub fn edge(fair: Decimal, implied_prob: Decimal) -> Decimal {
    if implied_prob == Decimal::ZERO {
        return Decimal::ZERO;
    }
    fair / implied_prob - Decimal::ONE
}

/// Raw (full) Kelly fraction: `(b*p - (1-p)) / b`, `b` = net decimal odds minus one.
/// A negative result means "no bet" — callers are expected to check the sign.
pub fn kelly_fraction(decimal_odds: Decimal, win_prob: Decimal) -> Result<Decimal, OddsMathError> {
    let b = decimal_odds - Decimal::ONE;
    if b <= Decimal::ZERO {
        return Err(OddsMathError::NonPositiveOdds);
    }
    let lose_prob = Decimal::ONE - win_prob;
    Ok((b * win_prob - lose_prob) / b)
}

/// Result of an arbitrage check across N opposing decimal prices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arbitrage {
    pub is_arbitrage: bool,
    pub implied_sum: Decimal,
    /// Stake fraction to allocate to each leg (sums to 1.0), in input order.
    pub stake_fractions: Vec<Decimal>,
}

/// Check a set of opposing decimal odds for arbitrage and, if present, compute the
/// proportional stake allocation that guarantees equal payout regardless of outcome.
pub fn arbitrage(decimals: &[Decimal]) -> Arbitrage {
    let inverses: Vec<Decimal> = decimals.iter().map(|dd| Decimal::ONE / dd).collect();
    let implied_sum: Decimal = inverses.iter().sum();
    let is_arbitrage = implied_sum < Decimal::ONE;
    let stake_fractions = if implied_sum == Decimal::ZERO {
        vec![Decimal::ZERO; decimals.len()]
    } else {
        inverses.iter().map(|inv| inv / implied_sum).collect()
    };
    Arbitrage {
        is_arbitrage,
        implied_sum,
        stake_fractions,
    }
}

/// Round a currency amount to cents using nearest-half-away-from-zero, the single
/// rounding mode used everywhere in this pipeline for consistency (see DESIGN.md).
pub fn round_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn american_to_decimal_positive() {
        assert_eq!(american_to_decimal(100).unwrap(), dec!(2));
        assert_eq!(american_to_decimal(150).unwrap(), dec!(2.5));
    }

    #[test]
    fn american_to_decimal_negative() {
        assert_eq!(american_to_decimal(-110).unwrap(), dec!(1.909090909090909090909090909));
        assert_eq!(american_to_decimal(-200).unwrap(), dec!(1.5));
    }

    #[test]
    fn american_to_decimal_zero_is_error() {
        assert_eq!(american_to_decimal(0), Err(OddsMathError::ZeroPrice));
    }

    #[test]
    fn decimal_to_american_round_trip() {
        for p in [100, -100, 110, -110, 150, -150, 200, -200, 300, -300] {
            let decimal = american_to_decimal(p).unwrap();
            let back = decimal_to_american(decimal).unwrap();
            assert_eq!(back, p, "round-trip failed for {p}");
        }
    }

    #[test]
    fn implied_is_between_zero_and_one() {
        for p in [100, -100, 110, -110, 1000, -1000] {
            let q = implied(p).unwrap();
            assert!(q > Decimal::ZERO && q < Decimal::ONE, "q={q} out of range for p={p}");
        }
    }

    #[test]
    fn remove_vig_multiplicative_sums_to_one() {
        let q1 = implied(-110).unwrap();
        let q2 = implied(-110).unwrap();
        let (f1, f2) = remove_vig_multiplicative(q1, q2).unwrap();
        assert!((f1 + f2 - Decimal::ONE).abs() < dec!(0.000000001));
        assert!(f1 > Decimal::ZERO && f1 < Decimal::ONE);
        assert!(f2 > Decimal::ZERO && f2 < Decimal::ONE);
        assert!((f1 - dec!(0.5)).abs() < dec!(0.001));
    }

    #[test]
    fn remove_vig_multiplicative_requires_overround() {
        let result = remove_vig_multiplicative(dec!(0.4), dec!(0.4));
        assert!(result.is_err());
    }

    #[test]
    fn remove_vig_additive_three_way_sums_to_one() {
        let qs = vec![dec!(0.40), dec!(0.35), dec!(0.30)];
        let fair = remove_vig_additive(&qs).unwrap();
        let sum: Decimal = fair.iter().sum();
        assert!((sum - Decimal::ONE).abs() < dec!(0.000000001));
    }

    #[test]
    fn remove_vig_additive_rejects_empty() {
        assert!(remove_vig_additive(&[]).is_err());
    }

    #[test]
    fn edge_is_zero_when_fair_equals_implied() {
        assert_eq!(edge(dec!(0.5), dec!(0.5)), Decimal::ZERO);
    }

    #[test]
    fn edge_is_positive_when_fair_exceeds_implied() {
        let e = edge(dec!(0.55), dec!(0.50));
        assert!(e > Decimal::ZERO);
        assert!((e - dec!(0.1)).abs() < dec!(0.0001));
    }

    #[test]
    fn edge_is_monotonically_decreasing_in_implied() {
        let fair = dec!(0.55);
        let e_low = edge(fair, dec!(0.40));
        let e_high = edge(fair, dec!(0.60));
        assert!(e_low > e_high);
    }

    #[test]
    fn kelly_fraction_positive_edge() {
        // Market at 40% implied, true prob 60%: big edge, positive Kelly.
        let decimal_odds = american_to_decimal(150).unwrap();
        let f = kelly_fraction(decimal_odds, dec!(0.6)).unwrap();
        assert!(f > Decimal::ZERO);
    }

    #[test]
    fn kelly_fraction_negative_when_no_edge() {
        let decimal_odds = american_to_decimal(-110).unwrap();
        let f = kelly_fraction(decimal_odds, dec!(0.45)).unwrap();
        assert!(f < Decimal::ZERO);
    }

    #[test]
    fn arbitrage_detects_guaranteed_profit() {
        // Scenario 3 from the testable-properties scenarios: both sides at +110.
        let d1 = american_to_decimal(110).unwrap();
        let d2 = american_to_decimal(110).unwrap();
        let arb = arbitrage(&[d1, d2]);
        assert!(arb.is_arbitrage);
        assert!((arb.implied_sum - dec!(0.952380952380952380952380952)).abs() < dec!(0.0000001));
        assert_eq!(arb.stake_fractions.len(), 2);
        assert!((arb.stake_fractions[0] - dec!(0.5)).abs() < dec!(0.0001));
    }

    #[test]
    fn arbitrage_is_false_when_implied_sum_exceeds_one() {
        let d1 = american_to_decimal(-110).unwrap();
        let d2 = american_to_decimal(-110).unwrap();
        let arb = arbitrage(&[d1, d2]);
        assert!(!arb.is_arbitrage);
    }

    #[test]
    fn round_cents_uses_midpoint_away_from_zero() {
        assert_eq!(round_cents(dec!(1.005)), dec!(1.01));
        assert_eq!(round_cents(dec!(-1.005)), dec!(-1.01));
    }

    #[test]
    fn scenario_two_way_vig_removal_minus_110() {
        let q = implied(-110).unwrap();
        let (f1, f2) = remove_vig_multiplicative(q, q).unwrap();
        assert!((f1 - dec!(0.5)).abs() < dec!(0.001));
        let fair_price = decimal_to_american(Decimal::ONE / f1).unwrap();
        assert!((fair_price - 100).abs() <= 1);
        let e = edge(f1, q);
        assert!((e - dec!(-0.0455)).abs() < dec!(0.002));
    }
}
