//! Kelly criterion stake sizing for edge, middle, and scalp opportunities.
//!
//! Edge and middle sizing both size against a bankroll using fractional Kelly;
//! scalp sizing ignores Kelly entirely and splits a caller-supplied total stake
//! to equalize payout across legs, since an arbitrage has no probability to be
//! uncertain about.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use thiserror::Error;

use crate::config::KellyConfig;
use crate::oddsmath::{self, OddsMathError};
use crate::types::{Opportunity, OpportunityLeg, OpportunityType};

#[derive(Debug, Error)]
pub enum KellyError {
    #[error("edge {edge_pct}% is below the minimum {min_edge_pct}%")]
    EdgeTooSmall { edge_pct: Decimal, min_edge_pct: Decimal },
    #[error("kelly fraction is not positive for this price and fair probability")]
    NonPositiveKelly,
    #[error("legs do not form a guaranteed arbitrage")]
    NotArbitrage,
    #[error("bankroll or total stake must be positive")]
    NonPositiveInput,
    #[error("opportunity has no legs to size")]
    NoLegs,
    #[error(transparent)]
    OddsMath(#[from] OddsMathError),
}

#[derive(Debug, Clone, Serialize)]
pub struct LegStake {
    pub book_key: String,
    pub outcome_name: String,
    pub stake: Decimal,
}

/// One record shape for all three modes; fields that only apply to a subset of
/// modes (`confidence` for edge, `guaranteed_profit` for scalp) are `None` otherwise.
#[derive(Debug, Clone, Serialize)]
pub struct KellyResponse {
    pub mode: OpportunityType,
    pub stakes: Vec<LegStake>,
    pub total_stake: Decimal,
    pub guaranteed_profit: Option<Decimal>,
    pub confidence: Option<Decimal>,
    pub warnings: Vec<String>,
}

/// `stake_input` is a bankroll for edge/middle, and a total stake to split for scalp —
/// the two modes don't share a unit, so the caller picks which one it means by the
/// opportunity's own type.
pub fn size_opportunity(
    opportunity: &Opportunity,
    stake_input: Decimal,
    kelly_fraction: Decimal,
    config: &KellyConfig,
) -> Result<KellyResponse, KellyError> {
    if stake_input <= Decimal::ZERO {
        return Err(KellyError::NonPositiveInput);
    }
    if opportunity.legs.is_empty() {
        return Err(KellyError::NoLegs);
    }

    match opportunity.opportunity_type {
        OpportunityType::Edge => size_edge(opportunity, stake_input, kelly_fraction, config),
        OpportunityType::Middle => size_middle(opportunity, stake_input, kelly_fraction, config),
        OpportunityType::Scalp => size_scalp(opportunity, stake_input),
    }
}

fn size_edge(
    opportunity: &Opportunity,
    bankroll: Decimal,
    kelly_fraction: Decimal,
    config: &KellyConfig,
) -> Result<KellyResponse, KellyError> {
    if opportunity.edge_percent < config.min_edge_pct {
        return Err(KellyError::EdgeTooSmall {
            edge_pct: opportunity.edge_percent,
            min_edge_pct: config.min_edge_pct,
        });
    }

    let leg = &opportunity.legs[0];
    let sized = size_leg(leg, opportunity.edge_percent, bankroll, kelly_fraction, config)?;

    let mut warnings = sized.warnings;
    if opportunity.edge_percent < dec!(2.0) {
        warnings.push(format!("edge {}% is thin, below the usual 2% comfort margin", opportunity.edge_percent));
    }

    Ok(KellyResponse {
        mode: OpportunityType::Edge,
        stakes: vec![LegStake {
            book_key: leg.book_key.clone(),
            outcome_name: leg.outcome_name.clone(),
            stake: sized.stake,
        }],
        total_stake: sized.stake,
        guaranteed_profit: None,
        confidence: Some(sized.fair_probability),
        warnings,
    })
}

fn size_middle(
    opportunity: &Opportunity,
    bankroll: Decimal,
    kelly_fraction: Decimal,
    config: &KellyConfig,
) -> Result<KellyResponse, KellyError> {
    let even_split = opportunity.edge_percent / Decimal::from(opportunity.legs.len() as i64);

    let mut stakes = Vec::with_capacity(opportunity.legs.len());
    let mut warnings = Vec::new();
    let mut total = Decimal::ZERO;

    for leg in &opportunity.legs {
        let leg_edge_pct = leg.leg_edge.unwrap_or(even_split);
        match size_leg(leg, leg_edge_pct, bankroll, kelly_fraction, config) {
            Ok(sized) => {
                total += sized.stake;
                warnings.extend(sized.warnings);
                stakes.push(LegStake {
                    book_key: leg.book_key.clone(),
                    outcome_name: leg.outcome_name.clone(),
                    stake: sized.stake,
                });
            }
            Err(e) => {
                warnings.push(format!("{}: no stake sized for leg at {}", e, leg.book_key));
                stakes.push(LegStake {
                    book_key: leg.book_key.clone(),
                    outcome_name: leg.outcome_name.clone(),
                    stake: Decimal::ZERO,
                });
            }
        }
    }

    Ok(KellyResponse {
        mode: OpportunityType::Middle,
        stakes,
        total_stake: oddsmath::round_cents(total),
        guaranteed_profit: None,
        confidence: None,
        warnings,
    })
}

fn size_scalp(opportunity: &Opportunity, total_stake: Decimal) -> Result<KellyResponse, KellyError> {
    let decimals: Vec<Decimal> = opportunity
        .legs
        .iter()
        .map(|leg| oddsmath::american_to_decimal(leg.price))
        .collect::<Result<_, _>>()?;

    let arb = oddsmath::arbitrage(&decimals);
    if !arb.is_arbitrage {
        return Err(KellyError::NotArbitrage);
    }

    let stakes = opportunity
        .legs
        .iter()
        .zip(arb.stake_fractions.iter())
        .map(|(leg, fraction)| LegStake {
            book_key: leg.book_key.clone(),
            outcome_name: leg.outcome_name.clone(),
            stake: oddsmath::round_cents(total_stake * fraction),
        })
        .collect();

    let guaranteed_profit = oddsmath::round_cents(total_stake * (Decimal::ONE - arb.implied_sum));

    Ok(KellyResponse {
        mode: OpportunityType::Scalp,
        stakes,
        total_stake: oddsmath::round_cents(total_stake),
        guaranteed_profit: Some(guaranteed_profit),
        confidence: None,
        warnings: Vec::new(),
    })
}

struct SizedLeg {
    stake: Decimal,
    fair_probability: Decimal,
    warnings: Vec<String>,
}

/// `edge_pct` is the percent edge attributed to this single leg (the full opportunity
/// edge for a 1-leg edge bet, or a per-leg share for a middle).
fn size_leg(
    leg: &OpportunityLeg,
    edge_pct: Decimal,
    bankroll: Decimal,
    kelly_fraction: Decimal,
    config: &KellyConfig,
) -> Result<SizedLeg, KellyError> {
    let decimal_odds = oddsmath::american_to_decimal(leg.price)?;
    let implied = oddsmath::implied(leg.price)?;
    let edge_fraction = edge_pct / dec!(100);
    let fair_probability = (Decimal::ONE + edge_fraction) * implied;

    if fair_probability >= Decimal::ONE {
        return Err(KellyError::NonPositiveKelly);
    }

    let raw_kelly = oddsmath::kelly_fraction(decimal_odds, fair_probability)?;
    if raw_kelly <= Decimal::ZERO {
        return Err(KellyError::NonPositiveKelly);
    }

    let max_fraction = config.max_pct / dec!(100);
    let bet_fraction = (raw_kelly * kelly_fraction).min(max_fraction);
    let stake = oddsmath::round_cents(bankroll * bet_fraction);

    let mut warnings = Vec::new();
    if stake > bankroll * dec!(0.05) {
        warnings.push(format!("stake {stake} exceeds 5% of bankroll {bankroll}"));
    }
    if (fair_probability - dec!(0.5)).abs() > dec!(0.4) {
        warnings.push(format!("fair probability {fair_probability} is far from even money"));
    }

    Ok(SizedLeg { stake, fair_probability, warnings })
}
