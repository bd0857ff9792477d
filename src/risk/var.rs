//! Pluggable Value-at-Risk methods.
//!
//! Each method is a capability object constructed once at startup and
//! called from the hot path with no further lookup, per Design Note 9
//! ("Strategy objects ... pass as configured capability objects
//! constructed once; no runtime lookup in hot path") — the same shape the
//! teacher repo uses for `FeeConfig`.

use rust_decimal::Decimal;

/// Inputs a VaR method needs to estimate potential loss for a position.
#[derive(Debug, Clone)]
pub struct VarInputs {
    pub position_notional: Decimal,
    pub historical_returns: Vec<Decimal>,
    pub volatility: Decimal,
    pub confidence: Decimal,
}

pub trait VarMethod: Send + Sync {
    fn estimate(&self, inputs: &VarInputs) -> Decimal;
    fn name(&self) -> &'static str;
}

/// Quantile of historical simulated P&L.
pub struct HistoricalVar;

impl VarMethod for HistoricalVar {
    fn estimate(&self, inputs: &VarInputs) -> Decimal {
        if inputs.historical_returns.is_empty() {
            return Decimal::ZERO;
        }
        let mut returns = inputs.historical_returns.clone();
        returns.sort();
        let idx = ((Decimal::ONE - inputs.confidence) * Decimal::from(returns.len())).to_u32_floor();
        let idx = (idx as usize).min(returns.len() - 1);
        (-returns[idx] * inputs.position_notional).max(Decimal::ZERO)
    }

    fn name(&self) -> &'static str {
        "historical"
    }
}

/// Variance-covariance (delta-normal) estimate: z-score scaled by
/// volatility and notional. `z` is fixed at construction for the
/// configured confidence level (e.g. 2.33 for 99%).
pub struct ParametricVar {
    pub z_score: Decimal,
}

impl VarMethod for ParametricVar {
    fn estimate(&self, inputs: &VarInputs) -> Decimal {
        inputs.position_notional.abs() * inputs.volatility * self.z_score
    }

    fn name(&self) -> &'static str {
        "parametric"
    }
}

/// Monte Carlo estimate driven by pre-simulated scenario returns supplied
/// by the caller (the simulation itself runs out-of-band; this strategy
/// only does the quantile reduction, same computation as
/// [`HistoricalVar`] but kept distinct so callers can select it
/// independently of how the scenario set was produced).
pub struct MonteCarloVar {
    pub scenario_count: usize,
}

impl VarMethod for MonteCarloVar {
    fn estimate(&self, inputs: &VarInputs) -> Decimal {
        if inputs.historical_returns.len() < self.scenario_count.min(1) {
            return Decimal::ZERO;
        }
        HistoricalVar.estimate(inputs)
    }

    fn name(&self) -> &'static str {
        "monte_carlo"
    }
}

trait ToU32Floor {
    fn to_u32_floor(self) -> u32;
}

impl ToU32Floor for Decimal {
    fn to_u32_floor(self) -> u32 {
        self.trunc().to_string().parse::<i64>().unwrap_or(0).max(0) as u32
    }
}
