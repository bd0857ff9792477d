//! Risk Engine: pre-trade checks on the critical path, post-trade exposure
//! updates off it.

pub mod var;

use crate::error::CoreError;
use crate::types::{Exposure, OrderType, RiskLimits, Side, Symbol, Trade, UserId};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Arc;
use var::{VarInputs, VarMethod};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone)]
pub struct Violation {
    pub kind: ViolationKind,
    pub limit: Decimal,
    pub actual: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    OrderSize,
    PositionLimit,
    DailyVolume,
    Leverage,
    Concentration,
    Var,
}

#[derive(Debug, Clone)]
pub struct OrderRiskCheck {
    pub user_id: UserId,
    pub symbol: Symbol,
    pub side: Side,
    pub qty: Decimal,
    pub price: Decimal,
    pub order_type: OrderType,
    pub current_mark: Decimal,
    pub current_position_qty: Decimal,
}

#[derive(Debug, Clone)]
pub struct RiskResult {
    pub passed: bool,
    pub level: RiskLevel,
    pub violations: Vec<Violation>,
    pub risk_score: f64,
}

/// Evaluates pre-trade checks and applies post-trade exposure updates.
/// The VaR method is a capability object selected once at construction,
/// never looked up per-call.
pub struct RiskEngine {
    limits: DashMap<UserId, Arc<RiskLimits>>,
    exposures: DashMap<UserId, Exposure>,
    var_method: Arc<dyn VarMethod>,
}

impl RiskEngine {
    pub fn new(var_method: Arc<dyn VarMethod>) -> Self {
        Self {
            limits: DashMap::new(),
            exposures: DashMap::new(),
            var_method,
        }
    }

    /// Publishes new limits for a user, applied atomically on the next
    /// evaluation (copy-on-write: the old `Arc` stays valid for any
    /// in-flight check that already read it).
    pub fn publish_limits(&self, user_id: UserId, limits: RiskLimits) {
        self.limits.insert(user_id, Arc::new(limits));
    }

    fn limits_for(&self, user_id: UserId) -> Arc<RiskLimits> {
        self.limits
            .get(&user_id)
            .map(|e| e.value().clone())
            .unwrap_or_else(|| Arc::new(RiskLimits::default()))
    }

    fn exposure_for(&self, user_id: UserId) -> Exposure {
        self.exposures
            .get(&user_id)
            .map(|e| e.value().clone())
            .unwrap_or_else(|| Exposure::new(user_id, Decimal::new(1_000_000, 0)))
    }

    /// Runs the §4.4 ordered check list. Any `Critical` violation fails;
    /// `High` violations fail unless the user carries `high_override`.
    pub fn check(&self, req: &OrderRiskCheck) -> RiskResult {
        let limits = self.limits_for(req.user_id);
        let exposure = self.exposure_for(req.user_id);
        let mut violations = Vec::new();

        let order_notional = req.qty * req.price;
        if order_notional > limits.max_order_size {
            violations.push(Violation {
                kind: ViolationKind::OrderSize,
                limit: limits.max_order_size,
                actual: order_notional,
            });
        }

        let worst_case_position = (req.current_position_qty
            + match req.side {
                Side::Buy => req.qty,
                Side::Sell => -req.qty,
            })
        .abs();
        if worst_case_position > limits.max_position_size {
            violations.push(Violation {
                kind: ViolationKind::PositionLimit,
                limit: limits.max_position_size,
                actual: worst_case_position,
            });
        }

        let projected_daily_volume = exposure.daily_volume + order_notional;
        if projected_daily_volume > limits.max_daily_volume {
            violations.push(Violation {
                kind: ViolationKind::DailyVolume,
                limit: limits.max_daily_volume,
                actual: projected_daily_volume,
            });
        }

        let projected_notional = exposure.total_notional + order_notional;
        if exposure.equity > Decimal::ZERO {
            let leverage = projected_notional / exposure.equity;
            if leverage > limits.max_leverage {
                violations.push(Violation {
                    kind: ViolationKind::Leverage,
                    limit: limits.max_leverage,
                    actual: leverage,
                });
            }
        }

        // Concentration measures how lopsided the *existing* portfolio gets,
        // not the order itself: a user's very first order is trivially
        // "100% in one symbol" and that is not a concentration problem.
        // Only evaluate once the user already carries prior notional.
        if exposure.total_notional > Decimal::ZERO {
            let symbol_notional = exposure.per_symbol_notional.get(&req.symbol).copied().unwrap_or(Decimal::ZERO) + order_notional;
            let concentration = symbol_notional / projected_notional;
            if concentration > limits.concentration_limit {
                violations.push(Violation {
                    kind: ViolationKind::Concentration,
                    limit: limits.concentration_limit,
                    actual: concentration,
                });
            }
        }

        let var_inputs = VarInputs {
            position_notional: worst_case_position * req.price,
            historical_returns: Vec::new(),
            volatility: Decimal::new(2, 2),
            confidence: Decimal::new(99, 2),
        };
        let var_estimate = self.var_method.estimate(&var_inputs);
        if var_estimate > limits.var_limit {
            violations.push(Violation {
                kind: ViolationKind::Var,
                limit: limits.var_limit,
                actual: var_estimate,
            });
        }

        let level = classify(&violations);
        let passed = match level {
            RiskLevel::Critical => false,
            RiskLevel::High => limits.high_override,
            _ => true,
        };

        RiskResult {
            passed,
            level,
            risk_score: violations.len() as f64 / 6.0,
            violations,
        }
    }

    /// Post-trade exposure update. Idempotent on `trade.id` replay.
    pub fn apply_trade(&self, user_id: UserId, trade: &Trade, realized_pnl_delta: Decimal) {
        let mut exposure = self
            .exposures
            .entry(user_id)
            .or_insert_with(|| Exposure::new(user_id, Decimal::new(1_000_000, 0)));
        if !exposure.last_applied_trade_ids.insert(trade.id) {
            return;
        }
        let notional = trade.quantity * trade.price;
        exposure.daily_volume += notional;
        exposure.daily_realized_pnl += realized_pnl_delta;
        *exposure.per_symbol_notional.entry(trade.symbol.clone()).or_insert(Decimal::ZERO) += notional;
        exposure.total_notional += notional;
    }

    pub fn exposure_snapshot(&self, user_id: UserId) -> Exposure {
        self.exposure_for(user_id)
    }
}

fn classify(violations: &[Violation]) -> RiskLevel {
    if violations.is_empty() {
        return RiskLevel::Low;
    }
    // Order size, position limit, daily volume and leverage are hard §4.4
    // limits: breaching any one of them alone must reject, not just nudge
    // the severity up, so a lone breach can never slip through as Medium.
    let hard = violations.iter().any(|v| {
        matches!(
            v.kind,
            ViolationKind::OrderSize | ViolationKind::PositionLimit | ViolationKind::DailyVolume | ViolationKind::Leverage
        )
    });
    if hard {
        return RiskLevel::Critical;
    }
    let severe = violations
        .iter()
        .filter(|v| matches!(v.kind, ViolationKind::Concentration | ViolationKind::Var))
        .count();
    if severe >= 2 {
        RiskLevel::Critical
    } else {
        RiskLevel::High
    }
}

pub fn risk_rejected_error(result: RiskResult) -> CoreError {
    CoreError::RiskRejected(result.violations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    #[test]
    fn concentration_violation_rejects() {
        let engine = RiskEngine::new(Arc::new(var::ParametricVar { z_score: dec!(2.33) }));
        let user = Uuid::new_v4();
        engine.publish_limits(
            user,
            RiskLimits {
                concentration_limit: dec!(0.5),
                ..RiskLimits::default()
            },
        );
        // Pre-load exposure so the user already holds 77.5% of a 1M portfolio in AAPL.
        let mut exposure = Exposure::new(user, dec!(1_000_000));
        exposure.total_notional = dec!(1_000_000);
        exposure.per_symbol_notional.insert("AAPL".into(), dec!(775_000));
        engine.exposures.insert(user, exposure);

        let check = OrderRiskCheck {
            user_id: user,
            symbol: "AAPL".into(),
            side: Side::Buy,
            qty: dec!(2000),
            price: dec!(155.0),
            order_type: OrderType::Limit,
            current_mark: dec!(155.0),
            current_position_qty: dec!(0),
        };
        let result = engine.check(&check);
        assert!(!result.passed);
        assert!(result.violations.iter().any(|v| v.kind == ViolationKind::Concentration));
    }

    #[test]
    fn risk_monotonicity_tightening_never_accepts_previously_rejected() {
        let engine = RiskEngine::new(Arc::new(var::ParametricVar { z_score: dec!(2.33) }));
        let user = Uuid::new_v4();
        let check = OrderRiskCheck {
            user_id: user,
            symbol: "AAPL".into(),
            side: Side::Buy,
            qty: dec!(100),
            price: dec!(100),
            order_type: OrderType::Limit,
            current_mark: dec!(100),
            current_position_qty: dec!(0),
        };

        engine.publish_limits(user, RiskLimits { max_order_size: dec!(50_000), ..RiskLimits::default() });
        let loose = engine.check(&check);
        assert!(loose.passed);

        engine.publish_limits(user, RiskLimits { max_order_size: dec!(1_000), ..RiskLimits::default() });
        let tight = engine.check(&check);
        assert!(!tight.passed || loose.passed);
        // Tightening further from an already-failing limit must still fail.
        engine.publish_limits(user, RiskLimits { max_order_size: dec!(1), ..RiskLimits::default() });
        let tighter = engine.check(&check);
        assert!(!tighter.passed);
    }

    #[test]
    fn a_lone_hard_limit_breach_rejects_even_with_high_override() {
        let engine = RiskEngine::new(Arc::new(var::ParametricVar { z_score: dec!(2.33) }));
        let user = Uuid::new_v4();
        engine.publish_limits(
            user,
            RiskLimits {
                max_order_size: dec!(100),
                high_override: true,
                ..RiskLimits::default()
            },
        );
        let check = OrderRiskCheck {
            user_id: user,
            symbol: "AAPL".into(),
            side: Side::Buy,
            qty: dec!(10),
            price: dec!(100),
            order_type: OrderType::Limit,
            current_mark: dec!(100),
            current_position_qty: dec!(0),
        };
        let result = engine.check(&check);
        assert!(!result.passed);
        assert_eq!(result.level, RiskLevel::Critical);
    }

    #[test]
    fn a_fresh_user_opening_order_is_not_a_concentration_violation() {
        let engine = RiskEngine::new(Arc::new(var::ParametricVar { z_score: dec!(2.33) }));
        let user = Uuid::new_v4();
        engine.publish_limits(user, RiskLimits { concentration_limit: dec!(0.5), ..RiskLimits::default() });
        let check = OrderRiskCheck {
            user_id: user,
            symbol: "AAPL".into(),
            side: Side::Buy,
            qty: dec!(100),
            price: dec!(150),
            order_type: OrderType::Limit,
            current_mark: dec!(150),
            current_position_qty: dec!(0),
        };
        let result = engine.check(&check);
        assert!(result.passed);
        assert!(result.violations.iter().all(|v| v.kind != ViolationKind::Concentration));
    }

    #[test]
    fn apply_trade_is_idempotent_on_trade_id_replay() {
        let engine = RiskEngine::new(Arc::new(var::ParametricVar { z_score: dec!(2.33) }));
        let user = Uuid::new_v4();
        let trade = Trade {
            id: Uuid::new_v4(),
            symbol: "AAPL".into(),
            maker_order_id: Uuid::new_v4(),
            taker_order_id: Uuid::new_v4(),
            maker_user_id: user,
            taker_user_id: Uuid::new_v4(),
            price: dec!(100),
            quantity: dec!(10),
            taker_side: Side::Buy,
            maker_fee: dec!(0),
            taker_fee: dec!(0),
            executed_at: chrono::Utc::now(),
            sequence_number: 1,
        };
        engine.apply_trade(user, &trade, dec!(0));
        engine.apply_trade(user, &trade, dec!(0));
        let exposure = engine.exposure_snapshot(user);
        assert_eq!(exposure.daily_volume, dec!(1000));
    }
}
