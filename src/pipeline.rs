//! Wires the Order Service, Risk Engine, Matching Engine, Position Manager,
//! Settlement Processor and journal sink into the single data path a client
//! actually drives: submit → pre-trade risk → match → fan out fills.

use crate::config::PipelineConfig;
use crate::engine::{MatchResult, MatchingEngine};
use crate::error::CoreError;
use crate::journal::{JournalEvent, JournalSink, NoopJournalSink};
use crate::order_service::{CreateOrderRequest, OrderListFilter, OrderService};
use crate::position::PositionManager;
use crate::risk::var::VarMethod;
use crate::risk::{risk_rejected_error, OrderRiskCheck, RiskEngine};
use crate::settlement::{NoopSettlementSink, SettlementProcessor, SettlementSink};
use crate::types::{Order, RiskLimits};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

/// The assembled platform core. Construct one per process; every component
/// it owns is internally concurrent, so a single `Pipeline` is meant to be
/// shared behind an `Arc` across connection handlers.
pub struct Pipeline {
    engine: Arc<MatchingEngine>,
    order_service: OrderService,
    risk: RiskEngine,
    positions: PositionManager,
    settlement: SettlementProcessor,
    journal: Arc<dyn JournalSink>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, var_method: Arc<dyn VarMethod>) -> Self {
        Self::with_sinks(config, var_method, Arc::new(NoopSettlementSink), Arc::new(NoopJournalSink))
    }

    pub fn with_sinks(
        config: PipelineConfig,
        var_method: Arc<dyn VarMethod>,
        settlement_sink: Arc<dyn SettlementSink>,
        journal: Arc<dyn JournalSink>,
    ) -> Self {
        let engine = Arc::new(MatchingEngine::new(config.engine));
        let order_service = OrderService::new(engine.clone());
        let risk = RiskEngine::new(var_method);
        let settlement = SettlementProcessor::spawn(config.settlement, settlement_sink);

        Self {
            engine,
            order_service,
            risk,
            positions: PositionManager::new(),
            settlement,
            journal,
        }
    }

    pub fn publish_risk_limits(&self, user_id: Uuid, limits: RiskLimits) {
        self.risk.publish_limits(user_id, limits);
    }

    /// The full client-facing path: pre-trade risk gate, then admission to
    /// the matching engine, then fan-out of every resulting fill to
    /// positions, post-trade risk exposure, settlement and the journal.
    pub fn submit_order(&self, req: CreateOrderRequest) -> Result<MatchResult, CoreError> {
        let reference_price = req
            .price
            .or_else(|| self.positions.get(req.user_id, &req.symbol).and_then(|p| p.last_mark_price))
            .unwrap_or(Decimal::ZERO);
        let current_position_qty = self.positions.get(req.user_id, &req.symbol).map(|p| p.quantity).unwrap_or(Decimal::ZERO);

        let risk_check = OrderRiskCheck {
            user_id: req.user_id,
            symbol: req.symbol.clone(),
            side: req.side,
            qty: req.qty,
            price: reference_price,
            order_type: req.order_type,
            current_mark: reference_price,
            current_position_qty,
        };
        let result = self.risk.check(&risk_check);
        if !result.passed {
            return Err(risk_rejected_error(result));
        }

        let outcome = self.order_service.create(req)?;
        self.journal.append(JournalEvent::OrderAdmitted(outcome.residual_order.clone()));

        for trade in &outcome.trades {
            self.journal.append(JournalEvent::TradeExecuted(trade.clone()));
            let (maker_realized, taker_realized) = self.positions.apply_trade(trade);
            self.risk.apply_trade(trade.maker_user_id, trade, maker_realized);
            self.risk.apply_trade(trade.taker_user_id, trade, taker_realized);
            if self.settlement.submit(trade.clone()).is_err() {
                tracing::warn!(trade_id = %trade.id, "settlement queue saturated, trade dropped from settlement path");
            }
        }
        for delta in &outcome.book_deltas {
            self.journal.append(JournalEvent::BookDelta(delta.clone()));
        }

        Ok(outcome)
    }

    pub fn cancel_order(&self, symbol: &str, order_id: Uuid, user_id: Uuid) -> Result<crate::engine::CancelConfirm, CoreError> {
        self.order_service.cancel(symbol, order_id, user_id)
    }

    pub fn replace_order(
        &self,
        symbol: &str,
        order_id: Uuid,
        user_id: Uuid,
        new_qty: Option<Decimal>,
        new_price: Option<Decimal>,
        arrival_time: chrono::DateTime<chrono::Utc>,
    ) -> Result<crate::engine::ReplaceConfirm, CoreError> {
        self.order_service.replace(symbol, order_id, user_id, new_qty, new_price, arrival_time)
    }

    pub fn get_order(&self, symbol: &str, order_id: Uuid) -> Option<Order> {
        self.order_service.get(symbol, order_id)
    }

    pub fn list_orders(&self, user_id: Uuid, filter: &OrderListFilter) -> Vec<Order> {
        self.order_service.list(user_id, filter)
    }

    pub fn position(&self, user_id: Uuid, symbol: &str) -> Option<crate::types::Position> {
        self.positions.get(user_id, &symbol.to_string())
    }

    pub fn mark(&self, user_id: Uuid, symbol: &str, mark_price: Decimal) {
        self.positions.mark(user_id, &symbol.to_string(), mark_price);
    }

    pub fn engine(&self) -> &MatchingEngine {
        &self.engine
    }

    pub fn drain_symbol(&self, symbol: &str) -> Result<(), CoreError> {
        self.engine.drain_symbol(symbol)
    }

    pub fn stats(&self) -> crate::engine::EngineStats {
        self.engine.stats()
    }

    pub fn tick(&self, symbol: &str, now: chrono::DateTime<chrono::Utc>) -> Result<MatchResult, CoreError> {
        self.engine.tick(symbol, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineConfig, SymbolConfig};
    use crate::risk::var::ParametricVar;
    use crate::types::{OrderType, Side, TimeInForce};
    use rust_decimal_macros::dec;

    fn pipeline() -> Pipeline {
        let engine_cfg = EngineConfig::new(Default::default(), 64).with_symbol(
            "AAPL",
            SymbolConfig {
                tick_size: dec!(0.01),
                step_size: dec!(1),
                min_notional: dec!(1),
            },
        );
        Pipeline::new(PipelineConfig::new(engine_cfg), Arc::new(ParametricVar { z_score: dec!(2.33) }))
    }

    fn order(user: Uuid, side: Side, qty: Decimal, price: Decimal) -> CreateOrderRequest {
        CreateOrderRequest {
            client_order_id: Uuid::new_v4().to_string(),
            user_id: user,
            symbol: "AAPL".into(),
            side,
            order_type: OrderType::Limit,
            qty,
            price: Some(price),
            stop_price: None,
            time_in_force: TimeInForce::Gtc,
            expiry: None,
            display_qty: None,
            arrival_time: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn a_crossing_trade_updates_positions_on_both_sides() {
        let pipeline = pipeline();
        let buyer = Uuid::new_v4();
        let seller = Uuid::new_v4();

        pipeline.submit_order(order(buyer, Side::Buy, dec!(50), dec!(150))).unwrap();
        let result = pipeline.submit_order(order(seller, Side::Sell, dec!(50), dec!(150))).unwrap();
        assert_eq!(result.trades.len(), 1);

        let buyer_position = pipeline.position(buyer, "AAPL").unwrap();
        assert_eq!(buyer_position.quantity, dec!(50));
        let seller_position = pipeline.position(seller, "AAPL").unwrap();
        assert_eq!(seller_position.quantity, dec!(-50));
    }

    #[tokio::test]
    async fn an_oversized_order_is_rejected_by_the_risk_gate_before_reaching_the_book() {
        let pipeline = pipeline();
        let user = Uuid::new_v4();
        pipeline.publish_risk_limits(user, RiskLimits { max_order_size: dec!(100), ..RiskLimits::default() });

        let result = pipeline.submit_order(order(user, Side::Buy, dec!(1000), dec!(150)));
        assert!(matches!(result, Err(CoreError::RiskRejected(_))));
        assert!(pipeline.engine().snapshot("AAPL", 10).unwrap().bids.is_empty());
    }
}
