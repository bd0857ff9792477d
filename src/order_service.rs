//! Order Service: assigns identities, deduplicates `client_order_id`,
//! routes to the engine, and tracks lifecycle for lookups.

use crate::engine::{CancelConfirm, MatchResult, MatchingEngine, NewOrderRequest, ReplaceConfirm};
use crate::error::CoreError;
use crate::types::{Order, OrderStatus, Side, Symbol, TimeInForce, OrderType};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct CreateOrderRequest {
    pub client_order_id: String,
    pub user_id: Uuid,
    pub symbol: Symbol,
    pub side: Side,
    pub order_type: OrderType,
    pub qty: Decimal,
    pub price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub time_in_force: TimeInForce,
    pub expiry: Option<DateTime<Utc>>,
    pub display_qty: Option<Decimal>,
    /// Logical arrival time stamped at the system boundary; threaded
    /// through to the engine so trade timestamps don't depend on when the
    /// match happened to run.
    pub arrival_time: DateTime<Utc>,
}

#[derive(Debug, Default, Clone)]
pub struct OrderListFilter {
    pub symbol: Option<Symbol>,
    pub status: Option<OrderStatus>,
}

/// Routes order lifecycle operations to the engine. Owns the
/// `(user_id, client_order_id) -> order_id` dedup index; the engine owns
/// the canonical `Order` records themselves.
pub struct OrderService {
    engine: Arc<MatchingEngine>,
    dedup: DashMap<(Uuid, String), Uuid>,
}

impl OrderService {
    pub fn new(engine: Arc<MatchingEngine>) -> Self {
        Self {
            engine,
            dedup: DashMap::new(),
        }
    }

    /// Creates a new order. Returns the already-admitted order (with
    /// fresh id) on a replayed `client_order_id` rather than resubmitting.
    pub fn create(&self, req: CreateOrderRequest) -> Result<MatchResult, CoreError> {
        let dedup_key = (req.user_id, req.client_order_id.clone());
        if let Some(existing) = self.dedup.get(&dedup_key) {
            let order_id = *existing;
            if let Some(order) = self.engine.orders_for_user(req.user_id).into_iter().find(|o| o.id == order_id) {
                return Ok(MatchResult {
                    trades: Vec::new(),
                    residual_order: order,
                    book_deltas: Vec::new(),
                });
            }
        }

        let engine_req = NewOrderRequest {
            client_order_id: req.client_order_id.clone(),
            user_id: req.user_id,
            symbol: req.symbol,
            side: req.side,
            order_type: req.order_type,
            qty: req.qty,
            price: req.price,
            stop_price: req.stop_price,
            time_in_force: req.time_in_force,
            expiry: req.expiry,
            display_qty: req.display_qty,
            arrival_time: req.arrival_time,
        };
        let result = self.engine.submit(engine_req)?;
        self.dedup.insert(dedup_key, result.residual_order.id);
        Ok(result)
    }

    pub fn cancel(&self, symbol: &str, order_id: Uuid, user_id: Uuid) -> Result<CancelConfirm, CoreError> {
        self.engine.cancel(symbol, order_id, user_id)
    }

    pub fn replace(
        &self,
        symbol: &str,
        order_id: Uuid,
        user_id: Uuid,
        new_qty: Option<Decimal>,
        new_price: Option<Decimal>,
        arrival_time: DateTime<Utc>,
    ) -> Result<ReplaceConfirm, CoreError> {
        self.engine.replace(symbol, order_id, user_id, new_qty, new_price, arrival_time)
    }

    pub fn get(&self, symbol: &str, order_id: Uuid) -> Option<Order> {
        self.engine.get_order(symbol, order_id)
    }

    pub fn list(&self, user_id: Uuid, filter: &OrderListFilter) -> Vec<Order> {
        self.engine
            .orders_for_user(user_id)
            .into_iter()
            .filter(|o| filter.symbol.as_ref().map_or(true, |s| *s == o.symbol))
            .filter(|o| filter.status.map_or(true, |s| s == o.status))
            .collect()
    }
}
