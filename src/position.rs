//! Position Manager: consumes the trade stream in arrival order, mutating
//! per-(user, symbol) positions atomically.

use crate::types::{Position, Side, Symbol, Trade, UserId};
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Position updates for a single `(user, symbol)` key are serialized
/// through that key's mutex; different keys proceed independently.
pub struct PositionManager {
    positions: DashMap<(UserId, Symbol), Arc<Mutex<Position>>>,
}

impl Default for PositionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PositionManager {
    pub fn new() -> Self {
        Self {
            positions: DashMap::new(),
        }
    }

    fn slot(&self, user_id: UserId, symbol: &Symbol) -> Arc<Mutex<Position>> {
        self.positions
            .entry((user_id, symbol.clone()))
            .or_insert_with(|| Arc::new(Mutex::new(Position::flat(user_id, symbol.clone(), Utc::now()))))
            .clone()
    }

    pub fn get(&self, user_id: UserId, symbol: &Symbol) -> Option<Position> {
        self.positions.get(&(user_id, symbol.clone())).map(|p| p.lock().clone())
    }

    /// Applies one side of a trade (maker or taker) to that user's
    /// position. Returns the realized P&L delta booked by this update, so
    /// the caller can forward it to the Risk Engine's post-trade hook.
    pub fn apply_fill(&self, user_id: UserId, symbol: &Symbol, side: Side, qty: Decimal, price: Decimal) -> Decimal {
        let slot = self.slot(user_id, symbol);
        let mut position = slot.lock();
        let signed_qty = match side {
            Side::Buy => qty,
            Side::Sell => -qty,
        };

        let same_direction = position.quantity == Decimal::ZERO
            || (position.quantity > Decimal::ZERO) == (signed_qty > Decimal::ZERO);

        let realized_delta = if same_direction {
            // Same direction (or flat): grow the position, reweight avg cost.
            let prior_notional = position.avg_cost * position.quantity.abs();
            let new_notional = prior_notional + price * qty;
            let new_qty = position.quantity + signed_qty;
            position.avg_cost = if new_qty != Decimal::ZERO {
                new_notional / new_qty.abs()
            } else {
                Decimal::ZERO
            };
            position.quantity = new_qty;
            Decimal::ZERO
        } else {
            // Opposite direction: reduces, possibly crosses through zero.
            let closing_qty = qty.min(position.quantity.abs());
            let direction = if position.quantity > Decimal::ZERO { Decimal::ONE } else { -Decimal::ONE };
            let delta = closing_qty * (price - position.avg_cost) * direction;
            position.realized_pnl += delta;
            position.quantity += signed_qty;

            let residual = qty - closing_qty;
            if residual > Decimal::ZERO {
                // Crossed through zero: close old leg (already realized above),
                // open a fresh leg at the trade price for the residual.
                position.avg_cost = price;
                position.quantity = if side == Side::Buy { residual } else { -residual };
            } else if position.quantity == Decimal::ZERO {
                position.avg_cost = Decimal::ZERO;
            }
            delta
        };

        position.last_updated = Utc::now();
        realized_delta
    }

    /// Applies both legs of a trade: maker and taker each update their own
    /// position independently.
    pub fn apply_trade(&self, trade: &Trade) -> (Decimal, Decimal) {
        let maker_side = trade.taker_side.opposite();
        let taker_realized = self.apply_fill(trade.taker_user_id, &trade.symbol, trade.taker_side, trade.quantity, trade.price);
        let maker_realized = self.apply_fill(trade.maker_user_id, &trade.symbol, maker_side, trade.quantity, trade.price);
        (maker_realized, taker_realized)
    }

    pub fn mark(&self, user_id: UserId, symbol: &Symbol, mark_price: Decimal) {
        let slot = self.slot(user_id, symbol);
        let mut position = slot.lock();
        position.unrealized_pnl = position.quantity * (mark_price - position.avg_cost);
        position.last_mark_price = Some(mark_price);
        position.last_updated = Utc::now();
    }
}
