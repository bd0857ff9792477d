//! Core data model: orders, trades, positions, risk limits, settlement.
//!
//! Mirrors the wire-level shapes in `leeleeEcho-polymarket-backend`'s
//! `services/matching/types.rs` but generalized to the full order-type and
//! lifecycle surface this engine supports.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type OrderId = Uuid;
pub type UserId = Uuid;
pub type TradeId = Uuid;
pub type SettlementId = Uuid;
pub type Symbol = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Market,
    Limit,
    Stop,
    StopLimit,
    Ioc,
    Fok,
    Gtd,
    Iceberg,
}

impl OrderType {
    /// Orders that never rest on the book once their immediate liquidity
    /// is consumed.
    pub fn is_immediate_only(self) -> bool {
        matches!(self, OrderType::Market | OrderType::Ioc | OrderType::Fok)
    }

    pub fn is_stop_family(self) -> bool {
        matches!(self, OrderType::Stop | OrderType::StopLimit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeInForce {
    Gtc,
    Ioc,
    Fok,
    Gtd,
}

impl Default for TimeInForce {
    fn default() -> Self {
        TimeInForce::Gtc
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
    Expired,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected | OrderStatus::Expired
        )
    }
}

/// An order, combining the immutable admission header with the mutable
/// lifecycle tail. The header fields never change after `OrderService`
/// admits the order into the engine; the tail is mutated only by the
/// matching shard that owns the order's symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    // --- header ---
    pub id: OrderId,
    pub client_order_id: String,
    pub user_id: UserId,
    pub symbol: Symbol,
    pub side: Side,
    pub order_type: OrderType,
    pub original_qty: Decimal,
    pub price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub time_in_force: TimeInForce,
    pub expiry: Option<DateTime<Utc>>,
    pub display_qty: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub sequence_number: u64,

    // --- mutable tail ---
    pub status: OrderStatus,
    pub filled_qty: Decimal,
    pub avg_fill_price: Option<Decimal>,
    pub last_event_seq: u64,
}

impl Order {
    pub fn remaining_qty(&self) -> Decimal {
        self.original_qty - self.filled_qty
    }

    pub fn is_iceberg(&self) -> bool {
        matches!(self.order_type, OrderType::Iceberg) && self.display_qty.is_some()
    }

    /// Applies a fill, advancing `filled_qty`, `avg_fill_price` and
    /// `status`. Never lets `filled_qty` exceed `original_qty`.
    pub fn apply_fill(&mut self, qty: Decimal, price: Decimal, event_seq: u64) {
        debug_assert!(qty > Decimal::ZERO);
        let prior_filled = self.filled_qty;
        let new_filled = (prior_filled + qty).min(self.original_qty);
        let actual = new_filled - prior_filled;

        let prior_notional = self.avg_fill_price.unwrap_or(Decimal::ZERO) * prior_filled;
        let new_notional = prior_notional + actual * price;
        self.avg_fill_price = if new_filled > Decimal::ZERO {
            Some(new_notional / new_filled)
        } else {
            None
        };
        self.filled_qty = new_filled;
        self.last_event_seq = event_seq;

        self.status = if self.filled_qty >= self.original_qty {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
    }
}

/// An executed trade. Immutable once emitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    pub symbol: Symbol,
    pub maker_order_id: OrderId,
    pub taker_order_id: OrderId,
    pub maker_user_id: UserId,
    pub taker_user_id: UserId,
    pub price: Decimal,
    pub quantity: Decimal,
    pub taker_side: Side,
    pub maker_fee: Decimal,
    pub taker_fee: Decimal,
    pub executed_at: DateTime<Utc>,
    pub sequence_number: u64,
}

/// A book-delta event describing a change at a single (side, price) level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookDelta {
    pub symbol: Symbol,
    pub side: Side,
    pub price: Decimal,
    pub kind: DeltaKind,
    pub quantity: Decimal,
    pub sequence_number: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeltaKind {
    Add,
    Modify,
    Remove,
}

/// Per-(user, symbol) position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub user_id: UserId,
    pub symbol: Symbol,
    /// Positive = long, negative = short.
    pub quantity: Decimal,
    pub avg_cost: Decimal,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub last_mark_price: Option<Decimal>,
    pub last_updated: DateTime<Utc>,
}

impl Position {
    pub fn flat(user_id: UserId, symbol: Symbol, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            symbol,
            quantity: Decimal::ZERO,
            avg_cost: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
            last_mark_price: None,
            last_updated: now,
        }
    }
}

/// Per-user risk limits, published atomically via a copy-on-write swap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskLimits {
    pub max_position_size: Decimal,
    pub max_order_size: Decimal,
    pub max_daily_volume: Decimal,
    pub max_leverage: Decimal,
    pub var_limit: Decimal,
    pub concentration_limit: Decimal,
    pub daily_loss_limit: Decimal,
    /// User may carry `high`-severity violations without rejection.
    pub high_override: bool,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_position_size: Decimal::new(1_000_000, 0),
            max_order_size: Decimal::new(100_000, 0),
            max_daily_volume: Decimal::new(5_000_000, 0),
            max_leverage: Decimal::new(10, 0),
            var_limit: Decimal::new(50_000, 0),
            concentration_limit: Decimal::new(50, 2), // 0.50
            daily_loss_limit: Decimal::new(100_000, 0),
            high_override: false,
        }
    }
}

/// Aggregated per-user exposure, refreshed on every trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exposure {
    pub user_id: UserId,
    pub daily_volume: Decimal,
    pub daily_realized_pnl: Decimal,
    pub equity: Decimal,
    pub total_notional: Decimal,
    pub per_symbol_notional: std::collections::HashMap<Symbol, Decimal>,
    pub last_applied_trade_ids: std::collections::HashSet<TradeId>,
}

impl Exposure {
    pub fn new(user_id: UserId, equity: Decimal) -> Self {
        Self {
            user_id,
            daily_volume: Decimal::ZERO,
            daily_realized_pnl: Decimal::ZERO,
            equity,
            total_notional: Decimal::ZERO,
            per_symbol_notional: std::collections::HashMap::new(),
            last_applied_trade_ids: std::collections::HashSet::new(),
        }
    }
}

/// Settlement record, state machine driven by the settlement processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settlement {
    pub id: SettlementId,
    pub trade_id: TradeId,
    pub buyer: UserId,
    pub seller: UserId,
    pub quantity: Decimal,
    pub price: Decimal,
    pub fees: Decimal,
    pub status: SettlementStatus,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub failure_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettlementStatus {
    Pending,
    Processing,
    Settled,
    Failed,
}
