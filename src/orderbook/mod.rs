//! Per-symbol price-level book.
//!
//! Two ordered maps of price -> FIFO queue of resting-order handles (bids
//! descending, asks ascending), plus an order-id index for O(1)
//! cancellation. Orders themselves live in an [`arena::Arena`]; both the
//! book and the index hold non-owning [`arena::Handle`]s into it, which is
//! how the cyclic book<->index reference is broken.

pub mod arena;

use crate::price_level::PriceLevel;
use crate::types::{Side, Symbol};
use arena::{Arena, Handle};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, VecDeque};
use uuid::Uuid;

/// A resting order as stored in the book. Carries enough to drive matching
/// and iceberg replenishment without reaching back into `Order`.
#[derive(Debug, Clone)]
pub struct RestingOrder {
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub side: Side,
    pub price: Decimal,
    pub remaining_qty: Decimal,
    /// Hidden reserve for iceberg orders; `None` for ordinary orders.
    pub hidden_qty: Option<Decimal>,
    pub display_qty: Option<Decimal>,
    pub arrival_seq: u64,
}

impl RestingOrder {
    fn replenish_if_iceberg(&mut self) {
        if self.remaining_qty > Decimal::ZERO {
            return;
        }
        if let (Some(hidden), Some(display)) = (self.hidden_qty, self.display_qty) {
            if hidden > Decimal::ZERO {
                let slice = hidden.min(display);
                self.remaining_qty = slice;
                self.hidden_qty = Some(hidden - slice);
            }
        }
    }

    fn is_exhausted(&self) -> bool {
        self.remaining_qty <= Decimal::ZERO && self.hidden_qty.unwrap_or(Decimal::ZERO) <= Decimal::ZERO
    }
}

pub struct OrderBook {
    pub symbol: Symbol,
    arena: Arena<RestingOrder>,
    bids: BTreeMap<PriceLevel, VecDeque<Handle>>,
    asks: BTreeMap<PriceLevel, VecDeque<Handle>>,
    /// order_id -> (side, price level, arena handle). Readers outside the
    /// owning shard only ever see this via `snapshot`; the map itself is
    /// touched solely by the shard that owns this book.
    index: DashMap<Uuid, (Side, PriceLevel, Handle)>,
}

impl OrderBook {
    pub fn new(symbol: Symbol) -> Self {
        Self {
            symbol,
            arena: Arena::new(),
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            index: DashMap::new(),
        }
    }

    fn book_mut(&mut self, side: Side) -> &mut BTreeMap<PriceLevel, VecDeque<Handle>> {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    fn book(&self, side: Side) -> &BTreeMap<PriceLevel, VecDeque<Handle>> {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }

    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.keys().next_back().map(|p| p.to_decimal())
    }

    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.keys().next().map(|p| p.to_decimal())
    }

    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        }
    }

    pub fn has_order(&self, order_id: &Uuid) -> bool {
        self.index.contains_key(order_id)
    }

    pub fn get_order(&self, order_id: &Uuid) -> Option<RestingOrder> {
        let (_, _, handle) = *self.index.get(order_id)?;
        self.arena.get(handle).cloned()
    }

    /// Inserts a new resting order at the tail of its price level.
    pub fn insert(&mut self, order: RestingOrder) {
        let order_id = order.order_id;
        let side = order.side;
        let price_level = PriceLevel::from_decimal(order.price);
        let handle = self.arena.insert(order);
        self.book_mut(side)
            .entry(price_level)
            .or_insert_with(VecDeque::new)
            .push_back(handle);
        self.index.insert(order_id, (side, price_level, handle));
    }

    /// Removes an order entirely (cancel). Returns the removed snapshot.
    pub fn remove(&mut self, order_id: &Uuid) -> Option<RestingOrder> {
        let (side, price_level, handle) = self.index.remove(order_id)?.1;
        let removed = self.arena.remove(handle);
        if let Some(queue) = self.book_mut(side).get_mut(&price_level) {
            if let Some(pos) = queue.iter().position(|h| *h == handle) {
                queue.remove(pos);
            }
            if queue.is_empty() {
                self.book_mut(side).remove(&price_level);
            }
        }
        removed
    }

    /// Iterates price levels on `side` in priority order (best first), as
    /// a point-in-time snapshot of the ladder.
    pub fn iterate_levels(&self, side: Side) -> Vec<PriceLevel> {
        match side {
            Side::Buy => self.bids.keys().rev().cloned().collect(),
            Side::Sell => self.asks.keys().cloned().collect(),
        }
    }

    pub fn peek_head(&self, side: Side, price_level: PriceLevel) -> Option<RestingOrder> {
        let handle = *self.book(side).get(&price_level)?.front()?;
        self.arena.get(handle).cloned()
    }

    /// Fills `qty` against the head order at `(side, price_level)`.
    /// Replenishes iceberg reserves and removes fully-exhausted orders,
    /// dropping an emptied level. Returns the maker's (order_id, user_id)
    /// for trade construction, or `None` if the level had no head order.
    pub fn fill_head(&mut self, side: Side, price_level: PriceLevel, qty: Decimal) -> Option<(Uuid, Uuid)> {
        let queue = match side {
            Side::Buy => self.bids.get_mut(&price_level)?,
            Side::Sell => self.asks.get_mut(&price_level)?,
        };
        let handle = *queue.front()?;
        let maker = self.arena.get_mut(handle)?;
        maker.remaining_qty -= qty;
        let ids = (maker.order_id, maker.user_id);
        maker.replenish_if_iceberg();

        if maker.is_exhausted() {
            let order_id = maker.order_id;
            queue.pop_front();
            self.arena.remove(handle);
            self.index.remove(&order_id);
        } else if maker.hidden_qty.is_some() {
            // Iceberg replenishment resets FIFO: move to tail of the same level.
            queue.pop_front();
            queue.push_back(handle);
        }

        if let Some(q) = self.book(side).get(&price_level) {
            if q.is_empty() {
                self.book_mut(side).remove(&price_level);
            }
        }
        Some(ids)
    }

    pub fn bid_depth(&self) -> Decimal {
        self.bids
            .values()
            .flat_map(|q| q.iter())
            .filter_map(|h| self.arena.get(*h))
            .map(|o| o.remaining_qty)
            .sum()
    }

    pub fn ask_depth(&self) -> Decimal {
        self.asks
            .values()
            .flat_map(|q| q.iter())
            .filter_map(|h| self.arena.get(*h))
            .map(|o| o.remaining_qty)
            .sum()
    }

    /// Total resting volume available at prices acceptable to a taker
    /// crossing at `limit_price` (or unlimited if `None`), used by FOK's
    /// pre-scan and the engine's sweep loop.
    pub fn available_opposite_qty(&self, taker_side: Side, limit_price: Option<Decimal>) -> Decimal {
        let opposite = taker_side.opposite();
        let mut total = Decimal::ZERO;
        for level in self.iterate_levels(opposite) {
            let level_price = level.to_decimal();
            let acceptable = match (taker_side, limit_price) {
                (Side::Buy, Some(limit)) => level_price <= limit,
                (Side::Sell, Some(limit)) => level_price >= limit,
                (_, None) => true,
            };
            if !acceptable {
                break;
            }
            if let Some(queue) = self.book(opposite).get(&level) {
                total += queue
                    .iter()
                    .filter_map(|h| self.arena.get(*h))
                    .map(|o| o.remaining_qty)
                    .sum::<Decimal>();
            }
        }
        total
    }

    pub fn snapshot(&self, depth: usize) -> OrderBookSnapshot {
        let bids = self
            .bids
            .iter()
            .rev()
            .take(depth)
            .map(|(level, q)| {
                let qty: Decimal = q.iter().filter_map(|h| self.arena.get(*h)).map(|o| o.remaining_qty).sum();
                (level.to_decimal(), qty)
            })
            .collect();
        let asks = self
            .asks
            .iter()
            .take(depth)
            .map(|(level, q)| {
                let qty: Decimal = q.iter().filter_map(|h| self.arena.get(*h)).map(|o| o.remaining_qty).sum();
                (level.to_decimal(), qty)
            })
            .collect();
        OrderBookSnapshot {
            symbol: self.symbol.clone(),
            bids,
            asks,
        }
    }

    #[cfg(debug_assertions)]
    pub fn check_invariants(&self) -> Result<(), String> {
        if let (Some(bid), Some(ask)) = (self.best_bid(), self.best_ask()) {
            if bid >= ask {
                return Err(format!("crossed book: bid {} >= ask {}", bid, ask));
            }
        }
        for (side, book) in [(Side::Buy, &self.bids), (Side::Sell, &self.asks)] {
            for (level, queue) in book {
                for handle in queue {
                    let order = self
                        .arena
                        .get(*handle)
                        .ok_or_else(|| "dangling handle in queue".to_string())?;
                    if order.side != side {
                        return Err("order side mismatch with book side".into());
                    }
                    if PriceLevel::from_decimal(order.price) != *level {
                        return Err("order price mismatch with level key".into());
                    }
                    match self.index.get(&order.order_id) {
                        Some(entry) if entry.2 == *handle => {}
                        _ => return Err("index/book bijection broken".into()),
                    }
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct OrderBookSnapshot {
    pub symbol: Symbol,
    pub bids: Vec<(Decimal, Decimal)>,
    pub asks: Vec<(Decimal, Decimal)>,
}
