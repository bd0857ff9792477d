//! The Matching Engine: per-symbol price-time-priority matching with the
//! full limit/market/stop/stop-limit/IOC/FOK/GTD/iceberg order-type
//! surface, trigger handling for stops, and a monotonic-clock-driven GTD
//! expiry heap.
//!
//! Concurrency story: each symbol gets its own [`parking_lot::Mutex`]-guarded
//! [`SymbolState`], so mutations to one symbol's book never block another
//! symbol's — the single-writer-per-symbol guarantee the spec calls for.
//! [`shard`] layers the bounded-channel, back-pressure-carrying async
//! surface on top of this synchronous core.

pub mod shard;

use crate::config::EngineConfig;
use crate::error::CoreError;
use crate::orderbook::{OrderBook, RestingOrder};
use crate::price_level::PriceLevel;
use crate::types::{BookDelta, DeltaKind, Order, OrderStatus, OrderType, Side, Symbol, TimeInForce, Trade};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use uuid::Uuid;

/// Outcome of submitting an order to the engine.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub trades: Vec<Trade>,
    pub residual_order: Order,
    pub book_deltas: Vec<BookDelta>,
}

#[derive(Debug, Clone)]
pub struct CancelConfirm {
    pub order_id: Uuid,
    pub cancelled_qty: Decimal,
}

#[derive(Debug, Clone)]
pub struct ReplaceConfirm {
    pub old_order_id: Uuid,
    pub new_order: Order,
}

/// A request to submit a fresh order, before sequencing/admission.
#[derive(Debug, Clone)]
pub struct NewOrderRequest {
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
    /// The taker's logical arrival time, stamped once by the caller at the
    /// system boundary. Every trade this order produces carries this
    /// timestamp rather than a fresh wall-clock read, so replaying the same
    /// requests with the same arrival times reproduces the same trade
    /// stream byte-for-byte.
    pub arrival_time: DateTime<Utc>,
}

struct SequenceCounter(AtomicU64);

impl SequenceCounter {
    fn new() -> Self {
        Self(AtomicU64::new(0))
    }
    fn next(&self) -> u64 {
        self.0.fetch_add(1, AtomicOrdering::Relaxed) + 1
    }
}

/// Stop/stop-limit orders waiting for the trigger price to be crossed,
/// plus GTD expiries. Kept separate from the active book per §4.2.
struct TriggerTable {
    buy_stops: BTreeMap<PriceLevel, Vec<Uuid>>,
    sell_stops: BTreeMap<PriceLevel, Vec<Uuid>>,
    gtd_expiries: BTreeMap<(DateTime<Utc>, Uuid), ()>,
}

impl TriggerTable {
    fn new() -> Self {
        Self {
            buy_stops: BTreeMap::new(),
            sell_stops: BTreeMap::new(),
            gtd_expiries: BTreeMap::new(),
        }
    }

    fn insert_stop(&mut self, side: Side, stop_price: Decimal, order_id: Uuid) {
        let level = PriceLevel::from_decimal(stop_price);
        let table = match side {
            Side::Buy => &mut self.buy_stops,
            Side::Sell => &mut self.sell_stops,
        };
        table.entry(level).or_insert_with(Vec::new).push(order_id);
    }

    fn remove_stop(&mut self, side: Side, stop_price: Decimal, order_id: Uuid) {
        let level = PriceLevel::from_decimal(stop_price);
        let table = match side {
            Side::Buy => &mut self.buy_stops,
            Side::Sell => &mut self.sell_stops,
        };
        if let Some(v) = table.get_mut(&level) {
            v.retain(|id| *id != order_id);
            if v.is_empty() {
                table.remove(&level);
            }
        }
    }

    /// Buy stops trigger when the last trade price rises to or above the
    /// stop price; sell stops trigger when it falls to or below.
    fn take_triggered(&mut self, last_trade_price: Decimal) -> Vec<Uuid> {
        let mut triggered = Vec::new();
        let trade_level = PriceLevel::from_decimal(last_trade_price);

        let keys: Vec<PriceLevel> = self.buy_stops.range(..=trade_level).map(|(k, _)| *k).collect();
        for k in keys {
            if let Some(ids) = self.buy_stops.remove(&k) {
                triggered.extend(ids);
            }
        }

        let keys: Vec<PriceLevel> = self.sell_stops.range(trade_level..).map(|(k, _)| *k).collect();
        for k in keys {
            if let Some(ids) = self.sell_stops.remove(&k) {
                triggered.extend(ids);
            }
        }
        triggered
    }

    fn insert_gtd(&mut self, expiry: DateTime<Utc>, order_id: Uuid) {
        self.gtd_expiries.insert((expiry, order_id), ());
    }

    fn remove_gtd(&mut self, expiry: DateTime<Utc>, order_id: Uuid) {
        self.gtd_expiries.remove(&(expiry, order_id));
    }

    fn take_expired(&mut self, now: DateTime<Utc>) -> Vec<Uuid> {
        let keys: Vec<(DateTime<Utc>, Uuid)> = self
            .gtd_expiries
            .range(..(now, Uuid::max()))
            .map(|(k, _)| *k)
            .collect();
        for k in &keys {
            self.gtd_expiries.remove(k);
        }
        keys.into_iter().map(|(_, id)| id).collect()
    }
}

struct SymbolState {
    book: OrderBook,
    registry: HashMap<Uuid, Order>,
    triggers: TriggerTable,
    sequence: SequenceCounter,
    last_trade_price: Option<Decimal>,
    /// Set on an internal invariant violation; distinct from `drained`
    /// because it reflects unrecoverable engine state, not an
    /// administrative pause.
    quarantined: AtomicBool,
    /// Set by the admin CLI's `drain-symbol`; also blocks new submissions
    /// but never counts toward the exit-code contract's "unrecoverable"
    /// signal.
    drained: AtomicBool,
}

impl SymbolState {
    fn new(symbol: Symbol) -> Self {
        Self {
            book: OrderBook::new(symbol),
            registry: HashMap::new(),
            triggers: TriggerTable::new(),
            sequence: SequenceCounter::new(),
            last_trade_price: None,
            quarantined: AtomicBool::new(false),
            drained: AtomicBool::new(false),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EngineStats {
    pub total_orders: u64,
    pub total_trades: u64,
    pub quarantined_symbols: Vec<Symbol>,
}

/// The matching engine. Owns one [`SymbolState`] per registered symbol and
/// dispatches every mutating operation through that symbol's mutex.
pub struct MatchingEngine {
    config: EngineConfig,
    symbols: DashMap<Symbol, Arc<Mutex<SymbolState>>>,
    total_orders: AtomicU64,
    total_trades: AtomicU64,
}

impl MatchingEngine {
    pub fn new(config: EngineConfig) -> Self {
        let symbols = DashMap::new();
        for symbol in config.symbols.keys() {
            symbols.insert(symbol.clone(), Arc::new(Mutex::new(SymbolState::new(symbol.clone()))));
        }
        Self {
            config,
            symbols,
            total_orders: AtomicU64::new(0),
            total_trades: AtomicU64::new(0),
        }
    }

    pub fn is_valid_symbol(&self, symbol: &str) -> bool {
        self.config.symbols.contains_key(symbol)
    }

    pub fn is_quarantined(&self, symbol: &str) -> bool {
        self.symbols
            .get(symbol)
            .map(|s| s.lock().quarantined.load(AtomicOrdering::Relaxed))
            .unwrap_or(false)
    }

    pub fn stats(&self) -> EngineStats {
        let quarantined_symbols = self
            .symbols
            .iter()
            .filter(|e| e.value().lock().quarantined.load(AtomicOrdering::Relaxed))
            .map(|e| e.key().clone())
            .collect();
        EngineStats {
            total_orders: self.total_orders.load(AtomicOrdering::Relaxed),
            total_trades: self.total_trades.load(AtomicOrdering::Relaxed),
            quarantined_symbols,
        }
    }

    fn validate(&self, req: &NewOrderRequest) -> Result<&crate::config::SymbolConfig, CoreError> {
        let cfg = self
            .config
            .symbols
            .get(&req.symbol)
            .ok_or_else(|| CoreError::UnknownSymbol(req.symbol.clone()))?;

        if req.qty <= Decimal::ZERO {
            return Err(CoreError::Validation("quantity must be positive".into()));
        }
        if !cfg.is_qty_aligned(req.qty) {
            return Err(CoreError::Validation("quantity violates step size".into()));
        }

        let needs_price = matches!(
            req.order_type,
            OrderType::Limit | OrderType::StopLimit | OrderType::Gtd | OrderType::Iceberg | OrderType::Ioc | OrderType::Fok
        );
        if needs_price {
            let price = req
                .price
                .ok_or_else(|| CoreError::Validation("price required for this order type".into()))?;
            if price <= Decimal::ZERO {
                return Err(CoreError::Validation("price must be positive".into()));
            }
            if !cfg.is_price_aligned(price) {
                return Err(CoreError::Validation("price violates tick size".into()));
            }
            if price * req.qty < cfg.min_notional {
                return Err(CoreError::Validation("order notional below minimum".into()));
            }
        }

        if req.order_type.is_stop_family() && req.stop_price.is_none() {
            return Err(CoreError::Validation("stop orders require a stop price".into()));
        }
        if matches!(req.order_type, OrderType::Gtd) && req.expiry.is_none() {
            return Err(CoreError::Validation("GTD orders require an expiry".into()));
        }
        if matches!(req.order_type, OrderType::Iceberg) {
            let display = req
                .display_qty
                .ok_or_else(|| CoreError::Validation("iceberg orders require display_qty".into()))?;
            if display <= Decimal::ZERO || display > req.qty {
                return Err(CoreError::Validation("display_qty must be in (0, qty]".into()));
            }
        }

        Ok(cfg)
    }

    /// Submits a new order for matching. Rejects validation failures
    /// before any state mutation; FOK insufficient-liquidity is returned
    /// as a normal `Rejected` outcome, not an error.
    pub fn submit(&self, req: NewOrderRequest) -> Result<MatchResult, CoreError> {
        self.validate(&req)?;

        let state_arc = self
            .symbols
            .get(&req.symbol)
            .map(|e| e.value().clone())
            .ok_or_else(|| CoreError::UnknownSymbol(req.symbol.clone()))?;
        let mut state = state_arc.lock();

        if state.quarantined.load(AtomicOrdering::Relaxed) {
            return Err(CoreError::internal(req.symbol.clone(), "symbol quarantined"));
        }
        if state.drained.load(AtomicOrdering::Relaxed) {
            return Err(CoreError::Validation(format!("symbol {} is administratively drained", req.symbol)));
        }

        let arrival_time = req.arrival_time;
        let result = self.submit_locked(&mut state, req, arrival_time);
        match &result {
            Ok(r) => {
                self.total_orders.fetch_add(1, AtomicOrdering::Relaxed);
                self.total_trades.fetch_add(r.trades.len() as u64, AtomicOrdering::Relaxed);
            }
            Err(CoreError::Internal { symbol, .. }) => {
                state.quarantined.store(true, AtomicOrdering::Relaxed);
                tracing::error!(symbol = %symbol, "symbol quarantined after invariant violation");
            }
            Err(_) => {}
        }
        result
    }

    fn submit_locked(
        &self,
        state: &mut SymbolState,
        req: NewOrderRequest,
        now: DateTime<Utc>,
    ) -> Result<MatchResult, CoreError> {
        let seq = state.sequence.next();
        let order_id = deterministic_order_id(&req.symbol, seq);
        let mut order = Order {
            id: order_id,
            client_order_id: req.client_order_id,
            user_id: req.user_id,
            symbol: req.symbol.clone(),
            side: req.side,
            order_type: req.order_type,
            original_qty: req.qty,
            price: req.price,
            stop_price: req.stop_price,
            time_in_force: req.time_in_force,
            expiry: req.expiry,
            display_qty: req.display_qty,
            created_at: now,
            sequence_number: seq,
            status: OrderStatus::New,
            filled_qty: Decimal::ZERO,
            avg_fill_price: None,
            last_event_seq: seq,
        };

        if req.order_type.is_stop_family() {
            state.triggers.insert_stop(req.side, req.stop_price.unwrap(), order_id);
            state.registry.insert(order_id, order.clone());
            return Ok(MatchResult {
                trades: Vec::new(),
                residual_order: order,
                book_deltas: Vec::new(),
            });
        }

        if matches!(req.order_type, OrderType::Fok) {
            let available = state.book.available_opposite_qty(req.side, req.price);
            if available < req.qty {
                order.status = OrderStatus::Rejected;
                state.registry.insert(order_id, order.clone());
                return Ok(MatchResult {
                    trades: Vec::new(),
                    residual_order: order,
                    book_deltas: Vec::new(),
                });
            }
        }

        let limit_price = match req.order_type {
            OrderType::Market => None,
            _ => req.price,
        };

        let (trades, mut deltas, remaining) =
            sweep(&mut state.book, req.symbol.clone(), req.side, req.user_id, order_id, req.qty, limit_price, &self.config.fees, now, &state.sequence, &mut state.registry);

        if let Some(last) = trades.last() {
            state.last_trade_price = Some(last.price);
        }

        let filled = req.qty - remaining;
        if filled > Decimal::ZERO {
            order.apply_fill(filled, weighted_avg_price(&trades), state.sequence.next());
        }

        let rests = remaining > Decimal::ZERO && !req.order_type.is_immediate_only();
        if rests {
            let resting = RestingOrder {
                order_id,
                user_id: req.user_id,
                side: req.side,
                price: req.price.expect("validated above"),
                remaining_qty: if order.is_iceberg() {
                    req.display_qty.unwrap().min(remaining)
                } else {
                    remaining
                },
                hidden_qty: if order.is_iceberg() {
                    Some(remaining - req.display_qty.unwrap().min(remaining))
                } else {
                    None
                },
                display_qty: req.display_qty,
                arrival_seq: seq,
            };
            let delta_seq = state.sequence.next();
            deltas.push(BookDelta {
                symbol: req.symbol.clone(),
                side: req.side,
                price: resting.price,
                kind: DeltaKind::Add,
                quantity: resting.remaining_qty,
                sequence_number: delta_seq,
            });
            state.book.insert(resting);
            if matches!(req.order_type, OrderType::Gtd) {
                state.triggers.insert_gtd(req.expiry.unwrap(), order_id);
            }
        } else if remaining > Decimal::ZERO && filled == Decimal::ZERO && order.status != OrderStatus::Rejected {
            // IOC/Market/FOK that matched nothing at all: residual is discarded,
            // never rests. A nonzero partial fill already set Filled/PartiallyFilled
            // via apply_fill above and is left untouched.
            order.status = OrderStatus::Cancelled;
        }

        state.registry.insert(order_id, order.clone());

        let mut all_trades = trades;
        let mut all_deltas = deltas;
        self.process_triggers(state, now, &mut all_trades, &mut all_deltas)?;

        Ok(MatchResult {
            trades: all_trades,
            residual_order: order,
            book_deltas: all_deltas,
        })
    }

    /// Re-submits stop/GTD orders whose triggers fired during the last
    /// sweep, serialized ahead of the triggering trade's caller-visible
    /// return but after the trade itself, per the spec's assumed
    /// resolution of the stop-vs-concurrent-limit ordering question.
    fn process_triggers(
        &self,
        state: &mut SymbolState,
        now: DateTime<Utc>,
        trades: &mut Vec<Trade>,
        deltas: &mut Vec<BookDelta>,
    ) -> Result<(), CoreError> {
        let expired = state.triggers.take_expired(now);
        for order_id in expired {
            if let Some(order) = state.registry.get_mut(&order_id) {
                if !order.status.is_terminal() {
                    order.status = OrderStatus::Expired;
                }
            }
            state.book.remove(&order_id);
        }

        let Some(last_price) = state.last_trade_price else {
            return Ok(());
        };
        let triggered = state.triggers.take_triggered(last_price);
        for order_id in triggered {
            let Some(original) = state.registry.get(&order_id).cloned() else {
                continue;
            };
            let req = NewOrderRequest {
                client_order_id: original.client_order_id.clone(),
                user_id: original.user_id,
                symbol: original.symbol.clone(),
                side: original.side,
                order_type: if matches!(original.order_type, OrderType::Stop) {
                    OrderType::Market
                } else {
                    OrderType::Limit
                },
                qty: original.remaining_qty(),
                price: original.price,
                stop_price: None,
                time_in_force: original.time_in_force,
                expiry: None,
                display_qty: None,
                arrival_time: now,
            };
            let sub_result = self.submit_locked(state, req, now)?;
            trades.extend(sub_result.trades);
            deltas.extend(sub_result.book_deltas);
            if let Some(stopped) = state.registry.get_mut(&order_id) {
                stopped.status = OrderStatus::Cancelled; // replaced by the re-submitted market/limit order
            }
        }
        Ok(())
    }

    pub fn cancel(&self, symbol: &str, order_id: Uuid, user_id: Uuid) -> Result<CancelConfirm, CoreError> {
        let state_arc = self
            .symbols
            .get(symbol)
            .map(|e| e.value().clone())
            .ok_or_else(|| CoreError::UnknownSymbol(symbol.to_string()))?;
        let mut state = state_arc.lock();

        let order = state
            .registry
            .get(&order_id)
            .cloned()
            .ok_or(CoreError::NotFound(order_id))?;
        if order.user_id != user_id {
            return Err(CoreError::NotOwner(user_id, order_id));
        }
        if order.status.is_terminal() {
            return Err(CoreError::AlreadyTerminal(order_id));
        }

        let cancelled_qty = order.remaining_qty();
        if order.order_type.is_stop_family() {
            state.triggers.remove_stop(order.side, order.stop_price.unwrap(), order_id);
        } else {
            state.book.remove(&order_id);
            if matches!(order.order_type, OrderType::Gtd) {
                if let Some(expiry) = order.expiry {
                    state.triggers.remove_gtd(expiry, order_id);
                }
            }
        }
        if let Some(o) = state.registry.get_mut(&order_id) {
            o.status = OrderStatus::Cancelled;
        }

        Ok(CancelConfirm { order_id, cancelled_qty })
    }

    /// Cancel-and-new: cancels the existing order and resubmits fresh
    /// parameters with a brand new id and sequence number.
    pub fn replace(
        &self,
        symbol: &str,
        order_id: Uuid,
        user_id: Uuid,
        new_qty: Option<Decimal>,
        new_price: Option<Decimal>,
        arrival_time: DateTime<Utc>,
    ) -> Result<ReplaceConfirm, CoreError> {
        let state_arc = self
            .symbols
            .get(symbol)
            .map(|e| e.value().clone())
            .ok_or_else(|| CoreError::UnknownSymbol(symbol.to_string()))?;

        let original = {
            let state = state_arc.lock();
            state
                .registry
                .get(&order_id)
                .cloned()
                .ok_or(CoreError::NotFound(order_id))?
        };
        if original.user_id != user_id {
            return Err(CoreError::NotOwner(user_id, order_id));
        }

        self.cancel(symbol, order_id, user_id)?;

        let req = NewOrderRequest {
            client_order_id: original.client_order_id.clone(),
            user_id: original.user_id,
            symbol: original.symbol.clone(),
            side: original.side,
            order_type: original.order_type,
            qty: new_qty.unwrap_or_else(|| original.remaining_qty()),
            price: new_price.or(original.price),
            stop_price: original.stop_price,
            time_in_force: original.time_in_force,
            expiry: original.expiry,
            display_qty: original.display_qty,
            arrival_time,
        };
        let result = self.submit(req)?;
        Ok(ReplaceConfirm {
            old_order_id: order_id,
            new_order: result.residual_order,
        })
    }

    /// Debug-only bijection/crossed-book check over a symbol's live book,
    /// exposed for property tests that can't reach into the shard directly.
    #[cfg(debug_assertions)]
    pub fn check_invariants(&self, symbol: &str) -> Result<(), CoreError> {
        let state_arc = self
            .symbols
            .get(symbol)
            .map(|e| e.value().clone())
            .ok_or_else(|| CoreError::UnknownSymbol(symbol.to_string()))?;
        let result = state_arc
            .lock()
            .book
            .check_invariants()
            .map_err(|detail| CoreError::internal(symbol.to_string(), detail));
        result
    }

    pub fn snapshot(&self, symbol: &str, depth: usize) -> Result<crate::orderbook::OrderBookSnapshot, CoreError> {
        let state_arc = self
            .symbols
            .get(symbol)
            .map(|e| e.value().clone())
            .ok_or_else(|| CoreError::UnknownSymbol(symbol.to_string()))?;
        let snapshot = state_arc.lock().book.snapshot(depth);
        Ok(snapshot)
    }

    pub fn get_order(&self, symbol: &str, order_id: Uuid) -> Option<Order> {
        self.symbols.get(symbol)?.value().lock().registry.get(&order_id).cloned()
    }

    /// Scans every symbol shard's registry for orders belonging to a user.
    /// Admin/introspection path only — never called from the matching hot
    /// path.
    pub fn orders_for_user(&self, user_id: Uuid) -> Vec<Order> {
        self.symbols
            .iter()
            .flat_map(|entry| {
                entry
                    .value()
                    .lock()
                    .registry
                    .values()
                    .filter(|o| o.user_id == user_id)
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Administratively halts new submissions against a symbol without
    /// tearing anything down — the admin CLI's `drain-symbol` op. Resting
    /// orders and in-flight triggers are left exactly as they are; only
    /// `submit` starts refusing new admissions.
    pub fn drain_symbol(&self, symbol: &str) -> Result<(), CoreError> {
        let state_arc = self
            .symbols
            .get(symbol)
            .map(|e| e.value().clone())
            .ok_or_else(|| CoreError::UnknownSymbol(symbol.to_string()))?;
        state_arc.lock().drained.store(true, AtomicOrdering::Relaxed);
        Ok(())
    }

    /// Advances the GTD/stop time-wheel without an accompanying order
    /// submission. Symbol shards call this periodically so expiries are
    /// observed even during quiet periods.
    pub fn tick(&self, symbol: &str, now: DateTime<Utc>) -> Result<MatchResult, CoreError> {
        let state_arc = self
            .symbols
            .get(symbol)
            .map(|e| e.value().clone())
            .ok_or_else(|| CoreError::UnknownSymbol(symbol.to_string()))?;
        let mut state = state_arc.lock();
        let mut trades = Vec::new();
        let mut deltas = Vec::new();
        self.process_triggers(&mut state, now, &mut trades, &mut deltas)?;
        Ok(MatchResult {
            trades,
            residual_order: Order {
                id: Uuid::nil(),
                client_order_id: String::new(),
                user_id: Uuid::nil(),
                symbol: symbol.to_string(),
                side: Side::Buy,
                order_type: OrderType::Limit,
                original_qty: Decimal::ZERO,
                price: None,
                stop_price: None,
                time_in_force: TimeInForce::Gtc,
                expiry: None,
                display_qty: None,
                created_at: now,
                sequence_number: 0,
                status: OrderStatus::Cancelled,
                filled_qty: Decimal::ZERO,
                avg_fill_price: None,
                last_event_seq: 0,
            },
            book_deltas: deltas,
        })
    }
}

/// Derives a trade id from the symbol's own sequence number rather than a
/// fresh random draw, so two runs fed the same requests in the same order
/// produce byte-identical trade streams (§8 determinism).
fn deterministic_trade_id(symbol: &str, trade_seq: u64) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("{symbol}:trade:{trade_seq}").as_bytes())
}

/// Derives an order id from the symbol's own sequence number for the same
/// reason: `Trade::maker_order_id`/`taker_order_id` are part of the
/// replayed stream, so they need to be reproducible too, not just the
/// trade id itself.
fn deterministic_order_id(symbol: &str, seq: u64) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("{symbol}:order:{seq}").as_bytes())
}

fn weighted_avg_price(trades: &[Trade]) -> Decimal {
    let total_qty: Decimal = trades.iter().map(|t| t.quantity).sum();
    if total_qty == Decimal::ZERO {
        return Decimal::ZERO;
    }
    let notional: Decimal = trades.iter().map(|t| t.quantity * t.price).sum();
    notional / total_qty
}

/// Sweeps the opposite side of `book`, matching the taker against resting
/// orders best-price-first, FIFO within a level. Trade price is always the
/// maker's resting price. Returns `(trades, deltas, remaining_qty)`.
#[allow(clippy::too_many_arguments)]
fn sweep(
    book: &mut OrderBook,
    symbol: Symbol,
    taker_side: Side,
    taker_user_id: Uuid,
    taker_order_id: Uuid,
    mut qty: Decimal,
    limit_price: Option<Decimal>,
    fees: &crate::config::FeeConfig,
    now: DateTime<Utc>,
    seq: &SequenceCounter,
    registry: &mut HashMap<Uuid, Order>,
) -> (Vec<Trade>, Vec<BookDelta>, Decimal) {
    let mut trades = Vec::new();
    let mut deltas = Vec::new();
    let opposite = taker_side.opposite();

    for level in book.iterate_levels(opposite) {
        if qty <= Decimal::ZERO {
            break;
        }
        let level_price = level.to_decimal();
        let acceptable = match (taker_side, limit_price) {
            (Side::Buy, Some(limit)) => level_price <= limit,
            (Side::Sell, Some(limit)) => level_price >= limit,
            (_, None) => true,
        };
        if !acceptable {
            break;
        }

        loop {
            if qty <= Decimal::ZERO {
                break;
            }
            let Some(maker) = book.peek_head(opposite, level) else {
                break;
            };
            let trade_qty = qty.min(maker.remaining_qty);
            let trade_price = maker.price;
            book.fill_head(opposite, level, trade_qty);
            qty -= trade_qty;

            let notional = trade_qty * trade_price;
            let maker_fee = notional * fees.maker_fee_rate;
            let taker_fee = notional * fees.taker_fee_rate;
            let trade_seq = seq.next();

            trades.push(Trade {
                id: deterministic_trade_id(&symbol, trade_seq),
                symbol: symbol.clone(),
                maker_order_id: maker.order_id,
                taker_order_id,
                maker_user_id: maker.user_id,
                taker_user_id,
                price: trade_price,
                quantity: trade_qty,
                taker_side,
                maker_fee,
                taker_fee,
                executed_at: now,
                sequence_number: trade_seq,
            });

            let remains_at_head = book.peek_head(opposite, level).is_some();
            deltas.push(BookDelta {
                symbol: symbol.clone(),
                side: opposite,
                price: trade_price,
                kind: if remains_at_head { DeltaKind::Modify } else { DeltaKind::Remove },
                quantity: trade_qty,
                sequence_number: trade_seq,
            });

            if let Some(maker_order) = registry.get_mut(&maker.order_id) {
                maker_order.apply_fill(trade_qty, trade_price, trade_seq);
            }
        }
    }

    (trades, deltas, qty)
}
