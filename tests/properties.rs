//! Property-based tests over the matching engine: conservation, the
//! maker-price rule, no-double-spend, and book/index bijection hold for
//! arbitrary sequences of limit orders, not just the hand-picked scenarios
//! in `tests/scenarios.rs`.

use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;
use vela_core::config::{EngineConfig, SymbolConfig};
use vela_core::engine::{MatchingEngine, NewOrderRequest};
use vela_core::types::{OrderType, Side, TimeInForce};

fn engine() -> MatchingEngine {
    let cfg = EngineConfig::new(Default::default(), 256).with_symbol(
        "AAPL",
        SymbolConfig {
            tick_size: dec!(0.01),
            step_size: dec!(1),
            min_notional: dec!(0),
        },
    );
    MatchingEngine::new(cfg)
}

#[derive(Debug, Clone)]
struct OrderSpec {
    side: Side,
    qty: Decimal,
    // one of five adjacent ticks, so orders actually overlap and cross
    price_ticks: i64,
}

fn order_spec_strategy() -> impl Strategy<Value = OrderSpec> {
    (prop_oneof![Just(Side::Buy), Just(Side::Sell)], 1u32..20, 0i64..5).prop_map(|(side, qty, price_ticks)| OrderSpec {
        side,
        qty: Decimal::from(qty),
        price_ticks,
    })
}

fn to_request(spec: &OrderSpec) -> NewOrderRequest {
    let base = dec!(100.00);
    let tick = dec!(0.01);
    NewOrderRequest {
        client_order_id: Uuid::new_v4().to_string(),
        user_id: Uuid::new_v4(),
        symbol: "AAPL".into(),
        side: spec.side,
        order_type: OrderType::Limit,
        qty: spec.qty,
        price: Some(base + tick * Decimal::from(spec.price_ticks)),
        stop_price: None,
        time_in_force: TimeInForce::Gtc,
        expiry: None,
        display_qty: None,
        arrival_time: chrono::Utc::now(),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// After every admission, the book stays internally consistent: no
    /// crossed book, and the order index agrees with the book queues.
    #[test]
    fn book_stays_internally_consistent(specs in prop::collection::vec(order_spec_strategy(), 1..40)) {
        let engine = engine();
        for spec in &specs {
            let _ = engine.submit(to_request(spec));
            prop_assert!(engine.check_invariants("AAPL").is_ok());
        }
    }

    /// No order's filled quantity ever exceeds what it was submitted for,
    /// and every trade's price equals its maker's resting price.
    #[test]
    fn conservation_and_maker_price_rule_hold(specs in prop::collection::vec(order_spec_strategy(), 1..40)) {
        let engine = engine();
        let mut order_ids = Vec::new();

        for spec in &specs {
            let req = to_request(spec);
            if let Ok(result) = engine.submit(req) {
                order_ids.push(result.residual_order.id);
                for trade in &result.trades {
                    let maker = engine.get_order("AAPL", trade.maker_order_id);
                    if let Some(maker) = maker {
                        prop_assert_eq!(trade.price, maker.price.unwrap());
                    }
                }
            }
        }

        for id in order_ids {
            if let Some(order) = engine.get_order("AAPL", id) {
                prop_assert!(order.filled_qty <= order.original_qty);
            }
        }
    }

    /// Trade sequence numbers only go up: the engine never reorders its
    /// own event stream relative to admission order.
    #[test]
    fn trade_sequence_numbers_are_monotonic(specs in prop::collection::vec(order_spec_strategy(), 1..40)) {
        let engine = engine();
        let mut last_seq = 0u64;
        for spec in &specs {
            if let Ok(result) = engine.submit(to_request(spec)) {
                for trade in &result.trades {
                    prop_assert!(trade.sequence_number > last_seq);
                    last_seq = trade.sequence_number;
                }
            }
        }
    }
}
