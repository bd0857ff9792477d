//! Async, bounded-channel front for [`super::MatchingEngine`].
//!
//! The engine's mutex-per-symbol core already gives single-writer
//! serialization; this layer adds the back-pressure contract from the
//! spec's concurrency model (§5): submit/cancel/replace block only on
//! claiming a slot in a bounded channel plus the synchronous match step,
//! never on I/O, and a saturated queue past the caller's deadline returns
//! `Busy`/`DeadlineExceeded` instead of being dropped.

use super::{CancelConfirm, MatchResult, MatchingEngine, NewOrderRequest, ReplaceConfirm};
use crate::error::CoreError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

enum Command {
    Submit(NewOrderRequest, oneshot::Sender<Result<MatchResult, CoreError>>),
    Cancel(String, Uuid, Uuid, oneshot::Sender<Result<CancelConfirm, CoreError>>),
    Replace(
        String,
        Uuid,
        Uuid,
        Option<Decimal>,
        Option<Decimal>,
        DateTime<Utc>,
        oneshot::Sender<Result<ReplaceConfirm, CoreError>>,
    ),
}

/// A handle to the single worker task driving the engine. Cheap to clone;
/// every submitter shares the same bounded inbound queue.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<Command>,
}

impl EngineHandle {
    pub fn spawn(engine: Arc<MatchingEngine>, queue_depth: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<Command>(queue_depth);
        tokio::spawn(async move {
            while let Some(cmd) = rx.recv().await {
                match cmd {
                    Command::Submit(req, reply) => {
                        let result = engine.submit(req);
                        let _ = reply.send(result);
                    }
                    Command::Cancel(symbol, order_id, user_id, reply) => {
                        let result = engine.cancel(&symbol, order_id, user_id);
                        let _ = reply.send(result);
                    }
                    Command::Replace(symbol, order_id, user_id, qty, price, arrival_time, reply) => {
                        let result = engine.replace(&symbol, order_id, user_id, qty, price, arrival_time);
                        let _ = reply.send(result);
                    }
                }
            }
        });
        Self { tx }
    }

    pub async fn submit(&self, req: NewOrderRequest, deadline: Duration) -> Result<MatchResult, CoreError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        match tokio::time::timeout(deadline, self.tx.send(Command::Submit(req, reply_tx))).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => return Err(CoreError::Busy),
            Err(_) => return Err(CoreError::DeadlineExceeded),
        }
        match tokio::time::timeout(deadline, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(CoreError::Busy),
            Err(_) => Err(CoreError::DeadlineExceeded),
        }
    }

    pub async fn cancel(&self, symbol: String, order_id: Uuid, user_id: Uuid, deadline: Duration) -> Result<CancelConfirm, CoreError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        match tokio::time::timeout(deadline, self.tx.send(Command::Cancel(symbol, order_id, user_id, reply_tx))).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => return Err(CoreError::Busy),
            Err(_) => return Err(CoreError::DeadlineExceeded),
        }
        match tokio::time::timeout(deadline, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(CoreError::Busy),
            Err(_) => Err(CoreError::DeadlineExceeded),
        }
    }

    pub async fn replace(
        &self,
        symbol: String,
        order_id: Uuid,
        user_id: Uuid,
        new_qty: Option<Decimal>,
        new_price: Option<Decimal>,
        arrival_time: DateTime<Utc>,
        deadline: Duration,
    ) -> Result<ReplaceConfirm, CoreError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let cmd = Command::Replace(symbol, order_id, user_id, new_qty, new_price, arrival_time, reply_tx);
        match tokio::time::timeout(deadline, self.tx.send(cmd)).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => return Err(CoreError::Busy),
            Err(_) => return Err(CoreError::DeadlineExceeded),
        }
        match tokio::time::timeout(deadline, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(CoreError::Busy),
            Err(_) => Err(CoreError::DeadlineExceeded),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineConfig, SymbolConfig};
    use crate::types::{OrderType, Side, TimeInForce};
    use rust_decimal_macros::dec;

    fn test_engine() -> Arc<MatchingEngine> {
        let cfg = EngineConfig::new(Default::default(), 64).with_symbol(
            "AAPL",
            SymbolConfig {
                tick_size: dec!(0.01),
                step_size: dec!(1),
                min_notional: dec!(1),
            },
        );
        Arc::new(MatchingEngine::new(cfg))
    }

    #[tokio::test]
    async fn submit_round_trips_through_the_channel() {
        let handle = EngineHandle::spawn(test_engine(), 16);
        let req = NewOrderRequest {
            client_order_id: "c1".into(),
            user_id: Uuid::new_v4(),
            symbol: "AAPL".into(),
            side: Side::Buy,
            order_type: OrderType::Limit,
            qty: dec!(10),
            price: Some(dec!(100)),
            stop_price: None,
            time_in_force: TimeInForce::Gtc,
            expiry: None,
            display_qty: None,
            arrival_time: Utc::now(),
        };
        let result = handle.submit(req, Duration::from_millis(500)).await.unwrap();
        assert!(result.trades.is_empty());
    }
}
