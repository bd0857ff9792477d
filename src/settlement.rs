//! Settlement Processor: drains a bounded queue of trades, drives each to
//! `Settled` or terminal `Failed` with exponential backoff retry.
//!
//! Position updates are independent and eager (done by [`crate::position`]
//! as trades are emitted); this module never touches positions.

use crate::config::SettlementConfig;
use crate::error::SettlementError;
use crate::types::{Settlement, SettlementStatus, Trade};
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Duration;
use uuid::Uuid;

/// External settlement sink — the durable write/ledger side is out of
/// scope; this trait is the interface boundary.
#[async_trait::async_trait]
pub trait SettlementSink: Send + Sync {
    async fn settle(&self, settlement: &Settlement) -> Result<(), SettlementError>;
}

/// Sink that always succeeds immediately; used in tests and as a
/// placeholder until a real ledger-backed sink is wired in.
pub struct NoopSettlementSink;

#[async_trait::async_trait]
impl SettlementSink for NoopSettlementSink {
    async fn settle(&self, _settlement: &Settlement) -> Result<(), SettlementError> {
        Ok(())
    }
}

pub struct SettlementProcessor {
    records: Arc<DashMap<Uuid, Settlement>>,
    tx: mpsc::Sender<Trade>,
}

impl SettlementProcessor {
    /// Spawns `config.worker_count` workers draining a shared bounded
    /// queue. When the queue is full, `submit` reports back-pressure to
    /// the caller (the trade emitter) rather than buffering unboundedly.
    pub fn spawn(config: SettlementConfig, sink: Arc<dyn SettlementSink>) -> Self {
        let (tx, rx) = mpsc::channel::<Trade>(config.queue_depth);
        let records: Arc<DashMap<Uuid, Settlement>> = Arc::new(DashMap::new());
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        for worker_id in 0..config.worker_count {
            let rx = rx.clone();
            let sink = sink.clone();
            let records = records.clone();
            let config = config.clone();
            tokio::spawn(async move {
                loop {
                    let trade = {
                        let mut guard = rx.lock().await;
                        guard.recv().await
                    };
                    let Some(trade) = trade else { break };
                    tracing::debug!(worker_id, trade_id = %trade.id, "settlement worker picked up trade");
                    process_trade(&records, &sink, &config, trade).await;
                }
            });
        }

        Self { records, tx }
    }

    /// Enqueues a trade for settlement. Returns `Err` immediately if the
    /// queue is saturated; the caller decides whether to retry.
    pub fn submit(&self, trade: Trade) -> Result<(), Trade> {
        self.tx.try_send(trade).map_err(|e| match e {
            mpsc::error::TrySendError::Full(t) => t,
            mpsc::error::TrySendError::Closed(t) => t,
        })
    }

    pub fn get(&self, trade_id: Uuid) -> Option<Settlement> {
        self.records.iter().find(|e| e.trade_id == trade_id).map(|e| e.value().clone())
    }

    pub fn get_by_id(&self, settlement_id: Uuid) -> Option<Settlement> {
        self.records.get(&settlement_id).map(|e| e.value().clone())
    }
}

async fn process_trade(
    records: &DashMap<Uuid, Settlement>,
    sink: &Arc<dyn SettlementSink>,
    config: &SettlementConfig,
    trade: Trade,
) {
    let id = Uuid::new_v4();
    let mut settlement = Settlement {
        id,
        trade_id: trade.id,
        buyer: trade.taker_user_id,
        seller: trade.maker_user_id,
        quantity: trade.quantity,
        price: trade.price,
        fees: trade.maker_fee + trade.taker_fee,
        status: SettlementStatus::Pending,
        created_at: Utc::now(),
        settled_at: None,
        retry_count: 0,
        failure_reason: None,
    };

    loop {
        settlement.status = SettlementStatus::Processing;
        records.insert(id, settlement.clone());

        match sink.settle(&settlement).await {
            Ok(()) => {
                settlement.status = SettlementStatus::Settled;
                settlement.settled_at = Some(Utc::now());
                records.insert(id, settlement);
                return;
            }
            Err(SettlementError::Transient(reason)) => {
                settlement.retry_count += 1;
                settlement.failure_reason = Some(reason);
                if settlement.retry_count >= config.max_retries {
                    settlement.status = SettlementStatus::Failed;
                    records.insert(id, settlement);
                    tracing::warn!(settlement_id = %id, "settlement retries exhausted");
                    return;
                }
                let backoff = config.initial_backoff_ms * 2u64.pow(settlement.retry_count.min(10));
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }
            Err(other) => {
                settlement.status = SettlementStatus::Failed;
                settlement.failure_reason = Some(other.to_string());
                records.insert(id, settlement);
                return;
            }
        }
    }
}
