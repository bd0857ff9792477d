//! Typed, construction-time configuration. There is no env/file loader in
//! this crate — that is the out-of-scope external collaborator named in
//! the platform's interface boundary; callers build these structs directly
//! (or from whatever loader they run) and pass them into the pipeline.

use rust_decimal::Decimal;
use std::collections::HashMap;

/// Per-symbol trading parameters.
#[derive(Debug, Clone)]
pub struct SymbolConfig {
    pub tick_size: Decimal,
    pub step_size: Decimal,
    pub min_notional: Decimal,
}

impl SymbolConfig {
    pub fn is_price_aligned(&self, price: Decimal) -> bool {
        self.tick_size == Decimal::ZERO || (price % self.tick_size) == Decimal::ZERO
    }

    pub fn is_qty_aligned(&self, qty: Decimal) -> bool {
        self.step_size == Decimal::ZERO || (qty % self.step_size) == Decimal::ZERO
    }
}

/// Maker/taker fee schedule, a constructed strategy object per Design Note
/// 9 ("pass as configured capability objects constructed once").
#[derive(Debug, Clone)]
pub struct FeeConfig {
    pub maker_fee_rate: Decimal,
    pub taker_fee_rate: Decimal,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            maker_fee_rate: Decimal::new(2, 4), // 0.02%
            taker_fee_rate: Decimal::new(5, 4), // 0.05%
        }
    }
}

/// Full engine configuration: one entry per tradeable symbol plus the fee
/// schedule applied to every trade.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub symbols: HashMap<String, SymbolConfig>,
    pub fees: FeeConfig,
    /// Bound on each symbol shard's inbound command queue (§5 back-pressure).
    pub shard_queue_depth: usize,
}

impl EngineConfig {
    pub fn new(fees: FeeConfig, shard_queue_depth: usize) -> Self {
        Self {
            symbols: HashMap::new(),
            fees,
            shard_queue_depth,
        }
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>, cfg: SymbolConfig) -> Self {
        self.symbols.insert(symbol.into(), cfg);
        self
    }
}

/// Top-level wiring for [`crate::pipeline::Pipeline`]: one engine, one
/// settlement pool, and the default risk limits new users start with.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub engine: EngineConfig,
    pub settlement: SettlementConfig,
    pub default_risk_limits: crate::types::RiskLimits,
}

impl PipelineConfig {
    pub fn new(engine: EngineConfig) -> Self {
        Self {
            engine,
            settlement: SettlementConfig::default(),
            default_risk_limits: crate::types::RiskLimits::default(),
        }
    }
}

/// Settlement worker-pool configuration.
#[derive(Debug, Clone)]
pub struct SettlementConfig {
    pub worker_count: usize,
    pub queue_depth: usize,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            queue_depth: 1024,
            max_retries: 5,
            initial_backoff_ms: 50,
        }
    }
}
