//! Admin CLI for the trading core: `start` brings up one in-process
//! pipeline and an interactive command loop; `drain-symbol`,
//! `publish-limits` and `snapshot-dump` are lines read from that loop
//! rather than separate process invocations, since there is no admin
//! wire protocol in scope (§6 names the CLI surface, not its transport).

use clap::Parser;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vela_core::config::{EngineConfig, FeeConfig, PipelineConfig, SymbolConfig};
use vela_core::pipeline::Pipeline;
use vela_core::risk::var::ParametricVar;
use vela_core::types::RiskLimits;

#[derive(Parser, Debug)]
#[command(name = "vela-admin", about = "Administrative control surface for the trading core")]
struct Cli {
    /// Symbols to register at startup, e.g. --symbol AAPL --symbol MSFT.
    #[arg(long = "symbol", required = true)]
    symbols: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "vela_core=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut engine_config = EngineConfig::new(FeeConfig::default(), 256);
    for symbol in &cli.symbols {
        engine_config = engine_config.with_symbol(
            symbol.clone(),
            SymbolConfig {
                tick_size: Decimal::new(1, 2),
                step_size: Decimal::ONE,
                min_notional: Decimal::ONE,
            },
        );
    }
    let pipeline = Arc::new(Pipeline::new(
        PipelineConfig::new(engine_config),
        Arc::new(ParametricVar { z_score: Decimal::new(233, 2) }),
    ));
    tracing::info!(symbols = ?cli.symbols, "pipeline started");

    let (line_tx, mut line_rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    std::thread::spawn(move || {
        use std::io::BufRead;
        let stdin = std::io::stdin();
        for line in stdin.lock().lines().map_while(Result::ok) {
            if line_tx.send(line).is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received ctrl-c, shutting down");
                break;
            }
            line = line_rx.recv() => {
                match line {
                    Some(line) => {
                        if !handle_command(&pipeline, &line) {
                            break;
                        }
                    }
                    None => {
                        tracing::info!("stdin closed, shutting down");
                        break;
                    }
                }
            }
        }
    }

    let stats = pipeline.stats();
    if !stats.quarantined_symbols.is_empty() {
        tracing::error!(symbols = ?stats.quarantined_symbols, "shutting down with quarantined symbols");
        std::process::exit(1);
    }
    Ok(())
}

/// Returns `false` when the loop should stop.
fn handle_command(pipeline: &Pipeline, line: &str) -> bool {
    let mut parts = line.split_whitespace();
    match parts.next() {
        Some("stop") => return false,
        Some("drain-symbol") => match parts.next() {
            Some(symbol) => match pipeline.drain_symbol(symbol) {
                Ok(()) => tracing::info!(symbol, "symbol drained"),
                Err(e) => tracing::warn!(symbol, error = %e, "drain-symbol failed"),
            },
            None => tracing::warn!("usage: drain-symbol <SYMBOL>"),
        },
        Some("publish-limits") => {
            let args: Vec<&str> = parts.collect();
            match args.as_slice() {
                [user_id, max_order_size] => match (uuid::Uuid::from_str(user_id), Decimal::from_str(max_order_size)) {
                    (Ok(user_id), Ok(max_order_size)) => {
                        pipeline.publish_risk_limits(user_id, RiskLimits { max_order_size, ..RiskLimits::default() });
                        tracing::info!(%user_id, %max_order_size, "limits published");
                    }
                    _ => tracing::warn!("usage: publish-limits <user_id> <max_order_size>"),
                },
                _ => tracing::warn!("usage: publish-limits <user_id> <max_order_size>"),
            }
        }
        Some("snapshot-dump") => match parts.next() {
            Some(symbol) => match pipeline.engine().snapshot(symbol, 20) {
                Ok(snapshot) => {
                    for (price, qty) in &snapshot.bids {
                        println!("BID {} {}", price, qty);
                    }
                    for (price, qty) in &snapshot.asks {
                        println!("ASK {} {}", price, qty);
                    }
                }
                Err(e) => tracing::warn!(symbol, error = %e, "snapshot-dump failed"),
            },
            None => tracing::warn!("usage: snapshot-dump <SYMBOL>"),
        },
        Some(other) => tracing::warn!(command = other, "unknown command"),
        None => {}
    }
    true
}
