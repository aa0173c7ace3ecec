// =============================================================================
// Result sinks — append-only trade ledger
// =============================================================================
//
// Each closed position is appended as one flat row:
//
//   [instrument, entry time, exit time, entry value, exit value, reason]
//
// Writes are best-effort. The trading loop logs a failed append and keeps
// going; capital is never held back on the ledger.
// =============================================================================

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::error::TradeError;
use crate::types::TradeRecord;

#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn append(&self, record: &TradeRecord) -> Result<(), TradeError>;
}

// ---------------------------------------------------------------------------
// JSON lines file
// ---------------------------------------------------------------------------

/// Appends each row as a JSON array on its own line.
pub struct JsonLinesSink {
    path: PathBuf,
}

impl JsonLinesSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ResultSink for JsonLinesSink {
    async fn append(&self, record: &TradeRecord) -> Result<(), TradeError> {
        let mut line = serde_json::to_string(&record.to_row()).map_err(|e| TradeError::Sink(e.to_string()))?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| TradeError::Sink(format!("{}: {e}", self.path.display())))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| TradeError::Sink(format!("{}: {e}", self.path.display())))?;
        file.flush().await.map_err(|e| TradeError::Sink(e.to_string()))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Log output
// ---------------------------------------------------------------------------

/// Emits each record as a structured `info!` event.
pub struct TracingSink;

#[async_trait]
impl ResultSink for TracingSink {
    async fn append(&self, record: &TradeRecord) -> Result<(), TradeError> {
        info!(
            instrument = %record.instrument_id,
            entry_time = %record.entry_timestamp,
            exit_time = %record.exit_timestamp,
            entry_value = record.entry_price_adjusted,
            exit_value = record.exit_price_adjusted,
            reason = %record.exit_reason,
            "trade closed"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fan-out
// ---------------------------------------------------------------------------

/// Forwards to every inner sink. One sink failing does not stop the others;
/// the first failure is returned after all have been tried.
pub struct FanoutSink {
    sinks: Vec<Arc<dyn ResultSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn ResultSink>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl ResultSink for FanoutSink {
    async fn append(&self, record: &TradeRecord) -> Result<(), TradeError> {
        let mut first_err = None;
        for sink in &self.sinks {
            if let Err(e) = sink.append(record).await {
                warn!(error = %e, "result sink append failed");
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
