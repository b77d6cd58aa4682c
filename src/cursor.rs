//! Per-stream progress marker persisted in the static state.

use std::sync::Arc;

use alloy::primitives::{BlockNumber, TxHash};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::TriggerError,
    recent_hashes::{DEFAULT_MAX_RECENT_HASHES, DEFAULT_RETAIN_RECENT_HASHES, RecentHashSet},
    state_store::StateStore,
    types::StreamKind,
};

/// Last fully processed block of one stream.
#[derive(Clone, Debug)]
pub struct Cursor {
    pub stream: StreamKind,
    pub last_block: BlockNumber,
    /// Only tracked by the transaction stream.
    pub recent_hashes: Option<RecentHashSet>,
}

impl Cursor {
    #[must_use]
    pub fn new(stream: StreamKind, last_block: BlockNumber) -> Self {
        Self { stream, last_block, recent_hashes: None }
    }

    #[must_use]
    pub fn with_recent_hashes(mut self, recent_hashes: RecentHashSet) -> Self {
        self.recent_hashes = Some(recent_hashes);
        self
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CursorRecord {
    last_block_height: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    recent_hashes: Option<Vec<TxHash>>,
}

/// Reads and writes [`Cursor`]s, one record per stream key.
///
/// A cursor and its recent hashes are stored as a single value, so a write is
/// never observed half applied.
#[derive(Clone)]
pub struct CursorStore {
    store: Arc<dyn StateStore>,
    max_recent_hashes: usize,
    retain_recent_hashes: usize,
}

impl CursorStore {
    #[must_use]
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            store,
            max_recent_hashes: DEFAULT_MAX_RECENT_HASHES,
            retain_recent_hashes: DEFAULT_RETAIN_RECENT_HASHES,
        }
    }

    #[must_use]
    pub fn with_hash_limits(mut self, max_size: usize, retain_size: usize) -> Self {
        self.max_recent_hashes = max_size;
        self.retain_recent_hashes = retain_size;
        self
    }

    /// An empty set sized with this store's limits.
    #[must_use]
    pub fn empty_hash_set(&self) -> RecentHashSet {
        RecentHashSet::new(self.max_recent_hashes, self.retain_recent_hashes)
    }

    /// # Errors
    ///
    /// Returns [`TriggerError::State`] if the store fails or holds a malformed record.
    pub async fn read(&self, stream: StreamKind) -> Result<Option<Cursor>, TriggerError> {
        let Some(value) = self.store.get(stream.state_key()).await? else {
            return Ok(None);
        };

        let record = match value {
            // bare decimal heights are accepted as a cursor without hashes
            Value::String(height) => CursorRecord { last_block_height: height, recent_hashes: None },
            Value::Null => return Ok(None),
            other => serde_json::from_value(other).map_err(|e| {
                TriggerError::State(format!("malformed cursor for {stream}: {e}"))
            })?,
        };

        let last_block = record.last_block_height.parse::<BlockNumber>().map_err(|e| {
            TriggerError::State(format!(
                "invalid block height `{}` for {stream}: {e}",
                record.last_block_height
            ))
        })?;

        let mut cursor = Cursor::new(stream, last_block);
        if stream == StreamKind::Transaction {
            cursor.recent_hashes = Some(RecentHashSet::from_hashes(
                record.recent_hashes.unwrap_or_default(),
                self.max_recent_hashes,
                self.retain_recent_hashes,
            ));
        }
        Ok(Some(cursor))
    }

    /// # Errors
    ///
    /// Returns [`TriggerError::State`] if the store rejects the write.
    pub async fn write(&self, cursor: &Cursor) -> Result<(), TriggerError> {
        let record = CursorRecord {
            last_block_height: cursor.last_block.to_string(),
            recent_hashes: cursor.recent_hashes.as_ref().map(|set| set.iter().copied().collect()),
        };
        let value = serde_json::to_value(record)
            .map_err(|e| TriggerError::State(format!("failed to encode cursor: {e}")))?;
        self.store.set(cursor.stream.state_key(), value).await
    }
}
