//! Poll cycle orchestration.
//!
//! One [`Trigger::poll`] call reads the stream's cursor, asks the chain for its
//! head, fetches every block range between the two and writes the cursor back.
//! The cursor is only written after every range was processed, so a failed
//! cycle is retried from the same height on the next poll.

mod contract_event;
mod new_block;
mod transaction;

use std::sync::Arc;

use alloy::primitives::BlockNumber;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

pub use contract_event::ContractEventSettings;
pub use transaction::TransactionSettings;

use crate::{
    config::{FromBlock, TriggerConfig},
    cursor::{Cursor, CursorStore},
    decoder::LogEvent,
    error::TriggerError,
    fetcher::{BlockSummary, ChainSource},
    matcher::MatchedTransaction,
    range_planner::{DEFAULT_BLOCK_LIMIT, plan_from, plan_ranges},
    state_store::StateStore,
    types::{BlockRange, PollStatus, StreamKind},
};

/// Stream-specific options a [`Trigger`] runs with.
#[derive(Clone, Debug)]
pub enum StreamSettings {
    NewBlock,
    ContractEvent(ContractEventSettings),
    Transaction(TransactionSettings),
}

impl StreamSettings {
    #[must_use]
    pub fn kind(&self) -> StreamKind {
        match self {
            StreamSettings::NewBlock => StreamKind::NewBlock,
            StreamSettings::ContractEvent(_) => StreamKind::ContractEvent,
            StreamSettings::Transaction(_) => StreamKind::Transaction,
        }
    }

    fn from_block(&self) -> FromBlock {
        match self {
            StreamSettings::NewBlock => FromBlock::Latest,
            StreamSettings::ContractEvent(settings) => settings.from_block,
            StreamSettings::Transaction(settings) => settings.from_block,
        }
    }
}

/// One emitted record. Serializes to a single flat JSON object.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TriggerItem {
    Block(BlockSummary),
    Event(LogEvent),
    Transaction(MatchedTransaction),
}

/// Result of a successful poll cycle.
#[derive(Clone, Debug, PartialEq)]
pub enum PollOutcome {
    /// The stream had no cursor; `baseline` is now stored.
    Initialized { baseline: BlockNumber, items: Vec<TriggerItem> },
    /// The cursor moved to `cursor`, possibly without anything to emit.
    Advanced { cursor: BlockNumber, items: Vec<TriggerItem> },
}

impl PollOutcome {
    #[must_use]
    pub fn items(&self) -> &[TriggerItem] {
        match self {
            PollOutcome::Initialized { items, .. } | PollOutcome::Advanced { items, .. } => items,
        }
    }

    /// Stored cursor height after the cycle.
    #[must_use]
    pub fn cursor(&self) -> BlockNumber {
        match self {
            PollOutcome::Initialized { baseline, .. } => *baseline,
            PollOutcome::Advanced { cursor, .. } => *cursor,
        }
    }

    #[must_use]
    pub fn status(&self) -> PollStatus {
        match self {
            PollOutcome::Initialized { baseline, .. } => {
                PollStatus::Initialized { baseline: *baseline }
            }
            PollOutcome::Advanced { cursor, .. } => PollStatus::CaughtUp { cursor: *cursor },
        }
    }

    /// The batch to hand to the host, or `None` when the cycle found nothing new.
    #[must_use]
    pub fn into_items(self) -> Option<Vec<TriggerItem>> {
        let items = match self {
            PollOutcome::Initialized { items, .. } | PollOutcome::Advanced { items, .. } => items,
        };
        (!items.is_empty()).then_some(items)
    }
}

/// Polls one stream, persisting its progress in a [`StateStore`].
pub struct Trigger {
    source: Arc<dyn ChainSource>,
    cursors: CursorStore,
    settings: StreamSettings,
    block_limit: u64,
    // serializes read-cursor..write-cursor across concurrent callers
    cycle: Mutex<()>,
}

impl Trigger {
    #[must_use]
    pub fn new(
        source: Arc<dyn ChainSource>,
        store: Arc<dyn StateStore>,
        settings: StreamSettings,
    ) -> Self {
        Self {
            source,
            cursors: CursorStore::new(store),
            settings,
            block_limit: DEFAULT_BLOCK_LIMIT,
            cycle: Mutex::new(()),
        }
    }

    /// Builds a trigger from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TriggerError::Configuration`] if the stream options are invalid.
    pub fn from_config(
        config: &TriggerConfig,
        source: Arc<dyn ChainSource>,
        store: Arc<dyn StateStore>,
    ) -> Result<Self, TriggerError> {
        config.validate()?;
        Ok(Self::new(source, store, config.stream.settings()?)
            .with_block_limit(config.block_limit)
            .with_hash_limits(config.recent_hashes.max_size, config.recent_hashes.retain_size))
    }

    /// Sets the maximum number of blocks covered by one fetch.
    #[must_use]
    pub fn with_block_limit(mut self, block_limit: u64) -> Self {
        self.block_limit = block_limit;
        self
    }

    /// Sets the recent-hash trim threshold and the number of hashes a trim keeps.
    #[must_use]
    pub fn with_hash_limits(mut self, max_size: usize, retain_size: usize) -> Self {
        self.cursors = self.cursors.with_hash_limits(max_size, retain_size);
        self
    }

    #[must_use]
    pub fn stream(&self) -> StreamKind {
        self.settings.kind()
    }

    #[must_use]
    pub fn settings(&self) -> &StreamSettings {
        &self.settings
    }

    /// Runs one poll cycle.
    ///
    /// # Errors
    ///
    /// Returns the first fetch, configuration or state failure. The stored cursor
    /// is left untouched in that case.
    pub async fn poll(&self) -> Result<PollOutcome, TriggerError> {
        let _cycle = self.cycle.lock().await;
        let stream = self.stream();

        let cursor = self.cursors.read(stream).await?;
        let head = self.source.head().await?;
        debug!(stream = %stream, head, cursor = ?cursor.as_ref().map(|c| c.last_block), "Polling");

        match cursor {
            None => self.initialize(head).await,
            Some(cursor) => self.advance(cursor, head).await,
        }
    }

    async fn initialize(&self, head: BlockNumber) -> Result<PollOutcome, TriggerError> {
        let stream = self.stream();
        let mut cursor = Cursor::new(stream, head);
        if stream == StreamKind::Transaction {
            cursor.recent_hashes = Some(self.cursors.empty_hash_set());
        }

        let items = match (&self.settings, self.settings.from_block()) {
            (StreamSettings::NewBlock, _) => {
                vec![TriggerItem::Block(self.source.block_header(head).await?)]
            }
            (_, FromBlock::Latest) => Vec::new(),
            (_, FromBlock::Earliest) => self.backfill(0, head, &mut cursor).await?,
            (_, FromBlock::Custom(start)) => self.backfill(start, head, &mut cursor).await?,
        };

        self.commit(&mut cursor).await?;
        info!(stream = %stream, baseline = cursor.last_block, emitted = items.len(), "Initialized stream");
        Ok(PollOutcome::Initialized { baseline: cursor.last_block, items })
    }

    async fn backfill(
        &self,
        start: BlockNumber,
        head: BlockNumber,
        cursor: &mut Cursor,
    ) -> Result<Vec<TriggerItem>, TriggerError> {
        if start > head {
            // nothing to backfill yet; the first later poll starts at `start`
            cursor.last_block = start - 1;
            return Ok(Vec::new());
        }
        let ranges = plan_from(start, head, self.block_limit)?;
        self.collect(&ranges, cursor).await
    }

    async fn advance(
        &self,
        mut cursor: Cursor,
        head: BlockNumber,
    ) -> Result<PollOutcome, TriggerError> {
        let stream = self.stream();
        let ranges = plan_ranges(cursor.last_block, head, self.block_limit)?;
        let items = self.collect(&ranges, &mut cursor).await?;
        if let Some(last) = ranges.last() {
            cursor.last_block = *last.end();
        }

        self.commit(&mut cursor).await?;
        info!(stream = %stream, emitted = items.len(), cursor = cursor.last_block, "Poll cycle complete");
        Ok(PollOutcome::Advanced { cursor: cursor.last_block, items })
    }

    async fn collect(
        &self,
        ranges: &[BlockRange],
        cursor: &mut Cursor,
    ) -> Result<Vec<TriggerItem>, TriggerError> {
        let source = self.source.as_ref();
        match &self.settings {
            StreamSettings::NewBlock => new_block::collect(source, ranges).await,
            StreamSettings::ContractEvent(settings) => {
                contract_event::collect(source, settings, ranges).await
            }
            StreamSettings::Transaction(settings) => {
                let recent =
                    cursor.recent_hashes.get_or_insert_with(|| self.cursors.empty_hash_set());
                transaction::collect(source, settings, ranges, recent).await
            }
        }
    }

    async fn commit(&self, cursor: &mut Cursor) -> Result<(), TriggerError> {
        if let Some(recent) = cursor.recent_hashes.as_mut() {
            let evicted = recent.trim();
            if evicted > 0 {
                debug!(evicted, retained = recent.len(), "Evicted oldest recent hashes");
            }
        }
        self.cursors.write(cursor).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{state_store::MemoryStateStore, test_utils::MockChain};
    use alloy::primitives::B256;

    fn new_block_trigger(chain: &Arc<MockChain>, store: &Arc<MemoryStateStore>) -> Trigger {
        Trigger::new(chain.clone(), store.clone(), StreamSettings::NewBlock).with_block_limit(2)
    }

    #[tokio::test]
    async fn first_new_block_poll_emits_head_snapshot() -> anyhow::Result<()> {
        let chain = Arc::new(MockChain::new(100));
        let store = Arc::new(MemoryStateStore::new());

        let outcome = new_block_trigger(&chain, &store).poll().await?;

        assert_eq!(outcome.status(), PollStatus::Initialized { baseline: 100 });
        let [TriggerItem::Block(block)] = outcome.items() else {
            panic!("expected a single block, got {:?}", outcome.items());
        };
        assert_eq!(block.number, 100);
        Ok(())
    }

    #[tokio::test]
    async fn new_blocks_are_emitted_in_order() -> anyhow::Result<()> {
        let chain = Arc::new(MockChain::new(100));
        let store = Arc::new(MemoryStateStore::new());
        let trigger = new_block_trigger(&chain, &store);
        trigger.poll().await?;

        chain.set_head(103);
        let outcome = trigger.poll().await?;

        let numbers: Vec<_> = outcome
            .items()
            .iter()
            .map(|item| match item {
                TriggerItem::Block(block) => block.number,
                other => panic!("unexpected item {other:?}"),
            })
            .collect();
        assert_eq!(numbers, vec![101, 102, 103]);
        assert_eq!(outcome.cursor(), 103);
        Ok(())
    }

    #[tokio::test]
    async fn repeated_poll_without_new_blocks_emits_nothing() -> anyhow::Result<()> {
        let chain = Arc::new(MockChain::new(100));
        let store = Arc::new(MemoryStateStore::new());
        let trigger = new_block_trigger(&chain, &store);
        trigger.poll().await?;
        chain.set_head(101);
        trigger.poll().await?;

        let outcome = trigger.poll().await?;
        assert_eq!(outcome, PollOutcome::Advanced { cursor: 101, items: vec![] });
        assert!(outcome.into_items().is_none());
        Ok(())
    }

    #[tokio::test]
    async fn head_behind_cursor_keeps_cursor() -> anyhow::Result<()> {
        let chain = Arc::new(MockChain::new(100));
        let store = Arc::new(MemoryStateStore::new());
        let trigger = new_block_trigger(&chain, &store);
        trigger.poll().await?;

        chain.set_head(98);
        assert_eq!(trigger.poll().await?.cursor(), 100);
        Ok(())
    }

    #[tokio::test]
    async fn failed_range_leaves_cursor_untouched() -> anyhow::Result<()> {
        let chain = Arc::new(MockChain::new(100));
        let store = Arc::new(MemoryStateStore::new());
        let trigger = new_block_trigger(&chain, &store);
        trigger.poll().await?;

        chain.set_head(104);
        chain.fail_block(103);
        assert!(matches!(trigger.poll().await, Err(TriggerError::RemoteUnavailable(_))));
        assert_eq!(store.snapshot().await["lastBlock"]["lastBlockHeight"], "100");

        chain.clear_failures();
        let outcome = trigger.poll().await?;
        assert_eq!(outcome.items().len(), 4);
        assert_eq!(outcome.cursor(), 104);
        Ok(())
    }

    #[tokio::test]
    async fn zero_block_limit_fails_without_writing() -> anyhow::Result<()> {
        let chain = Arc::new(MockChain::new(10));
        let store = Arc::new(MemoryStateStore::new());
        store.set("lastBlock", serde_json::json!("5")).await?;

        let trigger = new_block_trigger(&chain, &store).with_block_limit(0);
        assert!(matches!(trigger.poll().await, Err(TriggerError::Configuration(_))));
        assert_eq!(store.snapshot().await["lastBlock"], "5");
        Ok(())
    }

    #[test]
    fn items_serialize_flat() -> anyhow::Result<()> {
        let block = BlockSummary::new(7, B256::repeat_byte(1), B256::ZERO, 0);
        let json = serde_json::to_value(TriggerItem::Block(block))?;
        assert_eq!(json["number"], "7");
        assert!(json.get("Block").is_none());
        Ok(())
    }
}
