use std::{
    collections::{BTreeMap, HashSet},
    sync::{Mutex, MutexGuard, PoisonError},
};

use alloy::{
    eips::BlockId,
    primitives::{B256, BlockHash, BlockNumber},
    rpc::types::Log,
    transports::TransportErrorKind,
};
use async_trait::async_trait;

use crate::{
    error::TriggerError,
    event_filter::LogFilter,
    fetcher::{BlockSummary, BlockWithTransactions, ChainSource, ChainTransaction},
    types::BlockRange,
};

const GENESIS_TIMESTAMP: u64 = 1_700_000_000;
const BLOCK_TIME: u64 = 12;

/// In-memory [`ChainSource`] with a movable head, per-block transactions and
/// logs, failure injection and a record of every request.
///
/// Every height up to the head exists; blocks without explicit content are empty.
#[derive(Debug, Default)]
pub struct MockChain {
    state: Mutex<ChainState>,
}

#[derive(Debug, Default)]
struct ChainState {
    head: BlockNumber,
    transactions: BTreeMap<BlockNumber, Vec<ChainTransaction>>,
    logs: Vec<Log>,
    failing_blocks: HashSet<BlockNumber>,
    fail_head: bool,
    head_calls: usize,
    block_requests: Vec<BlockNumber>,
    log_requests: Vec<BlockRange>,
}

impl MockChain {
    #[must_use]
    pub fn new(head: BlockNumber) -> Self {
        Self { state: Mutex::new(ChainState { head, ..ChainState::default() }) }
    }

    fn state(&self) -> MutexGuard<'_, ChainState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hash every mock block at `number` carries.
    #[must_use]
    pub fn block_hash(number: BlockNumber) -> BlockHash {
        let mut bytes = [0x42u8; 32];
        bytes[24..].copy_from_slice(&number.to_be_bytes());
        B256::from(bytes)
    }

    pub fn set_head(&self, head: BlockNumber) {
        self.state().head = head;
    }

    #[must_use]
    pub fn head_height(&self) -> BlockNumber {
        self.state().head
    }

    /// Appends `tx` to block `number`, filling in its block coordinates.
    pub fn add_transaction(&self, number: BlockNumber, mut tx: ChainTransaction) {
        let mut state = self.state();
        let block = state.transactions.entry(number).or_default();
        tx.block_number = Some(number);
        tx.block_hash = Some(Self::block_hash(number));
        tx.transaction_index = Some(block.len() as u64);
        block.push(tx);
    }

    /// Adds a log; it is served by `logs` once its block is within a requested range.
    pub fn add_log(&self, log: Log) {
        self.state().logs.push(log);
    }

    /// Makes every request touching `number` fail until cleared.
    pub fn fail_block(&self, number: BlockNumber) {
        self.state().failing_blocks.insert(number);
    }

    /// Makes head queries fail until cleared.
    pub fn fail_head(&self) {
        self.state().fail_head = true;
    }

    pub fn clear_failures(&self) {
        let mut state = self.state();
        state.failing_blocks.clear();
        state.fail_head = false;
    }

    #[must_use]
    pub fn head_calls(&self) -> usize {
        self.state().head_calls
    }

    /// Heights requested through `block_header` and `block_with_transactions`.
    #[must_use]
    pub fn block_requests(&self) -> Vec<BlockNumber> {
        self.state().block_requests.clone()
    }

    /// Ranges requested through `logs`.
    #[must_use]
    pub fn log_requests(&self) -> Vec<BlockRange> {
        self.state().log_requests.clone()
    }

    fn unavailable(what: String) -> TriggerError {
        TriggerError::from(TransportErrorKind::custom_str(&format!("mock chain: {what} unavailable")))
    }

    fn summary(state: &ChainState, number: BlockNumber) -> Result<BlockSummary, TriggerError> {
        if state.failing_blocks.contains(&number) {
            return Err(Self::unavailable(format!("block {number}")));
        }
        if number > state.head {
            return Err(TriggerError::BlockNotFound(BlockId::number(number)));
        }
        let parent = number.checked_sub(1).map(Self::block_hash).unwrap_or_default();
        let mut summary = BlockSummary::new(
            number,
            Self::block_hash(number),
            parent,
            GENESIS_TIMESTAMP + number * BLOCK_TIME,
        );
        summary.transactions_count = state.transactions.get(&number).map_or(0, Vec::len);
        Ok(summary)
    }
}

#[async_trait]
impl ChainSource for MockChain {
    async fn head(&self) -> Result<BlockNumber, TriggerError> {
        let mut state = self.state();
        state.head_calls += 1;
        if state.fail_head {
            return Err(Self::unavailable("head".to_string()));
        }
        Ok(state.head)
    }

    async fn block_header(&self, number: BlockNumber) -> Result<BlockSummary, TriggerError> {
        let mut state = self.state();
        state.block_requests.push(number);
        Self::summary(&state, number)
    }

    async fn block_with_transactions(
        &self,
        number: BlockNumber,
    ) -> Result<BlockWithTransactions, TriggerError> {
        let mut state = self.state();
        state.block_requests.push(number);
        let header = Self::summary(&state, number)?;
        let transactions = state.transactions.get(&number).cloned().unwrap_or_default();
        Ok(BlockWithTransactions { header, transactions })
    }

    async fn logs(&self, filter: &LogFilter, range: BlockRange) -> Result<Vec<Log>, TriggerError> {
        let mut state = self.state();
        state.log_requests.push(range.clone());
        if let Some(failing) = state.failing_blocks.iter().find(|number| range.contains(*number)) {
            return Err(Self::unavailable(format!("logs for block {failing}")));
        }

        let mut logs: Vec<Log> = state
            .logs
            .iter()
            .filter(|log| log.block_number.is_some_and(|number| range.contains(&number)))
            .filter(|log| filter.matches(log))
            .cloned()
            .collect();
        logs.sort_by_key(|log| (log.block_number, log.log_index));
        Ok(logs)
    }
}
