//! Test support: an in-memory chain, item builders and stream assertions.

pub mod macros;
mod mock_chain;

use alloy::{
    primitives::{Address, B256, BlockNumber, Bytes, LogData, TxHash, U256},
    rpc::types::Log,
};

pub use mock_chain::MockChain;

use crate::{
    fetcher::ChainTransaction,
    poller::TriggerMessage,
    trigger::TriggerItem,
    types::{PollStatus, ScannerMessage},
};

impl PartialEq<PollStatus> for TriggerMessage {
    fn eq(&self, other: &PollStatus) -> bool {
        matches!(self, ScannerMessage::Status(status) if status == other)
    }
}

/// Deterministic transaction hash for test fixtures.
#[must_use]
pub fn tx_hash(seed: u64) -> TxHash {
    B256::left_padding_from(&seed.to_be_bytes())
}

/// Value transfer with a hash derived from `seed`.
#[must_use]
pub fn transfer(seed: u64, from: Address, to: Option<Address>, value: u64) -> ChainTransaction {
    ChainTransaction::transfer(tx_hash(seed), from, to, U256::from(value))
}

/// Log emitted by `address` in `block` at position `log_index`.
#[must_use]
pub fn log(
    address: Address,
    topics: Vec<B256>,
    data: Bytes,
    block: BlockNumber,
    log_index: u64,
) -> Log {
    Log {
        inner: alloy::primitives::Log { address, data: LogData::new_unchecked(topics, data) },
        block_hash: Some(MockChain::block_hash(block)),
        block_number: Some(block),
        transaction_hash: Some(tx_hash(block * 1_000 + log_index)),
        transaction_index: Some(0),
        log_index: Some(log_index),
        ..Default::default()
    }
}

/// Block heights of emitted block items, in emission order.
#[must_use]
pub fn block_numbers(items: &[TriggerItem]) -> Vec<BlockNumber> {
    items
        .iter()
        .filter_map(|item| match item {
            TriggerItem::Block(block) => Some(block.number),
            _ => None,
        })
        .collect()
}

/// Hashes of emitted transaction items, in emission order.
#[must_use]
pub fn transaction_hashes(items: &[TriggerItem]) -> Vec<TxHash> {
    items
        .iter()
        .filter_map(|item| match item {
            TriggerItem::Transaction(matched) => Some(matched.transaction.hash),
            _ => None,
        })
        .collect()
}
