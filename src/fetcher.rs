//! Remote chain access used by the poll cycle.

use alloy::{
    consensus::Transaction as _,
    eips::{BlockNumberOrTag, Typed2718 as _},
    primitives::{Address, BlockHash, BlockNumber, Bytes, TxHash, U256},
    rpc::types::{Block, Log, Transaction},
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat};
use serde::{Serialize, Serializer};
use tracing::debug;

use crate::{
    error::TriggerError, event_filter::LogFilter, robust_provider::RobustProvider,
    types::BlockRange,
};

/// Read-only view of the chain the trigger polls.
#[async_trait]
pub trait ChainSource: Send + Sync {
    /// Latest block height.
    async fn head(&self) -> Result<BlockNumber, TriggerError>;

    async fn block_header(&self, number: BlockNumber) -> Result<BlockSummary, TriggerError>;

    async fn block_with_transactions(
        &self,
        number: BlockNumber,
    ) -> Result<BlockWithTransactions, TriggerError>;

    /// Logs matching `filter` within `range`, in chain order.
    async fn logs(&self, filter: &LogFilter, range: BlockRange) -> Result<Vec<Log>, TriggerError>;
}

/// Header fields emitted for each new block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockSummary {
    #[serde(serialize_with = "crate::types::decimal::serialize")]
    pub number: BlockNumber,
    pub hash: BlockHash,
    pub parent_hash: BlockHash,
    #[serde(serialize_with = "crate::types::decimal::serialize")]
    pub timestamp: u64,
    /// RFC 3339 rendering of `timestamp`, empty if out of range.
    pub timestamp_date: String,
    pub transactions_count: usize,
    #[serde(serialize_with = "crate::types::checksum::serialize")]
    pub miner: Address,
    #[serde(serialize_with = "crate::types::decimal::serialize")]
    pub gas_limit: u64,
    #[serde(serialize_with = "crate::types::decimal::serialize")]
    pub gas_used: u64,
    #[serde(
        serialize_with = "crate::types::decimal::option::serialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub base_fee_per_gas: Option<u64>,
    #[serde(
        serialize_with = "crate::types::decimal::option::serialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub difficulty: Option<U256>,
    pub extra_data: Bytes,
}

impl BlockSummary {
    /// Summary of an empty block; remaining fields default to zero.
    #[must_use]
    pub fn new(number: BlockNumber, hash: BlockHash, parent_hash: BlockHash, timestamp: u64) -> Self {
        Self {
            number,
            hash,
            parent_hash,
            timestamp,
            timestamp_date: timestamp_date(timestamp),
            transactions_count: 0,
            miner: Address::ZERO,
            gas_limit: 0,
            gas_used: 0,
            base_fee_per_gas: None,
            difficulty: None,
            extra_data: Bytes::new(),
        }
    }
}

impl From<&Block> for BlockSummary {
    fn from(block: &Block) -> Self {
        let header = &block.header;
        Self {
            number: header.number,
            hash: header.hash,
            parent_hash: header.parent_hash,
            timestamp: header.timestamp,
            timestamp_date: timestamp_date(header.timestamp),
            transactions_count: block.transactions.len(),
            miner: header.beneficiary,
            gas_limit: header.gas_limit,
            gas_used: header.gas_used,
            base_fee_per_gas: header.base_fee_per_gas,
            // post-merge blocks report zero difficulty
            difficulty: (!header.difficulty.is_zero()).then_some(header.difficulty),
            extra_data: header.extra_data.clone(),
        }
    }
}

fn timestamp_date(timestamp: u64) -> String {
    i64::try_from(timestamp)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|date| date.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_default()
}

/// A transaction as seen by the direction matcher and emitted downstream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainTransaction {
    pub hash: TxHash,
    #[serde(serialize_with = "crate::types::checksum::serialize")]
    pub from: Address,
    /// `None` for contract creations.
    #[serde(serialize_with = "crate::types::checksum::option::serialize")]
    pub to: Option<Address>,
    #[serde(serialize_with = "crate::types::decimal::serialize")]
    pub value: U256,
    #[serde(serialize_with = "crate::types::decimal::option::serialize")]
    pub block_number: Option<BlockNumber>,
    pub block_hash: Option<BlockHash>,
    pub transaction_index: Option<u64>,
    pub nonce: u64,
    #[serde(serialize_with = "crate::types::decimal::serialize")]
    pub gas: u64,
    #[serde(
        serialize_with = "crate::types::decimal::option::serialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub gas_price: Option<u128>,
    #[serde(
        serialize_with = "crate::types::decimal::option::serialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_fee_per_gas: Option<u128>,
    #[serde(
        serialize_with = "crate::types::decimal::option::serialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_priority_fee_per_gas: Option<u128>,
    pub input: Bytes,
    #[serde(rename = "type", serialize_with = "serialize_tx_type")]
    pub tx_type: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
}

impl ChainTransaction {
    /// Plain value transfer with every other field zeroed.
    #[must_use]
    pub fn transfer(hash: TxHash, from: Address, to: Option<Address>, value: U256) -> Self {
        Self {
            hash,
            from,
            to,
            value,
            block_number: None,
            block_hash: None,
            transaction_index: None,
            nonce: 0,
            gas: 21_000,
            gas_price: None,
            max_fee_per_gas: None,
            max_priority_fee_per_gas: None,
            input: Bytes::new(),
            tx_type: 0,
            chain_id: None,
        }
    }
}

impl From<&Transaction> for ChainTransaction {
    fn from(tx: &Transaction) -> Self {
        Self {
            hash: *tx.inner.tx_hash(),
            from: tx.inner.signer(),
            to: tx.to(),
            value: tx.value(),
            block_number: tx.block_number,
            block_hash: tx.block_hash,
            transaction_index: tx.transaction_index,
            nonce: tx.nonce(),
            gas: tx.gas_limit(),
            gas_price: tx.effective_gas_price.or_else(|| tx.gas_price()),
            max_fee_per_gas: tx.is_dynamic_fee().then(|| tx.max_fee_per_gas()),
            max_priority_fee_per_gas: tx.max_priority_fee_per_gas(),
            input: tx.input().clone(),
            tx_type: tx.ty(),
            chain_id: tx.chain_id(),
        }
    }
}

fn serialize_tx_type<S: Serializer>(ty: &u8, serializer: S) -> Result<S::Ok, S::Error> {
    let name = match ty {
        0 => "legacy",
        1 => "eip2930",
        2 => "eip1559",
        3 => "eip4844",
        4 => "eip7702",
        _ => return serializer.collect_str(&format_args!("0x{ty:x}")),
    };
    serializer.serialize_str(name)
}

/// A block together with its full transaction objects.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockWithTransactions {
    pub header: BlockSummary,
    pub transactions: Vec<ChainTransaction>,
}

impl TryFrom<&Block> for BlockWithTransactions {
    type Error = TriggerError;

    /// Fails unless the block carries full transaction objects; a hash-only
    /// block would otherwise look empty and its transactions would be skipped.
    fn try_from(block: &Block) -> Result<Self, Self::Error> {
        let Some(transactions) = block.transactions.as_transactions() else {
            return Err(TriggerError::IncompleteBlock(block.header.number));
        };
        Ok(Self {
            header: BlockSummary::from(block),
            transactions: transactions.iter().map(ChainTransaction::from).collect(),
        })
    }
}

/// [`ChainSource`] backed by a JSON-RPC endpoint.
#[derive(Clone, Debug)]
pub struct BlockFetcher {
    provider: RobustProvider,
}

impl BlockFetcher {
    #[must_use]
    pub fn new(provider: RobustProvider) -> Self {
        Self { provider }
    }

    #[must_use]
    pub fn provider(&self) -> &RobustProvider {
        &self.provider
    }
}

#[async_trait]
impl ChainSource for BlockFetcher {
    async fn head(&self) -> Result<BlockNumber, TriggerError> {
        Ok(self.provider.get_block_number().await?)
    }

    async fn block_header(&self, number: BlockNumber) -> Result<BlockSummary, TriggerError> {
        let block = self.provider.get_block_by_number(BlockNumberOrTag::Number(number), false).await?;
        Ok(BlockSummary::from(&block))
    }

    async fn block_with_transactions(
        &self,
        number: BlockNumber,
    ) -> Result<BlockWithTransactions, TriggerError> {
        let block = self.provider.get_block_by_number(BlockNumberOrTag::Number(number), true).await?;
        let block = BlockWithTransactions::try_from(&block)?;
        debug!(block = number, tx_count = block.transactions.len(), "Fetched block with transactions");
        Ok(block)
    }

    async fn logs(&self, filter: &LogFilter, range: BlockRange) -> Result<Vec<Log>, TriggerError> {
        let logs = self.provider.get_logs(&filter.to_filter(&range)).await?;
        debug!(block_range = ?range, log_count = logs.len(), "Fetched logs");
        Ok(logs)
    }
}
