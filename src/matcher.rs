//! Address/direction filtering and de-duplication of a block's transactions.

use std::{collections::HashSet, fmt, str::FromStr};

use alloy::primitives::{Address, utils::format_ether};
use serde::{Deserialize, Serialize};

use crate::{error::TriggerError, fetcher::ChainTransaction, recent_hashes::RecentHashSet};

/// Which side of a transaction must touch a watched address.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Sent by or received by a watched address.
    #[default]
    All,
    From,
    To,
    /// Like `All`, restricted to transfers carrying a non-zero value.
    Value,
}

impl FromStr for Direction {
    type Err = TriggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Direction::All),
            "from" => Ok(Direction::From),
            "to" => Ok(Direction::To),
            "value" => Ok(Direction::Value),
            other => Err(TriggerError::config(format!("Unknown direction \"{other}\""))),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Direction::All => "all",
            Direction::From => "from",
            Direction::To => "to",
            Direction::Value => "value",
        };
        f.write_str(name)
    }
}

/// Set of watched addresses. Membership ignores hex letter case.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AddressSet(HashSet<Address>);

impl AddressSet {
    /// Parses a comma-separated address list. Blank entries are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`TriggerError::Configuration`] naming the first malformed entry.
    pub fn parse(list: &str) -> Result<Self, TriggerError> {
        list.split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| {
                Address::from_str(entry)
                    .map_err(|e| TriggerError::config(format!("Invalid address \"{entry}\": {e}")))
            })
            .collect::<Result<HashSet<_>, _>>()
            .map(AddressSet)
    }

    #[must_use]
    pub fn contains(&self, address: &Address) -> bool {
        self.0.contains(address)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Address> {
        self.0.iter()
    }
}

impl FromIterator<Address> for AddressSet {
    fn from_iter<I: IntoIterator<Item = Address>>(iter: I) -> Self {
        AddressSet(iter.into_iter().collect())
    }
}

/// A transaction accepted by the direction predicate and not seen before.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MatchedTransaction {
    #[serde(flatten)]
    pub transaction: ChainTransaction,
    /// `value` in ether with full 18 decimal precision.
    #[serde(rename = "valueEth")]
    pub value_eth: String,
}

impl From<ChainTransaction> for MatchedTransaction {
    fn from(transaction: ChainTransaction) -> Self {
        let value_eth = format_ether(transaction.value);
        Self { transaction, value_eth }
    }
}

#[derive(Clone, Debug)]
pub struct TransactionMatcher {
    addresses: AddressSet,
    direction: Direction,
}

impl TransactionMatcher {
    /// # Errors
    ///
    /// Returns [`TriggerError::Configuration`] when `addresses` is empty.
    pub fn new(addresses: AddressSet, direction: Direction) -> Result<Self, TriggerError> {
        if addresses.is_empty() {
            return Err(TriggerError::config("At least one address is required"));
        }
        Ok(Self { addresses, direction })
    }

    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    #[must_use]
    pub fn addresses(&self) -> &AddressSet {
        &self.addresses
    }

    /// Evaluates the direction predicate alone, ignoring previously seen hashes.
    #[must_use]
    pub fn is_match(&self, tx: &ChainTransaction) -> bool {
        let from_match = self.addresses.contains(&tx.from);
        let to_match = tx.to.is_some_and(|to| self.addresses.contains(&to));
        match self.direction {
            Direction::All => from_match || to_match,
            Direction::From => from_match,
            Direction::To => to_match,
            Direction::Value => (from_match || to_match) && !tx.value.is_zero(),
        }
    }

    /// Returns the matching transactions of one block, in block order, skipping
    /// any whose hash is already in `recent`. Each emitted hash is recorded in
    /// `recent`; trimming is left to the caller.
    pub fn select(
        &self,
        transactions: &[ChainTransaction],
        recent: &mut RecentHashSet,
    ) -> Vec<MatchedTransaction> {
        let mut matched = Vec::new();
        for tx in transactions {
            if recent.contains(&tx.hash) || !self.is_match(tx) {
                continue;
            }
            recent.insert(tx.hash);
            matched.push(MatchedTransaction::from(tx.clone()));
        }
        matched
    }
}
