use std::fmt::{Debug, Display};

use alloy::{
    primitives::{Address, B256},
    rpc::types::{Filter, Log, Topic, ValueOrArray},
};
use serde::Deserialize;
use serde_json::Value;

use crate::{error::TriggerError, types::BlockRange};

/// Number of indexed topic positions a log can carry.
pub const MAX_TOPICS: usize = 4;

/// Type representing filters to apply when fetching logs from the chain.
///
/// # Examples
///
/// ```rust
/// use alloy::primitives::{address, b256};
/// use evm_trigger::LogFilter;
///
/// let filter = LogFilter::new()
///     .with_contract_address(address!("0xd8dA6BF26964af9d7eed9e03e53415d37aa96045"))
///     .with_topic(0, b256!("0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"));
///
/// assert_eq!(filter.addresses().len(), 1);
/// ```
#[derive(Clone, Default)]
pub struct LogFilter {
    /// Contracts to filter logs from. If empty, logs from all contracts are tracked.
    pub(crate) addresses: Vec<Address>,
    /// Per-position topic sets. An empty set matches any value at that position.
    pub(crate) topics: [Topic; MAX_TOPICS],
}

impl Display for LogFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut content = vec![];
        if !self.addresses.is_empty() {
            let addresses =
                self.addresses.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
            content.push(format!("addresses: [{addresses}]"));
        }
        for (position, topic) in self.topics.iter().enumerate() {
            // No guarantee the order of values returned by `Topic`
            let Some(value_or_array) = topic.to_value_or_array() else {
                continue;
            };
            let values = match value_or_array {
                ValueOrArray::Value(value) => format!("{value}"),
                ValueOrArray::Array(arr) => {
                    arr.iter().map(|t| format!("{t}")).collect::<Vec<_>>().join(", ")
                }
            };
            content.push(format!("topic{position}: [{values}]"));
        }

        write!(f, "LogFilter({})", content.join(", "))
    }
}

impl Debug for LogFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

impl LogFilter {
    /// Creates a new [`LogFilter`] matching every log.
    #[must_use]
    pub fn new() -> Self {
        LogFilter::default()
    }

    /// Adds a contract address to filter logs from.
    #[must_use]
    pub fn with_contract_address(mut self, address: impl Into<Address>) -> Self {
        let address = address.into();
        if !self.addresses.contains(&address) {
            self.addresses.push(address);
        }
        self
    }

    /// Adds several contract addresses to filter logs from.
    #[must_use]
    pub fn with_contract_addresses(
        mut self,
        addresses: impl IntoIterator<Item = impl Into<Address>>,
    ) -> Self {
        for address in addresses {
            self = self.with_contract_address(address);
        }
        self
    }

    /// Restricts topic0 to the given event signature hash.
    #[must_use]
    pub fn with_event_signature(self, signature: B256) -> Self {
        self.with_topic(0, signature)
    }

    /// Adds accepted values at a topic position. Values added to the same
    /// position are alternatives. Positions past [`MAX_TOPICS`] are ignored.
    #[must_use]
    pub fn with_topic(mut self, position: usize, topic: impl Into<Topic>) -> Self {
        if let Some(slot) = self.topics.get_mut(position) {
            *slot = std::mem::take(slot).extend(topic.into());
        }
        self
    }

    /// Parses a topics argument of up to four positions, where each entry is a
    /// hash, `null` for any value, or an array of alternative hashes.
    ///
    /// The argument may be a JSON array or a string holding one.
    ///
    /// # Errors
    ///
    /// Returns [`TriggerError::Configuration`] for malformed JSON, invalid hashes
    /// or more than four positions.
    pub fn with_topics_json(mut self, topics: &Value) -> Result<Self, TriggerError> {
        let entries: Vec<Option<TopicEntry>> = match topics {
            Value::String(raw) => serde_json::from_str(raw),
            other => serde_json::from_value(other.clone()),
        }
        .map_err(|e| TriggerError::config(format!("Invalid topics JSON: {e}")))?;

        if entries.len() > MAX_TOPICS {
            return Err(TriggerError::config(format!(
                "At most {MAX_TOPICS} topics are allowed, got {}",
                entries.len()
            )));
        }

        for (position, entry) in entries.into_iter().enumerate() {
            self = match entry {
                None => self,
                Some(TopicEntry::One(hash)) => self.with_topic(position, hash),
                Some(TopicEntry::Any(hashes)) => self.with_topic(position, hashes),
            };
        }
        Ok(self)
    }

    #[must_use]
    pub fn addresses(&self) -> &[Address] {
        &self.addresses
    }

    #[must_use]
    pub fn topics(&self) -> &[Topic; MAX_TOPICS] {
        &self.topics
    }

    /// Builds the `eth_getLogs` filter for one block range.
    #[must_use]
    pub fn to_filter(&self, range: &BlockRange) -> Filter {
        Filter::from(self).from_block(*range.start()).to_block(*range.end())
    }

    /// Whether `log` passes the address and topic constraints.
    #[must_use]
    pub fn matches(&self, log: &Log) -> bool {
        if !self.addresses.is_empty() && !self.addresses.contains(&log.address()) {
            return false;
        }
        let log_topics = log.topics();
        self.topics.iter().enumerate().all(|(position, topic)| {
            topic.is_empty() || log_topics.get(position).is_some_and(|value| topic.matches(value))
        })
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TopicEntry {
    One(B256),
    Any(Vec<B256>),
}

impl From<&LogFilter> for Filter {
    fn from(value: &LogFilter) -> Self {
        let mut filter = Filter::new();
        if !value.addresses.is_empty() {
            filter = filter.address(value.addresses.clone());
        }
        let [topic0, topic1, topic2, topic3] = value.topics.clone();
        if !topic0.is_empty() {
            filter = filter.event_signature(topic0);
        }
        if !topic1.is_empty() {
            filter = filter.topic1(topic1);
        }
        if !topic2.is_empty() {
            filter = filter.topic2(topic2);
        }
        if !topic3.is_empty() {
            filter = filter.topic3(topic3);
        }
        filter
    }
}

impl From<LogFilter> for Filter {
    fn from(value: LogFilter) -> Self {
        Filter::from(&value)
    }
}
