//! Trigger configuration, loaded from YAML, JSON or TOML files.

use std::{collections::BTreeMap, fmt, path::Path, time::Duration};

use config::{Config, File, FileFormat};
use serde::{
    Deserialize, Deserializer,
    de::{self, Visitor},
};
use serde_json::Value;

use crate::{
    decoder::EventDecoder,
    error::TriggerError,
    event_filter::LogFilter,
    matcher::{AddressSet, Direction, TransactionMatcher},
    range_planner::DEFAULT_BLOCK_LIMIT,
    recent_hashes::{DEFAULT_MAX_RECENT_HASHES, DEFAULT_RETAIN_RECENT_HASHES},
    robust_provider::{RobustProvider, RobustProviderBuilder},
    trigger::{ContractEventSettings, StreamSettings, TransactionSettings},
};

/// Environment variable that replaces `rpc.url` when set.
pub const RPC_URL_ENV: &str = "EVM_TRIGGER_RPC_URL";

pub const DEFAULT_POLLING_INTERVAL_MS: u64 = 12_000;

fn default_block_limit() -> u64 {
    DEFAULT_BLOCK_LIMIT
}

fn default_polling_interval_ms() -> u64 {
    DEFAULT_POLLING_INTERVAL_MS
}

fn default_timeout_ms() -> u64 {
    60_000
}

fn default_min_delay_ms() -> u64 {
    1_000
}

fn default_max_size() -> usize {
    DEFAULT_MAX_RECENT_HASHES
}

fn default_retain_size() -> usize {
    DEFAULT_RETAIN_RECENT_HASHES
}

#[derive(Debug, Clone, Deserialize)]
pub struct TriggerConfig {
    pub rpc: RpcConfig,

    /// Which stream to follow and its filter options.
    pub stream: StreamConfig,

    /// Maximum number of blocks covered by one fetch.
    #[serde(default = "default_block_limit")]
    pub block_limit: u64,

    /// Interval between polls when the trigger drives its own timer.
    #[serde(default = "default_polling_interval_ms")]
    pub polling_interval_ms: u64,

    #[serde(default)]
    pub recent_hashes: RecentHashesConfig,
}

/// Endpoint settings. The transport is picked from the URL scheme.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    pub url: String,

    /// Extra headers sent with every HTTP request.
    #[serde(default)]
    pub custom_headers: BTreeMap<String, String>,

    /// Endpoints tried in order when the primary one fails.
    #[serde(default)]
    pub fallback_urls: Vec<String>,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Retries per endpoint after the first attempt. Zero disables retrying.
    #[serde(default)]
    pub max_retries: usize,

    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,
}

impl RpcConfig {
    /// Connects to the primary and fallback endpoints.
    ///
    /// # Errors
    ///
    /// Returns [`TriggerError::Configuration`] for unsupported URLs, or a remote
    /// error when a websocket endpoint cannot be reached.
    pub async fn connect(&self) -> Result<RobustProvider, TriggerError> {
        let mut builder = RobustProviderBuilder::new(self.url.clone())
            .headers(self.custom_headers.clone())
            .max_timeout(Duration::from_millis(self.timeout_ms))
            .max_retries(self.max_retries)
            .min_delay(Duration::from_millis(self.min_delay_ms));
        for url in &self.fallback_urls {
            builder = builder.fallback(url.clone());
        }
        Ok(builder.build().await?)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StreamConfig {
    NewBlock,
    ContractEvent {
        /// Comma-separated contract addresses. Empty watches every contract.
        #[serde(default)]
        addresses: String,
        /// JSON ABI, inline or as a string holding the JSON.
        #[serde(default)]
        abi: Option<Value>,
        #[serde(default)]
        event_name: Option<String>,
        /// Topics array used instead of an ABI event.
        #[serde(default)]
        topics: Option<Value>,
        #[serde(default)]
        from_block: FromBlock,
    },
    Transaction {
        /// Comma-separated watched addresses.
        #[serde(default)]
        addresses: String,
        #[serde(default)]
        direction: Direction,
        #[serde(default)]
        from_block: FromBlock,
    },
}

impl StreamConfig {
    /// Resolves addresses, ABI and topics into the settings a
    /// [`Trigger`](crate::Trigger) runs with.
    ///
    /// # Errors
    ///
    /// Returns [`TriggerError::Configuration`] describing the first invalid option.
    pub fn settings(&self) -> Result<StreamSettings, TriggerError> {
        match self {
            StreamConfig::NewBlock => Ok(StreamSettings::NewBlock),
            StreamConfig::ContractEvent { addresses, abi, event_name, topics, from_block } => {
                let addresses = AddressSet::parse(addresses)?;
                let filter = LogFilter::new().with_contract_addresses(addresses.iter().copied());

                let (filter, decoder) = match (abi, event_name, topics) {
                    (Some(abi), Some(event_name), None) => {
                        let decoder = EventDecoder::from_abi(abi, event_name)?;
                        (filter.with_event_signature(decoder.selector()), Some(decoder))
                    }
                    (None, None, Some(topics)) => (filter.with_topics_json(topics)?, None),
                    (Some(_), None, None) => {
                        return Err(TriggerError::config("event_name is required with abi"));
                    }
                    (None, Some(_), None) => {
                        return Err(TriggerError::config("abi is required with event_name"));
                    }
                    (None, None, None) => {
                        return Err(TriggerError::config(
                            "Either abi with event_name or topics is required",
                        ));
                    }
                    (_, _, Some(_)) => {
                        return Err(TriggerError::config(
                            "abi/event_name and topics are mutually exclusive",
                        ));
                    }
                };

                Ok(StreamSettings::ContractEvent(ContractEventSettings {
                    filter,
                    decoder,
                    from_block: *from_block,
                }))
            }
            StreamConfig::Transaction { addresses, direction, from_block } => {
                let matcher = TransactionMatcher::new(AddressSet::parse(addresses)?, *direction)?;
                Ok(StreamSettings::Transaction(TransactionSettings {
                    matcher,
                    from_block: *from_block,
                }))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RecentHashesConfig {
    /// Size above which the set is trimmed.
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    /// Number of newest hashes kept by a trim.
    #[serde(default = "default_retain_size")]
    pub retain_size: usize,
}

impl Default for RecentHashesConfig {
    fn default() -> Self {
        Self { max_size: DEFAULT_MAX_RECENT_HASHES, retain_size: DEFAULT_RETAIN_RECENT_HASHES }
    }
}

/// Where a stream without a cursor starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FromBlock {
    /// Start at the current head without emitting history.
    #[default]
    Latest,
    /// Backfill from genesis.
    Earliest,
    /// Backfill from the given height.
    Custom(u64),
}

impl<'de> Deserialize<'de> for FromBlock {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct FromBlockVisitor;

        impl<'de> Visitor<'de> for FromBlockVisitor {
            type Value = FromBlock;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a block number, 'latest' or 'earliest'")
            }

            fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(FromBlock::Custom(value))
            }

            fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                u64::try_from(value)
                    .map(FromBlock::Custom)
                    .map_err(|_| de::Error::invalid_value(de::Unexpected::Signed(value), &self))
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                if value.eq_ignore_ascii_case("latest") {
                    Ok(FromBlock::Latest)
                } else if value.eq_ignore_ascii_case("earliest") {
                    Ok(FromBlock::Earliest)
                } else if let Ok(height) = value.parse::<u64>() {
                    Ok(FromBlock::Custom(height))
                } else {
                    Err(de::Error::invalid_value(de::Unexpected::Str(value), &self))
                }
            }
        }

        deserializer.deserialize_any(FromBlockVisitor)
    }
}

impl TriggerConfig {
    /// Reads the configuration file at `path`, format chosen by its extension,
    /// and applies [`RPC_URL_ENV`].
    ///
    /// # Errors
    ///
    /// Returns [`TriggerError::Configuration`] if the file cannot be read or parsed
    /// or fails [`TriggerConfig::validate`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TriggerError> {
        let path = path.as_ref();
        let source = Config::builder()
            .add_source(File::from(path))
            .set_override_option("rpc.url", std::env::var(RPC_URL_ENV).ok())
            .map_err(|e| TriggerError::config(e.to_string()))?;
        Self::from_builder(source)
            .map_err(|e| TriggerError::config(format!("{}: {e}", path.display())))
    }

    /// Parses configuration text in the given format.
    ///
    /// # Errors
    ///
    /// Same as [`TriggerConfig::load`].
    pub fn parse(content: &str, format: FileFormat) -> Result<Self, TriggerError> {
        Self::from_builder(Config::builder().add_source(File::from_str(content, format)))
    }

    fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, TriggerError> {
        let config: Self = builder
            .build()
            .and_then(Config::try_deserialize)
            .map_err(|e| TriggerError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns [`TriggerError::Configuration`] describing the first invalid option.
    pub fn validate(&self) -> Result<(), TriggerError> {
        if self.rpc.url.trim().is_empty() {
            return Err(TriggerError::config("rpc.url is required"));
        }
        if self.block_limit == 0 {
            return Err(TriggerError::config("block_limit must be at least 1"));
        }
        if self.polling_interval_ms == 0 {
            return Err(TriggerError::config("polling_interval_ms must be at least 1"));
        }
        if self.rpc.timeout_ms == 0 {
            return Err(TriggerError::config("rpc.timeout_ms must be at least 1"));
        }
        let hashes = self.recent_hashes;
        if hashes.max_size == 0 || hashes.retain_size == 0 {
            return Err(TriggerError::config("recent_hashes sizes must be at least 1"));
        }
        if hashes.retain_size > hashes.max_size {
            return Err(TriggerError::config(format!(
                "recent_hashes.retain_size ({}) exceeds max_size ({})",
                hashes.retain_size, hashes.max_size
            )));
        }
        self.stream.settings().map(|_| ())
    }

    #[must_use]
    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.polling_interval_ms)
    }
}
