pub mod config;
pub mod cursor;
pub mod decoder;
pub mod error;
pub mod event_filter;
pub mod fetcher;
pub mod matcher;
pub mod poller;
pub mod range_planner;
pub mod recent_hashes;
pub mod robust_provider;
pub mod state_store;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod trigger;
pub mod types;

pub use types::{BlockRange, PollStatus, ScannerMessage, StreamKind};

pub use config::{FromBlock, RpcConfig, StreamConfig, TriggerConfig};
pub use cursor::{Cursor, CursorStore};
pub use decoder::{EventDecoder, LogEvent, LogPayload};
pub use error::{ErrorKind, ErrorReport, TriggerError};
pub use event_filter::LogFilter;
pub use fetcher::{BlockFetcher, BlockSummary, BlockWithTransactions, ChainSource, ChainTransaction};
pub use matcher::{AddressSet, Direction, MatchedTransaction, TransactionMatcher};
pub use poller::{Poller, PollerClient, TriggerMessage};
pub use range_planner::plan_ranges;
pub use recent_hashes::RecentHashSet;
pub use robust_provider::{RobustProvider, RobustProviderBuilder};
pub use state_store::{FileStateStore, MemoryStateStore, StateStore};
pub use trigger::{
    ContractEventSettings, PollOutcome, StreamSettings, TransactionSettings, Trigger, TriggerItem,
};
