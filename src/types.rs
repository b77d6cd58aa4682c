use std::{fmt, ops::RangeInclusive};

use alloy::primitives::BlockNumber;
use serde::{Deserialize, Serialize};

/// Inclusive `[from, to]` block interval queried in one fetch.
pub type BlockRange = RangeInclusive<BlockNumber>;

#[derive(Debug, Clone, PartialEq)]
pub enum ScannerMessage<T: Clone, E: std::error::Error + Clone> {
    Data(T),
    Error(E),
    Status(PollStatus),
}

#[derive(Copy, Debug, Clone, PartialEq, Eq)]
pub enum PollStatus {
    /// First poll of a stream stored its baseline height.
    Initialized { baseline: BlockNumber },
    /// The poll found no new blocks, or new blocks with nothing to emit.
    CaughtUp { cursor: BlockNumber },
}

/// The three watch streams a trigger can follow.
#[derive(Copy, Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StreamKind {
    NewBlock,
    ContractEvent,
    Transaction,
}

impl StreamKind {
    /// Key under which the stream's cursor lives in the static state.
    #[must_use]
    pub fn state_key(self) -> &'static str {
        match self {
            StreamKind::NewBlock => "lastBlock",
            StreamKind::ContractEvent => "lastEventBlock",
            StreamKind::Transaction => "lastTxBlock",
        }
    }
}

/// Renders numbers as decimal strings, e.g. `"18000000"`.
pub(crate) mod decimal {
    use std::fmt::Display;

    use serde::Serializer;

    pub(crate) fn serialize<T: Display, S: Serializer>(
        value: &T,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub(crate) mod option {
        use std::fmt::Display;

        use serde::Serializer;

        pub(crate) fn serialize<T: Display, S: Serializer>(
            value: &Option<T>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(value) => serializer.collect_str(value),
                None => serializer.serialize_none(),
            }
        }
    }
}

/// Renders addresses with their EIP-55 checksum, the form decoded event
/// arguments use as well.
pub(crate) mod checksum {
    use alloy::primitives::Address;
    use serde::Serializer;

    pub(crate) fn serialize<S: Serializer>(
        address: &Address,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&address.to_checksum(None))
    }

    pub(crate) mod option {
        use alloy::primitives::Address;
        use serde::Serializer;

        pub(crate) fn serialize<S: Serializer>(
            address: &Option<Address>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match address {
                Some(address) => super::serialize(address, serializer),
                None => serializer.serialize_none(),
            }
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StreamKind::NewBlock => "newBlock",
            StreamKind::ContractEvent => "contractEvent",
            StreamKind::Transaction => "transaction",
        };
        f.write_str(name)
    }
}
