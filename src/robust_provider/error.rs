use std::{sync::Arc, time::Duration};

use alloy::{
    eips::BlockId,
    transports::{RpcError, TransportErrorKind},
};
use thiserror::Error;

use crate::error::describe_rpc_error;

/// Failure of a call routed through [`RobustProvider`](super::RobustProvider),
/// after retries and fallbacks were exhausted.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// The last endpoint tried did not answer within the per-call timeout.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("RPC call failed: {}", describe_rpc_error(.0))]
    RpcError(Arc<RpcError<TransportErrorKind>>),
    #[error("Block not found, Block Id: {0}")]
    BlockNotFound(BlockId),
    /// The endpoint could not be turned into a transport: bad URL, unsupported
    /// scheme or invalid header.
    #[error("Invalid RPC endpoint: {0}")]
    InvalidEndpoint(String),
}

impl From<RpcError<TransportErrorKind>> for Error {
    fn from(err: RpcError<TransportErrorKind>) -> Self {
        Error::RpcError(Arc::new(err))
    }
}
