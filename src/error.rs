use std::sync::Arc;

use alloy::{
    eips::BlockId,
    primitives::BlockNumber,
    rpc::json_rpc::ErrorPayload,
    sol_types::decode_revert_reason,
    transports::{RpcError, TransportErrorKind},
};
use serde::Serialize;
use thiserror::Error;

use crate::robust_provider::Error as RobustProviderError;

/// Failure of a poll cycle. The cursor is never advanced when one of these is returned.
///
/// Display strings are stable: callers classify failures by matching on them.
#[derive(Error, Debug, Clone)]
pub enum TriggerError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Remote unavailable: {}", describe_rpc_error(.0))]
    RemoteUnavailable(Arc<RpcError<TransportErrorKind>>),

    #[error("Operation timed out")]
    Timeout,

    #[error("Block not found, Block Id: {0}")]
    BlockNotFound(BlockId),

    #[error("Block {0} was returned without full transaction objects")]
    IncompleteBlock(BlockNumber),

    #[error("State store error: {0}")]
    State(String),

    #[error("Service is shutting down")]
    ServiceShutdown,

    #[error("Only one subscriber allowed at a time")]
    MultipleSubscribers,
}

impl TriggerError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        TriggerError::Configuration(message.into())
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            TriggerError::Configuration(_) => ErrorKind::Configuration,
            TriggerError::Timeout => ErrorKind::Timeout,
            TriggerError::BlockNotFound(_) => ErrorKind::NotFound,
            TriggerError::IncompleteBlock(_) => ErrorKind::Transport,
            TriggerError::RemoteUnavailable(err) => classify_rpc_error(err),
            TriggerError::State(_)
            | TriggerError::ServiceShutdown
            | TriggerError::MultipleSubscribers => ErrorKind::Unknown,
        }
    }

    /// Revert reason carried by the underlying RPC error, if any.
    #[must_use]
    pub fn revert_reason(&self) -> Option<String> {
        match self {
            TriggerError::RemoteUnavailable(err) => match err.as_ref() {
                RpcError::ErrorResp(payload) => revert_reason(payload),
                _ => None,
            },
            _ => None,
        }
    }

    #[must_use]
    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            error: self.to_string(),
            error_type: self.kind(),
            revert_reason: self.revert_reason(),
        }
    }
}

impl From<RobustProviderError> for TriggerError {
    fn from(error: RobustProviderError) -> TriggerError {
        match error {
            RobustProviderError::Timeout(_) => TriggerError::Timeout,
            RobustProviderError::RpcError(err) => TriggerError::RemoteUnavailable(err),
            RobustProviderError::BlockNotFound(block) => TriggerError::BlockNotFound(block),
            RobustProviderError::InvalidEndpoint(msg) => TriggerError::Configuration(msg),
        }
    }
}

impl From<RpcError<TransportErrorKind>> for TriggerError {
    fn from(error: RpcError<TransportErrorKind>) -> Self {
        TriggerError::RemoteUnavailable(Arc::new(error))
    }
}

/// Coarse failure category, for hosts that route failures by type.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    ContractExecution,
    InsufficientFunds,
    Nonce,
    UserRejection,
    Timeout,
    Transport,
    NotFound,
    Configuration,
    Unknown,
}

/// Serializable failure description emitted in place of items.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub error: String,
    pub error_type: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revert_reason: Option<String>,
}

/// Human readable, cause-specific description of an RPC failure.
#[must_use]
pub fn describe_rpc_error(err: &RpcError<TransportErrorKind>) -> String {
    match err {
        RpcError::ErrorResp(payload) => describe_error_payload(payload),
        RpcError::NullResp => "RPC returned an empty response".to_string(),
        RpcError::Transport(kind) => format!("Transport error: {kind}"),
        other => other.to_string(),
    }
}

fn describe_error_payload(payload: &ErrorPayload) -> String {
    if let Some(reason) = revert_reason(payload) {
        return format!("Contract reverted: {reason}");
    }
    if payload.message.to_ascii_lowercase().contains("revert") {
        return "Contract execution reverted".to_string();
    }
    payload.message.to_string()
}

fn revert_reason(payload: &ErrorPayload) -> Option<String> {
    if let Some((_, reason)) = payload.message.split_once("execution reverted:") {
        let reason = reason.trim();
        if !reason.is_empty() {
            return Some(reason.to_string());
        }
    }
    let data = payload.as_revert_data()?;
    let reason = decode_revert_reason(&data)?;
    Some(reason.strip_prefix("revert: ").unwrap_or(&reason).to_string())
}

fn classify_rpc_error(err: &RpcError<TransportErrorKind>) -> ErrorKind {
    let message = match err {
        RpcError::ErrorResp(payload) => payload.message.to_ascii_lowercase(),
        RpcError::Transport(_) => return ErrorKind::Transport,
        other => other.to_string().to_ascii_lowercase(),
    };

    if message.contains("revert") {
        ErrorKind::ContractExecution
    } else if message.contains("insufficient funds") || message.contains("insufficient balance") {
        ErrorKind::InsufficientFunds
    } else if message.contains("nonce") || message.contains("transaction count") {
        ErrorKind::Nonce
    } else if message.contains("user rejected") {
        ErrorKind::UserRejection
    } else {
        ErrorKind::Unknown
    }
}
