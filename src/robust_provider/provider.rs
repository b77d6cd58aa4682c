use std::{fmt::Debug, future::Future, time::Duration};

use alloy::{
    eips::BlockNumberOrTag,
    network::{Ethereum, Network},
    providers::{Provider, RootProvider},
    rpc::types::{Filter, Log},
    transports::{RpcError, TransportErrorKind},
};
use backon::{ExponentialBuilder, Retryable};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::robust_provider::Error;

/// Provider wrapper with timeout, optional retry and fallback endpoints.
///
/// Every call goes to the primary endpoint first, then to each fallback in order.
#[derive(Clone, Debug)]
pub struct RobustProvider<N: Network = Ethereum> {
    pub(crate) primary: RootProvider<N>,
    pub(crate) fallbacks: Vec<RootProvider<N>>,
    pub(crate) max_timeout: Duration,
    pub(crate) max_retries: usize,
    pub(crate) min_delay: Duration,
}

impl<N: Network> RobustProvider<N> {
    #[must_use]
    pub fn primary(&self) -> &RootProvider<N> {
        &self.primary
    }

    /// Number of endpoints tried after the primary one fails.
    #[must_use]
    pub fn fallback_count(&self) -> usize {
        self.fallbacks.len()
    }

    /// Fetch the latest block number.
    ///
    /// # Errors
    ///
    /// Returns an error if the RPC call fails on every provider or times out.
    pub async fn get_block_number(&self) -> Result<u64, Error> {
        debug!("eth_blockNumber called");
        let result = self
            .try_operation_with_failover(move |provider| async move {
                provider.get_block_number().await
            })
            .await;
        if let Err(e) = &result {
            error!(error = %e, "eth_blockNumber failed");
        }
        result
    }

    /// Fetch a block by number, optionally with full transaction objects.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BlockNotFound`] when the node has no block at `number`,
    /// or an RPC/timeout error when the call fails on every provider.
    pub async fn get_block_by_number(
        &self,
        number: BlockNumberOrTag,
        full: bool,
    ) -> Result<N::BlockResponse, Error> {
        debug!(block = %number, full, "eth_getBlockByNumber called");
        let result = self
            .try_operation_with_failover(move |provider| async move {
                let request = provider.get_block_by_number(number);
                if full { request.full().await } else { request.await }
            })
            .await;
        if let Err(e) = &result {
            error!(error = %e, block = %number, "eth_getBlockByNumber failed");
        }

        result?.ok_or_else(|| Error::BlockNotFound(number.into()))
    }

    /// Fetch logs for the given filter.
    ///
    /// # Errors
    ///
    /// Returns an error if the RPC call fails on every provider or times out.
    pub async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>, Error> {
        debug!("eth_getLogs called");
        let result = self
            .try_operation_with_failover(move |provider| async move {
                provider.get_logs(filter).await
            })
            .await;
        if let Err(e) = &result {
            error!(error = %e, "eth_getLogs failed");
        }
        result
    }

    /// Runs `operation` against the primary endpoint, then against each fallback
    /// until one succeeds.
    ///
    /// # Errors
    ///
    /// Returns the error of the last endpoint tried.
    pub(crate) async fn try_operation_with_failover<T: Debug, F, Fut>(
        &self,
        operation: F,
    ) -> Result<T, Error>
    where
        F: Fn(RootProvider<N>) -> Fut,
        Fut: Future<Output = Result<T, RpcError<TransportErrorKind>>>,
    {
        let mut last_error = match self.call_endpoint(&self.primary, &operation).await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if !self.fallbacks.is_empty() {
            warn!(error = %last_error, fallbacks = self.fallbacks.len(), "Primary endpoint failed");
        }
        for (idx, provider) in self.fallbacks.iter().enumerate() {
            let fallback = idx + 1;
            debug!(fallback, "Trying fallback endpoint");

            match self.call_endpoint(provider, &operation).await {
                Ok(value) => {
                    info!(fallback, "Fallback endpoint answered");
                    return Ok(value);
                }
                Err(e) => {
                    warn!(fallback, error = %e, "Fallback endpoint failed");
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }

    /// One endpoint, bounded by `max_timeout` across all of its retries.
    async fn call_endpoint<T, F, Fut>(
        &self,
        provider: &RootProvider<N>,
        operation: F,
    ) -> Result<T, Error>
    where
        F: Fn(RootProvider<N>) -> Fut,
        Fut: Future<Output = Result<T, RpcError<TransportErrorKind>>>,
    {
        let backoff = ExponentialBuilder::default()
            .with_max_times(self.max_retries)
            .with_min_delay(self.min_delay);

        let attempts = (|| operation(provider.clone()))
            .retry(backoff)
            .notify(|err: &RpcError<TransportErrorKind>, delay: Duration| {
                debug!(error = %err, ?delay, "Retrying RPC call");
            })
            .sleep(tokio::time::sleep);

        match timeout(self.max_timeout, attempts).await {
            Ok(result) => result.map_err(Error::from),
            Err(_) => Err(Error::Timeout(self.max_timeout)),
        }
    }
}
