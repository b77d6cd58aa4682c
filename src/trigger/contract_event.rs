use tracing::{debug, warn};

use super::TriggerItem;
use crate::{
    config::FromBlock,
    decoder::{EventDecoder, LogEvent, LogPayload},
    error::TriggerError,
    event_filter::LogFilter,
    fetcher::ChainSource,
    types::BlockRange,
};

#[derive(Clone, Debug)]
pub struct ContractEventSettings {
    pub filter: LogFilter,
    /// Set when logs are decoded against an ABI event; raw logs are emitted otherwise.
    pub decoder: Option<EventDecoder>,
    pub from_block: FromBlock,
}

impl ContractEventSettings {
    #[must_use]
    pub fn new(filter: LogFilter) -> Self {
        Self { filter, decoder: None, from_block: FromBlock::Latest }
    }

    /// Decodes logs with `decoder` and narrows topic0 to its event.
    #[must_use]
    pub fn with_decoder(mut self, decoder: EventDecoder) -> Self {
        self.filter = self.filter.with_event_signature(decoder.selector());
        self.decoder = Some(decoder);
        self
    }

    #[must_use]
    pub fn with_from_block(mut self, from_block: FromBlock) -> Self {
        self.from_block = from_block;
        self
    }

    fn to_event(&self, log: &alloy::rpc::types::Log) -> LogEvent {
        match &self.decoder {
            Some(decoder) => decoder.decode(log),
            None => LogEvent::raw(log, None),
        }
    }
}

/// Fetches and decodes the logs of every range. A log that fails to decode is
/// emitted in raw form instead of failing the cycle.
pub(super) async fn collect(
    source: &dyn ChainSource,
    settings: &ContractEventSettings,
    ranges: &[BlockRange],
) -> Result<Vec<TriggerItem>, TriggerError> {
    let mut items = Vec::new();
    for range in ranges {
        let logs = source.logs(&settings.filter, range.clone()).await?;
        debug!(block_range = ?range, log_count = logs.len(), "Processing logs");

        for log in &logs {
            let event = settings.to_event(log);
            if let LogPayload::Raw { decode_error: Some(error), .. } = &event.payload {
                warn!(
                    transaction_hash = ?event.transaction_hash,
                    log_index = ?event.log_index,
                    error = %error,
                    "Failed to decode log, emitting raw record"
                );
            }
            items.push(TriggerItem::Event(event));
        }
    }
    Ok(items)
}
