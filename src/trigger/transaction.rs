use tracing::debug;

use super::TriggerItem;
use crate::{
    config::FromBlock, error::TriggerError, fetcher::ChainSource, matcher::TransactionMatcher,
    recent_hashes::RecentHashSet, types::BlockRange,
};

#[derive(Clone, Debug)]
pub struct TransactionSettings {
    pub matcher: TransactionMatcher,
    pub from_block: FromBlock,
}

impl TransactionSettings {
    #[must_use]
    pub fn new(matcher: TransactionMatcher) -> Self {
        Self { matcher, from_block: FromBlock::Latest }
    }

    #[must_use]
    pub fn with_from_block(mut self, from_block: FromBlock) -> Self {
        self.from_block = from_block;
        self
    }
}

/// Walks every block of `ranges` and collects the matching transactions not yet
/// in `recent`, recording their hashes there.
pub(super) async fn collect(
    source: &dyn ChainSource,
    settings: &TransactionSettings,
    ranges: &[BlockRange],
    recent: &mut RecentHashSet,
) -> Result<Vec<TriggerItem>, TriggerError> {
    let mut items = Vec::new();
    for range in ranges {
        debug!(block_range = ?range, "Scanning blocks for transactions");
        for number in range.clone() {
            let block = source.block_with_transactions(number).await?;
            let matched = settings.matcher.select(&block.transactions, recent);
            if !matched.is_empty() {
                debug!(block = number, matched = matched.len(), "Matched transactions");
            }
            items.extend(matched.into_iter().map(TriggerItem::Transaction));
        }
    }
    Ok(items)
}
