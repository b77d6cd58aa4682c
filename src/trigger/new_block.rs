use tracing::debug;

use super::TriggerItem;
use crate::{error::TriggerError, fetcher::ChainSource, types::BlockRange};

/// Fetches the header of every block in `ranges`, in ascending order.
pub(super) async fn collect(
    source: &dyn ChainSource,
    ranges: &[BlockRange],
) -> Result<Vec<TriggerItem>, TriggerError> {
    let mut items = Vec::new();
    for range in ranges {
        debug!(block_range = ?range, "Fetching block headers");
        for number in range.clone() {
            items.push(TriggerItem::Block(source.block_header(number).await?));
        }
    }
    Ok(items)
}
