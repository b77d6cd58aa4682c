use alloy::primitives::BlockNumber;

use crate::{error::TriggerError, types::BlockRange};

pub const DEFAULT_BLOCK_LIMIT: u64 = 1000;

/// Splits `[cursor + 1, head]` into ascending, contiguous ranges of at most
/// `max_span` blocks each.
///
/// An empty plan means there are no new blocks, which is not an error.
///
/// # Errors
///
/// Returns [`TriggerError::Configuration`] when `max_span` is zero.
pub fn plan_ranges(
    cursor: BlockNumber,
    head: BlockNumber,
    max_span: u64,
) -> Result<Vec<BlockRange>, TriggerError> {
    match cursor.checked_add(1) {
        Some(start) => plan_from(start, head, max_span),
        None => {
            validate_span(max_span)?;
            Ok(Vec::new())
        }
    }
}

/// Splits `[start, head]` the same way [`plan_ranges`] does.
///
/// # Errors
///
/// Returns [`TriggerError::Configuration`] when `max_span` is zero.
pub fn plan_from(
    start: BlockNumber,
    head: BlockNumber,
    max_span: u64,
) -> Result<Vec<BlockRange>, TriggerError> {
    validate_span(max_span)?;

    let mut ranges = Vec::new();
    if head < start {
        return Ok(ranges);
    }

    let mut from = start;
    loop {
        let to = from.saturating_add(max_span - 1).min(head);
        ranges.push(from..=to);
        if to == head {
            break;
        }
        from = to + 1;
    }
    Ok(ranges)
}

fn validate_span(max_span: u64) -> Result<(), TriggerError> {
    if max_span == 0 {
        return Err(TriggerError::config("block range limit must be at least 1"));
    }
    Ok(())
}
