//! Content-hash deduplication of window items

use sha2::{Digest, Sha256};
use std::collections::HashMap;

use super::models::ContextItem;

/// Grouping key: item type plus SHA-256 of the content
pub fn content_key(item: &ContextItem) -> String {
    let mut hasher = Sha256::new();
    hasher.update(item.item_type.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(item.content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Indices of items superseded by a more recent copy, ascending
///
/// The survivor of each group is the item with the latest timestamp (the
/// later position on ties). Persistent items are never reported.
pub fn duplicate_indices(items: &[ContextItem]) -> Vec<usize> {
    let keys: Vec<String> = items.iter().map(content_key).collect();

    let mut survivors: HashMap<&str, usize> = HashMap::new();
    for (idx, key) in keys.iter().enumerate() {
        survivors
            .entry(key.as_str())
            .and_modify(|current| {
                if items[idx].timestamp >= items[*current].timestamp {
                    *current = idx;
                }
            })
            .or_insert(idx);
    }

    keys.iter()
        .enumerate()
        .filter(|(idx, key)| survivors[key.as_str()] != *idx && !items[*idx].is_persistent())
        .map(|(idx, _)| idx)
        .collect()
}
