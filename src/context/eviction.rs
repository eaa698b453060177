//! Eviction strategies
//!
//! Every strategy produces an ordering of the window's non-persistent items;
//! items are removed from the front of that ordering until the window fits
//! its target. Ties are always broken by position in the window, so the same
//! state and target always evict the same items.

use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use tracing::debug;

use super::models::{ContextItem, ContextWindow, EvictionStrategy};

/// Relevance assumed by the relevance strategy when an item declares none
pub const MISSING_RELEVANCE_FOR_SORT: f32 = 0.0;

/// Relevance assumed by adaptive scoring when an item declares none
pub const NEUTRAL_RELEVANCE: f32 = 0.5;

const MAX_AGE_MINUTES: f64 = 50.0;
const RELEVANCE_WEIGHT: f64 = 30.0;
const MAX_SIZE_SCORE: f64 = 20.0;

/// Composite adaptive score; higher is evicted first
pub fn adaptive_score(item: &ContextItem, now: DateTime<Utc>) -> f64 {
    let age_minutes = ((now - item.timestamp).num_milliseconds() as f64 / 60_000.0).max(0.0);
    let relevance = item.metadata.relevance.unwrap_or(NEUTRAL_RELEVANCE) as f64;

    item.priority.eviction_weight()
        + age_minutes.min(MAX_AGE_MINUTES)
        + (1.0 - relevance) * RELEVANCE_WEIGHT
        + (item.tokens as f64 / 100.0).min(MAX_SIZE_SCORE)
}

/// Indices of evictable items, in the order the strategy gives them up
pub fn eviction_order(
    items: &[ContextItem],
    strategy: EvictionStrategy,
    now: DateTime<Utc>,
) -> Vec<usize> {
    let mut order: Vec<usize> = (0..items.len())
        .filter(|&idx| !items[idx].is_persistent())
        .collect();

    match strategy {
        EvictionStrategy::Fifo => {}
        EvictionStrategy::Lifo => order.reverse(),
        EvictionStrategy::Priority => order.sort_by(|&a, &b| {
            items[a]
                .priority
                .cmp(&items[b].priority)
                .then_with(|| items[a].timestamp.cmp(&items[b].timestamp))
                .then_with(|| a.cmp(&b))
        }),
        EvictionStrategy::Relevance => order.sort_by(|&a, &b| {
            let ra = items[a].metadata.relevance.unwrap_or(MISSING_RELEVANCE_FOR_SORT);
            let rb = items[b].metadata.relevance.unwrap_or(MISSING_RELEVANCE_FOR_SORT);
            ra.total_cmp(&rb).then_with(|| a.cmp(&b))
        }),
        EvictionStrategy::Sliding => order.sort_by(|&a, &b| {
            items[a]
                .timestamp
                .cmp(&items[b].timestamp)
                .then_with(|| a.cmp(&b))
        }),
        EvictionStrategy::Adaptive => {
            let scores: Vec<f64> = items.iter().map(|item| adaptive_score(item, now)).collect();
            order.sort_by(|&a, &b| match scores[b].total_cmp(&scores[a]) {
                Ordering::Equal => a.cmp(&b),
                other => other,
            });
        }
    }

    order
}

/// Remove items per the window's strategy until `used_tokens <= target`
///
/// Returns the evicted items in eviction order. Survivors keep their
/// relative order. Stops early when only persistent items remain.
pub(crate) fn evict_to_target(
    window: &mut ContextWindow,
    target: usize,
    now: DateTime<Utc>,
) -> Vec<ContextItem> {
    if window.used_tokens <= target {
        return Vec::new();
    }

    let order = eviction_order(&window.items, window.strategy, now);
    let mut remaining = window.used_tokens;
    let mut chosen = Vec::new();
    for idx in order {
        if remaining <= target {
            break;
        }
        remaining = remaining.saturating_sub(window.items[idx].tokens);
        chosen.push(idx);
    }

    let evicted: Vec<ContextItem> = chosen.iter().map(|&idx| window.items[idx].clone()).collect();
    chosen.sort_unstable_by(|a, b| b.cmp(a));
    for idx in chosen {
        window.remove_at(idx);
    }

    debug!(
        "Evicted {} items from window {} using {} strategy: {} tokens in use, target {}",
        evicted.len(),
        window.id,
        window.strategy,
        window.used_tokens,
        target
    );

    evicted
}
