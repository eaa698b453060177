//! In-place window optimization: compression followed by deduplication

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::compression::{compress_text, is_material};
use super::dedup::duplicate_indices;
use super::models::{ContextItem, ContextWindow};
use super::token_estimator::TokenEstimator;
use crate::config::CompressionConfig;

/// Outcome of one optimization pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationReport {
    pub tokens_before: usize,
    pub tokens_after: usize,
    pub compressed_items: Vec<String>,
    pub deduplicated_items: Vec<String>,
}

impl OptimizationReport {
    pub fn tokens_saved(&self) -> usize {
        self.tokens_before.saturating_sub(self.tokens_after)
    }

    pub fn changed(&self) -> bool {
        !self.compressed_items.is_empty() || !self.deduplicated_items.is_empty()
    }
}

/// Compress every uncompressed item, then drop superseded duplicates
///
/// Surviving items keep their order. A second call with no intervening
/// insertion changes nothing.
pub(crate) fn optimize_window(
    window: &mut ContextWindow,
    estimator: &dyn TokenEstimator,
    config: &CompressionConfig,
    now: DateTime<Utc>,
) -> (OptimizationReport, Vec<ContextItem>) {
    let mut report = OptimizationReport {
        tokens_before: window.used_tokens,
        ..Default::default()
    };

    for item in window.items.iter_mut().filter(|item| !item.is_compressed()) {
        let compressed = compress_text(&item.content, config);
        if !is_material(&item.content, &compressed, config.threshold) {
            continue;
        }
        let tokens = estimator.estimate(&compressed);
        debug!(
            "Compressed item {}: {} -> {} tokens",
            item.id, item.tokens, tokens
        );
        window.used_tokens = window
            .used_tokens
            .saturating_sub(item.tokens)
            .saturating_add(tokens);
        item.content = compressed;
        item.tokens = tokens;
        item.metadata.compressed = true;
        report.compressed_items.push(item.id.clone());
    }

    if window.used_tokens == usize::MAX {
        window.used_tokens = window.computed_tokens();
    }

    let mut duplicates = duplicate_indices(&window.items);
    duplicates.reverse();
    let mut dropped: Vec<ContextItem> = duplicates
        .into_iter()
        .map(|idx| window.remove_at(idx))
        .collect();
    dropped.reverse();
    report.deduplicated_items = dropped.iter().map(|item| item.id.clone()).collect();

    report.tokens_after = window.used_tokens;
    window.metadata.last_optimized = Some(now);
    if report.tokens_before > 0 && report.tokens_after < report.tokens_before {
        window.metadata.compression_ratio =
            Some(report.tokens_after as f64 / report.tokens_before as f64);
    }

    (report, dropped)
}
