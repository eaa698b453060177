//! Data models for context windows

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;
use tracing::warn;

use super::token_estimator::TokenEstimator;
use crate::error::{ContextError, Result};

/// Kind of content held by a context item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Message,
    Document,
    Memory,
    ToolResult,
    System,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Message => "message",
            ItemType::Document => "document",
            ItemType::Memory => "memory",
            ItemType::ToolResult => "tool_result",
            ItemType::System => "system",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Priority level for context items
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextPriority {
    Critical = 4,
    High = 3,
    Medium = 2,
    Low = 1,
    Optional = 0,
}

impl ContextPriority {
    /// Weight added to the adaptive eviction score (higher is evicted sooner)
    pub fn eviction_weight(&self) -> f64 {
        match self {
            ContextPriority::Critical => 0.0,
            ContextPriority::High => 20.0,
            ContextPriority::Medium => 40.0,
            ContextPriority::Low => 60.0,
            ContextPriority::Optional => 80.0,
        }
    }
}

impl Default for ContextPriority {
    fn default() -> Self {
        ContextPriority::Medium
    }
}

/// Eviction strategy, fixed when a window is created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionStrategy {
    Fifo,
    Lifo,
    Priority,
    Relevance,
    Sliding,
    Adaptive,
}

impl EvictionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvictionStrategy::Fifo => "fifo",
            EvictionStrategy::Lifo => "lifo",
            EvictionStrategy::Priority => "priority",
            EvictionStrategy::Relevance => "relevance",
            EvictionStrategy::Sliding => "sliding",
            EvictionStrategy::Adaptive => "adaptive",
        }
    }
}

impl fmt::Display for EvictionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Per-item bookkeeping
///
/// Unknown fields found on import are kept in `extra` and written back on export.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemMetadata {
    /// Never evicted when set
    #[serde(default, skip_serializing_if = "is_false")]
    pub persistent: bool,
    /// Relevance in [0, 1]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance: Option<f32>,
    /// Set once the content has been lossily shortened
    #[serde(default, skip_serializing_if = "is_false")]
    pub compressed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A single entry of a context window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextItem {
    pub id: String,
    #[serde(rename = "type")]
    pub item_type: ItemType,
    pub content: String,
    pub tokens: usize,
    pub priority: ContextPriority,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: ItemMetadata,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ContextItem {
    pub fn is_persistent(&self) -> bool {
        self.metadata.persistent
    }

    pub fn is_compressed(&self) -> bool {
        self.metadata.compressed
    }
}

/// Item to be added to a window
///
/// Everything except the content is optional; token cost is derived from
/// the manager's estimator unless set explicitly.
#[derive(Debug, Clone)]
pub struct NewItem {
    pub content: String,
    pub item_type: ItemType,
    pub priority: ContextPriority,
    pub metadata: ItemMetadata,
    pub tokens: Option<usize>,
    pub id: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub window_id: Option<String>,
}

impl NewItem {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            item_type: ItemType::Message,
            priority: ContextPriority::default(),
            metadata: ItemMetadata::default(),
            tokens: None,
            id: None,
            timestamp: None,
            window_id: None,
        }
    }

    pub fn with_type(mut self, item_type: ItemType) -> Self {
        self.item_type = item_type;
        self
    }

    pub fn with_priority(mut self, priority: ContextPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_metadata(mut self, metadata: ItemMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn persistent(mut self) -> Self {
        self.metadata.persistent = true;
        self
    }

    /// Relevance is clamped to [0, 1]
    pub fn with_relevance(mut self, relevance: f32) -> Self {
        self.metadata.relevance = Some(relevance.clamp(0.0, 1.0));
        self
    }

    pub fn with_tokens(mut self, tokens: usize) -> Self {
        self.tokens = Some(tokens);
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Target a specific window instead of the active one
    pub fn in_window(mut self, window_id: impl Into<String>) -> Self {
        self.window_id = Some(window_id.into());
        self
    }

    pub(crate) fn into_item(
        self,
        estimator: &dyn TokenEstimator,
        now: DateTime<Utc>,
    ) -> ContextItem {
        let tokens = self
            .tokens
            .unwrap_or_else(|| estimator.estimate(&self.content));
        let mut metadata = self.metadata;
        if let Some(relevance) = metadata.relevance {
            metadata.relevance = Some(relevance.clamp(0.0, 1.0));
        }

        ContextItem {
            id: self.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            item_type: self.item_type,
            content: self.content,
            tokens,
            priority: self.priority,
            timestamp: self.timestamp.unwrap_or(now),
            metadata,
            extra: Map::new(),
        }
    }
}

impl From<&str> for NewItem {
    fn from(content: &str) -> Self {
        NewItem::new(content)
    }
}

impl From<String> for NewItem {
    fn from(content: String) -> Self {
        NewItem::new(content)
    }
}

/// Window-level bookkeeping
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_optimized: Option<DateTime<Utc>>,
    /// Tokens after / tokens before, from the last optimization that saved anything
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression_ratio: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WindowMetadata {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// Bounded, ordered collection of context items
///
/// `used_tokens` always equals the sum of the stored items' tokens. It may
/// exceed `max_tokens` only when an insertion could not be made to fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextWindow {
    #[serde(default)]
    pub(crate) id: String,
    pub(crate) max_tokens: usize,
    pub(crate) used_tokens: usize,
    #[serde(default)]
    pub(crate) items: Vec<ContextItem>,
    pub(crate) strategy: EvictionStrategy,
    #[serde(default)]
    pub(crate) metadata: WindowMetadata,
    #[serde(flatten)]
    pub(crate) extra: Map<String, Value>,
}

impl ContextWindow {
    pub(crate) fn new(
        id: String,
        max_tokens: usize,
        strategy: EvictionStrategy,
        metadata: WindowMetadata,
    ) -> Self {
        Self {
            id,
            max_tokens,
            used_tokens: 0,
            items: Vec::new(),
            strategy,
            metadata,
            extra: Map::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    pub fn used_tokens(&self) -> usize {
        self.used_tokens
    }

    pub fn items(&self) -> &[ContextItem] {
        &self.items
    }

    pub fn strategy(&self) -> EvictionStrategy {
        self.strategy
    }

    pub fn metadata(&self) -> &WindowMetadata {
        &self.metadata
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get_item(&self, item_id: &str) -> Option<&ContextItem> {
        self.items.iter().find(|item| item.id == item_id)
    }

    pub fn remaining_tokens(&self) -> usize {
        self.max_tokens.saturating_sub(self.used_tokens)
    }

    pub fn is_over_budget(&self) -> bool {
        self.used_tokens > self.max_tokens
    }

    /// Fraction of the budget in use (may exceed 1.0)
    pub fn utilization(&self) -> f64 {
        self.used_tokens as f64 / self.max_tokens as f64
    }

    /// Sum of the stored items' tokens, saturating at `usize::MAX`
    pub fn computed_tokens(&self) -> usize {
        self.items
            .iter()
            .fold(0, |total: usize, item| total.saturating_add(item.tokens))
    }

    pub(crate) fn push_item(&mut self, item: ContextItem) {
        self.used_tokens = self.used_tokens.saturating_add(item.tokens);
        self.items.push(item);
    }

    pub(crate) fn remove_at(&mut self, index: usize) -> ContextItem {
        let item = self.items.remove(index);
        self.used_tokens = if self.used_tokens == usize::MAX {
            self.computed_tokens()
        } else {
            self.used_tokens.saturating_sub(item.tokens)
        };
        item
    }

    pub(crate) fn clear_items(&mut self) -> usize {
        let removed = self.items.len();
        self.items.clear();
        self.used_tokens = 0;
        removed
    }

    /// Re-check token accounting, repairing it if it drifted
    pub(crate) fn verify_accounting(&mut self) -> bool {
        let actual = self.computed_tokens();
        if actual != self.used_tokens {
            warn!(
                "Window {} token accounting drifted: recorded={}, actual={}",
                self.id, self.used_tokens, actual
            );
            self.used_tokens = actual;
            return false;
        }
        true
    }

    /// Reject structurally invalid windows coming from outside
    pub(crate) fn validate_import(&self) -> Result<()> {
        if self.max_tokens == 0 {
            return Err(ContextError::Serialization(
                "maxTokens must be greater than zero".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for item in &self.items {
            if item.id.is_empty() {
                return Err(ContextError::Serialization("item with empty id".to_string()));
            }
            if !seen.insert(item.id.as_str()) {
                return Err(ContextError::Serialization(format!(
                    "duplicate item id: {}",
                    item.id
                )));
            }
            if let Some(relevance) = item.metadata.relevance {
                if !(0.0..=1.0).contains(&relevance) {
                    return Err(ContextError::Serialization(format!(
                        "item {} relevance {} outside [0, 1]",
                        item.id, relevance
                    )));
                }
            }
        }

        let actual = self
            .items
            .iter()
            .try_fold(0usize, |total, item| total.checked_add(item.tokens))
            .ok_or_else(|| ContextError::Serialization("token total overflows".to_string()))?;
        if actual != self.used_tokens {
            return Err(ContextError::Serialization(format!(
                "usedTokens {} does not match item total {}",
                self.used_tokens, actual
            )));
        }

        Ok(())
    }

    pub fn stats(&self) -> WindowStats {
        let relevances: Vec<f32> = self
            .items
            .iter()
            .filter_map(|item| item.metadata.relevance)
            .collect();
        let average_relevance = if relevances.is_empty() {
            None
        } else {
            Some(relevances.iter().sum::<f32>() / relevances.len() as f32)
        };

        WindowStats {
            window_id: self.id.clone(),
            item_count: self.items.len(),
            persistent_items: self.items.iter().filter(|i| i.is_persistent()).count(),
            compressed_items: self.items.iter().filter(|i| i.is_compressed()).count(),
            total_tokens: self.used_tokens,
            max_tokens: self.max_tokens,
            utilization: self.utilization(),
            compression_ratio: self.metadata.compression_ratio.unwrap_or(1.0),
            average_relevance,
        }
    }
}

/// Snapshot of a single window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowStats {
    pub window_id: String,
    pub item_count: usize,
    pub persistent_items: usize,
    pub compressed_items: usize,
    pub total_tokens: usize,
    pub max_tokens: usize,
    pub utilization: f64,
    /// 1.0 when nothing has been compressed
    pub compression_ratio: f64,
    /// Mean over items that declare a relevance
    pub average_relevance: Option<f32>,
}

/// Aggregate over every window a manager holds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalStats {
    pub total_windows: usize,
    pub total_items: usize,
    pub total_tokens: usize,
    pub average_items_per_window: f64,
}

/// Filter for listing a window's items
#[derive(Debug, Clone, Default)]
pub struct ItemFilter {
    pub item_type: Option<ItemType>,
    pub priority: Option<ContextPriority>,
    pub after: Option<DateTime<Utc>>,
    pub before: Option<DateTime<Utc>>,
    /// Keep only the last `limit` matches
    pub limit: Option<usize>,
}

impl ItemFilter {
    pub fn matches(&self, item: &ContextItem) -> bool {
        self.item_type.map_or(true, |t| item.item_type == t)
            && self.priority.map_or(true, |p| item.priority == p)
            && self.after.map_or(true, |after| item.timestamp > after)
            && self.before.map_or(true, |before| item.timestamp < before)
    }
}

/// Options for searching item content
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub case_sensitive: bool,
    pub whole_word: bool,
}

/// One search hit
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub window_id: String,
    pub item_id: String,
    pub item: ContextItem,
    pub relevance: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::token_estimator::CharRatioEstimator;

    fn item(id: &str, tokens: usize) -> ContextItem {
        NewItem::new(format!("content of {}", id))
            .with_id(id)
            .with_tokens(tokens)
            .into_item(&CharRatioEstimator::default(), Utc::now())
    }

    #[test]
    fn test_priority_ordering() {
        assert!(ContextPriority::Critical > ContextPriority::High);
        assert!(ContextPriority::Low > ContextPriority::Optional);
        assert_eq!(ContextPriority::Optional.eviction_weight(), 80.0);
        assert_eq!(ContextPriority::Critical.eviction_weight(), 0.0);
    }

    #[test]
    fn test_new_item_estimates_tokens() {
        let item = NewItem::new("abcdefgh").into_item(&CharRatioEstimator::default(), Utc::now());
        assert_eq!(item.tokens, 2);
        assert_eq!(item.item_type, ItemType::Message);
        assert_eq!(item.priority, ContextPriority::Medium);
        assert!(!item.id.is_empty());
    }

    #[test]
    fn test_relevance_is_clamped() {
        let new_item = NewItem::new("x").with_relevance(1.7);
        assert_eq!(new_item.metadata.relevance, Some(1.0));
    }

    #[test]
    fn test_window_accounting() {
        let mut window = ContextWindow::new(
            "w".to_string(),
            100,
            EvictionStrategy::Fifo,
            WindowMetadata::default(),
        );
        window.push_item(item("a", 30));
        window.push_item(item("b", 20));
        assert_eq!(window.used_tokens(), 50);
        assert_eq!(window.remaining_tokens(), 50);

        let removed = window.remove_at(0);
        assert_eq!(removed.id, "a");
        assert_eq!(window.used_tokens(), 20);
        assert!(window.verify_accounting());

        window.used_tokens = 999;
        assert!(!window.verify_accounting());
        assert_eq!(window.used_tokens(), 20);
    }

    #[test]
    fn test_stats_average_relevance() {
        let mut window = ContextWindow::new(
            "w".to_string(),
            100,
            EvictionStrategy::Relevance,
            WindowMetadata::default(),
        );
        let mut a = item("a", 10);
        a.metadata.relevance = Some(0.2);
        let mut b = item("b", 10);
        b.metadata.relevance = Some(0.6);
        window.push_item(a);
        window.push_item(b);
        window.push_item(item("c", 10));

        let stats = window.stats();
        assert_eq!(stats.item_count, 3);
        assert_eq!(stats.compression_ratio, 1.0);
        let avg = stats.average_relevance.unwrap();
        assert!((avg - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_item_serializes_wire_names() {
        let mut it = item("a", 5);
        it.item_type = ItemType::ToolResult;
        it.priority = ContextPriority::Optional;
        let json = serde_json::to_value(&it).unwrap();
        assert_eq!(json["type"], "tool_result");
        assert_eq!(json["priority"], "optional");
        assert!(json["timestamp"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn test_filter_matches() {
        let it = item("a", 5);
        let filter = ItemFilter {
            item_type: Some(ItemType::Document),
            ..Default::default()
        };
        assert!(!filter.matches(&it));
        assert!(ItemFilter::default().matches(&it));
    }
}
