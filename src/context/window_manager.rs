//! Context window manager
//!
//! Owns a set of independent, bounded windows and keeps each one within its
//! token budget on insertion:
//! - optimize existing contents (compression + deduplication)
//! - evict per the window's strategy if still over budget
//! - insert, notifying `OverBudget` when the item cannot be made to fit
//!
//! All operations run to completion synchronously. The manager is not
//! internally synchronized; callers sharing it across threads must wrap it in
//! a lock (one writer per window).

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::eviction::evict_to_target;
use super::events::{EventBus, EventListener, WindowEvent, WindowEventKind};
use super::models::{
    ContextItem, ContextWindow, EvictionStrategy, GlobalStats, ItemFilter, NewItem,
    SearchOptions, SearchResult, WindowMetadata, WindowStats,
};
use super::optimizer::{optimize_window, OptimizationReport};
use super::token_estimator::{CharRatioEstimator, TokenEstimator};
use crate::config::{CompressionConfig, Config, WindowConfig};
use crate::error::{ContextError, Result};

/// Manager for bounded context windows
pub struct ContextWindowManager {
    windows: IndexMap<String, ContextWindow>,
    active: Option<String>,
    estimator: Arc<dyn TokenEstimator>,
    compression: CompressionConfig,
    defaults: WindowConfig,
    events: EventBus,
}

impl Default for ContextWindowManager {
    fn default() -> Self {
        Self::new(Arc::new(CharRatioEstimator::default()))
    }
}

impl ContextWindowManager {
    /// Create a manager with default compression and window settings
    pub fn new(estimator: Arc<dyn TokenEstimator>) -> Self {
        Self {
            windows: IndexMap::new(),
            active: None,
            estimator,
            compression: CompressionConfig::default(),
            defaults: WindowConfig::default(),
            events: EventBus::new(),
        }
    }

    /// Create a manager from validated configuration
    pub fn from_config(config: &Config, estimator: Arc<dyn TokenEstimator>) -> Result<Self> {
        config.validate()?;
        let mut manager = Self::new(estimator);
        manager.compression = config.compression.clone();
        manager.defaults = config.window.clone();
        Ok(manager)
    }

    pub fn with_compression(mut self, compression: CompressionConfig) -> Self {
        self.compression = compression;
        self
    }

    pub fn subscribe(&mut self, kind: WindowEventKind, listener: Arc<dyn EventListener>) {
        self.events.subscribe(kind, listener);
    }

    pub fn subscribe_all(&mut self, listener: Arc<dyn EventListener>) {
        self.events.subscribe_all(listener);
    }

    pub fn estimator(&self) -> &dyn TokenEstimator {
        self.estimator.as_ref()
    }

    /// Create a window; it becomes the active window
    pub fn create_window(
        &mut self,
        max_tokens: usize,
        strategy: EvictionStrategy,
        metadata: Option<WindowMetadata>,
    ) -> Result<&ContextWindow> {
        if max_tokens == 0 {
            return Err(ContextError::InvalidConfiguration(
                "maxTokens must be greater than zero".to_string(),
            ));
        }

        let mut metadata = metadata.unwrap_or_default();
        if metadata.model.is_none() {
            metadata.model = self.defaults.model.clone();
        }
        metadata.created_at.get_or_insert_with(Utc::now);

        let id = uuid::Uuid::new_v4().to_string();
        let window = ContextWindow::new(id.clone(), max_tokens, strategy, metadata);

        info!(
            "Created context window {} (max_tokens={}, strategy={})",
            id, max_tokens, strategy
        );
        self.events.emit(WindowEvent::WindowCreated {
            window_id: id.clone(),
            max_tokens,
            strategy,
        });

        let (index, _) = self.windows.insert_full(id.clone(), window);
        self.active = Some(id);
        Ok(&self.windows[index])
    }

    /// Create a window using the configured budget and strategy
    pub fn create_window_with_defaults(&mut self) -> Result<&ContextWindow> {
        let max_tokens = self.defaults.default_max_tokens;
        let strategy = self.defaults.default_strategy;
        self.create_window(max_tokens, strategy, None)
    }

    /// Add an item to its target window, making room first if needed
    ///
    /// If the item does not fit even after every evictable item is gone, it
    /// is stored anyway and an `OverBudget` event is emitted.
    pub fn add_item(&mut self, item: impl Into<NewItem>) -> Result<ContextItem> {
        let new_item = item.into();
        let window_id = self.resolve_id(new_item.window_id.as_deref())?;
        let now = Utc::now();
        let item = new_item.into_item(self.estimator.as_ref(), now);

        let window = self
            .windows
            .get_mut(&window_id)
            .ok_or_else(|| ContextError::WindowNotFound(window_id.clone()))?;

        if window.get_item(&item.id).is_some() {
            return Err(ContextError::DuplicateItem {
                window_id,
                item_id: item.id,
            });
        }

        if window.used_tokens.saturating_add(item.tokens) > window.max_tokens {
            debug!(
                "Window {} needs room for {} tokens ({} of {} used)",
                window_id, item.tokens, window.used_tokens, window.max_tokens
            );
            let (report, dropped) = optimize_window(
                window,
                self.estimator.as_ref(),
                &self.compression,
                now,
            );
            publish_optimization(&self.events, &window_id, &report, &dropped);

            if window.used_tokens.saturating_add(item.tokens) > window.max_tokens {
                let target = window.max_tokens.saturating_sub(item.tokens);
                make_room(
                    window,
                    target,
                    self.estimator.as_ref(),
                    &self.compression,
                    &self.events,
                    now,
                );
            }
        }

        let stored = item.clone();
        window.push_item(item);
        window.verify_accounting();

        self.events.emit(WindowEvent::ItemAdded {
            window_id: window_id.clone(),
            item_id: stored.id.clone(),
            item_type: stored.item_type,
            tokens: stored.tokens,
            used_tokens: window.used_tokens,
            max_tokens: window.max_tokens,
        });

        if window.is_over_budget() {
            warn!(
                "Window {} over budget after adding item {}: {} > {}",
                window_id, stored.id, window.used_tokens, window.max_tokens
            );
            self.events.emit(WindowEvent::OverBudget {
                window_id,
                item_id: stored.id.clone(),
                used_tokens: window.used_tokens,
                max_tokens: window.max_tokens,
            });
        }

        Ok(stored)
    }

    /// Compress and deduplicate a window's current contents
    pub fn optimize_window(&mut self, window_id: Option<&str>) -> Result<OptimizationReport> {
        let window_id = self.resolve_id(window_id)?;
        let window = self
            .windows
            .get_mut(&window_id)
            .ok_or_else(|| ContextError::WindowNotFound(window_id.clone()))?;

        let (report, dropped) =
            optimize_window(window, self.estimator.as_ref(), &self.compression, Utc::now());
        window.verify_accounting();

        info!(
            "Optimized window {}: saved {} tokens ({} compressed, {} deduplicated)",
            window_id,
            report.tokens_saved(),
            report.compressed_items.len(),
            report.deduplicated_items.len()
        );
        self.events.emit(WindowEvent::WindowOptimized {
            window_id: window_id.clone(),
            tokens_saved: report.tokens_saved(),
            compressed_items: report.compressed_items.len(),
            deduplicated_items: report.deduplicated_items.len(),
        });
        publish_deduplicated(&self.events, &window_id, &dropped);

        Ok(report)
    }

    pub fn get_window(&self, window_id: &str) -> Option<&ContextWindow> {
        self.windows.get(window_id)
    }

    pub fn active_window(&self) -> Option<&ContextWindow> {
        self.active.as_deref().and_then(|id| self.windows.get(id))
    }

    pub fn active_window_id(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// Windows in creation order
    pub fn windows(&self) -> impl Iterator<Item = &ContextWindow> {
        self.windows.values()
    }

    pub fn window_count(&self) -> usize {
        self.windows.len()
    }

    /// Returns false if the id is unknown
    pub fn set_active_window(&mut self, window_id: &str) -> bool {
        if !self.windows.contains_key(window_id) {
            return false;
        }
        self.active = Some(window_id.to_string());
        self.events.emit(WindowEvent::WindowActivated {
            window_id: window_id.to_string(),
        });
        true
    }

    /// Remove every item but keep the window; returns the number removed
    pub fn clear_window(&mut self, window_id: Option<&str>) -> Result<usize> {
        let window_id = self.resolve_id(window_id)?;
        let window = self
            .windows
            .get_mut(&window_id)
            .ok_or_else(|| ContextError::WindowNotFound(window_id.clone()))?;

        let removed_items = window.clear_items();
        info!("Cleared window {} ({} items)", window_id, removed_items);
        self.events.emit(WindowEvent::WindowCleared {
            window_id,
            removed_items,
        });
        Ok(removed_items)
    }

    /// Drop a window entirely; returns false if the id is unknown
    pub fn delete_window(&mut self, window_id: &str) -> bool {
        if self.windows.shift_remove(window_id).is_none() {
            return false;
        }
        if self.active.as_deref() == Some(window_id) {
            self.active = None;
        }
        info!("Deleted window {}", window_id);
        self.events.emit(WindowEvent::WindowDeleted {
            window_id: window_id.to_string(),
        });
        true
    }

    /// Explicitly remove one item, persistent or not
    pub fn remove_item(
        &mut self,
        item_id: &str,
        window_id: Option<&str>,
    ) -> Result<Option<ContextItem>> {
        let window_id = self.resolve_id(window_id)?;
        let window = self
            .windows
            .get_mut(&window_id)
            .ok_or_else(|| ContextError::WindowNotFound(window_id.clone()))?;

        let Some(index) = window.items.iter().position(|item| item.id == item_id) else {
            return Ok(None);
        };
        let item = window.remove_at(index);
        window.verify_accounting();

        self.events.emit(WindowEvent::ItemRemoved {
            window_id,
            item_id: item.id.clone(),
            tokens: item.tokens,
        });
        Ok(Some(item))
    }

    /// Serialize a window to JSON
    pub fn export_window(&self, window_id: Option<&str>) -> Result<String> {
        let window_id = self.resolve_id(window_id)?;
        let window = self
            .windows
            .get(&window_id)
            .ok_or_else(|| ContextError::WindowNotFound(window_id.clone()))?;
        Ok(serde_json::to_string_pretty(window)?)
    }

    /// Register a window from its JSON form
    ///
    /// Malformed input is rejected as a whole. A missing id, or one that is
    /// already taken, is replaced with a fresh one.
    pub fn import_window(&mut self, data: &str) -> Result<&ContextWindow> {
        let mut window: ContextWindow = serde_json::from_str(data)?;
        window.validate_import()?;

        if window.id.is_empty() {
            window.id = uuid::Uuid::new_v4().to_string();
        } else if self.windows.contains_key(&window.id) {
            let fresh = uuid::Uuid::new_v4().to_string();
            warn!(
                "Imported window id {} already exists, assigning {}",
                window.id, fresh
            );
            window.id = fresh;
        }

        let window_id = window.id.clone();
        let item_count = window.items.len();
        info!("Imported window {} ({} items)", window_id, item_count);
        self.events.emit(WindowEvent::WindowImported {
            window_id: window_id.clone(),
            item_count,
        });

        let (index, _) = self.windows.insert_full(window_id, window);
        Ok(&self.windows[index])
    }

    pub fn get_stats(&self, window_id: Option<&str>) -> Result<WindowStats> {
        let window_id = self.resolve_id(window_id)?;
        self.windows
            .get(&window_id)
            .map(ContextWindow::stats)
            .ok_or(ContextError::WindowNotFound(window_id))
    }

    pub fn global_stats(&self) -> GlobalStats {
        let total_windows = self.windows.len();
        let total_items = self.windows.values().map(ContextWindow::len).sum();
        let total_tokens = self
            .windows
            .values()
            .fold(0, |total: usize, window| total.saturating_add(window.used_tokens));
        let average_items_per_window = if total_windows > 0 {
            total_items as f64 / total_windows as f64
        } else {
            0.0
        };

        GlobalStats {
            total_windows,
            total_items,
            total_tokens,
            average_items_per_window,
        }
    }

    /// Items matching the filter, in window order
    pub fn get_items(
        &self,
        window_id: Option<&str>,
        filter: &ItemFilter,
    ) -> Result<Vec<&ContextItem>> {
        let window_id = self.resolve_id(window_id)?;
        let window = self
            .windows
            .get(&window_id)
            .ok_or(ContextError::WindowNotFound(window_id))?;

        let mut items: Vec<&ContextItem> =
            window.items.iter().filter(|item| filter.matches(item)).collect();
        if let Some(limit) = filter.limit {
            let skip = items.len().saturating_sub(limit);
            items.drain(..skip);
        }
        Ok(items)
    }

    /// Search item content across all windows, best matches first
    pub fn search_items(&self, query: &str, options: &SearchOptions) -> Vec<SearchResult> {
        let needle = normalize(query, options.case_sensitive);
        if needle.trim().is_empty() {
            return Vec::new();
        }

        let mut results = Vec::new();
        for window in self.windows.values() {
            for item in &window.items {
                let haystack = normalize(&item.content, options.case_sensitive);
                let occurrences = count_occurrences(&haystack, &needle, options.whole_word);
                if occurrences == 0 {
                    continue;
                }
                let words = item.content.split_whitespace().count().max(1);
                results.push(SearchResult {
                    window_id: window.id.clone(),
                    item_id: item.id.clone(),
                    item: item.clone(),
                    relevance: occurrences as f64 / words as f64,
                });
            }
        }

        results.sort_by(|a, b| b.relevance.total_cmp(&a.relevance));
        results
    }

    /// Render a window's items, in order, as prompt text
    pub fn build_context(&self, window_id: Option<&str>) -> Result<String> {
        let window_id = self.resolve_id(window_id)?;
        let window = self
            .windows
            .get(&window_id)
            .ok_or(ContextError::WindowNotFound(window_id))?;

        Ok(window
            .items
            .iter()
            .map(|item| format!("[{}] {}", item.item_type, item.content))
            .collect::<Vec<_>>()
            .join("\n\n"))
    }

    fn resolve_id(&self, window_id: Option<&str>) -> Result<String> {
        match window_id {
            Some(id) if self.windows.contains_key(id) => Ok(id.to_string()),
            Some(id) => Err(ContextError::WindowNotFound(id.to_string())),
            None => self.active.clone().ok_or(ContextError::NoActiveWindow),
        }
    }
}

/// Strategy-specific eviction; adaptive optimizes before scoring
fn make_room(
    window: &mut ContextWindow,
    target: usize,
    estimator: &dyn TokenEstimator,
    compression: &CompressionConfig,
    events: &EventBus,
    now: DateTime<Utc>,
) {
    let window_id = window.id.clone();
    if window.strategy == EvictionStrategy::Adaptive {
        let (report, dropped) = optimize_window(window, estimator, compression, now);
        publish_optimization(events, &window_id, &report, &dropped);
        if window.used_tokens <= target {
            return;
        }
    }

    let reason = window.strategy;
    for item in evict_to_target(window, target, now) {
        debug!("Evicted item {} ({} tokens) from {}", item.id, item.tokens, window_id);
        events.emit(WindowEvent::ItemEvicted {
            window_id: window_id.clone(),
            item_id: item.id,
            tokens: item.tokens,
            reason,
        });
    }
}

/// Reactive passes only report when something changed
fn publish_optimization(
    events: &EventBus,
    window_id: &str,
    report: &OptimizationReport,
    dropped: &[ContextItem],
) {
    if !report.changed() {
        return;
    }
    events.emit(WindowEvent::WindowOptimized {
        window_id: window_id.to_string(),
        tokens_saved: report.tokens_saved(),
        compressed_items: report.compressed_items.len(),
        deduplicated_items: report.deduplicated_items.len(),
    });
    publish_deduplicated(events, window_id, dropped);
}

fn publish_deduplicated(events: &EventBus, window_id: &str, dropped: &[ContextItem]) {
    for item in dropped {
        events.emit(WindowEvent::ItemRemoved {
            window_id: window_id.to_string(),
            item_id: item.id.clone(),
            tokens: item.tokens,
        });
    }
}

fn normalize(text: &str, case_sensitive: bool) -> String {
    if case_sensitive {
        text.to_string()
    } else {
        text.to_lowercase()
    }
}

fn count_occurrences(haystack: &str, needle: &str, whole_word: bool) -> usize {
    haystack
        .match_indices(needle)
        .filter(|(start, matched)| {
            if !whole_word {
                return true;
            }
            let before = haystack[..*start].chars().next_back();
            let after = haystack[start + matched.len()..].chars().next();
            !before.is_some_and(is_word_char) && !after.is_some_and(is_word_char)
        })
        .count()
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}
