//! Bounded context windows with token budget enforcement
//!
//! A window holds ordered items (messages, documents, tool results) and a
//! token budget. On insertion the manager compresses and deduplicates, then
//! evicts per the window's strategy, so that the budget holds afterwards.

pub mod compression;
pub mod dedup;
pub mod events;
pub mod eviction;
pub mod models;
pub mod optimizer;
pub mod token_estimator;
pub mod window_manager;

pub use events::{EventBus, EventListener, WindowEvent, WindowEventKind};
pub use models::{
    ContextItem, ContextPriority, ContextWindow, EvictionStrategy, GlobalStats, ItemFilter,
    ItemMetadata, ItemType, NewItem, SearchOptions, SearchResult, WindowMetadata, WindowStats,
};
pub use optimizer::OptimizationReport;
pub use token_estimator::{
    CharRatioEstimator, TiktokenEstimator, Token, TokenEstimator, TokenKind, WordBasedEstimator,
};
pub use window_manager::ContextWindowManager;
