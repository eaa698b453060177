//! Context window management for LLM conversations
//!
//! Keeps per-conversation context within a token budget using configurable
//! eviction strategies, lossy compression and content deduplication.

pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod metrics;

pub use crate::config::Config;
pub use context::{ContextWindowManager, EvictionStrategy, NewItem, WindowEvent};
pub use error::{ContextError, Result};
