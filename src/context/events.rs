//! Window lifecycle notifications
//!
//! Delivery is synchronous and best effort. Listeners observe, they do not
//! take part in correctness.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::models::{EvictionStrategy, ItemType};

/// Something that happened to a window
#[derive(Debug, Clone, PartialEq)]
pub enum WindowEvent {
    WindowCreated {
        window_id: String,
        max_tokens: usize,
        strategy: EvictionStrategy,
    },
    WindowActivated {
        window_id: String,
    },
    ItemAdded {
        window_id: String,
        item_id: String,
        item_type: ItemType,
        tokens: usize,
        used_tokens: usize,
        max_tokens: usize,
    },
    ItemRemoved {
        window_id: String,
        item_id: String,
        tokens: usize,
    },
    ItemEvicted {
        window_id: String,
        item_id: String,
        tokens: usize,
        reason: EvictionStrategy,
    },
    WindowOptimized {
        window_id: String,
        tokens_saved: usize,
        compressed_items: usize,
        deduplicated_items: usize,
    },
    /// An insertion left the window above its budget
    OverBudget {
        window_id: String,
        item_id: String,
        used_tokens: usize,
        max_tokens: usize,
    },
    WindowCleared {
        window_id: String,
        removed_items: usize,
    },
    WindowDeleted {
        window_id: String,
    },
    WindowImported {
        window_id: String,
        item_count: usize,
    },
}

/// Discriminant of [`WindowEvent`], used for subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowEventKind {
    WindowCreated,
    WindowActivated,
    ItemAdded,
    ItemRemoved,
    ItemEvicted,
    WindowOptimized,
    OverBudget,
    WindowCleared,
    WindowDeleted,
    WindowImported,
}

impl WindowEvent {
    pub fn kind(&self) -> WindowEventKind {
        match self {
            WindowEvent::WindowCreated { .. } => WindowEventKind::WindowCreated,
            WindowEvent::WindowActivated { .. } => WindowEventKind::WindowActivated,
            WindowEvent::ItemAdded { .. } => WindowEventKind::ItemAdded,
            WindowEvent::ItemRemoved { .. } => WindowEventKind::ItemRemoved,
            WindowEvent::ItemEvicted { .. } => WindowEventKind::ItemEvicted,
            WindowEvent::WindowOptimized { .. } => WindowEventKind::WindowOptimized,
            WindowEvent::OverBudget { .. } => WindowEventKind::OverBudget,
            WindowEvent::WindowCleared { .. } => WindowEventKind::WindowCleared,
            WindowEvent::WindowDeleted { .. } => WindowEventKind::WindowDeleted,
            WindowEvent::WindowImported { .. } => WindowEventKind::WindowImported,
        }
    }

    pub fn window_id(&self) -> &str {
        match self {
            WindowEvent::WindowCreated { window_id, .. }
            | WindowEvent::WindowActivated { window_id }
            | WindowEvent::ItemAdded { window_id, .. }
            | WindowEvent::ItemRemoved { window_id, .. }
            | WindowEvent::ItemEvicted { window_id, .. }
            | WindowEvent::WindowOptimized { window_id, .. }
            | WindowEvent::OverBudget { window_id, .. }
            | WindowEvent::WindowCleared { window_id, .. }
            | WindowEvent::WindowDeleted { window_id }
            | WindowEvent::WindowImported { window_id, .. } => window_id,
        }
    }
}

/// Receives window events
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &WindowEvent);
}

impl<F> EventListener for F
where
    F: Fn(&WindowEvent) + Send + Sync,
{
    fn on_event(&self, event: &WindowEvent) {
        self(event)
    }
}

/// Subscriber lists keyed by event kind, plus catch-all subscribers
#[derive(Default)]
pub struct EventBus {
    subscribers: HashMap<WindowEventKind, Vec<Arc<dyn EventListener>>>,
    catch_all: Vec<Arc<dyn EventListener>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, kind: WindowEventKind, listener: Arc<dyn EventListener>) {
        self.subscribers.entry(kind).or_default().push(listener);
    }

    pub fn subscribe_all(&mut self, listener: Arc<dyn EventListener>) {
        self.catch_all.push(listener);
    }

    /// Deliver to kind-specific listeners first, then catch-all ones
    pub fn emit(&self, event: WindowEvent) {
        if let Some(listeners) = self.subscribers.get(&event.kind()) {
            for listener in listeners {
                listener.on_event(&event);
            }
        }
        for listener in &self.catch_all {
            listener.on_event(&event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.subscribers.values().map(Vec::len).sum::<usize>() + self.catch_all.len()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}
