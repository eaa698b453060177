//! Integration tests for context window management
//!
//! These tests drive the manager through its public surface only: config
//! loading, insertion under budget pressure, events, stats and
//! export/import.

use context_window::{
    config::Config,
    context::{
        ContextPriority, ContextWindowManager, EvictionStrategy, ItemType, NewItem,
        WindowEvent, WindowEventKind, WordBasedEstimator,
    },
    ContextError,
};
use std::sync::{Arc, Mutex};

fn item_ids(manager: &ContextWindowManager, window_id: &str) -> Vec<String> {
    manager
        .get_window(window_id)
        .unwrap()
        .items()
        .iter()
        .map(|item| item.id.clone())
        .collect()
}

fn assert_accounting(manager: &ContextWindowManager) {
    for window in manager.windows() {
        assert_eq!(window.used_tokens(), window.computed_tokens());
    }
}

#[test]
fn test_manager_from_config_uses_defaults() {
    let mut config = Config::default();
    config.window.default_max_tokens = 64;
    config.window.default_strategy = EvictionStrategy::Sliding;
    config.window.model = Some("claude-3-haiku".to_string());

    let mut manager =
        ContextWindowManager::from_config(&config, Arc::new(WordBasedEstimator::default()))
            .unwrap();
    let window = manager.create_window_with_defaults().unwrap();

    assert_eq!(window.max_tokens(), 64);
    assert_eq!(window.strategy(), EvictionStrategy::Sliding);
    assert_eq!(window.metadata().model.as_deref(), Some("claude-3-haiku"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let mut config = Config::default();
    config.window.default_max_tokens = 0;
    let result =
        ContextWindowManager::from_config(&config, Arc::new(WordBasedEstimator::default()));
    assert!(matches!(result, Err(ContextError::InvalidConfiguration(_))));
}

#[test]
fn test_budget_holds_across_strategies() {
    let strategies = [
        EvictionStrategy::Fifo,
        EvictionStrategy::Lifo,
        EvictionStrategy::Priority,
        EvictionStrategy::Relevance,
        EvictionStrategy::Sliding,
        EvictionStrategy::Adaptive,
    ];
    let priorities = [
        ContextPriority::Optional,
        ContextPriority::Low,
        ContextPriority::Medium,
        ContextPriority::High,
    ];

    for strategy in strategies {
        let mut manager = ContextWindowManager::default();
        let window_id = manager
            .create_window(200, strategy, None)
            .unwrap()
            .id()
            .to_string();
        manager
            .add_item(
                NewItem::new("You are a careful assistant.")
                    .with_type(ItemType::System)
                    .with_id("system")
                    .persistent(),
            )
            .unwrap();

        for i in 0..40 {
            manager
                .add_item(
                    NewItem::new(format!("turn {} says something distinct", i))
                        .with_tokens(15 + (i % 7))
                        .with_priority(priorities[i % priorities.len()])
                        .with_relevance((i % 10) as f32 / 10.0),
                )
                .unwrap();

            let window = manager.get_window(&window_id).unwrap();
            assert!(
                window.used_tokens() <= window.max_tokens(),
                "{} exceeded budget",
                strategy
            );
            assert!(window.get_item("system").is_some(), "{} evicted persistent", strategy);
        }
        assert_accounting(&manager);
    }
}

#[test]
fn test_sliding_keeps_most_recent_turns() {
    let mut manager = ContextWindowManager::default();
    let window_id = manager
        .create_window(30, EvictionStrategy::Sliding, None)
        .unwrap()
        .id()
        .to_string();

    for i in 0..6 {
        manager
            .add_item(
                NewItem::new(format!("turn {}", i))
                    .with_id(format!("t{}", i))
                    .with_tokens(10),
            )
            .unwrap();
    }

    assert_eq!(item_ids(&manager, &window_id), vec!["t3", "t4", "t5"]);
}

#[test]
fn test_relevance_strategy_evicts_unscored_first() {
    let mut manager = ContextWindowManager::default();
    let window_id = manager
        .create_window(30, EvictionStrategy::Relevance, None)
        .unwrap()
        .id()
        .to_string();

    manager
        .add_item(NewItem::new("a").with_id("scored").with_tokens(10).with_relevance(0.2))
        .unwrap();
    manager
        .add_item(NewItem::new("b").with_id("unscored").with_tokens(10))
        .unwrap();
    manager
        .add_item(NewItem::new("c").with_id("best").with_tokens(10).with_relevance(0.9))
        .unwrap();
    manager
        .add_item(NewItem::new("d").with_id("new").with_tokens(10).with_relevance(0.5))
        .unwrap();

    assert_eq!(item_ids(&manager, &window_id), vec!["scored", "best", "new"]);
}

#[test]
fn test_event_stream_for_eviction() {
    let mut manager = ContextWindowManager::default();
    let evicted = Arc::new(Mutex::new(Vec::new()));
    let sink = evicted.clone();
    manager.subscribe(
        WindowEventKind::ItemEvicted,
        Arc::new(move |event: &WindowEvent| {
            if let WindowEvent::ItemEvicted { item_id, reason, .. } = event {
                sink.lock().unwrap().push((item_id.clone(), *reason));
            }
        }),
    );

    manager.create_window(100, EvictionStrategy::Fifo, None).unwrap();
    for id in ["a", "b", "c"] {
        manager
            .add_item(NewItem::new(format!("item {}", id)).with_id(id).with_tokens(40))
            .unwrap();
    }

    assert_eq!(
        *evicted.lock().unwrap(),
        vec![("a".to_string(), EvictionStrategy::Fifo)]
    );
}

#[test]
fn test_compression_makes_room_without_eviction() {
    let mut manager = ContextWindowManager::default();
    let window_id = manager
        .create_window(100, EvictionStrategy::Fifo, None)
        .unwrap()
        .id()
        .to_string();

    let block = "fn main() {\n    // entry point\n    run();\n}\n\n\n\n    run();\n    run();\n";
    let noisy = block.repeat(3) + &" ".repeat(120);
    manager.add_item(NewItem::new(noisy).with_id("code")).unwrap();
    let before = manager.get_window(&window_id).unwrap().used_tokens();
    assert!(before > 40);

    manager
        .add_item(NewItem::new("x".repeat(80)).with_id("next"))
        .unwrap();

    let window = manager.get_window(&window_id).unwrap();
    let code = window.get_item("code").expect("code item kept");
    assert!(code.is_compressed());
    assert_eq!(code.content, "fn main() {\nrun();\n}");
    assert!(window.used_tokens() <= window.max_tokens());
    assert!(manager.get_stats(None).unwrap().compression_ratio < 1.0);
    assert_accounting(&manager);
}

#[test]
fn test_round_trip_preserves_order_and_tokens() {
    let mut manager = ContextWindowManager::default();
    let window_id = manager
        .create_window(1_000, EvictionStrategy::Priority, None)
        .unwrap()
        .id()
        .to_string();
    for (i, kind) in [ItemType::System, ItemType::Document, ItemType::ToolResult, ItemType::Memory]
        .into_iter()
        .enumerate()
    {
        manager
            .add_item(NewItem::new(format!("payload {}", i)).with_type(kind))
            .unwrap();
    }

    let exported = manager.export_window(Some(&window_id)).unwrap();
    let mut value: serde_json::Value = serde_json::from_str(&exported).unwrap();
    value["items"][0]["annotation"] = serde_json::json!("kept");
    value.as_object_mut().unwrap().remove("id");

    let mut restored = ContextWindowManager::default();
    let window = restored.import_window(&value.to_string()).unwrap();
    let original = manager.get_window(&window_id).unwrap();

    assert_ne!(window.id(), original.id());
    assert_eq!(window.used_tokens(), original.used_tokens());
    let contents: Vec<(&str, usize)> = window
        .items()
        .iter()
        .map(|i| (i.content.as_str(), i.tokens))
        .collect();
    let expected: Vec<(&str, usize)> = original
        .items()
        .iter()
        .map(|i| (i.content.as_str(), i.tokens))
        .collect();
    assert_eq!(contents, expected);
    assert_eq!(window.items()[0].extra["annotation"], "kept");
}

#[test]
fn test_windows_are_independent() {
    let mut manager = ContextWindowManager::default();
    let first = manager
        .create_window(20, EvictionStrategy::Fifo, None)
        .unwrap()
        .id()
        .to_string();
    let second = manager
        .create_window(20, EvictionStrategy::Fifo, None)
        .unwrap()
        .id()
        .to_string();

    manager
        .add_item(NewItem::new("one").with_tokens(15).in_window(first.clone()))
        .unwrap();
    manager.add_item(NewItem::new("two").with_tokens(15)).unwrap();

    assert_eq!(manager.get_window(&first).unwrap().len(), 1);
    assert_eq!(manager.get_window(&second).unwrap().len(), 1);

    let global = manager.global_stats();
    assert_eq!(global.total_windows, 2);
    assert_eq!(global.total_tokens, 30);
}
