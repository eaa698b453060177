//! Example: keeping a conversation inside a token budget
//!
//! Loads configuration (file path from the first argument, environment
//! otherwise), wires metrics, and feeds a short conversation through a small
//! adaptive window.

use context_window::{
    config::Config,
    context::{
        ContextPriority, ContextWindowManager, ItemType, NewItem, TiktokenEstimator, WindowEvent,
    },
    logging::init_tracing,
    metrics::{MetricsListener, METRICS},
    EvictionStrategy,
};
use std::sync::Arc;

fn main() -> anyhow::Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    init_tracing(&config.logging);

    let estimator = Arc::new(TiktokenEstimator::new()?);
    let mut manager = ContextWindowManager::from_config(&config, estimator)?;
    manager.subscribe_all(Arc::new(MetricsListener::global()));
    manager.subscribe_all(Arc::new(|event: &WindowEvent| {
        if let WindowEvent::OverBudget { item_id, used_tokens, max_tokens, .. } = event {
            eprintln!("item {} left the window at {}/{} tokens", item_id, used_tokens, max_tokens);
        }
    }));

    let window_id = manager
        .create_window(120, EvictionStrategy::Adaptive, None)?
        .id()
        .to_string();

    manager.add_item(
        NewItem::new("You are a concise assistant that answers questions about Rust.")
            .with_type(ItemType::System)
            .with_priority(ContextPriority::Critical)
            .persistent(),
    )?;

    let turns = [
        ("How do I read a file?", 0.4),
        ("Use std::fs::read_to_string and handle the io::Result.", 0.6),
        ("And asynchronously?", 0.7),
        ("With tokio, call tokio::fs::read_to_string(path).await.", 0.9),
        ("How do I split it into lines?", 0.8),
        ("Call .lines() on the string; it yields &str slices without the newline.", 0.9),
    ];
    for (text, relevance) in turns {
        manager.add_item(NewItem::new(text).with_relevance(relevance))?;
    }

    let stats = manager.get_stats(Some(&window_id))?;
    println!(
        "{} items, {}/{} tokens, compression ratio {:.2}",
        stats.item_count, stats.total_tokens, stats.max_tokens, stats.compression_ratio
    );
    println!("{}", manager.build_context(Some(&window_id))?);
    println!("{}", METRICS.export_prometheus());

    Ok(())
}
