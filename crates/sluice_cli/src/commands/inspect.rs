//! Inspect command implementation.

use sluice_core::{Priority, Timestamp};
use std::collections::BTreeMap;
use std::path::Path;

/// Runs the inspect command.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let (journal, mut actions) = super::load_actions(path)?;
    let stats = journal.stats();

    println!("Journal: {}", path.display());
    println!(
        "  frames: {} ({} live, {} dead)",
        stats.frames, stats.live, stats.dead
    );
    println!();
    println!("Pending actions: {}", actions.len());
    for priority in Priority::ALL {
        let count = actions.iter().filter(|a| a.priority == priority).count();
        println!("  {:>8}: {}", priority.as_str(), count);
    }

    let mut by_type: BTreeMap<String, usize> = BTreeMap::new();
    for action in &actions {
        *by_type.entry(action.action_type.to_string()).or_insert(0) += 1;
    }
    if !by_type.is_empty() {
        println!();
        println!("By action type:");
        for (tag, count) in by_type {
            println!("  {tag}: {count}");
        }
    }

    actions.sort_by(|a, b| a.enqueued_at.cmp(&b.enqueued_at));
    if let Some(oldest) = actions.first() {
        let age = Timestamp::now().since(oldest.enqueued_at);
        println!();
        println!(
            "Oldest entry: {} ({}, queued {}s ago, {}/{} retries)",
            oldest.id,
            oldest.action_type,
            age.as_secs(),
            oldest.retry_count,
            oldest.max_retries
        );
    }

    Ok(())
}
