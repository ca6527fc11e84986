//! Sweep command implementation.

use sluice_core::{ActionStore, RetentionPolicy, Timestamp};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Runs the sweep command.
pub fn run(
    path: &Path,
    retention_days: u64,
    apply: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let (mut journal, actions) = super::load_actions(path)?;
    let total = actions.len();

    let policy = RetentionPolicy::new(Duration::from_secs(retention_days * 24 * 60 * 60));
    let outcome = policy.sweep(Timestamp::now(), actions);

    if outcome.evicted.is_empty() {
        println!("Nothing to evict ({total} pending, retention {retention_days}d)");
        return Ok(());
    }

    for (action, reason) in &outcome.evicted {
        println!(
            "{} {} {} ({reason})",
            action.id, action.action_type, action.enqueued_at
        );
    }

    if apply {
        for (action, _) in &outcome.evicted {
            journal.delete(action.id)?;
        }
        journal.compact()?;
        info!(
            evicted = outcome.evicted_count(),
            kept = outcome.kept.len(),
            "retention sweep applied"
        );
        println!(
            "Evicted {} of {total} actions, {} kept",
            outcome.evicted_count(),
            outcome.kept.len()
        );
    } else {
        println!(
            "Would evict {} of {total} actions (run with --apply to evict)",
            outcome.evicted_count()
        );
    }

    Ok(())
}
