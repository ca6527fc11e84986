//! Dump command implementation.

use std::path::Path;

/// Runs the dump command.
pub fn run(
    path: &Path,
    limit: Option<usize>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let (_journal, mut actions) = super::load_actions(path)?;
    actions.sort_by(|a, b| a.drain_cmp(b));
    if let Some(limit) = limit {
        actions.truncate(limit);
    }

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&actions)?);
        }
        "text" => {
            for action in &actions {
                let last_error = action.last_error.as_deref().unwrap_or("-");
                println!(
                    "{} {:>8} {} seq={} enqueued_at={} retries={}/{} last_error={}",
                    action.id,
                    action.priority.as_str(),
                    action.action_type,
                    action.sequence,
                    action.enqueued_at,
                    action.retry_count,
                    action.max_retries,
                    last_error
                );
            }
        }
        other => return Err(format!("unknown format: {other} (expected text or json)").into()),
    }

    Ok(())
}
