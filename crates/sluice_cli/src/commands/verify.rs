//! Verify command implementation.

use sluice_core::JournalStore;
use sluice_storage::FileBackend;
use std::path::Path;
use tracing::warn;

/// Runs the verify command.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("journal not found: {}", path.display()).into());
    }

    println!("Verifying journal at {}", path.display());
    let backend = FileBackend::open(path)?;
    match JournalStore::check(&backend) {
        Ok(check) => {
            println!(
                "  {} valid frames, {} live actions",
                check.frames, check.live
            );
            if check.torn_tail {
                warn!(path = %path.display(), "torn journal tail detected");
                println!("  WARNING: torn tail present; it will be truncated on next open");
            } else {
                println!("  OK");
            }
            Ok(())
        }
        Err(e) => {
            println!("  CORRUPT: {e}");
            Err(e.into())
        }
    }
}
