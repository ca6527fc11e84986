//! CLI command implementations.

pub mod dump;
pub mod inspect;
pub mod sweep;
pub mod verify;

use sluice_core::{ActionStore, JournalStore, QueuedAction};
use sluice_storage::FileBackend;
use std::path::Path;

/// Compaction floor for CLI-opened journals; maintenance commands
/// should not rewrite the log behind the user's back.
const NO_AUTO_COMPACT: u64 = u64::MAX;

/// Opens an existing journal and loads its live actions.
pub fn load_actions(
    path: &Path,
) -> Result<(JournalStore<FileBackend>, Vec<QueuedAction>), Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("journal not found: {}", path.display()).into());
    }
    let backend = FileBackend::open(path)?;
    let mut journal = JournalStore::open(backend, NO_AUTO_COMPACT)?;
    let actions = journal.load()?;
    Ok((journal, actions))
}
