use std::sync::Arc;

use crate::config::HistoryConfig;

pub mod history;
pub mod persistence;

pub use history::*;
pub use persistence::*;

/// Picks the persistence adapter for the configured storage directory.
///
/// An empty directory keeps state in process memory only.
pub fn persistence_for(cfg: &HistoryConfig) -> Arc<dyn PersistencePort> {
    match cfg.storage_dir.as_deref().map(str::trim) {
        Some(dir) if !dir.is_empty() => Arc::new(FilePersistence::new(dir)),
        _ => Arc::new(MemoryPersistence::new()),
    }
}
