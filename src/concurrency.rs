//! Shared engine access
//!
//! Loading and saving block for their whole duration. A caller that must stay
//! responsive hands the whole operation to one worker thread through
//! [`SharedEngine`]. The worker holds the write lock from start to finish, so
//! the tree is never read or mutated while a load or save is in flight; the
//! returned `JoinHandle` is the completion signal.

use crate::engine::Engine;
use crate::error::ImageError;
use crate::persist::SaveSummary;
use crate::tree::ReadSummary;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Cloneable handle to one engine.
#[derive(Clone)]
pub struct SharedEngine {
    inner: Arc<RwLock<Engine>>,
}

impl SharedEngine {
    pub fn new(engine: Engine) -> Self {
        Self {
            inner: Arc::new(RwLock::new(engine)),
        }
    }

    /// Shared access; blocks while a load or save is running.
    pub fn read(&self) -> RwLockReadGuard<'_, Engine> {
        self.inner.read()
    }

    /// Exclusive access for edits.
    pub fn write(&self) -> RwLockWriteGuard<'_, Engine> {
        self.inner.write()
    }

    /// Load `path` on a worker thread.
    pub fn spawn_load(&self, path: PathBuf) -> JoinHandle<Result<ReadSummary, ImageError>> {
        let inner = Arc::clone(&self.inner);
        thread::spawn(move || inner.write().load_image(&path))
    }

    /// Save to `target` on a worker thread.
    pub fn spawn_save(&self, target: PathBuf) -> JoinHandle<Result<SaveSummary, ImageError>> {
        let inner = Arc::clone(&self.inner);
        thread::spawn(move || inner.write().save_as(&target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_save_then_load_on_worker() {
        let temp = tempfile::tempdir().unwrap();
        let host = temp.path().join("payload");
        fs::write(&host, b"0123456789").unwrap();
        let target = temp.path().join("worker.img");

        let shared = SharedEngine::new(Engine::default());
        {
            let mut engine = shared.write();
            let root = engine.new_empty_image("worker.img");
            engine.import_file(root, &host).unwrap();
        }

        let summary = shared.spawn_save(target.clone()).join().unwrap().unwrap();
        assert!(summary.success);
        assert!(!shared.read().is_dirty());

        let reader = SharedEngine::new(Engine::default());
        let loaded = reader.spawn_load(target).join().unwrap().unwrap();
        assert_eq!(loaded.files, 1);
        assert!(reader.read().resolve("/payload").is_ok());
    }
}
