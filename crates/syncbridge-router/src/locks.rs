//! Object write locks.
//!
//! While the router writes an object on behalf of the server, the object is
//! locked so the commit it triggers locally is not echoed back. Hosts may lock
//! objects explicitly as well.
//!
//! Router writes on the same `(type, id)` also wait for each other through
//! [`ObjectLocks::write_guard`].

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use syncbridge_core::CommitAction;
use tokio::sync::{Mutex as WriteMutex, OwnedMutexGuard};

/// Id locked while an object is being created.
///
/// While it is held for a type, commits creating objects of that type are
/// suppressed: the new id is not known before the write returns.
pub const NEW_OBJECT: &str = "new";

type LockKey = (String, String);

/// Set of locked `(type, id)` pairs.
#[derive(Debug, Default)]
pub struct ObjectLocks {
    held: Mutex<HashSet<LockKey>>,
    writers: Mutex<HashMap<LockKey, Arc<WriteMutex<()>>>>,
}

impl ObjectLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock an object. Returns false if it was already locked.
    pub fn lock(&self, object_type: &str, id: &str) -> bool {
        self.held
            .lock()
            .unwrap()
            .insert((object_type.to_string(), id.to_string()))
    }

    /// Unlock an object. Returns false if it was not locked.
    pub fn unlock(&self, object_type: &str, id: &str) -> bool {
        self.held
            .lock()
            .unwrap()
            .remove(&(object_type.to_string(), id.to_string()))
    }

    pub fn is_locked(&self, object_type: &str, id: &str) -> bool {
        self.held
            .lock()
            .unwrap()
            .contains(&(object_type.to_string(), id.to_string()))
    }

    /// True if any of `ids` is locked for `object_type`.
    pub fn is_any_locked(&self, object_type: &str, ids: &[String]) -> bool {
        let held = self.held.lock().unwrap();
        ids.iter()
            .any(|id| held.contains(&(object_type.to_string(), id.clone())))
    }

    /// True if a commit of `action` on `ids` would echo a locked write.
    pub fn suppresses(&self, object_type: &str, ids: &[String], action: CommitAction) -> bool {
        self.is_any_locked(object_type, ids)
            || (action == CommitAction::Create && self.is_locked(object_type, NEW_OBJECT))
    }

    /// Lock until the returned guard is dropped.
    ///
    /// A lock that was already held is left in place when the guard drops.
    pub fn guard(self: &Arc<Self>, object_type: &str, id: &str) -> LockGuard {
        let owned = self.lock(object_type, id);
        LockGuard {
            locks: Arc::clone(self),
            object_type: object_type.to_string(),
            id: id.to_string(),
            owned,
        }
    }
}

impl ObjectLocks {
    /// Wait until no other writer holds `(object_type, id)`, then lock it
    /// until the returned guard is dropped.
    pub async fn write_guard(self: &Arc<Self>, object_type: &str, id: &str) -> WriteGuard {
        let key = (object_type.to_string(), id.to_string());
        let writer = Arc::clone(
            self.writers
                .lock()
                .unwrap()
                .entry(key.clone())
                .or_default(),
        );
        let exclusive = writer.lock_owned().await;
        WriteGuard {
            held: Some(self.guard(object_type, id)),
            exclusive: Some(exclusive),
            locks: Arc::clone(self),
            key,
        }
    }

    fn release_writer(&self, key: &LockKey) {
        let mut writers = self.writers.lock().unwrap();
        // Only the map itself still refers to an idle entry
        if writers.get(key).is_some_and(|w| Arc::strong_count(w) == 1) {
            writers.remove(key);
        }
    }
}

/// Exclusive write access to one object. See [`ObjectLocks::write_guard`].
#[derive(Debug)]
pub struct WriteGuard {
    held: Option<LockGuard>,
    exclusive: Option<OwnedMutexGuard<()>>,
    locks: Arc<ObjectLocks>,
    key: LockKey,
}

impl Drop for WriteGuard {
    fn drop(&mut self) {
        self.held.take();
        self.exclusive.take();
        self.locks.release_writer(&self.key);
    }
}

/// Releases an object lock on drop.
#[derive(Debug)]
pub struct LockGuard {
    locks: Arc<ObjectLocks>,
    object_type: String,
    id: String,
    owned: bool,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.owned {
            self.locks.unlock(&self.object_type, &self.id);
        }
    }
}
