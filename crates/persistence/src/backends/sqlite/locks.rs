//! Named advisory locks shared by the connections of one backend.
//!
//! SQLite has no `GET_LOCK`, so named locks are kept in process. A lock is
//! owned by a connection and is reentrant for that connection; other
//! connections block until it is released.

use std::collections::HashMap;

use parking_lot::{Condvar, Mutex};

use crate::core::ConnectionId;
use crate::error::{BackendError, StorageResult};

struct Holder {
    owner: ConnectionId,
    depth: usize,
}

/// Registry of held advisory locks.
#[derive(Default)]
pub(crate) struct LockRegistry {
    held: Mutex<HashMap<String, Holder>>,
    released: Condvar,
}

impl LockRegistry {
    /// Blocks until `owner` holds the lock `name`.
    pub(crate) fn acquire(&self, name: &str, owner: ConnectionId) {
        let mut held = self.held.lock();
        loop {
            match held.get_mut(name) {
                None => {
                    held.insert(name.to_string(), Holder { owner, depth: 1 });
                    tracing::debug!(lock = name, connection = %owner, "advisory lock acquired");
                    return;
                }
                Some(holder) if holder.owner == owner => {
                    holder.depth += 1;
                    return;
                }
                Some(_) => {
                    tracing::debug!(lock = name, connection = %owner, "waiting for advisory lock");
                    self.released.wait(&mut held);
                }
            }
        }
    }

    /// Releases one level of the lock held by `owner`.
    pub(crate) fn release(&self, name: &str, owner: ConnectionId) -> StorageResult<()> {
        let mut held = self.held.lock();
        let Some(holder) = held.get_mut(name).filter(|h| h.owner == owner) else {
            return Err(BackendError::Internal {
                backend_name: "sqlite".to_string(),
                message: format!("advisory lock '{}' is not held by connection {}", name, owner),
                source: None,
            }
            .into());
        };
        holder.depth -= 1;
        if holder.depth == 0 {
            held.remove(name);
            tracing::debug!(lock = name, connection = %owner, "advisory lock released");
            self.released.notify_all();
        }
        Ok(())
    }

    /// Releases every lock held by `owner`.
    pub(crate) fn release_all(&self, owner: ConnectionId) {
        let mut held = self.held.lock();
        let before = held.len();
        held.retain(|_, holder| holder.owner != owner);
        if held.len() != before {
            tracing::warn!(connection = %owner, "advisory locks released on connection drop");
            self.released.notify_all();
        }
    }

    #[cfg(test)]
    fn is_held(&self, name: &str) -> bool {
        self.held.lock().contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_lock_is_reentrant_for_owner() {
        let registry = LockRegistry::default();
        let owner = ConnectionId::new();
        registry.acquire("import", owner);
        registry.acquire("import", owner);
        registry.release("import", owner).unwrap();
        assert!(registry.is_held("import"));
        registry.release("import", owner).unwrap();
        assert!(!registry.is_held("import"));
    }

    #[test]
    fn test_release_by_other_connection_fails() {
        let registry = LockRegistry::default();
        registry.acquire("import", ConnectionId::new());
        assert!(registry.release("import", ConnectionId::new()).is_err());
        assert!(registry.release("missing", ConnectionId::new()).is_err());
    }

    #[test]
    fn test_second_owner_blocks_until_release() {
        let registry = Arc::new(LockRegistry::default());
        let first = ConnectionId::new();
        registry.acquire("import", first);

        let acquired = Arc::new(AtomicBool::new(false));
        let waiter = {
            let registry = registry.clone();
            let acquired = acquired.clone();
            thread::spawn(move || {
                let second = ConnectionId::new();
                registry.acquire("import", second);
                acquired.store(true, Ordering::SeqCst);
                registry.release("import", second).unwrap();
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!acquired.load(Ordering::SeqCst));

        registry.release("import", first).unwrap();
        waiter.join().unwrap();
        assert!(acquired.load(Ordering::SeqCst));
    }

    #[test]
    fn test_release_all_frees_waiters() {
        let registry = LockRegistry::default();
        let owner = ConnectionId::new();
        registry.acquire("a", owner);
        registry.acquire("b", owner);
        registry.release_all(owner);
        assert!(!registry.is_held("a"));
        assert!(!registry.is_held("b"));
    }
}
