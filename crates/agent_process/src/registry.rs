use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::supervisor::{KillHandle, Signal};

/// Live processes keyed by conversation id.
#[derive(Debug, Clone, Default)]
pub struct ProcessRegistry {
    active: Arc<Mutex<HashMap<String, KillHandle>>>,
}

impl ProcessRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `handle` for `conversation_id`, returning any handle it replaces.
    pub fn register(&self, conversation_id: &str, handle: KillHandle) -> Option<KillHandle> {
        lock_unpoisoned(&self.active).insert(conversation_id.to_string(), handle)
    }

    /// Registers `handle` until the returned guard is dropped.
    #[must_use = "the registration ends when the guard is dropped"]
    pub fn track(&self, conversation_id: &str, handle: KillHandle) -> Registration {
        self.register(conversation_id, handle.clone());
        Registration {
            registry: self.clone(),
            conversation_id: conversation_id.to_string(),
            handle,
        }
    }

    /// Removes the entry only if it still refers to `handle`.
    ///
    /// A retried turn registers a new process under the same id; the finished
    /// attempt must not evict it.
    pub fn unregister(&self, conversation_id: &str, handle: &KillHandle) {
        let mut active = lock_unpoisoned(&self.active);
        let matches = active
            .get(conversation_id)
            .is_some_and(|current| current.same_process(handle));
        if matches {
            active.remove(conversation_id);
        }
    }

    /// Sends `TERM` to the conversation's process. Returns whether one was signalled.
    pub fn cancel(&self, conversation_id: &str) -> bool {
        let handle = lock_unpoisoned(&self.active).get(conversation_id).cloned();
        let Some(handle) = handle else {
            return false;
        };

        let delivered = handle.kill(Signal::Term);
        debug!(conversation_id, delivered, "cancel requested");
        delivered
    }

    pub fn is_active(&self, conversation_id: &str) -> bool {
        lock_unpoisoned(&self.active)
            .get(conversation_id)
            .is_some_and(KillHandle::is_running)
    }

    pub fn active_count(&self) -> usize {
        lock_unpoisoned(&self.active)
            .values()
            .filter(|handle| handle.is_running())
            .count()
    }
}

/// Registry entry that is removed when dropped, including when the owning
/// future is cancelled mid-turn.
#[derive(Debug)]
pub struct Registration {
    registry: ProcessRegistry,
    conversation_id: String,
    handle: KillHandle,
}

impl Registration {
    pub fn handle(&self) -> &KillHandle {
        &self.handle
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.unregister(&self.conversation_id, &self.handle);
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
