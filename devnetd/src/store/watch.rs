use std::sync::{Arc, RwLock};

/// Events fired after a mutation has been committed. The store does not
/// retain per-watcher buffers — callbacks run synchronously, inline with
/// the mutation, and must not block.
#[derive(Debug, Clone)]
pub enum WatchEvent<T> {
    Added(T),
    Modified(T),
    Deleted(T),
}

pub type WatchHandler<T> = Arc<dyn Fn(WatchEvent<T>) + Send + Sync>;

/// Registry of watch callbacks for one resource kind.
pub struct Watchers<T> {
    handlers: RwLock<Vec<WatchHandler<T>>>,
}

impl<T: Clone> Watchers<T> {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
        }
    }

    pub fn register(&self, handler: WatchHandler<T>) {
        self.handlers.write().expect("watchers lock poisoned").push(handler);
    }

    /// Invoke every registered handler with a clone of `event`. Takes a
    /// read lock only for the duration of snapshotting the handler list,
    /// then releases it before calling out, so a handler that itself
    /// triggers a new watch registration cannot deadlock.
    pub fn notify(&self, event: WatchEvent<T>) {
        let handlers = self.handlers.read().expect("watchers lock poisoned").clone();
        for handler in handlers {
            handler(event.clone());
        }
    }
}

impl<T: Clone> Default for Watchers<T> {
    fn default() -> Self {
        Self::new()
    }
}
