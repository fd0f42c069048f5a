//! Observable cache cell.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::cache::cell::{CacheCell, Populate, TransitionHook};
use crate::error::ClientError;

/// Observer callback: `(old value if any, new value)`.
type Observer<T> = Box<dyn Fn(Option<&T>, &T) + Send + Sync>;

/// A [`CacheCell`] whose transitions to populated are observable.
///
/// Every transition — network install or [`update_item`] — invokes the
/// registered observers with the old and new value. Notification for a
/// given cell is never concurrent with itself: deliveries are serialized
/// and fire in transition order.
///
/// [`update_item`]: WatchableCacheCell::update_item
pub struct WatchableCacheCell<T> {
    cell: CacheCell<T>,
    observers: Arc<RwLock<Vec<Observer<T>>>>,
}

impl<T> Clone for WatchableCacheCell<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
            observers: self.observers.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> WatchableCacheCell<T> {
    /// Create an empty watchable cell over a population source.
    pub fn new(source: Arc<dyn Populate<T>>) -> Self {
        let observers: Arc<RwLock<Vec<Observer<T>>>> = Arc::new(RwLock::new(Vec::new()));
        let hook_observers = observers.clone();
        let hook: TransitionHook<T> = Arc::new(move |old: Option<T>, new: &T| {
            for observer in hook_observers.read().iter() {
                observer(old.as_ref(), new);
            }
        });
        Self {
            cell: CacheCell::with_hook(source, Some(hook)),
            observers,
        }
    }

    /// Create an empty watchable cell populated by a closure.
    pub fn from_fn<F, Fut>(populate: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ClientError>> + Send + 'static,
    {
        Self::new(Arc::new(crate::cache::cell::FnSource(populate)))
    }

    /// Register an observer for every transition to populated.
    ///
    /// Observers run on whichever task drove the transition and must not
    /// block; deliveries to one cell are serialized.
    pub fn observe(&self, observer: impl Fn(Option<&T>, &T) + Send + Sync + 'static) {
        self.observers.write().push(Box::new(observer));
    }

    // ── Delegation to the underlying cell ───────────────────────────

    /// See [`CacheCell::get`].
    pub async fn get(&self) -> Result<T, ClientError> {
        self.cell.get().await
    }

    /// See [`CacheCell::subscribe`].
    pub fn subscribe<S, F>(&self, on_success: S, on_failure: F)
    where
        S: FnOnce(T) + Send + 'static,
        F: FnOnce(ClientError) + Send + 'static,
    {
        self.cell.subscribe(on_success, on_failure);
    }

    /// See [`CacheCell::future`].
    pub fn future(&self) -> crate::cache::CacheFuture<T> {
        self.cell.future()
    }

    /// See [`CacheCell::update_item`].
    pub fn update_item(&self, value: T) {
        self.cell.update_item(value);
    }

    /// See [`CacheCell::peek`].
    #[must_use]
    pub fn peek(&self) -> Option<T> {
        self.cell.peek()
    }

    /// See [`CacheCell::if_populated`].
    pub fn if_populated(&self, action: impl FnOnce(&T)) {
        self.cell.if_populated(action);
    }

    /// See [`CacheCell::is_populated`].
    #[must_use]
    pub fn is_populated(&self) -> bool {
        self.cell.is_populated()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
