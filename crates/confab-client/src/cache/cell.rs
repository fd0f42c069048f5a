//! The single-flight cache cell.
//!
//! State machine per cell: `Empty → InFlight → Populated`, one lock, a
//! FIFO waiter queue with channel-based wakeups. Success wakes every
//! waiter (each re-evaluates and observes `Populated`); failure is
//! reported only to the consumer that owned the attempt and promotes
//! exactly one waiter to retry. FIFO promotion is a deliberate, tested
//! guarantee.
//!
//! [`CacheCell::update_item`] is the overwrite authority: a population
//! completing after a concurrent update installs nothing — the updated
//! value stands, and late completions can never roll state back.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::ClientError;

/// Supplies the value for an empty cell — typically a dispatcher plus an
/// inquiry template.
#[async_trait]
pub trait Populate<T>: Send + Sync {
    /// Fetch the value. Called at most once per population attempt.
    async fn populate(&self) -> Result<T, ClientError>;
}

pub(crate) struct FnSource<F>(pub(crate) F);

#[async_trait]
impl<T, F, Fut> Populate<T> for FnSource<F>
where
    T: Send + 'static,
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, ClientError>> + Send,
{
    async fn populate(&self) -> Result<T, ClientError> {
        (self.0)().await
    }
}

/// How a parked consumer is resumed.
enum Signal {
    /// Re-evaluate from the top (the cell is now populated).
    Wake,
    /// The previous attempt failed; you own the retry.
    Promote,
}

struct Waiter {
    id: u64,
    tx: oneshot::Sender<Signal>,
}

enum State<T> {
    Empty,
    InFlight { waiters: VecDeque<Waiter> },
    Populated(T),
}

struct Inner<T> {
    state: State<T>,
    next_waiter_id: u64,
}

/// Transition callback: `(old value if any, new value)`.
pub(crate) type TransitionHook<T> = Arc<dyn Fn(Option<T>, &T) + Send + Sync>;

struct NotifyQueue<T> {
    queue: VecDeque<(Option<T>, T)>,
    draining: bool,
}

struct Shared<T> {
    inner: Mutex<Inner<T>>,
    source: Arc<dyn Populate<T>>,
    hook: Option<TransitionHook<T>>,
    notify: Mutex<NotifyQueue<T>>,
}

/// A lazily-populated, externally-updatable, single-flight value holder.
///
/// Cheap to clone; clones share the same cell.
pub struct CacheCell<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for CacheCell<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

/// What the state inspection under the lock decided to do.
enum Step<T> {
    Value(T),
    Populate,
    Wait {
        id: u64,
        rx: oneshot::Receiver<Signal>,
    },
}

impl<T: Clone + Send + 'static> CacheCell<T> {
    /// Create an empty cell over a population source.
    pub fn new(source: Arc<dyn Populate<T>>) -> Self {
        Self::with_hook(source, None)
    }

    /// Create an empty cell populated by a closure.
    pub fn from_fn<F, Fut>(populate: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ClientError>> + Send + 'static,
    {
        Self::new(Arc::new(FnSource(populate)))
    }

    pub(crate) fn with_hook(source: Arc<dyn Populate<T>>, hook: Option<TransitionHook<T>>) -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    state: State::Empty,
                    next_waiter_id: 0,
                }),
                source,
                hook,
                notify: Mutex::new(NotifyQueue {
                    queue: VecDeque::new(),
                    draining: false,
                }),
            }),
        }
    }

    // ── Consumption ─────────────────────────────────────────────────

    /// Get the value, populating if necessary.
    ///
    /// Populated → returns immediately. In flight elsewhere → suspends
    /// until that attempt completes, then re-evaluates. Empty → this
    /// caller becomes the populator. A population failure is returned
    /// only to the caller that owned the attempt; the cell stays
    /// retryable.
    pub async fn get(&self) -> Result<T, ClientError> {
        self.get_inner(None).await
    }

    /// Same three-way branch, resumed via callbacks on a spawned task.
    pub fn subscribe<S, F>(&self, on_success: S, on_failure: F)
    where
        S: FnOnce(T) + Send + 'static,
        F: FnOnce(ClientError) + Send + 'static,
    {
        let cell = self.clone();
        let _ = tokio::spawn(async move {
            match cell.get().await {
                Ok(value) => on_success(value),
                Err(error) => on_failure(error),
            }
        });
    }

    /// Same semantics as [`CacheCell::get`], exposed as a cancellable
    /// future. Cancellation succeeds only while the consumer is still a
    /// queued waiter, and detaches that one waiter without affecting the
    /// rest.
    pub fn future(&self) -> crate::cache::CacheFuture<T> {
        crate::cache::CacheFuture::spawn(self.clone())
    }

    /// Non-blocking observation; never populates.
    #[must_use]
    pub fn peek(&self) -> Option<T> {
        match &self.shared.inner.lock().state {
            State::Populated(value) => Some(value.clone()),
            State::Empty | State::InFlight { .. } => None,
        }
    }

    /// Run `action` against the value if populated; never populates.
    pub fn if_populated(&self, action: impl FnOnce(&T)) {
        if let State::Populated(value) = &self.shared.inner.lock().state {
            action(value);
        }
    }

    /// Whether the cell currently holds a value.
    #[must_use]
    pub fn is_populated(&self) -> bool {
        matches!(self.shared.inner.lock().state, State::Populated(_))
    }

    // ── External overwrite ──────────────────────────────────────────

    /// Unconditionally transition to populated with `value`.
    ///
    /// Used when an external event makes the server-confirmed value
    /// known without a round trip. Never triggers a network call. Any
    /// parked waiters are woken and observe the new value; a population
    /// completing later installs nothing over it.
    pub fn update_item(&self, value: T) {
        let old = {
            let mut inner = self.shared.inner.lock();
            match std::mem::replace(&mut inner.state, State::Populated(value.clone())) {
                State::Populated(old) => Some(old),
                State::InFlight { waiters } => {
                    for waiter in waiters {
                        let _ = waiter.tx.send(Signal::Wake);
                    }
                    None
                }
                State::Empty => None,
            }
        };
        self.notify_transition(old, value);
    }

    // ── Internals ───────────────────────────────────────────────────

    pub(crate) async fn get_cancellable(
        &self,
        token: &CancellationToken,
    ) -> Result<T, ClientError> {
        self.get_inner(Some(token)).await
    }

    async fn get_inner(&self, token: Option<&CancellationToken>) -> Result<T, ClientError> {
        loop {
            if token.is_some_and(|t| t.is_cancelled()) {
                return Err(ClientError::Cancelled);
            }

            let step = {
                let mut inner = self.shared.inner.lock();
                let Inner {
                    state,
                    next_waiter_id,
                } = &mut *inner;
                match state {
                    State::Populated(value) => Step::Value(value.clone()),
                    State::Empty => {
                        *state = State::InFlight {
                            waiters: VecDeque::new(),
                        };
                        Step::Populate
                    }
                    State::InFlight { waiters } => {
                        let (tx, rx) = oneshot::channel();
                        let id = *next_waiter_id;
                        *next_waiter_id += 1;
                        waiters.push_back(Waiter { id, tx });
                        Step::Wait { id, rx }
                    }
                }
            };

            match step {
                Step::Value(value) => return Ok(value),
                Step::Populate => return self.run_population().await,
                Step::Wait { id, mut rx } => {
                    let signal = if let Some(token) = token {
                        tokio::select! {
                            () = token.cancelled() => {
                                // A promotion may have raced the cancel;
                                // once promoted, the retry is owed to the
                                // queue and cancellation no longer takes.
                                match rx.try_recv() {
                                    Ok(Signal::Promote) => return self.run_population().await,
                                    _ => {
                                        self.detach_waiter(id);
                                        return Err(ClientError::Cancelled);
                                    }
                                }
                            }
                            signal = &mut rx => signal,
                        }
                    } else {
                        rx.await
                    };
                    match signal {
                        Ok(Signal::Wake) | Err(_) => {} // re-evaluate from the top
                        Ok(Signal::Promote) => return self.run_population().await,
                    }
                }
            }
        }
    }

    /// Run one population attempt as its owner.
    async fn run_population(&self) -> Result<T, ClientError> {
        debug!("populating cache cell");
        let result = self.shared.source.populate().await;

        let (transition, outcome) = {
            let mut inner = self.shared.inner.lock();
            match result {
                Ok(fetched) => {
                    let previous =
                        std::mem::replace(&mut inner.state, State::Populated(fetched.clone()));
                    match previous {
                        State::InFlight { waiters } => {
                            for waiter in waiters {
                                let _ = waiter.tx.send(Signal::Wake);
                            }
                            (Some((None, fetched.clone())), Ok(fetched))
                        }
                        State::Populated(updated) => {
                            // An update_item landed while the fetch was in
                            // flight. The update is the authority: restore
                            // it and hand it back instead of the fetch.
                            inner.state = State::Populated(updated.clone());
                            (None, Ok(updated))
                        }
                        State::Empty => (Some((None, fetched.clone())), Ok(fetched)),
                    }
                }
                Err(error) => {
                    if let State::InFlight { waiters } = &mut inner.state {
                        // Promote the oldest live waiter to retry; skip
                        // any that were cancelled and dropped.
                        let mut promoted = false;
                        while let Some(waiter) = waiters.pop_front() {
                            if waiter.tx.send(Signal::Promote).is_ok() {
                                promoted = true;
                                break;
                            }
                        }
                        if !promoted {
                            inner.state = State::Empty;
                        }
                    }
                    (None, Err(error))
                }
            }
        };

        if let Some((old, new)) = transition {
            self.notify_transition(old, new);
        }
        outcome
    }

    fn detach_waiter(&self, id: u64) {
        let mut inner = self.shared.inner.lock();
        if let State::InFlight { waiters } = &mut inner.state {
            waiters.retain(|waiter| waiter.id != id);
        }
    }

    /// Deliver a populated-transition to the hook, serialized per cell.
    ///
    /// The queue-and-drain shape guarantees the hook is never concurrent
    /// with itself and that notifications fire in transition order, even
    /// when the hook itself triggers another transition.
    fn notify_transition(&self, old: Option<T>, new: T) {
        let Some(hook) = &self.shared.hook else { return };
        {
            let mut pending = self.shared.notify.lock();
            pending.queue.push_back((old, new));
            if pending.draining {
                return; // the active drainer will deliver it
            }
            pending.draining = true;
        }
        loop {
            let next = {
                let mut pending = self.shared.notify.lock();
                match pending.queue.pop_front() {
                    Some(item) => item,
                    None => {
                        pending.draining = false;
                        return;
                    }
                }
            };
            hook(next.0, &next.1);
        }
    }

    #[cfg(test)]
    pub(crate) fn waiter_count(&self) -> usize {
        match &self.shared.inner.lock().state {
            State::InFlight { waiters } => waiters.len(),
            State::Empty | State::Populated(_) => 0,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::{Semaphore, mpsc};

    /// Population source with externally controlled pacing and results.
    struct TestSource {
        calls: AtomicUsize,
        started: mpsc::UnboundedSender<usize>,
        proceed: Semaphore,
        results: Mutex<VecDeque<Result<u32, ClientError>>>,
    }

    impl TestSource {
        fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<usize>) {
            let (tx, rx) = mpsc::unbounded_channel();
            (
                Arc::new(Self {
                    calls: AtomicUsize::new(0),
                    started: tx,
                    proceed: Semaphore::new(0),
                    results: Mutex::new(VecDeque::new()),
                }),
                rx,
            )
        }

        fn push_result(&self, result: Result<u32, ClientError>) {
            self.results.lock().push_back(result);
        }

        fn release(&self) {
            self.proceed.add_permits(1);
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Populate<u32> for TestSource {
        async fn populate(&self) -> Result<u32, ClientError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let _ = self.started.send(n);
            let permit = self.proceed.acquire().await.unwrap();
            permit.forget();
            self.results.lock().pop_front().unwrap_or(Ok(0))
        }
    }

    fn cell_over(source: &Arc<TestSource>) -> CacheCell<u32> {
        CacheCell::new(source.clone())
    }

    #[tokio::test]
    async fn populated_cell_returns_without_network() {
        let (source, _started) = TestSource::new();
        let cell = cell_over(&source);
        cell.update_item(5);
        assert_eq!(cell.get().await.unwrap(), 5);
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn empty_cell_populates_once() {
        let (source, _started) = TestSource::new();
        let cell = cell_over(&source);
        source.push_result(Ok(42));
        source.release();
        assert_eq!(cell.get().await.unwrap(), 42);
        assert_eq!(source.calls(), 1);
        // Second read is served from the cell.
        assert_eq!(cell.get().await.unwrap(), 42);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn single_flight_under_concurrency() {
        let (source, mut started) = TestSource::new();
        let cell = cell_over(&source);
        source.push_result(Ok(7));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let cell = cell.clone();
            tasks.push(tokio::spawn(async move { cell.get().await }));
        }

        // Exactly one population starts; the rest are parked.
        let _ = started.recv().await.unwrap();
        tokio::task::yield_now().await;
        source.release();

        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), 7);
        }
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn no_lost_wakeups_for_parked_waiters() {
        let (source, mut started) = TestSource::new();
        let cell = cell_over(&source);
        source.push_result(Ok(1));

        let owner = {
            let cell = cell.clone();
            tokio::spawn(async move { cell.get().await })
        };
        let _ = started.recv().await.unwrap();

        let mut waiters = Vec::new();
        for _ in 0..5 {
            let cell = cell.clone();
            waiters.push(tokio::spawn(async move { cell.get().await }));
        }
        // Let every waiter park before completion.
        while cell.waiter_count() < 5 {
            tokio::task::yield_now().await;
        }

        source.release();
        assert_eq!(owner.await.unwrap().unwrap(), 1);
        for waiter in waiters {
            assert_eq!(waiter.await.unwrap().unwrap(), 1);
        }
    }

    #[tokio::test]
    async fn failure_reported_only_to_owner_and_promotes_fifo() {
        let (source, mut started) = TestSource::new();
        let cell = cell_over(&source);
        // Every attempt fails; completion order exposes promotion order.
        for _ in 0..3 {
            source.push_result(Err(ClientError::Broken));
        }

        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<(&'static str, bool)>();

        let spawn_getter = |label: &'static str| {
            let cell = cell.clone();
            let done = done_tx.clone();
            tokio::spawn(async move {
                let result = cell.get().await;
                let _ = done.send((label, result.is_err()));
            })
        };

        let _owner = spawn_getter("owner");
        let _ = started.recv().await.unwrap();
        let _first = spawn_getter("first");
        while cell.waiter_count() < 1 {
            tokio::task::yield_now().await;
        }
        let _second = spawn_getter("second");
        while cell.waiter_count() < 2 {
            tokio::task::yield_now().await;
        }

        // Three failing attempts run back to back: owner, then the
        // promoted waiters in FIFO order.
        source.release();
        source.release();
        source.release();

        let mut order = Vec::new();
        for _ in 0..3 {
            let (label, failed) = done_rx.recv().await.unwrap();
            assert!(failed, "{label} should observe its own failure");
            order.push(label);
        }
        assert_eq!(order, vec!["owner", "first", "second"]);
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test]
    async fn failure_without_waiters_leaves_cell_retryable() {
        let (source, _started) = TestSource::new();
        let cell = cell_over(&source);
        source.push_result(Err(ClientError::Broken));
        source.release();
        assert_matches!(cell.get().await, Err(ClientError::Broken));
        assert!(!cell.is_populated());

        source.push_result(Ok(9));
        source.release();
        assert_eq!(cell.get().await.unwrap(), 9);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn update_item_wins_over_inflight_population() {
        let (source, mut started) = TestSource::new();
        let cell = cell_over(&source);
        source.push_result(Ok(42));

        let owner = {
            let cell = cell.clone();
            tokio::spawn(async move { cell.get().await })
        };
        let _ = started.recv().await.unwrap();

        // Server-confirmed value arrives via the event channel first.
        cell.update_item(7);
        source.release();

        // The owner hands back the authoritative value, not the fetch.
        assert_eq!(owner.await.unwrap().unwrap(), 7);
        assert_eq!(cell.peek(), Some(7));
    }

    #[tokio::test]
    async fn update_item_wakes_parked_waiters() {
        let (source, mut started) = TestSource::new();
        let cell = cell_over(&source);
        source.push_result(Ok(42));

        let owner = {
            let cell = cell.clone();
            tokio::spawn(async move { cell.get().await })
        };
        let _ = started.recv().await.unwrap();

        let waiter = {
            let cell = cell.clone();
            tokio::spawn(async move { cell.get().await })
        };
        while cell.waiter_count() < 1 {
            tokio::task::yield_now().await;
        }

        cell.update_item(7);
        // The waiter resumes on the update alone.
        assert_eq!(waiter.await.unwrap().unwrap(), 7);

        source.release();
        assert_eq!(owner.await.unwrap().unwrap(), 7);
    }

    #[tokio::test]
    async fn update_idempotence() {
        let (source, _started) = TestSource::new();
        let cell = cell_over(&source);
        cell.update_item(1);
        cell.update_item(2);
        assert_eq!(cell.peek(), Some(2));
        assert_eq!(cell.get().await.unwrap(), 2);
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn peek_and_if_populated_never_populate() {
        let (source, _started) = TestSource::new();
        let cell = cell_over(&source);
        assert_eq!(cell.peek(), None);
        let mut observed = None;
        cell.if_populated(|v| observed = Some(*v));
        assert_eq!(observed, None);
        assert_eq!(source.calls(), 0);

        cell.update_item(3);
        cell.if_populated(|v| observed = Some(*v));
        assert_eq!(observed, Some(3));
    }

    #[tokio::test]
    async fn subscribe_success_path() {
        let (source, _started) = TestSource::new();
        let cell = cell_over(&source);
        source.push_result(Ok(11));
        source.release();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let fail_tx = tx.clone();
        cell.subscribe(
            move |value| {
                let _ = tx.send(Ok(value));
            },
            move |error| {
                let _ = fail_tx.send(Err(error));
            },
        );
        assert_eq!(rx.recv().await.unwrap().unwrap(), 11);
    }

    #[tokio::test]
    async fn subscribe_failure_path() {
        let (source, _started) = TestSource::new();
        let cell = cell_over(&source);
        source.push_result(Err(ClientError::Broken));
        source.release();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let fail_tx = tx.clone();
        cell.subscribe(
            move |value| {
                let _ = tx.send(Ok(value));
            },
            move |error| {
                let _ = fail_tx.send(Err(error));
            },
        );
        assert_matches!(rx.recv().await.unwrap(), Err(ClientError::Broken));
        // The cell stays retryable for the next consumer.
        assert!(!cell.is_populated());
    }
}
