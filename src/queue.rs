use super::{
    errors::QueueError,
    result::QueueResult,
    model::QueueMetrics,
};
use std::{
    collections::VecDeque,
    future::Future,
    panic::AssertUnwindSafe,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
};
use futures::{future::BoxFuture, FutureExt};
use tokio::{
    runtime::Handle,
    sync::Notify,
    time::{Duration, Instant},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};


/// Work queue configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub parallelism: usize,
    pub idle_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            parallelism: num_cpus::get(),
            idle_timeout: Duration::from_secs(2),
        }
    }
}

impl Config {
    pub fn cpu_bound() -> Self {
        Self {
            parallelism: num_cpus::get(),
            idle_timeout: Duration::from_secs(2),
        }
    }

    pub fn io_bound() -> Self {
        Self {
            parallelism: num_cpus::get() * 2,
            idle_timeout: Duration::from_secs(10),
        }
    }
}


pub type WorkQueue<T> = Arc<WorkQueueInner<T>>;

/// The engine runs one queued payload to completion.
type Engine<T> = Box<dyn Fn(T) -> BoxFuture<'static, ()> + Send + Sync>;

/// Queue contents and worker accounting. Everything the dispatch policy
/// consults lives behind one lock so enqueue, wake and spawn decisions are
/// taken against a consistent snapshot.
struct State<T> {
    queue: VecDeque<T>,
    active: usize,
    idle: usize,
    shutdown: bool,
    valid: bool,
}

/// Elastic work queue: submitted payloads are dispatched FIFO to a
/// caller-supplied engine running on detached workers. Workers are spawned
/// on demand up to the parallelism bound, retire after `idle_timeout`
/// without work, and drain out on shutdown.
///
/// Engine invocations run with the queue lock released, concurrently from up
/// to `parallelism` workers; the engine gets no mutual exclusion between
/// invocations and must not call [`shutdown`](Self::shutdown) on its own
/// queue (the rundown wait would deadlock).
pub struct WorkQueueInner<T> {
    state: Mutex<State<T>>,
    notify: Notify,
    engine: Engine<T>,
    config: Config,
    runtime: Handle,
    spawned_workers: AtomicUsize,
    executed_items: AtomicUsize,
    panicked_items: AtomicUsize,
}

impl<T: Send + 'static> WorkQueueInner<T> {
    pub fn new<F, Fut>(parallelism: usize, engine: F) -> QueueResult<WorkQueue<T>>
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let config = Config {
            parallelism,
            ..Default::default()
        };
        Self::with_config(config, engine)
    }

    pub fn with_config<F, Fut>(config: Config, engine: F) -> QueueResult<WorkQueue<T>>
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if config.parallelism == 0 {
            return Err(QueueError::ZeroParallelism);
        }
        // Workers are spawned from `add`, possibly long after creation; the
        // runtime context is captured here so that spawn step cannot fail.
        let runtime = Handle::try_current().map_err(|_| QueueError::Sync)?;

        debug!(parallelism = config.parallelism, "work queue created");
        Ok(Arc::new(WorkQueueInner {
            state: Mutex::new(State {
                queue: VecDeque::new(),
                active: 0,
                idle: 0,
                shutdown: false,
                valid: true,
            }),
            notify: Notify::new(),
            engine: Box::new(move |payload| engine(payload).boxed()),
            config,
            runtime,
            spawned_workers: AtomicUsize::new(0),
            executed_items: AtomicUsize::new(0),
            panicked_items: AtomicUsize::new(0),
        }))
    }

    /// Queue one payload for execution.
    ///
    /// Returns once the item is linked and any wake/spawn action is taken;
    /// never waits on engine execution. Fails with
    /// [`QueueError::Invalid`] once shutdown has begun.
    pub fn add(self: &Arc<Self>, payload: T) -> QueueResult<()> {
        let mut state = self.lock_state()?;
        if !state.valid {
            return Err(QueueError::Invalid);
        }
        state.queue.try_reserve(1).map_err(|_| QueueError::Allocation)?;
        state.queue.push_back(payload);
        trace!(queued = state.queue.len(), "item queued");

        if state.idle > 0 {
            // Wake exactly one sleeper; the woken worker decrements the idle
            // count itself.
            self.notify.notify_one();
        } else if state.active < self.config.parallelism {
            state.active += 1;
            self.spawn_worker();
        }
        // Otherwise every worker is busy and the bound is reached; one of
        // them will observe the new tail entry on its next dequeue pass.
        Ok(())
    }

    fn spawn_worker(self: &Arc<Self>) {
        self.spawned_workers.fetch_add(1, Ordering::Relaxed);
        debug!("spawning worker");
        let queue = Arc::clone(self);
        self.runtime.spawn(async move {
            queue.worker_loop().await;
        });
    }

    async fn worker_loop(self: Arc<Self>) {
        trace!("worker starting");
        loop {
            // Wait until there is work, shutdown is requested, or the
            // retirement deadline passes. The deadline is fixed on entering
            // the wait: spurious wakes must not extend a worker's idle grace.
            let mut timed_out = false;
            let deadline = Instant::now() + self.config.idle_timeout;

            // Wait for an actionable state. Each decision is taken under the
            // lock in an inner block so the guard's scope never spans an
            // `.await` (required for the spawned future to be `Send`); the
            // payload to run is carried out of the loop so the engine is
            // invoked with the lock released.
            let payload = loop {
                let notified = self.notify.notified();
                tokio::pin!(notified);
                {
                    let mut state = self.recover_state();
                    if let Some(payload) = state.queue.pop_front() {
                        // Work available: take it. The check and the dequeue
                        // share one critical section, so no other worker can
                        // steal the item between observing and popping it.
                        break payload;
                    }

                    if state.shutdown {
                        // Queue drained during rundown: exit, and release the
                        // shutdown waiter once the last worker leaves.
                        state.active -= 1;
                        let quiescent = state.active == 0;
                        drop(state);
                        debug!(quiescent, "worker draining");
                        if quiescent {
                            self.notify.notify_waiters();
                        }
                        return;
                    }

                    if timed_out {
                        // No work arrived within the grace interval: retire.
                        // The decision and the count decrement share one
                        // critical section, so a concurrent `add` sees either
                        // a live worker or a slot it may refill.
                        state.active -= 1;
                        drop(state);
                        debug!("worker retiring after idle timeout");
                        return;
                    }

                    state.idle += 1;
                    // Arm the waiter before releasing the lock, so a wake
                    // issued after our idle count became visible cannot be
                    // lost.
                    notified.as_mut().enable();
                }

                timed_out = tokio::time::timeout_at(deadline, notified).await.is_err();
                self.recover_state().idle -= 1;
            };

            trace!("worker calling engine");
            match AssertUnwindSafe((self.engine)(payload)).catch_unwind().await {
                Ok(()) => {
                    self.executed_items.fetch_add(1, Ordering::Relaxed);
                }
                Err(_) => {
                    self.panicked_items.fetch_add(1, Ordering::Relaxed);
                    warn!("engine invocation panicked");
                }
            }
        }
    }

    /// Request shutdown and wait until the pool is quiescent.
    ///
    /// Further `add` calls fail immediately, sleeping workers are woken, and
    /// the call returns once the active-worker count reaches zero. Items
    /// already queued are still executed first, so the wait is unbounded
    /// while engine invocations are in flight. A second call fails with
    /// [`QueueError::Invalid`].
    pub async fn shutdown(&self) -> QueueResult<()> {
        let mut state = self.lock_state()?;
        if !state.valid {
            return Err(QueueError::Invalid);
        }
        state.valid = false;
        debug!(
            active = state.active,
            queued = state.queue.len(),
            "shutdown requested"
        );

        if state.active > 0 {
            state.shutdown = true;
            if state.idle > 0 {
                self.notify.notify_waiters();
            }
            while state.active > 0 {
                let notified = self.notify.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                drop(state);

                notified.await;
                state = self.lock_state()?;
            }
        }
        debug!("work queue quiescent");
        Ok(())
    }

    #[inline]
    pub fn metrics(&self) -> QueueMetrics {
        let state = self.recover_state();
        QueueMetrics {
            active_workers: state.active,
            idle_workers: state.idle,
            queued_items: state.queue.len(),
            spawned_workers: self.spawned_workers.load(Ordering::Relaxed),
            executed_items: self.executed_items.load(Ordering::Relaxed),
            panicked_items: self.panicked_items.load(Ordering::Relaxed),
        }
    }

    /// Periodically hand metrics snapshots to `callback`.
    /// Call `token.cancel()` to stop the monitor and drop its queue handle.
    pub fn start_monitoring<F>(self: &Arc<Self>, period: Duration, callback: F) -> CancellationToken
    where
        F: Fn(QueueMetrics) + Send + 'static,
    {
        let queue = Arc::clone(self);
        let token = CancellationToken::new();
        let monitor = token.clone();

        self.runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => callback(queue.metrics()),
                    _ = monitor.cancelled() => break,
                }
            }
        });

        token
    }

    /// Stop a monitor started with [`start_monitoring`](Self::start_monitoring).
    pub fn stop_monitoring(token: CancellationToken) {
        token.cancel();
    }

    fn lock_state(&self) -> QueueResult<MutexGuard<'_, State<T>>> {
        self.state.lock().map_err(|_| QueueError::Sync)
    }

    /// Worker-side lock. A poisoned lock is recovered rather than
    /// propagated: a worker has no caller, and abandoning the guard would
    /// leak the active count and hang shutdown.
    fn recover_state(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
