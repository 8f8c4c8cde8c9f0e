//! Worker pools executing job batches.
//!
//! Two interchangeable implementations share the [`WorkerPool`] contract:
//! a fixed-size [`ThreadPool`] and a synchronous [`InlinePool`] used when
//! parallelism is disabled. Both hand back a [`PendingHandle`] whose
//! `resolve()` yields the batch's completed-job count or its failure.

use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::WorkerFailure;

/// Batch entry point run inside a worker against the shared context.
pub type BatchFn<C, B> = fn(&C, B) -> Result<usize, WorkerFailure>;

/// Outcome of one batch.
pub type BatchResult = Result<usize, WorkerFailure>;

/// Resolve a requested concurrency, where 0 means one worker per CPU.
pub fn resolve_concurrency(requested: usize) -> usize {
    if requested == 0 {
        num_cpus::get().max(1)
    } else {
        requested
    }
}

/// Configuration for the thread pool.
#[derive(Debug, Clone)]
pub struct ThreadPoolConfig {
    /// Number of worker threads (0 = auto-detect).
    pub num_threads: usize,
    /// Thread stack size in bytes (0 = default).
    pub stack_size: usize,
    /// Thread name prefix.
    pub thread_name_prefix: String,
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        Self {
            num_threads: 0,
            stack_size: 0,
            thread_name_prefix: "tile-worker".to_string(),
        }
    }
}

impl ThreadPoolConfig {
    /// Create config with specific thread count.
    pub fn with_threads(count: usize) -> Self {
        Self { num_threads: count, ..Default::default() }
    }
}

/// Token for a submitted batch's eventual result.
#[derive(Debug)]
pub struct PendingHandle {
    state: HandleState,
}

#[derive(Debug)]
enum HandleState {
    Ready(BatchResult),
    Waiting(mpsc::Receiver<BatchResult>),
}

impl PendingHandle {
    /// Handle that already holds its result.
    pub fn ready(result: BatchResult) -> Self {
        Self { state: HandleState::Ready(result) }
    }

    fn waiting(rx: mpsc::Receiver<BatchResult>) -> Self {
        Self { state: HandleState::Waiting(rx) }
    }

    /// Block until the batch finishes and return its completed-job count.
    ///
    /// A worker that went away without reporting resolves to
    /// [`WorkerFailure::Disconnected`].
    pub fn resolve(self) -> BatchResult {
        match self.state {
            HandleState::Ready(result) => result,
            HandleState::Waiting(rx) => rx.recv().unwrap_or(Err(WorkerFailure::Disconnected)),
        }
    }
}

/// Common contract of the concurrent and synchronous pools.
pub trait WorkerPool<C> {
    /// Schedule `batch_fn(context, batch)` and return without waiting for it.
    fn submit<B: Send + 'static>(&self, batch_fn: BatchFn<C, B>, batch: B) -> PendingHandle;

    /// Stop accepting work and wait for outstanding batches to finish.
    fn shutdown(self);

    /// Number of execution units.
    fn workers(&self) -> usize;
}

/// Run one batch, turning cancellation and panics into failures.
fn execute<C, B>(context: &C, cancel: &CancellationToken, batch_fn: BatchFn<C, B>, batch: B) -> BatchResult {
    if cancel.is_cancelled() {
        return Err(WorkerFailure::Cancelled);
    }
    match panic::catch_unwind(AssertUnwindSafe(|| batch_fn(context, batch))) {
        Ok(result) => result,
        Err(payload) => Err(WorkerFailure::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

type Task<C> = Box<dyn FnOnce(&C) + Send + 'static>;

struct Shared<C> {
    queue: Mutex<VecDeque<Task<C>>>,
    available: Condvar,
    closed: AtomicBool,
}

impl<C> Shared<C> {
    /// Next task, or `None` once closed and empty.
    fn next_task(&self) -> Option<Task<C>> {
        let mut queue = self.queue.lock();
        loop {
            if let Some(task) = queue.pop_front() {
                return Some(task);
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            self.available.wait(&mut queue);
        }
    }

    fn close(&self) {
        {
            let _guard = self.queue.lock();
            self.closed.store(true, Ordering::Release);
        }
        self.available.notify_all();
    }
}

/// Fixed-size pool of worker threads sharing one read-only context.
///
/// The context is handed over once at construction and borrowed by every
/// batch, so submissions carry only the batch itself.
pub struct ThreadPool<C: Send + Sync + 'static> {
    shared: Arc<Shared<C>>,
    workers: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl<C: Send + Sync + 'static> ThreadPool<C> {
    /// Spawn the workers. Cancelling `cancel` fails every batch not yet started.
    pub fn new(config: ThreadPoolConfig, context: Arc<C>, cancel: CancellationToken) -> std::io::Result<Self> {
        let num_threads = resolve_concurrency(config.num_threads);
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
            closed: AtomicBool::new(false),
        });

        let mut pool = Self {
            shared,
            workers: Vec::with_capacity(num_threads),
            cancel: cancel.child_token(),
        };

        for id in 0..num_threads {
            let mut builder = thread::Builder::new().name(format!("{}-{}", config.thread_name_prefix, id));
            if config.stack_size > 0 {
                builder = builder.stack_size(config.stack_size);
            }
            let shared = Arc::clone(&pool.shared);
            let context = Arc::clone(&context);
            // On error `pool` drops here, which closes and joins the workers already spawned.
            let handle = builder.spawn(move || Self::worker_loop(id, &shared, &context))?;
            pool.workers.push(handle);
        }

        tracing::info!(workers = num_threads, "worker pool started");
        Ok(pool)
    }

    fn worker_loop(id: usize, shared: &Shared<C>, context: &C) {
        tracing::debug!(worker = id, "worker ready");
        while let Some(task) = shared.next_task() {
            task(context);
        }
        tracing::debug!(worker = id, "worker exiting");
    }

    fn join_workers(&mut self) {
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                tracing::warn!("worker thread terminated abnormally");
            }
        }
    }
}

impl<C: Send + Sync + 'static> WorkerPool<C> for ThreadPool<C> {
    fn submit<B: Send + 'static>(&self, batch_fn: BatchFn<C, B>, batch: B) -> PendingHandle {
        let (tx, rx) = mpsc::channel();
        let cancel = self.cancel.clone();
        let task: Task<C> = Box::new(move |context: &C| {
            // The receiver may already be gone if the run aborted.
            let _ = tx.send(execute(context, &cancel, batch_fn, batch));
        });

        self.shared.queue.lock().push_back(task);
        self.shared.available.notify_one();
        PendingHandle::waiting(rx)
    }

    fn shutdown(mut self) {
        self.shared.close();
        self.join_workers();
    }

    fn workers(&self) -> usize {
        self.workers.len()
    }
}

impl<C: Send + Sync + 'static> Drop for ThreadPool<C> {
    fn drop(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        // Dropped without shutdown: the run failed, so skip queued batches.
        self.cancel.cancel();
        self.shared.close();
        self.join_workers();
    }
}

/// Synchronous stand-in for [`ThreadPool`] when concurrency is 1.
///
/// `submit` runs the batch on the caller's thread and returns an already
/// resolved handle.
pub struct InlinePool<C> {
    context: Arc<C>,
    cancel: CancellationToken,
}

impl<C> InlinePool<C> {
    pub fn new(context: Arc<C>, cancel: CancellationToken) -> Self {
        Self { context, cancel }
    }
}

impl<C> WorkerPool<C> for InlinePool<C> {
    fn submit<B: Send + 'static>(&self, batch_fn: BatchFn<C, B>, batch: B) -> PendingHandle {
        PendingHandle::ready(execute(self.context.as_ref(), &self.cancel, batch_fn, batch))
    }

    fn shutdown(self) {}

    fn workers(&self) -> usize {
        1
    }
}

/// Pool chosen at run time from the requested concurrency.
pub enum Pool<C: Send + Sync + 'static> {
    Threaded(ThreadPool<C>),
    Inline(InlinePool<C>),
}

impl<C: Send + Sync + 'static> Pool<C> {
    /// Inline pool for a concurrency of 1, threaded otherwise (0 = per CPU).
    pub fn for_concurrency(
        concurrency: usize,
        context: Arc<C>,
        cancel: CancellationToken,
    ) -> std::io::Result<Self> {
        let workers = resolve_concurrency(concurrency);
        if workers == 1 {
            tracing::debug!("running batches inline");
            return Ok(Self::Inline(InlinePool::new(context, cancel)));
        }
        let config = ThreadPoolConfig::with_threads(workers);
        Ok(Self::Threaded(ThreadPool::new(config, context, cancel)?))
    }
}

impl<C: Send + Sync + 'static> WorkerPool<C> for Pool<C> {
    fn submit<B: Send + 'static>(&self, batch_fn: BatchFn<C, B>, batch: B) -> PendingHandle {
        match self {
            Self::Threaded(pool) => pool.submit(batch_fn, batch),
            Self::Inline(pool) => pool.submit(batch_fn, batch),
        }
    }

    fn shutdown(self) {
        match self {
            Self::Threaded(pool) => pool.shutdown(),
            Self::Inline(pool) => pool.shutdown(),
        }
    }

    fn workers(&self) -> usize {
        match self {
            Self::Threaded(pool) => pool.workers(),
            Self::Inline(pool) => pool.workers(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn count_items(counter: &AtomicUsize, batch: Vec<u32>) -> BatchResult {
        counter.fetch_add(batch.len(), Ordering::SeqCst);
        Ok(batch.len())
    }

    fn always_fails(_: &AtomicUsize, _: Vec<u32>) -> BatchResult {
        Err(WorkerFailure::UnknownPyramid(7))
    }

    fn panics(_: &AtomicUsize, _: Vec<u32>) -> BatchResult {
        panic!("tile exploded");
    }

    #[test]
    fn test_thread_pool_basic() {
        let counter = Arc::new(AtomicUsize::new(0));
        let pool = ThreadPool::new(ThreadPoolConfig::with_threads(3), counter.clone(), CancellationToken::new())
            .unwrap();
        assert_eq!(pool.workers(), 3);

        let handles: Vec<PendingHandle> = (0..20).map(|_| pool.submit(count_items, vec![1, 2, 3])).collect();
        let total: usize = handles.into_iter().map(|h| h.resolve().unwrap()).sum();
        assert_eq!(total, 60);
        pool.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 60);
    }

    #[test]
    fn test_shutdown_waits_for_outstanding_work() {
        let counter = Arc::new(AtomicUsize::new(0));
        let pool = ThreadPool::new(ThreadPoolConfig::with_threads(2), counter.clone(), CancellationToken::new())
            .unwrap();
        for _ in 0..50 {
            let _ = pool.submit(count_items, vec![0; 4]);
        }
        pool.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 200);
    }

    #[test]
    fn test_failure_surfaces_on_resolve() {
        let pool = ThreadPool::new(
            ThreadPoolConfig::with_threads(2),
            Arc::new(AtomicUsize::new(0)),
            CancellationToken::new(),
        )
        .unwrap();
        let result = pool.submit(always_fails, vec![1]).resolve();
        assert!(matches!(result, Err(WorkerFailure::UnknownPyramid(7))));
        pool.shutdown();
    }

    #[test]
    fn test_panic_converted_to_failure() {
        let pool = ThreadPool::new(
            ThreadPoolConfig::with_threads(1),
            Arc::new(AtomicUsize::new(0)),
            CancellationToken::new(),
        )
        .unwrap();
        match pool.submit(panics, vec![1]).resolve() {
            Err(WorkerFailure::Panicked(msg)) => assert!(msg.contains("tile exploded")),
            other => panic!("expected panic failure, got {other:?}"),
        }
        // Worker survives the panic.
        assert_eq!(pool.submit(count_items, vec![1, 2]).resolve().unwrap(), 2);
        pool.shutdown();
    }

    #[test]
    fn test_cancelled_batches_fail() {
        let cancel = CancellationToken::new();
        let pool = ThreadPool::new(ThreadPoolConfig::with_threads(2), Arc::new(AtomicUsize::new(0)), cancel.clone())
            .unwrap();
        cancel.cancel();
        let result = pool.submit(count_items, vec![1]).resolve();
        assert!(matches!(result, Err(WorkerFailure::Cancelled)));
    }

    #[test]
    fn test_inline_pool_matches_contract() {
        let counter = Arc::new(AtomicUsize::new(0));
        let pool = InlinePool::new(counter.clone(), CancellationToken::new());
        let handle = pool.submit(count_items, vec![5, 6]);
        // Already ran synchronously.
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(handle.resolve().unwrap(), 2);

        assert!(matches!(pool.submit(always_fails, vec![]).resolve(), Err(WorkerFailure::UnknownPyramid(7))));
        assert!(matches!(pool.submit(panics, vec![]).resolve(), Err(WorkerFailure::Panicked(_))));
        pool.shutdown();
    }

    #[test]
    fn test_inline_pool_skips_after_cancel() {
        let counter = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();
        let pool = InlinePool::new(counter.clone(), cancel.clone());
        assert_eq!(pool.submit(count_items, vec![1]).resolve().unwrap(), 1);

        cancel.cancel();
        assert!(matches!(pool.submit(count_items, vec![1, 2]).resolve(), Err(WorkerFailure::Cancelled)));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_pool_selection_by_concurrency() {
        let ctx = Arc::new(AtomicUsize::new(0));
        let inline = Pool::for_concurrency(1, ctx.clone(), CancellationToken::new()).unwrap();
        assert!(matches!(inline, Pool::Inline(_)));
        assert_eq!(inline.workers(), 1);

        let threaded = Pool::for_concurrency(4, ctx, CancellationToken::new()).unwrap();
        assert!(matches!(threaded, Pool::Threaded(_)));
        assert_eq!(threaded.workers(), 4);
        threaded.shutdown();
    }

    #[test]
    fn test_resolve_concurrency_auto() {
        assert!(resolve_concurrency(0) >= 1);
        assert_eq!(resolve_concurrency(6), 6);
    }
}
