//! Scoped worker threads used to drive deferred host operations.
use std::thread::{Scope, ScopedJoinHandle};

#[cfg(feature = "tracing")]
use tracing1::debug;

use crate::{CtsError, Result};

/// Upper bound of worker threads that join a single deferred operation.
pub const MAX_WORKER_THREADS: usize = 256;

/// Maps the requested worker thread count to the number of threads that are spawned.
///
/// `u32::MAX` requests the implementation maximum, which is the reported maximal concurrency
/// capped at [`MAX_WORKER_THREADS`].
///
/// Any other request is also capped at [`MAX_WORKER_THREADS`], even if the implementation
/// reports a higher maximal concurrency. A request of 1000 spawns 256 threads, not 1000.
pub fn worker_count(requested: u32, max_concurrency: u32) -> usize {
    let supported = usize::try_from(max_concurrency)
        .unwrap_or(MAX_WORKER_THREADS)
        .min(MAX_WORKER_THREADS);

    if requested == u32::MAX {
        supported
    } else {
        usize::try_from(requested)
            .unwrap_or(MAX_WORKER_THREADS)
            .min(MAX_WORKER_THREADS)
    }
}

/// Spawns work onto named threads that may borrow from the enclosing stack frame.
///
/// All threads are joined before [`WorkerPool::scoped`] returns.
pub struct WorkerPool<'scope, 'env> {
    scope: &'scope Scope<'scope, 'env>,
    spawned: usize,
}

impl<'scope, 'env> std::fmt::Debug for WorkerPool<'scope, 'env> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("spawned", &self.spawned)
            .finish()
    }
}

impl<'env> WorkerPool<'_, 'env> {
    /// Runs `f` with a pool. Returns once `f` returned and every submitted work finished.
    pub fn scoped<F, T>(f: F) -> T
    where
        F: for<'scope> FnOnce(&mut WorkerPool<'scope, 'env>) -> T,
    {
        std::thread::scope(|scope| {
            let mut pool = WorkerPool { scope, spawned: 0 };
            f(&mut pool)
        })
    }
}

impl<'scope, 'env> WorkerPool<'scope, 'env> {
    /// Submits work to a new thread.
    pub fn submit<W, T>(&mut self, work: W) -> Result<JoinHandle<'scope, T>>
    where
        W: FnOnce() -> T + Send + 'scope,
        T: Send + 'scope,
    {
        let inner = std::thread::Builder::new()
            .name(format!("deferred-worker-{}", self.spawned))
            .spawn_scoped(self.scope, work)?;
        self.spawned += 1;

        #[cfg(feature = "tracing")]
        debug!("Spawned worker thread {}", self.spawned);

        Ok(JoinHandle { inner })
    }

    /// Number of threads spawned so far.
    #[inline]
    pub fn spawned(&self) -> usize {
        self.spawned
    }
}

/// Handle to the result of a submitted work.
#[derive(Debug)]
pub struct JoinHandle<'scope, T> {
    inner: ScopedJoinHandle<'scope, T>,
}

impl<'scope, T> JoinHandle<'scope, T> {
    /// Blocks until the work finished and returns its result.
    pub fn join(self) -> Result<T> {
        self.inner.join().map_err(|_| CtsError::WorkerPanicked)
    }
}

/// Joins all handles in submission order. Every handle is joined even if an earlier one failed.
pub fn join_all<'scope, T>(handles: Vec<JoinHandle<'scope, T>>) -> Result<Vec<T>> {
    let mut results = Vec::with_capacity(handles.len());
    let mut panicked = false;
    for handle in handles {
        match handle.join() {
            Ok(value) => results.push(value),
            Err(_) => panicked = true,
        }
    }

    if panicked {
        return Err(CtsError::WorkerPanicked);
    }

    Ok(results)
}
