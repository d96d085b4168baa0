use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;

use vkcts_rt::{
    finish_deferred_operation, join_all, worker_count, CtsError, DeferredJoin, JoinStatus,
    WorkerPool, MAX_WORKER_THREADS,
};

#[test]
fn max_request_maps_to_the_implementation_maximum() {
    assert_eq!(worker_count(u32::MAX, 8), 8);
    assert_eq!(worker_count(u32::MAX, 1), 1);
    assert_eq!(worker_count(u32::MAX, u32::MAX - 1), MAX_WORKER_THREADS);
}

#[test]
fn explicit_requests_are_capped() {
    assert_eq!(worker_count(0, 8), 0);
    assert_eq!(worker_count(4, 2), 4);
    assert_eq!(worker_count(8, 64), 8);
    assert_eq!(worker_count(100_000, 64), MAX_WORKER_THREADS);
    assert_eq!(worker_count(1000, 4096), MAX_WORKER_THREADS);
}

#[test]
fn pool_joins_borrowing_work() {
    let values: Vec<u64> = (1..=100).collect();

    let sums = WorkerPool::scoped(|pool| {
        let handles = values
            .chunks(10)
            .map(|chunk| pool.submit(move || chunk.iter().sum::<u64>()))
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(pool.spawned(), 10);
        join_all(handles)
    })
    .unwrap();

    assert_eq!(sums.len(), 10);
    assert_eq!(sums.iter().sum::<u64>(), 5050);
}

#[test]
fn panicking_work_is_reported() {
    let result = WorkerPool::scoped(|pool| {
        let good = pool.submit(|| 1).unwrap();
        let bad = pool.submit(|| -> i32 { panic!("worker failure") }).unwrap();
        join_all(vec![good, bad])
    });

    assert!(matches!(result, Err(CtsError::WorkerPanicked)));
}

/// A deferred operation split into units of work. Every join processes one unit. The join
/// that processes the last unit observes the completion.
struct MockOperation {
    remaining: AtomicU32,
    max_concurrency: u32,
    idle_joins: AtomicU32,
    joins: AtomicUsize,
    result_calls: AtomicUsize,
    threads: Mutex<HashSet<String>>,
}

impl MockOperation {
    fn new(units: u32, max_concurrency: u32) -> Self {
        Self {
            remaining: AtomicU32::new(units),
            max_concurrency,
            idle_joins: AtomicU32::new(0),
            joins: AtomicUsize::new(0),
            result_calls: AtomicUsize::new(0),
            threads: Mutex::new(HashSet::new()),
        }
    }

    fn with_idle_joins(self, idle_joins: u32) -> Self {
        self.idle_joins.store(idle_joins, Ordering::SeqCst);
        self
    }
}

impl DeferredJoin for MockOperation {
    fn join(&self) -> Result<JoinStatus, CtsError> {
        self.joins.fetch_add(1, Ordering::SeqCst);
        if let Some(name) = std::thread::current().name() {
            self.threads.lock().unwrap().insert(name.to_owned());
        }

        if self
            .idle_joins
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Ok(JoinStatus::ThreadIdle);
        }

        match self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        {
            Ok(1) => Ok(JoinStatus::Success),
            Ok(_) => Ok(JoinStatus::ThreadIdle),
            Err(_) => Ok(JoinStatus::ThreadDone),
        }
    }

    fn max_concurrency(&self) -> u32 {
        self.max_concurrency
    }

    fn result(&self) -> Result<(), CtsError> {
        self.result_calls.fetch_add(1, Ordering::SeqCst);
        if self.remaining.load(Ordering::SeqCst) == 0 {
            Ok(())
        } else {
            Err(CtsError::DeferredOperationFailed)
        }
    }
}

#[test]
fn not_deferred_only_queries_the_result() {
    let operation = MockOperation::new(0, 4);
    finish_deferred_operation(&operation, 8, true).unwrap();

    assert_eq!(operation.joins.load(Ordering::SeqCst), 0);
    assert_eq!(operation.result_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn zero_workers_join_on_the_calling_thread() {
    let operation = MockOperation::new(50, 4).with_idle_joins(3);
    finish_deferred_operation(&operation, 0, false).unwrap();

    assert_eq!(operation.remaining.load(Ordering::SeqCst), 0);
    assert_eq!(operation.result_calls.load(Ordering::SeqCst), 1);
    let threads = operation.threads.lock().unwrap();
    assert!(threads.iter().all(|name| !name.starts_with("deferred-worker")));
}

#[test]
fn workers_complete_the_operation() {
    let operation = MockOperation::new(1000, 16);
    finish_deferred_operation(&operation, 8, false).unwrap();

    assert_eq!(operation.remaining.load(Ordering::SeqCst), 0);
    assert_eq!(operation.threads.lock().unwrap().len(), 8);
}

#[test]
fn max_workers_follow_the_reported_concurrency() {
    let operation = MockOperation::new(100, 3);
    finish_deferred_operation(&operation, u32::MAX, false).unwrap();

    assert_eq!(operation.remaining.load(Ordering::SeqCst), 0);
    assert_eq!(operation.threads.lock().unwrap().len(), 3);
}

#[test]
fn zero_concurrency_is_an_error() {
    let operation = MockOperation::new(10, 0);
    let result = finish_deferred_operation(&operation, 4, false);

    assert!(matches!(
        result,
        Err(CtsError::DeferredOperationNoConcurrency)
    ));
    assert_eq!(operation.joins.load(Ordering::SeqCst), 0);
}

#[test]
fn missing_success_is_an_error() {
    // Nothing left to do: every worker is told it's done, none observes the completion.
    let operation = MockOperation::new(0, 4);
    let result = finish_deferred_operation(&operation, 4, false);

    assert!(matches!(result, Err(CtsError::DeferredOperationFailed)));
}
