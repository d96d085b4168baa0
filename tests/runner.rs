use std::cell::RefCell;
use std::time::Duration;

use vkcts_rt::{
    BuildType, CaseDef, CaseExecutor, CtsError, RunnerConfiguration, RunnerState, TestStatus,
    ThreadingVariantRunner,
};

/// Returns preset failure counts and records every case it's asked to run.
struct MockExecutor {
    single_thread_failures: u64,
    multi_thread_failures: u64,
    multi_thread_delay: Duration,
    error: Option<fn() -> CtsError>,
    calls: RefCell<Vec<CaseDef>>,
}

impl Default for MockExecutor {
    fn default() -> Self {
        Self {
            single_thread_failures: 0,
            multi_thread_failures: 0,
            multi_thread_delay: Duration::ZERO,
            error: None,
            calls: RefCell::new(Vec::new()),
        }
    }
}

impl CaseExecutor for MockExecutor {
    fn execute(&self, case: &CaseDef) -> Result<u64, CtsError> {
        self.calls.borrow_mut().push(*case);
        if let Some(error) = self.error {
            return Err(error());
        }

        if case.worker_threads_count == 0 {
            Ok(self.single_thread_failures)
        } else {
            std::thread::sleep(self.multi_thread_delay);
            Ok(self.multi_thread_failures)
        }
    }
}

fn host_case(worker_threads: u32) -> CaseDef {
    CaseDef::new(8, 8, 64, 1, 1, worker_threads != 0, BuildType::Host, worker_threads)
}

#[test]
fn without_workers_only_the_single_threaded_run_executes() {
    let executor = MockExecutor::default();
    let mut runner =
        ThreadingVariantRunner::new(&executor, host_case(0), RunnerConfiguration::default());

    assert_eq!(runner.state(), RunnerState::Init);
    assert_eq!(runner.step(), RunnerState::RunSingleThread);
    assert_eq!(runner.step(), RunnerState::Aggregate);
    assert_eq!(runner.step(), RunnerState::Done);
    assert_eq!(runner.step(), RunnerState::Done);
    assert_eq!(runner.status(), Some(&TestStatus::Pass));

    let calls = executor.calls.borrow();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].worker_threads_count, 0);
}

#[test]
fn with_workers_both_runs_execute() {
    let executor = MockExecutor::default();
    let mut runner =
        ThreadingVariantRunner::new(&executor, host_case(8), RunnerConfiguration::default());

    assert_eq!(runner.step(), RunnerState::RunSingleThread);
    assert_eq!(runner.step(), RunnerState::RunMultiThread);
    assert_eq!(runner.step(), RunnerState::Aggregate);
    assert_eq!(runner.step(), RunnerState::Done);
    assert_eq!(runner.status(), Some(&TestStatus::Pass));

    let calls = executor.calls.borrow();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].worker_threads_count, 0);
    assert!(calls[0].deferred_operation);
    assert_eq!(calls[1].worker_threads_count, 8);
}

#[test]
fn failures_of_both_runs_are_summed() {
    let executor = MockExecutor {
        single_thread_failures: 3,
        multi_thread_failures: 2,
        ..Default::default()
    };
    let status =
        ThreadingVariantRunner::new(&executor, host_case(4), RunnerConfiguration::default()).run();

    assert_eq!(status, TestStatus::Fail("5 failures".to_owned()));
}

#[test]
fn multi_thread_failures_fail_the_case() {
    let executor = MockExecutor {
        multi_thread_failures: 1,
        ..Default::default()
    };
    let status =
        ThreadingVariantRunner::new(&executor, host_case(u32::MAX), RunnerConfiguration::default())
            .run();

    assert!(!status.is_pass());
}

#[test]
fn missing_capabilities_are_not_failures() {
    let executor = MockExecutor {
        error: Some(|| CtsError::NotSupported("maxInstanceCount is below 64".to_owned())),
        ..Default::default()
    };
    let mut runner =
        ThreadingVariantRunner::new(&executor, host_case(8), RunnerConfiguration::default());

    runner.step();
    assert_eq!(runner.step(), RunnerState::Done);
    assert_eq!(
        runner.status(),
        Some(&TestStatus::NotSupported(
            "maxInstanceCount is below 64".to_owned()
        ))
    );
    assert_eq!(executor.calls.borrow().len(), 1);
}

#[test]
fn api_errors_are_fatal() {
    let executor = MockExecutor {
        error: Some(|| CtsError::DeferredOperationFailed),
        ..Default::default()
    };
    let status =
        ThreadingVariantRunner::new(&executor, host_case(0), RunnerConfiguration::default()).run();

    assert!(matches!(status, TestStatus::Fatal(_)));
}

#[test]
fn slow_multi_thread_run_fails() {
    let executor = MockExecutor {
        multi_thread_delay: Duration::from_millis(200),
        ..Default::default()
    };
    let configuration = RunnerConfiguration {
        multi_thread_timeout_factor: Some(10.0),
        min_timeout: Duration::ZERO,
    };
    let status = ThreadingVariantRunner::new(&executor, host_case(2), configuration).run();

    assert!(matches!(status, TestStatus::Fail(message) if message.contains("multi-threaded")));
}

#[test]
fn timing_guard_can_be_disabled() {
    let executor = MockExecutor {
        multi_thread_delay: Duration::from_millis(50),
        ..Default::default()
    };
    let configuration = RunnerConfiguration {
        multi_thread_timeout_factor: None,
        min_timeout: Duration::ZERO,
    };
    let status = ThreadingVariantRunner::new(&executor, host_case(2), configuration).run();

    assert_eq!(status, TestStatus::Pass);
}
