//! Runs a case without and with worker threads and aggregates the outcome.
use std::time::{Duration, Instant};

#[cfg(feature = "tracing")]
use tracing1::{error, info, warn};

use crate::{CaseDef, CtsError, Result};

/// Executes one run of a case.
pub trait CaseExecutor {
    /// Runs the case and returns the number of mismatching pixels.
    fn execute(&self, case: &CaseDef) -> Result<u64>;
}

/// Configures the threading variant runner.
#[derive(Clone, Debug, PartialEq)]
pub struct RunnerConfiguration {
    /// The multi-threaded run fails the case if it takes longer than this factor times the
    /// single-threaded run. `None` disables the check.
    pub multi_thread_timeout_factor: Option<f64>,
    /// The multi-threaded run is never considered too slow below this duration.
    pub min_timeout: Duration,
}

impl Default for RunnerConfiguration {
    fn default() -> Self {
        Self {
            multi_thread_timeout_factor: Some(10.0),
            min_timeout: Duration::from_secs(1),
        }
    }
}

/// The states of a [`ThreadingVariantRunner`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum RunnerState {
    /// Nothing ran yet.
    Init,
    /// The next step runs the case with worker threads disabled.
    RunSingleThread,
    /// The next step runs the case with its worker threads.
    RunMultiThread,
    /// The next step combines the results of the runs.
    Aggregate,
    /// The outcome is known.
    Done,
}

/// The outcome of a case.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TestStatus {
    /// Every run matched the reference.
    Pass,
    /// A run produced mismatching pixels or the multi-threaded run was too slow.
    Fail(String),
    /// The device can't run the case.
    NotSupported(String),
    /// An API call or the shader compiler failed.
    Fatal(String),
}

impl TestStatus {
    /// Returns true for [`TestStatus::Pass`].
    pub fn is_pass(&self) -> bool {
        matches!(self, TestStatus::Pass)
    }

    /// Separates missing capabilities from failures.
    pub fn from_error(err: &CtsError) -> Self {
        match err {
            CtsError::NotSupported(reason) => TestStatus::NotSupported(reason.clone()),
            err => TestStatus::Fatal(err.to_string()),
        }
    }
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestStatus::Pass => f.write_str("Pass"),
            TestStatus::Fail(message) => write!(f, "Fail ({})", message),
            TestStatus::NotSupported(reason) => write!(f, "NotSupported ({})", reason),
            TestStatus::Fatal(message) => write!(f, "Fatal ({})", message),
        }
    }
}

/// Runs a case with threads disabled and, if the case asks for workers, again with its workers.
/// Both runs are validated against the same reference; the case passes only if all runs
/// executed have zero mismatches.
pub struct ThreadingVariantRunner<'a, E: CaseExecutor + ?Sized> {
    executor: &'a E,
    case: CaseDef,
    configuration: RunnerConfiguration,
    state: RunnerState,
    single_thread: Option<(u64, Duration)>,
    multi_thread: Option<(u64, Duration)>,
    status: Option<TestStatus>,
}

impl<'a, E: CaseExecutor + ?Sized> std::fmt::Debug for ThreadingVariantRunner<'a, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadingVariantRunner")
            .field("case", &self.case)
            .field("state", &self.state)
            .field("status", &self.status)
            .finish()
    }
}

impl<'a, E: CaseExecutor + ?Sized> ThreadingVariantRunner<'a, E> {
    /// Creates a runner in the [`RunnerState::Init`] state.
    pub fn new(executor: &'a E, case: CaseDef, configuration: RunnerConfiguration) -> Self {
        Self {
            executor,
            case,
            configuration,
            state: RunnerState::Init,
            single_thread: None,
            multi_thread: None,
            status: None,
        }
    }

    /// The current state.
    #[inline]
    pub fn state(&self) -> RunnerState {
        self.state
    }

    /// The outcome, once the runner is done.
    pub fn status(&self) -> Option<&TestStatus> {
        self.status.as_ref()
    }

    /// Sum of the mismatches of all runs executed so far.
    pub fn failures(&self) -> u64 {
        self.single_thread.map_or(0, |(failures, _)| failures)
            + self.multi_thread.map_or(0, |(failures, _)| failures)
    }

    /// Executes the work of the current state and moves to the next one. An error moves the
    /// runner to [`RunnerState::Done`] with the status derived from the error.
    pub fn step(&mut self) -> RunnerState {
        let next = match self.state {
            RunnerState::Init => Ok(RunnerState::RunSingleThread),
            RunnerState::RunSingleThread => {
                self.run_single_thread().map(|_| {
                    if self.case.worker_threads_count != 0 {
                        RunnerState::RunMultiThread
                    } else {
                        RunnerState::Aggregate
                    }
                })
            }
            RunnerState::RunMultiThread => self.run_multi_thread().map(|_| RunnerState::Aggregate),
            RunnerState::Aggregate => {
                self.status = Some(self.aggregate());
                Ok(RunnerState::Done)
            }
            RunnerState::Done => Ok(RunnerState::Done),
        };

        self.state = match next {
            Ok(state) => state,
            Err(err) => {
                #[cfg(feature = "tracing")]
                if err.is_not_supported() {
                    warn!("{}: {}", self.case.name(), err);
                } else {
                    error!("{}: {}", self.case.name(), err);
                }
                self.status = Some(TestStatus::from_error(&err));
                RunnerState::Done
            }
        };

        self.state
    }

    /// Steps until the runner is done and returns the outcome.
    pub fn run(mut self) -> TestStatus {
        while self.step() != RunnerState::Done {}

        let status = self
            .status
            .unwrap_or_else(|| TestStatus::Fatal("runner finished without a status".to_owned()));

        #[cfg(feature = "tracing")]
        info!("{}: {}", self.case.name(), status);

        status
    }

    fn run_single_thread(&mut self) -> Result<()> {
        let case = self.case.single_threaded();
        self.single_thread = Some(self.timed(&case)?);
        Ok(())
    }

    fn run_multi_thread(&mut self) -> Result<()> {
        let case = self.case;
        self.multi_thread = Some(self.timed(&case)?);
        Ok(())
    }

    fn timed(&self, case: &CaseDef) -> Result<(u64, Duration)> {
        let start = Instant::now();
        let failures = self.executor.execute(case)?;
        let duration = start.elapsed();

        #[cfg(feature = "tracing")]
        info!(
            "{} with {} worker threads: {} failures in {:?}",
            case.name(),
            case.worker_threads_count,
            failures,
            duration
        );

        Ok((failures, duration))
    }

    fn aggregate(&self) -> TestStatus {
        let failures = self.failures();
        if failures != 0 {
            return TestStatus::Fail(format!("{} failures", failures));
        }

        if let (Some((_, single)), Some((_, multi)), Some(factor)) = (
            self.single_thread,
            self.multi_thread,
            self.configuration.multi_thread_timeout_factor,
        ) {
            let limit = single.mul_f64(factor).max(self.configuration.min_timeout);
            if multi > limit {
                return TestStatus::Fail(format!(
                    "multi-threaded run took {:?}, more than {}x the single-threaded run of {:?}",
                    multi, factor, single
                ));
            }
        }

        TestStatus::Pass
    }
}
