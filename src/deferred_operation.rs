//! Deferred host operations and the driver that joins worker threads to them.
use std::sync::Arc;

use erupt::vk;
#[cfg(feature = "tracing")]
use tracing1::{debug, error};

use crate::context::Context;
use crate::workers::{join_all, worker_count, WorkerPool};
use crate::{CtsError, Result};

/// Outcome of a single join of a thread to a deferred operation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum JoinStatus {
    /// The operation completed.
    Success,
    /// There is no more work for this thread, but the operation is not complete yet.
    ThreadDone,
    /// There is currently no work for this thread. Joining again may pick up new work.
    ThreadIdle,
}

/// The operations the deferred driver needs from a deferred operation.
pub trait DeferredJoin: Sync {
    /// Assigns the calling thread to the operation.
    fn join(&self) -> Result<JoinStatus>;

    /// The number of threads that can usefully join the operation.
    fn max_concurrency(&self) -> u32;

    /// The final result of a completed operation.
    fn result(&self) -> Result<()>;
}

/// Wraps a deferred operation.
#[derive(Debug)]
pub struct DeferredOperation {
    raw: vk::DeferredOperationKHR,
    context: Arc<Context>,
}

impl Drop for DeferredOperation {
    fn drop(&mut self) {
        unsafe {
            self.context
                .device
                .destroy_deferred_operation_khr(Some(self.raw), None);
        };
    }
}

impl DeferredOperation {
    pub(crate) fn new(raw: vk::DeferredOperationKHR, context: Arc<Context>) -> Self {
        Self { raw, context }
    }

    /// The raw Vulkan deferred operation handle.
    #[inline]
    pub fn raw(&self) -> vk::DeferredOperationKHR {
        self.raw
    }

    /// Build acceleration structures on the host and hands the work to this operation.
    ///
    /// Returns `OPERATION_DEFERRED_KHR` if threads need to join, or `OPERATION_NOT_DEFERRED_KHR`
    /// or `SUCCESS` if the implementation finished the work right away.
    #[doc = "[Vulkan Manual Page](https://www.khronos.org/registry/vulkan/specs/1.2-extensions/man/html/vkBuildAccelerationStructuresKHR.html)"]
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn build_acceleration_structures(
        &self,
        infos: &[vk::AccelerationStructureBuildGeometryInfoKHRBuilder],
        build_range_infos: &[&[vk::AccelerationStructureBuildRangeInfoKHR]],
    ) -> Result<vk::Result> {
        build_on_host(&self.context, Some(self.raw), infos, build_range_infos)
    }
}

impl DeferredJoin for DeferredOperation {
    #[doc = "[Vulkan Manual Page](https://www.khronos.org/registry/vulkan/specs/1.2-extensions/man/html/vkDeferredOperationJoinKHR.html)"]
    fn join(&self) -> Result<JoinStatus> {
        let result = unsafe { self.context.device.deferred_operation_join_khr(self.raw) };
        match result.raw {
            vk::Result::SUCCESS => Ok(JoinStatus::Success),
            vk::Result::THREAD_DONE_KHR => Ok(JoinStatus::ThreadDone),
            vk::Result::THREAD_IDLE_KHR => Ok(JoinStatus::ThreadIdle),
            err => {
                #[cfg(feature = "tracing")]
                error!("Unable to assign a thread to a deferred operation: {}", err);
                Err(CtsError::VkResult(err))
            }
        }
    }

    #[doc = "[Vulkan Manual Page](https://www.khronos.org/registry/vulkan/specs/1.2-extensions/man/html/vkGetDeferredOperationMaxConcurrencyKHR.html)"]
    fn max_concurrency(&self) -> u32 {
        unsafe {
            self.context
                .device
                .get_deferred_operation_max_concurrency_khr(self.raw)
        }
    }

    #[doc = "[Vulkan Manual Page](https://www.khronos.org/registry/vulkan/specs/1.2-extensions/man/html/vkGetDeferredOperationResultKHR.html)"]
    fn result(&self) -> Result<()> {
        let result = unsafe {
            self.context
                .device
                .get_deferred_operation_result_khr(self.raw)
        };
        match result.raw {
            vk::Result::SUCCESS => Ok(()),
            err => {
                #[cfg(feature = "tracing")]
                error!("Deferred operation finished with: {}", err);
                Err(CtsError::VkResult(err))
            }
        }
    }
}

/// Builds acceleration structures on the host, optionally handing the work to a deferred operation.
pub(crate) fn build_on_host(
    context: &Context,
    deferred_operation: Option<vk::DeferredOperationKHR>,
    infos: &[vk::AccelerationStructureBuildGeometryInfoKHRBuilder],
    build_range_infos: &[&[vk::AccelerationStructureBuildRangeInfoKHR]],
) -> Result<vk::Result> {
    let build_range_infos = build_range_infos
        .iter()
        .map(|r| r.as_ptr())
        .collect::<Vec<*const vk::AccelerationStructureBuildRangeInfoKHR>>();

    let result = unsafe {
        context.device.build_acceleration_structures_khr(
            deferred_operation,
            infos,
            &build_range_infos,
        )
    };

    match result.raw {
        vk::Result::SUCCESS
        | vk::Result::OPERATION_DEFERRED_KHR
        | vk::Result::OPERATION_NOT_DEFERRED_KHR => Ok(result.raw),
        err => {
            #[cfg(feature = "tracing")]
            error!(
                "Unable to build an acceleration structure on the host: {}",
                err
            );
            Err(CtsError::VkResult(err))
        }
    }
}

/// Drives a deferred operation to completion.
///
/// * `not_deferred`: the implementation finished the work when it was handed over. Only the
///   result is queried.
/// * `worker_threads == 0`: the calling thread joins until the operation completes.
/// * Otherwise [`worker_count`] threads join in parallel. Each one joins until it's told it
///   is done. At least one of them must observe the completion.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn finish_deferred_operation<J: DeferredJoin>(
    operation: &J,
    worker_threads: u32,
    not_deferred: bool,
) -> Result<()> {
    if not_deferred {
        return operation.result();
    }

    if worker_threads == 0 {
        join_until_done(operation)?;
        return operation.result();
    }

    let max_concurrency = operation.max_concurrency();
    if max_concurrency == 0 {
        #[cfg(feature = "tracing")]
        error!("Deferred operation reports a maximal concurrency of zero");
        return Err(CtsError::DeferredOperationNoConcurrency);
    }

    let count = worker_count(worker_threads, max_concurrency);

    #[cfg(feature = "tracing")]
    debug!(
        "Joining deferred operation with {} workers (requested {}, max concurrency {})",
        count, worker_threads, max_concurrency
    );

    let outcomes = WorkerPool::scoped(|pool| {
        let mut handles = Vec::with_capacity(count);
        for _ in 0..count {
            handles.push(pool.submit(move || join_until_done(operation))?);
        }
        join_all(handles)
    })?;

    let mut completed = false;
    for outcome in outcomes {
        if outcome? == JoinStatus::Success {
            completed = true;
        }
    }

    if !completed {
        #[cfg(feature = "tracing")]
        error!("No worker observed the completion of the deferred operation");
        return Err(CtsError::DeferredOperationFailed);
    }

    operation.result()
}

/// Joins until the operation reports that this thread has nothing left to do.
fn join_until_done<J: DeferredJoin>(operation: &J) -> Result<JoinStatus> {
    loop {
        match operation.join()? {
            JoinStatus::ThreadIdle => std::thread::yield_now(),
            status => return Ok(status),
        }
    }
}
