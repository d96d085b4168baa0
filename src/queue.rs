use std::sync::Arc;

use erupt::vk;
#[cfg(feature = "tracing")]
use tracing1::error;

use crate::context::Context;
use crate::{CommandBuffer, CtsError, Fence, Result};

/// A queue of the universal queue family. Executes ray tracing, transfer and clear commands.
#[derive(Debug)]
pub struct Queue {
    raw: vk::Queue,
    family_index: u32,
    context: Arc<Context>,
}

impl Drop for Queue {
    fn drop(&mut self) {
        let result = unsafe { self.context.device.queue_wait_idle(self.raw) }.result();
        if let Err(err) = result {
            #[cfg(feature = "tracing")]
            error!("Unable to wait for the queue to become idle: {}", err);
            #[cfg(not(feature = "tracing"))]
            let _ = err;
        }
    }
}

impl Queue {
    pub(crate) fn new(raw: vk::Queue, family_index: u32, context: Arc<Context>) -> Self {
        Self {
            raw,
            family_index,
            context,
        }
    }

    /// The raw Vulkan queue handle.
    #[inline]
    pub fn raw(&self) -> vk::Queue {
        self.raw
    }

    /// The queue family index of this queue.
    #[inline]
    pub fn family_index(&self) -> u32 {
        self.family_index
    }

    /// Submits a command buffer. The fence is signaled once the execution finished.
    #[doc = "[Vulkan Manual Page](https://www.khronos.org/registry/vulkan/specs/1.2-extensions/man/html/vkQueueSubmit.html)"]
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn submit(&self, command_buffer: &CommandBuffer, fence: &Fence) -> Result<()> {
        let command_buffers = [command_buffer.raw()];
        let submit_info = vk::SubmitInfoBuilder::new().command_buffers(&command_buffers);

        unsafe {
            self.context
                .device
                .queue_submit(self.raw, &[submit_info], Some(fence.raw))
        }
        .result()
        .map_err(|err| {
            #[cfg(feature = "tracing")]
            error!("Unable to submit a command buffer: {}", err);
            CtsError::VkResult(err)
        })
    }

    /// Submits a command buffer and blocks until its execution finished.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn submit_and_wait(&self, command_buffer: &CommandBuffer, fence: &Fence) -> Result<()> {
        fence.reset()?;
        self.submit(command_buffer, fence)?;
        fence.wait()
    }
}
