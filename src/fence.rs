use std::sync::Arc;

use erupt::vk;
#[cfg(feature = "tracing")]
use tracing1::error;

use crate::context::Context;
use crate::{CtsError, Result};

/// A fence. Used to block the host until a submission finished.
#[derive(Debug)]
pub struct Fence {
    pub(crate) raw: vk::Fence,
    context: Arc<Context>,
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.context.device.destroy_fence(Some(self.raw), None);
        };
    }
}

impl Fence {
    pub(crate) fn new(raw: vk::Fence, context: Arc<Context>) -> Self {
        Self { raw, context }
    }

    /// Blocks until the fence is signaled. There is no timeout.
    #[doc = "[Vulkan Manual Page](https://www.khronos.org/registry/vulkan/specs/1.2-extensions/man/html/vkWaitForFences.html)"]
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn wait(&self) -> Result<()> {
        unsafe {
            self.context
                .device
                .wait_for_fences(&[self.raw], true, u64::MAX)
        }
        .result()
        .map_err(|err| {
            #[cfg(feature = "tracing")]
            error!("Unable to wait for a fence: {}", err);
            CtsError::VkResult(err)
        })
    }

    /// Resets the fence.
    #[doc = "[Vulkan Manual Page](https://www.khronos.org/registry/vulkan/specs/1.2-extensions/man/html/vkResetFences.html)"]
    pub fn reset(&self) -> Result<()> {
        unsafe { self.context.device.reset_fences(&[self.raw]) }
            .result()
            .map_err(|err| {
                #[cfg(feature = "tracing")]
                error!("Unable to reset a fence: {}", err);
                CtsError::VkResult(err)
            })
    }
}
