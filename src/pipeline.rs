use std::ffi::c_void;
use std::sync::Arc;

use erupt::vk;
#[cfg(feature = "tracing")]
use tracing1::error;

use crate::context::Context;
use crate::{CtsError, Result};

/// Wraps a pipeline layout.
#[derive(Debug)]
pub struct PipelineLayout {
    raw: vk::PipelineLayout,
    context: Arc<Context>,
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe {
            self.context
                .device
                .destroy_pipeline_layout(Some(self.raw), None);
        };
    }
}

impl PipelineLayout {
    pub(crate) fn new(raw: vk::PipelineLayout, context: Arc<Context>) -> Self {
        Self { raw, context }
    }

    /// The raw Vulkan pipeline layout handle.
    #[inline]
    pub fn raw(&self) -> vk::PipelineLayout {
        self.raw
    }
}

/// Wraps a shader module.
#[derive(Debug)]
pub struct ShaderModule {
    raw: vk::ShaderModule,
    context: Arc<Context>,
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.context
                .device
                .destroy_shader_module(Some(self.raw), None);
        };
    }
}

impl ShaderModule {
    pub(crate) fn new(raw: vk::ShaderModule, context: Arc<Context>) -> Self {
        Self { raw, context }
    }

    /// The raw Vulkan shader module handle.
    #[inline]
    pub fn raw(&self) -> vk::ShaderModule {
        self.raw
    }
}

/// Wraps a ray tracing pipeline.
#[derive(Debug)]
pub struct RayTracingPipeline {
    raw: vk::Pipeline,
    group_count: u32,
    context: Arc<Context>,
}

impl Drop for RayTracingPipeline {
    fn drop(&mut self) {
        unsafe {
            self.context.device.destroy_pipeline(Some(self.raw), None);
        };
    }
}

impl RayTracingPipeline {
    pub(crate) fn new(raw: vk::Pipeline, group_count: u32, context: Arc<Context>) -> Self {
        Self {
            raw,
            group_count,
            context,
        }
    }

    /// The raw Vulkan pipeline handle.
    #[inline]
    pub fn raw(&self) -> vk::Pipeline {
        self.raw
    }

    /// Number of shader groups the pipeline was created with.
    #[inline]
    pub fn group_count(&self) -> u32 {
        self.group_count
    }

    /// Query the handles of `group_count` shader groups starting at `first_group`, each
    /// `handle_size` bytes long.
    #[doc = "[Vulkan Manual Page](https://www.khronos.org/registry/vulkan/specs/1.2-extensions/man/html/vkGetRayTracingShaderGroupHandlesKHR.html)"]
    pub fn shader_group_handles(
        &self,
        first_group: u32,
        group_count: u32,
        handle_size: u32,
    ) -> Result<Vec<u8>> {
        let data_size = usize::try_from(group_count)? * usize::try_from(handle_size)?;
        let mut data = vec![0u8; data_size];

        #[allow(clippy::as_conversions)]
        unsafe {
            self.context.device.get_ray_tracing_shader_group_handles_khr(
                self.raw,
                first_group,
                group_count,
                data_size,
                data.as_mut_ptr() as *mut c_void,
            )
        }
        .result()
        .map_err(|err| {
            #[cfg(feature = "tracing")]
            error!("Unable to query the shader group handles: {}", err);
            CtsError::VkResult(err)
        })?;

        Ok(data)
    }
}
