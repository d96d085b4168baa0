//! Implements command pools and command buffers.

use std::sync::Arc;

use erupt::vk;
#[cfg(feature = "tracing")]
use tracing1::error;

use crate::context::Context;
use crate::{
    CtsError, DescriptorSet, Image, PipelineLayout, RayTracingPipeline, Result, ShaderBindingTable,
};

/// A wrapped command pool.
#[derive(Debug)]
pub struct CommandPool {
    raw: vk::CommandPool,
    name: String,
    command_buffer_counter: u64,
    context: Arc<Context>,
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            self.context
                .device
                .destroy_command_pool(Some(self.raw), None);
        };
    }
}

impl CommandPool {
    /// Creates a new command pool.
    pub(crate) fn new(context: Arc<Context>, name: &str, family_index: u32) -> Result<Self> {
        let command_pool_info = vk::CommandPoolCreateInfoBuilder::new()
            .flags(vk::CommandPoolCreateFlags::TRANSIENT)
            .queue_family_index(family_index);

        let raw = unsafe {
            context
                .device
                .create_command_pool(&command_pool_info, None)
        }
        .result()
        .map_err(|err| {
            #[cfg(feature = "tracing")]
            error!("Unable to create a command pool: {}", err);
            CtsError::VkResult(err)
        })?;

        context.set_object_name(name, vk::ObjectType::COMMAND_POOL, raw.0)?;

        Ok(Self {
            raw,
            name: name.to_owned(),
            command_buffer_counter: 0,
            context,
        })
    }

    /// Creates a new primary command buffer.
    pub fn create_command_buffer(&mut self) -> Result<CommandBuffer> {
        let info = vk::CommandBufferAllocateInfoBuilder::new()
            .command_pool(self.raw)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let command_buffers = unsafe { self.context.device.allocate_command_buffers(&info) }
            .result()
            .map_err(|err| {
                #[cfg(feature = "tracing")]
                error!("Unable to allocate a command buffer: {}", err);
                CtsError::VkResult(err)
            })?;
        let raw = command_buffers[0];

        #[allow(clippy::as_conversions)]
        self.context.set_object_name(
            &format!("{} Command Buffer {}", self.name, self.command_buffer_counter),
            vk::ObjectType::COMMAND_BUFFER,
            raw.0 as u64,
        )?;

        self.command_buffer_counter += 1;

        Ok(CommandBuffer {
            raw,
            pool: self.raw,
            context: self.context.clone(),
        })
    }
}

/// A wrapped primary command buffer.
#[derive(Debug)]
pub struct CommandBuffer {
    raw: vk::CommandBuffer,
    pool: vk::CommandPool,
    context: Arc<Context>,
}

impl Drop for CommandBuffer {
    fn drop(&mut self) {
        unsafe {
            self.context
                .device
                .free_command_buffers(self.pool, &[self.raw]);
        };
    }
}

impl CommandBuffer {
    /// The raw Vulkan command buffer handle.
    #[inline]
    pub fn raw(&self) -> vk::CommandBuffer {
        self.raw
    }

    /// Records the command buffer actions with the help of an encoder.
    pub fn record<F>(&self, exec: F) -> Result<()>
    where
        F: FnOnce(&CommandEncoder) -> Result<()>,
    {
        let encoder = CommandEncoder {
            context: self.context.clone(),
            buffer: self.raw,
        };

        encoder.begin()?;
        exec(&encoder)?;
        encoder.end()?;

        Ok(())
    }
}

/// Used to encode commands into a command buffer.
#[derive(Debug)]
pub struct CommandEncoder {
    context: Arc<Context>,
    buffer: vk::CommandBuffer,
}

impl CommandEncoder {
    /// Begins a command buffer.
    fn begin(&self) -> Result<()> {
        let info = vk::CommandBufferBeginInfoBuilder::new()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.context
                .device
                .begin_command_buffer(self.buffer, &info)
        }
        .result()
        .map_err(|err| {
            #[cfg(feature = "tracing")]
            error!("Unable to begin a command buffer: {}", err);
            CtsError::VkResult(err)
        })
    }

    /// Ends a command buffer.
    fn end(&self) -> Result<()> {
        unsafe { self.context.device.end_command_buffer(self.buffer) }
            .result()
            .map_err(|err| {
                #[cfg(feature = "tracing")]
                error!("Unable to end a command buffer: {}", err);
                CtsError::VkResult(err)
            })
    }

    /// Global memory barrier.
    #[doc = "[Vulkan Manual Page](https://www.khronos.org/registry/vulkan/specs/1.2-extensions/man/html/vkCmdPipelineBarrier.html)"]
    pub fn memory_barrier(
        &self,
        src_stage_mask: vk::PipelineStageFlags,
        src_access_mask: vk::AccessFlags,
        dst_stage_mask: vk::PipelineStageFlags,
        dst_access_mask: vk::AccessFlags,
    ) {
        let barriers = [vk::MemoryBarrierBuilder::new()
            .src_access_mask(src_access_mask)
            .dst_access_mask(dst_access_mask)];

        unsafe {
            self.context.device.cmd_pipeline_barrier(
                self.buffer,
                src_stage_mask,
                dst_stage_mask,
                None,
                &barriers,
                &[],
                &[],
            )
        };
    }

    /// Image layout transition of the whole color subresource.
    #[doc = "[Vulkan Manual Page](https://www.khronos.org/registry/vulkan/specs/1.2-extensions/man/html/vkCmdPipelineBarrier.html)"]
    #[allow(clippy::too_many_arguments)]
    pub fn image_barrier(
        &self,
        image: &Image,
        src_stage_mask: vk::PipelineStageFlags,
        src_access_mask: vk::AccessFlags,
        old_layout: vk::ImageLayout,
        dst_stage_mask: vk::PipelineStageFlags,
        dst_access_mask: vk::AccessFlags,
        new_layout: vk::ImageLayout,
    ) {
        let barriers = [vk::ImageMemoryBarrierBuilder::new()
            .src_access_mask(src_access_mask)
            .dst_access_mask(dst_access_mask)
            .old_layout(old_layout)
            .new_layout(new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image.raw())
            .subresource_range(image.subresource_range())];

        unsafe {
            self.context.device.cmd_pipeline_barrier(
                self.buffer,
                src_stage_mask,
                dst_stage_mask,
                None,
                &[],
                &[],
                &barriers,
            )
        };
    }

    /// Clears every texel of an unsigned integer color image to the given value.
    #[doc = "[Vulkan Manual Page](https://www.khronos.org/registry/vulkan/specs/1.2-extensions/man/html/vkCmdClearColorImage.html)"]
    pub fn clear_color_image(&self, image: &Image, layout: vk::ImageLayout, value: [u32; 4]) {
        let color = vk::ClearColorValue { uint32: value };
        let ranges = [image.subresource_range().into_builder()];

        unsafe {
            self.context
                .device
                .cmd_clear_color_image(self.buffer, image.raw(), layout, &color, &ranges)
        };
    }

    /// Copies the whole image into a tightly packed buffer.
    #[doc = "[Vulkan Manual Page](https://www.khronos.org/registry/vulkan/specs/1.2-extensions/man/html/vkCmdCopyImageToBuffer.html)"]
    pub fn copy_image_to_buffer(
        &self,
        image: &Image,
        layout: vk::ImageLayout,
        buffer: vk::Buffer,
    ) {
        let regions = [vk::BufferImageCopyBuilder::new()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            })
            .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
            .image_extent(image.extent())];

        unsafe {
            self.context.device.cmd_copy_image_to_buffer(
                self.buffer,
                image.raw(),
                layout,
                buffer,
                &regions,
            )
        };
    }

    /// Build acceleration structures on the device.
    #[doc = "[Vulkan Manual Page](https://www.khronos.org/registry/vulkan/specs/1.2-extensions/man/html/vkCmdBuildAccelerationStructuresKHR.html)"]
    pub fn build_acceleration_structures(
        &self,
        infos: &[vk::AccelerationStructureBuildGeometryInfoKHRBuilder],
        build_range_infos: &[&[vk::AccelerationStructureBuildRangeInfoKHR]],
    ) {
        let build_range_infos = build_range_infos
            .iter()
            .map(|r| r.as_ptr())
            .collect::<Vec<*const vk::AccelerationStructureBuildRangeInfoKHR>>();

        unsafe {
            self.context.device.cmd_build_acceleration_structures_khr(
                self.buffer,
                infos,
                &build_range_infos,
            )
        };
    }

    /// Bind a ray tracing pipeline.
    #[doc = "[Vulkan Manual Page](https://www.khronos.org/registry/vulkan/specs/1.2-extensions/man/html/vkCmdBindPipeline.html)"]
    pub fn bind_ray_tracing_pipeline(&self, pipeline: &RayTracingPipeline) {
        unsafe {
            self.context.device.cmd_bind_pipeline(
                self.buffer,
                vk::PipelineBindPoint::RAY_TRACING_KHR,
                pipeline.raw(),
            )
        };
    }

    /// Binds descriptor sets to the ray tracing bind point.
    #[doc = "[Vulkan Manual Page](https://www.khronos.org/registry/vulkan/specs/1.2-extensions/man/html/vkCmdBindDescriptorSets.html)"]
    pub fn bind_ray_tracing_descriptor_sets(
        &self,
        layout: &PipelineLayout,
        first_set: u32,
        sets: &[&DescriptorSet],
    ) {
        let sets: Vec<vk::DescriptorSet> = sets.iter().map(|set| set.raw()).collect();
        unsafe {
            self.context.device.cmd_bind_descriptor_sets(
                self.buffer,
                vk::PipelineBindPoint::RAY_TRACING_KHR,
                layout.raw(),
                first_set,
                &sets,
                &[],
            )
        };
    }

    /// Initialize a ray tracing dispatch. Miss and hit regions are empty.
    #[doc = "[Vulkan Manual Page](https://www.khronos.org/registry/vulkan/specs/1.2-extensions/man/html/vkCmdTraceRaysKHR.html)"]
    pub fn trace_rays(&self, table: &ShaderBindingTable, width: u32, height: u32, depth: u32) {
        let raygen: vk::StridedDeviceAddressRegionKHR = table.raygen_region().into();
        let callable: vk::StridedDeviceAddressRegionKHR = table.callable_region().into();
        let empty = vk::StridedDeviceAddressRegionKHR::default();
        unsafe {
            self.context.device.cmd_trace_rays_khr(
                self.buffer,
                &raygen,
                &empty,
                &empty,
                &callable,
                width,
                height,
                depth,
            )
        };
    }
}
