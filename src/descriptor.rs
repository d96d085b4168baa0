use std::sync::Arc;

use erupt::{vk, ExtendableFromConst};
#[cfg(feature = "tracing")]
use tracing1::error;

use crate::context::Context;
use crate::{AccelerationStructure, CtsError, ImageView, Result};

/// Wraps a descriptor pool.
#[derive(Debug)]
pub struct DescriptorPool {
    raw: vk::DescriptorPool,
    context: Arc<Context>,
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.context
                .device
                .destroy_descriptor_pool(Some(self.raw), None);
        };
    }
}

impl DescriptorPool {
    pub(crate) fn new(raw: vk::DescriptorPool, context: Arc<Context>) -> Self {
        Self { raw, context }
    }

    /// Creates a new descriptor set with the given `DescriptorSetLayout`.
    pub fn create_descriptor_set(
        &self,
        name: &str,
        layout: &DescriptorSetLayout,
    ) -> Result<DescriptorSet> {
        let layouts = [layout.raw];
        let info = vk::DescriptorSetAllocateInfoBuilder::new()
            .descriptor_pool(self.raw)
            .set_layouts(&layouts);
        let sets = unsafe { self.context.device.allocate_descriptor_sets(&info) }
            .result()
            .map_err(|err| {
                #[cfg(feature = "tracing")]
                error!("Unable to allocate a descriptor set: {}", err);
                CtsError::VkResult(err)
            })?;
        let raw = sets[0];

        self.context
            .set_object_name(name, vk::ObjectType::DESCRIPTOR_SET, raw.0)?;

        Ok(DescriptorSet {
            raw,
            context: self.context.clone(),
        })
    }
}

/// Wraps a descriptor set layout.
#[derive(Debug)]
pub struct DescriptorSetLayout {
    raw: vk::DescriptorSetLayout,
    context: Arc<Context>,
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.context
                .device
                .destroy_descriptor_set_layout(Some(self.raw), None);
        };
    }
}

impl DescriptorSetLayout {
    pub(crate) fn new(raw: vk::DescriptorSetLayout, context: Arc<Context>) -> Self {
        Self { raw, context }
    }

    /// The raw Vulkan descriptor set layout handle.
    #[inline]
    pub fn raw(&self) -> vk::DescriptorSetLayout {
        self.raw
    }
}

/// Wraps a descriptor set. Freed together with its pool.
#[derive(Debug)]
pub struct DescriptorSet {
    raw: vk::DescriptorSet,
    context: Arc<Context>,
}

impl DescriptorSet {
    /// The raw Vulkan descriptor set handle.
    #[inline]
    pub fn raw(&self) -> vk::DescriptorSet {
        self.raw
    }

    /// Writes a storage image into the binding.
    #[doc = "[Vulkan Manual Page](https://www.khronos.org/registry/vulkan/specs/1.2-extensions/man/html/vkUpdateDescriptorSets.html)"]
    pub fn write_storage_image(&self, binding: u32, view: &ImageView, layout: vk::ImageLayout) {
        let image_info = [vk::DescriptorImageInfoBuilder::new()
            .image_view(view.raw())
            .image_layout(layout)];
        let write = vk::WriteDescriptorSetBuilder::new()
            .dst_set(self.raw)
            .dst_binding(binding)
            .dst_array_element(0)
            .descriptor_type(vk::DescriptorType::STORAGE_IMAGE)
            .image_info(&image_info);

        unsafe { self.context.device.update_descriptor_sets(&[write], &[]) };
    }

    /// Writes an acceleration structure into the binding.
    #[doc = "[Vulkan Manual Page](https://www.khronos.org/registry/vulkan/specs/1.2-extensions/man/html/vkUpdateDescriptorSets.html)"]
    pub fn write_acceleration_structure(
        &self,
        binding: u32,
        acceleration_structure: &AccelerationStructure,
    ) {
        let structures = [acceleration_structure.raw()];
        let structure_info = vk::WriteDescriptorSetAccelerationStructureKHRBuilder::new()
            .acceleration_structures(&structures);
        let mut write = vk::WriteDescriptorSetBuilder::new()
            .dst_set(self.raw)
            .dst_binding(binding)
            .dst_array_element(0)
            .descriptor_type(vk::DescriptorType::ACCELERATION_STRUCTURE_KHR)
            .extend_from(&structure_info);
        // The count is not derived from the chained structure.
        write.descriptor_count = 1;

        unsafe { self.context.device.update_descriptor_sets(&[write], &[]) };
    }
}
