use std::sync::Arc;

use erupt::vk;
#[cfg(feature = "tracing")]
use tracing1::error;

use crate::{context::Context, memory_allocator::MemoryAllocator, Lifetime};

/// Describes how a two dimensional image should be configured.
#[derive(Clone, Debug)]
pub struct ImageDescriptor<'a> {
    /// Name used for debugging.
    pub name: &'a str,
    /// What is the image used for.
    pub usage: vk::ImageUsageFlags,
    /// Where should the image reside.
    pub memory_location: vk_alloc::MemoryLocation,
    /// The format of the texels.
    pub format: vk::Format,
    /// Width in texels.
    pub width: u32,
    /// Height in texels.
    pub height: u32,
}

/// Wraps an image.
#[derive(Debug)]
pub struct Image {
    raw: vk::Image,
    format: vk::Format,
    extent: vk::Extent3D,
    allocation: vk_alloc::Allocation<Lifetime>,
    memory_allocator: Arc<MemoryAllocator>,
    context: Arc<Context>,
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            self.context.device.destroy_image(Some(self.raw), None);
            if let Err(err) = self
                .memory_allocator
                .allocator
                .deallocate(&self.context.device, &self.allocation)
            {
                #[cfg(feature = "tracing")]
                error!("Unable to free an image allocation: {}", err);
                #[cfg(not(feature = "tracing"))]
                let _ = err;
            }
        };
    }
}

impl Image {
    pub(crate) fn new(
        raw: vk::Image,
        format: vk::Format,
        extent: vk::Extent3D,
        allocation: vk_alloc::Allocation<Lifetime>,
        memory_allocator: Arc<MemoryAllocator>,
        context: Arc<Context>,
    ) -> Self {
        Self {
            raw,
            format,
            extent,
            allocation,
            memory_allocator,
            context,
        }
    }

    /// The raw Vulkan image handle.
    #[inline]
    pub fn raw(&self) -> vk::Image {
        self.raw
    }

    /// The texel format.
    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// The extent of the image. Depth is always 1.
    #[inline]
    pub fn extent(&self) -> vk::Extent3D {
        self.extent
    }

    /// The color subresource range covering the single mip level and array layer.
    pub fn subresource_range(&self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        }
    }
}

/// Wraps an image view.
#[derive(Debug)]
pub struct ImageView {
    raw: vk::ImageView,
    context: Arc<Context>,
}

impl Drop for ImageView {
    fn drop(&mut self) {
        unsafe {
            self.context.device.destroy_image_view(Some(self.raw), None);
        };
    }
}

impl ImageView {
    pub(crate) fn new(raw: vk::ImageView, context: Arc<Context>) -> Self {
        Self { raw, context }
    }

    /// The raw Vulkan image view handle.
    #[inline]
    pub fn raw(&self) -> vk::ImageView {
        self.raw
    }
}
