use std::sync::Arc;

use erupt::vk;
#[cfg(feature = "tracing")]
use tracing1::error;

use crate::{context::Context, memory_allocator::MemoryAllocator, CtsError, Lifetime, Result};

/// Describes how a buffer should be configured.
#[derive(Clone, Debug)]
pub struct BufferDescriptor<'a> {
    /// Name used for debugging.
    pub name: &'a str,
    /// What is the buffer used for.
    pub usage: vk::BufferUsageFlags,
    /// Where should the buffer reside.
    pub memory_location: vk_alloc::MemoryLocation,
    /// The lifetime of an allocation. Used to pool allocations and reduce fragmentation.
    pub lifetime: Lifetime,
    /// The size of the buffer in bytes.
    pub size: u64,
}

/// Wraps a buffer.
#[derive(Debug)]
pub struct Buffer {
    raw: vk::Buffer,
    size: u64,
    allocation: vk_alloc::Allocation<Lifetime>,
    memory_allocator: Arc<MemoryAllocator>,
    context: Arc<Context>,
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.context.device.destroy_buffer(Some(self.raw), None);
            if let Err(err) = self
                .memory_allocator
                .allocator
                .deallocate(&self.context.device, &self.allocation)
            {
                #[cfg(feature = "tracing")]
                error!("Unable to free a buffer allocation: {}", err);
                #[cfg(not(feature = "tracing"))]
                let _ = err;
            }
        };
    }
}

impl Buffer {
    pub(crate) fn new(
        raw: vk::Buffer,
        size: u64,
        allocation: vk_alloc::Allocation<Lifetime>,
        memory_allocator: Arc<MemoryAllocator>,
        context: Arc<Context>,
    ) -> Self {
        Self {
            raw,
            size,
            allocation,
            memory_allocator,
            context,
        }
    }

    /// The raw Vulkan buffer handle.
    #[inline]
    pub fn raw(&self) -> vk::Buffer {
        self.raw
    }

    /// The requested size of the buffer in bytes.
    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Returns a valid mapped slice if the buffer memory is host visible, otherwise it will return None.
    #[inline]
    pub unsafe fn mapped_slice(&self) -> Result<Option<&[u8]>> {
        let slice = self.allocation.mapped_slice()?;
        Ok(slice)
    }

    /// Returns a valid mapped mutable slice if the buffer memory is host visible, otherwise it will return None.
    #[inline]
    pub unsafe fn mapped_slice_mut(&mut self) -> Result<Option<&mut [u8]>> {
        let slice = self.allocation.mapped_slice_mut()?;
        Ok(slice)
    }

    /// Copies the bytes into the start of the buffer and flushes the mapped range.
    pub unsafe fn write(&mut self, data: &[u8]) -> Result<()> {
        self.write_at(0, data)
    }

    /// Copies the bytes into the buffer at the byte offset and flushes the mapped range.
    pub unsafe fn write_at(&mut self, offset: usize, data: &[u8]) -> Result<()> {
        let slice = self.mapped_slice_mut()?.ok_or(CtsError::BufferNotMapped)?;
        slice[offset..offset + data.len()].copy_from_slice(data);
        self.flush()
    }

    /// Invalidates the mapped range and copies `len` bytes out of the start of the buffer.
    pub unsafe fn read(&self, len: usize) -> Result<Vec<u8>> {
        self.invalidate()?;
        let slice = self.mapped_slice()?.ok_or(CtsError::BufferNotMapped)?;
        Ok(slice[..len].to_vec())
    }

    /// Flush the mapped memory of the buffer. Used for CPU->GPU transfers.
    #[doc = "[Vulkan Manual Page](https://www.khronos.org/registry/vulkan/specs/1.2-extensions/man/html/vkFlushMappedMemoryRanges.html)"]
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub unsafe fn flush(&self) -> Result<()> {
        let ranges = [vk::MappedMemoryRangeBuilder::new()
            .memory(self.allocation.device_memory())
            .size(self.allocation.size())
            .offset(self.allocation.offset())];
        self.context
            .device
            .flush_mapped_memory_ranges(&ranges)
            .result()
            .map_err(|err| {
                #[cfg(feature = "tracing")]
                error!("Unable to flush a mapped memory range: {}", err);
                CtsError::VkResult(err)
            })?;

        Ok(())
    }

    /// Invalidate the mapped memory of the buffer. Used for GPU->CPU transfers.
    #[doc = "[Vulkan Manual Page](https://www.khronos.org/registry/vulkan/specs/1.2-extensions/man/html/vkInvalidateMappedMemoryRanges.html)"]
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub unsafe fn invalidate(&self) -> Result<()> {
        let ranges = [vk::MappedMemoryRangeBuilder::new()
            .memory(self.allocation.device_memory())
            .size(self.allocation.size())
            .offset(self.allocation.offset())];
        self.context
            .device
            .invalidate_mapped_memory_ranges(&ranges)
            .result()
            .map_err(|err| {
                #[cfg(feature = "tracing")]
                error!("Unable to invalidate a mapped memory range: {}", err);
                CtsError::VkResult(err)
            })?;

        Ok(())
    }

    /// Query an address of a buffer.
    #[doc = "[Vulkan Manual Page](https://www.khronos.org/registry/vulkan/specs/1.2-extensions/man/html/vkGetBufferDeviceAddress.html)"]
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub unsafe fn device_address(&self) -> vk::DeviceAddress {
        let info = vk::BufferDeviceAddressInfoBuilder::new().buffer(self.raw);
        self.context.device.get_buffer_device_address(&info)
    }
}
