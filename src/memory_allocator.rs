use std::sync::Arc;

use crate::{context::Context, Lifetime};

/// Owns the vk-alloc allocator of a device. Buffers and images keep it alive until their
/// memory is returned.
#[derive(Debug)]
pub(crate) struct MemoryAllocator {
    pub(crate) allocator: vk_alloc::Allocator<Lifetime>,
    context: Arc<Context>,
}

impl MemoryAllocator {
    pub(crate) fn new(allocator: vk_alloc::Allocator<Lifetime>, context: Arc<Context>) -> Self {
        Self { allocator, context }
    }
}

impl Drop for MemoryAllocator {
    fn drop(&mut self) {
        // No buffer or image is left at this point.
        unsafe {
            self.allocator.cleanup(&self.context.device);
        }
    }
}
