use std::sync::Arc;

use erupt::vk;
#[cfg(feature = "tracing")]
use tracing1::debug;

use crate::context::Context;
use crate::{finish_deferred_operation, Buffer, Device, Result};

/// Wraps an acceleration structure together with the buffer that stores it.
#[derive(Debug)]
pub struct AccelerationStructure {
    raw: vk::AccelerationStructureKHR,
    ty: vk::AccelerationStructureTypeKHR,
    // Must be dropped after the acceleration structure is destroyed.
    storage: Buffer,
    context: Arc<Context>,
}

impl Drop for AccelerationStructure {
    fn drop(&mut self) {
        unsafe {
            self.context
                .device
                .destroy_acceleration_structure_khr(Some(self.raw), None);
        };
    }
}

impl AccelerationStructure {
    pub(crate) fn new(
        raw: vk::AccelerationStructureKHR,
        ty: vk::AccelerationStructureTypeKHR,
        storage: Buffer,
        context: Arc<Context>,
    ) -> Self {
        Self {
            raw,
            ty,
            storage,
            context,
        }
    }

    /// The raw Vulkan acceleration structure handle.
    #[inline]
    pub fn raw(&self) -> vk::AccelerationStructureKHR {
        self.raw
    }

    /// Top or bottom level.
    #[inline]
    pub fn ty(&self) -> vk::AccelerationStructureTypeKHR {
        self.ty
    }

    /// The buffer backing the acceleration structure.
    #[inline]
    pub fn storage(&self) -> &Buffer {
        &self.storage
    }

    /// Query an address of a acceleration structure.
    #[doc = "[Vulkan Manual Page](https://www.khronos.org/registry/vulkan/specs/1.2-extensions/man/html/vkGetAccelerationStructureDeviceAddressKHR.html)"]
    pub fn device_address(&self) -> vk::DeviceAddress {
        let info = vk::AccelerationStructureDeviceAddressInfoKHRBuilder::new()
            .acceleration_structure(self.raw);
        unsafe {
            self.context
                .device
                .get_acceleration_structure_device_address_khr(&info)
        }
    }

    /// The value an instance uses to reference this structure. Host built structures are
    /// referenced by their handle, device built ones by their device address.
    pub fn reference(&self, build_type: vk::AccelerationStructureBuildTypeKHR) -> u64 {
        if build_type == vk::AccelerationStructureBuildTypeKHR::HOST_KHR {
            self.raw.0
        } else {
            self.device_address()
        }
    }
}

/// Executes a host build. With a deferred operation the build is joined by `worker_threads`
/// threads before this returns.
pub(crate) fn execute_host_build(
    device: &Device,
    name: &str,
    infos: &[vk::AccelerationStructureBuildGeometryInfoKHRBuilder],
    build_range_infos: &[&[vk::AccelerationStructureBuildRangeInfoKHR]],
    deferred_operation: bool,
    worker_threads: u32,
) -> Result<()> {
    if !deferred_operation {
        return device.build_acceleration_structures(infos, build_range_infos);
    }

    let operation = device.create_deferred_operation(&format!("{} Deferred Operation", name))?;
    let status = operation.build_acceleration_structures(infos, build_range_infos)?;

    #[cfg(feature = "tracing")]
    debug!("Host build of {} returned {}", name, status);

    finish_deferred_operation(
        &operation,
        worker_threads,
        status != vk::Result::OPERATION_DEFERRED_KHR,
    )
}

/// Rounds `value` up to the next multiple of `alignment`. An alignment of zero is ignored.
pub(crate) fn align_up(value: u64, alignment: u64) -> u64 {
    if alignment == 0 {
        return value;
    }
    (value + alignment - 1) / alignment * alignment
}
