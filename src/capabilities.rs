//! Device capabilities and the checks that decide if a case can run.
#[cfg(feature = "tracing")]
use tracing1::info;

use crate::{BuildType, CaseDef, CtsError, Result};

/// The ray tracing capabilities of a device.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeviceCapabilities {
    /// `VK_KHR_acceleration_structure` is enabled and its feature supported.
    pub acceleration_structure: bool,
    /// `VK_KHR_ray_tracing_pipeline` is enabled and its feature supported.
    pub ray_tracing_pipeline: bool,
    /// `VK_KHR_deferred_host_operations` is enabled.
    pub deferred_host_operations: bool,
    /// `accelerationStructureHostCommands` is supported.
    pub acceleration_structure_host_commands: bool,
    /// Buffer device addresses are supported.
    pub buffer_device_address: bool,
    /// Maximal number of triangles in all geometries of one bottom level structure.
    pub max_primitive_count: u64,
    /// Maximal number of geometries in one bottom level structure.
    pub max_geometry_count: u64,
    /// Maximal number of instances in one top level structure.
    pub max_instance_count: u64,
    /// Maximal number of live device memory allocations.
    pub max_memory_allocation_count: u32,
    /// Size of a shader group handle in bytes.
    pub shader_group_handle_size: u32,
    /// Required alignment of the start of a shader binding table region.
    pub shader_group_base_alignment: u32,
    /// Required alignment of scratch buffer addresses.
    pub min_acceleration_structure_scratch_offset_alignment: u32,
    /// Maximal number of rays in one dispatch.
    pub max_ray_dispatch_invocation_count: u32,
}

impl DeviceCapabilities {
    #[cfg(feature = "tracing")]
    pub(crate) fn log(&self) {
        info!("Ray tracing capabilities:");
        info!("- acceleration structure: {}", self.acceleration_structure);
        info!("- ray tracing pipeline: {}", self.ray_tracing_pipeline);
        info!("- deferred host operations: {}", self.deferred_host_operations);
        info!(
            "- host commands: {}",
            self.acceleration_structure_host_commands
        );
        info!("- max primitive count: {}", self.max_primitive_count);
        info!("- max geometry count: {}", self.max_geometry_count);
        info!("- max instance count: {}", self.max_instance_count);
        info!(
            "- shader group handle size / base alignment: {} / {}",
            self.shader_group_handle_size, self.shader_group_base_alignment
        );
    }
}

/// Number of device memory allocations a case needs in the worst case.
///
/// Every bottom level structure needs storage, vertex and scratch memory. The top level
/// structure adds the same three plus the output image, the read back buffer and the two
/// shader binding tables.
pub fn required_memory_allocations(case: &CaseDef) -> u64 {
    3 * u64::from(case.instances_group_count) + 7
}

/// Returns `NotSupported` with the first missing capability the case needs.
pub fn check_support(capabilities: &DeviceCapabilities, case: &CaseDef) -> Result<()> {
    if !capabilities.acceleration_structure {
        return not_supported("VK_KHR_acceleration_structure is not supported");
    }
    if !capabilities.ray_tracing_pipeline {
        return not_supported("VK_KHR_ray_tracing_pipeline is not supported");
    }
    if !capabilities.buffer_device_address {
        return not_supported("bufferDeviceAddress is not supported");
    }
    if case.build_type == BuildType::Host {
        if !capabilities.acceleration_structure_host_commands {
            return not_supported("accelerationStructureHostCommands is not supported");
        }
        if case.deferred_operation && !capabilities.deferred_host_operations {
            return not_supported("VK_KHR_deferred_host_operations is not supported");
        }
    }

    let primitives = u64::from(case.primitives_per_bottom_level());
    if primitives > capabilities.max_primitive_count {
        return not_supported(&format!(
            "maxPrimitiveCount {} is below {}",
            capabilities.max_primitive_count, primitives
        ));
    }
    if u64::from(case.geometries_group_count) > capabilities.max_geometry_count {
        return not_supported(&format!(
            "maxGeometryCount {} is below {}",
            capabilities.max_geometry_count, case.geometries_group_count
        ));
    }
    if u64::from(case.instances_group_count) > capabilities.max_instance_count {
        return not_supported(&format!(
            "maxInstanceCount {} is below {}",
            capabilities.max_instance_count, case.instances_group_count
        ));
    }

    let allocations = required_memory_allocations(case);
    if allocations > u64::from(capabilities.max_memory_allocation_count) {
        return not_supported(&format!(
            "maxMemoryAllocationCount {} is below {}",
            capabilities.max_memory_allocation_count, allocations
        ));
    }

    if case.pixel_count() > capabilities.max_ray_dispatch_invocation_count {
        return not_supported(&format!(
            "maxRayDispatchInvocationCount {} is below {}",
            capabilities.max_ray_dispatch_invocation_count,
            case.pixel_count()
        ));
    }

    Ok(())
}

fn not_supported(reason: &str) -> Result<()> {
    Err(CtsError::NotSupported(reason.to_owned()))
}
