//! Top level acceleration structures over instances of bottom level structures.
use bytemuck::{Pod, Zeroable};
use erupt::vk;
use glam::Mat4;
#[cfg(feature = "tracing")]
use tracing1::debug;

use crate::acceleration_structure::execute_host_build;
use crate::bottom_level::{memory_location, Scratch};
use crate::{
    AccelerationStructure, Arena, BottomLevelAccelerationStructure, Buffer, BufferDescriptor,
    BuildType, CommandEncoder, CtsError, Device, DeviceCapabilities, Handle, Lifetime, Result,
};

/// A row major 3x4 affine transform of an instance.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct TransformMatrix(pub [[f32; 4]; 3]);

impl Default for TransformMatrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl TransformMatrix {
    /// The identity transform.
    pub const IDENTITY: Self = Self([
        [1.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
    ]);

    /// Takes the upper three rows of an affine matrix.
    pub fn from_mat4(matrix: &Mat4) -> Self {
        let columns = matrix.to_cols_array_2d();
        let mut rows = [[0.0; 4]; 3];
        for (r, row) in rows.iter_mut().enumerate() {
            for (c, value) in row.iter_mut().enumerate() {
                *value = columns[c][r];
            }
        }
        Self(rows)
    }
}

/// Layout of `VkAccelerationStructureInstanceKHR`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct InstanceRecord {
    transform: TransformMatrix,
    custom_index_and_mask: u32,
    sbt_offset_and_flags: u32,
    acceleration_structure_reference: u64,
}

const INSTANCE_SIZE: u64 = std::mem::size_of::<InstanceRecord>() as u64;

impl InstanceRecord {
    fn new(custom_index: u32, transform: TransformMatrix, reference: u64) -> Self {
        let flags = vk::GeometryInstanceFlagsKHR::TRIANGLE_FACING_CULL_DISABLE_KHR.bits();
        Self {
            transform,
            custom_index_and_mask: (custom_index & 0x00FF_FFFF) | (0xFF << 24),
            sbt_offset_and_flags: (flags & 0xFF) << 24,
            acceleration_structure_reference: reference,
        }
    }
}

/// Collects instances for one top level acceleration structure.
///
/// Every instance holds a reference on its bottom level structure in the arena. The references
/// are handed to the created structure and given back by
/// [`TopLevelAccelerationStructure::release`].
#[derive(Debug)]
pub struct TopLevelBuilder {
    instances: Vec<(Handle<BottomLevelAccelerationStructure>, TransformMatrix)>,
    build_type: BuildType,
    deferred_operation: bool,
    worker_threads: u32,
}

impl TopLevelBuilder {
    /// Creates an empty builder.
    pub fn new(build_type: BuildType) -> Self {
        Self {
            instances: Vec::new(),
            build_type,
            deferred_operation: false,
            worker_threads: 0,
        }
    }

    /// Hands host builds to a deferred operation that is joined by `worker_threads` threads.
    /// Ignored for device builds.
    pub fn deferred(mut self, deferred_operation: bool, worker_threads: u32) -> Self {
        self.deferred_operation = deferred_operation;
        self.worker_threads = worker_threads;
        self
    }

    /// Adds an instance of a bottom level structure and retains it.
    pub fn add_instance(
        &mut self,
        arena: &mut Arena<BottomLevelAccelerationStructure>,
        bottom_level: Handle<BottomLevelAccelerationStructure>,
        transform: TransformMatrix,
    ) -> Result<()> {
        arena.retain(bottom_level)?;
        self.instances.push((bottom_level, transform));
        Ok(())
    }

    /// Number of instances added so far.
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Returns `NotSupported` if the device can't hold the collected instances in one structure.
    pub fn check_limits(&self, capabilities: &DeviceCapabilities) -> Result<()> {
        let instances = u64::try_from(self.instances.len())?;
        if instances > capabilities.max_instance_count {
            return Err(CtsError::NotSupported(format!(
                "maxInstanceCount {} is below {}",
                capabilities.max_instance_count, instances
            )));
        }
        Ok(())
    }

    /// Gives the references back to the arena without creating a structure.
    pub fn abandon(self, arena: &mut Arena<BottomLevelAccelerationStructure>) -> Result<()> {
        release_all(&self.instances, arena)
    }

    /// Allocates the structure, its instance data and its scratch memory. The structure still
    /// needs to be built, after all referenced bottom level structures are built.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn create(
        self,
        device: &Device,
        arena: &mut Arena<BottomLevelAccelerationStructure>,
        name: &str,
    ) -> Result<TopLevelAccelerationStructure> {
        if let Err(err) = self.check_limits(device.capabilities()) {
            release_all(&self.instances, arena)?;
            return Err(err);
        }

        let mut records = Vec::with_capacity(self.instances.len());
        for (index, (handle, transform)) in self.instances.iter().enumerate() {
            let bottom_level = arena.get(*handle)?;
            records.push(InstanceRecord::new(
                u32::try_from(index)?,
                *transform,
                bottom_level.reference(),
            ));
        }

        let instance_data = match self.build_type {
            BuildType::Host => InstanceData::Host(records),
            BuildType::Device => {
                let mut buffer = device.create_buffer(&BufferDescriptor {
                    name: &format!("{} Instances", name),
                    usage: vk::BufferUsageFlags::ACCELERATION_STRUCTURE_BUILD_INPUT_READ_ONLY_KHR
                        | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
                    memory_location: vk_alloc::MemoryLocation::CpuToGpu,
                    lifetime: Lifetime::Buffer,
                    size: INSTANCE_SIZE * u64::try_from(records.len())?.max(1),
                })?;
                unsafe { buffer.write(bytemuck::cast_slice(&records))? };
                InstanceData::Device(buffer)
            }
        };

        let instances = vk::AccelerationStructureGeometryInstancesDataKHRBuilder::new()
            .array_of_pointers(false)
            .data(instance_data.address());
        let geometries = vec![vk::AccelerationStructureGeometryKHRBuilder::new()
            .geometry_type(vk::GeometryTypeKHR::INSTANCES_KHR)
            .geometry(vk::AccelerationStructureGeometryDataKHR {
                instances: instances.build(),
            })];

        let instance_count = u32::try_from(self.instances.len())?;
        let sizes = {
            let info = build_info(&geometries);
            device.acceleration_structure_build_sizes(
                self.build_type.as_vk(),
                &info,
                &[instance_count],
            )
        };

        #[cfg(feature = "tracing")]
        debug!(
            "{}: {} instances, {} bytes, {} scratch bytes",
            name, instance_count, sizes.acceleration_structure_size, sizes.build_scratch_size
        );

        let structure = device.create_acceleration_structure(
            name,
            vk::AccelerationStructureTypeKHR::TOP_LEVEL_KHR,
            sizes.acceleration_structure_size,
            memory_location(self.build_type),
        )?;
        let scratch = Scratch::new(device, name, self.build_type, sizes.build_scratch_size)?;

        Ok(TopLevelAccelerationStructure {
            name: name.to_owned(),
            structure,
            geometries,
            range: vk::AccelerationStructureBuildRangeInfoKHR {
                primitive_count: instance_count,
                primitive_offset: 0,
                first_vertex: 0,
                transform_offset: 0,
            },
            instances: self.instances,
            instance_data: Some(instance_data),
            scratch: Some(scratch),
            build_type: self.build_type,
            deferred_operation: self.deferred_operation,
            worker_threads: self.worker_threads,
            built: false,
        })
    }
}

/// A top level acceleration structure. Holds a reference on every instanced bottom level
/// structure until it's released.
pub struct TopLevelAccelerationStructure {
    name: String,
    structure: AccelerationStructure,
    geometries: Vec<vk::AccelerationStructureGeometryKHRBuilder<'static>>,
    range: vk::AccelerationStructureBuildRangeInfoKHR,
    instances: Vec<(Handle<BottomLevelAccelerationStructure>, TransformMatrix)>,
    instance_data: Option<InstanceData>,
    scratch: Option<Scratch>,
    build_type: BuildType,
    deferred_operation: bool,
    worker_threads: u32,
    built: bool,
}

impl std::fmt::Debug for TopLevelAccelerationStructure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopLevelAccelerationStructure")
            .field("name", &self.name)
            .field("instances", &self.instances.len())
            .field("build_type", &self.build_type)
            .field("built", &self.built)
            .finish()
    }
}

impl TopLevelAccelerationStructure {
    /// The wrapped acceleration structure.
    #[inline]
    pub fn structure(&self) -> &AccelerationStructure {
        &self.structure
    }

    /// Returns true once the build executed or was recorded.
    #[inline]
    pub fn is_built(&self) -> bool {
        self.built
    }

    /// The instanced bottom level structures and their transforms.
    pub fn instances(&self) -> &[(Handle<BottomLevelAccelerationStructure>, TransformMatrix)] {
        &self.instances
    }

    /// Builds the structure on the host. Blocks until all workers of a deferred build finished.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn build_on_host(
        &mut self,
        device: &Device,
        arena: &Arena<BottomLevelAccelerationStructure>,
    ) -> Result<()> {
        assert_eq!(self.build_type, BuildType::Host, "structure is built on the device");
        self.ensure_instances_built(arena)?;

        let scratch = self
            .scratch
            .as_mut()
            .and_then(Scratch::host_address)
            .ok_or(CtsError::BuildResourcesReleased)?;
        let info = build_info(&self.geometries)
            .dst_acceleration_structure(self.structure.raw())
            .scratch_data(vk::DeviceOrHostAddressKHR {
                host_address: scratch,
            });

        execute_host_build(
            device,
            &self.name,
            &[info],
            &[std::slice::from_ref(&self.range)],
            self.deferred_operation,
            self.worker_threads,
        )?;
        self.built = true;

        Ok(())
    }

    /// Records the build into a command buffer. The builds of the bottom level structures must
    /// be recorded before, followed by a barrier.
    pub fn record_build(
        &mut self,
        encoder: &CommandEncoder,
        arena: &Arena<BottomLevelAccelerationStructure>,
    ) -> Result<()> {
        assert_eq!(self.build_type, BuildType::Device, "structure is built on the host");
        self.ensure_instances_built(arena)?;

        let scratch = self
            .scratch
            .as_ref()
            .and_then(Scratch::device_address)
            .ok_or(CtsError::BuildResourcesReleased)?;
        let info = build_info(&self.geometries)
            .dst_acceleration_structure(self.structure.raw())
            .scratch_data(vk::DeviceOrHostAddressKHR {
                device_address: scratch,
            });

        encoder.build_acceleration_structures(&[info], &[std::slice::from_ref(&self.range)]);
        self.built = true;

        Ok(())
    }

    /// Returns true while the instance data and the scratch memory are alive.
    pub fn has_build_resources(&self) -> bool {
        self.instance_data.is_some() && self.scratch.is_some()
    }

    /// Frees the instance data and the scratch memory. The structure can't be rebuilt afterwards.
    pub fn release_build_resources(&mut self) {
        self.instance_data = None;
        self.scratch = None;
    }

    /// Destroys the structure and gives its references back to the arena. Bottom level
    /// structures without remaining references are dropped.
    pub fn release(self, arena: &mut Arena<BottomLevelAccelerationStructure>) -> Result<()> {
        release_all(&self.instances, arena)
    }

    fn ensure_instances_built(
        &self,
        arena: &Arena<BottomLevelAccelerationStructure>,
    ) -> Result<()> {
        for (handle, _) in self.instances.iter() {
            if !arena.get(*handle)?.is_built() {
                return Err(CtsError::NotBuilt);
            }
        }
        Ok(())
    }
}

fn release_all(
    instances: &[(Handle<BottomLevelAccelerationStructure>, TransformMatrix)],
    arena: &mut Arena<BottomLevelAccelerationStructure>,
) -> Result<()> {
    for (handle, _) in instances.iter() {
        arena.release(*handle)?;
    }
    Ok(())
}

fn build_info<'a>(
    geometries: &'a [vk::AccelerationStructureGeometryKHRBuilder<'static>],
) -> vk::AccelerationStructureBuildGeometryInfoKHRBuilder<'a> {
    vk::AccelerationStructureBuildGeometryInfoKHRBuilder::new()
        ._type(vk::AccelerationStructureTypeKHR::TOP_LEVEL_KHR)
        .flags(vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_TRACE_KHR)
        .mode(vk::BuildAccelerationStructureModeKHR::BUILD_KHR)
        .geometries(geometries)
}

enum InstanceData {
    Host(Vec<InstanceRecord>),
    Device(Buffer),
}

impl InstanceData {
    fn address(&self) -> vk::DeviceOrHostAddressConstKHR {
        match self {
            InstanceData::Host(records) => vk::DeviceOrHostAddressConstKHR {
                host_address: records.as_ptr().cast(),
            },
            InstanceData::Device(buffer) => vk::DeviceOrHostAddressConstKHR {
                device_address: unsafe { buffer.device_address() },
            },
        }
    }
}
