//! Bottom level acceleration structures over triangle geometries.
use std::ffi::c_void;

use erupt::vk;
#[cfg(feature = "tracing")]
use tracing1::debug;

use crate::acceleration_structure::{align_up, execute_host_build};
use crate::{
    AccelerationStructure, Buffer, BufferDescriptor, BuildType, CommandEncoder, CtsError, Device,
    DeviceCapabilities, GeometryBuilder, Lifetime, Result, Triangle,
};

const VERTEX_STRIDE: u64 = std::mem::size_of::<glam::Vec3>() as u64;
const TRIANGLE_SIZE: u64 = std::mem::size_of::<Triangle>() as u64;

/// Collects triangle geometries for one bottom level acceleration structure.
#[derive(Clone, Debug)]
pub struct BottomLevelBuilder {
    geometries: Vec<Vec<Triangle>>,
    build_type: BuildType,
    deferred_operation: bool,
    worker_threads: u32,
}

impl BottomLevelBuilder {
    /// Creates an empty builder.
    pub fn new(build_type: BuildType) -> Self {
        Self {
            geometries: Vec::new(),
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

    /// Adds one geometry.
    pub fn add_geometry(&mut self, triangles: Vec<Triangle>) {
        self.geometries.push(triangles);
    }

    /// Adds `geometries` geometries of `squares` triangles each, continuing the walk of `walk`.
    pub fn add_geometries(&mut self, walk: &mut GeometryBuilder, geometries: u32, squares: u32) {
        for _ in 0..geometries {
            self.add_geometry(walk.build_geometry(squares));
        }
    }

    /// Number of geometries added so far.
    pub fn geometry_count(&self) -> usize {
        self.geometries.len()
    }

    /// Number of triangles in all geometries.
    pub fn primitive_count(&self) -> usize {
        self.geometries.iter().map(Vec::len).sum()
    }

    /// Returns `NotSupported` if the device can't hold the collected geometries in one structure.
    pub fn check_limits(&self, capabilities: &DeviceCapabilities) -> Result<()> {
        let geometries = u64::try_from(self.geometry_count())?;
        if geometries > capabilities.max_geometry_count {
            return Err(CtsError::NotSupported(format!(
                "maxGeometryCount {} is below {}",
                capabilities.max_geometry_count, geometries
            )));
        }

        let primitives = u64::try_from(self.primitive_count())?;
        if primitives > capabilities.max_primitive_count {
            return Err(CtsError::NotSupported(format!(
                "maxPrimitiveCount {} is below {}",
                capabilities.max_primitive_count, primitives
            )));
        }

        Ok(())
    }

    /// Allocates the structure, its vertex data and its scratch memory. The structure still
    /// needs to be built.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn create(self, device: &Device, name: &str) -> Result<BottomLevelAccelerationStructure> {
        self.check_limits(device.capabilities())?;

        let triangles: Vec<Triangle> = self.geometries.iter().flatten().copied().collect();
        let counts = self
            .geometries
            .iter()
            .map(|geometry| u32::try_from(geometry.len()))
            .collect::<std::result::Result<Vec<u32>, _>>()?;

        let vertices = match self.build_type {
            BuildType::Host => VertexData::Host(triangles),
            BuildType::Device => {
                let mut buffer = device.create_buffer(&BufferDescriptor {
                    name: &format!("{} Vertices", name),
                    usage: vk::BufferUsageFlags::ACCELERATION_STRUCTURE_BUILD_INPUT_READ_ONLY_KHR
                        | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
                    memory_location: vk_alloc::MemoryLocation::CpuToGpu,
                    lifetime: Lifetime::Buffer,
                    size: TRIANGLE_SIZE * u64::try_from(triangles.len())?.max(1),
                })?;
                unsafe { buffer.write(bytemuck::cast_slice(&triangles))? };
                VertexData::Device(buffer)
            }
        };

        let mut geometries = Vec::with_capacity(counts.len());
        let mut offset = 0;
        for count in counts.iter() {
            let vertex_data = vertices.address(offset);
            let triangles = vk::AccelerationStructureGeometryTrianglesDataKHRBuilder::new()
                .vertex_format(vk::Format::R32G32B32_SFLOAT)
                .vertex_data(vertex_data)
                .vertex_stride(VERTEX_STRIDE)
                .max_vertex((3 * count).saturating_sub(1))
                .index_type(vk::IndexType::NONE_KHR);
            geometries.push(
                vk::AccelerationStructureGeometryKHRBuilder::new()
                    .geometry_type(vk::GeometryTypeKHR::TRIANGLES_KHR)
                    .geometry(vk::AccelerationStructureGeometryDataKHR {
                        triangles: triangles.build(),
                    })
                    .flags(vk::GeometryFlagsKHR::OPAQUE_KHR),
            );
            offset += TRIANGLE_SIZE * u64::from(*count);
        }

        let build_type = self.build_type.as_vk();
        let sizes = {
            let info = build_info(&geometries);
            device.acceleration_structure_build_sizes(build_type, &info, &counts)
        };

        #[cfg(feature = "tracing")]
        debug!(
            "{}: {} geometries, {} triangles, {} bytes, {} scratch bytes",
            name,
            counts.len(),
            counts.iter().sum::<u32>(),
            sizes.acceleration_structure_size,
            sizes.build_scratch_size
        );

        let structure = device.create_acceleration_structure(
            name,
            vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL_KHR,
            sizes.acceleration_structure_size,
            memory_location(self.build_type),
        )?;
        let scratch = Scratch::new(device, name, self.build_type, sizes.build_scratch_size)?;

        Ok(BottomLevelAccelerationStructure {
            name: name.to_owned(),
            structure,
            geometries,
            ranges: counts
                .iter()
                .map(|&count| vk::AccelerationStructureBuildRangeInfoKHR {
                    primitive_count: count,
                    primitive_offset: 0,
                    first_vertex: 0,
                    transform_offset: 0,
                })
                .collect(),
            vertices: Some(vertices),
            scratch: Some(scratch),
            build_type: self.build_type,
            deferred_operation: self.deferred_operation,
            worker_threads: self.worker_threads,
            built: false,
        })
    }
}

/// A bottom level acceleration structure. Owns its geometry until the build resources are
/// released.
pub struct BottomLevelAccelerationStructure {
    name: String,
    structure: AccelerationStructure,
    geometries: Vec<vk::AccelerationStructureGeometryKHRBuilder<'static>>,
    ranges: Vec<vk::AccelerationStructureBuildRangeInfoKHR>,
    vertices: Option<VertexData>,
    scratch: Option<Scratch>,
    build_type: BuildType,
    deferred_operation: bool,
    worker_threads: u32,
    built: bool,
}

impl std::fmt::Debug for BottomLevelAccelerationStructure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BottomLevelAccelerationStructure")
            .field("name", &self.name)
            .field("geometries", &self.geometries.len())
            .field("build_type", &self.build_type)
            .field("built", &self.built)
            .finish()
    }
}

impl BottomLevelAccelerationStructure {
    /// The wrapped acceleration structure.
    #[inline]
    pub fn structure(&self) -> &AccelerationStructure {
        &self.structure
    }

    /// Where the structure is built.
    #[inline]
    pub fn build_type(&self) -> BuildType {
        self.build_type
    }

    /// Returns true once the build executed or was recorded.
    #[inline]
    pub fn is_built(&self) -> bool {
        self.built
    }

    /// Number of geometries.
    #[inline]
    pub fn geometry_count(&self) -> usize {
        self.geometries.len()
    }

    /// The value an instance uses to reference this structure.
    pub fn reference(&self) -> u64 {
        self.structure.reference(self.build_type.as_vk())
    }

    /// Builds the structure on the host. Blocks until all workers of a deferred build finished.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn build_on_host(&mut self, device: &Device) -> Result<()> {
        assert_eq!(self.build_type, BuildType::Host, "structure is built on the device");
        let scratch = self
            .scratch
            .as_mut()
            .and_then(Scratch::host_address)
            .ok_or(CtsError::BuildResourcesReleased)?;
        let info = build_info(&self.geometries)
            .dst_acceleration_structure(self.structure.raw())
            .scratch_data(vk::DeviceOrHostAddressKHR { host_address: scratch });

        execute_host_build(
            device,
            &self.name,
            &[info],
            &[self.ranges.as_slice()],
            self.deferred_operation,
            self.worker_threads,
        )?;
        self.built = true;

        Ok(())
    }

    /// Records the build into a command buffer. The build resources must stay alive until the
    /// command buffer finished executing.
    pub fn record_build(&mut self, encoder: &CommandEncoder) -> Result<()> {
        assert_eq!(self.build_type, BuildType::Device, "structure is built on the host");
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

        encoder.build_acceleration_structures(&[info], &[self.ranges.as_slice()]);
        self.built = true;

        Ok(())
    }

    /// Returns true while the vertex data and the scratch memory are alive.
    pub fn has_build_resources(&self) -> bool {
        self.vertices.is_some() && self.scratch.is_some()
    }

    /// Frees the vertex data and the scratch memory. The structure can't be rebuilt afterwards.
    pub fn release_build_resources(&mut self) {
        self.vertices = None;
        self.scratch = None;
    }
}

fn build_info<'a>(
    geometries: &'a [vk::AccelerationStructureGeometryKHRBuilder<'static>],
) -> vk::AccelerationStructureBuildGeometryInfoKHRBuilder<'a> {
    vk::AccelerationStructureBuildGeometryInfoKHRBuilder::new()
        ._type(vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL_KHR)
        .flags(vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_TRACE_KHR)
        .mode(vk::BuildAccelerationStructureModeKHR::BUILD_KHR)
        .geometries(geometries)
}

pub(crate) fn memory_location(build_type: BuildType) -> vk_alloc::MemoryLocation {
    match build_type {
        BuildType::Host => vk_alloc::MemoryLocation::CpuToGpu,
        BuildType::Device => vk_alloc::MemoryLocation::GpuOnly,
    }
}

enum VertexData {
    Host(Vec<Triangle>),
    Device(Buffer),
}

impl VertexData {
    fn address(&self, offset: u64) -> vk::DeviceOrHostAddressConstKHR {
        match self {
            VertexData::Host(triangles) => {
                let bytes: &[u8] = bytemuck::cast_slice(triangles);
                let offset = usize::try_from(offset).unwrap_or(bytes.len()).min(bytes.len());
                vk::DeviceOrHostAddressConstKHR {
                    host_address: bytes[offset..].as_ptr().cast(),
                }
            }
            VertexData::Device(buffer) => vk::DeviceOrHostAddressConstKHR {
                device_address: unsafe { buffer.device_address() } + offset,
            },
        }
    }
}

/// Scratch memory of a build.
pub(crate) enum Scratch {
    Host(Vec<u8>),
    Device { _buffer: Buffer, address: u64 },
}

impl Scratch {
    pub(crate) fn new(
        device: &Device,
        name: &str,
        build_type: BuildType,
        size: u64,
    ) -> Result<Self> {
        match build_type {
            BuildType::Host => Ok(Scratch::Host(vec![0; usize::try_from(size)?])),
            BuildType::Device => {
                let alignment = u64::from(
                    device
                        .capabilities()
                        .min_acceleration_structure_scratch_offset_alignment,
                );
                let buffer = device.create_buffer(&BufferDescriptor {
                    name: &format!("{} Scratch", name),
                    usage: vk::BufferUsageFlags::STORAGE_BUFFER
                        | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
                    memory_location: vk_alloc::MemoryLocation::GpuOnly,
                    lifetime: Lifetime::AccelerationStructure,
                    size: size.max(1) + alignment,
                })?;
                let address = align_up(unsafe { buffer.device_address() }, alignment);
                Ok(Scratch::Device {
                    _buffer: buffer,
                    address,
                })
            }
        }
    }

    pub(crate) fn host_address(&mut self) -> Option<*mut c_void> {
        match self {
            Scratch::Host(data) => Some(data.as_mut_ptr().cast()),
            Scratch::Device { .. } => None,
        }
    }

    pub(crate) fn device_address(&self) -> Option<u64> {
        match self {
            Scratch::Host(_) => None,
            Scratch::Device { address, .. } => Some(*address),
        }
    }
}
