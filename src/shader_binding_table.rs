//! Shader binding tables with one ray generation and many callable records.
use erupt::vk;
#[cfg(feature = "tracing")]
use tracing1::debug;

use crate::acceleration_structure::align_up;
use crate::{Buffer, BufferDescriptor, Device, Lifetime, RayTracingPipeline, Result};

/// A strided device address region of a shader binding table.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct StridedRegion {
    /// Address of the first record.
    pub device_address: u64,
    /// Distance between two records in bytes.
    pub stride: u64,
    /// Size of the region in bytes.
    pub size: u64,
}

impl From<StridedRegion> for vk::StridedDeviceAddressRegionKHR {
    fn from(region: StridedRegion) -> Self {
        vk::StridedDeviceAddressRegionKHR {
            device_address: region.device_address,
            stride: region.stride,
            size: region.size,
        }
    }
}

/// Places the handles of group 0 (ray generation) and groups `1..=callable_count` (callables)
/// into two regions. Each region starts at a multiple of the base alignment and its records
/// are `handle_size` bytes apart.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ShaderBindingTableLayout {
    handle_size: u32,
    base_alignment: u32,
    callable_count: u32,
}

impl ShaderBindingTableLayout {
    /// Creates a new layout.
    pub fn new(handle_size: u32, base_alignment: u32, callable_count: u32) -> Self {
        Self {
            handle_size,
            base_alignment,
            callable_count,
        }
    }

    /// Size of a shader group handle.
    #[inline]
    pub fn handle_size(&self) -> u32 {
        self.handle_size
    }

    /// Total number of shader groups.
    #[inline]
    pub fn group_count(&self) -> u32 {
        self.callable_count + 1
    }

    /// Size of the ray generation region.
    pub fn raygen_size(&self) -> u64 {
        u64::from(self.handle_size)
    }

    /// Size of the callable region.
    pub fn callable_size(&self) -> u64 {
        u64::from(self.handle_size) * u64::from(self.callable_count)
    }

    /// Size of a buffer that can hold a region of the given size at an aligned address,
    /// whatever address the buffer gets.
    pub fn buffer_size(&self, region_size: u64) -> u64 {
        region_size.max(1) + u64::from(self.base_alignment)
    }

    /// The ray generation region of a buffer starting at `buffer_address`.
    pub fn raygen_region(&self, buffer_address: u64) -> StridedRegion {
        StridedRegion {
            device_address: align_up(buffer_address, u64::from(self.base_alignment)),
            stride: u64::from(self.handle_size),
            size: self.raygen_size(),
        }
    }

    /// The callable region of a buffer starting at `buffer_address`.
    pub fn callable_region(&self, buffer_address: u64) -> StridedRegion {
        StridedRegion {
            device_address: align_up(buffer_address, u64::from(self.base_alignment)),
            stride: u64::from(self.handle_size),
            size: self.callable_size(),
        }
    }

    /// Splits the handles of all groups, in program order, into the ray generation record and
    /// the callable records.
    ///
    /// # Panics
    ///
    /// Panics if `handles` doesn't hold exactly one handle per group.
    pub fn split_handles<'a>(&self, handles: &'a [u8]) -> (&'a [u8], &'a [u8]) {
        let handle_size = self.handle_size as usize;
        assert_eq!(
            handles.len(),
            handle_size * self.group_count() as usize,
            "one handle per shader group expected"
        );
        handles.split_at(handle_size)
    }
}

/// The two buffers of a shader binding table and their regions.
#[derive(Debug)]
pub struct ShaderBindingTable {
    raygen_region: StridedRegion,
    callable_region: StridedRegion,
    _raygen: Buffer,
    _callable: Buffer,
}

impl ShaderBindingTable {
    /// Queries the group handles of the pipeline and copies them into two new buffers.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn new(
        device: &Device,
        pipeline: &RayTracingPipeline,
        layout: &ShaderBindingTableLayout,
    ) -> Result<Self> {
        let handles =
            pipeline.shader_group_handles(0, layout.group_count(), layout.handle_size())?;
        let (raygen_handles, callable_handles) = layout.split_handles(&handles);

        let (raygen, raygen_region) = Self::create_region(
            device,
            "Raygen Shader Binding Table",
            layout.buffer_size(layout.raygen_size()),
            raygen_handles,
            |address| layout.raygen_region(address),
        )?;
        let (callable, callable_region) = Self::create_region(
            device,
            "Callable Shader Binding Table",
            layout.buffer_size(layout.callable_size()),
            callable_handles,
            |address| layout.callable_region(address),
        )?;

        #[cfg(feature = "tracing")]
        debug!(
            "Shader binding table: raygen {:?}, callable {:?}",
            raygen_region, callable_region
        );

        Ok(Self {
            raygen_region,
            callable_region,
            _raygen: raygen,
            _callable: callable,
        })
    }

    fn create_region<F>(
        device: &Device,
        name: &str,
        size: u64,
        handles: &[u8],
        region: F,
    ) -> Result<(Buffer, StridedRegion)>
    where
        F: FnOnce(u64) -> StridedRegion,
    {
        let mut buffer = device.create_buffer(&BufferDescriptor {
            name,
            usage: vk::BufferUsageFlags::SHADER_BINDING_TABLE_KHR
                | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
            memory_location: vk_alloc::MemoryLocation::CpuToGpu,
            lifetime: Lifetime::Buffer,
            size,
        })?;

        let address = unsafe { buffer.device_address() };
        let region = region(address);
        let offset = usize::try_from(region.device_address - address)?;
        unsafe { buffer.write_at(offset, handles)? };

        Ok((buffer, region))
    }

    /// The ray generation region.
    #[inline]
    pub fn raygen_region(&self) -> StridedRegion {
        self.raygen_region
    }

    /// The callable region.
    #[inline]
    pub fn callable_region(&self) -> StridedRegion {
        self.callable_region
    }
}
