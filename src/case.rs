//! Case definitions and the catalogue of large build cases.
use erupt::vk;

/// Where acceleration structures are built.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BuildType {
    /// Built by the host with `vkBuildAccelerationStructuresKHR`.
    Host,
    /// Built by the device with `vkCmdBuildAccelerationStructuresKHR`.
    Device,
}

impl BuildType {
    /// The group name of the build type.
    pub fn name(&self) -> &'static str {
        match self {
            BuildType::Host => "cpu_built",
            BuildType::Device => "gpu_built",
        }
    }

    /// The Vulkan build type.
    pub fn as_vk(&self) -> vk::AccelerationStructureBuildTypeKHR {
        match self {
            BuildType::Host => vk::AccelerationStructureBuildTypeKHR::HOST_KHR,
            BuildType::Device => vk::AccelerationStructureBuildTypeKHR::DEVICE_KHR,
        }
    }
}

impl std::fmt::Display for BuildType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Immutable parameters of one case.
///
/// `width * height` must equal `squares_group_count * geometries_group_count *
/// instances_group_count`: every pixel gets exactly one triangle and one callable shader.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct CaseDef {
    /// Width of the output image.
    pub width: u32,
    /// Height of the output image.
    pub height: u32,
    /// Triangles per geometry.
    pub squares_group_count: u32,
    /// Geometries per bottom level acceleration structure.
    pub geometries_group_count: u32,
    /// Instances in the top level acceleration structure. Each instance has its own bottom
    /// level acceleration structure.
    pub instances_group_count: u32,
    /// Host builds hand their work to a deferred operation.
    pub deferred_operation: bool,
    /// Where acceleration structures are built.
    pub build_type: BuildType,
    /// Worker threads joining the deferred operation. `u32::MAX` requests the implementation
    /// maximum. Zero joins on the calling thread.
    pub worker_threads_count: u32,
}

impl CaseDef {
    /// Creates a new case definition.
    ///
    /// # Panics
    ///
    /// Panics if the pixel count doesn't match the triangle count.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        width: u32,
        height: u32,
        squares_group_count: u32,
        geometries_group_count: u32,
        instances_group_count: u32,
        deferred_operation: bool,
        build_type: BuildType,
        worker_threads_count: u32,
    ) -> Self {
        let case = Self {
            width,
            height,
            squares_group_count,
            geometries_group_count,
            instances_group_count,
            deferred_operation,
            build_type,
            worker_threads_count,
        };
        case.assert_valid();
        case
    }

    /// Panics if the pixel count doesn't match the triangle count.
    pub fn assert_valid(&self) {
        assert_eq!(
            u64::from(self.width) * u64::from(self.height),
            u64::from(self.squares_group_count)
                * u64::from(self.geometries_group_count)
                * u64::from(self.instances_group_count),
            "pixel count must match the triangle count"
        );
    }

    /// Number of pixels, which is also the number of callable shaders.
    #[inline]
    pub fn pixel_count(&self) -> u32 {
        self.width * self.height
    }

    /// Triangles stored in one bottom level acceleration structure.
    #[inline]
    pub fn primitives_per_bottom_level(&self) -> u32 {
        self.squares_group_count * self.geometries_group_count
    }

    /// A copy that joins deferred operations on the calling thread only.
    pub fn single_threaded(&self) -> Self {
        Self {
            worker_threads_count: 0,
            ..*self
        }
    }

    /// The threading part of the case name.
    pub fn thread_suffix(&self) -> String {
        if !self.deferred_operation {
            "nothreads".to_owned()
        } else if self.worker_threads_count == u32::MAX {
            "maxthreads".to_owned()
        } else {
            format!("{}threads", self.worker_threads_count)
        }
    }

    /// The full case name: `{build type}_{threads}/{squares}`.
    pub fn name(&self) -> String {
        format!(
            "{}_{}/{}",
            self.build_type.name(),
            self.thread_suffix(),
            self.squares_group_count
        )
    }
}

/// A named case of the catalogue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestCase {
    /// The case name.
    pub name: String,
    /// The case parameters.
    pub def: CaseDef,
}

const CATALOGUE_SIZE: u32 = 64;
const SQUARES_GROUP_COUNTS: [u32; 7] = [1, 4, 16, 64, 256, 1024, 4096];
const HOST_THREADS: [(bool, u32); 6] = [
    (false, 0),
    (true, 1),
    (true, 2),
    (true, 4),
    (true, 8),
    (true, u32::MAX),
];

/// The catalogue of large build cases on a 64x64 image.
///
/// Geometries and instances share the remaining factor evenly: both are
/// `sqrt(4096 / squares)`. Host builds are enumerated for every threading variant, device builds
/// only without threads.
pub fn build_large_cases() -> Vec<TestCase> {
    let pixels = CATALOGUE_SIZE * CATALOGUE_SIZE;
    let mut cases = Vec::new();

    for build_type in [BuildType::Host, BuildType::Device] {
        let threads: &[(bool, u32)] = match build_type {
            BuildType::Host => &HOST_THREADS,
            BuildType::Device => &HOST_THREADS[..1],
        };

        for &(deferred_operation, worker_threads_count) in threads {
            for squares in SQUARES_GROUP_COUNTS {
                let side = integer_sqrt(pixels / squares);
                let def = CaseDef::new(
                    CATALOGUE_SIZE,
                    CATALOGUE_SIZE,
                    squares,
                    side,
                    side,
                    deferred_operation,
                    build_type,
                    worker_threads_count,
                );
                cases.push(TestCase {
                    name: def.name(),
                    def,
                });
            }
        }
    }

    cases
}

fn integer_sqrt(value: u32) -> u32 {
    let mut root = 0;
    while (root + 1) * (root + 1) <= value {
        root += 1;
    }
    root
}
