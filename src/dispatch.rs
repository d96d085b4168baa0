//! One complete build, trace and read back cycle of a case.
use std::ffi::CString;

use erupt::vk;
#[cfg(feature = "tracing")]
use tracing1::{debug, info};

use crate::validator::values_from_bytes;
use crate::{
    check_support, compile_all, Arena, BottomLevelAccelerationStructure, BottomLevelBuilder,
    Buffer, BufferDescriptor, BuildType, CaseDef, CaseExecutor, CommandEncoder, DescriptorSet,
    Device, GeometryBuilder, Handle, Image, ImageDescriptor, Lifetime, PipelineLayout,
    PipelineShaders, RayTracingPipeline, Result, ResultValidator, ShaderBindingTable,
    ShaderBindingTableLayout, ShaderCompiler, TopLevelAccelerationStructure, TopLevelBuilder,
    TransformMatrix,
};

/// Value every texel of the output image is cleared to before tracing.
pub const CLEAR_VALUE: u32 = 0xFF;

const OUTPUT_FORMAT: vk::Format = vk::Format::R32_UINT;
const IMAGE_BINDING: u32 = 0;
const ACCELERATION_STRUCTURE_BINDING: u32 = 1;

/// Runs cases on a device. Every run allocates its own resources and frees them before
/// returning.
pub struct DispatchOrchestrator<'a, C: ShaderCompiler + ?Sized> {
    device: &'a Device,
    compiler: &'a C,
}

impl<'a, C: ShaderCompiler + ?Sized> std::fmt::Debug for DispatchOrchestrator<'a, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchOrchestrator").finish()
    }
}

impl<'a, C: ShaderCompiler + ?Sized> DispatchOrchestrator<'a, C> {
    /// Creates an orchestrator that compiles its shaders with `compiler`.
    pub fn new(device: &'a Device, compiler: &'a C) -> Self {
        Self { device, compiler }
    }

    /// Builds the acceleration structures, traces one ray per pixel and returns the output
    /// image, row by row.
    ///
    /// Returns `NotSupported` before any resource is created if the device can't run the case.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn run(&self, case: &CaseDef) -> Result<Vec<u32>> {
        case.assert_valid();
        check_support(self.device.capabilities(), case)?;

        #[cfg(feature = "tracing")]
        info!(
            "Running {} with {} worker threads",
            case.name(),
            case.worker_threads_count
        );

        let descriptor_set_layout = self.device.create_descriptor_set_layout(
            "Descriptor Set Layout",
            &[
                vk::DescriptorSetLayoutBindingBuilder::new()
                    .binding(IMAGE_BINDING)
                    .descriptor_type(vk::DescriptorType::STORAGE_IMAGE)
                    .descriptor_count(1)
                    .stage_flags(vk::ShaderStageFlags::RAYGEN_KHR),
                vk::DescriptorSetLayoutBindingBuilder::new()
                    .binding(ACCELERATION_STRUCTURE_BINDING)
                    .descriptor_type(vk::DescriptorType::ACCELERATION_STRUCTURE_KHR)
                    .descriptor_count(1)
                    .stage_flags(vk::ShaderStageFlags::RAYGEN_KHR),
            ],
        )?;
        let pipeline_layout = self
            .device
            .create_pipeline_layout("Pipeline Layout", &[&descriptor_set_layout])?;

        let pipeline = self.create_pipeline(case, &pipeline_layout)?;

        let capabilities = self.device.capabilities();
        let table_layout = ShaderBindingTableLayout::new(
            capabilities.shader_group_handle_size,
            capabilities.shader_group_base_alignment,
            case.pixel_count(),
        );
        let table = ShaderBindingTable::new(self.device, &pipeline, &table_layout)?;

        let image = self.device.create_image(&ImageDescriptor {
            name: "Output Image",
            usage: vk::ImageUsageFlags::STORAGE
                | vk::ImageUsageFlags::TRANSFER_SRC
                | vk::ImageUsageFlags::TRANSFER_DST,
            memory_location: vk_alloc::MemoryLocation::GpuOnly,
            format: OUTPUT_FORMAT,
            width: case.width,
            height: case.height,
        })?;
        let image_view = self.device.create_image_view("Output Image View", &image)?;

        let byte_size = u64::from(case.pixel_count()) * std::mem::size_of::<u32>() as u64;
        let read_back = self.device.create_buffer(&BufferDescriptor {
            name: "Read Back Buffer",
            usage: vk::BufferUsageFlags::TRANSFER_DST,
            memory_location: vk_alloc::MemoryLocation::GpuToCpu,
            lifetime: Lifetime::Buffer,
            size: byte_size,
        })?;

        let mut arena = Arena::new();
        let mut top_level = self.create_acceleration_structures(case, &mut arena)?;

        if case.build_type == BuildType::Host {
            build_on_host(self.device, &mut top_level, &mut arena)?;
        }

        let descriptor_pool = self.device.create_descriptor_pool(
            "Descriptor Pool",
            &[
                vk::DescriptorPoolSizeBuilder::new()
                    ._type(vk::DescriptorType::STORAGE_IMAGE)
                    .descriptor_count(1),
                vk::DescriptorPoolSizeBuilder::new()
                    ._type(vk::DescriptorType::ACCELERATION_STRUCTURE_KHR)
                    .descriptor_count(1),
            ],
            1,
        )?;
        let descriptor_set =
            descriptor_pool.create_descriptor_set("Descriptor Set", &descriptor_set_layout)?;
        descriptor_set.write_storage_image(IMAGE_BINDING, &image_view, vk::ImageLayout::GENERAL);
        descriptor_set
            .write_acceleration_structure(ACCELERATION_STRUCTURE_BINDING, top_level.structure());

        let mut command_pool = self.device.create_command_pool("Command Pool")?;
        let command_buffer = command_pool.create_command_buffer()?;
        let fence = self.device.create_fence("Submit Fence")?;

        command_buffer.record(|encoder| {
            prepare_image(encoder, &image);

            if case.build_type == BuildType::Device {
                record_builds(encoder, &mut top_level, &mut arena)?;
            }

            trace(
                encoder,
                &pipeline,
                &pipeline_layout,
                &descriptor_set,
                &table,
                case,
            );
            read_back_image(encoder, &image, &read_back);

            Ok(())
        })?;

        self.device
            .queue()
            .submit_and_wait(&command_buffer, &fence)?;

        let values = read_values(&read_back, byte_size)?;

        top_level.release(&mut arena)?;
        #[cfg(feature = "tracing")]
        debug!(
            "{} bottom level structures left after release",
            arena.len()
        );

        Ok(values)
    }

    /// Compiles the ray generation shader and one callable shader per pixel. Every shader gets
    /// its own module and every callable its own shader group.
    fn create_pipeline(
        &self,
        case: &CaseDef,
        layout: &PipelineLayout,
    ) -> Result<RayTracingPipeline> {
        let shaders = PipelineShaders::new(case.width, case.height);

        #[cfg(feature = "tracing")]
        debug!("Compiling {} callable shaders", shaders.callable_count());

        let codes = compile_all(self.compiler, &shaders.sources)?;
        let modules = shaders
            .sources
            .iter()
            .zip(codes.iter())
            .map(|(source, code)| {
                self.device
                    .create_shader_module(&format!("{} Shader Module", source.name), code)
            })
            .collect::<Result<Vec<_>>>()?;

        let entry_point = CString::new("main")?;
        let stages: Vec<vk::PipelineShaderStageCreateInfoBuilder> = shaders
            .sources
            .iter()
            .zip(modules.iter())
            .map(|(source, module)| {
                vk::PipelineShaderStageCreateInfoBuilder::new()
                    .stage(source.stage.as_vk())
                    .module(module.raw())
                    .name(&entry_point)
            })
            .collect();

        let groups: Vec<vk::RayTracingShaderGroupCreateInfoKHRBuilder> = shaders
            .group_stages
            .iter()
            .map(|&stage| {
                vk::RayTracingShaderGroupCreateInfoKHRBuilder::new()
                    ._type(vk::RayTracingShaderGroupTypeKHR::GENERAL_KHR)
                    .general_shader(stage)
                    .closest_hit_shader(vk::SHADER_UNUSED_KHR)
                    .intersection_shader(vk::SHADER_UNUSED_KHR)
                    .any_hit_shader(vk::SHADER_UNUSED_KHR)
            })
            .collect();

        self.device
            .create_ray_tracing_pipeline("Ray Tracing Pipeline", layout, &stages, &groups)
    }

    /// Creates one bottom level structure per instance from a shared geometry walk and the top
    /// level structure instancing them with identity transforms. The top level structure holds
    /// the only reference on every bottom level structure.
    fn create_acceleration_structures(
        &self,
        case: &CaseDef,
        arena: &mut Arena<BottomLevelAccelerationStructure>,
    ) -> Result<TopLevelAccelerationStructure> {
        let mut walk = GeometryBuilder::new(case.width, case.height);
        let mut top_level = TopLevelBuilder::new(case.build_type)
            .deferred(case.deferred_operation, case.worker_threads_count);

        for index in 0..case.instances_group_count {
            let mut builder = BottomLevelBuilder::new(case.build_type)
                .deferred(case.deferred_operation, case.worker_threads_count);
            builder.add_geometries(
                &mut walk,
                case.geometries_group_count,
                case.squares_group_count,
            );
            let bottom_level = builder.create(self.device, &format!("Bottom Level {}", index))?;

            let handle = arena.insert(bottom_level);
            top_level.add_instance(arena, handle, TransformMatrix::IDENTITY)?;
            arena.release(handle)?;
        }

        top_level.create(self.device, arena, "Top Level")
    }
}

impl<'a, C: ShaderCompiler + ?Sized> CaseExecutor for DispatchOrchestrator<'a, C> {
    fn execute(&self, case: &CaseDef) -> Result<u64> {
        let values = self.run(case)?;
        Ok(ResultValidator::new(case.width, case.height).count_failures(&values))
    }
}

fn instance_handles(
    top_level: &TopLevelAccelerationStructure,
) -> Vec<Handle<BottomLevelAccelerationStructure>> {
    top_level
        .instances()
        .iter()
        .map(|(handle, _)| *handle)
        .collect()
}

fn build_on_host(
    device: &Device,
    top_level: &mut TopLevelAccelerationStructure,
    arena: &mut Arena<BottomLevelAccelerationStructure>,
) -> Result<()> {
    for handle in instance_handles(top_level) {
        let bottom_level = arena.get_mut(handle)?;
        bottom_level.build_on_host(device)?;
        bottom_level.release_build_resources();
    }
    top_level.build_on_host(device, arena)?;
    top_level.release_build_resources();

    Ok(())
}

fn record_builds(
    encoder: &CommandEncoder,
    top_level: &mut TopLevelAccelerationStructure,
    arena: &mut Arena<BottomLevelAccelerationStructure>,
) -> Result<()> {
    for handle in instance_handles(top_level) {
        arena.get_mut(handle)?.record_build(encoder)?;
    }
    encoder.memory_barrier(
        vk::PipelineStageFlags::ACCELERATION_STRUCTURE_BUILD_KHR,
        vk::AccessFlags::ACCELERATION_STRUCTURE_WRITE_KHR,
        vk::PipelineStageFlags::ACCELERATION_STRUCTURE_BUILD_KHR,
        vk::AccessFlags::ACCELERATION_STRUCTURE_READ_KHR,
    );

    top_level.record_build(encoder, arena)?;
    encoder.memory_barrier(
        vk::PipelineStageFlags::ACCELERATION_STRUCTURE_BUILD_KHR,
        vk::AccessFlags::ACCELERATION_STRUCTURE_WRITE_KHR,
        vk::PipelineStageFlags::RAY_TRACING_SHADER_KHR,
        vk::AccessFlags::ACCELERATION_STRUCTURE_READ_KHR,
    );

    Ok(())
}

/// Clears the image to the sentinel and moves it into the layout for shader stores.
fn prepare_image(encoder: &CommandEncoder, image: &Image) {
    encoder.image_barrier(
        image,
        vk::PipelineStageFlags::TOP_OF_PIPE,
        vk::AccessFlags::empty(),
        vk::ImageLayout::UNDEFINED,
        vk::PipelineStageFlags::TRANSFER,
        vk::AccessFlags::TRANSFER_WRITE,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
    );
    encoder.clear_color_image(
        image,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        [CLEAR_VALUE; 4],
    );
    encoder.image_barrier(
        image,
        vk::PipelineStageFlags::TRANSFER,
        vk::AccessFlags::TRANSFER_WRITE,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        vk::PipelineStageFlags::RAY_TRACING_SHADER_KHR,
        vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE,
        vk::ImageLayout::GENERAL,
    );
}

fn trace(
    encoder: &CommandEncoder,
    pipeline: &RayTracingPipeline,
    layout: &PipelineLayout,
    descriptor_set: &DescriptorSet,
    table: &ShaderBindingTable,
    case: &CaseDef,
) {
    encoder.bind_ray_tracing_pipeline(pipeline);
    encoder.bind_ray_tracing_descriptor_sets(layout, 0, &[descriptor_set]);
    encoder.trace_rays(table, case.width, case.height, 1);
}

fn read_back_image(encoder: &CommandEncoder, image: &Image, buffer: &Buffer) {
    encoder.image_barrier(
        image,
        vk::PipelineStageFlags::RAY_TRACING_SHADER_KHR,
        vk::AccessFlags::SHADER_WRITE,
        vk::ImageLayout::GENERAL,
        vk::PipelineStageFlags::TRANSFER,
        vk::AccessFlags::TRANSFER_READ,
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
    );
    encoder.copy_image_to_buffer(image, vk::ImageLayout::TRANSFER_SRC_OPTIMAL, buffer.raw());
    encoder.memory_barrier(
        vk::PipelineStageFlags::TRANSFER,
        vk::AccessFlags::TRANSFER_WRITE,
        vk::PipelineStageFlags::HOST,
        vk::AccessFlags::HOST_READ,
    );
}

fn read_values(buffer: &Buffer, byte_size: u64) -> Result<Vec<u32>> {
    let bytes = unsafe { buffer.read(usize::try_from(byte_size)?)? };
    Ok(values_from_bytes(&bytes))
}
