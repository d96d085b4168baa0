//! Implements the ray tracing capable device.
use std::ffi::CStr;
use std::os::raw::c_char;
use std::sync::Arc;

use erupt::{vk, ExtendableFromConst, ExtendableFromMut};
#[cfg(feature = "tracing")]
use tracing1::{error, info};

use crate::context::Context;
use crate::deferred_operation::build_on_host;
use crate::memory_allocator::MemoryAllocator;
use crate::{
    AccelerationStructure, Buffer, BufferDescriptor, CommandPool, CtsError, DeferredOperation,
    DescriptorPool, DescriptorSetLayout, DeviceCapabilities, Fence, Image, ImageDescriptor,
    ImageView, Instance, Lifetime, PipelineLayout, Queue, RayTracingPipeline, Result,
    ShaderModule,
};

/// Defines the configuration of the device.
#[derive(Clone, Debug)]
pub struct DeviceConfiguration {
    /// The device type that is requested. Falls back to the other GPU type.
    pub device_type: vk::PhysicalDeviceType,
    /// Additional device extensions to load. Unavailable extensions are skipped.
    pub extensions: Vec<*const c_char>,
}

impl Default for DeviceConfiguration {
    fn default() -> Self {
        Self {
            device_type: vk::PhysicalDeviceType::DISCRETE_GPU,
            extensions: vec![],
        }
    }
}

/// A Vulkan device with the ray tracing extensions enabled that the physical device exposes.
#[derive(Debug)]
pub struct Device {
    capabilities: DeviceCapabilities,
    queue: Queue,
    memory_allocator: Arc<MemoryAllocator>,
    context: Arc<Context>,
}

impl Drop for Device {
    fn drop(&mut self) {
        let result = unsafe { self.context.device.device_wait_idle() }.result();
        if let Err(err) = result {
            #[cfg(feature = "tracing")]
            error!("Unable to wait for the device to become idle: {}", err);
            #[cfg(not(feature = "tracing"))]
            let _ = err;
        }
    }
}

impl Device {
    /// Creates a new device with one universal queue.
    ///
    /// Missing ray tracing extensions or features don't fail the creation. They are reported
    /// by [`Device::capabilities`].
    pub(crate) fn new(instance: Instance, configuration: DeviceConfiguration) -> Result<Self> {
        let selection = instance.find_physical_device(configuration.device_type)?;
        let physical_device = selection.raw;

        #[cfg(feature = "tracing")]
        {
            let name = unsafe { CStr::from_ptr(selection.properties.device_name.as_ptr()) }
                .to_str()?;
            info!(
                "Selected physical device: {} ({:?})",
                name, selection.properties.device_type
            );
        }

        let present = instance.device_extension_properties(physical_device)?;
        let has_extension = |name: *const c_char| {
            let name = unsafe { CStr::from_ptr(name) };
            present
                .iter()
                .any(|ext| unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) } == name)
        };

        let has_acceleration_structure = has_extension(vk::KHR_ACCELERATION_STRUCTURE_EXTENSION_NAME)
            && has_extension(vk::KHR_DEFERRED_HOST_OPERATIONS_EXTENSION_NAME);
        let has_ray_tracing_pipeline = has_acceleration_structure
            && has_extension(vk::KHR_RAY_TRACING_PIPELINE_EXTENSION_NAME);

        let mut extensions = configuration.extensions.clone();
        if has_acceleration_structure {
            extensions.push(vk::KHR_ACCELERATION_STRUCTURE_EXTENSION_NAME);
            extensions.push(vk::KHR_DEFERRED_HOST_OPERATIONS_EXTENSION_NAME);
        }
        if has_ray_tracing_pipeline {
            extensions.push(vk::KHR_RAY_TRACING_PIPELINE_EXTENSION_NAME);
        }
        Instance::retain_extensions(&present, &mut extensions);

        #[cfg(feature = "tracing")]
        Instance::print_extensions("device", &extensions)?;

        // Query what the extensions support.
        let mut supported_v1_2 = vk::PhysicalDeviceVulkan12FeaturesBuilder::new();
        let mut supported_acceleration_structure =
            vk::PhysicalDeviceAccelerationStructureFeaturesKHRBuilder::new();
        let mut supported_ray_tracing_pipeline =
            vk::PhysicalDeviceRayTracingPipelineFeaturesKHRBuilder::new();
        let mut supported = vk::PhysicalDeviceFeatures2Builder::new().extend_from(&mut supported_v1_2);
        if has_acceleration_structure {
            supported = supported.extend_from(&mut supported_acceleration_structure);
        }
        if has_ray_tracing_pipeline {
            supported = supported.extend_from(&mut supported_ray_tracing_pipeline);
        }
        unsafe {
            instance
                .raw()
                .get_physical_device_features2(physical_device, Some(supported.build()))
        };

        let buffer_device_address = supported_v1_2.buffer_device_address != vk::FALSE;
        let acceleration_structure = has_acceleration_structure
            && supported_acceleration_structure.acceleration_structure != vk::FALSE;
        let host_commands = acceleration_structure
            && supported_acceleration_structure.acceleration_structure_host_commands != vk::FALSE;
        let ray_tracing_pipeline = has_ray_tracing_pipeline
            && supported_ray_tracing_pipeline.ray_tracing_pipeline != vk::FALSE;

        let queue_priorities = [1.0];
        let queue_infos = [vk::DeviceQueueCreateInfoBuilder::new()
            .queue_family_index(selection.queue_family_index)
            .queue_priorities(&queue_priorities)];

        let enabled_v1_2 =
            vk::PhysicalDeviceVulkan12FeaturesBuilder::new().buffer_device_address(buffer_device_address);
        let enabled_acceleration_structure =
            vk::PhysicalDeviceAccelerationStructureFeaturesKHRBuilder::new()
                .acceleration_structure(acceleration_structure)
                .acceleration_structure_host_commands(host_commands);
        let enabled_ray_tracing_pipeline =
            vk::PhysicalDeviceRayTracingPipelineFeaturesKHRBuilder::new()
                .ray_tracing_pipeline(ray_tracing_pipeline);

        let mut device_create_info = vk::DeviceCreateInfoBuilder::new()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extensions)
            .extend_from(&enabled_v1_2);
        if has_acceleration_structure {
            device_create_info = device_create_info.extend_from(&enabled_acceleration_structure);
        }
        if has_ray_tracing_pipeline {
            device_create_info = device_create_info.extend_from(&enabled_ray_tracing_pipeline);
        }

        let device = unsafe {
            erupt::DeviceLoader::new(instance.raw(), physical_device, &device_create_info, None)
        }
        .map_err(|err| {
            #[cfg(feature = "tracing")]
            error!("Unable to create the logical device: {}", err);
            CtsError::LoaderError(err)
        })?;

        let capabilities = Self::query_capabilities(
            &instance,
            physical_device,
            has_acceleration_structure,
            has_ray_tracing_pipeline,
            DeviceCapabilities {
                acceleration_structure,
                ray_tracing_pipeline,
                deferred_host_operations: has_acceleration_structure,
                acceleration_structure_host_commands: host_commands,
                buffer_device_address,
                ..Default::default()
            },
        );

        #[cfg(feature = "tracing")]
        capabilities.log();

        let allocator = unsafe {
            vk_alloc::Allocator::new(
                instance.raw(),
                physical_device,
                &vk_alloc::AllocatorDescriptor::default(),
            )
        }?;

        let raw_queue = unsafe { device.get_device_queue(selection.queue_family_index, 0) };

        let context = Arc::new(Context {
            device,
            physical_device,
            instance,
        });
        let memory_allocator = Arc::new(MemoryAllocator::new(allocator, context.clone()));
        let queue = Queue::new(raw_queue, selection.queue_family_index, context.clone());

        #[cfg(feature = "tracing")]
        info!("Created logical device and queue");

        Ok(Self {
            capabilities,
            queue,
            memory_allocator,
            context,
        })
    }

    fn query_capabilities(
        instance: &Instance,
        physical_device: vk::PhysicalDevice,
        has_acceleration_structure: bool,
        has_ray_tracing_pipeline: bool,
        capabilities: DeviceCapabilities,
    ) -> DeviceCapabilities {
        let mut acceleration_structure_properties =
            vk::PhysicalDeviceAccelerationStructurePropertiesKHRBuilder::new();
        let mut ray_tracing_pipeline_properties =
            vk::PhysicalDeviceRayTracingPipelinePropertiesKHRBuilder::new();
        let mut properties = vk::PhysicalDeviceProperties2Builder::new();
        if has_acceleration_structure {
            properties = properties.extend_from(&mut acceleration_structure_properties);
        }
        if has_ray_tracing_pipeline {
            properties = properties.extend_from(&mut ray_tracing_pipeline_properties);
        }
        let properties = unsafe {
            instance
                .raw()
                .get_physical_device_properties2(physical_device, Some(properties.build()))
        };

        DeviceCapabilities {
            max_primitive_count: acceleration_structure_properties.max_primitive_count,
            max_geometry_count: acceleration_structure_properties.max_geometry_count,
            max_instance_count: acceleration_structure_properties.max_instance_count,
            max_memory_allocation_count: properties.properties.limits.max_memory_allocation_count,
            shader_group_handle_size: ray_tracing_pipeline_properties.shader_group_handle_size,
            shader_group_base_alignment: ray_tracing_pipeline_properties
                .shader_group_base_alignment,
            min_acceleration_structure_scratch_offset_alignment:
                acceleration_structure_properties
                    .min_acceleration_structure_scratch_offset_alignment,
            max_ray_dispatch_invocation_count: ray_tracing_pipeline_properties
                .max_ray_dispatch_invocation_count,
            ..capabilities
        }
    }

    /// The ray tracing capabilities of the device.
    #[inline]
    pub fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    /// The universal queue.
    #[inline]
    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    /// Number of errors the validation layers reported so far. Always zero in release builds.
    pub fn validation_error_count(&self) -> u64 {
        #[cfg(debug_assertions)]
        {
            crate::vk_debug::validation_error_count()
        }
        #[cfg(not(debug_assertions))]
        {
            0
        }
    }

    /// Creates a new buffer and binds memory of the requested location to it.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<Buffer> {
        let create_info = vk::BufferCreateInfoBuilder::new()
            .usage(descriptor.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .size(descriptor.size);

        let raw = unsafe { self.context.device.create_buffer(&create_info, None) }
            .result()
            .map_err(|err| {
                #[cfg(feature = "tracing")]
                error!("Unable to create a buffer: {}", err);
                CtsError::VkResult(err)
            })?;

        self.context
            .set_object_name(descriptor.name, vk::ObjectType::BUFFER, raw.0)?;

        let allocation = unsafe {
            self.memory_allocator.allocator.allocate_memory_for_buffer(
                &self.context.device,
                raw,
                descriptor.memory_location,
                descriptor.lifetime,
            )
        }?;

        unsafe {
            self.context.device.bind_buffer_memory(
                raw,
                allocation.device_memory(),
                allocation.offset(),
            )
        }
        .result()
        .map_err(|err| {
            #[cfg(feature = "tracing")]
            error!("Unable to bind buffer memory: {}", err);
            CtsError::VkResult(err)
        })?;

        Ok(Buffer::new(
            raw,
            descriptor.size,
            allocation,
            self.memory_allocator.clone(),
            self.context.clone(),
        ))
    }

    /// Creates a new two dimensional image with one mip level and one layer.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn create_image(&self, descriptor: &ImageDescriptor) -> Result<Image> {
        let extent = vk::Extent3D {
            width: descriptor.width,
            height: descriptor.height,
            depth: 1,
        };
        let create_info = vk::ImageCreateInfoBuilder::new()
            .image_type(vk::ImageType::_2D)
            .format(descriptor.format)
            .extent(extent)
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlagBits::_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(descriptor.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let raw = unsafe { self.context.device.create_image(&create_info, None) }
            .result()
            .map_err(|err| {
                #[cfg(feature = "tracing")]
                error!("Unable to create an image: {}", err);
                CtsError::VkResult(err)
            })?;

        self.context
            .set_object_name(descriptor.name, vk::ObjectType::IMAGE, raw.0)?;

        let allocation = unsafe {
            self.memory_allocator.allocator.allocate_memory_for_image(
                &self.context.device,
                raw,
                descriptor.memory_location,
                Lifetime::Image,
                true,
            )
        }?;

        unsafe {
            self.context.device.bind_image_memory(
                raw,
                allocation.device_memory(),
                allocation.offset(),
            )
        }
        .result()
        .map_err(|err| {
            #[cfg(feature = "tracing")]
            error!("Unable to bind image memory: {}", err);
            CtsError::VkResult(err)
        })?;

        Ok(Image::new(
            raw,
            descriptor.format,
            extent,
            allocation,
            self.memory_allocator.clone(),
            self.context.clone(),
        ))
    }

    /// Creates a new view of the whole color subresource of a two dimensional image.
    pub fn create_image_view(&self, name: &str, image: &Image) -> Result<ImageView> {
        let create_info = vk::ImageViewCreateInfoBuilder::new()
            .image(image.raw())
            .view_type(vk::ImageViewType::_2D)
            .format(image.format())
            .subresource_range(image.subresource_range());

        let raw = unsafe { self.context.device.create_image_view(&create_info, None) }
            .result()
            .map_err(|err| {
                #[cfg(feature = "tracing")]
                error!("Unable to create an image view: {}", err);
                CtsError::VkResult(err)
            })?;

        self.context
            .set_object_name(name, vk::ObjectType::IMAGE_VIEW, raw.0)?;

        Ok(ImageView::new(raw, self.context.clone()))
    }

    /// Creates an acceleration structure and the buffer that stores it. Host built structures
    /// need host visible storage.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn create_acceleration_structure(
        &self,
        name: &str,
        ty: vk::AccelerationStructureTypeKHR,
        size: u64,
        memory_location: vk_alloc::MemoryLocation,
    ) -> Result<AccelerationStructure> {
        let storage = self.create_buffer(&BufferDescriptor {
            name: &format!("{} Storage", name),
            usage: vk::BufferUsageFlags::ACCELERATION_STRUCTURE_STORAGE_KHR
                | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
            memory_location,
            lifetime: Lifetime::AccelerationStructure,
            size,
        })?;

        let create_info = vk::AccelerationStructureCreateInfoKHRBuilder::new()
            .buffer(storage.raw())
            .offset(0)
            .size(size)
            ._type(ty);

        let raw = unsafe {
            self.context
                .device
                .create_acceleration_structure_khr(&create_info, None)
        }
        .result()
        .map_err(|err| {
            #[cfg(feature = "tracing")]
            error!("Unable to create an acceleration structure: {}", err);
            CtsError::VkResult(err)
        })?;

        self.context
            .set_object_name(name, vk::ObjectType::ACCELERATION_STRUCTURE_KHR, raw.0)?;

        Ok(AccelerationStructure::new(
            raw,
            ty,
            storage,
            self.context.clone(),
        ))
    }

    /// Retrieve the required size for an acceleration structure.
    #[doc = "[Vulkan Manual Page](https://www.khronos.org/registry/vulkan/specs/1.2-extensions/man/html/vkGetAccelerationStructureBuildSizesKHR.html)"]
    pub fn acceleration_structure_build_sizes(
        &self,
        build_type: vk::AccelerationStructureBuildTypeKHR,
        build_info: &vk::AccelerationStructureBuildGeometryInfoKHRBuilder,
        max_primitive_counts: &[u32],
    ) -> vk::AccelerationStructureBuildSizesInfoKHR {
        unsafe {
            self.context.device.get_acceleration_structure_build_sizes_khr(
                build_type,
                build_info,
                max_primitive_counts,
            )
        }
    }

    /// Build acceleration structures on the host without a deferred operation.
    #[doc = "[Vulkan Manual Page](https://www.khronos.org/registry/vulkan/specs/1.2-extensions/man/html/vkBuildAccelerationStructuresKHR.html)"]
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn build_acceleration_structures(
        &self,
        infos: &[vk::AccelerationStructureBuildGeometryInfoKHRBuilder],
        build_range_infos: &[&[vk::AccelerationStructureBuildRangeInfoKHR]],
    ) -> Result<()> {
        build_on_host(&self.context, None, infos, build_range_infos)?;
        Ok(())
    }

    /// Creates a new deferred operation.
    #[doc = "[Vulkan Manual Page](https://www.khronos.org/registry/vulkan/specs/1.2-extensions/man/html/vkCreateDeferredOperationKHR.html)"]
    pub fn create_deferred_operation(&self, name: &str) -> Result<DeferredOperation> {
        let raw = unsafe { self.context.device.create_deferred_operation_khr(None) }
            .result()
            .map_err(|err| {
                #[cfg(feature = "tracing")]
                error!("Unable to create a deferred operation: {}", err);
                CtsError::VkResult(err)
            })?;

        self.context
            .set_object_name(name, vk::ObjectType::DEFERRED_OPERATION_KHR, raw.0)?;

        Ok(DeferredOperation::new(raw, self.context.clone()))
    }

    /// Creates a new command pool for the universal queue.
    pub fn create_command_pool(&self, name: &str) -> Result<CommandPool> {
        CommandPool::new(self.context.clone(), name, self.queue.family_index())
    }

    /// Creates a new unsignaled fence.
    pub fn create_fence(&self, name: &str) -> Result<Fence> {
        let create_info = vk::FenceCreateInfoBuilder::new();
        let raw = unsafe { self.context.device.create_fence(&create_info, None) }
            .result()
            .map_err(|err| {
                #[cfg(feature = "tracing")]
                error!("Unable to create a fence: {}", err);
                CtsError::VkResult(err)
            })?;

        self.context
            .set_object_name(name, vk::ObjectType::FENCE, raw.0)?;

        Ok(Fence::new(raw, self.context.clone()))
    }

    /// Creates a new descriptor set layout.
    pub fn create_descriptor_set_layout(
        &self,
        name: &str,
        bindings: &[vk::DescriptorSetLayoutBindingBuilder],
    ) -> Result<DescriptorSetLayout> {
        let create_info = vk::DescriptorSetLayoutCreateInfoBuilder::new().bindings(bindings);
        let raw = unsafe {
            self.context
                .device
                .create_descriptor_set_layout(&create_info, None)
        }
        .result()
        .map_err(|err| {
            #[cfg(feature = "tracing")]
            error!("Unable to create a descriptor set layout: {}", err);
            CtsError::VkResult(err)
        })?;

        self.context
            .set_object_name(name, vk::ObjectType::DESCRIPTOR_SET_LAYOUT, raw.0)?;

        Ok(DescriptorSetLayout::new(raw, self.context.clone()))
    }

    /// Creates a new descriptor pool.
    pub fn create_descriptor_pool(
        &self,
        name: &str,
        pool_sizes: &[vk::DescriptorPoolSizeBuilder],
        max_sets: u32,
    ) -> Result<DescriptorPool> {
        let create_info = vk::DescriptorPoolCreateInfoBuilder::new()
            .pool_sizes(pool_sizes)
            .max_sets(max_sets);
        let raw = unsafe {
            self.context
                .device
                .create_descriptor_pool(&create_info, None)
        }
        .result()
        .map_err(|err| {
            #[cfg(feature = "tracing")]
            error!("Unable to create a descriptor pool: {}", err);
            CtsError::VkResult(err)
        })?;

        self.context
            .set_object_name(name, vk::ObjectType::DESCRIPTOR_POOL, raw.0)?;

        Ok(DescriptorPool::new(raw, self.context.clone()))
    }

    /// Creates a new pipeline layout without push constants.
    pub fn create_pipeline_layout(
        &self,
        name: &str,
        set_layouts: &[&DescriptorSetLayout],
    ) -> Result<PipelineLayout> {
        let set_layouts: Vec<vk::DescriptorSetLayout> =
            set_layouts.iter().map(|layout| layout.raw()).collect();
        let create_info = vk::PipelineLayoutCreateInfoBuilder::new().set_layouts(&set_layouts);
        let raw = unsafe {
            self.context
                .device
                .create_pipeline_layout(&create_info, None)
        }
        .result()
        .map_err(|err| {
            #[cfg(feature = "tracing")]
            error!("Unable to create a pipeline layout: {}", err);
            CtsError::VkResult(err)
        })?;

        self.context
            .set_object_name(name, vk::ObjectType::PIPELINE_LAYOUT, raw.0)?;

        Ok(PipelineLayout::new(raw, self.context.clone()))
    }

    /// Creates a new shader module using the provided SPIR-V code.
    pub fn create_shader_module(&self, name: &str, code: &[u32]) -> Result<ShaderModule> {
        let create_info = vk::ShaderModuleCreateInfoBuilder::new().code(code);
        let raw = unsafe { self.context.device.create_shader_module(&create_info, None) }
            .result()
            .map_err(|err| {
                #[cfg(feature = "tracing")]
                error!("Unable to create a shader module: {}", err);
                CtsError::VkResult(err)
            })?;

        self.context
            .set_object_name(name, vk::ObjectType::SHADER_MODULE, raw.0)?;

        Ok(ShaderModule::new(raw, self.context.clone()))
    }

    /// Creates a new ray tracing pipeline with a maximal recursion depth of one.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn create_ray_tracing_pipeline(
        &self,
        name: &str,
        layout: &PipelineLayout,
        stages: &[vk::PipelineShaderStageCreateInfoBuilder],
        groups: &[vk::RayTracingShaderGroupCreateInfoKHRBuilder],
    ) -> Result<RayTracingPipeline> {
        let create_info = vk::RayTracingPipelineCreateInfoKHRBuilder::new()
            .stages(stages)
            .groups(groups)
            .max_pipeline_ray_recursion_depth(1)
            .layout(layout.raw());

        let pipelines = unsafe {
            self.context
                .device
                .create_ray_tracing_pipelines_khr(None, None, &[create_info], None)
        }
        .result()
        .map_err(|err| {
            #[cfg(feature = "tracing")]
            error!("Unable to create a ray tracing pipeline: {}", err);
            CtsError::VkResult(err)
        })?;
        let raw = pipelines[0];

        self.context
            .set_object_name(name, vk::ObjectType::PIPELINE, raw.0)?;

        Ok(RayTracingPipeline::new(
            raw,
            u32::try_from(groups.len())?,
            self.context.clone(),
        ))
    }
}
