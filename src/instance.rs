use std::ffi::CStr;
use std::fmt::Formatter;
use std::os::raw::c_char;

use erupt::{vk, ExtendableFromMut};
#[cfg(feature = "tracing")]
use tracing1::{error, info, warn};

#[cfg(debug_assertions)]
use crate::vk_debug::debug_utils_callback;
use crate::{CtsError, Device, DeviceConfiguration, Result};

/// Describes how the instance should be configured.
#[derive(Clone, Debug)]
pub struct InstanceConfiguration<'a> {
    /// Name of the application.
    pub app_name: &'a str,
    /// Version of the application.
    pub app_version: Version,
    /// Name of the engine.
    pub engine_name: &'a str,
    /// Version of the engine.
    pub engine_version: Version,
    /// Instance extensions to load.
    pub extensions: Vec<*const c_char>,
}

impl<'a> Default for InstanceConfiguration<'a> {
    fn default() -> Self {
        Self {
            app_name: "vkcts-rt",
            app_version: Version {
                major: 0,
                minor: 1,
                patch: 0,
            },
            engine_name: "vkcts-rt",
            engine_version: Version {
                major: 0,
                minor: 1,
                patch: 0,
            },
            extensions: vec![],
        }
    }
}

/// A version number.
#[derive(Clone, Debug, Copy, Eq, PartialEq)]
pub struct Version {
    /// The version major.
    pub major: u32,
    /// The version minor.
    pub minor: u32,
    /// The version patch.
    pub patch: u32,
}

impl From<Version> for u32 {
    fn from(v: Version) -> Self {
        vk::make_api_version(0, v.major, v.minor, v.patch)
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// A physical device that was selected together with its properties.
pub(crate) struct PhysicalDeviceSelection {
    pub(crate) raw: vk::PhysicalDevice,
    pub(crate) properties: vk::PhysicalDeviceProperties,
    pub(crate) queue_family_index: u32,
}

/// Initializes the all Vulkan resources needed to create a headless device.
pub struct Instance {
    #[cfg(debug_assertions)]
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
    raw: erupt::InstanceLoader,
    _entry: erupt::EntryLoader,
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance").finish()
    }
}

impl Instance {
    /// Creates a new `Instance`. No surface is created.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn new(configuration: InstanceConfiguration) -> Result<Instance> {
        let entry = erupt::EntryLoader::new()?;

        let app_name = std::ffi::CString::new(configuration.app_name.to_owned())?;
        let engine_name = std::ffi::CString::new(configuration.engine_name.to_owned())?;

        #[cfg(feature = "tracing")]
        {
            info!("Application name: {}", configuration.app_name);
            info!("Application version: {}", configuration.app_version);
            info!("Engine name: {}", configuration.engine_name);
            info!("Engine version: {}", configuration.engine_version);
            info!("Requesting Vulkan API version: 1.2.0");
        }

        let app_info = vk::ApplicationInfoBuilder::new()
            .application_name(&app_name)
            .application_version(configuration.app_version.into())
            .engine_name(&engine_name)
            .engine_version(configuration.engine_version.into())
            .api_version(vk::make_api_version(0, 1, 2, 0));

        let instance_extensions =
            unsafe { entry.enumerate_instance_extension_properties(None, None) }
                .result()
                .map_err(
                |err| {
                    #[cfg(feature = "tracing")]
                    error!("Unable to enumerate instance extensions: {}", err);
                    CtsError::VkResult(err)
                },
            )?;

        let extensions = Self::create_instance_extensions(&configuration, &instance_extensions);
        let instance = Self::create_instance(&entry, &app_info, &extensions)?;

        #[cfg(debug_assertions)]
        let debug_messenger = Self::create_debug_utils(&instance, &extensions)?;

        Ok(Self {
            _entry: entry,
            raw: instance,
            #[cfg(debug_assertions)]
            debug_messenger,
        })
    }

    /// The raw Vulkan instance handle.
    #[inline]
    pub(crate) fn raw(&self) -> &erupt::InstanceLoader {
        &self.raw
    }

    /// Returns true if object names can be attached.
    #[inline]
    pub(crate) fn debug_utils_enabled(&self) -> bool {
        #[cfg(debug_assertions)]
        {
            self.debug_messenger.is_some()
        }
        #[cfg(not(debug_assertions))]
        {
            false
        }
    }

    /// Requests a new Vulkan device capable of ray tracing.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn request_device(self, configuration: DeviceConfiguration) -> Result<Device> {
        Device::new(self, configuration)
    }

    #[cfg(debug_assertions)]
    fn create_debug_utils(
        instance: &erupt::InstanceLoader,
        enabled_extensions: &[*const c_char],
    ) -> Result<Option<vk::DebugUtilsMessengerEXT>> {
        let debug_name = unsafe { CStr::from_ptr(vk::EXT_DEBUG_UTILS_EXTENSION_NAME) };
        let debug_utils_found = enabled_extensions
            .iter()
            .any(|ext| unsafe { CStr::from_ptr(*ext) } == debug_name);

        if !debug_utils_found {
            #[cfg(feature = "tracing")]
            warn!("Debug utils extension not present. Validation messages are not forwarded");
            return Ok(None);
        }

        let info = vk::DebugUtilsMessengerCreateInfoEXTBuilder::new()
            .message_severity(Self::vulkan_log_level())
            .message_type(vk::DebugUtilsMessageTypeFlagsEXT::all())
            .pfn_user_callback(Some(debug_utils_callback));

        let utils =
            unsafe { instance.create_debug_utils_messenger_ext(&info, None) }
                .result()
                .map_err(|err| {
                #[cfg(feature = "tracing")]
                error!("Unable to create the debug utils messenger: {}", err);
                CtsError::VkResult(err)
            })?;

        Ok(Some(utils))
    }

    #[cfg(debug_assertions)]
    fn vulkan_log_level() -> vk::DebugUtilsMessageSeverityFlagsEXT {
        #[cfg(feature = "tracing")]
        {
            use tracing1::level_filters::LevelFilter;
            match tracing1::level_filters::STATIC_MAX_LEVEL {
                LevelFilter::OFF => vk::DebugUtilsMessageSeverityFlagsEXT::empty(),
                LevelFilter::ERROR => vk::DebugUtilsMessageSeverityFlagsEXT::ERROR_EXT,
                LevelFilter::WARN => {
                    vk::DebugUtilsMessageSeverityFlagsEXT::ERROR_EXT
                        | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING_EXT
                }
                LevelFilter::INFO => {
                    vk::DebugUtilsMessageSeverityFlagsEXT::ERROR_EXT
                        | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING_EXT
                        | vk::DebugUtilsMessageSeverityFlagsEXT::INFO_EXT
                }
                LevelFilter::DEBUG => {
                    vk::DebugUtilsMessageSeverityFlagsEXT::ERROR_EXT
                        | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING_EXT
                        | vk::DebugUtilsMessageSeverityFlagsEXT::INFO_EXT
                        | vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE_EXT
                }
                LevelFilter::TRACE => vk::DebugUtilsMessageSeverityFlagsEXT::all(),
            }
        }
        #[cfg(not(feature = "tracing"))]
        {
            vk::DebugUtilsMessageSeverityFlagsEXT::WARNING_EXT
        }
    }

    fn create_instance(
        entry: &erupt::EntryLoader,
        app_info: &vk::ApplicationInfoBuilder,
        instance_extensions: &[*const c_char],
    ) -> Result<erupt::InstanceLoader> {
        #[cfg(feature = "tracing")]
        Self::print_extensions("instance", instance_extensions)?;

        let create_info = vk::InstanceCreateInfoBuilder::new()
            .flags(vk::InstanceCreateFlags::empty())
            .application_info(app_info)
            .enabled_extension_names(instance_extensions);

        unsafe { erupt::InstanceLoader::new(entry, &create_info, None) }.map_err(|err| {
            #[cfg(feature = "tracing")]
            error!("Unable to create Vulkan instance: {}", err);
            CtsError::LoaderError(err)
        })
    }

    fn create_instance_extensions(
        configuration: &InstanceConfiguration,
        instance_extensions: &[vk::ExtensionProperties],
    ) -> Vec<*const c_char> {
        let mut extensions: Vec<*const c_char> = configuration.extensions.clone();

        #[cfg(debug_assertions)]
        extensions.push(vk::EXT_DEBUG_UTILS_EXTENSION_NAME);

        // Only keep available extensions.
        Instance::retain_extensions(instance_extensions, &mut extensions);

        extensions
    }

    pub(crate) fn retain_extensions(
        present_extensions: &[vk::ExtensionProperties],
        requested_extensions: &mut Vec<*const c_char>,
    ) {
        requested_extensions.retain(|ext| {
            let extension = unsafe { CStr::from_ptr(*ext) };
            let found = present_extensions.iter().any(|inst_ext| unsafe {
                CStr::from_ptr(inst_ext.extension_name.as_ptr()) == extension
            });
            #[cfg(feature = "tracing")]
            if !found {
                warn!("Unable to find extension: {}", extension.to_string_lossy());
            }
            found
        });
    }

    #[cfg(feature = "tracing")]
    pub(crate) fn print_extensions(what: &str, extensions: &[*const c_char]) -> Result<()> {
        info!("Loading {} extensions:", what);
        for extension in extensions.iter() {
            let ext = unsafe { CStr::from_ptr(*extension).to_str() }?;
            info!("- {}", ext);
        }
        Ok(())
    }

    /// Finds a physical device of the requested type that exposes a queue family with
    /// graphics and compute support. Falls back to the other GPU type.
    pub(crate) fn find_physical_device(
        &self,
        device_type: vk::PhysicalDeviceType,
    ) -> Result<PhysicalDeviceSelection> {
        let physical_devices =
            unsafe { self.raw.enumerate_physical_devices(None) }
                .result()
                .map_err(|err| {
                #[cfg(feature = "tracing")]
                error!("Unable to enumerate the physical devices: {}", err);
                CtsError::VkResult(err)
            })?;

        // We try to find our preferred device type.
        let mut chosen = self.find_physical_device_inner_loop(device_type, &physical_devices);

        // We try to fall back to the next best thing.
        if chosen.is_none() {
            if device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
                chosen = self.find_physical_device_inner_loop(
                    vk::PhysicalDeviceType::INTEGRATED_GPU,
                    &physical_devices,
                );
            }
            if device_type == vk::PhysicalDeviceType::INTEGRATED_GPU {
                chosen = self.find_physical_device_inner_loop(
                    vk::PhysicalDeviceType::DISCRETE_GPU,
                    &physical_devices,
                );
            }
        }

        chosen.ok_or(CtsError::RequestDeviceError)
    }

    fn find_physical_device_inner_loop(
        &self,
        device_type: vk::PhysicalDeviceType,
        physical_devices: &[vk::PhysicalDevice],
    ) -> Option<PhysicalDeviceSelection> {
        let mut chosen = None;
        for device in physical_devices {
            let mut physical_device_driver_properties =
                vk::PhysicalDeviceDriverPropertiesBuilder::new();
            let physical_device_properties = vk::PhysicalDeviceProperties2Builder::new()
                .extend_from(&mut physical_device_driver_properties);

            let physical_device_properties = unsafe {
                self.raw.get_physical_device_properties2(
                    *device,
                    Some(physical_device_properties.build()),
                )
            };

            if physical_device_properties.properties.device_type != device_type {
                continue;
            }

            if let Some(queue_family_index) = self.find_universal_queue_family(*device) {
                chosen = Some(PhysicalDeviceSelection {
                    raw: *device,
                    properties: physical_device_properties.properties,
                    queue_family_index,
                })
            }
        }
        chosen
    }

    /// The universal queue family supports graphics and compute. Ray tracing commands and
    /// transfers are recorded into the same command buffer.
    fn find_universal_queue_family(&self, physical_device: vk::PhysicalDevice) -> Option<u32> {
        let queue_family_properties = unsafe {
            self.raw
                .get_physical_device_queue_family_properties(physical_device, None)
        };

        queue_family_properties
            .iter()
            .position(|family| {
                family.queue_count > 0
                    && family
                        .queue_flags
                        .contains(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)
            })
            .and_then(|id| u32::try_from(id).ok())
    }

    /// Queries the device extensions the physical device exposes.
    pub(crate) fn device_extension_properties(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Vec<vk::ExtensionProperties>> {
        let properties = unsafe {
            self.raw
                .enumerate_device_extension_properties(physical_device, None, None)
        }
        .result()
        .map_err(|err| {
            #[cfg(feature = "tracing")]
            error!(
                "Unable to enumerate the device extension properties: {}",
                err
            );
            CtsError::VkResult(err)
        })?;

        Ok(properties.to_vec())
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe {
            #[cfg(debug_assertions)]
            if let Some(messenger) = self.debug_messenger {
                self.raw
                    .destroy_debug_utils_messenger_ext(Some(messenger), None);
            }

            self.raw.destroy_instance(None);
        };
    }
}
