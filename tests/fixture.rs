#![allow(dead_code)]

use vkcts_rt::{
    BuildType, CaseDef, Device, DeviceConfiguration, GlslangCompiler, Instance,
    InstanceConfiguration,
};

#[cfg(feature = "tracing")]
pub fn initialize_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        use tracing_subscriber::filter::EnvFilter;

        let filter = EnvFilter::from_default_env().add_directive("vkcts_rt=WARN".parse().unwrap());
        tracing_subscriber::fmt().with_env_filter(filter).init();
    });
}

/// Creates a device or returns `None` if there is no Vulkan loader or no device.
pub fn try_device(app_name: &str) -> Option<Device> {
    #[cfg(feature = "tracing")]
    initialize_logging();

    let instance = match Instance::new(InstanceConfiguration {
        app_name,
        ..Default::default()
    }) {
        Ok(instance) => instance,
        Err(err) => {
            eprintln!("skipping {}: no Vulkan instance ({})", app_name, err);
            return None;
        }
    };

    let device = instance.request_device(DeviceConfiguration::default());

    match device {
        Ok(device) => Some(device),
        Err(err) => {
            eprintln!("skipping {}: no Vulkan device ({})", app_name, err);
            None
        }
    }
}

/// Returns the shader compiler or `None` if `glslangValidator` can't be executed.
pub fn try_compiler(app_name: &str) -> Option<GlslangCompiler> {
    let compiler = GlslangCompiler::new();
    if compiler.is_available() {
        Some(compiler)
    } else {
        eprintln!("skipping {}: glslangValidator is not available", app_name);
        None
    }
}

/// The 8x8 case with all triangles in one geometry.
pub fn small_case(build_type: BuildType, deferred_operation: bool, worker_threads: u32) -> CaseDef {
    CaseDef::new(8, 8, 64, 1, 1, deferred_operation, build_type, worker_threads)
}
