use vkcts_rt::{
    check_support, required_memory_allocations, BuildType, CaseDef, CtsError, DeviceCapabilities,
};

fn capable() -> DeviceCapabilities {
    DeviceCapabilities {
        acceleration_structure: true,
        ray_tracing_pipeline: true,
        deferred_host_operations: true,
        acceleration_structure_host_commands: true,
        buffer_device_address: true,
        max_primitive_count: 1 << 29,
        max_geometry_count: 1 << 24,
        max_instance_count: 1 << 24,
        max_memory_allocation_count: 4096,
        shader_group_handle_size: 32,
        shader_group_base_alignment: 64,
        min_acceleration_structure_scratch_offset_alignment: 128,
        max_ray_dispatch_invocation_count: 1 << 30,
    }
}

fn reason(result: Result<(), CtsError>) -> String {
    match result {
        Err(CtsError::NotSupported(reason)) => reason,
        other => panic!("expected NotSupported, got {:?}", other),
    }
}

#[test]
fn capable_device_supports_all_catalogue_cases() {
    let capabilities = capable();
    for case in vkcts_rt::build_large_cases() {
        check_support(&capabilities, &case.def).unwrap();
    }
}

#[test]
fn missing_extensions_are_not_supported() {
    let case = CaseDef::new(8, 8, 64, 1, 1, false, BuildType::Device, 0);

    let result = check_support(&DeviceCapabilities::default(), &case);
    assert!(result.as_ref().unwrap_err().is_not_supported());
    assert!(reason(result).contains("VK_KHR_acceleration_structure"));

    let capabilities = DeviceCapabilities {
        ray_tracing_pipeline: false,
        ..capable()
    };
    assert!(reason(check_support(&capabilities, &case)).contains("VK_KHR_ray_tracing_pipeline"));
}

#[test]
fn host_builds_need_host_commands() {
    let capabilities = DeviceCapabilities {
        acceleration_structure_host_commands: false,
        deferred_host_operations: false,
        ..capable()
    };

    let device = CaseDef::new(8, 8, 64, 1, 1, false, BuildType::Device, 0);
    check_support(&capabilities, &device).unwrap();

    let host = CaseDef::new(8, 8, 64, 1, 1, false, BuildType::Host, 0);
    assert!(
        reason(check_support(&capabilities, &host)).contains("accelerationStructureHostCommands")
    );

    let capabilities = DeviceCapabilities {
        deferred_host_operations: false,
        ..capable()
    };
    check_support(&capabilities, &host).unwrap();
    let deferred = CaseDef::new(8, 8, 64, 1, 1, true, BuildType::Host, 4);
    assert!(reason(check_support(&capabilities, &deferred)).contains("deferred_host_operations"));
}

#[test]
fn limits_are_checked() {
    let case = CaseDef::new(64, 64, 64, 8, 8, false, BuildType::Device, 0);

    let capabilities = DeviceCapabilities {
        max_primitive_count: 511,
        ..capable()
    };
    assert!(reason(check_support(&capabilities, &case)).contains("maxPrimitiveCount"));

    let capabilities = DeviceCapabilities {
        max_geometry_count: 7,
        ..capable()
    };
    assert!(reason(check_support(&capabilities, &case)).contains("maxGeometryCount"));

    let capabilities = DeviceCapabilities {
        max_instance_count: 7,
        ..capable()
    };
    assert!(reason(check_support(&capabilities, &case)).contains("maxInstanceCount"));

    let capabilities = DeviceCapabilities {
        max_memory_allocation_count: 30,
        ..capable()
    };
    assert!(reason(check_support(&capabilities, &case)).contains("maxMemoryAllocationCount"));
}

#[test]
fn allocation_estimate() {
    let case = CaseDef::new(64, 64, 1, 64, 64, false, BuildType::Host, 0);
    assert_eq!(required_memory_allocations(&case), 3 * 64 + 7);

    let case = CaseDef::new(8, 8, 64, 1, 1, false, BuildType::Device, 0);
    assert_eq!(required_memory_allocations(&case), 10);
}
