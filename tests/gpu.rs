//! End to end runs on a ray tracing capable device. Skipped without a device, without ray
//! tracing support or without a shader compiler.
use vkcts_rt::{
    check_support, Arena, BottomLevelBuilder, BuildType, CaseDef, Device, DispatchOrchestrator,
    GeometryBuilder, GlslangCompiler, ResultValidator, RunnerConfiguration, TestStatus,
    ThreadingVariantRunner, TopLevelBuilder, TransformMatrix,
};

mod fixture;

fn setup(name: &str, case: &CaseDef) -> Option<(Device, GlslangCompiler)> {
    let device = fixture::try_device(name)?;
    if let Err(err) = check_support(device.capabilities(), case) {
        eprintln!("skipping {}: {}", name, err);
        return None;
    }
    let compiler = fixture::try_compiler(name)?;
    Some((device, compiler))
}

#[test]
fn device_build_small() {
    let case = fixture::small_case(BuildType::Device, false, 0);
    let (device, compiler) = match setup("device_build_small", &case) {
        Some(setup) => setup,
        None => return,
    };

    let orchestrator = DispatchOrchestrator::new(&device, &compiler);
    let values = orchestrator.run(&case).unwrap();

    assert_eq!(values.len(), 64);
    assert_eq!(values[7 * 8 + 3], 19);
    assert_eq!(ResultValidator::new(8, 8).count_failures(&values), 0);
    assert_eq!(device.validation_error_count(), 0);
}

#[test]
fn deferred_host_build_small() {
    let case = fixture::small_case(BuildType::Host, true, 8);
    let (device, compiler) = match setup("deferred_host_build_small", &case) {
        Some(setup) => setup,
        None => return,
    };

    let orchestrator = DispatchOrchestrator::new(&device, &compiler);
    let status =
        ThreadingVariantRunner::new(&orchestrator, case, RunnerConfiguration::default()).run();

    assert_eq!(status, TestStatus::Pass);
    assert_eq!(device.validation_error_count(), 0);
}

#[test]
fn threading_variants_match() {
    let case = fixture::small_case(BuildType::Host, true, 4);
    let (device, compiler) = match setup("threading_variants_match", &case) {
        Some(setup) => setup,
        None => return,
    };

    let orchestrator = DispatchOrchestrator::new(&device, &compiler);
    let single = orchestrator.run(&case.single_threaded()).unwrap();
    let multi = orchestrator.run(&case).unwrap();

    assert_eq!(single, multi);
}

#[test]
fn large_callable_set() {
    let case = CaseDef::new(64, 64, 4096, 1, 1, false, BuildType::Device, 0);
    let (device, compiler) = match setup("large_callable_set", &case) {
        Some(setup) => setup,
        None => return,
    };

    let orchestrator = DispatchOrchestrator::new(&device, &compiler);
    let status =
        ThreadingVariantRunner::new(&orchestrator, case, RunnerConfiguration::default()).run();

    assert_eq!(status, TestStatus::Pass);
}

#[test]
fn many_instances() {
    let case = CaseDef::new(64, 64, 16, 16, 16, true, BuildType::Host, u32::MAX);
    let (device, compiler) = match setup("many_instances", &case) {
        Some(setup) => setup,
        None => return,
    };

    let orchestrator = DispatchOrchestrator::new(&device, &compiler);
    let status =
        ThreadingVariantRunner::new(&orchestrator, case, RunnerConfiguration::default()).run();

    assert_eq!(status, TestStatus::Pass);
}

#[test]
fn acceleration_structure_lifetimes() {
    let case = fixture::small_case(BuildType::Device, false, 0);
    let device = match fixture::try_device("acceleration_structure_lifetimes") {
        Some(device) => device,
        None => return,
    };
    if let Err(err) = check_support(device.capabilities(), &case) {
        eprintln!("skipping acceleration_structure_lifetimes: {}", err);
        return;
    }

    let mut arena = Arena::new();
    let mut walk = GeometryBuilder::new(8, 8);
    let mut builder = BottomLevelBuilder::new(BuildType::Device);
    builder.add_geometries(&mut walk, 1, 64);
    let bottom_level = builder.create(&device, "Bottom Level").unwrap();
    assert!(bottom_level.has_build_resources());
    let handle = arena.insert(bottom_level);

    let mut abandoned = TopLevelBuilder::new(BuildType::Device);
    abandoned
        .add_instance(&mut arena, handle, TransformMatrix::IDENTITY)
        .unwrap();
    assert_eq!(arena.ref_count(handle).unwrap(), 2);
    abandoned.abandon(&mut arena).unwrap();
    assert_eq!(arena.ref_count(handle).unwrap(), 1);

    let mut builder = TopLevelBuilder::new(BuildType::Device);
    builder
        .add_instance(&mut arena, handle, TransformMatrix::IDENTITY)
        .unwrap();
    assert!(arena.release(handle).unwrap().is_none());
    let mut top_level = builder.create(&device, &mut arena, "Top Level").unwrap();
    assert!(top_level.has_build_resources());

    top_level.release_build_resources();
    assert!(!top_level.has_build_resources());
    arena.get_mut(handle).unwrap().release_build_resources();
    assert!(!arena.get(handle).unwrap().has_build_resources());

    top_level.release(&mut arena).unwrap();
    assert!(arena.is_empty());
    assert!(!arena.contains(handle));
}
