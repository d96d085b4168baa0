use vkcts_rt::{build_large_cases, BuildType, CaseDef};

#[test]
fn case_names() {
    let host = CaseDef::new(64, 64, 16, 16, 16, true, BuildType::Host, 4);
    assert_eq!(host.name(), "cpu_built_4threads/16");

    let max = CaseDef::new(64, 64, 1, 64, 64, true, BuildType::Host, u32::MAX);
    assert_eq!(max.name(), "cpu_built_maxthreads/1");

    let device = CaseDef::new(64, 64, 4096, 1, 1, false, BuildType::Device, 0);
    assert_eq!(device.name(), "gpu_built_nothreads/4096");
}

#[test]
#[should_panic(expected = "pixel count must match the triangle count")]
fn mismatching_case_panics() {
    let _ = CaseDef::new(8, 8, 32, 1, 1, false, BuildType::Device, 0);
}

#[test]
fn single_threaded_keeps_everything_but_the_workers() {
    let case = CaseDef::new(8, 8, 64, 1, 1, true, BuildType::Host, 8);
    let single = case.single_threaded();

    assert_eq!(single.worker_threads_count, 0);
    assert!(single.deferred_operation);
    assert_eq!(single.build_type, BuildType::Host);
    assert_eq!(single.squares_group_count, 64);
}

#[test]
fn catalogue_covers_all_variants() {
    let cases = build_large_cases();

    // Six host threading variants and one device variant for seven square counts.
    assert_eq!(cases.len(), 7 * 7);

    for case in cases.iter() {
        case.def.assert_valid();
        assert_eq!(case.name, case.def.name());
        assert_eq!(case.def.width, 64);
        assert_eq!(case.def.height, 64);
        assert_eq!(
            case.def.geometries_group_count,
            case.def.instances_group_count
        );
    }

    let names: Vec<&str> = cases.iter().map(|case| case.name.as_str()).collect();
    assert!(names.contains(&"cpu_built_nothreads/1"));
    assert!(names.contains(&"cpu_built_1threads/256"));
    assert!(names.contains(&"cpu_built_maxthreads/4096"));
    assert!(names.contains(&"gpu_built_nothreads/64"));
    assert!(!names.contains(&"gpu_built_8threads/64"));
}

#[test]
fn catalogue_shapes() {
    let cases = build_large_cases();
    let shape = |name: &str| {
        let case = cases.iter().find(|case| case.name == name).unwrap();
        (
            case.def.squares_group_count,
            case.def.geometries_group_count,
            case.def.instances_group_count,
        )
    };

    assert_eq!(shape("gpu_built_nothreads/1"), (1, 64, 64));
    assert_eq!(shape("gpu_built_nothreads/4"), (4, 32, 32));
    assert_eq!(shape("gpu_built_nothreads/1024"), (1024, 2, 2));
    assert_eq!(shape("gpu_built_nothreads/4096"), (4096, 1, 1));
}
