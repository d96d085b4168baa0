use erupt::vk;
use vkcts_rt::{ShaderBindingTableLayout, StridedRegion};

#[test]
fn regions_are_aligned_and_strided_by_handle_size() {
    let layout = ShaderBindingTableLayout::new(32, 64, 64);

    for address in [0u64, 1, 63, 64, 65, 1000, 4096 + 17] {
        for (region, size) in [
            (layout.raygen_region(address), layout.raygen_size()),
            (layout.callable_region(address), layout.callable_size()),
        ] {
            assert_eq!(region.device_address % 64, 0);
            assert!(region.device_address >= address);
            assert_eq!(region.stride, 32);
            assert_eq!(region.size, size);
            // The region fits into a buffer of the reported size.
            assert!(region.device_address + region.size <= address + layout.buffer_size(size));
        }
    }
}

#[test]
fn region_sizes() {
    let layout = ShaderBindingTableLayout::new(32, 64, 4096);

    assert_eq!(layout.group_count(), 4097);
    assert_eq!(layout.raygen_size(), 32);
    assert_eq!(layout.callable_size(), 32 * 4096);
    assert_eq!(
        layout.raygen_region(1000),
        StridedRegion {
            device_address: 1024,
            stride: 32,
            size: 32,
        }
    );
}

#[test]
fn handles_are_split_in_program_order() {
    let layout = ShaderBindingTableLayout::new(4, 16, 3);
    let handles: Vec<u8> = (0..16).collect();

    let (raygen, callable) = layout.split_handles(&handles);
    assert_eq!(raygen, &[0, 1, 2, 3]);
    assert_eq!(callable, &handles[4..]);
}

#[test]
#[should_panic(expected = "one handle per shader group expected")]
fn missing_handles_panic() {
    let layout = ShaderBindingTableLayout::new(4, 16, 3);
    let _ = layout.split_handles(&[0; 12]);
}

#[test]
fn region_converts_to_vulkan() {
    let region = StridedRegion {
        device_address: 128,
        stride: 32,
        size: 96,
    };
    let raw: vk::StridedDeviceAddressRegionKHR = region.into();

    assert_eq!(raw.device_address, 128);
    assert_eq!(raw.stride, 32);
    assert_eq!(raw.size, 96);
}
