use vkcts_rt::{expected_value, ResultValidator, CLEAR_VALUE};

#[test]
fn reference_pattern() {
    assert_eq!(expected_value(8, 3, 7), 19);
    assert_eq!(expected_value(8, 0, 0), 0);
    assert_eq!(expected_value(8, 7, 2), 7);
    assert_eq!(expected_value(64, 63, 63), (64 * 21 + 63) % 199);
    assert!((0..64).all(|y| (0..64).all(|x| expected_value(64, x, y) < 199)));
}

fn reference_image(width: u32, height: u32) -> Vec<u32> {
    (0..height)
        .flat_map(|y| (0..width).map(move |x| expected_value(width, x, y)))
        .collect()
}

#[test]
fn matching_image_has_no_failures() {
    let validator = ResultValidator::new(8, 8);
    assert_eq!(validator.count_failures(&reference_image(8, 8)), 0);
}

#[test]
fn mismatches_are_counted() {
    let validator = ResultValidator::new(8, 8);
    let mut image = reference_image(8, 8);
    image[3] += 1;
    image[63] = 1000;

    assert_eq!(validator.count_failures(&image), 2);
}

#[test]
fn cleared_image_fails_everywhere() {
    let validator = ResultValidator::new(64, 64);
    let image = vec![CLEAR_VALUE; 64 * 64];

    assert_eq!(validator.count_failures(&image), 4096);
}

#[test]
fn short_image_counts_missing_pixels() {
    let validator = ResultValidator::new(8, 8);
    let image = reference_image(8, 8);

    assert_eq!(validator.count_failures(&image[..60]), 4);
}

#[test]
fn bytes_are_read_in_native_endianness() {
    let validator = ResultValidator::new(8, 8);
    let bytes: Vec<u8> = reference_image(8, 8)
        .iter()
        .flat_map(|value| value.to_ne_bytes())
        .collect();

    assert_eq!(validator.count_failures_in_bytes(&bytes), 0);
}

#[test]
fn unaligned_bytes_are_read() {
    let validator = ResultValidator::new(8, 8);
    let mut bytes = vec![0xAB_u8];
    bytes.extend(reference_image(8, 8).iter().flat_map(|value| value.to_ne_bytes()));

    assert_eq!(validator.count_failures_in_bytes(&bytes[1..]), 0);
    assert_eq!(validator.count_failures_in_bytes(&bytes[1..bytes.len() - 2]), 1);
}
