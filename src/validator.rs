//! Comparison of the read back image against its analytic reference.
#[cfg(feature = "tracing")]
use tracing1::{info, warn};

/// Modulus of the reference pattern.
const PATTERN_MODULUS: u32 = 199;

/// The value the callable of pixel `(x, y)` writes into an image of the given width.
#[inline]
pub fn expected_value(width: u32, x: u32, y: u32) -> u32 {
    let value = u64::from(width) * u64::from(y / 3) + u64::from(x);
    // The remainder is below the modulus.
    (value % u64::from(PATTERN_MODULUS)) as u32
}

/// Counts the pixels of a `width` x `height` image that don't match the reference.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ResultValidator {
    width: u32,
    height: u32,
}

impl ResultValidator {
    /// Creates a validator for an image of the given size.
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns the number of mismatching pixels. Missing pixels count as mismatches.
    pub fn count_failures(&self, values: &[u32]) -> u64 {
        let mut failures = 0;

        for y in 0..self.height {
            for x in 0..self.width {
                let index = (y * self.width + x) as usize;
                let expected = expected_value(self.width, x, y);
                match values.get(index) {
                    Some(&value) if value == expected => {}
                    Some(&_value) => {
                        #[cfg(feature = "tracing")]
                        if failures < 16 {
                            warn!(
                                "Pixel ({}, {}) is {} but {} was expected",
                                x, y, _value, expected
                            );
                        }
                        failures += 1;
                    }
                    None => failures += 1,
                }
            }
        }

        #[cfg(feature = "tracing")]
        info!(
            "{} of {} pixels mismatch",
            failures,
            u64::from(self.width) * u64::from(self.height)
        );

        failures
    }

    /// Interprets the read back bytes as native endian `u32` values and counts the mismatches.
    pub fn count_failures_in_bytes(&self, bytes: &[u8]) -> u64 {
        self.count_failures(&values_from_bytes(bytes))
    }
}

/// Reads native endian `u32` values from bytes without alignment requirements. A trailing
/// partial value is dropped.
pub(crate) fn values_from_bytes(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks_exact(std::mem::size_of::<u32>())
        .map(bytemuck::pod_read_unaligned)
        .collect()
}
