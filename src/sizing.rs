//
// sizing.rs
// dicom-forge
//
// Turns a total byte budget and an image count into a square pixel geometry.
//
// Thales Matheus Mendonça Santos - November 2025

use crate::error::{ForgeError, Result};

/// Bytes reserved for headers and metadata across the whole set.
pub const METADATA_OVERHEAD: u64 = 100 * 1024;

/// Largest payload a single element length field can address, minus a safety margin.
pub const MAX_PAYLOAD: u64 = (1u64 << 32) - 10 * 1024 * 1024;

/// Sizing assumes 16-bit samples for every modality.
pub const BYTES_PER_PIXEL: u64 = 2;

pub const MIN_DIMENSION: u32 = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn pixel_count(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// Solve the per-image geometry for `image_count` images sharing `total_bytes`.
pub fn solve_dimensions(total_bytes: u64, image_count: usize) -> Result<Dimensions> {
    if total_bytes == 0 {
        return Err(ForgeError::InvalidInput(
            "total bytes must be > 0".to_string(),
        ));
    }
    if image_count == 0 {
        return Err(ForgeError::InvalidInput(
            "number of images must be > 0".to_string(),
        ));
    }

    if total_bytes <= METADATA_OVERHEAD {
        return Err(ForgeError::SizeTooSmall {
            total: total_bytes,
            overhead: METADATA_OVERHEAD,
        });
    }
    let available = (total_bytes - METADATA_OVERHEAD).min(MAX_PAYLOAD);

    let total_pixels = available / BYTES_PER_PIXEL;
    let pixels_per_image = total_pixels / image_count as u64;
    let side = integer_sqrt(pixels_per_image);

    // Round down so the budget is never exceeded.
    let width = if side >= 256 {
        (side / 256) * 256
    } else {
        u64::from(MIN_DIMENSION)
    };
    let width = u32::try_from(width).unwrap_or(u32::MAX).max(MIN_DIMENSION);

    Ok(Dimensions {
        width,
        height: width,
    })
}

fn integer_sqrt(value: u64) -> u64 {
    if value < 2 {
        return value;
    }
    let value = u128::from(value);
    let mut root = ((value as f64).sqrt() as u128).min(u128::from(u32::MAX));
    // Float rounding can be off by one in either direction for large inputs.
    while root * root > value {
        root -= 1;
    }
    while (root + 1) * (root + 1) <= value {
        root += 1;
    }
    root as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn rejects_zero_inputs() {
        assert!(matches!(
            solve_dimensions(0, 1),
            Err(ForgeError::InvalidInput(_))
        ));
        assert!(matches!(
            solve_dimensions(1024 * 1024, 0),
            Err(ForgeError::InvalidInput(_))
        ));
    }

    #[test]
    fn rejects_budget_below_overhead() {
        assert!(matches!(
            solve_dimensions(METADATA_OVERHEAD, 1),
            Err(ForgeError::SizeTooSmall { .. })
        ));
    }

    #[test]
    fn small_budget_floors_at_128() {
        let dims = solve_dimensions(500 * 1024, 5).expect("solve");
        assert_eq!(dims.width, 128);
        assert_eq!(dims.height, 128);
    }

    #[test]
    fn large_budget_uses_multiples_of_256() {
        // 100MB over 10 images gives ~2289 px per side before rounding.
        let dims = solve_dimensions(100 * 1024 * 1024, 10).expect("solve");
        assert_eq!(dims.width, 2048);
    }

    #[test]
    fn payload_is_clamped() {
        let dims = solve_dimensions(64 * 1024 * 1024 * 1024, 1).expect("solve");
        assert!(dims.pixel_count() * BYTES_PER_PIXEL <= MAX_PAYLOAD);
    }

    #[test]
    fn integer_sqrt_is_exact() {
        assert_eq!(integer_sqrt(0), 0);
        assert_eq!(integer_sqrt(15), 3);
        assert_eq!(integer_sqrt(16), 4);
        assert_eq!(integer_sqrt(u64::MAX), 4_294_967_295);
        assert_eq!(integer_sqrt(u64::MAX - 1), 4_294_967_295);
        assert_eq!(integer_sqrt(1 << 62), 1 << 31);
    }

    proptest! {
        #[test]
        fn solved_geometry_respects_budget(
            total in (METADATA_OVERHEAD + 1)..(8u64 << 30),
            count in 1usize..2000,
        ) {
            let dims = solve_dimensions(total, count).expect("valid input");
            prop_assert_eq!(dims.width, dims.height);
            prop_assert_eq!(dims.width % 128, 0);
            if dims.width > 256 {
                prop_assert_eq!(dims.width % 256, 0);
            }
            // The 128 floor is the only case allowed to exceed the budget.
            if dims.width > MIN_DIMENSION {
                let used = dims.pixel_count() * BYTES_PER_PIXEL * count as u64;
                prop_assert!(used <= total - METADATA_OVERHEAD);
            }
        }

        #[test]
        fn width_never_grows_with_more_images(
            total in (METADATA_OVERHEAD + 1)..(8u64 << 30),
            count in 1usize..2000,
        ) {
            let fewer = solve_dimensions(total, count).expect("valid input");
            let more = solve_dimensions(total, count + 1).expect("valid input");
            prop_assert!(more.width <= fewer.width);
        }
    }
}
