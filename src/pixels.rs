//
// pixels.rs
// dicom-forge
//
// Procedural pixel synthesis (radial gradient plus layered noise) and the "FILE n/N" overlay
// burned into every frame.
//
// Thales Matheus Mendonça Santos - November 2025

use dicom::core::VR;
use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::modality::PixelProfile;
use crate::sizing::Dimensions;

/// Share of the image width the overlay text spans.
const OVERLAY_WIDTH_RATIO: f64 = 0.3;
const MIN_OVERLAY_SCALE: f64 = 2.0;
const GLYPH_WIDTH: u32 = 5;
const GLYPH_HEIGHT: u32 = 7;

/// Rows of a 5x7 glyph, most significant of the low five bits on the left.
fn glyph(c: char) -> [u8; 7] {
    match c {
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        '/' => [0x01, 0x01, 0x02, 0x04, 0x08, 0x10, 0x10],
        _ => [0; 7],
    }
}

/// Overlay label of one image, numbered from 1.
pub fn overlay_label(number: usize, total: usize) -> String {
    format!("FILE {number}/{total}")
}

/// Radial gradient with three noise layers, clamped to the profile's range.
pub fn synthesize(dims: Dimensions, profile: &PixelProfile, seed: u64) -> Vec<i32> {
    let mut rng = StdRng::seed_from_u64(seed);
    let (width, height) = (dims.width as usize, dims.height as usize);
    let (cx, cy) = (width as f64 / 2.0, height as f64 / 2.0);
    let max_dist = (cx * cx + cy * cy).sqrt();
    let base = f64::from(profile.base);
    let (min, max) = (f64::from(profile.min), f64::from(profile.max));

    let mut values = Vec::with_capacity(width * height);
    for y in 0..height {
        for x in 0..width {
            let (dx, dy) = (x as f64 - cx, y as f64 - cy);
            let dist = (dx * dx + dy * dy).sqrt();
            let gradient = (1.0 - dist / max_dist) * base;

            let coarse = (rng.gen::<f64>() - 0.5) * base;
            let medium = (rng.gen::<f64>() - 0.5) * base / 2.0;
            let fine = (rng.gen::<f64>() - 0.5) * base / 4.0;

            let value = min + gradient + coarse + medium + fine;
            values.push(value.clamp(min, max).round() as i32);
        }
    }
    values
}

fn rasterize(text: &str) -> GrayImage {
    let chars: Vec<char> = text.chars().collect();
    let width = (chars.len() as u32 * (GLYPH_WIDTH + 1)).saturating_sub(1).max(1);
    let mut raster = GrayImage::new(width, GLYPH_HEIGHT);
    for (i, c) in chars.iter().enumerate() {
        let left = i as u32 * (GLYPH_WIDTH + 1);
        for (row, bits) in glyph(c.to_ascii_uppercase()).iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if bits & (0x10 >> col) != 0 {
                    raster.put_pixel(left + col, row as u32, Luma([255]));
                }
            }
        }
    }
    raster
}

/// Burn `text` into the centre of the frame: glyphs at the profile maximum over an outline at
/// the profile minimum.
pub fn overlay_text(values: &mut [i32], dims: Dimensions, profile: &PixelProfile, text: &str) {
    let raster = rasterize(text);
    let (width, height) = (dims.width as i64, dims.height as i64);

    // 1. Scale the raster to a fixed share of the frame width
    let target = dims.width as f64 * OVERLAY_WIDTH_RATIO;
    let scale = (target / f64::from(raster.width())).max(MIN_OVERLAY_SCALE);
    let scaled_w = (f64::from(raster.width()) * scale) as u32;
    let scaled_h = (f64::from(raster.height()) * scale) as u32;
    let scaled = imageops::resize(&raster, scaled_w, scaled_h, FilterType::Triangle);

    // 2. Centre it and collect the covered pixels
    let left = (width - i64::from(scaled_w)) / 2;
    let top = (height - i64::from(scaled_h)) / 2;
    let mask: Vec<(i64, i64)> = scaled
        .enumerate_pixels()
        .filter(|(_, _, p)| p.0[0] > 127)
        .map(|(x, y, _)| (left + i64::from(x), top + i64::from(y)))
        .collect();

    let mut paint = |x: i64, y: i64, value: i32| {
        if (0..width).contains(&x) && (0..height).contains(&y) {
            values[(y * width + x) as usize] = value;
        }
    };

    // 3. Circular outline, then the glyphs on top
    let thickness = i64::from((scaled_h / 10).max(3));
    for &(x, y) in &mask {
        for dy in -thickness..=thickness {
            for dx in -thickness..=thickness {
                if dx * dx + dy * dy <= thickness * thickness {
                    paint(x + dx, y + dy, profile.min);
                }
            }
        }
    }
    for &(x, y) in &mask {
        paint(x, y, profile.max);
    }
}

/// Little-endian pixel data element value: OW for 16-bit profiles, OB for 8-bit ones.
pub fn encode(values: &[i32], profile: &PixelProfile) -> (VR, Vec<u8>) {
    match profile.bytes_per_sample() {
        1 => (VR::OB, values.iter().map(|v| *v as u8).collect()),
        _ => {
            let mut bytes = Vec::with_capacity(values.len() * 2);
            for v in values {
                let sample = if profile.signed {
                    (*v as i16).to_le_bytes()
                } else {
                    (*v as u16).to_le_bytes()
                };
                bytes.extend_from_slice(&sample);
            }
            (VR::OW, bytes)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modality::Modality;

    const DIMS: Dimensions = Dimensions {
        width: 128,
        height: 128,
    };

    #[test]
    fn field_is_deterministic_and_within_range() {
        for modality in Modality::ALL {
            let profile = modality.profile().pixel_profile();
            let a = synthesize(DIMS, &profile, 11);
            assert_eq!(a.len(), 128 * 128);
            assert!(a.iter().all(|v| (profile.min..=profile.max).contains(v)));
            assert_eq!(a, synthesize(DIMS, &profile, 11));
            assert_ne!(a, synthesize(DIMS, &profile, 12));
        }
    }

    #[test]
    fn ct_field_reaches_negative_values() {
        let profile = Modality::Ct.profile().pixel_profile();
        let values = synthesize(DIMS, &profile, 5);
        assert!(values.iter().any(|v| *v < 0));
    }

    #[test]
    fn overlay_draws_text_over_outline() {
        let profile = Modality::Mr.profile().pixel_profile();
        let mut values = vec![1000; 128 * 128];
        overlay_text(&mut values, DIMS, &profile, &overlay_label(3, 10));
        assert!(values.iter().any(|v| *v == profile.max));
        assert!(values.iter().any(|v| *v == profile.min));
        // corners stay untouched
        assert_eq!(values[0], 1000);
        assert_eq!(values[128 * 128 - 1], 1000);
    }

    #[test]
    fn wide_labels_are_clipped_to_the_frame() {
        let profile = Modality::Us.profile().pixel_profile();
        let mut values = vec![50; 128 * 128];
        overlay_text(&mut values, DIMS, &profile, &overlay_label(1000, 1000));
        assert_eq!(values.len(), 128 * 128);
        assert!(values.iter().any(|v| *v == profile.max));
    }

    #[test]
    fn encodes_by_sample_size_and_sign() {
        let ct = Modality::Ct.profile().pixel_profile();
        let (vr, bytes) = encode(&[-1024, 3071], &ct);
        assert_eq!(vr, VR::OW);
        assert_eq!(bytes, [(-1024i16).to_le_bytes(), 3071i16.to_le_bytes()].concat());

        let us = Modality::Us.profile().pixel_profile();
        let (vr, bytes) = encode(&[0, 128, 255], &us);
        assert_eq!(vr, VR::OB);
        assert_eq!(bytes, vec![0, 128, 255]);
    }
}
