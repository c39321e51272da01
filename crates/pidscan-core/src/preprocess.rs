//! Image cleanup applied to rasterized pages before OCR.
//!
//! Steps run in a fixed order (denoise, contrast, sharpen) and only on images
//! that carry color channels; grayscale renders pass through untouched.

use image::{DynamicImage, Rgb, RgbImage};
use imageproc::filter::{filter3x3, median_filter};

use crate::config::Preprocessing;

/// 3x3 sharpening kernel: center 9, ring -1 (sums to 1).
const SHARPEN_KERNEL: [f32; 9] = [-1.0, -1.0, -1.0, -1.0, 9.0, -1.0, -1.0, -1.0, -1.0];

const CLAHE_CLIP_LIMIT: f32 = 2.0;
const CLAHE_TILE_GRID: usize = 8;

/// Run the enabled preprocessing steps on one page image.
pub fn preprocess(image: DynamicImage, steps: &Preprocessing) -> DynamicImage {
    if !image.color().has_color() {
        return image;
    }
    if !(steps.denoise || steps.enhance_contrast || steps.sharpen) {
        return image;
    }

    let mut rgb = image.into_rgb8();
    if steps.denoise {
        rgb = denoise(&rgb);
    }
    if steps.enhance_contrast {
        rgb = enhance_contrast(&rgb);
    }
    if steps.sharpen {
        rgb = sharpen(&rgb);
    }
    DynamicImage::ImageRgb8(rgb)
}

/// 3x3 median blur.
pub fn denoise(image: &RgbImage) -> RgbImage {
    median_filter(image, 1, 1)
}

pub fn sharpen(image: &RgbImage) -> RgbImage {
    filter3x3::<_, f32, u8>(image, &SHARPEN_KERNEL)
}

/// Local contrast enhancement: CLAHE on the lightness channel of a Lab
/// conversion, chroma left as is.
pub fn enhance_contrast(image: &RgbImage) -> RgbImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return image.clone();
    }

    let mut lightness = Vec::with_capacity((width * height) as usize);
    let mut chroma = Vec::with_capacity((width * height) as usize);
    for px in image.pixels() {
        let (l, a, b) = rgb_to_lab(px.0);
        lightness.push((l * 255.0 / 100.0).round().clamp(0.0, 255.0) as u8);
        chroma.push((a, b));
    }

    let equalized = clahe(
        &lightness,
        width as usize,
        height as usize,
        CLAHE_CLIP_LIMIT,
        CLAHE_TILE_GRID,
    );

    let mut out = RgbImage::new(width, height);
    for (i, px) in out.pixels_mut().enumerate() {
        let l = equalized[i] as f32 * 100.0 / 255.0;
        let (a, b) = chroma[i];
        *px = Rgb(lab_to_rgb(l, a, b));
    }
    out
}

/// Contrast-limited adaptive histogram equalization of an 8-bit channel.
///
/// The channel is split into a `tiles` x `tiles` grid; each tile gets its own
/// clipped-histogram lookup table and pixels are bilinearly interpolated
/// between the four nearest tile centers.
fn clahe(channel: &[u8], width: usize, height: usize, clip_limit: f32, tiles: usize) -> Vec<u8> {
    let tile_w = width.div_ceil(tiles.clamp(1, width));
    let tile_h = height.div_ceil(tiles.clamp(1, height));
    let tiles_x = width.div_ceil(tile_w);
    let tiles_y = height.div_ceil(tile_h);

    let mut luts = vec![[0u8; 256]; tiles_x * tiles_y];
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = (x0 + tile_w).min(width);
            let y1 = (y0 + tile_h).min(height);

            let mut hist = [0u32; 256];
            for y in y0..y1 {
                for &v in &channel[y * width + x0..y * width + x1] {
                    hist[v as usize] += 1;
                }
            }
            let area = ((x1 - x0) * (y1 - y0)) as u32;
            luts[ty * tiles_x + tx] = tile_lut(&mut hist, area, clip_limit);
        }
    }

    let mut out = vec![0u8; channel.len()];
    for y in 0..height {
        let (ty0, ty1, wy) = grid_position(y, tile_h, tiles_y);
        for x in 0..width {
            let (tx0, tx1, wx) = grid_position(x, tile_w, tiles_x);
            let v = channel[y * width + x] as usize;

            let top = luts[ty0 * tiles_x + tx0][v] as f32 * (1.0 - wx)
                + luts[ty0 * tiles_x + tx1][v] as f32 * wx;
            let bottom = luts[ty1 * tiles_x + tx0][v] as f32 * (1.0 - wx)
                + luts[ty1 * tiles_x + tx1][v] as f32 * wx;
            out[y * width + x] = (top * (1.0 - wy) + bottom * wy).round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}

/// Clip a tile histogram, spread the excess evenly and turn the result into a
/// cumulative lookup table.
fn tile_lut(hist: &mut [u32; 256], area: u32, clip_limit: f32) -> [u8; 256] {
    let clip = ((clip_limit * area as f32 / 256.0) as u32).max(1);

    let mut excess = 0u32;
    for bin in hist.iter_mut() {
        if *bin > clip {
            excess += *bin - clip;
            *bin = clip;
        }
    }

    let per_bin = excess / 256;
    let residual = (excess % 256) as usize;
    for bin in hist.iter_mut() {
        *bin += per_bin;
    }
    if residual > 0 {
        let step = (256 / residual).max(1);
        for bin in hist.iter_mut().step_by(step).take(residual) {
            *bin += 1;
        }
    }

    let mut lut = [0u8; 256];
    let mut cumulative = 0u32;
    let scale = 255.0 / area.max(1) as f32;
    for (i, bin) in hist.iter().enumerate() {
        cumulative += bin;
        lut[i] = (cumulative as f32 * scale).round().min(255.0) as u8;
    }
    lut
}

/// Neighbouring tile indices and the interpolation weight toward the second
/// one, for a pixel coordinate along one axis.
fn grid_position(pos: usize, tile_size: usize, tile_count: usize) -> (usize, usize, f32) {
    let g = ((pos as f32 + 0.5) / tile_size as f32 - 0.5).max(0.0);
    let first = (g.floor() as usize).min(tile_count - 1);
    let second = (first + 1).min(tile_count - 1);
    let weight = if first == second {
        0.0
    } else {
        (g - first as f32).clamp(0.0, 1.0)
    };
    (first, second, weight)
}

// D65 reference white
const XN: f32 = 0.950_456;
const ZN: f32 = 1.088_754;
const LAB_EPSILON: f32 = 0.008_856;

fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.040_45 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn linear_to_srgb(c: f32) -> f32 {
    if c <= 0.003_130_8 {
        c * 12.92
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

fn lab_f(t: f32) -> f32 {
    if t > LAB_EPSILON {
        t.cbrt()
    } else {
        7.787 * t + 16.0 / 116.0
    }
}

fn lab_f_inv(t: f32) -> f32 {
    let cubed = t * t * t;
    if cubed > LAB_EPSILON {
        cubed
    } else {
        (t - 16.0 / 116.0) / 7.787
    }
}

/// sRGB to CIE Lab with L in 0..=100.
fn rgb_to_lab([r, g, b]: [u8; 3]) -> (f32, f32, f32) {
    let r = srgb_to_linear(r as f32 / 255.0);
    let g = srgb_to_linear(g as f32 / 255.0);
    let b = srgb_to_linear(b as f32 / 255.0);

    let x = (0.412_453 * r + 0.357_580 * g + 0.180_423 * b) / XN;
    let y = 0.212_671 * r + 0.715_160 * g + 0.072_169 * b;
    let z = (0.019_334 * r + 0.119_193 * g + 0.950_227 * b) / ZN;

    let fx = lab_f(x);
    let fy = lab_f(y);
    let fz = lab_f(z);
    (116.0 * fy - 16.0, 500.0 * (fx - fy), 200.0 * (fy - fz))
}

fn lab_to_rgb(l: f32, a: f32, b: f32) -> [u8; 3] {
    let fy = (l + 16.0) / 116.0;
    let fx = fy + a / 500.0;
    let fz = fy - b / 200.0;

    let x = XN * lab_f_inv(fx);
    let y = lab_f_inv(fy);
    let z = ZN * lab_f_inv(fz);

    let r = 3.240_479 * x - 1.537_150 * y - 0.498_535 * z;
    let g = -0.969_256 * x + 1.875_992 * y + 0.041_556 * z;
    let bl = 0.055_648 * x - 0.204_043 * y + 1.057_311 * z;

    let to_u8 = |c: f32| {
        (linear_to_srgb(c.clamp(0.0, 1.0)) * 255.0)
            .round()
            .clamp(0.0, 255.0) as u8
    };
    [to_u8(r), to_u8(g), to_u8(bl)]
}

#[cfg(test)]
mod tests {
    use image::{GrayImage, Luma};

    use super::*;

    const ALL_STEPS: Preprocessing = Preprocessing {
        denoise: true,
        enhance_contrast: true,
        sharpen: true,
    };

    fn uniform(width: u32, height: u32, value: [u8; 3]) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb(value))
    }

    /// Specks over a color gradient, so every step changes the image.
    fn drawing_patch() -> RgbImage {
        let mut img = RgbImage::from_fn(24, 24, |x, y| {
            Rgb([(60 + x * 6) as u8, (40 + y * 7) as u8, (200 - x * 3) as u8])
        });
        for (x, y) in [(3, 3), (11, 7), (18, 20), (6, 15)] {
            img.put_pixel(x, y, Rgb([0, 0, 0]));
        }
        img
    }

    fn only(denoise: bool, enhance_contrast: bool, sharpen: bool) -> Preprocessing {
        Preprocessing {
            denoise,
            enhance_contrast,
            sharpen,
        }
    }

    fn run(img: &RgbImage, steps: Preprocessing) -> RgbImage {
        preprocess(DynamicImage::ImageRgb8(img.clone()), &steps).into_rgb8()
    }

    #[test]
    fn all_steps_run_denoise_then_contrast_then_sharpen() {
        let img = drawing_patch();
        let expected = sharpen(&enhance_contrast(&denoise(&img)));
        assert_eq!(run(&img, ALL_STEPS), expected);
    }

    #[test]
    fn each_toggle_runs_only_its_step() {
        let img = drawing_patch();
        assert_eq!(run(&img, only(true, false, false)), denoise(&img));
        assert_eq!(run(&img, only(false, true, false)), enhance_contrast(&img));
        assert_eq!(run(&img, only(false, false, true)), sharpen(&img));
        assert_eq!(run(&img, only(true, false, true)), sharpen(&denoise(&img)));
    }

    #[test]
    fn grayscale_images_pass_through() {
        let gray = GrayImage::from_fn(16, 16, |x, y| Luma([((x * 16 + y) % 256) as u8]));
        let image = DynamicImage::ImageLuma8(gray.clone());
        let out = preprocess(image, &ALL_STEPS);
        assert_eq!(out.as_luma8(), Some(&gray));
    }

    #[test]
    fn no_steps_leaves_color_image_untouched() {
        let rgb = RgbImage::from_fn(8, 8, |x, y| Rgb([x as u8 * 20, y as u8 * 20, 7]));
        let steps = Preprocessing {
            denoise: false,
            enhance_contrast: false,
            sharpen: false,
        };
        let out = preprocess(DynamicImage::ImageRgb8(rgb.clone()), &steps);
        assert_eq!(out.as_rgb8(), Some(&rgb));
    }

    #[test]
    fn rgba_input_is_processed_as_rgb() {
        let rgba = image::RgbaImage::from_pixel(10, 10, image::Rgba([200, 200, 200, 255]));
        let out = preprocess(DynamicImage::ImageRgba8(rgba), &ALL_STEPS);
        assert!(out.as_rgb8().is_some());
        assert_eq!((out.width(), out.height()), (10, 10));
    }

    #[test]
    fn denoise_removes_isolated_speck() {
        let mut img = uniform(9, 9, [255, 255, 255]);
        img.put_pixel(4, 4, Rgb([0, 0, 0]));
        let out = denoise(&img);
        assert_eq!(out.get_pixel(4, 4), &Rgb([255, 255, 255]));
    }

    #[test]
    fn sharpen_keeps_flat_regions_flat() {
        let img = uniform(12, 12, [90, 120, 150]);
        let out = sharpen(&img);
        assert!(out.pixels().all(|p| *p == Rgb([90, 120, 150])));
    }

    #[test]
    fn sharpen_boosts_edges() {
        let img = RgbImage::from_fn(10, 10, |x, _| {
            if x < 5 { Rgb([100, 100, 100]) } else { Rgb([150, 150, 150]) }
        });
        let out = sharpen(&img);
        assert!(out.get_pixel(4, 5).0[0] < 100);
        assert!(out.get_pixel(5, 5).0[0] > 150);
    }

    #[test]
    fn lab_round_trip_is_close() {
        for rgb in [[0, 0, 0], [255, 255, 255], [200, 30, 40], [12, 180, 90], [128, 128, 128]] {
            let (l, a, b) = rgb_to_lab(rgb);
            let back = lab_to_rgb(l, a, b);
            for c in 0..3 {
                assert!(
                    (rgb[c] as i32 - back[c] as i32).abs() <= 1,
                    "{rgb:?} -> {back:?}"
                );
            }
        }
    }

    #[test]
    fn lab_lightness_spans_zero_to_hundred() {
        assert!(rgb_to_lab([0, 0, 0]).0.abs() < 0.01);
        assert!((rgb_to_lab([255, 255, 255]).0 - 100.0).abs() < 0.1);
    }

    #[test]
    fn clahe_stretches_narrow_histogram() {
        let (w, h) = (256usize, 256usize);
        let channel: Vec<u8> = (0..w * h).map(|i| 100 + (i % 20) as u8).collect();
        let out = clahe(&channel, w, h, 2.0, 1);
        let min = *out.iter().min().unwrap();
        let max = *out.iter().max().unwrap();
        assert!(max - min > 19, "range {min}..{max}");
    }

    #[test]
    fn clahe_handles_images_smaller_than_grid() {
        let channel = vec![10u8, 20, 30, 40, 50, 60];
        let out = clahe(&channel, 3, 2, 2.0, 8);
        assert_eq!(out.len(), channel.len());
    }

    #[test]
    fn contrast_keeps_gray_pixels_gray() {
        let img = RgbImage::from_fn(32, 32, |x, _| {
            let v = 90 + x as u8;
            Rgb([v, v, v])
        });
        let out = enhance_contrast(&img);
        assert_eq!(out.dimensions(), (32, 32));
        for p in out.pixels() {
            let [r, g, b] = p.0;
            assert!((r as i32 - g as i32).abs() <= 2 && (g as i32 - b as i32).abs() <= 2);
        }
    }
}
