use image::{imageops, RgbaImage};

use crate::operation::TransformKind;

const BILATERAL_RANGE_SIGMA: f32 = 25.0;
const MAX_STRETCH_CLIP_PERCENT: u32 = 49;

fn clamp_channel(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

fn map_color_channels(image: &mut RgbaImage, map: impl Fn(f32) -> f32) {
    for pixel in image.pixels_mut() {
        for channel in &mut pixel.0[..3] {
            *channel = clamp_channel(map(f32::from(*channel)));
        }
    }
}

pub(super) fn contrast(image: &mut RgbaImage, delta: f32) {
    let factor = 1.0 + delta;
    map_color_channels(image, |value| (value - 127.5) * factor + 127.5);
}

pub(super) fn brightness(image: &mut RgbaImage, delta: f32) {
    let offset = delta * 255.0;
    map_color_channels(image, |value| value + offset);
}

pub(super) fn exposure(image: &mut RgbaImage, delta: f32, black_point: f32) {
    let gain = 2_f32.powf(delta);
    let black = black_point.clamp(0.0, 1.0) * 255.0;
    map_color_channels(image, |value| (value - black) * gain + black);
}

pub(super) fn hsl_adjust(image: &mut RgbaImage, hue: f32, saturation: f32, lightness: f32) {
    let hue_shift = hue * 180.0;
    let saturation_scale = (1.0 + saturation).max(0.0);
    let lightness_scale = (1.0 + lightness).max(0.0);
    for pixel in image.pixels_mut() {
        let [r, g, b, _] = pixel.0;
        let (h, s, l) = rgb_to_hsl(r, g, b);
        let h = (h + hue_shift).rem_euclid(360.0);
        let s = (s * saturation_scale).clamp(0.0, 1.0);
        let l = (l * lightness_scale).clamp(0.0, 1.0);
        let (r, g, b) = hsl_to_rgb(h, s, l);
        pixel.0[0] = r;
        pixel.0[1] = g;
        pixel.0[2] = b;
    }
}

fn rgb_to_hsl(r: u8, g: u8, b: u8) -> (f32, f32, f32) {
    let r = f32::from(r) / 255.0;
    let g = f32::from(g) / 255.0;
    let b = f32::from(b) / 255.0;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let l = (max + min) / 2.0;
    let d = max - min;
    if d <= f32::EPSILON {
        return (0.0, 0.0, l);
    }

    let s = if l > 0.5 {
        d / (2.0 - max - min)
    } else {
        d / (max + min)
    };
    let h = if max == r {
        (g - b) / d + if g < b { 6.0 } else { 0.0 }
    } else if max == g {
        (b - r) / d + 2.0
    } else {
        (r - g) / d + 4.0
    };
    (h * 60.0, s, l)
}

fn hsl_to_rgb(h: f32, s: f32, l: f32) -> (u8, u8, u8) {
    if s <= f32::EPSILON {
        let gray = clamp_channel(l * 255.0);
        return (gray, gray, gray);
    }

    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;
    let h = h / 360.0;
    let channel = |t: f32| {
        let t = t.rem_euclid(1.0);
        let value = if t < 1.0 / 6.0 {
            p + (q - p) * 6.0 * t
        } else if t < 0.5 {
            q
        } else if t < 2.0 / 3.0 {
            p + (q - p) * (2.0 / 3.0 - t) * 6.0
        } else {
            p
        };
        clamp_channel(value * 255.0)
    };
    (channel(h + 1.0 / 3.0), channel(h), channel(h - 1.0 / 3.0))
}

fn clamp_index(position: isize, len: usize) -> usize {
    position.clamp(0, len as isize - 1) as usize
}

/// Caps a kernel radius at the longer image side. Wider windows only add
/// more copies of the edge pixels.
fn bounded_radius(radius: u32, width: u32, height: u32) -> u32 {
    radius.min(width.max(height))
}

fn box_pass(src: &[u8], width: usize, height: usize, radius: usize, horizontal: bool) -> Vec<u8> {
    let mut dst = vec![0_u8; src.len()];
    let (lines, len) = if horizontal {
        (height, width)
    } else {
        (width, height)
    };
    let offset = |line: usize, position: usize| {
        if horizontal {
            (line * width + position) * 4
        } else {
            (position * width + line) * 4
        }
    };
    let window = (2 * radius + 1) as u64;
    let radius = radius as isize;

    for line in 0..lines {
        let mut sums = [0_u64; 4];
        for position in -radius..=radius {
            let at = offset(line, clamp_index(position, len));
            for (sum, value) in sums.iter_mut().zip(&src[at..at + 4]) {
                *sum += u64::from(*value);
            }
        }

        for position in 0..len {
            let at = offset(line, position);
            for (channel, sum) in sums.iter().enumerate() {
                dst[at + channel] = ((sum + window / 2) / window) as u8;
            }

            let leaving = offset(line, clamp_index(position as isize - radius, len));
            let entering = offset(line, clamp_index(position as isize + radius + 1, len));
            for channel in 0..4 {
                sums[channel] -= u64::from(src[leaving + channel]);
                sums[channel] += u64::from(src[entering + channel]);
            }
        }
    }
    dst
}

pub(super) fn box_blur(image: &mut RgbaImage, radius: u32) {
    let (width, height) = image.dimensions();
    if radius == 0 || width == 0 || height == 0 {
        return;
    }
    let radius = bounded_radius(radius, width, height);
    let (w, h, r) = (width as usize, height as usize, radius as usize);
    let horizontal = box_pass(image.as_raw(), w, h, r, true);
    let vertical = box_pass(&horizontal, w, h, r, false);
    image.copy_from_slice(&vertical);
}

pub(super) fn gaussian_blur(image: &mut RgbaImage, radius: u32) {
    if radius == 0 || image.width() == 0 || image.height() == 0 {
        return;
    }
    let radius = bounded_radius(radius, image.width(), image.height());
    let blurred = imageops::blur(&*image, radius as f32);
    *image = blurred;
}

pub(super) fn median_blur(image: &mut RgbaImage, radius: u32) {
    let (width, height) = image.dimensions();
    if radius == 0 || width == 0 || height == 0 {
        return;
    }
    let source = image.clone();
    let radius = bounded_radius(radius, width, height) as isize;
    let side = (2 * radius + 1) as usize;
    let mut window = Vec::with_capacity(side * side);

    for y in 0..height {
        for x in 0..width {
            let pixel = image.get_pixel_mut(x, y);
            for channel in 0..4 {
                window.clear();
                for dy in -radius..=radius {
                    let sy = clamp_index(y as isize + dy, height as usize) as u32;
                    for dx in -radius..=radius {
                        let sx = clamp_index(x as isize + dx, width as usize) as u32;
                        window.push(source.get_pixel(sx, sy).0[channel]);
                    }
                }
                let middle = window.len() / 2;
                let (_, median, _) = window.select_nth_unstable(middle);
                pixel.0[channel] = *median;
            }
        }
    }
}

pub(super) fn bilateral_blur(image: &mut RgbaImage, radius: u32) {
    let (width, height) = image.dimensions();
    if radius == 0 || width == 0 || height == 0 {
        return;
    }
    let source = image.clone();
    let radius = bounded_radius(radius, width, height);
    let spatial_sigma = radius as f32;
    let radius = radius as isize;
    let range_denominator = 2.0 * BILATERAL_RANGE_SIGMA * BILATERAL_RANGE_SIGMA;
    let spatial: Vec<f32> = (-radius..=radius)
        .flat_map(|dy| (-radius..=radius).map(move |dx| (dx, dy)))
        .map(|(dx, dy)| {
            let distance = (dx * dx + dy * dy) as f32;
            (-distance / (2.0 * spatial_sigma * spatial_sigma)).exp()
        })
        .collect();

    for y in 0..height {
        for x in 0..width {
            let center = source.get_pixel(x, y).0;
            let mut accumulated = [0_f32; 3];
            let mut total_weight = 0_f32;
            let mut taps = spatial.iter();
            for dy in -radius..=radius {
                let sy = clamp_index(y as isize + dy, height as usize) as u32;
                for dx in -radius..=radius {
                    let sx = clamp_index(x as isize + dx, width as usize) as u32;
                    let sample = source.get_pixel(sx, sy).0;
                    let color_distance: f32 = (0..3)
                        .map(|c| {
                            let d = f32::from(sample[c]) - f32::from(center[c]);
                            d * d
                        })
                        .sum();
                    let spatial_weight = taps.next().copied().unwrap_or(0.0);
                    let weight = spatial_weight * (-color_distance / range_denominator).exp();
                    for c in 0..3 {
                        accumulated[c] += weight * f32::from(sample[c]);
                    }
                    total_weight += weight;
                }
            }

            if total_weight > 0.0 {
                let pixel = image.get_pixel_mut(x, y);
                for c in 0..3 {
                    pixel.0[c] = clamp_channel(accumulated[c] / total_weight);
                }
            }
        }
    }
}

/// Stretches each color channel so that `clip_percent` of the pixels at
/// either end saturate.
pub(super) fn contrast_stretch(image: &mut RgbaImage, clip_percent: u32) {
    let total = image.pixels().len();
    if total == 0 {
        return;
    }
    let clip = total * clip_percent.min(MAX_STRETCH_CLIP_PERCENT) as usize / 100;

    for channel in 0..3 {
        let mut histogram = [0_usize; 256];
        for pixel in image.pixels() {
            histogram[usize::from(pixel.0[channel])] += 1;
        }

        let low = cumulative_bound(histogram.iter().enumerate(), clip);
        let high = cumulative_bound(histogram.iter().enumerate().rev(), clip);
        if high <= low {
            continue;
        }

        let scale = 255.0 / (high - low) as f32;
        for pixel in image.pixels_mut() {
            let value = f32::from(pixel.0[channel]) - low as f32;
            pixel.0[channel] = clamp_channel(value * scale);
        }
    }
}

fn cumulative_bound<'a>(bins: impl Iterator<Item = (usize, &'a usize)>, clip: usize) -> usize {
    let mut seen = 0;
    let mut last = 0;
    for (value, count) in bins {
        last = value;
        seen += count;
        if seen > clip {
            return value;
        }
    }
    last
}

pub(super) fn transform(image: &mut RgbaImage, kind: TransformKind) {
    match kind {
        TransformKind::Flip => imageops::flip_vertical_in_place(image),
        TransformKind::Flop => imageops::flip_horizontal_in_place(image),
        TransformKind::Transpose => {
            let rotated = imageops::rotate90(&*image);
            *image = imageops::flip_horizontal(&rotated);
        }
    }
}
