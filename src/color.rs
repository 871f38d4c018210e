use std::{fmt, str::FromStr};

use image::RgbaImage;

use crate::error::ResourceError;

/// Mean channel value below which an accent is too dark for the island's
/// background.
pub const BRIGHTNESS_FLOOR: f32 = 60.0;
const BRIGHTEN_FACTOR: f32 = 1.5;
const BRIGHTEN_BOOST: u16 = 60;

const MAX_SAMPLES: usize = 6_000;
const K: usize = 5;
const MAX_ITER: usize = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AccentColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl AccentColor {
    pub const SPOTIFY_GREEN: AccentColor = AccentColor::rgb(0x1D, 0xB9, 0x54);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn mean(&self) -> f32 {
        (self.r as f32 + self.g as f32 + self.b as f32) / 3.0
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// Lift dark colors so they stay legible on a dark background: scale by
    /// 1.5, and if that is still too dark add a flat +60 per channel.
    pub fn with_brightness_floor(self) -> Self {
        if self.mean() >= BRIGHTNESS_FLOOR {
            return self;
        }

        let scale = |c: u8| (c as f32 * BRIGHTEN_FACTOR).min(255.0) as u8;
        let scaled = AccentColor::rgb(scale(self.r), scale(self.g), scale(self.b));
        if scaled.mean() >= BRIGHTNESS_FLOOR {
            return scaled;
        }

        let boost = |c: u8| (c as u16 + BRIGHTEN_BOOST).min(255) as u8;
        AccentColor::rgb(boost(scaled.r), boost(scaled.g), boost(scaled.b))
    }
}

impl Default for AccentColor {
    fn default() -> Self {
        AccentColor::SPOTIFY_GREEN
    }
}

impl fmt::Display for AccentColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for AccentColor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(format!("expected #rrggbb, got {s:?}"));
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16).map_err(|e| format!("invalid color {s:?}: {e}"))
        };
        Ok(AccentColor::rgb(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }
}

type Rgb = [f32; 3];

/// Pixels more transparent than this do not vote.
const MIN_ALPHA: u8 = 16;
/// Squared centroid movement below which clustering has settled.
const SETTLED: f32 = 1e-2;

/// Opaque pixels, thinned by a fixed stride to at most `MAX_SAMPLES`.
fn opaque_samples(image: &RgbaImage) -> Vec<Rgb> {
    let total = image.width() as usize * image.height() as usize;
    let stride = (total / MAX_SAMPLES).max(1);
    image
        .pixels()
        .step_by(stride)
        .filter(|pixel| pixel.0[3] >= MIN_ALPHA)
        .take(MAX_SAMPLES)
        .map(|pixel| [pixel.0[0] as f32, pixel.0[1] as f32, pixel.0[2] as f32])
        .collect()
}

fn distance_sq(a: &Rgb, b: &Rgb) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn saturation(rgb: &Rgb) -> f32 {
    let max = rgb.iter().copied().fold(0.0, f32::max);
    let min = rgb.iter().copied().fold(255.0, f32::min);
    if max <= 0.0 {
        0.0
    } else {
        (max - min) / max
    }
}

/// Running sums for one cluster.
#[derive(Clone, Copy, Default)]
struct Swatch {
    sum: Rgb,
    population: usize,
}

impl Swatch {
    fn add(&mut self, sample: &Rgb) {
        for (acc, channel) in self.sum.iter_mut().zip(sample) {
            *acc += channel;
        }
        self.population += 1;
    }

    fn mean(&self) -> Option<Rgb> {
        if self.population == 0 {
            return None;
        }
        let n = self.population as f32;
        Some([self.sum[0] / n, self.sum[1] / n, self.sum[2] / n])
    }
}

fn nearest(centers: &[Rgb], sample: &Rgb) -> usize {
    centers
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| distance_sq(a, sample).total_cmp(&distance_sq(b, sample)))
        .map(|(idx, _)| idx)
        .unwrap_or(0)
}

/// Lloyd's k-means seeded from evenly spaced samples. Empty clusters are
/// reseeded from the sample list so every round keeps `k` candidates.
fn cluster(samples: &[Rgb], k: usize) -> Vec<Swatch> {
    let k = k.min(samples.len());
    if k == 0 {
        return Vec::new();
    }

    let mut centers: Vec<Rgb> = (0..k).map(|i| samples[i * samples.len() / k]).collect();
    let mut swatches = Vec::new();

    for round in 0..MAX_ITER {
        swatches = vec![Swatch::default(); k];
        for sample in samples {
            swatches[nearest(&centers, sample)].add(sample);
        }

        let mut moved = false;
        for (idx, (center, swatch)) in centers.iter_mut().zip(&swatches).enumerate() {
            let next = swatch
                .mean()
                .unwrap_or(samples[(idx + round) % samples.len()]);
            moved |= distance_sq(center, &next) > SETTLED;
            *center = next;
        }
        if !moved {
            break;
        }
    }

    swatches
}

fn to_accent(rgb: Rgb) -> AccentColor {
    let channel = |v: f32| v.clamp(0.0, 255.0).round() as u8;
    AccentColor::rgb(channel(rgb[0]), channel(rgb[1]), channel(rgb[2]))
}

/// Mean of the most populated cluster, before any brightening. Equal
/// populations go to the more saturated cluster.
pub fn dominant_color(image: &RgbaImage) -> Option<AccentColor> {
    let samples = opaque_samples(image);
    cluster(&samples, K)
        .iter()
        .filter_map(|swatch| Some((swatch.population, swatch.mean()?)))
        .max_by(|(pa, a), (pb, b)| {
            pa.cmp(pb)
                .then_with(|| saturation(a).total_cmp(&saturation(b)))
        })
        .map(|(_, mean)| to_accent(mean))
}

/// Dominant color with the brightness floor applied.
pub fn accent_from_image(image: &RgbaImage) -> Result<AccentColor, ResourceError> {
    dominant_color(image)
        .map(AccentColor::with_brightness_floor)
        .ok_or(ResourceError::Empty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn dark_color_is_lifted_over_the_floor() {
        let lifted = AccentColor::rgb(30, 30, 30).with_brightness_floor();
        assert!(lifted.mean() >= BRIGHTNESS_FLOOR, "got {lifted}");
        assert_eq!(lifted, AccentColor::rgb(105, 105, 105));
    }

    #[test]
    fn scaling_alone_is_enough_for_moderately_dark_colors() {
        let lifted = AccentColor::rgb(50, 40, 45).with_brightness_floor();
        assert_eq!(lifted, AccentColor::rgb(75, 60, 67));
    }

    #[test]
    fn bright_color_is_unchanged() {
        let color = AccentColor::rgb(200, 200, 200);
        assert_eq!(color.with_brightness_floor(), color);
    }

    #[test]
    fn hex_round_trips_through_display() {
        let color: AccentColor = "#1DB954".parse().unwrap();
        assert_eq!(color, AccentColor::SPOTIFY_GREEN);
        assert_eq!(color.to_string(), "#1db954");
        assert!("1db95".parse::<AccentColor>().is_err());
    }

    #[test]
    fn dominant_color_follows_majority_of_pixels() {
        let mut image = RgbaImage::from_pixel(10, 10, Rgba([200, 20, 20, 255]));
        for x in 0..10 {
            for y in 0..3 {
                image.put_pixel(x, y, Rgba([20, 20, 200, 255]));
            }
        }
        let color = dominant_color(&image).unwrap();
        assert!(color.r > 150 && color.b < 60, "got {color}");
    }

    #[test]
    fn even_split_prefers_the_saturated_color() {
        let mut image = RgbaImage::from_pixel(10, 10, Rgba([128, 128, 128, 255]));
        for x in 0..10 {
            for y in 5..10 {
                image.put_pixel(x, y, Rgba([200, 40, 40, 255]));
            }
        }
        assert_eq!(dominant_color(&image), Some(AccentColor::rgb(200, 40, 40)));
    }

    #[test]
    fn solid_image_yields_its_own_color() {
        let image = RgbaImage::from_pixel(8, 8, Rgba([12, 140, 90, 255]));
        assert_eq!(dominant_color(&image), Some(AccentColor::rgb(12, 140, 90)));
    }

    #[test]
    fn transparent_image_has_no_accent() {
        let image = RgbaImage::from_pixel(4, 4, Rgba([255, 255, 255, 0]));
        assert!(matches!(accent_from_image(&image), Err(ResourceError::Empty)));
    }
}
