//! The random photometric distortion algorithm.

use crate::common::*;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhotometricDistortInit {
    /// The maximum additive brightness shift in pixel units.
    pub brightness_delta: R64,
    /// The range of the multiplicative contrast factor.
    pub contrast_range: (R64, R64),
    /// The range of the multiplicative saturation factor.
    pub saturation_range: (R64, R64),
    /// The maximum hue shift on the 180-degree scale.
    pub hue_delta: i32,
}

impl Default for PhotometricDistortInit {
    fn default() -> Self {
        Self {
            brightness_delta: r64(32.0),
            contrast_range: (r64(0.5), r64(1.5)),
            saturation_range: (r64(0.5), r64(1.5)),
            hue_delta: 18,
        }
    }
}

impl PhotometricDistortInit {
    pub fn build(self) -> Result<PhotometricDistort> {
        let Self {
            brightness_delta,
            contrast_range,
            saturation_range,
            hue_delta,
        } = self;

        ensure!(
            brightness_delta >= 0.0,
            "brightness_delta must be non-negative"
        );
        let check_range = |name: &str, (lo, up): (R64, R64)| -> Result<(f32, f32)> {
            ensure!(lo >= 0.0, "{} min must be non-negative", name);
            ensure!(lo <= up, "{} min must not exceed {} max", name, name);
            Ok((lo.raw() as f32, up.raw() as f32))
        };
        let contrast_range = check_range("contrast_range", contrast_range)?;
        let saturation_range = check_range("saturation_range", saturation_range)?;
        ensure!(
            (0..180).contains(&hue_delta),
            "hue_delta must be in range [0, 180)"
        );

        Ok(PhotometricDistort {
            brightness_delta: brightness_delta.raw() as f32,
            contrast_range,
            saturation_range,
            hue_delta,
        })
    }
}

/// Randomly shifts brightness, contrast, saturation and hue of an image.
///
/// Each adjustment is applied with probability one half. Contrast goes either
/// before or after the saturation and hue adjustments, also with equal chance.
#[derive(Debug, Clone)]
pub struct PhotometricDistort {
    brightness_delta: f32,
    contrast_range: (f32, f32),
    saturation_range: (f32, f32),
    hue_delta: i32,
}

impl PhotometricDistort {
    pub fn forward<R>(&self, image: &RgbImage, rng: &mut R) -> RgbImage
    where
        R: Rng,
    {
        let mut image = image.clone();
        let contrast_first: bool = rng.gen();

        if rng.gen::<bool>() && self.brightness_delta > 0.0 {
            let delta = rng.gen_range(-self.brightness_delta..=self.brightness_delta);
            map_channels(&mut image, |value| value + delta);
        }

        if contrast_first {
            self.random_contrast(&mut image, rng);
        }

        let saturation = rng.gen::<bool>().then(|| {
            let (lo, up) = self.saturation_range;
            rng.gen_range(lo..=up)
        });
        let hue_shift = rng
            .gen::<bool>()
            .then(|| rng.gen_range(-self.hue_delta..=self.hue_delta));
        if saturation.is_some() || hue_shift.is_some() {
            distort_hsv(&mut image, saturation, hue_shift);
        }

        if !contrast_first {
            self.random_contrast(&mut image, rng);
        }

        image
    }

    fn random_contrast<R>(&self, image: &mut RgbImage, rng: &mut R)
    where
        R: Rng,
    {
        if rng.gen::<bool>() {
            let (lo, up) = self.contrast_range;
            let alpha = rng.gen_range(lo..=up);
            map_channels(image, |value| value * alpha);
        }
    }
}

/// Apply `f` on every channel value, saturating the result into `[0, 255]`.
fn map_channels<F>(image: &mut RgbImage, f: F)
where
    F: Fn(f32) -> f32,
{
    image.pixels_mut().for_each(|pixel| {
        pixel.0.iter_mut().for_each(|value| {
            *value = f(*value as f32).max(0.0).min(255.0) as u8;
        });
    });
}

fn distort_hsv(image: &mut RgbImage, saturation: Option<f32>, hue_shift: Option<i32>) {
    image.pixels_mut().for_each(|pixel| {
        let [mut h, mut s, v] = rgb_to_hsv(pixel.0);
        if let Some(alpha) = saturation {
            s = (s as f32 * alpha).max(0.0).min(255.0) as u8;
        }
        if let Some(shift) = hue_shift {
            h = (h as i32 + shift).rem_euclid(180) as u8;
        }
        pixel.0 = hsv_to_rgb([h, s, v]);
    });
}

/// Convert a pixel to HSV with hue on the `[0, 180)` scale and saturation and
/// value on the `[0, 255]` scale.
pub fn rgb_to_hsv(rgb: [u8; 3]) -> [u8; 3] {
    let [r, g, b] = rgb.map(|value| value as f32);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let diff = max - min;

    let s = if max > 0.0 { 255.0 * diff / max } else { 0.0 };
    let h = if diff == 0.0 {
        0.0
    } else if max == r {
        60.0 * (g - b) / diff
    } else if max == g {
        120.0 + 60.0 * (b - r) / diff
    } else {
        240.0 + 60.0 * (r - g) / diff
    };
    let h = if h < 0.0 { h + 360.0 } else { h };

    [
        ((h / 2.0).round() as u32 % 180) as u8,
        s.round() as u8,
        max as u8,
    ]
}

/// The inverse of [rgb_to_hsv].
pub fn hsv_to_rgb(hsv: [u8; 3]) -> [u8; 3] {
    let h = hsv[0] as f32 * 2.0;
    let s = hsv[1] as f32 / 255.0;
    let v = hsv[2] as f32;

    let c = v * s;
    let sector = h / 60.0;
    let x = c * (1.0 - (sector % 2.0 - 1.0).abs());
    let m = v - c;

    let (r, g, b) = match sector as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };

    [r, g, b].map(|value| (value + m).round().max(0.0).min(255.0) as u8)
}
