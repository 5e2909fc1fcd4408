//! The random square crop that keeps at least one whole face.

use crate::common::*;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RandomCropInit {
    /// Candidate crop sides relative to the shorter image side.
    pub scales: Vec<R64>,
    /// The number of crop attempts before giving up.
    pub max_attempts: usize,
}

impl Default for RandomCropInit {
    fn default() -> Self {
        Self {
            scales: [0.3, 0.45, 0.6, 0.8, 1.0]
                .into_iter()
                .map(r64)
                .collect(),
            max_attempts: 250,
        }
    }
}

impl RandomCropInit {
    pub fn build(self) -> Result<RandomCrop> {
        let Self {
            scales,
            max_attempts,
        } = self;

        ensure!(!scales.is_empty(), "scales must not be empty");
        ensure!(
            scales.iter().all(|&scale| scale > 0.0 && scale <= 1.0),
            "scales must be in range (0, 1]"
        );

        Ok(RandomCrop {
            scales: scales.into_iter().map(|scale| scale.raw()).collect(),
            max_attempts,
        })
    }
}

/// The output of [RandomCrop].
#[derive(Debug, Clone)]
pub struct CropOutput {
    pub image: RgbImage,
    /// Face labels in pixel units of the output image.
    pub labels: Vec<FaceLabel<f32>>,
    /// Whether a crop was taken. The image is square if so.
    pub cropped: bool,
}

#[derive(Debug, Clone)]
pub struct RandomCrop {
    scales: Vec<f64>,
    max_attempts: usize,
}

impl RandomCrop {
    /// Crop a random square region.
    ///
    /// An attempt succeeds if some face lies entirely inside the region and
    /// some face centered inside the region keeps a positive size after
    /// clipping. Faces centered outside are dropped. If every attempt fails,
    /// the input is returned unchanged with `cropped` unset.
    pub fn forward<R>(&self, image: RgbImage, labels: Vec<FaceLabel<f32>>, rng: &mut R) -> CropOutput
    where
        R: Rng,
    {
        let (width, height) = image.dimensions();
        let short_side = width.min(height);

        for _ in 0..self.max_attempts {
            let scale = self.scales[rng.gen_range(0..self.scales.len())];
            let side = ((scale * short_side as f64) as u32).max(1).min(short_side);
            let left = if width > side {
                rng.gen_range(0..(width - side))
            } else {
                0
            };
            let top = if height > side {
                rng.gen_range(0..(height - side))
            } else {
                0
            };

            if let Some(cropped_labels) = crop_labels(&labels, top, left, side) {
                let image = imageops::crop_imm(&image, left, top, side, side).to_image();
                return CropOutput {
                    image,
                    labels: cropped_labels,
                    cropped: true,
                };
            }
        }

        CropOutput {
            image,
            labels,
            cropped: false,
        }
    }
}

/// Move the labels into the square region, or `None` if the region is rejected.
fn crop_labels(
    labels: &[FaceLabel<f32>],
    top: u32,
    left: u32,
    side: u32,
) -> Option<Vec<FaceLabel<f32>>> {
    let roi = TLBR::from_xyxy([
        left as f32,
        top as f32,
        (left + side) as f32,
        (top + side) as f32,
    ]);

    // require a face entirely inside the region
    let any_contained = labels.iter().any(|label| label.rect.iof_with(&roi) >= 1.0);
    if !any_contained {
        return None;
    }

    let side = side as f32;
    let bound = TLBR::from_xyxy([0.0, 0.0, side, side]);
    let shift = Transform::translate(-roi.t(), -roi.l());

    let cropped: Vec<_> = labels
        .iter()
        .filter(|label| roi.contains_point(label.rect.cy(), label.rect.cx()))
        .map(|label| {
            let label = label.transform(&shift);
            let rect = label.rect.clamp_to(&bound);
            let landmarks = label
                .landmarks
                .map(|point| point.clamp(Point::new(0.0, 0.0), Point::new(side, side)));
            FaceLabel {
                rect,
                landmarks,
                ..label
            }
        })
        .filter(|label| label.rect.h() > 0.0 && label.rect.w() > 0.0)
        .collect();

    (!cropped.is_empty()).then(|| cropped)
}
