use super::*;
use crate::{common::*, dataset::DataRecord};

/// The random number generator of one sample in one epoch.
pub fn sample_rng(seed: u64, epoch: usize, index: usize) -> StdRng {
    let mut bytes = [0u8; 32];
    bytes[0..8].copy_from_slice(&seed.to_le_bytes());
    bytes[8..16].copy_from_slice(&(epoch as u64).to_le_bytes());
    bytes[16..24].copy_from_slice(&(index as u64).to_le_bytes());
    StdRng::from_seed(bytes)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PreprocessorInit {
    /// The side of the square output image.
    pub image_size: usize,
    /// The per-channel mean in RGB order, also used as the padding color.
    pub rgb_mean: [R64; 3],
    pub distort: PhotometricDistortInit,
    pub crop: RandomCropInit,
    pub flip: HorizontalFlipInit,
}

impl Default for PreprocessorInit {
    fn default() -> Self {
        Self {
            image_size: 640,
            rgb_mean: [r64(123.0), r64(117.0), r64(104.0)],
            distort: Default::default(),
            crop: Default::default(),
            flip: Default::default(),
        }
    }
}

impl PreprocessorInit {
    pub fn build(self) -> Result<Preprocessor> {
        let Self {
            image_size,
            rgb_mean,
            distort,
            crop,
            flip,
        } = self;

        ensure!(
            rgb_mean.iter().all(|&mean| (0.0..=255.0).contains(&mean.raw())),
            "rgb_mean must be in range [0, 255]"
        );
        let rgb_mean = rgb_mean.map(|mean| mean.raw() as f32);

        Ok(Preprocessor {
            rgb_mean,
            fill: Rgb(rgb_mean.map(|mean| mean.round() as u8)),
            distort: distort.build()?,
            crop: crop.build()?,
            resize: RandomResizeInit { image_size }.build()?,
            flip: flip.build()?,
        })
    }
}

/// A preprocessed training sample.
#[derive(Debug)]
pub struct PreprocessedSample {
    /// The mean-subtracted `[3, S, S]` float image.
    pub image: Tensor,
    /// Face labels in ratio units of the output image.
    pub labels: Vec<FaceLabel<f32>>,
}

/// The augmentation pipeline from a decoded record to a network input.
#[derive(Debug, Clone)]
pub struct Preprocessor {
    rgb_mean: [f32; 3],
    fill: Rgb<u8>,
    distort: PhotometricDistort,
    crop: RandomCrop,
    resize: RandomResize,
    flip: HorizontalFlip,
}

impl Preprocessor {
    pub fn image_size(&self) -> usize {
        self.resize.image_size() as usize
    }

    pub fn forward<R>(&self, record: DataRecord, rng: &mut R) -> Result<PreprocessedSample>
    where
        R: Rng,
    {
        let DataRecord { image, labels } = record;
        ensure!(!labels.is_empty(), "the record has no face labels");

        let image = self.distort.forward(&image, rng);

        let CropOutput {
            image,
            labels,
            cropped,
        } = self.crop.forward(image, labels, rng);

        // a successful crop is already square
        let image = if cropped {
            image
        } else {
            pad_to_square(&image, self.fill)
        };

        let (image, labels) = self.resize.forward(&image, &labels, rng)?;
        let (image, labels) = self.flip.forward(image, labels, rng);
        let image = subtract_mean(&image, self.rgb_mean);

        Ok(PreprocessedSample { image, labels })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> DataRecord {
        let image = RgbImage::from_fn(120, 80, |x, y| Rgb([x as u8, y as u8, 128]));
        let rect = TLBR::from_xyxy([30.0, 20.0, 60.0, 50.0]);
        let landmarks = [
            Point::new(38.0, 30.0),
            Point::new(52.0, 30.0),
            Point::new(45.0, 36.0),
            Point::new(40.0, 44.0),
            Point::new(50.0, 44.0),
        ];
        DataRecord {
            image,
            labels: vec![FaceLabel {
                rect,
                landmarks,
                landmark_valid: true,
            }],
        }
    }

    #[test]
    fn output_shape_and_ratio_labels() {
        let preprocessor = PreprocessorInit {
            image_size: 64,
            ..Default::default()
        }
        .build()
        .unwrap();

        (0..20).for_each(|index| {
            let mut rng = sample_rng(1, 0, index);
            let sample = preprocessor.forward(record(), &mut rng).unwrap();

            assert_eq!(sample.image.size(), vec![3, 64, 64]);
            assert!(!sample.labels.is_empty());
            sample.labels.iter().for_each(|label| {
                let [l, t, r, b] = label.rect.xyxy();
                assert!(l < r && t < b);
                assert!([l, t, r, b]
                    .iter()
                    .all(|&value| (0.0..=1.0 + 1e-6).contains(&value)));
            });
        });
    }

    #[test]
    fn same_seed_same_sample() {
        let preprocessor = PreprocessorInit {
            image_size: 32,
            ..Default::default()
        }
        .build()
        .unwrap();
        let lhs = preprocessor
            .forward(record(), &mut sample_rng(3, 2, 5))
            .unwrap();
        let rhs = preprocessor
            .forward(record(), &mut sample_rng(3, 2, 5))
            .unwrap();

        assert_eq!(lhs.labels, rhs.labels);
        assert!(lhs.image.equal(&rhs.image));
    }

    #[test]
    fn reject_record_without_labels() {
        let preprocessor = PreprocessorInit::default().build().unwrap();
        let record = DataRecord {
            image: RgbImage::new(8, 8),
            labels: vec![],
        };
        assert!(preprocessor
            .forward(record, &mut sample_rng(0, 0, 0))
            .is_err());
    }

    #[test]
    fn sample_rngs_differ_by_index_and_epoch() {
        let draw = |epoch, index| sample_rng(7, epoch, index).gen::<u64>();
        assert_eq!(draw(0, 0), draw(0, 0));
        assert_ne!(draw(0, 0), draw(0, 1));
        assert_ne!(draw(0, 0), draw(1, 0));
    }
}
