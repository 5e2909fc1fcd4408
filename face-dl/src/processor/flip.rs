use crate::common::*;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HorizontalFlipInit {
    /// The probability to mirror a sample.
    pub prob: R64,
}

impl Default for HorizontalFlipInit {
    fn default() -> Self {
        Self { prob: r64(0.5) }
    }
}

impl HorizontalFlipInit {
    pub fn build(self) -> Result<HorizontalFlip> {
        let Self { prob } = self;
        ensure!(
            (0.0..=1.0).contains(&prob.raw()),
            "prob must be in range [0, 1]"
        );
        Ok(HorizontalFlip { prob: prob.raw() })
    }
}

/// Randomly mirrors an image together with its labels in ratio units.
#[derive(Debug, Clone)]
pub struct HorizontalFlip {
    prob: f64,
}

impl HorizontalFlip {
    pub fn forward<R>(
        &self,
        image: RgbImage,
        labels: Vec<FaceLabel<f32>>,
        rng: &mut R,
    ) -> (RgbImage, Vec<FaceLabel<f32>>)
    where
        R: Rng,
    {
        if rng.gen_bool(self.prob) {
            let image = imageops::flip_horizontal(&image);
            let labels = labels.iter().map(|label| label.mirror(1.0)).collect();
            (image, labels)
        } else {
            (image, labels)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn always_flip() {
        let flip = HorizontalFlipInit { prob: r64(1.0) }.build().unwrap();
        let mut image = RgbImage::new(4, 2);
        image.put_pixel(0, 1, Rgb([255, 0, 0]));
        let label = FaceLabel {
            rect: TLBR::from_xyxy([0.1, 0.2, 0.3, 0.4]),
            landmarks: [
                Point::new(0.12, 0.25),
                Point::new(0.28, 0.25),
                Point::new(0.2, 0.3),
                Point::new(0.14, 0.35),
                Point::new(0.26, 0.35),
            ],
            landmark_valid: true,
        };

        let (image, labels) = flip.forward(image, vec![label], &mut StdRng::seed_from_u64(0));
        assert_eq!(*image.get_pixel(3, 1), Rgb([255, 0, 0]));

        let [l, t, r, b] = labels[0].rect.xyxy();
        assert_abs_diff_eq!(l, 0.7, epsilon = 1e-6);
        assert_abs_diff_eq!(t, 0.2, epsilon = 1e-6);
        assert_abs_diff_eq!(r, 0.9, epsilon = 1e-6);
        assert_abs_diff_eq!(b, 0.4, epsilon = 1e-6);

        // the left eye of the mirrored face comes from the right eye
        assert_abs_diff_eq!(labels[0].landmarks[0].x, 0.72, epsilon = 1e-6);
        assert_abs_diff_eq!(labels[0].landmarks[1].x, 0.88, epsilon = 1e-6);
        assert_abs_diff_eq!(labels[0].landmarks[3].x, 0.74, epsilon = 1e-6);
    }

    #[test]
    fn never_flip() {
        let flip = HorizontalFlipInit { prob: r64(0.0) }.build().unwrap();
        let image = RgbImage::from_fn(3, 3, |x, y| Rgb([x as u8, y as u8, 0]));
        let labels = vec![FaceLabel::without_landmarks(TLBR::from_xyxy([
            0.1, 0.1, 0.2, 0.2,
        ]))];
        let (output, output_labels) =
            flip.forward(image.clone(), labels.clone(), &mut StdRng::seed_from_u64(0));
        assert_eq!(output, image);
        assert_eq!(output_labels, labels);
    }

    #[test]
    fn reject_invalid_prob() {
        assert!(HorizontalFlipInit { prob: r64(1.5) }.build().is_err());
    }
}
