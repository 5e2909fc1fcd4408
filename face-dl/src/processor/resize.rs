use crate::common::*;

/// Interpolation filters picked from at random when resizing.
pub const RESIZE_FILTERS: [FilterType; 5] = [
    FilterType::Nearest,
    FilterType::Triangle,
    FilterType::CatmullRom,
    FilterType::Gaussian,
    FilterType::Lanczos3,
];

/// Pad the image to a square with the fill color. The original content stays
/// at the top-left corner, so pixel coordinates are unchanged.
pub fn pad_to_square(image: &RgbImage, fill: Rgb<u8>) -> RgbImage {
    let (width, height) = image.dimensions();
    if width == height {
        return image.clone();
    }

    let side = width.max(height);
    let mut output = RgbImage::from_pixel(side, side, fill);
    imageops::replace(&mut output, image, 0, 0);
    output
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RandomResizeInit {
    /// The side of the square output image.
    pub image_size: usize,
}

impl RandomResizeInit {
    pub fn build(self) -> Result<RandomResize> {
        let Self { image_size } = self;
        ensure!(image_size > 0, "image_size must be positive");
        let image_size = u32::try_from(image_size)
            .with_context(|| format!("image_size {} is too large", image_size))?;
        Ok(RandomResize { image_size })
    }
}

/// Resizes an image to a fixed square with a randomly chosen filter.
#[derive(Debug, Clone)]
pub struct RandomResize {
    image_size: u32,
}

impl RandomResize {
    pub fn image_size(&self) -> u32 {
        self.image_size
    }

    /// Resize the image and convert the labels from pixel units to ratio units.
    pub fn forward<R>(
        &self,
        image: &RgbImage,
        labels: &[FaceLabel<f32>],
        rng: &mut R,
    ) -> Result<(RgbImage, Vec<FaceLabel<f32>>)>
    where
        R: Rng,
    {
        let (width, height) = image.dimensions();
        ensure!(
            width > 0 && height > 0,
            "cannot resize an empty image"
        );

        let filter = RESIZE_FILTERS[rng.gen_range(0..RESIZE_FILTERS.len())];
        let output = imageops::resize(image, self.image_size, self.image_size, filter);

        let to_ratio = {
            let size = HW::try_from_hw([height as f32, width as f32])?;
            let unit = HW::try_from_hw([1.0, 1.0])?;
            Transform::from_sizes_exact(&size, &unit)
        };
        let labels = labels.iter().map(|label| &to_ratio * label).collect();

        Ok((output, labels))
    }
}
