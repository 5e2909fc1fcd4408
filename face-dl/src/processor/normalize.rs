use crate::common::*;

/// Subtract the per-channel mean and lay the image out as a `[3, H, W]` float tensor.
pub fn subtract_mean(image: &RgbImage, rgb_mean: [f32; 3]) -> Tensor {
    let (width, height) = image.dimensions();
    let num_pixels = (width * height) as usize;

    let mut data = vec![0f32; 3 * num_pixels];
    image.pixels().enumerate().for_each(|(index, pixel)| {
        izip!(0.., pixel.0, rgb_mean).for_each(|(channel, value, mean)| {
            data[channel * num_pixels + index] = value as f32 - mean;
        });
    });

    Tensor::of_slice(&data).view([3, height as i64, width as i64])
}
