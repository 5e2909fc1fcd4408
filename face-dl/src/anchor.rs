//! The fixed multi-scale anchor grid.

use crate::common::*;

/// An anchor box in normalized center form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    pub cx: f32,
    pub cy: f32,
    pub s_kx: f32,
    pub s_ky: f32,
}

impl Anchor {
    pub fn to_cycxhw(&self) -> CyCxHW<f32> {
        CyCxHW::from_cycxhw_unchecked([self.cy, self.cx, self.s_ky, self.s_kx])
    }

    pub fn to_tlbr(&self) -> TLBR<f32> {
        TLBR::from(self.to_cycxhw())
    }
}

impl From<CyCxHW<f32>> for Anchor {
    fn from(from: CyCxHW<f32>) -> Self {
        Self {
            cx: from.cx(),
            cy: from.cy(),
            s_kx: from.w(),
            s_ky: from.h(),
        }
    }
}

/// Anchor grid options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorGridInit {
    /// The square input image size in pixels.
    pub image_size: usize,
    /// The stride of each feature level in pixels.
    pub steps: Vec<usize>,
    /// The anchor sizes of each feature level in pixels.
    pub min_sizes: Vec<Vec<usize>>,
    /// Clamp anchor geometry into `[0, 1]`.
    pub clip: bool,
}

impl Default for AnchorGridInit {
    fn default() -> Self {
        Self {
            image_size: 640,
            steps: vec![8, 16, 32],
            min_sizes: vec![vec![16, 32], vec![64, 128], vec![256, 512]],
            clip: false,
        }
    }
}

impl AnchorGridInit {
    pub fn build(self) -> Result<AnchorGrid> {
        let Self {
            image_size,
            steps,
            min_sizes,
            clip,
        } = self;

        ensure!(image_size > 0, "image_size must be positive");
        ensure!(!steps.is_empty(), "steps must not be empty");
        ensure!(
            steps.len() == min_sizes.len(),
            "steps and min_sizes must have the same number of levels, but get {} and {}",
            steps.len(),
            min_sizes.len()
        );
        ensure!(
            steps.iter().all(|&step| step > 0),
            "steps must be positive"
        );
        ensure!(
            min_sizes
                .iter()
                .all(|sizes| !sizes.is_empty() && sizes.iter().all(|&size| size > 0)),
            "each level must have at least one positive anchor size"
        );

        let size = image_size as f64;
        let anchors: Vec<_> = steps
            .iter()
            .zip(min_sizes.iter())
            .flat_map(|(&step, sizes)| {
                let feature_size = (image_size + step - 1) / step;
                let step = step as f64;

                itertools::iproduct!(0..feature_size, 0..feature_size, sizes.iter()).map(
                    move |(row, col, &min_size)| {
                        let cy = ((row as f64 + 0.5) * step / size) as f32;
                        let cx = ((col as f64 + 0.5) * step / size) as f32;
                        let side = (min_size as f64 / size) as f32;
                        let anchor = CyCxHW::from_cycxhw_unchecked([cy, cx, side, side]);

                        if clip {
                            Anchor::from(anchor.clamp_unit())
                        } else {
                            Anchor::from(anchor)
                        }
                    },
                )
            })
            .collect();

        Ok(AnchorGrid {
            image_size,
            anchors,
        })
    }
}

/// The anchor table shared by all encoding calls.
#[derive(Debug, Clone)]
pub struct AnchorGrid {
    image_size: usize,
    anchors: Vec<Anchor>,
}

impl AnchorGrid {
    pub fn image_size(&self) -> usize {
        self.image_size
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    pub fn anchors(&self) -> &[Anchor] {
        &self.anchors
    }
}
