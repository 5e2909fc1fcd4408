//! Ground truth to anchor matching and target encoding.

use crate::{
    anchor::{Anchor, AnchorGrid},
    common::*,
};

/// The smallest box extent fed into the log-scale encoding.
const MIN_EXTENT: f32 = 1e-6;

/// The `conf` value of anchors in the ignore band. Such anchors are neither
/// faces nor background and take no part in the loss.
pub const IGNORE_LABEL: i64 = -2;

/// Target encoder options.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetEncoderInit {
    /// Variance of center offsets and log-scale offsets.
    pub variance: [f32; 2],
    /// Anchors matching a face below this IoU are background.
    pub match_thresh: f32,
    /// If set, anchors whose best IoU lies in `[ignore_thresh, match_thresh)`
    /// are marked [IGNORE_LABEL] instead of background.
    pub ignore_thresh: Option<f32>,
    /// Clamp matched boxes into the unit square before encoding.
    pub clip: bool,
}

impl Default for TargetEncoderInit {
    fn default() -> Self {
        Self {
            variance: [0.1, 0.2],
            match_thresh: 0.35,
            ignore_thresh: None,
            clip: false,
        }
    }
}

impl TargetEncoderInit {
    pub fn build(self, anchors: Arc<AnchorGrid>) -> Result<TargetEncoder> {
        let Self {
            variance,
            match_thresh,
            ignore_thresh,
            clip,
        } = self;

        ensure!(
            variance.iter().all(|&value| value > 0.0),
            "variance must be positive, but get {:?}",
            variance
        );
        ensure!(
            (0.0..=1.0).contains(&match_thresh),
            "match_thresh must be in range [0, 1]"
        );
        if let Some(ignore_thresh) = ignore_thresh {
            ensure!(
                (0.0..=match_thresh).contains(&ignore_thresh),
                "ignore_thresh must be in range [0, match_thresh]"
            );
        }
        ensure!(!anchors.is_empty(), "the anchor grid is empty");

        Ok(TargetEncoder {
            anchors,
            variance,
            match_thresh,
            ignore_thresh,
            clip,
        })
    }
}

/// The training targets of one image.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedTarget {
    /// Box regression targets, one per anchor.
    pub loc: Vec<[f32; 4]>,
    /// `0` for background, `-1` for matches without usable landmarks,
    /// [IGNORE_LABEL] inside the ignore band and the class id otherwise.
    pub conf: Vec<i64>,
    /// Landmark regression targets, one per anchor.
    pub landm: Vec<[f32; 2 * NUM_LANDMARKS]>,
}

impl EncodedTarget {
    fn zeros(num_anchors: usize) -> Self {
        Self {
            loc: vec![[0.0; 4]; num_anchors],
            conf: vec![0; num_anchors],
            landm: vec![[0.0; 2 * NUM_LANDMARKS]; num_anchors],
        }
    }

    pub fn num_anchors(&self) -> usize {
        self.conf.len()
    }

    /// The number of anchors matched to a face.
    pub fn num_matched(&self) -> usize {
        self.conf
            .iter()
            .filter(|&&conf| conf != 0 && conf != IGNORE_LABEL)
            .count()
    }

    /// The number of anchors in the ignore band.
    pub fn num_ignored(&self) -> usize {
        self.conf
            .iter()
            .filter(|&&conf| conf == IGNORE_LABEL)
            .count()
    }

    /// Convert to `[A, 4]` loc, `[A]` conf and `[A, 10]` landmark tensors.
    pub fn to_tensors(&self) -> (Tensor, Tensor, Tensor) {
        let num_anchors = self.num_anchors() as i64;
        let loc: Vec<f32> = self.loc.iter().flatten().copied().collect();
        let landm: Vec<f32> = self.landm.iter().flatten().copied().collect();

        let loc = Tensor::of_slice(&loc).view([num_anchors, 4]);
        let conf = Tensor::of_slice(&self.conf);
        let landm = Tensor::of_slice(&landm).view([num_anchors, 2 * NUM_LANDMARKS as i64]);
        (loc, conf, landm)
    }
}

/// The assignment of anchors to ground truths.
#[derive(Debug, Clone, PartialEq)]
pub struct Matching {
    /// The ground truth index assigned to each anchor.
    pub gt_index: Vec<usize>,
    /// The IoU of each anchor with its ground truth, `2.0` for forced matches.
    pub overlap: Vec<f32>,
}

/// Encodes face labels into per-anchor training targets.
#[derive(Debug, Clone)]
pub struct TargetEncoder {
    anchors: Arc<AnchorGrid>,
    variance: [f32; 2],
    match_thresh: f32,
    ignore_thresh: Option<f32>,
    clip: bool,
}

impl TargetEncoder {
    pub fn anchors(&self) -> &AnchorGrid {
        &self.anchors
    }

    pub fn num_anchors(&self) -> usize {
        self.anchors.len()
    }

    /// Encode labels in ratio units into anchor targets.
    pub fn encode(&self, labels: &[FaceLabel<f32>]) -> EncodedTarget {
        let anchors = self.anchors.anchors();
        let mut target = EncodedTarget::zeros(anchors.len());

        let Matching { gt_index, overlap } = match self.match_anchors(labels) {
            Some(matching) => matching,
            None => return target,
        };

        izip!(
            anchors,
            gt_index,
            overlap,
            &mut target.loc,
            &mut target.conf,
            &mut target.landm
        )
        .for_each(|(anchor, gt_index, overlap, loc, conf, landm)| {
            let label = &labels[gt_index];

            if overlap >= self.match_thresh {
                *loc = self.encode_box(&label.rect, anchor);

                if label.landmark_valid {
                    *conf = 1;
                    *landm = self.encode_landmarks(&label.landmarks, anchor);
                } else {
                    *conf = -1;
                }
            } else if matches!(self.ignore_thresh, Some(ignore_thresh) if overlap >= ignore_thresh)
            {
                // regression targets stay zero
                *conf = IGNORE_LABEL;
            }
        });

        target
    }

    /// Assign a ground truth to every anchor.
    ///
    /// Each anchor takes the ground truth of highest IoU. Each ground truth
    /// then claims its best anchor regardless of the threshold. Ties go to the
    /// lowest index. Returns `None` if there is no ground truth.
    pub fn match_anchors(&self, labels: &[FaceLabel<f32>]) -> Option<Matching> {
        if labels.is_empty() {
            return None;
        }

        let anchor_rects: Vec<_> = self
            .anchors
            .anchors()
            .iter()
            .map(|anchor| anchor.to_tlbr())
            .collect();
        let num_anchors = anchor_rects.len();

        let mut gt_index = vec![0; num_anchors];
        let mut overlap = vec![f32::NEG_INFINITY; num_anchors];
        let mut best_anchors = Vec::with_capacity(labels.len());

        labels.iter().enumerate().for_each(|(label_index, label)| {
            let mut best_anchor = 0;
            let mut best_iou = f32::NEG_INFINITY;

            anchor_rects
                .iter()
                .enumerate()
                .for_each(|(anchor_index, anchor_rect)| {
                    let iou = label.rect.iou_with(anchor_rect);

                    if iou > best_iou {
                        best_iou = iou;
                        best_anchor = anchor_index;
                    }
                    if iou > overlap[anchor_index] {
                        overlap[anchor_index] = iou;
                        gt_index[anchor_index] = label_index;
                    }
                });

            best_anchors.push(best_anchor);
        });

        // later ground truths win a shared best anchor
        best_anchors
            .into_iter()
            .enumerate()
            .for_each(|(label_index, anchor_index)| {
                overlap[anchor_index] = 2.0;
                gt_index[anchor_index] = label_index;
            });

        Some(Matching { gt_index, overlap })
    }

    /// Encode a corner-form box against an anchor.
    pub fn encode_box(&self, rect: &TLBR<f32>, anchor: &Anchor) -> [f32; 4] {
        let [v0, v1] = self.variance;
        let rect = if self.clip {
            rect.clamp_to(&TLBR::from_xyxy([0.0, 0.0, 1.0, 1.0]))
        } else {
            *rect
        };

        let dx = (rect.cx() - anchor.cx) / (v0 * anchor.s_kx);
        let dy = (rect.cy() - anchor.cy) / (v0 * anchor.s_ky);
        let dw = (rect.w().max(MIN_EXTENT) / anchor.s_kx).ln() / v1;
        let dh = (rect.h().max(MIN_EXTENT) / anchor.s_ky).ln() / v1;
        [dx, dy, dw, dh]
    }

    /// Invert [encode_box](TargetEncoder::encode_box).
    pub fn decode_box(&self, loc: &[f32; 4], anchor: &Anchor) -> TLBR<f32> {
        let [v0, v1] = self.variance;
        let [dx, dy, dw, dh] = *loc;

        let cx = anchor.cx + dx * v0 * anchor.s_kx;
        let cy = anchor.cy + dy * v0 * anchor.s_ky;
        let w = anchor.s_kx * (dw * v1).exp();
        let h = anchor.s_ky * (dh * v1).exp();
        TLBR::from(CyCxHW::from_cycxhw_unchecked([cy, cx, h, w]))
    }

    /// Encode landmark points against an anchor.
    pub fn encode_landmarks(
        &self,
        points: &[Point<f32>; NUM_LANDMARKS],
        anchor: &Anchor,
    ) -> [f32; 2 * NUM_LANDMARKS] {
        let [v0, _] = self.variance;
        let mut output = [0.0; 2 * NUM_LANDMARKS];
        points.iter().enumerate().for_each(|(index, point)| {
            output[index * 2] = (point.x - anchor.cx) / (v0 * anchor.s_kx);
            output[index * 2 + 1] = (point.y - anchor.cy) / (v0 * anchor.s_ky);
        });
        output
    }
}
