use super::{hard_negative_mask, CrossEntropyLoss};
use crate::{common::*, encoder::IGNORE_LABEL};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MultiBoxLossInit {
    /// The number of classes including the background.
    pub num_classes: usize,
    /// The number of hard negatives kept per positive anchor.
    pub neg_pos_ratio: usize,
    /// The transition point of the smooth L1 loss.
    pub smooth_l1_beta: R64,
}

impl Default for MultiBoxLossInit {
    fn default() -> Self {
        Self {
            num_classes: 2,
            neg_pos_ratio: 7,
            smooth_l1_beta: r64(1.0),
        }
    }
}

impl MultiBoxLossInit {
    pub fn build(self) -> Result<MultiBoxLoss> {
        let Self {
            num_classes,
            neg_pos_ratio,
            smooth_l1_beta,
        } = self;

        ensure!(
            num_classes >= 2,
            "num_classes must be at least 2, but get {}",
            num_classes
        );
        ensure!(smooth_l1_beta > 0.0, "smooth_l1_beta must be positive");

        Ok(MultiBoxLoss {
            num_classes: num_classes as i64,
            neg_pos_ratio: neg_pos_ratio as i64,
            smooth_l1_beta: smooth_l1_beta.raw(),
            cross_entropy: CrossEntropyLoss::new(Reduction::None),
        })
    }
}

/// Weights of the three loss terms in the training objective.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LossWeights {
    pub loc: R64,
    pub class: R64,
    pub landm: R64,
}

impl Default for LossWeights {
    fn default() -> Self {
        Self {
            loc: r64(2.0),
            class: r64(1.0),
            landm: r64(1.0),
        }
    }
}

#[derive(Debug, TensorLike)]
pub struct MultiBoxLossOutput {
    /// Smooth L1 loss of box offsets over matched anchors.
    pub loc_loss: Tensor,
    /// Cross entropy over positives and hard negatives.
    pub conf_loss: Tensor,
    /// Smooth L1 loss of landmark offsets over anchors with landmarks.
    pub landm_loss: Tensor,
}

impl MultiBoxLossOutput {
    /// The weighted sum of the three terms.
    pub fn weighted(&self, weights: &LossWeights) -> Tensor {
        &self.loc_loss * weights.loc.raw()
            + &self.conf_loss * weights.class.raw()
            + &self.landm_loss * weights.landm.raw()
    }
}

/// The RetinaFace multi-task loss.
#[derive(Debug)]
pub struct MultiBoxLoss {
    num_classes: i64,
    neg_pos_ratio: i64,
    smooth_l1_beta: f64,
    cross_entropy: CrossEntropyLoss,
}

impl MultiBoxLoss {
    /// Compute the losses of a batch.
    ///
    /// Predictions have shapes `[B, A, 4]`, `[B, A, num_classes]` and
    /// `[B, A, 10]`. Targets have shapes `[B, A, 4]`, `[B, A]` (int64) and
    /// `[B, A, 10]`.
    pub fn forward(
        &self,
        loc_pred: &Tensor,
        loc_target: &Tensor,
        conf_pred: &Tensor,
        conf_target: &Tensor,
        landm_pred: &Tensor,
        landm_target: &Tensor,
    ) -> Result<MultiBoxLossOutput> {
        let (batch_size, num_anchors, _) = conf_pred.size3()?;
        let expect_shape = |name: &str, tensor: &Tensor, shape: &[i64]| -> Result<()> {
            ensure!(
                tensor.size() == shape,
                "{} must have shape {:?}, but get {:?}",
                name,
                shape,
                tensor.size()
            );
            Ok(())
        };
        expect_shape("loc_pred", loc_pred, &[batch_size, num_anchors, 4])?;
        expect_shape("loc_target", loc_target, &[batch_size, num_anchors, 4])?;
        expect_shape(
            "conf_pred",
            conf_pred,
            &[batch_size, num_anchors, self.num_classes],
        )?;
        expect_shape("conf_target", conf_target, &[batch_size, num_anchors])?;
        expect_shape(
            "landm_pred",
            landm_pred,
            &[batch_size, num_anchors, 2 * NUM_LANDMARKS as i64],
        )?;
        expect_shape(
            "landm_target",
            landm_target,
            &[batch_size, num_anchors, 2 * NUM_LANDMARKS as i64],
        )?;
        ensure!(
            conf_target.kind() == Kind::Int64,
            "conf_target must be an int64 tensor"
        );

        let landm_loss = {
            let pos = conf_target.gt(0);
            let num_pos = pos.to_kind(Kind::Float).sum(Kind::Float).clamp_min(1.0);
            let mask = pos.unsqueeze(-1).expand_as(landm_pred);
            let loss = landm_pred
                .smooth_l1_loss(landm_target, Reduction::None, self.smooth_l1_beta)
                .masked_select(&mask)
                .sum(Kind::Float);
            loss / num_pos
        };

        let ignore = conf_target.eq(IGNORE_LABEL);
        let pos = conf_target.ne(0).logical_and(&ignore.logical_not());
        let num_pos = pos.to_kind(Kind::Float).sum(Kind::Float).clamp_min(1.0);

        let loc_loss = {
            let mask = pos.unsqueeze(-1).expand_as(loc_pred);
            let loss = loc_pred
                .smooth_l1_loss(loc_target, Reduction::None, self.smooth_l1_beta)
                .masked_select(&mask)
                .sum(Kind::Float);
            loss / &num_pos
        };

        let conf_loss = {
            // faces with and without landmarks are both the face class
            let binary_target = pos.to_kind(Kind::Int64);
            let loss = self.cross_entropy.forward(conf_pred, &binary_target);
            let neg = hard_negative_mask(&loss, &pos, &ignore, self.neg_pos_ratio);
            let selected = pos.logical_or(&neg);
            loss.masked_select(&selected).sum(Kind::Float) / &num_pos
        };

        Ok(MultiBoxLossOutput {
            loc_loss,
            conf_loss,
            landm_loss,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    struct Batch {
        loc_pred: Tensor,
        loc_target: Tensor,
        conf_pred: Tensor,
        conf_target: Tensor,
        landm_pred: Tensor,
        landm_target: Tensor,
    }

    impl Batch {
        fn zeros(batch_size: i64, num_anchors: i64, conf_target: &[i64]) -> Self {
            Self {
                loc_pred: Tensor::zeros(&[batch_size, num_anchors, 4], (Kind::Float, Device::Cpu)),
                loc_target: Tensor::zeros(
                    &[batch_size, num_anchors, 4],
                    (Kind::Float, Device::Cpu),
                ),
                conf_pred: Tensor::zeros(
                    &[batch_size, num_anchors, 2],
                    (Kind::Float, Device::Cpu),
                ),
                conf_target: Tensor::of_slice(conf_target).view([batch_size, num_anchors]),
                landm_pred: Tensor::zeros(
                    &[batch_size, num_anchors, 10],
                    (Kind::Float, Device::Cpu),
                ),
                landm_target: Tensor::zeros(
                    &[batch_size, num_anchors, 10],
                    (Kind::Float, Device::Cpu),
                ),
            }
        }

        fn loss(&self, loss: &MultiBoxLoss) -> Result<MultiBoxLossOutput> {
            loss.forward(
                &self.loc_pred,
                &self.loc_target,
                &self.conf_pred,
                &self.conf_target,
                &self.landm_pred,
                &self.landm_target,
            )
        }
    }

    #[test]
    fn perfect_regression_has_zero_loss() {
        let loss = MultiBoxLossInit::default().build().unwrap();
        let batch = Batch::zeros(1, 4, &[1, -1, 0, 0]);
        let output = batch.loss(&loss).unwrap();

        assert_abs_diff_eq!(output.loc_loss.double_value(&[]), 0.0);
        assert_abs_diff_eq!(output.landm_loss.double_value(&[]), 0.0);
        // 2 positives and 2 negatives (k = min(14, 3)), each ln 2, over 2 positives
        assert_abs_diff_eq!(
            output.conf_loss.double_value(&[]),
            2.0 * 2f64.ln(),
            epsilon = 1e-6
        );
    }

    #[test]
    fn smooth_l1_over_matched_anchors() {
        let loss = MultiBoxLossInit::default().build().unwrap();
        let mut batch = Batch::zeros(1, 3, &[1, -1, 0]);
        // quadratic region for the first anchor, linear for the second,
        // and a large error on the background anchor that must be ignored
        batch.loc_pred = Tensor::of_slice(&[
            0.5f32, 0.0, 0.0, 0.0, //
            3.0, 0.0, 0.0, 0.0, //
            100.0, 0.0, 0.0, 0.0,
        ])
        .view([1, 3, 4]);
        batch.landm_pred = Tensor::zeros(&[1, 3, 10], (Kind::Float, Device::Cpu));
        let _ = batch.landm_pred.get(0).get(0).get(0).fill_(2.0);
        let _ = batch.landm_pred.get(0).get(1).get(0).fill_(50.0);

        let output = batch.loss(&loss).unwrap();

        // (0.5 * 0.5^2 + (3 - 0.5)) / 2
        assert_abs_diff_eq!(
            output.loc_loss.double_value(&[]),
            (0.125 + 2.5) / 2.0,
            epsilon = 1e-6
        );
        // only the anchor with landmarks counts: (2 - 0.5) / 1
        assert_abs_diff_eq!(output.landm_loss.double_value(&[]), 1.5, epsilon = 1e-6);
    }

    #[test]
    fn no_positives_give_zero_loss() {
        let loss = MultiBoxLossInit::default().build().unwrap();
        let mut batch = Batch::zeros(2, 3, &[0, 0, 0, 0, 0, 0]);
        batch.conf_pred = Tensor::randn(&[2, 3, 2], (Kind::Float, Device::Cpu));
        let output = batch.loss(&loss).unwrap();

        assert_eq!(output.loc_loss.double_value(&[]), 0.0);
        assert_eq!(output.conf_loss.double_value(&[]), 0.0);
        assert_eq!(output.landm_loss.double_value(&[]), 0.0);
    }

    #[test]
    fn hard_negatives_follow_the_ratio() {
        let loss = MultiBoxLossInit {
            neg_pos_ratio: 1,
            ..Default::default()
        }
        .build()
        .unwrap();
        let mut batch = Batch::zeros(1, 4, &[1, 0, 0, 0]);
        // background logits favor the face class increasingly
        batch.conf_pred = Tensor::of_slice(&[
            0f32, 0.0, //
            0.0, 1.0, //
            0.0, 3.0, //
            0.0, 2.0,
        ])
        .view([1, 4, 2]);
        let output = batch.loss(&loss).unwrap();

        // the positive anchor plus the single hardest negative
        let expect = 2f64.ln() + (1.0 + 3f64.exp()).ln();
        assert_abs_diff_eq!(output.conf_loss.double_value(&[]), expect, epsilon = 1e-5);
    }

    #[test]
    fn ignored_anchors_take_no_part() {
        let loss = MultiBoxLossInit {
            neg_pos_ratio: 1,
            ..Default::default()
        }
        .build()
        .unwrap();
        let mut batch = Batch::zeros(1, 4, &[1, IGNORE_LABEL, 0, 0]);
        // the ignored anchor has the hardest logit and a large box error
        batch.conf_pred = Tensor::of_slice(&[
            0f32, 0.0, //
            0.0, 5.0, //
            0.0, 1.0, //
            0.0, 0.0,
        ])
        .view([1, 4, 2]);
        batch.loc_pred = Tensor::of_slice(&[
            0f32, 0.0, 0.0, 0.0, //
            100.0, 0.0, 0.0, 0.0, //
            0.0, 0.0, 0.0, 0.0, //
            0.0, 0.0, 0.0, 0.0,
        ])
        .view([1, 4, 4]);
        let output = batch.loss(&loss).unwrap();

        assert_abs_diff_eq!(output.loc_loss.double_value(&[]), 0.0);
        // the positive plus the hardest negative that is not ignored
        let expect = 2f64.ln() + (1.0 + 1f64.exp()).ln();
        assert_abs_diff_eq!(output.conf_loss.double_value(&[]), expect, epsilon = 1e-5);
    }

    #[test]
    fn ignore_band_keeps_losses_unchanged() {
        use crate::{
            anchor::AnchorGridInit,
            encoder::{EncodedTarget, TargetEncoderInit},
        };

        let anchors = Arc::new(
            AnchorGridInit {
                image_size: 64,
                steps: vec![8, 16],
                min_sizes: vec![vec![8, 16], vec![32]],
                clip: false,
            }
            .build()
            .unwrap(),
        );
        let plain = TargetEncoderInit::default()
            .build(anchors.clone())
            .unwrap();
        let banded = TargetEncoderInit {
            ignore_thresh: Some(0.1),
            ..Default::default()
        }
        .build(anchors)
        .unwrap();

        let rect = TLBR::from_xyxy([0.1, 0.1, 0.35, 0.4]);
        let labels = vec![FaceLabel {
            rect,
            landmarks: [Point::new(rect.cx(), rect.cy()); NUM_LANDMARKS],
            landmark_valid: true,
        }];
        let plain = plain.encode(&labels);
        let banded = banded.encode(&labels);
        assert!(banded.num_ignored() > 0);

        let multibox_loss = MultiBoxLossInit::default().build().unwrap();
        let compute = |target: &EncodedTarget| {
            let num_anchors = target.num_anchors() as i64;
            let (loc, conf, landm) = target.to_tensors();
            let mut batch = Batch::zeros(1, num_anchors, &vec![0; num_anchors as usize]);
            batch.loc_target = loc.unsqueeze(0);
            batch.conf_target = conf.unsqueeze(0);
            batch.landm_target = landm.unsqueeze(0);
            batch.loss(&multibox_loss).unwrap()
        };
        let plain = compute(&plain);
        let banded = compute(&banded);

        assert!(plain.loc_loss.double_value(&[]) > 0.0);
        assert_abs_diff_eq!(
            banded.loc_loss.double_value(&[]),
            plain.loc_loss.double_value(&[]),
            epsilon = 1e-6
        );
        assert_abs_diff_eq!(
            banded.conf_loss.double_value(&[]),
            plain.conf_loss.double_value(&[]),
            epsilon = 1e-6
        );
        assert_abs_diff_eq!(
            banded.landm_loss.double_value(&[]),
            plain.landm_loss.double_value(&[]),
            epsilon = 1e-6
        );
    }

    #[test]
    fn weighted_sum() {
        let output = MultiBoxLossOutput {
            loc_loss: Tensor::from(1f32),
            conf_loss: Tensor::from(2f32),
            landm_loss: Tensor::from(3f32),
        };
        let total = output.weighted(&LossWeights::default());
        assert_abs_diff_eq!(total.double_value(&[]), 7.0, epsilon = 1e-6);
    }

    #[test]
    fn reject_mismatched_shapes() {
        let loss = MultiBoxLossInit::default().build().unwrap();
        let mut batch = Batch::zeros(1, 4, &[1, 0, 0, 0]);
        batch.landm_pred = Tensor::zeros(&[1, 4, 8], (Kind::Float, Device::Cpu));
        assert!(batch.loss(&loss).is_err());

        let mut batch = Batch::zeros(1, 4, &[1, 0, 0, 0]);
        batch.conf_target = batch.conf_target.to_kind(Kind::Float);
        assert!(batch.loss(&loss).is_err());
    }

    #[test]
    fn reject_single_class() {
        let result = MultiBoxLossInit {
            num_classes: 1,
            ..Default::default()
        }
        .build();
        assert!(result.is_err());
    }
}
