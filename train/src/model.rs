//! The model adaptor.

use crate::common::*;

/// Per-anchor predictions of a RetinaFace-style head.
#[derive(Debug, TensorLike)]
pub struct ModelOutput {
    /// Box offsets in shape `[B, A, 4]`.
    pub loc: Tensor,
    /// Class logits in shape `[B, A, C]`.
    pub conf: Tensor,
    /// Landmark offsets in shape `[B, A, 10]`.
    pub landm: Tensor,
}

/// A predictor that ignores image content.
///
/// Every anchor owns learnable offsets and class logits shared by all
/// images. It stands in for a detection network so the data path, the loss
/// and the optimizer can run end to end.
#[derive(Debug)]
pub struct BaselineModel {
    loc: Tensor,
    conf: Tensor,
    landm: Tensor,
}

impl BaselineModel {
    pub fn new<'a>(path: impl Borrow<nn::Path<'a>>, num_anchors: usize, num_classes: usize) -> Self {
        let path = path.borrow();
        let num_anchors = num_anchors as i64;

        Self {
            loc: path.zeros("loc", &[num_anchors, 4]),
            conf: path.zeros("conf", &[num_anchors, num_classes as i64]),
            landm: path.zeros("landm", &[num_anchors, 2 * NUM_LANDMARKS as i64]),
        }
    }

    pub fn forward(&self, image: &Tensor) -> Result<ModelOutput> {
        let (batch_size, _channels, _height, _width) = image.size4()?;
        let expand = |param: &Tensor| param.unsqueeze(0).expand(&[batch_size, -1, -1], false);

        Ok(ModelOutput {
            loc: expand(&self.loc),
            conf: expand(&self.conf),
            landm: expand(&self.landm),
        })
    }
}
