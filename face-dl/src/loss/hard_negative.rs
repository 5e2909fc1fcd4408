use crate::common::*;

/// The number of hard negatives kept for a sample.
///
/// Keeps `ratio` negatives per positive, but never all anchors of the sample.
pub fn hard_negative_count(num_pos: usize, num_anchors: usize, ratio: usize) -> usize {
    (ratio * num_pos).min(num_anchors.saturating_sub(1))
}

/// Select the highest-loss negatives of each sample.
///
/// `loss`, `pos` and `ignore` are `[batch, anchors]` tensors. Returns a boolean
/// mask of the same shape marking the selected negatives. Positives are never
/// selected unless a sample has fewer negatives than requested. Ignored
/// anchors are never selected.
pub fn hard_negative_mask(loss: &Tensor, pos: &Tensor, ignore: &Tensor, ratio: i64) -> Tensor {
    tch::no_grad(|| {
        let num_anchors = loss.size()[1];

        // rank anchors by descending loss with positives and ignored anchors last
        let loss = loss.masked_fill(&pos.logical_or(ignore), f64::NEG_INFINITY);
        let (_, order) = loss.sort(1, true);
        let (_, rank) = order.sort(1, false);

        let num_pos = pos
            .to_kind(Kind::Int64)
            .sum_dim_intlist(&[1], true, Kind::Int64);
        let num_neg = (num_pos * ratio).clamp_max(num_anchors - 1);

        rank.lt_tensor(&num_neg).logical_and(&ignore.logical_not())
    })
}
