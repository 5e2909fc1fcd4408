use crate::common::*;

/// Per-element cross entropy computed as `logsumexp(logits) - logits[target]`.
#[derive(Debug)]
pub struct CrossEntropyLoss {
    reduction: Reduction,
}

impl CrossEntropyLoss {
    pub fn new(reduction: Reduction) -> Self {
        Self { reduction }
    }

    /// Compute the loss of `[..., num_classes]` logits against `[...]` int64 targets.
    pub fn forward(&self, input: &Tensor, target: &Tensor) -> Tensor {
        debug_assert_eq!(target.kind(), Kind::Int64, "target must be an int64 tensor");
        debug_assert_eq!(
            input.size()[..input.dim() - 1],
            target.size()[..],
            "input and target shapes do not agree"
        );

        // return zero tensor if (1) input is empty and (2) using mean reduction
        if input.is_empty() && self.reduction == Reduction::Mean {
            return Tensor::zeros(&[], (Kind::Float, input.device())).set_requires_grad(false);
        }

        let log_sum_exp = input.logsumexp(&[-1], false);
        let picked = input.gather(-1, &target.unsqueeze(-1), false).squeeze_dim(-1);
        let loss = log_sum_exp - picked;

        match self.reduction {
            Reduction::None => loss,
            Reduction::Sum => loss.sum(Kind::Float),
            Reduction::Mean => loss.mean(Kind::Float),
            Reduction::Other(_) => unimplemented!(),
        }
    }
}
