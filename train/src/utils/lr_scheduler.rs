use crate::{common::*, config::LearningRateSchedule};

/// The learning rate at each optimization step.
#[derive(Debug, Clone)]
pub enum LrScheduler {
    Constant {
        lr: R64,
    },
    StepWise {
        lr_cache: f64,
        step: usize,
        index: usize,
        steps: Vec<(usize, R64)>,
    },
    Dynamic {
        step: usize,
        initial_lr: f64,
        gamma: f64,
        warmup_steps: usize,
        /// The first step of each decayed period, sorted.
        decay_steps: Vec<usize>,
    },
    Cosine {
        step: usize,
        initial_lr: f64,
        end_lr: f64,
        warmup_steps: usize,
        total_steps: usize,
    },
}

impl LrScheduler {
    pub fn new(
        config: &LearningRateSchedule,
        steps_per_epoch: usize,
        num_epochs: usize,
        init_step: impl Into<Option<usize>>,
    ) -> Result<Self> {
        let init_step = init_step.into();
        ensure!(steps_per_epoch > 0, "steps_per_epoch must be positive");

        let mut scheduler = match *config {
            LearningRateSchedule::Constant { lr } => {
                ensure!(lr >= 0.0, "the lr must be positive");
                Self::Constant { lr }
            }
            LearningRateSchedule::StepWise { ref steps } => {
                ensure!(
                    !steps.is_empty() && steps[0].0 == 0,
                    "the steps must start from zero"
                );

                steps.iter().fold(Ok(None), |result, (curr_step, lr)| {
                    let prev_step = result?;
                    if let Some(prev_step) = prev_step {
                        ensure!(curr_step > prev_step, "the steps must be monotonic");
                    }
                    ensure!(lr.raw() > 0.0, "lr must be positive");
                    Ok(Some(curr_step))
                })?;

                Self::StepWise {
                    lr_cache: steps[0].1.raw(),
                    step: 0,
                    index: 0,
                    steps: steps.clone(),
                }
            }
            LearningRateSchedule::Dynamic {
                initial_lr,
                gamma,
                ref decay_epochs,
                warmup_epochs,
            } => {
                ensure!(initial_lr > 0.0, "initial_lr must be positive");
                Self::Dynamic {
                    step: 0,
                    initial_lr: initial_lr.raw(),
                    gamma: gamma.raw(),
                    warmup_steps: warmup_epochs * steps_per_epoch,
                    decay_steps: decay_epochs
                        .iter()
                        .map(|epoch| epoch * steps_per_epoch)
                        .sorted()
                        .collect(),
                }
            }
            LearningRateSchedule::Cosine {
                initial_lr,
                end_lr,
                warmup_epochs,
            } => {
                ensure!(initial_lr > 0.0, "initial_lr must be positive");
                ensure!(
                    warmup_epochs <= num_epochs,
                    "warmup_epochs must not exceed the number of epochs"
                );
                Self::Cosine {
                    step: 0,
                    initial_lr: initial_lr.raw(),
                    end_lr: end_lr.raw(),
                    warmup_steps: warmup_epochs * steps_per_epoch,
                    total_steps: num_epochs * steps_per_epoch,
                }
            }
        };

        if let Some(init_step) = init_step {
            scheduler.set_step(init_step);
        }

        Ok(scheduler)
    }

    pub fn set_step(&mut self, new_step: usize) {
        match self {
            Self::Constant { .. } => (),
            Self::StepWise {
                step,
                index,
                steps,
                lr_cache,
            } => {
                *step = new_step;
                let new_index = match steps
                    .binary_search_by_key(&new_step, |(step_thresh, _lr)| *step_thresh)
                {
                    Ok(new_index) => new_index,
                    Err(new_index) => new_index.saturating_sub(1),
                };
                *index = new_index;
                *lr_cache = steps[new_index].1.raw();
            }
            Self::Dynamic { step, .. } | Self::Cosine { step, .. } => {
                *step = new_step;
            }
        }
    }

    /// The learning rate of the current step.
    pub fn lr(&self) -> f64 {
        match *self {
            Self::Constant { lr } => lr.raw(),
            Self::StepWise { lr_cache, .. } => lr_cache,
            Self::Dynamic {
                step,
                initial_lr,
                gamma,
                warmup_steps,
                ref decay_steps,
            } => {
                if step < warmup_steps {
                    initial_lr * (step + 1) as f64 / warmup_steps as f64
                } else {
                    let num_decays = decay_steps
                        .iter()
                        .take_while(|&&decay_step| decay_step <= step)
                        .count();
                    initial_lr * gamma.powi(num_decays as i32)
                }
            }
            Self::Cosine {
                step,
                initial_lr,
                end_lr,
                warmup_steps,
                total_steps,
            } => {
                if step < warmup_steps {
                    initial_lr * (step + 1) as f64 / warmup_steps as f64
                } else {
                    // the last step lands exactly on end_lr
                    let period = total_steps.saturating_sub(warmup_steps + 1);
                    if period == 0 {
                        return end_lr;
                    }
                    let progress = (step - warmup_steps).min(period) as f64 / period as f64;
                    end_lr + 0.5 * (initial_lr - end_lr) * (1.0 + (PI * progress).cos())
                }
            }
        }
    }

    /// Returns the learning rate of the current step and advances one step.
    pub fn next(&mut self) -> f64 {
        match self {
            Self::Constant { lr } => lr.raw(),
            Self::StepWise {
                step,
                index,
                steps,
                lr_cache,
            } => {
                let lr = steps[*index].1.raw();
                *step += 1;
                let next_index = *index + 1;
                if next_index < steps.len() && *step == steps[next_index].0 {
                    *index = next_index;
                }
                *lr_cache = lr;
                lr
            }
            Self::Dynamic { .. } | Self::Cosine { .. } => {
                let lr = self.lr();
                if let Self::Dynamic { step, .. } | Self::Cosine { step, .. } = self {
                    *step += 1;
                }
                lr
            }
        }
    }
}
