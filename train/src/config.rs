//! Training program configuration format.

use crate::common::*;

pub use dataset::*;
pub use model::*;
pub use training::*;

/// The main training configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub dataset: DatasetConfig,
    pub anchor: AnchorConfig,
    pub encoder: EncoderConfig,
    pub preprocessor: PreprocessorConfig,
    pub loss: LossConfig,
    pub training: TrainingConfig,
    pub logging: LoggingConfig,
}

impl Config {
    pub fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let text = std::fs::read_to_string(path)?;
        Self::from_json5(&text)
    }

    pub fn from_json5(text: &str) -> Result<Self> {
        let config: Self = json5::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the values that the type system cannot.
    pub fn validate(&self) -> Result<()> {
        let Self {
            anchor,
            encoder,
            preprocessor,
            loss,
            training,
            ..
        } = self;

        ensure!(
            anchor.steps.len() == anchor.min_sizes.len(),
            "anchor.steps and anchor.min_sizes must have the same length"
        );
        ensure!(
            anchor.min_sizes.iter().all(|sizes| !sizes.is_empty()),
            "every anchor level must have at least one size"
        );

        ensure!(
            encoder.variance.iter().all(|&value| value > 0.0),
            "encoder.variance must be positive"
        );
        ensure!(
            (0.0..=1.0).contains(&encoder.match_thresh.raw()),
            "encoder.match_thresh must be in range [0, 1]"
        );
        if let Some(ignore_thresh) = encoder.ignore_thresh {
            ensure!(
                ignore_thresh >= 0.0 && ignore_thresh <= encoder.match_thresh,
                "encoder.ignore_thresh must be in range [0, match_thresh]"
            );
        }

        ensure!(
            preprocessor.crop_attempts > 0,
            "preprocessor.crop_attempts must be positive"
        );
        ensure!(
            !preprocessor.crop_scales.is_empty(),
            "preprocessor.crop_scales must not be empty"
        );

        ensure!(
            loss.num_classes.get() >= 2,
            "loss.num_classes must be at least 2"
        );
        ensure!(
            [loss.loc_weight, loss.class_weight, loss.landm_weight]
                .iter()
                .all(|&weight| weight >= 0.0),
            "loss weights must be non-negative"
        );

        if let Some(DistributedConfig {
            shard_id,
            num_shards,
        }) = training.distributed
        {
            ensure!(
                shard_id < num_shards.get(),
                "training.distributed.shard_id {} is out of range of {} shards",
                shard_id,
                num_shards
            );
        }

        if let Some(grad_clip) = training.grad_clip {
            ensure!(grad_clip > 0.0, "training.grad_clip must be positive");
        }

        training.optimizer.validate()?;
        training.lr_schedule.validate()?;

        Ok(())
    }
}

mod dataset {
    use super::*;

    /// Dataset options.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct DatasetConfig {
        /// The WIDER FACE style label file.
        pub label_file: PathBuf,
        /// The image directory. Defaults to `images` next to the label file.
        #[serde(default)]
        pub image_dir: Option<PathBuf>,
    }
}

mod model {
    use super::*;

    /// Anchor grid options.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct AnchorConfig {
        pub image_size: NonZeroUsize,
        pub steps: Vec<NonZeroUsize>,
        pub min_sizes: Vec<Vec<NonZeroUsize>>,
        #[serde(default)]
        pub clip: bool,
    }

    impl AnchorConfig {
        pub fn anchor_grid_init(&self) -> AnchorGridInit {
            AnchorGridInit {
                image_size: self.image_size.get(),
                steps: self.steps.iter().map(|step| step.get()).collect(),
                min_sizes: self
                    .min_sizes
                    .iter()
                    .map(|sizes| sizes.iter().map(|size| size.get()).collect())
                    .collect(),
                clip: self.clip,
            }
        }
    }

    /// Target encoding options.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct EncoderConfig {
        pub variance: [R64; 2],
        pub match_thresh: R64,
        #[serde(default)]
        pub ignore_thresh: Option<R64>,
    }

    impl EncoderConfig {
        pub fn target_encoder_init(&self, clip: bool) -> TargetEncoderInit {
            TargetEncoderInit {
                variance: self.variance.map(|value| value.raw() as f32),
                match_thresh: self.match_thresh.raw() as f32,
                ignore_thresh: self.ignore_thresh.map(|value| value.raw() as f32),
                clip,
            }
        }
    }

    /// Data augmentation options.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct PreprocessorConfig {
        /// The per-channel mean in RGB order.
        pub rgb_mean: [R64; 3],
        pub crop_attempts: usize,
        pub crop_scales: Vec<R64>,
        /// The probability of horizontal flip.
        #[serde(default = "default_flip_prob")]
        pub flip_prob: R64,
    }

    impl PreprocessorConfig {
        pub fn preprocessor_init(&self, image_size: usize) -> PreprocessorInit {
            let default = PreprocessorInit::default();
            PreprocessorInit {
                image_size,
                rgb_mean: self.rgb_mean,
                crop: RandomCropInit {
                    scales: self.crop_scales.clone(),
                    max_attempts: self.crop_attempts,
                },
                flip: HorizontalFlipInit {
                    prob: self.flip_prob,
                },
                ..default
            }
        }
    }

    fn default_flip_prob() -> R64 {
        r64(0.5)
    }

    /// The loss function options.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct LossConfig {
        pub num_classes: NonZeroUsize,
        pub neg_pos_ratio: usize,
        pub loc_weight: R64,
        pub class_weight: R64,
        pub landm_weight: R64,
    }

    impl LossConfig {
        pub fn multibox_loss_init(&self) -> MultiBoxLossInit {
            MultiBoxLossInit {
                num_classes: self.num_classes.get(),
                neg_pos_ratio: self.neg_pos_ratio,
                ..Default::default()
            }
        }

        pub fn weights(&self) -> LossWeights {
            LossWeights {
                loc: self.loc_weight,
                class: self.class_weight,
                landm: self.landm_weight,
            }
        }
    }
}

mod training {
    use super::*;

    /// The training options.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct TrainingConfig {
        /// The batch size.
        pub batch_size: NonZeroUsize,
        /// The number of epochs.
        pub epochs: NonZeroUsize,
        /// The seed of shuffling and augmentation.
        pub seed: u64,
        /// The number of samples preprocessed concurrently.
        pub num_workers: NonZeroUsize,
        #[serde(default = "default_shuffle")]
        pub shuffle: bool,
        /// What to do when a sample fails to load.
        ///
        /// Skipped samples can leave an epoch with fewer batches than planned.
        /// The learning rate schedule is realigned at every epoch start, but
        /// the last epoch may end before its final scheduled value.
        #[serde(default)]
        pub on_sample_error: SampleErrorPolicy,
        /// If set, train on one shard of the dataset.
        #[serde(default)]
        pub distributed: Option<DistributedConfig>,
        pub backbone: Backbone,
        pub optimizer: OptimizerConfig,
        /// If set, gradients are rescaled so that their total norm does not
        /// exceed this value.
        #[serde(default)]
        pub grad_clip: Option<R64>,
        /// Learning rate scheduling strategy.
        pub lr_schedule: LearningRateSchedule,
        #[serde(with = "tch_serde::serde_device")]
        pub device: Device,
    }

    fn default_shuffle() -> bool {
        true
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub enum SampleErrorPolicy {
        /// Stop training on the first failed sample.
        Abort,
        /// Log and drop the failed sample.
        Skip,
    }

    impl Default for SampleErrorPolicy {
        fn default() -> Self {
            Self::Abort
        }
    }

    /// The shard of this process among data parallel processes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct DistributedConfig {
        pub shard_id: usize,
        pub num_shards: NonZeroUsize,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub enum Backbone {
        ResNet50,
        MobileNet025,
    }

    /// Optimizer options.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(tag = "type")]
    pub enum OptimizerConfig {
        /// SGD with momentum.
        Momentum { momentum: R64, weight_decay: R64 },
        /// SGD with optional momentum, zero by default.
        Sgd {
            #[serde(default = "default_sgd_momentum")]
            momentum: R64,
            weight_decay: R64,
        },
    }

    impl OptimizerConfig {
        pub fn momentum(&self) -> R64 {
            match *self {
                Self::Momentum { momentum, .. } | Self::Sgd { momentum, .. } => momentum,
            }
        }

        pub fn weight_decay(&self) -> R64 {
            match *self {
                Self::Momentum { weight_decay, .. } | Self::Sgd { weight_decay, .. } => {
                    weight_decay
                }
            }
        }

        pub(super) fn validate(&self) -> Result<()> {
            ensure!(
                (0.0..1.0).contains(&self.momentum().raw()),
                "optimizer momentum must be in range [0, 1)"
            );
            ensure!(
                self.weight_decay() >= 0.0,
                "optimizer weight_decay must be non-negative"
            );
            Ok(())
        }
    }

    fn default_sgd_momentum() -> R64 {
        r64(0.0)
    }

    /// The learning rate scheduling strategy.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(tag = "type")]
    pub enum LearningRateSchedule {
        /// Use constant learning rate.
        Constant { lr: R64 },
        /// Use specific learning rate at specified steps.
        StepWise { steps: Vec<(usize, R64)> },
        /// Linear warm-up, then decay by `gamma` at each decay epoch.
        Dynamic {
            initial_lr: R64,
            gamma: R64,
            decay_epochs: Vec<usize>,
            warmup_epochs: usize,
        },
        /// Linear warm-up, then cosine annealing down to `end_lr`.
        Cosine {
            initial_lr: R64,
            end_lr: R64,
            warmup_epochs: usize,
        },
    }

    impl LearningRateSchedule {
        pub(super) fn validate(&self) -> Result<()> {
            match self {
                Self::Constant { lr } => {
                    ensure!(*lr >= 0.0, "lr must be non-negative");
                }
                Self::StepWise { steps } => {
                    ensure!(
                        !steps.is_empty() && steps[0].0 == 0,
                        "the steps must start from zero"
                    );
                    ensure!(
                        steps.iter().tuple_windows().all(|(lhs, rhs)| lhs.0 < rhs.0),
                        "the steps must be monotonic"
                    );
                }
                Self::Dynamic {
                    initial_lr,
                    gamma,
                    decay_epochs,
                    ..
                } => {
                    ensure!(*initial_lr > 0.0, "initial_lr must be positive");
                    ensure!(
                        *gamma > 0.0 && *gamma <= 1.0,
                        "gamma must be in range (0, 1]"
                    );
                    ensure!(
                        decay_epochs
                            .iter()
                            .tuple_windows()
                            .all(|(lhs, rhs)| lhs < rhs),
                        "decay_epochs must be increasing"
                    );
                }
                Self::Cosine {
                    initial_lr, end_lr, ..
                } => {
                    ensure!(*initial_lr > 0.0, "initial_lr must be positive");
                    ensure!(
                        *end_lr >= 0.0 && end_lr <= initial_lr,
                        "end_lr must be in range [0, initial_lr]"
                    );
                }
            }
            Ok(())
        }
    }
}

/// Data logging options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub dir: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = include_str!("../../train.json5");

    #[test]
    fn parse_example_config() {
        let config = Config::from_json5(EXAMPLE).unwrap();
        assert_eq!(config.anchor.image_size.get(), 640);
        assert_eq!(config.training.backbone, Backbone::ResNet50);
        assert_eq!(config.training.on_sample_error, SampleErrorPolicy::Abort);
        assert!(config.training.distributed.is_none());
        assert!(matches!(
            config.training.optimizer,
            OptimizerConfig::Momentum { .. }
        ));

        let grid = config.anchor.anchor_grid_init().build().unwrap();
        assert_eq!(grid.len(), 16800);
    }

    #[test]
    fn reject_unknown_optimizer() {
        let text = EXAMPLE.replace(r#"type: "Momentum""#, r#"type: "Adam""#);
        assert!(Config::from_json5(&text).is_err());
    }

    #[test]
    fn reject_unknown_backbone() {
        let text = EXAMPLE.replace(r#""ResNet50""#, r#""VGG16""#);
        assert!(Config::from_json5(&text).is_err());
    }

    #[test]
    fn reject_shard_out_of_range() {
        let text = EXAMPLE.replace(
            "distributed: null",
            "distributed: { shard_id: 2, num_shards: 2 }",
        );
        let err = Config::from_json5(&text).unwrap_err();
        assert!(format!("{:#}", err).contains("shard_id"));
    }

    #[test]
    fn reject_ignore_thresh_above_match_thresh() {
        let text = EXAMPLE.replace("ignore_thresh: null", "ignore_thresh: 0.5");
        assert!(Config::from_json5(&text).is_err());
    }

    #[test]
    fn parse_grad_clip() {
        let config = Config::from_json5(EXAMPLE).unwrap();
        assert_eq!(config.training.grad_clip, None);

        let text = EXAMPLE.replace("grad_clip: null", "grad_clip: 10.0");
        let config = Config::from_json5(&text).unwrap();
        assert_eq!(config.training.grad_clip, Some(r64(10.0)));

        let text = EXAMPLE.replace("grad_clip: null", "grad_clip: 0.0");
        let err = Config::from_json5(&text).unwrap_err();
        assert!(format!("{:#}", err).contains("grad_clip"));
    }

    #[test]
    fn sgd_momentum_is_optional() {
        let plain = EXAMPLE.replace(
            r#"type: "Momentum",
            momentum: 0.9,"#,
            r#"type: "Sgd","#,
        );
        let config = Config::from_json5(&plain).unwrap();
        assert_eq!(config.training.optimizer.momentum(), 0.0);

        let with_momentum = EXAMPLE.replace(r#"type: "Momentum""#, r#"type: "Sgd""#);
        let config = Config::from_json5(&with_momentum).unwrap();
        assert!(matches!(config.training.optimizer, OptimizerConfig::Sgd { .. }));
        assert_eq!(config.training.optimizer.momentum(), 0.9);
    }
}
