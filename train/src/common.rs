//! Common imports from external crates.

pub use anyhow::{bail, ensure, format_err, Context, Error, Result};
pub use chrono::Local;
pub use derivative::Derivative;
pub use face_dl::{
    anchor::{AnchorGrid, AnchorGridInit},
    dataset::{RandomAccessDataset, WiderFaceDataset},
    encoder::{EncodedTarget, TargetEncoder, TargetEncoderInit},
    loss::{LossWeights, MultiBoxLoss, MultiBoxLossInit, MultiBoxLossOutput},
    processor::{sample_rng, HorizontalFlipInit, Preprocessor, PreprocessorInit, RandomCropInit},
};
pub use futures::{
    future::{self, FutureExt as _},
    stream::{self, BoxStream, StreamExt as _},
};
pub use itertools::Itertools as _;
pub use label::NUM_LANDMARKS;
pub use noisy_float::prelude::*;
pub use rand::{prelude::*, rngs::StdRng, seq::SliceRandom};
pub use serde::{Deserialize, Serialize};
pub use std::{
    borrow::{Borrow, Cow},
    f64::consts::PI,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};
pub use tch::{nn, nn::OptimizerConfig as _, Device, Kind, Tensor};
pub use tch_tensor_like::TensorLike;
pub use tokio::sync::{broadcast, mpsc};
pub use tracing::{info, warn};

pub type Fallible<T> = Result<T>;
