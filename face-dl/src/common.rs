//! Common imports from external crates.

pub use anyhow::{bail, ensure, format_err, Context as _, Error, Result};
pub use bbox::{prelude::*, CyCxHW, Point, Transform, HW, TLBR};
pub use image::{imageops, imageops::FilterType, Rgb, RgbImage};
pub use itertools::{izip, Itertools as _};
pub use label::{FaceLabel, NUM_LANDMARKS};
pub use log::{info, warn};
pub use noisy_float::prelude::*;
pub use rand::prelude::*;
pub use serde::{Deserialize, Serialize};
pub use std::{
    fmt::Debug,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};
pub use tch::{Device, Kind, Reduction, Tensor};
pub use tch_tensor_like::TensorLike;
