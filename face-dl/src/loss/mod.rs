//! Loss function building blocks.

mod cross_entropy;
mod hard_negative;
mod multibox_loss;

pub use cross_entropy::*;
pub use hard_negative::*;
pub use multibox_loss::*;
