//! Dataset loading toolkit.

mod dataset;
mod record;
mod widerface;

pub use dataset::*;
pub use record::*;
pub use widerface::*;
