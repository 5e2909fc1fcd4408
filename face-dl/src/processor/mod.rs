//! Data augmentation building blocks.

pub mod crop;
pub mod flip;
pub mod normalize;
pub mod photometric;
pub mod preprocessor;
pub mod resize;

pub use crop::*;
pub use flip::*;
pub use normalize::*;
pub use photometric::*;
pub use preprocessor::*;
pub use resize::*;
