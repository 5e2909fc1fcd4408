//! The building blocks of RetinaFace training: annotation parsing, data
//! augmentation, anchor matching and the multi-box loss.

mod common;
pub mod anchor;
pub mod dataset;
pub mod encoder;
pub mod loss;
pub mod processor;
