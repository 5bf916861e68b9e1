//! Receipt image enhancement
//!
//! Turns an arbitrarily rotated, shadowed, skewed receipt photograph into a
//! clean binary image for text recognition.

pub mod pipeline;
pub mod steps;

pub use pipeline::{EnhanceOptions, EnhanceResult, Pipeline, StageCapture, StepTiming};
pub use steps::denoise::DenoiseParams;
pub use steps::deskew::{SkewParams, SkewPolarity};
pub use steps::shadows::ShadowParams;
