//! Individual enhancement steps

pub mod denoise;
pub mod deskew;
pub mod grayscale;
pub mod rescale;
pub mod rotate;
pub mod shadows;
