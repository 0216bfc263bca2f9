//! Shared utilities.
//!
//! - Protocol constants
//! - Checked fixed-point arithmetic

pub mod constants;
pub mod math;

pub use constants::*;
pub use math::*;
