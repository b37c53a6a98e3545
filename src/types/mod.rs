//! Core types shared across the crate.
//!
//! - [`id`]: `TimerId` and the `Time` deadline type
//! - [`builder`]: Configuration build errors

pub mod builder;
pub mod id;

pub use builder::{BuildError, BuildResult};
pub use id::{Time, TimerId};
