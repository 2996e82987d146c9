//! Core data types shared by the processing stages.

pub mod cloud;

pub use cloud::{PointCloud, TaggedPoint};
