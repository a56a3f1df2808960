//! Top-level command orchestration for the two run modes.

pub mod apply;
pub mod plan;
