//! Linear booster representation.

pub mod model;

pub use model::LinearModel;
