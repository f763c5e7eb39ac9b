//! Linear booster inference.

mod predict;

pub use predict::LinearModelPredict;
