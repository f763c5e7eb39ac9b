//! Canonical model representations shared by every model format.
//!
//! - [`gbdt`]: flattened bit-flagged trees and forests
//! - [`gblinear`]: linear booster weights

pub mod gbdt;
pub mod gblinear;
