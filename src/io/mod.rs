//! Low-level readers shared by the model loaders.
//!
//! - [`params`]: `key=value` blocks of the LightGBM text format
//! - [`binary`]: little-endian records of the XGBoost binary format

pub mod binary;
pub mod params;

pub use binary::{BinaryReadError, BinaryReader, FixedRecord};
pub use params::{Params, ParamsError};
