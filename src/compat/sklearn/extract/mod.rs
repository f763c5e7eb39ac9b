//! Typed reconstruction of pickled Python objects.
//!
//! Unpickling a class instance happens in two steps: `REDUCE` calls a
//! constructor (`copy_reg._reconstructor`, `numpy.dtype`, ...) and an
//! optional `BUILD` passes the instance state. [`Reconstruct`] mirrors this:
//! each target checks the constructor it expects in `reduce` and reads its
//! fields from the state in `build`. [`parse_class`] drives the two calls.

mod estimators;
mod numpy;

pub use estimators::{DecisionTreeRegressor, GradientBoostingClassifier, InitEstimator, SklearnNode, SklearnTree};
pub use numpy::{ArrayData, DType, NumpyArray, NumpyScalar, RawBytes};

use super::pickle::{Build, Dict, Global, Reduce, Value};

/// Error while mapping decoded objects onto typed structures.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("expected {expected}, got {actual}")]
    Type { expected: &'static str, actual: &'static str },

    #[error("expected global {expected}, got {actual}")]
    Global { expected: String, actual: Global },

    #[error("{what}: expected {expected} arguments, got {actual}")]
    Arity {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("key {0:?} not found")]
    MissingKey(String),

    #[error("{what}: expected dtype {expected}, got {actual}")]
    DType {
        what: &'static str,
        expected: &'static str,
        actual: String,
    },

    #[error("{what}: expected shape {expected:?}, got {actual:?}")]
    Shape {
        what: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("payload of {len} bytes is not a multiple of {width}")]
    PayloadLength { len: usize, width: usize },

    #[error("invalid {field}: {message}")]
    InvalidValue { field: &'static str, message: String },

    #[error("unknown init estimator {0:?}")]
    UnknownInitEstimator(String),

    #[error("{field}: {source}")]
    Field {
        field: String,
        #[source]
        source: Box<ExtractError>,
    },
}

impl ExtractError {
    /// Prefix the error with the field it was raised for.
    pub(crate) fn in_field(self, field: impl Into<String>) -> Self {
        ExtractError::Field {
            field: field.into(),
            source: Box::new(self),
        }
    }
}

/// A Python class restorable from its pickled form.
pub trait Reconstruct {
    /// Check the constructor call and read its arguments.
    fn reduce(&mut self, reduce: &Reduce) -> Result<(), ExtractError>;

    /// Read the instance state.
    fn build(&mut self, build: &Build) -> Result<(), ExtractError>;
}

/// Restore `target` from `value`.
///
/// A `Build` must wrap a `Reduce`; both phases run in order. A bare `Reduce`
/// only runs the first phase.
pub fn parse_class<T: Reconstruct + ?Sized>(target: &mut T, value: &Value) -> Result<(), ExtractError> {
    match value {
        Value::Build(build) => {
            target.reduce(as_reduce(&build.object)?)?;
            target.build(build)
        }
        other => target.reduce(as_reduce(other)?),
    }
}

/// Restore a fresh `T` from `value`.
pub fn extract<T: Reconstruct + Default>(value: &Value) -> Result<T, ExtractError> {
    let mut target = T::default();
    parse_class(&mut target, value)?;
    Ok(target)
}

// =============================================================================
// Accessors
// =============================================================================

fn type_error(expected: &'static str, actual: &Value) -> ExtractError {
    ExtractError::Type {
        expected,
        actual: actual.kind(),
    }
}

pub(crate) fn as_reduce(value: &Value) -> Result<&Reduce, ExtractError> {
    match value {
        Value::Reduce(reduce) => Ok(reduce),
        other => Err(type_error("reduce", other)),
    }
}

pub(crate) fn as_int(value: &Value) -> Result<i64, ExtractError> {
    match value {
        Value::Int(i) => Ok(*i),
        other => Err(type_error("int", other)),
    }
}

/// Python floats, or ints where a float is expected (`learning_rate=1`).
pub(crate) fn as_float(value: &Value) -> Result<f64, ExtractError> {
    match value {
        Value::Float(f) => Ok(*f),
        Value::Int(i) => Ok(*i as f64),
        other => Err(type_error("float", other)),
    }
}

pub(crate) fn as_bytes(value: &Value) -> Result<&[u8], ExtractError> {
    match value {
        Value::Unicode(bytes) => Ok(bytes),
        other => Err(type_error("unicode", other)),
    }
}

pub(crate) fn as_str(value: &Value) -> Result<&str, ExtractError> {
    std::str::from_utf8(as_bytes(value)?).map_err(|e| ExtractError::InvalidValue {
        field: "string",
        message: e.to_string(),
    })
}

pub(crate) fn as_dict(value: &Value) -> Result<&Dict, ExtractError> {
    match value {
        Value::Dict(dict) => Ok(dict),
        other => Err(type_error("dict", other)),
    }
}

/// A tuple, optionally of an exact length.
pub(crate) fn as_tuple<'a>(value: &'a Value, what: &'static str, len: Option<usize>) -> Result<&'a [Value], ExtractError> {
    let Value::Tuple(items) = value else {
        return Err(type_error("tuple", value));
    };
    match len {
        Some(expected) if items.len() != expected => Err(ExtractError::Arity {
            what,
            expected,
            actual: items.len(),
        }),
        _ => Ok(items),
    }
}

pub(crate) fn field<'a>(dict: &'a Dict, key: &str) -> Result<&'a Value, ExtractError> {
    dict.get(key).ok_or_else(|| ExtractError::MissingKey(key.to_string()))
}

/// Check that `value` is the global `module.name`. An empty `name`
/// accepts any class from `module`.
pub(crate) fn expect_global<'a>(value: &'a Value, module: &str, name: &str) -> Result<&'a Global, ExtractError> {
    let Value::Global(global) = value else {
        return Err(type_error("global", value));
    };
    if global.module != module || (!name.is_empty() && global.name != name) {
        return Err(ExtractError::Global {
            expected: if name.is_empty() {
                format!("{module}.*")
            } else {
                format!("{module}.{name}")
            },
            actual: global.clone(),
        });
    }
    Ok(global)
}

/// Reduce arguments of an exact count.
pub(crate) fn reduce_args<'a>(reduce: &'a Reduce, what: &'static str, n: usize) -> Result<&'a [Value], ExtractError> {
    if reduce.args.len() != n {
        return Err(ExtractError::Arity {
            what,
            expected: n,
            actual: reduce.args.len(),
        });
    }
    Ok(&reduce.args)
}
