//! numpy arrays, dtypes and scalars.
//!
//! `ndarray.__reduce__` pickles as
//! `_reconstruct(ndarray, (0,), b"b")` followed by the state tuple
//! `(version, shape, dtype, is_fortran, data)`. Plain-data arrays carry their
//! buffer as a byte string; object arrays carry a list of objects.

use super::{
    ExtractError, Reconstruct, as_bytes, as_int, as_str, as_tuple, expect_global, parse_class, reduce_args,
};
use crate::compat::sklearn::pickle::{Build, Reduce, Value};

/// Modules that host `_reconstruct` and `scalar`, before and after numpy 2.
const MULTIARRAY_MODULES: [&str; 2] = ["numpy.core.multiarray", "numpy._core.multiarray"];

fn expect_multiarray(value: &Value, name: &str) -> Result<(), ExtractError> {
    let module = match value {
        Value::Global(global) if MULTIARRAY_MODULES.contains(&global.module.as_str()) => global.module.as_str(),
        _ => MULTIARRAY_MODULES[0],
    };
    expect_global(value, module, name).map(|_| ())
}

// =============================================================================
// Raw bytes
// =============================================================================

/// A byte payload, pickled as `_codecs.encode(latin1_text, "latin1")`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawBytes(pub Vec<u8>);

impl RawBytes {
    /// Accept both the `_codecs.encode` call and a bare string.
    pub fn from_value(value: &Value) -> Result<Self, ExtractError> {
        match value {
            Value::Unicode(bytes) => Ok(RawBytes(bytes.clone())),
            other => {
                let mut raw = RawBytes::default();
                parse_class(&mut raw, other)?;
                Ok(raw)
            }
        }
    }

    /// Call `f` on each `width`-byte chunk.
    pub fn iterate<F>(&self, width: usize, mut f: F) -> Result<(), ExtractError>
    where
        F: FnMut(&[u8]) -> Result<(), ExtractError>,
    {
        if width == 0 || self.0.len() % width != 0 {
            return Err(ExtractError::PayloadLength {
                len: self.0.len(),
                width,
            });
        }
        self.0.chunks_exact(width).try_for_each(|chunk| f(chunk))
    }

    /// Decode fixed-width records.
    pub fn map_chunks<T, const N: usize>(&self, f: impl Fn([u8; N]) -> T) -> Result<Vec<T>, ExtractError> {
        let mut out = Vec::with_capacity(self.0.len() / N.max(1));
        self.iterate(N, |chunk| {
            let mut buf = [0u8; N];
            buf.copy_from_slice(chunk);
            out.push(f(buf));
            Ok(())
        })?;
        Ok(out)
    }
}

impl Reconstruct for RawBytes {
    fn reduce(&mut self, reduce: &Reduce) -> Result<(), ExtractError> {
        expect_global(&reduce.callable, "_codecs", "encode")?;
        let args = reduce_args(reduce, "_codecs.encode", 2)?;
        self.0 = as_bytes(&args[0])?.to_vec();
        Ok(())
    }

    fn build(&mut self, _build: &Build) -> Result<(), ExtractError> {
        Ok(())
    }
}

// =============================================================================
// DType
// =============================================================================

/// A numpy dtype: type string (`f8`, `i8`, `V56`, ...) and byte order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DType {
    pub kind: String,
    pub little_endian: bool,
}

impl Default for DType {
    fn default() -> Self {
        Self {
            kind: String::new(),
            little_endian: true,
        }
    }
}

impl DType {
    /// Require dtype `kind`, little-endian when `little_endian` is set.
    pub fn expect(&self, what: &'static str, kind: &'static str, little_endian: bool) -> Result<(), ExtractError> {
        if self.kind != kind || (little_endian && !self.little_endian) {
            let order = if self.little_endian { "<" } else { ">" };
            return Err(ExtractError::DType {
                what,
                expected: kind,
                actual: format!("{order}{}", self.kind),
            });
        }
        Ok(())
    }

    fn f64_from(&self, bytes: [u8; 8]) -> f64 {
        if self.little_endian {
            f64::from_le_bytes(bytes)
        } else {
            f64::from_be_bytes(bytes)
        }
    }
}

impl Reconstruct for DType {
    fn reduce(&mut self, reduce: &Reduce) -> Result<(), ExtractError> {
        expect_global(&reduce.callable, "numpy", "dtype")?;
        let args = reduce_args(reduce, "numpy.dtype", 3)?;
        self.kind = as_str(&args[0])?.to_string();
        // Byte order comes with the state; dtypes fetched from the memo have none.
        self.little_endian = true;
        Ok(())
    }

    fn build(&mut self, build: &Build) -> Result<(), ExtractError> {
        // (version, endian, subarray, names, fields, elsize, alignment, flags)
        let state = as_tuple(&build.state, "dtype state", Some(8))?;
        self.little_endian = match as_str(&state[1])? {
            "<" | "|" | "=" => true,
            ">" => false,
            other => {
                return Err(ExtractError::InvalidValue {
                    field: "dtype byte order",
                    message: format!("{other:?}"),
                });
            }
        };
        Ok(())
    }
}

// =============================================================================
// Array
// =============================================================================

/// Array contents.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    /// Packed element bytes.
    Bytes(RawBytes),
    /// Python objects of an `object` array.
    Objects(Vec<Value>),
}

impl Default for ArrayData {
    fn default() -> Self {
        ArrayData::Bytes(RawBytes::default())
    }
}

/// A C-ordered numpy array.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NumpyArray {
    pub dtype: DType,
    pub shape: Vec<usize>,
    pub data: ArrayData,
}

impl NumpyArray {
    pub fn expect_shape(&self, what: &'static str, expected: &[usize]) -> Result<(), ExtractError> {
        if self.shape != expected {
            return Err(ExtractError::Shape {
                what,
                expected: expected.to_vec(),
                actual: self.shape.clone(),
            });
        }
        Ok(())
    }

    /// Packed bytes of a plain-data array.
    pub fn bytes(&self, what: &'static str) -> Result<&RawBytes, ExtractError> {
        match &self.data {
            ArrayData::Bytes(raw) => Ok(raw),
            ArrayData::Objects(_) => Err(ExtractError::DType {
                what,
                expected: "plain data",
                actual: "object".to_string(),
            }),
        }
    }

    /// Elements of an object array.
    pub fn objects(&self, what: &'static str) -> Result<&[Value], ExtractError> {
        match &self.data {
            ArrayData::Objects(items) => Ok(items),
            ArrayData::Bytes(_) => Err(ExtractError::DType {
                what,
                expected: "O",
                actual: self.dtype.kind.clone(),
            }),
        }
    }

    /// Little-endian `i8` elements.
    pub fn to_i64(&self, what: &'static str) -> Result<Vec<i64>, ExtractError> {
        self.dtype.expect(what, "i8", true)?;
        self.bytes(what)?.map_chunks(i64::from_le_bytes)
    }

    /// `f8` elements in the array's byte order.
    pub fn to_f64(&self, what: &'static str) -> Result<Vec<f64>, ExtractError> {
        self.dtype.expect(what, "f8", false)?;
        let dtype = &self.dtype;
        self.bytes(what)?.map_chunks(|b| dtype.f64_from(b))
    }
}

impl Reconstruct for NumpyArray {
    fn reduce(&mut self, reduce: &Reduce) -> Result<(), ExtractError> {
        expect_multiarray(&reduce.callable, "_reconstruct")?;
        let args = reduce_args(reduce, "_reconstruct", 3)?;
        expect_global(&args[0], "numpy", "ndarray")?;
        Ok(())
    }

    fn build(&mut self, build: &Build) -> Result<(), ExtractError> {
        let state = as_tuple(&build.state, "ndarray state", Some(5))?;
        as_int(&state[0])?;

        self.shape = as_tuple(&state[1], "shape", None)?
            .iter()
            .map(|dim| {
                let dim = as_int(dim)?;
                usize::try_from(dim).map_err(|_| ExtractError::InvalidValue {
                    field: "shape",
                    message: format!("negative dimension {dim}"),
                })
            })
            .collect::<Result<_, _>>()?;

        parse_class(&mut self.dtype, &state[2])?;

        let is_fortran = as_int(&state[3])?;
        if is_fortran != 0 {
            return Err(ExtractError::InvalidValue {
                field: "is_fortran",
                message: "fortran-ordered arrays are not supported".to_string(),
            });
        }

        self.data = match &state[4] {
            Value::List(items) => ArrayData::Objects(items.clone()),
            Value::Build(_) | Value::Reduce(_) | Value::Unicode(_) => ArrayData::Bytes(RawBytes::from_value(&state[4])?),
            other => {
                return Err(ExtractError::Type {
                    expected: "array data",
                    actual: other.kind(),
                });
            }
        };
        Ok(())
    }
}

// =============================================================================
// Scalar
// =============================================================================

/// A numpy scalar such as `np.int64(2)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NumpyScalar {
    pub dtype: DType,
    pub data: RawBytes,
}

impl NumpyScalar {
    fn word(&self, what: &'static str) -> Result<[u8; 8], ExtractError> {
        <[u8; 8]>::try_from(self.data.0.as_slice()).map_err(|_| {
            ExtractError::PayloadLength {
                len: self.data.0.len(),
                width: 8,
            }
            .in_field(what)
        })
    }

    /// Value of a little-endian `i8` scalar.
    pub fn to_i64(&self, what: &'static str) -> Result<i64, ExtractError> {
        self.dtype.expect(what, "i8", true)?;
        Ok(i64::from_le_bytes(self.word(what)?))
    }

    /// Value of an `f8` scalar.
    pub fn to_f64(&self, what: &'static str) -> Result<f64, ExtractError> {
        self.dtype.expect(what, "f8", false)?;
        Ok(self.dtype.f64_from(self.word(what)?))
    }
}

impl Reconstruct for NumpyScalar {
    fn reduce(&mut self, reduce: &Reduce) -> Result<(), ExtractError> {
        expect_multiarray(&reduce.callable, "scalar")?;
        let args = reduce_args(reduce, "scalar", 2)?;
        parse_class(&mut self.dtype, &args[0])?;
        self.data = RawBytes::from_value(&args[1])?;
        Ok(())
    }

    fn build(&mut self, _build: &Build) -> Result<(), ExtractError> {
        Ok(())
    }
}
