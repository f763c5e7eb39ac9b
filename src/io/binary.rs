//! Little-endian reader for XGBoost's legacy binary model format.
//!
//! The format is a sequence of fixed-size C structs and dmlc-style
//! length-prefixed vectors (a `u64` element count followed by the elements).
//! Fixed structs are described by [`FixedRecord`] implementations that read
//! field by field, so the byte layout is explicit and independent of Rust's
//! struct layout.

use std::io::Read;

// =============================================================================
// Error types
// =============================================================================

/// Error from decoding binary records.
#[derive(Debug, thiserror::Error)]
pub enum BinaryReadError {
    #[error("unexpected end of input while reading {context}")]
    UnexpectedEnd { context: &'static str },
    #[error("IO error: {0}")]
    Io(#[source] std::io::Error),
    #[error("string is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
    #[error("length prefix {len} of {context} exceeds the remaining input")]
    LengthTooLarge { context: &'static str, len: u64 },
}

/// Magic prefix written by XGBoost 1.0 and later.
pub const BINF_MAGIC: &[u8; 4] = b"binf";

/// Strip the `binf` prefix when present.
pub fn skip_binf_magic(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(BINF_MAGIC.as_slice()).unwrap_or(bytes)
}

// =============================================================================
// BinaryReader
// =============================================================================

/// Primitive little-endian reads over any [`Read`] source.
pub struct BinaryReader<R> {
    inner: R,
}

impl<R: Read> BinaryReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn read_array<const N: usize>(&mut self, context: &'static str) -> Result<[u8; N], BinaryReadError> {
        let mut buf = [0u8; N];
        self.inner.read_exact(&mut buf).map_err(|e| map_io(e, context))?;
        Ok(buf)
    }

    pub fn read_u32(&mut self, context: &'static str) -> Result<u32, BinaryReadError> {
        self.read_array(context).map(u32::from_le_bytes)
    }

    pub fn read_i32(&mut self, context: &'static str) -> Result<i32, BinaryReadError> {
        self.read_array(context).map(i32::from_le_bytes)
    }

    pub fn read_u64(&mut self, context: &'static str) -> Result<u64, BinaryReadError> {
        self.read_array(context).map(u64::from_le_bytes)
    }

    pub fn read_i64(&mut self, context: &'static str) -> Result<i64, BinaryReadError> {
        self.read_array(context).map(i64::from_le_bytes)
    }

    pub fn read_f32(&mut self, context: &'static str) -> Result<f32, BinaryReadError> {
        self.read_array(context).map(f32::from_le_bytes)
    }

    /// Read `n` consecutive `i32` values without a length prefix.
    pub fn read_i32_array(&mut self, n: usize, context: &'static str) -> Result<Vec<i32>, BinaryReadError> {
        (0..n).map(|_| self.read_i32(context)).collect()
    }

    /// Skip `n` bytes.
    pub fn skip(&mut self, n: usize, context: &'static str) -> Result<(), BinaryReadError> {
        let copied = std::io::copy(&mut (&mut self.inner).take(n as u64), &mut std::io::sink())
            .map_err(|e| map_io(e, context))?;
        if copied != n as u64 {
            return Err(BinaryReadError::UnexpectedEnd { context });
        }
        Ok(())
    }

    /// Length-prefixed UTF-8 string.
    pub fn read_string(&mut self, context: &'static str) -> Result<String, BinaryReadError> {
        let len = self.read_u64(context)?;
        let bytes = self.read_bytes(len, context)?;
        Ok(String::from_utf8(bytes)?)
    }

    /// Length-prefixed `f32` vector.
    pub fn read_f32_vec(&mut self, context: &'static str) -> Result<Vec<f32>, BinaryReadError> {
        let len = self.read_u64(context)?;
        let bytes = self.read_bytes(len.saturating_mul(4), context)?;
        Ok(bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }

    /// Length-prefixed `i32` vector.
    pub fn read_i32_vec(&mut self, context: &'static str) -> Result<Vec<i32>, BinaryReadError> {
        let len = self.read_u64(context)?;
        let bytes = self.read_bytes(len.saturating_mul(4), context)?;
        Ok(bytes
            .chunks_exact(4)
            .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }

    /// Read a fixed record.
    pub fn read_record<T: FixedRecord>(&mut self) -> Result<T, BinaryReadError> {
        T::read_from(self)
    }

    /// Read `n` fixed records.
    pub fn read_records<T: FixedRecord>(&mut self, n: usize) -> Result<Vec<T>, BinaryReadError> {
        (0..n).map(|_| T::read_from(self)).collect()
    }

    fn read_bytes(&mut self, len: u64, context: &'static str) -> Result<Vec<u8>, BinaryReadError> {
        // Read through `take` so a corrupt length cannot force a huge allocation.
        let mut bytes = Vec::new();
        (&mut self.inner)
            .take(len)
            .read_to_end(&mut bytes)
            .map_err(|e| map_io(e, context))?;
        if (bytes.len() as u64) != len {
            return Err(BinaryReadError::LengthTooLarge { context, len });
        }
        Ok(bytes)
    }
}

fn map_io(err: std::io::Error, context: &'static str) -> BinaryReadError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        BinaryReadError::UnexpectedEnd { context }
    } else {
        BinaryReadError::Io(err)
    }
}

// =============================================================================
// Fixed records
// =============================================================================

/// A fixed-size little-endian struct.
pub trait FixedRecord: Sized {
    /// Encoded size in bytes.
    const SIZE: usize;

    fn read_from<R: Read>(reader: &mut BinaryReader<R>) -> Result<Self, BinaryReadError>;
}

/// Learner header (`LearnerModelParam`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LearnerModelParam {
    pub base_score: f32,
    pub num_feature: u32,
    pub num_class: i32,
    pub contain_extra_attrs: i32,
    pub contain_eval_metrics: i32,
    pub major_version: u32,
    pub minor_version: u32,
}

impl FixedRecord for LearnerModelParam {
    const SIZE: usize = 136;

    fn read_from<R: Read>(reader: &mut BinaryReader<R>) -> Result<Self, BinaryReadError> {
        const CTX: &str = "learner model param";
        let param = Self {
            base_score: reader.read_f32(CTX)?,
            num_feature: reader.read_u32(CTX)?,
            num_class: reader.read_i32(CTX)?,
            contain_extra_attrs: reader.read_i32(CTX)?,
            contain_eval_metrics: reader.read_i32(CTX)?,
            major_version: reader.read_u32(CTX)?,
            minor_version: reader.read_u32(CTX)?,
        };
        reader.skip(27 * 4, CTX)?;
        Ok(param)
    }
}

/// Tree booster header (`GBTreeModelParam`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GBTreeModelParam {
    pub num_trees: i32,
    pub num_roots: i32,
    pub num_feature: i32,
    pub num_pbuffer: i64,
    pub num_output_group: i32,
    pub size_leaf_vector: i32,
}

impl FixedRecord for GBTreeModelParam {
    const SIZE: usize = 160;

    fn read_from<R: Read>(reader: &mut BinaryReader<R>) -> Result<Self, BinaryReadError> {
        const CTX: &str = "gbtree model param";
        let num_trees = reader.read_i32(CTX)?;
        let num_roots = reader.read_i32(CTX)?;
        let num_feature = reader.read_i32(CTX)?;
        let _pad = reader.read_i32(CTX)?;
        let param = Self {
            num_trees,
            num_roots,
            num_feature,
            num_pbuffer: reader.read_i64(CTX)?,
            num_output_group: reader.read_i32(CTX)?,
            size_leaf_vector: reader.read_i32(CTX)?,
        };
        reader.skip(32 * 4, CTX)?;
        Ok(param)
    }
}

/// Per-tree header (`TreeParam`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeParam {
    pub num_roots: i32,
    pub num_nodes: i32,
    pub num_deleted: i32,
    pub max_depth: i32,
    pub num_feature: i32,
    pub size_leaf_vector: i32,
}

impl FixedRecord for TreeParam {
    const SIZE: usize = 148;

    fn read_from<R: Read>(reader: &mut BinaryReader<R>) -> Result<Self, BinaryReadError> {
        const CTX: &str = "tree param";
        let param = Self {
            num_roots: reader.read_i32(CTX)?,
            num_nodes: reader.read_i32(CTX)?,
            num_deleted: reader.read_i32(CTX)?,
            max_depth: reader.read_i32(CTX)?,
            num_feature: reader.read_i32(CTX)?,
            size_leaf_vector: reader.read_i32(CTX)?,
        };
        reader.skip(31 * 4, CTX)?;
        Ok(param)
    }
}

/// Tree node (`RegTree::Node`).
///
/// `cleft == -1` marks a leaf. The top bit of `sindex` is the default-left
/// flag and the rest is the split feature. `info` is the split threshold for
/// internal nodes and the leaf value for leaves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinaryNode {
    pub parent: i32,
    pub cleft: i32,
    pub cright: i32,
    pub sindex: u32,
    pub info: f32,
}

impl BinaryNode {
    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.cleft == -1
    }

    #[inline]
    pub fn split_index(&self) -> u32 {
        self.sindex & 0x7fff_ffff
    }

    #[inline]
    pub fn default_left(&self) -> bool {
        (self.sindex >> 31) != 0
    }
}

impl FixedRecord for BinaryNode {
    const SIZE: usize = 20;

    fn read_from<R: Read>(reader: &mut BinaryReader<R>) -> Result<Self, BinaryReadError> {
        const CTX: &str = "tree node";
        Ok(Self {
            parent: reader.read_i32(CTX)?,
            cleft: reader.read_i32(CTX)?,
            cright: reader.read_i32(CTX)?,
            sindex: reader.read_u32(CTX)?,
            info: reader.read_f32(CTX)?,
        })
    }
}

/// Node statistics (`RTreeNodeStat`). Read to advance the stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeStat {
    pub loss_chg: f32,
    pub sum_hess: f32,
    pub base_weight: f32,
    pub leaf_child_cnt: i32,
}

impl FixedRecord for NodeStat {
    const SIZE: usize = 16;

    fn read_from<R: Read>(reader: &mut BinaryReader<R>) -> Result<Self, BinaryReadError> {
        const CTX: &str = "node stat";
        Ok(Self {
            loss_chg: reader.read_f32(CTX)?,
            sum_hess: reader.read_f32(CTX)?,
            base_weight: reader.read_f32(CTX)?,
            leaf_child_cnt: reader.read_i32(CTX)?,
        })
    }
}

/// Linear booster header (`GBLinearModelParam`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GBLinearModelParam {
    pub num_feature: u32,
    pub num_output_group: i32,
}

impl FixedRecord for GBLinearModelParam {
    const SIZE: usize = 136;

    fn read_from<R: Read>(reader: &mut BinaryReader<R>) -> Result<Self, BinaryReadError> {
        const CTX: &str = "gblinear model param";
        let param = Self {
            num_feature: reader.read_u32(CTX)?,
            num_output_group: reader.read_i32(CTX)?,
        };
        reader.skip(32 * 4, CTX)?;
        Ok(param)
    }
}
