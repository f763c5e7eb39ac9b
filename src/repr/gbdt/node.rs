//! Tree node types.
//!
//! Every split node is a fixed-size record: a threshold, the two child slots,
//! the feature index and a byte of [`NodeFlags`]. Child slots are either node
//! indices or leaf indices, which the `LEFT_LEAF` / `RIGHT_LEAF` flags tell apart.

use std::ops::{BitOr, BitOrAssign};

/// Features with `|x| <= ZERO_THRESHOLD` count as zero for the missing-zero policy.
pub const ZERO_THRESHOLD: f64 = 1e-35;

/// Returns `true` when `fval` counts as zero under the missing-zero policy.
#[inline]
pub fn is_zero(fval: f64) -> bool {
    fval > -ZERO_THRESHOLD && fval <= ZERO_THRESHOLD
}

// =============================================================================
// NodeFlags
// =============================================================================

/// Bit flags describing how a split node routes a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NodeFlags(u8);

impl NodeFlags {
    /// Split on category membership instead of a numeric threshold.
    pub const CATEGORICAL: Self = Self(1 << 0);
    /// Missing values go to the left child.
    pub const DEFAULT_LEFT: Self = Self(1 << 1);
    /// The left slot is a leaf index.
    pub const LEFT_LEAF: Self = Self(1 << 2);
    /// The right slot is a leaf index.
    pub const RIGHT_LEAF: Self = Self(1 << 3);
    /// Zero (within [`ZERO_THRESHOLD`]) is treated as missing.
    pub const MISSING_ZERO: Self = Self(1 << 4);
    /// NaN is treated as missing.
    pub const MISSING_NAN: Self = Self(1 << 5);
    /// Categorical split against a single category id.
    pub const CAT_ONE_HOT: Self = Self(1 << 6);
    /// Categorical split against a single 32-bit membership word.
    pub const CAT_SMALL: Self = Self(1 << 7);

    #[inline]
    pub const fn empty() -> Self {
        Self(0)
    }

    #[inline]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    #[inline]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns `true` if all bits of `other` are set.
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    #[inline]
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl BitOr for NodeFlags {
    type Output = Self;

    #[inline]
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for NodeFlags {
    #[inline]
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

// =============================================================================
// Missing policy / categorical encoding
// =============================================================================

/// Which feature values a split treats as missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingType {
    /// Nothing is missing; NaN is evaluated as 0.0.
    #[default]
    None,
    /// Values within [`ZERO_THRESHOLD`] of zero (and NaN, evaluated as 0.0).
    Zero,
    /// NaN only.
    NaN,
}

impl MissingType {
    #[inline]
    pub fn flags(self) -> NodeFlags {
        match self {
            MissingType::None => NodeFlags::empty(),
            MissingType::Zero => NodeFlags::MISSING_ZERO,
            MissingType::NaN => NodeFlags::MISSING_NAN,
        }
    }
}

/// How the category set of a categorical split is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoricalKind {
    /// `threshold` is the single category id.
    OneHot,
    /// `threshold` is the 32-bit membership word.
    Small,
    /// `threshold` indexes the tree's `cat_boundaries`.
    Large,
}

impl CategoricalKind {
    #[inline]
    pub fn flags(self) -> NodeFlags {
        match self {
            CategoricalKind::OneHot => NodeFlags::CAT_ONE_HOT,
            CategoricalKind::Small => NodeFlags::CAT_SMALL,
            CategoricalKind::Large => NodeFlags::empty(),
        }
    }
}

// =============================================================================
// Node
// =============================================================================

/// A split node of a canonical tree.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Node {
    pub threshold: f64,
    pub left: u32,
    pub right: u32,
    pub feature: u32,
    pub flags: NodeFlags,
}

impl Node {
    /// Numeric split `fval <= threshold`. Children are wired later.
    pub fn numerical(feature: u32, threshold: f64, missing: MissingType, default_left: bool) -> Self {
        let mut flags = missing.flags();
        if default_left {
            flags |= NodeFlags::DEFAULT_LEFT;
        }
        Self {
            threshold,
            left: 0,
            right: 0,
            feature,
            flags,
        }
    }

    /// Categorical split. The meaning of `threshold` depends on `kind`.
    pub fn categorical(feature: u32, threshold: u32, missing: MissingType, kind: CategoricalKind) -> Self {
        Self {
            threshold: f64::from(threshold),
            left: 0,
            right: 0,
            feature,
            flags: NodeFlags::CATEGORICAL | missing.flags() | kind.flags(),
        }
    }

    #[inline]
    pub fn is_categorical(&self) -> bool {
        self.flags.contains(NodeFlags::CATEGORICAL)
    }

    #[inline]
    pub fn default_left(&self) -> bool {
        self.flags.contains(NodeFlags::DEFAULT_LEFT)
    }

    #[inline]
    pub fn left_is_leaf(&self) -> bool {
        self.flags.contains(NodeFlags::LEFT_LEAF)
    }

    #[inline]
    pub fn right_is_leaf(&self) -> bool {
        self.flags.contains(NodeFlags::RIGHT_LEAF)
    }

    /// Categorical encoding, or `None` for numeric splits.
    #[inline]
    pub fn categorical_kind(&self) -> Option<CategoricalKind> {
        if !self.is_categorical() {
            None
        } else if self.flags.contains(NodeFlags::CAT_ONE_HOT) {
            Some(CategoricalKind::OneHot)
        } else if self.flags.contains(NodeFlags::CAT_SMALL) {
            Some(CategoricalKind::Small)
        } else {
            Some(CategoricalKind::Large)
        }
    }

    /// Point the left slot at a leaf.
    #[inline]
    pub fn set_left_leaf(&mut self, leaf_idx: u32) {
        self.left = leaf_idx;
        self.flags |= NodeFlags::LEFT_LEAF;
    }

    /// Point the right slot at a leaf.
    #[inline]
    pub fn set_right_leaf(&mut self, leaf_idx: u32) {
        self.right = leaf_idx;
        self.flags |= NodeFlags::RIGHT_LEAF;
    }

    /// Point the left slot at another node.
    #[inline]
    pub fn set_left_node(&mut self, node_idx: u32) {
        self.left = node_idx;
        self.flags.remove(NodeFlags::LEFT_LEAF);
    }

    /// Point the right slot at another node.
    #[inline]
    pub fn set_right_node(&mut self, node_idx: u32) {
        self.right = node_idx;
        self.flags.remove(NodeFlags::RIGHT_LEAF);
    }
}
