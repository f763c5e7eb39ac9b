//! Load and prediction options.
//!
//! Both use `bon` builders with defaults, so `LoadOptions::default()` and
//! `PredictOptions::default()` are the common case.

use bon::Builder;

/// Options applied while loading a model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Builder)]
pub struct LoadOptions {
    /// Select the output transform from the model's objective (default: false).
    ///
    /// When false every model predicts raw scores.
    #[builder(default)]
    pub load_transform: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl LoadOptions {
    /// Options with transform loading enabled.
    pub fn with_transform() -> Self {
        Self::builder().load_transform(true).build()
    }
}

/// Options applied to a prediction call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Builder)]
pub struct PredictOptions {
    /// Boosting rounds to use. `0` uses every round; larger values are
    /// clamped to the model's round count (default: 0).
    #[builder(default)]
    pub n_rounds: usize,

    /// Worker threads. `0` or `1` runs on the calling thread (default: 1).
    #[builder(default = 1)]
    pub n_threads: usize,
}

impl Default for PredictOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        assert!(!LoadOptions::default().load_transform);
        assert!(LoadOptions::with_transform().load_transform);

        let options = PredictOptions::default();
        assert_eq!(options.n_rounds, 0);
        assert_eq!(options.n_threads, 1);
    }

    #[test]
    fn builder_overrides() {
        let options = PredictOptions::builder().n_rounds(3).n_threads(4).build();
        assert_eq!(options.n_rounds, 3);
        assert_eq!(options.n_threads, 4);
    }
}
