//! Protocol 0 pickle writer for scikit-learn fixtures.
//!
//! Emits the same opcode stream Python's `pickle.dump(obj, f, protocol=0)`
//! produces for numpy arrays and the legacy `GradientBoostingClassifier`
//! layout, including memoized dtypes, so tests do not depend on a Python
//! installation.

use std::collections::HashMap;

/// Incremental protocol 0 writer.
#[derive(Debug, Default)]
pub struct PickleWriter {
    buf: Vec<u8>,
    next_memo: usize,
    dtypes: HashMap<(String, String), usize>,
}

/// A `DecisionTreeRegressor`: `(left, right, feature, threshold)` per node
/// plus one value per node. Leaves use `(-1, -1, -2, -2.0)`.
#[derive(Debug, Clone)]
pub struct TreeFixture {
    pub nodes: Vec<(i64, i64, i64, f64)>,
    pub values: Vec<f64>,
}

impl TreeFixture {
    pub fn new(nodes: Vec<(i64, i64, i64, f64)>, values: Vec<f64>) -> Self {
        Self { nodes, values }
    }

    /// A single-leaf tree.
    pub fn leaf(value: f64) -> Self {
        Self::new(vec![(-1, -1, -2, -2.0)], vec![value])
    }
}

/// Initial estimator of a classifier fixture.
#[derive(Debug, Clone)]
pub enum InitPrior {
    LogOdds(f64),
    Priors(Vec<f64>),
}

/// A `GradientBoostingClassifier`; `stages[i][k]` is the tree of stage `i`
/// for raw group `k`.
#[derive(Debug, Clone)]
pub struct GbcFixture {
    pub n_classes: usize,
    pub n_features: i64,
    /// `max_features_`; `None` writes `n_features`.
    pub max_features: Option<i64>,
    pub learning_rate: f64,
    pub init: InitPrior,
    pub stages: Vec<Vec<TreeFixture>>,
}

impl PickleWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `STOP` and return the stream.
    pub fn finish(mut self) -> Vec<u8> {
        self.buf.push(b'.');
        self.buf
    }

    fn op(&mut self, op: u8, arg: &[u8]) -> &mut Self {
        self.buf.push(op);
        self.buf.extend_from_slice(arg);
        if !arg.is_empty() || matches!(op, b'V') {
            self.buf.push(b'\n');
        }
        self
    }

    // =========================================================================
    // Primitives
    // =========================================================================

    pub fn mark(&mut self) -> &mut Self {
        self.op(b'(', b"")
    }

    pub fn none(&mut self) -> &mut Self {
        self.op(b'N', b"")
    }

    pub fn int(&mut self, v: i64) -> &mut Self {
        self.op(b'I', v.to_string().as_bytes())
    }

    pub fn bool(&mut self, v: bool) -> &mut Self {
        self.op(b'I', if v { b"01" } else { b"00" })
    }

    pub fn float(&mut self, v: f64) -> &mut Self {
        self.op(b'F', format!("{v:?}").as_bytes())
    }

    /// `UNICODE` with `raw-unicode-escape`; bytes above 0x7f pass as latin-1.
    pub fn unicode_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        let mut escaped = Vec::with_capacity(bytes.len());
        for &b in bytes {
            match b {
                b'\\' | b'\0' | b'\n' | b'\r' | 0x1a => escaped.extend_from_slice(format!("\\u{b:04x}").as_bytes()),
                _ => escaped.push(b),
            }
        }
        self.op(b'V', &escaped)
    }

    pub fn unicode(&mut self, s: &str) -> &mut Self {
        self.unicode_bytes(s.as_bytes())
    }

    pub fn global(&mut self, module: &str, name: &str) -> &mut Self {
        self.op(b'c', module.as_bytes());
        self.buf.extend_from_slice(name.as_bytes());
        self.buf.push(b'\n');
        self
    }

    pub fn tuple(&mut self) -> &mut Self {
        self.op(b't', b"")
    }

    pub fn reduce(&mut self) -> &mut Self {
        self.op(b'R', b"")
    }

    pub fn build(&mut self) -> &mut Self {
        self.op(b'b', b"")
    }

    /// Memoize the top of the stack and return its key.
    pub fn put(&mut self) -> usize {
        let key = self.next_memo;
        self.next_memo += 1;
        self.op(b'p', key.to_string().as_bytes());
        key
    }

    pub fn get(&mut self, key: usize) -> &mut Self {
        self.op(b'g', key.to_string().as_bytes())
    }

    /// Push a tuple of whatever `items` writes.
    pub fn tuple_of(&mut self, items: impl FnOnce(&mut Self)) -> &mut Self {
        self.mark();
        items(self);
        self.tuple()
    }

    /// Push an empty dict and fill it with [`dict_entry`](Self::dict_entry) calls.
    pub fn dict_of(&mut self, entries: impl FnOnce(&mut Self)) -> &mut Self {
        self.mark();
        self.op(b'd', b"");
        self.put();
        entries(self);
        self
    }

    pub fn dict_entry(&mut self, key: &str, value: impl FnOnce(&mut Self)) -> &mut Self {
        self.unicode(key);
        value(self);
        self.op(b's', b"")
    }

    /// Push a list of whatever `items` writes, appended one by one.
    pub fn list_of(&mut self, items: impl FnOnce(&mut Self)) -> &mut Self {
        self.mark();
        self.op(b'l', b"");
        self.put();
        items(self);
        self
    }

    pub fn append(&mut self) -> &mut Self {
        self.op(b'a', b"")
    }

    /// A `bytes` object: `_codecs.encode(text, "latin1")`.
    pub fn bytes(&mut self, data: &[u8]) -> &mut Self {
        self.global("_codecs", "encode");
        self.tuple_of(|w| {
            w.unicode_bytes(data);
            w.unicode("latin1");
        });
        self.reduce();
        self.put();
        self
    }

    /// `copy_reg._reconstructor(cls, object, None)` followed by a state dict.
    pub fn object(&mut self, module: &str, name: &str, entries: impl FnOnce(&mut Self)) -> &mut Self {
        self.global("copy_reg", "_reconstructor");
        self.tuple_of(|w| {
            w.global(module, name);
            w.global("__builtin__", "object");
            w.none();
        });
        self.reduce();
        self.put();
        self.dict_of(entries);
        self.build()
    }

    // =========================================================================
    // numpy
    // =========================================================================

    /// A dtype; repeated dtypes are fetched from the memo like Python does.
    pub fn dtype(&mut self, kind: &str, endian: &str) -> &mut Self {
        let key = (kind.to_string(), endian.to_string());
        if let Some(&memo) = self.dtypes.get(&key) {
            return self.get(memo);
        }
        self.global("numpy", "dtype");
        self.tuple_of(|w| {
            w.unicode(kind);
            w.bool(false);
            w.bool(true);
        });
        self.reduce();
        let memo = self.put();
        self.dtypes.insert(key, memo);
        self.tuple_of(|w| {
            w.int(3);
            w.unicode(endian);
            w.none().none().none();
            let size = kind.trim_start_matches(|c: char| c.is_ascii_alphabetic()).parse().unwrap_or(8);
            w.int(size).int(1).int(0);
        });
        self.build()
    }

    /// An array with raw or object `data`.
    pub fn array_with(
        &mut self,
        kind: &str,
        endian: &str,
        shape: &[usize],
        fortran: bool,
        data: impl FnOnce(&mut Self),
    ) -> &mut Self {
        self.global("numpy.core.multiarray", "_reconstruct");
        self.tuple_of(|w| {
            w.global("numpy", "ndarray");
            w.tuple_of(|w| {
                w.int(0);
            });
            w.bytes(b"b");
        });
        self.reduce();
        self.put();
        self.tuple_of(|w| {
            w.int(1);
            w.tuple_of(|w| {
                for &dim in shape {
                    w.int(dim as i64);
                }
            });
            w.dtype(kind, endian);
            w.bool(fortran);
            data(w);
        });
        self.build()
    }

    pub fn i64_array(&mut self, values: &[i64]) -> &mut Self {
        let data: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.array_with("i8", "<", &[values.len()], false, |w| {
            w.bytes(&data);
        })
    }

    pub fn f64_array(&mut self, values: &[f64]) -> &mut Self {
        self.f64_array_shaped(values, &[values.len()])
    }

    pub fn f64_array_shaped(&mut self, values: &[f64], shape: &[usize]) -> &mut Self {
        let data: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.array_with("f8", "<", shape, false, |w| {
            w.bytes(&data);
        })
    }

    fn scalar(&mut self, kind: &str, data: [u8; 8]) -> &mut Self {
        self.global("numpy.core.multiarray", "scalar");
        self.tuple_of(|w| {
            w.dtype(kind, "<");
            w.bytes(&data);
        });
        self.reduce();
        self.put();
        self
    }

    pub fn i64_scalar(&mut self, v: i64) -> &mut Self {
        self.scalar("i8", v.to_le_bytes())
    }

    pub fn f64_scalar(&mut self, v: f64) -> &mut Self {
        self.scalar("f8", v.to_le_bytes())
    }

    // =========================================================================
    // scikit-learn
    // =========================================================================

    /// A `sklearn.tree.tree.DecisionTreeRegressor`.
    pub fn decision_tree(&mut self, n_features: i64, tree: &TreeFixture) -> &mut Self {
        let mut records = Vec::with_capacity(tree.nodes.len() * 56);
        for &(left, right, feature, threshold) in &tree.nodes {
            records.extend_from_slice(&left.to_le_bytes());
            records.extend_from_slice(&right.to_le_bytes());
            records.extend_from_slice(&feature.to_le_bytes());
            records.extend_from_slice(&threshold.to_le_bytes());
            records.extend_from_slice(&0.0f64.to_le_bytes());
            records.extend_from_slice(&1i64.to_le_bytes());
            records.extend_from_slice(&1.0f64.to_le_bytes());
        }
        let n_nodes = tree.nodes.len();

        self.object("sklearn.tree.tree", "DecisionTreeRegressor", |w| {
            w.dict_entry("criterion", |w| {
                w.unicode("friedman_mse");
            });
            w.dict_entry("max_features_", |w| {
                w.int(n_features);
            });
            w.dict_entry("n_outputs_", |w| {
                w.int(1);
            });
            w.dict_entry("n_classes_", |w| {
                w.i64_scalar(1);
            });
            w.dict_entry("tree_", |w| {
                w.global("sklearn.tree._tree", "Tree");
                w.tuple_of(|w| {
                    w.int(n_features);
                    w.i64_array(&[1]);
                    w.int(1);
                });
                w.reduce();
                w.put();
                w.dict_of(|w| {
                    w.dict_entry("max_depth", |w| {
                        w.int(3);
                    });
                    w.dict_entry("node_count", |w| {
                        w.int(n_nodes as i64);
                    });
                    w.dict_entry("nodes", |w| {
                        w.array_with("V56", "|", &[n_nodes], false, |w| {
                            w.bytes(&records);
                        });
                    });
                    w.dict_entry("values", |w| {
                        w.f64_array_shaped(&tree.values, &[n_nodes, 1, 1]);
                    });
                });
                w.build();
            });
        })
    }

    /// A `sklearn.ensemble.gradient_boosting.GradientBoostingClassifier`.
    pub fn gradient_boosting(&mut self, model: &GbcFixture) -> &mut Self {
        let n_estimators = model.stages.len();
        let per_stage = model.stages.first().map_or(0, Vec::len);
        let classes: Vec<i64> = (0..model.n_classes as i64).collect();

        self.object("sklearn.ensemble.gradient_boosting", "GradientBoostingClassifier", |w| {
            w.dict_entry("n_estimators", |w| {
                w.int(n_estimators as i64);
            });
            w.dict_entry("learning_rate", |w| {
                w.float(model.learning_rate);
            });
            w.dict_entry("loss", |w| {
                w.unicode("deviance");
            });
            w.dict_entry("n_classes_", |w| {
                w.int(model.n_classes as i64);
            });
            w.dict_entry("classes_", |w| {
                w.i64_array(&classes);
            });
            w.dict_entry("max_features_", |w| {
                w.int(model.max_features.unwrap_or(model.n_features));
            });
            w.dict_entry("init_", |w| match &model.init {
                InitPrior::LogOdds(prior) => {
                    w.object("sklearn.ensemble.gradient_boosting", "LogOddsEstimator", |w| {
                        w.dict_entry("prior", |w| {
                            w.f64_scalar(*prior);
                        });
                    });
                }
                InitPrior::Priors(priors) => {
                    w.object("sklearn.ensemble.gradient_boosting", "PriorProbabilityEstimator", |w| {
                        w.dict_entry("priors", |w| {
                            w.f64_array(priors);
                        });
                    });
                }
            });
            w.dict_entry("estimators_", |w| {
                w.array_with("O", "|", &[n_estimators, per_stage], false, |w| {
                    w.list_of(|w| {
                        for tree in model.stages.iter().flatten() {
                            w.decision_tree(model.n_features, tree);
                            w.append();
                        }
                    });
                });
            });
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_control_bytes() {
        let mut w = PickleWriter::new();
        w.unicode_bytes(b"a\\b\nc\0\xff");
        assert_eq!(w.finish(), b"Va\\u005cb\\u000ac\\u0000\xff\n.".to_vec());
    }

    #[test]
    fn memoizes_dtypes() {
        let mut w = PickleWriter::new();
        w.dtype("f8", "<").dtype("f8", "<");
        let bytes = w.finish();
        let text = String::from_utf8_lossy(&bytes);
        assert_eq!(text.matches("cnumpy\ndtype\n").count(), 1);
        assert!(text.contains("g0\n"));
    }
}
