//! XGBoost binary model reader.
//!
//! Layout (all little-endian):
//!
//! ```text
//! ["binf"]                       XGBoost >= 1.0 only
//! LearnerModelParam              136 bytes
//! objective name, booster name   u64 length + bytes each
//! gbtree | dart:
//!   GBTreeModelParam             160 bytes
//!   per tree: TreeParam, nodes, node stats, [leaf vector]
//!   tree_info                    num_trees x i32
//!   weight_drop                  dart only, u64 count + f32s
//! gblinear:
//!   GBLinearModelParam           136 bytes
//!   weights                      u64 count + f32s
//! ```
//!
//! Models written before 1.0 (`major_version == 0`) keep the group count in
//! the booster header and `base_score` already in margin space.

use crate::io::binary::{
    BinaryNode, BinaryReader, FixedRecord, GBLinearModelParam, GBTreeModelParam, LearnerModelParam, NodeStat,
    TreeParam, skip_binf_magic,
};
use crate::model::{Ensemble, LoadOptions};
use crate::repr::gbdt::Tree;

use super::XgboostError;
use super::convert::{
    LinearBooster, TreeBooster, TreeError, assemble_linear, assemble_trees, base_margin, convert_tree, model_name,
    n_features, n_groups,
};

type Reader<'a> = BinaryReader<&'a [u8]>;

/// Load a binary model from its bytes.
pub fn load_binary(bytes: &[u8], options: &LoadOptions) -> Result<Ensemble, XgboostError> {
    let mut reader = BinaryReader::new(skip_binf_magic(bytes));
    let header: LearnerModelParam = reader.read_record()?;
    let objective = reader.read_string("objective name")?;
    let booster = reader.read_string("booster name")?;
    model_name(&booster)?;

    if booster == "gblinear" {
        read_linear(&mut reader, &header, objective, options)
    } else {
        read_trees(&mut reader, &header, booster, objective, options)
    }
}

fn read_trees(
    reader: &mut Reader<'_>,
    header: &LearnerModelParam,
    booster: String,
    objective: String,
    options: &LoadOptions,
) -> Result<Ensemble, XgboostError> {
    let param: GBTreeModelParam = reader.read_record()?;
    let header_features = n_features(i64::from(header.num_feature))?;

    let (groups, base_score) = if header.major_version > 0 {
        (n_groups(i64::from(header.num_class)), base_margin(&objective, header.base_score))
    } else {
        (n_groups(i64::from(param.num_output_group)), f64::from(header.base_score))
    };

    if i64::from(param.num_feature) > i64::from(header_features) {
        return Err(XgboostError::BoosterFeatures {
            booster: param.num_feature,
            header: header_features,
        });
    }
    if param.num_roots != 1 {
        return Err(XgboostError::Roots(param.num_roots));
    }
    let num_trees = usize::try_from(param.num_trees).map_err(|_| XgboostError::InvalidValue {
        field: "num_trees",
        message: format!("{} is negative", param.num_trees),
    })?;

    let mut trees = Vec::new();
    for index in 0..num_trees {
        let tree = read_tree(reader, header_features).map_err(|source| XgboostError::Tree { index, source })?;
        trees.push(tree);
    }
    let tree_info = reader.read_i32_array(num_trees, "tree_info")?;
    let weight_drop = if booster == "dart" {
        Some(reader.read_f32_vec("weight_drop")?)
    } else {
        None
    };

    assemble_trees(
        TreeBooster {
            booster,
            objective,
            n_groups: groups,
            n_features: header_features,
            base_score,
            trees,
            tree_info,
            weight_drop,
        },
        options,
    )
}

fn read_tree(reader: &mut Reader<'_>, header_features: u32) -> Result<Tree, TreeError> {
    let param: TreeParam = reader.read_record()?;
    let num_nodes = usize::try_from(param.num_nodes).map_err(|_| TreeError::NoNodes)?;
    let nodes: Vec<BinaryNode> = reader.read_records(num_nodes)?;
    reader.skip(num_nodes * NodeStat::SIZE, "node stats")?;
    if param.size_leaf_vector > 0 {
        reader.read_f32_vec("leaf vector")?;
    }
    convert_tree(&param, &nodes, header_features)
}

fn read_linear(
    reader: &mut Reader<'_>,
    header: &LearnerModelParam,
    objective: String,
    options: &LoadOptions,
) -> Result<Ensemble, XgboostError> {
    let param: GBLinearModelParam = reader.read_record()?;
    let weights = reader.read_f32_vec("gblinear weights")?;
    n_features(i64::from(header.num_feature))?;

    let (groups, base_score, features) = if header.major_version > 0 {
        (
            n_groups(i64::from(header.num_class)),
            base_margin(&objective, header.base_score),
            header.num_feature as usize,
        )
    } else {
        (
            n_groups(i64::from(param.num_output_group)),
            f64::from(header.base_score),
            param.num_feature as usize,
        )
    };

    assemble_linear(
        LinearBooster {
            objective,
            n_groups: groups,
            n_features: features,
            base_score,
            weights,
        },
        options,
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::{OutputTransform, PredictOptions};
    use approx::assert_abs_diff_eq;

    /// Writes model files in the layout above.
    #[derive(Default)]
    pub(crate) struct ModelWriter {
        pub bytes: Vec<u8>,
    }

    impl ModelWriter {
        fn i32(&mut self, v: i32) -> &mut Self {
            self.bytes.extend_from_slice(&v.to_le_bytes());
            self
        }

        fn f32(&mut self, v: f32) -> &mut Self {
            self.bytes.extend_from_slice(&v.to_le_bytes());
            self
        }

        fn zeros(&mut self, n_words: usize) -> &mut Self {
            self.bytes.resize(self.bytes.len() + n_words * 4, 0);
            self
        }

        pub fn magic(&mut self) -> &mut Self {
            self.bytes.extend_from_slice(b"binf");
            self
        }

        pub fn header(&mut self, base_score: f32, num_feature: u32, num_class: i32, major: u32) -> &mut Self {
            self.f32(base_score).i32(num_feature as i32).i32(num_class).i32(0).i32(0);
            self.i32(major as i32).i32(0).zeros(27)
        }

        pub fn string(&mut self, s: &str) -> &mut Self {
            self.bytes.extend_from_slice(&(s.len() as u64).to_le_bytes());
            self.bytes.extend_from_slice(s.as_bytes());
            self
        }

        pub fn f32_vec(&mut self, values: &[f32]) -> &mut Self {
            self.bytes.extend_from_slice(&(values.len() as u64).to_le_bytes());
            for &v in values {
                self.f32(v);
            }
            self
        }

        pub fn gbtree_param(&mut self, num_trees: i32, num_feature: i32, num_output_group: i32) -> &mut Self {
            self.i32(num_trees).i32(1).i32(num_feature).i32(0);
            self.bytes.extend_from_slice(&0i64.to_le_bytes());
            self.i32(num_output_group).i32(0).zeros(32)
        }

        pub fn gblinear_param(&mut self, num_feature: u32, num_output_group: i32) -> &mut Self {
            self.i32(num_feature as i32).i32(num_output_group).zeros(32)
        }

        /// `nodes` as `(cleft, cright, sindex, info)`.
        pub fn tree(&mut self, num_feature: i32, nodes: &[(i32, i32, u32, f32)]) -> &mut Self {
            self.i32(1).i32(nodes.len() as i32).i32(0).i32(0).i32(num_feature).i32(0).zeros(31);
            for &(cleft, cright, sindex, info) in nodes {
                self.i32(-1).i32(cleft).i32(cright);
                self.bytes.extend_from_slice(&sindex.to_le_bytes());
                self.f32(info);
            }
            self.zeros(4 * nodes.len())
        }

        pub fn tree_info(&mut self, groups: &[i32]) -> &mut Self {
            for &g in groups {
                self.i32(g);
            }
            self
        }
    }

    /// f0 <= 0.5 (NaN left) ? 1.0 : -1.0
    pub(crate) const STUMP: [(i32, i32, u32, f32); 3] =
        [(1, 2, 1 << 31, 0.5), (-1, -1, 0, 1.0), (-1, -1, 0, -1.0)];

    fn gbtree_model(major: u32, base_score: f32) -> Vec<u8> {
        let mut w = ModelWriter::default();
        if major > 0 {
            w.magic();
        }
        w.header(base_score, 2, 0, major)
            .string("binary:logistic")
            .string("gbtree")
            .gbtree_param(2, 2, 1)
            .tree(2, &STUMP)
            .tree(2, &[(-1, -1, 0, 0.25)])
            .tree_info(&[0, 0]);
        w.bytes
    }

    #[test]
    fn reads_gbtree() {
        let ensemble = load_binary(&gbtree_model(1, 0.5), &LoadOptions::default()).unwrap();
        assert_eq!(ensemble.name(), "xgboost.gbtree");
        assert_eq!(ensemble.n_trees(), 2);
        assert_eq!(ensemble.n_features(), 2);

        let opts = PredictOptions::default();
        assert_abs_diff_eq!(ensemble.predict_single(&[0.0, 0.0], &opts).unwrap(), 1.25);
        assert_abs_diff_eq!(ensemble.predict_single(&[1.0, 0.0], &opts).unwrap(), -0.75);
        assert_abs_diff_eq!(ensemble.predict_single(&[f64::NAN, 0.0], &opts).unwrap(), 1.25);
    }

    #[test]
    fn legacy_base_score_is_margin() {
        let ensemble = load_binary(&gbtree_model(0, 0.5), &LoadOptions::default()).unwrap();
        let score = ensemble.predict_single(&[0.0, 0.0], &PredictOptions::default()).unwrap();
        assert_abs_diff_eq!(score, 1.75);
    }

    #[test]
    fn logistic_transform() {
        let ensemble = load_binary(&gbtree_model(1, 0.5), &LoadOptions::with_transform()).unwrap();
        assert_eq!(ensemble.transform(), OutputTransform::Logistic);
        let p = ensemble.predict_single(&[0.0, 0.0], &PredictOptions::default()).unwrap();
        assert_abs_diff_eq!(p, 1.0 / (1.0 + (-1.25f64).exp()), epsilon = 1e-12);
    }

    #[test]
    fn reads_dart_weights() {
        let mut w = ModelWriter::default();
        w.header(0.5, 2, 0, 1)
            .string("reg:squarederror")
            .string("dart")
            .gbtree_param(2, 2, 1)
            .tree(2, &STUMP)
            .tree(2, &STUMP)
            .tree_info(&[0, 0])
            .f32_vec(&[1.0, 0.5]);
        let ensemble = load_binary(&w.bytes, &LoadOptions::default()).unwrap();
        assert_eq!(ensemble.name(), "xgboost.dart");
        let score = ensemble.predict_single(&[0.0, 0.0], &PredictOptions::default()).unwrap();
        assert_abs_diff_eq!(score, 0.5 + 1.0 + 0.5);
    }

    #[test]
    fn reads_gblinear() {
        let mut w = ModelWriter::default();
        w.header(0.5, 2, 0, 1)
            .string("reg:squarederror")
            .string("gblinear")
            .gblinear_param(2, 1)
            .f32_vec(&[2.0, -1.0, 0.25]);
        let ensemble = load_binary(&w.bytes, &LoadOptions::default()).unwrap();
        assert_eq!(ensemble.name(), "xgboost.gblinear");
        let score = ensemble.predict_single(&[1.0, 3.0], &PredictOptions::default()).unwrap();
        assert_abs_diff_eq!(score, 0.5 + 0.25 + 2.0 - 3.0);
    }

    #[test]
    fn header_errors() {
        let mut w = ModelWriter::default();
        w.header(0.5, 2, 0, 1).string("reg:squarederror").string("gbforest");
        assert!(matches!(
            load_binary(&w.bytes, &LoadOptions::default()),
            Err(XgboostError::UnsupportedBooster(_))
        ));

        let mut w = ModelWriter::default();
        w.header(0.5, 0, 0, 1)
            .string("reg:squarederror")
            .string("gbtree")
            .gbtree_param(1, 0, 1);
        assert!(matches!(
            load_binary(&w.bytes, &LoadOptions::default()),
            Err(XgboostError::NoFeatures)
        ));

        let mut w = ModelWriter::default();
        w.header(0.5, 2, 0, 1)
            .string("reg:squarederror")
            .string("gbtree")
            .gbtree_param(0, 2, 1);
        assert!(matches!(
            load_binary(&w.bytes, &LoadOptions::default()),
            Err(XgboostError::NoTrees)
        ));

        let mut w = ModelWriter::default();
        w.header(0.5, 2, 2, 1)
            .string("multi:softprob")
            .string("gbtree")
            .gbtree_param(2, 2, 1)
            .tree(2, &STUMP)
            .tree(2, &STUMP)
            .tree_info(&[1, 0]);
        assert!(matches!(
            load_binary(&w.bytes, &LoadOptions::default()),
            Err(XgboostError::TreeInfoPattern { index: 0, .. })
        ));
    }

    #[test]
    fn tree_errors_carry_index() {
        let mut w = ModelWriter::default();
        w.header(0.5, 2, 0, 1)
            .string("reg:squarederror")
            .string("gbtree")
            .gbtree_param(2, 2, 1)
            .tree(2, &STUMP)
            .tree(2, &[(1, -5, 0, 0.5), (-1, -1, 0, 1.0)])
            .tree_info(&[0, 0]);
        let err = load_binary(&w.bytes, &LoadOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            XgboostError::Tree {
                index: 1,
                source: TreeError::NegativeChild { .. }
            }
        ));
        assert!(err.to_string().starts_with("error while reading tree 1"));
    }

    #[test]
    fn truncated_input() {
        let bytes = gbtree_model(1, 0.5);
        let err = load_binary(&bytes[..bytes.len() - 6], &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, XgboostError::Binary(_)));
    }
}
