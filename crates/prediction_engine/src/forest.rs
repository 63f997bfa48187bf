//! Random-forest classifier over the transformed feature vector.
//!
//! Trees are stored as flat node arrays. A split sends a row left when
//! `x[feature] <= threshold`. `value` holds the (possibly weighted) class
//! counts seen at the node during fitting and `cover` the number of training
//! samples that reached it; both are needed for exact attribution.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    /// `None` on leaves.
    #[serde(default)]
    pub feature: Option<usize>,
    #[serde(default)]
    pub threshold: f64,
    #[serde(default)]
    pub left: Option<usize>,
    #[serde(default)]
    pub right: Option<usize>,
    pub cover: f64,
    pub value: [f64; 2],
}

impl TreeNode {
    pub fn is_leaf(&self) -> bool {
        self.feature.is_none()
    }

    /// Class distribution at this node.
    pub fn proba(&self) -> [f64; 2] {
        let total = self.value[0] + self.value[1];
        if total > 0.0 {
            [self.value[0] / total, self.value[1] / total]
        } else {
            [0.5, 0.5]
        }
    }

    fn gini(&self) -> f64 {
        let [p0, p1] = self.proba();
        1.0 - (p0 * p0 + p1 * p1)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<TreeNode>,
}

impl DecisionTree {
    pub fn root(&self) -> &TreeNode {
        &self.nodes[0]
    }

    /// Children of a split node as `(left, right)`.
    pub fn children(&self, node: &TreeNode) -> (usize, usize) {
        (node.left.unwrap_or(0), node.right.unwrap_or(0))
    }

    /// Leaf reached by `row`.
    pub fn leaf(&self, row: &[f64]) -> &TreeNode {
        let mut node = self.root();
        while let Some(feature) = node.feature {
            let (left, right) = self.children(node);
            node = if row[feature] <= node.threshold {
                &self.nodes[left]
            } else {
                &self.nodes[right]
            };
        }
        node
    }

    /// Cover-weighted mean of P(class 1) over the leaves.
    pub fn expected_value(&self) -> f64 {
        let root_cover = self.root().cover;
        self.nodes
            .iter()
            .filter(|n| n.is_leaf())
            .map(|n| n.cover / root_cover * n.proba()[1])
            .sum()
    }

    fn validate(&self, n_features: usize, index: usize) -> Result<(), EngineError> {
        if self.nodes.is_empty() {
            return Err(EngineError::InvalidArtifact(format!("tree {index} has no nodes")));
        }
        for (i, node) in self.nodes.iter().enumerate() {
            if !(node.cover.is_finite() && node.cover > 0.0) {
                return Err(EngineError::InvalidArtifact(format!(
                    "tree {index} node {i} has non-positive cover"
                )));
            }
            let Some(feature) = node.feature else { continue };
            if feature >= n_features {
                return Err(EngineError::InvalidArtifact(format!(
                    "tree {index} node {i} splits on feature {feature} of {n_features}"
                )));
            }
            match (node.left, node.right) {
                // Children always come after their parent, which also rules out cycles.
                (Some(l), Some(r)) if l > i && r > i && l < self.nodes.len() && r < self.nodes.len() => {}
                _ => {
                    return Err(EngineError::InvalidArtifact(format!(
                        "tree {index} node {i} has broken child links"
                    )))
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    pub n_features: usize,
    pub trees: Vec<DecisionTree>,
}

impl RandomForest {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.trees.is_empty() {
            return Err(EngineError::InvalidArtifact("forest has no trees".to_string()));
        }
        self.trees
            .iter()
            .enumerate()
            .try_for_each(|(i, t)| t.validate(self.n_features, i))
    }

    fn check_row(&self, row: &[f64]) -> Result<(), EngineError> {
        if row.len() != self.n_features {
            return Err(EngineError::FeatureMismatch {
                got: row.len(),
                expected: self.n_features,
            });
        }
        Ok(())
    }

    /// Mean of the per-tree leaf distributions, `[P(lose), P(win)]`.
    pub fn predict_proba(&self, row: &[f64]) -> Result<[f64; 2], EngineError> {
        self.check_row(row)?;
        let mut acc = [0.0, 0.0];
        for tree in &self.trees {
            let p = tree.leaf(row).proba();
            acc[0] += p[0];
            acc[1] += p[1];
        }
        let n = self.trees.len() as f64;
        Ok([acc[0] / n, acc[1] / n])
    }

    /// Baseline P(class 1) that attributions are measured against.
    pub fn expected_value(&self) -> f64 {
        self.trees.iter().map(DecisionTree::expected_value).sum::<f64>() / self.trees.len() as f64
    }

    /// Mean decrease in gini impurity per feature, normalized per tree and
    /// averaged over the forest. Input independent.
    pub fn feature_importances(&self) -> Vec<f64> {
        let mut total = vec![0.0; self.n_features];
        for tree in &self.trees {
            let mut imp = vec![0.0; self.n_features];
            for node in &tree.nodes {
                let Some(feature) = node.feature else { continue };
                let (l, r) = tree.children(node);
                let (left, right) = (&tree.nodes[l], &tree.nodes[r]);
                imp[feature] += node.cover * node.gini()
                    - left.cover * left.gini()
                    - right.cover * right.gini();
            }
            let sum: f64 = imp.iter().sum();
            if sum > 0.0 {
                for (t, v) in total.iter_mut().zip(&imp) {
                    *t += v / sum;
                }
            }
        }
        let n = self.trees.len().max(1) as f64;
        total.iter().map(|v| v / n).collect()
    }

    pub fn max_depth(&self) -> usize {
        self.trees.iter().map(tree_depth).max().unwrap_or(0)
    }
}

fn tree_depth(tree: &DecisionTree) -> usize {
    fn walk(tree: &DecisionTree, idx: usize) -> usize {
        let node = &tree.nodes[idx];
        if node.is_leaf() {
            return 0;
        }
        let (l, r) = tree.children(node);
        1 + walk(tree, l).max(walk(tree, r))
    }
    walk(tree, 0)
}
