//! Randomized isolation tree
//!
//! A tree recursively splits a row subset on a random attribute at a random
//! value between that attribute's min and max. Points that land in a leaf
//! after few splits are easy to isolate and therefore likely outliers.

use ndarray::{ArrayView1, ArrayView2};
use rand::Rng;

use crate::utils::AnalysisError;

/// Euler–Mascheroni constant used by the harmonic-number approximation
pub const EULER_GAMMA: f64 = 0.5772156649;

/// Expected path length `c(n)` of an unsuccessful search in a random binary
/// tree holding `n` items.
///
/// `c(n) = 2 * (ln(n - 1) + γ) - 2 * (n - 1) / n` for `n > 1`, else `0`.
pub fn average_path_length(n: usize) -> f64 {
    if n <= 1 {
        return 0.0;
    }
    let n = n as f64;
    2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
}

/// Uniform draw in `[min, max)` that stays finite when `max - min` overflows
fn split_between<R: Rng>(min: f64, max: f64, rng: &mut R) -> f64 {
    let u: f64 = rng.gen();
    let value = min * (1.0 - u) + max * u;
    if value >= max {
        min
    } else {
        value.max(min)
    }
}

/// Node of an isolation tree
#[derive(Debug, Clone, PartialEq)]
pub enum TreeNode {
    /// Terminal node holding the number of training rows that reached it
    Leaf { size: usize },
    /// Split node; an absent child is an implicit empty leaf
    Internal {
        attribute: usize,
        split_value: f64,
        /// Rows with `value < split_value`
        left: Option<Box<TreeNode>>,
        /// Rows with `value >= split_value`
        right: Option<Box<TreeNode>>,
    },
}

impl TreeNode {
    fn build<R: Rng>(
        data: &ArrayView2<'_, f64>,
        indices: &[usize],
        depth: usize,
        max_depth: usize,
        rng: &mut R,
    ) -> Self {
        let size = indices.len();
        if depth >= max_depth || size <= 1 {
            return TreeNode::Leaf { size };
        }

        let attribute = rng.gen_range(0..data.ncols());
        let (min, max) = indices
            .iter()
            .map(|&i| data[[i, attribute]])
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            });

        // No viable split on this attribute
        if min == max {
            return TreeNode::Leaf { size };
        }

        let split_value = split_between(min, max, rng);
        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| data[[i, attribute]] < split_value);

        let left = if left.is_empty() {
            None
        } else {
            Some(Box::new(Self::build(data, &left, depth + 1, max_depth, rng)))
        };
        let right = if right.is_empty() {
            None
        } else {
            Some(Box::new(Self::build(data, &right, depth + 1, max_depth, rng)))
        };

        TreeNode::Internal {
            attribute,
            split_value,
            left,
            right,
        }
    }

    fn path_length(&self, point: &ArrayView1<'_, f64>, depth: usize) -> f64 {
        match self {
            TreeNode::Leaf { size } => depth as f64 + average_path_length(*size),
            TreeNode::Internal {
                attribute,
                split_value,
                left,
                right,
            } => {
                let next = if point[*attribute] < *split_value {
                    left
                } else {
                    right
                };
                match next {
                    Some(node) => node.path_length(point, depth + 1),
                    None => (depth + 1) as f64,
                }
            }
        }
    }

    fn depth(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 0,
            TreeNode::Internal { left, right, .. } => {
                let l = left.as_ref().map_or(0, |n| n.depth());
                let r = right.as_ref().map_or(0, |n| n.depth());
                1 + l.max(r)
            }
        }
    }

    fn leaf_count(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 1,
            TreeNode::Internal { left, right, .. } => {
                left.as_ref().map_or(0, |n| n.leaf_count())
                    + right.as_ref().map_or(0, |n| n.leaf_count())
            }
        }
    }
}

/// One randomized partition tree built over a data subsample
#[derive(Debug, Clone, PartialEq)]
pub struct IsolationTree {
    root: TreeNode,
    max_depth: usize,
}

impl IsolationTree {
    /// Depth limit for a given subsample size: `ceil(log2(n))`
    pub fn max_depth_for(subsample_size: usize) -> usize {
        if subsample_size <= 1 {
            0
        } else {
            (subsample_size as f64).log2().ceil() as usize
        }
    }

    /// Build a tree over the rows of `data` selected by `indices`
    ///
    /// # Arguments
    /// * `data` - Feature matrix (rows=points, cols=attributes)
    /// * `indices` - Row indices forming this tree's subsample
    /// * `max_depth` - Depth at which every node becomes a leaf
    /// * `rng` - Source of attribute choices and split values
    ///
    /// # Returns
    /// * `Err(AnalysisError::ValidationError)` - If an index is out of range or
    ///   a splittable subset has no attributes
    pub fn fit<R: Rng>(
        data: ArrayView2<'_, f64>,
        indices: &[usize],
        max_depth: usize,
        rng: &mut R,
    ) -> Result<Self, AnalysisError> {
        if let Some(&i) = indices.iter().find(|&&i| i >= data.nrows()) {
            return Err(AnalysisError::ValidationError(format!(
                "row index {} out of range for {} rows",
                i,
                data.nrows()
            )));
        }
        if data.ncols() == 0 && indices.len() > 1 && max_depth > 0 {
            return Err(AnalysisError::ValidationError(
                "cannot split rows without attributes".to_string(),
            ));
        }
        let root = TreeNode::build(&data, indices, 0, max_depth, rng);
        Ok(Self { root, max_depth })
    }

    /// Corrected depth at which `point` settles, starting from `depth`
    pub fn path_length(&self, point: ArrayView1<'_, f64>, depth: usize) -> f64 {
        self.root.path_length(&point, depth)
    }

    pub fn root(&self) -> &TreeNode {
        &self.root
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Realized depth of the tree (0 for a lone leaf)
    pub fn depth(&self) -> usize {
        self.root.depth()
    }

    /// Number of explicit leaves
    pub fn leaf_count(&self) -> usize {
        self.root.leaf_count()
    }
}
