//! Depth-first renumbering of flat node tables into canonical trees.
//!
//! LightGBM text, XGBoost and scikit-learn all store a tree as parallel
//! arrays indexed by node id. [`reindex`] walks such a table from its root
//! with an explicit stack (right child first) and emits canonical nodes in
//! visit order, so the root is always node 0.

use crate::repr::gbdt::{Node, TreeValidationError};

/// A canonical split node plus the source ids of its non-leaf children.
///
/// Leaf children are wired into `node` by the caller; `left`/`right` are
/// `None` for them.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FlatSplit {
    pub node: Node,
    pub left: Option<usize>,
    pub right: Option<usize>,
}

struct Frame {
    conv: usize,
    left: Option<usize>,
    right: Option<usize>,
}

/// Renumber the subtree rooted at source node `root`.
///
/// `make` converts one source split; it is called exactly once per reachable
/// split. A child id outside `0..n_nodes` or a node reached twice is an error.
pub(crate) fn reindex<E, F>(n_nodes: usize, root: usize, mut make: F) -> Result<Vec<Node>, E>
where
    E: From<TreeValidationError>,
    F: FnMut(usize) -> Result<FlatSplit, E>,
{
    if root >= n_nodes {
        return Err(TreeValidationError::ChildOutOfBounds {
            node: 0,
            side: "root",
            child: root as u32,
            n_nodes,
        }
        .into());
    }

    let mut nodes = Vec::with_capacity(n_nodes);
    let mut visited = vec![false; n_nodes];
    let mut stack = Vec::new();

    let split = make(root)?;
    visited[root] = true;
    nodes.push(split.node);
    stack.push(Frame {
        conv: 0,
        left: split.left,
        right: split.right,
    });

    while let Some(frame) = stack.last_mut() {
        let conv = frame.conv;
        let (child, side) = if let Some(right) = frame.right.take() {
            (right, "right")
        } else if let Some(left) = frame.left.take() {
            (left, "left")
        } else {
            stack.pop();
            continue;
        };

        if child >= n_nodes {
            return Err(TreeValidationError::ChildOutOfBounds {
                node: conv as u32,
                side,
                child: child as u32,
                n_nodes,
            }
            .into());
        }
        if visited[child] {
            return Err(TreeValidationError::DuplicateVisit { node: child as u32 }.into());
        }
        visited[child] = true;

        let split = make(child)?;
        let new_idx = nodes.len() as u32;
        nodes.push(split.node);
        if side == "right" {
            nodes[conv].set_right_node(new_idx);
        } else {
            nodes[conv].set_left_node(new_idx);
        }
        stack.push(Frame {
            conv: new_idx as usize,
            left: split.left,
            right: split.right,
        });
    }

    Ok(nodes)
}
