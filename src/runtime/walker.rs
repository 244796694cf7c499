//! Pre-order traversal of a plan tree.
//!
//! Uses an explicit stack so arbitrarily deep plans cannot overflow the
//! call stack.

use crate::plan::PlanNode;

/// What the walker does after visiting a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkControl {
    /// Visit the node's children next.
    Descend,
    /// Skip the node's whole subtree.
    SkipChildren,
}

/// Visit `root` and its descendants in pre-order, children left to right.
pub fn walk<'a, F>(root: &'a PlanNode, mut visit: F)
where
    F: FnMut(&'a PlanNode) -> WalkControl,
{
    let mut stack = vec![root];

    while let Some(node) = stack.pop() {
        if visit(node) == WalkControl::Descend {
            // Reversed so the leftmost child is popped first.
            stack.extend(node.children().iter().rev());
        }
    }
}

/// All nodes of the tree in pre-order.
pub fn preorder(root: &PlanNode) -> Vec<&PlanNode> {
    let mut nodes = Vec::new();
    walk(root, |node| {
        nodes.push(node);
        WalkControl::Descend
    });
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::NodeKind;
    use serde_json::json;

    fn named(label: &str) -> PlanNode {
        PlanNode::new(NodeKind::Other("N".to_string())).with_property("label", json!(label))
    }

    fn labels(nodes: &[&PlanNode]) -> Vec<String> {
        nodes
            .iter()
            .map(|n| n.str_property("label").unwrap_or_default().to_string())
            .collect()
    }

    //      a
    //    /   \
    //   b     e
    //  / \     \
    // c   d     f
    fn sample() -> PlanNode {
        named("a")
            .with_child(named("b").with_child(named("c")).with_child(named("d")))
            .with_child(named("e").with_child(named("f")))
    }

    #[test]
    fn test_preorder() {
        let plan = sample();
        assert_eq!(labels(&preorder(&plan)), vec!["a", "b", "c", "d", "e", "f"]);
    }

    #[test]
    fn test_skip_children() {
        let plan = sample();
        let mut visited = Vec::new();

        walk(&plan, |node| {
            visited.push(node);
            if node.str_property("label") == Some("b") {
                WalkControl::SkipChildren
            } else {
                WalkControl::Descend
            }
        });

        assert_eq!(labels(&visited), vec!["a", "b", "e", "f"]);
    }

    #[test]
    fn test_deep_plan_does_not_overflow() {
        let mut plan = named("leaf");
        for _ in 0..100_000 {
            plan = PlanNode::new(NodeKind::Project).with_child(plan);
        }

        let mut count = 0;
        walk(&plan, |_| {
            count += 1;
            WalkControl::Descend
        });

        assert_eq!(count, 100_001);
        // Dropping a 100k-deep tree recurses; leak it to keep the test stack-safe.
        std::mem::forget(plan);
    }
}
