//! Transient dependency graph used for cycle validation.

use std::collections::{BTreeSet, HashMap, HashSet};

use super::AssemblyError;

/// Adjacency from each resource to the resources it depends on.
///
/// Nodes remember the order in which they were first added so that cycle
/// reports are stable across runs.
#[derive(Clone, Debug, Default)]
pub(crate) struct DependencyGraph {
    order: Vec<String>,
    edges: HashMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    /// Replaces the outgoing edges of `node`, adding it if unseen.
    pub(crate) fn set_edges(&mut self, node: &str, targets: BTreeSet<String>) {
        if !self.edges.contains_key(node) {
            self.order.push(node.to_owned());
        }
        self.edges.insert(node.to_owned(), targets);
    }

    /// Adds edges from `node` without discarding existing ones.
    pub(crate) fn extend_edges(&mut self, node: &str, targets: impl IntoIterator<Item = String>) {
        if !self.edges.contains_key(node) {
            self.order.push(node.to_owned());
        }
        self.edges.entry(node.to_owned()).or_default().extend(targets);
    }

    pub(crate) fn edges_of(&self, node: &str) -> Option<&BTreeSet<String>> {
        self.edges.get(node)
    }

    /// Depth-first search for a cycle, visiting roots in insertion order.
    pub(crate) fn ensure_acyclic(&self) -> Result<(), AssemblyError> {
        let mut walk = Walk::default();
        for root in &self.order {
            self.visit(root, &mut walk)?;
        }
        Ok(())
    }

    fn visit<'g>(&'g self, node: &'g str, walk: &mut Walk<'g>) -> Result<(), AssemblyError> {
        if walk.in_stack.contains(node) {
            return Err(walk.cycle_error(node));
        }
        if walk.visited.contains(node) {
            return Ok(());
        }

        walk.visited.insert(node);
        walk.in_stack.insert(node);
        walk.path.push(node);

        if let Some(targets) = self.edges.get(node) {
            for target in targets {
                self.visit(target, walk)?;
            }
        }

        walk.path.pop();
        walk.in_stack.remove(node);
        Ok(())
    }
}

#[derive(Default)]
struct Walk<'g> {
    visited: HashSet<&'g str>,
    in_stack: HashSet<&'g str>,
    path: Vec<&'g str>,
}

impl Walk<'_> {
    fn cycle_error(&self, node: &str) -> AssemblyError {
        let start = self.path.iter().position(|n| *n == node).unwrap_or(0);
        let mut cycle: Vec<String> = self
            .path
            .iter()
            .skip(start)
            .map(|n| (*n).to_owned())
            .collect();
        cycle.push(node.to_owned());
        AssemblyError::CircularDependency {
            logical_id: node.to_owned(),
            cycle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: Vec<(&str, Vec<&str>)>) -> DependencyGraph {
        let mut graph = DependencyGraph::default();
        for (node, targets) in edges {
            graph.set_edges(node, targets.into_iter().map(str::to_owned).collect());
        }
        graph
    }

    #[test]
    fn acyclic_diamond_passes() {
        let g = graph(vec![
            ("A", vec!["B", "C"]),
            ("B", vec!["D"]),
            ("C", vec!["D"]),
            ("D", vec![]),
        ]);
        assert_eq!(g.ensure_acyclic(), Ok(()));
    }

    #[test]
    fn two_node_cycle_is_reported_with_path() {
        let g = graph(vec![("A", vec!["B"]), ("B", vec!["A"])]);
        let err = g.ensure_acyclic().expect_err("cycle expected");
        assert_eq!(
            err,
            AssemblyError::CircularDependency {
                logical_id: String::from("A"),
                cycle: vec![String::from("A"), String::from("B"), String::from("A")],
            }
        );
    }

    #[test]
    fn long_cycle_behind_acyclic_prefix_is_found() {
        let g = graph(vec![
            ("Root", vec!["A"]),
            ("A", vec!["B"]),
            ("B", vec!["C"]),
            ("C", vec!["A"]),
        ]);
        let Err(AssemblyError::CircularDependency { logical_id, cycle }) = g.ensure_acyclic()
        else {
            panic!("cycle expected");
        };
        assert_eq!(logical_id, "A");
        assert_eq!(cycle, vec!["A", "B", "C", "A"]);
    }

    #[test]
    fn edges_to_undeclared_nodes_are_leaves() {
        let g = graph(vec![("A", vec!["Elsewhere"])]);
        assert_eq!(g.ensure_acyclic(), Ok(()));
    }

    #[test]
    fn set_edges_replaces_previous_targets() {
        let mut g = graph(vec![("A", vec!["B"]), ("B", vec!["A"])]);
        g.set_edges("B", BTreeSet::new());
        assert_eq!(g.ensure_acyclic(), Ok(()));
        assert_eq!(g.edges_of("B").map(BTreeSet::len), Some(0));
    }
}
