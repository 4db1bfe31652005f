//! Step dependency graph.
//!
//! Definitions live in an arena; edges are index pairs. The graph is
//! validated once when built (duplicate ids, unknown dependencies, cycles),
//! so execution never meets an unresolvable dependency.

use crate::error::Result;
use crate::step::StepDefinition;
use crate::PipelineError;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct StepGraph {
    nodes: Vec<StepDefinition>,
    index: HashMap<String, usize>,
    /// `deps[i]` holds the indices step `i` waits on, in declaration order.
    deps: Vec<Vec<usize>>,
    order: Vec<usize>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

impl StepGraph {
    /// Build and validate a graph from step definitions.
    pub fn build(nodes: Vec<StepDefinition>) -> Result<Self> {
        if nodes.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "Pipeline must have at least one step".to_string(),
            ));
        }

        let mut index = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            if index.insert(node.id.clone(), i).is_some() {
                return Err(PipelineError::DuplicateStep(node.id.clone()));
            }
        }

        let mut deps = Vec::with_capacity(nodes.len());
        for node in &nodes {
            let mut resolved = Vec::with_capacity(node.depends_on.len());
            for dep in &node.depends_on {
                let idx = index.get(dep).copied().ok_or_else(|| {
                    PipelineError::DanglingDependency {
                        step: node.id.clone(),
                        dependency: dep.clone(),
                    }
                })?;
                if !resolved.contains(&idx) {
                    resolved.push(idx);
                }
            }
            deps.push(resolved);
        }

        let mut graph = Self {
            nodes,
            index,
            deps,
            order: Vec::new(),
        };
        graph.order = graph.topological_order()?;
        Ok(graph)
    }

    /// Depth-first topological sort. Dependencies come before dependents;
    /// unrelated steps keep their insertion order. Shared dependencies are
    /// visited once.
    fn topological_order(&self) -> Result<Vec<usize>> {
        let mut marks = vec![Mark::Unvisited; self.nodes.len()];
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut path = Vec::new();
        for i in 0..self.nodes.len() {
            self.visit(i, &mut marks, &mut order, &mut path)?;
        }
        Ok(order)
    }

    fn visit(
        &self,
        node: usize,
        marks: &mut [Mark],
        order: &mut Vec<usize>,
        path: &mut Vec<usize>,
    ) -> Result<()> {
        match marks[node] {
            Mark::Done => return Ok(()),
            Mark::InProgress => {
                let start = path.iter().position(|&n| n == node).unwrap_or(0);
                let mut cycle: Vec<&str> = path[start..]
                    .iter()
                    .map(|&n| self.nodes[n].id.as_str())
                    .collect();
                cycle.push(self.nodes[node].id.as_str());
                return Err(PipelineError::DependencyCycle(cycle.join(" -> ")));
            }
            Mark::Unvisited => {}
        }
        marks[node] = Mark::InProgress;
        path.push(node);
        for &dep in &self.deps[node] {
            self.visit(dep, marks, order, path)?;
        }
        path.pop();
        marks[node] = Mark::Done;
        order.push(node);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, idx: usize) -> &StepDefinition {
        &self.nodes[idx]
    }

    pub fn nodes(&self) -> &[StepDefinition] {
        &self.nodes
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn dependencies(&self, idx: usize) -> &[usize] {
        &self.deps[idx]
    }

    /// Execution order as arena indices.
    pub fn execution_order(&self) -> &[usize] {
        &self.order
    }

    /// `(dependency, dependent)` pairs.
    pub fn edges(&self) -> Vec<(usize, usize)> {
        self.deps
            .iter()
            .enumerate()
            .flat_map(|(to, froms)| froms.iter().map(move |&from| (from, to)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::FnBody;
    use crate::types::Family;
    use proptest::prelude::*;
    use serde_json::json;
    use std::sync::Arc;

    fn def(id: &str, deps: &[&str]) -> StepDefinition {
        let body = Arc::new(FnBody::new("noop", |_| Ok(json!(null))));
        deps.iter()
            .fold(StepDefinition::new(id, Family::Rag, id, body), |d, dep| d.after(*dep))
    }

    fn ids(graph: &StepGraph) -> Vec<&str> {
        graph
            .execution_order()
            .iter()
            .map(|&i| graph.node(i).id.as_str())
            .collect()
    }

    #[test]
    fn test_dependencies_first() {
        let graph = StepGraph::build(vec![def("a", &["b"]), def("b", &[])]).unwrap();
        assert_eq!(ids(&graph), vec!["b", "a"]);
        assert_eq!(graph.edges(), vec![(1, 0)]);
    }

    #[test]
    fn test_shared_dependency_visited_once() {
        let graph = StepGraph::build(vec![
            def("index", &["embed"]),
            def("embed", &["chunk"]),
            def("entities", &["chunk"]),
            def("chunk", &[]),
        ])
        .unwrap();
        assert_eq!(ids(&graph), vec!["chunk", "embed", "index", "entities"]);
    }

    #[test]
    fn test_independent_steps_keep_insertion_order() {
        let graph = StepGraph::build(vec![def("x", &[]), def("y", &[]), def("z", &[])]).unwrap();
        assert_eq!(ids(&graph), vec!["x", "y", "z"]);
    }

    #[test]
    fn test_dangling_dependency_rejected() {
        let err = StepGraph::build(vec![def("a", &["ghost"])]).unwrap_err();
        match err {
            PipelineError::DanglingDependency { step, dependency } => {
                assert_eq!(step, "a");
                assert_eq!(dependency, "ghost");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_cycle_rejected_with_path() {
        let err = StepGraph::build(vec![def("a", &["c"]), def("b", &["a"]), def("c", &["b"])])
            .unwrap_err();
        match err {
            PipelineError::DependencyCycle(path) => assert_eq!(path, "a -> c -> b -> a"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_self_dependency_is_cycle() {
        assert!(matches!(
            StepGraph::build(vec![def("a", &["a"])]),
            Err(PipelineError::DependencyCycle(_))
        ));
    }

    #[test]
    fn test_duplicate_and_empty_rejected() {
        assert!(matches!(
            StepGraph::build(vec![def("a", &[]), def("a", &[])]),
            Err(PipelineError::DuplicateStep(_))
        ));
        assert!(matches!(StepGraph::build(vec![]), Err(PipelineError::InvalidConfig(_))));
    }

    proptest! {
        // Edges only point to earlier indices, so every generated graph is acyclic.
        #[test]
        fn prop_order_respects_every_edge(
            edges in proptest::collection::vec(
                proptest::collection::vec(any::<prop::sample::Index>(), 0..4),
                1..12,
            )
        ) {
            let names: Vec<String> = (0..edges.len()).map(|i| format!("s{}", i)).collect();
            let defs: Vec<StepDefinition> = edges.iter().enumerate().map(|(i, picks)| {
                let deps: Vec<&str> = if i == 0 {
                    Vec::new()
                } else {
                    picks.iter().map(|p| names[p.index(i)].as_str()).collect()
                };
                def(&names[i], &deps)
            }).collect();
            // Reverse insertion so the sort has real work to do.
            let graph = StepGraph::build(defs.into_iter().rev().collect()).unwrap();
            let order = graph.execution_order();
            prop_assert_eq!(order.len(), graph.len());
            let position: HashMap<usize, usize> =
                order.iter().enumerate().map(|(p, &n)| (n, p)).collect();
            for (from, to) in graph.edges() {
                prop_assert!(position[&from] < position[&to]);
            }
        }
    }
}
