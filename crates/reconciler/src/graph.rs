//! # Dependency Graph
//!
//! Directed graph of task dependencies using petgraph. An edge points from a
//! dependency to its dependent, so a topological order is an execution order.

use std::collections::{BTreeSet, HashMap};

use converge_core::{Error, Result};
use itertools::Itertools;
use petgraph::Direction;
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Bfs;

use crate::task::{TaskName, TaskSet};

/// Validated, acyclic task dependency graph.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    graph: DiGraph<TaskName, ()>,
    node_map: HashMap<TaskName, NodeIndex>,
}

impl DependencyGraph {
    /// Build the graph for a task set.
    ///
    /// # Errors
    ///
    /// Returns `UnknownDependency` for a reference to a task not in the set,
    /// or `GraphCycle` naming every task on a cycle.
    pub fn build(tasks: &TaskSet) -> Result<Self> {
        Self::from_dependencies(tasks.dependency_lists())
    }

    /// Build from `(task, dependencies)` pairs.
    ///
    /// # Errors
    ///
    /// See [`DependencyGraph::build`].
    pub fn from_dependencies<I, D>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (TaskName, D)>,
        D: IntoIterator<Item = TaskName>,
    {
        let entries: Vec<(TaskName, Vec<TaskName>)> = entries
            .into_iter()
            .map(|(name, deps)| (name, deps.into_iter().unique().collect()))
            .collect();

        let mut dag = Self::default();
        for (name, _) in &entries {
            dag.add_node(name);
        }
        for (name, deps) in &entries {
            for dep in deps {
                let Some(&from) = dag.node_map.get(dep) else {
                    return Err(Error::unknown_dependency(name, dep));
                };
                if let Some(&to) = dag.node_map.get(name) {
                    dag.graph.add_edge(from, to, ());
                }
            }
        }
        dag.check_acyclic()?;
        Ok(dag)
    }

    fn add_node(&mut self, name: &TaskName) {
        if !self.node_map.contains_key(name) {
            let index = self.graph.add_node(name.clone());
            self.node_map.insert(name.clone(), index);
        }
    }

    fn check_acyclic(&self) -> Result<()> {
        if toposort(&self.graph, None).is_ok() {
            return Ok(());
        }
        let members: Vec<TaskName> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| match scc.as_slice() {
                [single] => self.graph.contains_edge(*single, *single),
                _ => true,
            })
            .flatten()
            .filter_map(|index| self.graph.node_weight(index).cloned())
            .sorted()
            .collect();
        Err(Error::graph_cycle(members))
    }

    fn neighbors(&self, task: &str, direction: Direction) -> Vec<&TaskName> {
        self.node_map
            .get(task)
            .map(|&index| {
                self.graph
                    .neighbors_directed(index, direction)
                    .filter_map(|n| self.graph.node_weight(n))
                    .sorted()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Tasks `task` directly depends on.
    #[must_use]
    pub fn dependencies(&self, task: &str) -> Vec<&TaskName> {
        self.neighbors(task, Direction::Incoming)
    }

    /// Tasks that directly depend on `task`.
    #[must_use]
    pub fn dependents(&self, task: &str) -> Vec<&TaskName> {
        self.neighbors(task, Direction::Outgoing)
    }

    /// Every task reachable from `task` through dependent edges.
    #[must_use]
    pub fn transitive_dependents(&self, task: &str) -> BTreeSet<TaskName> {
        let Some(&start) = self.node_map.get(task) else {
            return BTreeSet::new();
        };
        let mut bfs = Bfs::new(&self.graph, start);
        let mut reached = BTreeSet::new();
        while let Some(index) = bfs.next(&self.graph) {
            if index == start {
                continue;
            }
            if let Some(name) = self.graph.node_weight(index) {
                reached.insert(name.clone());
            }
        }
        reached
    }

    /// Number of direct dependencies of `task`.
    #[must_use]
    pub fn dependency_count(&self, task: &str) -> usize {
        self.node_map.get(task).map_or(0, |&index| {
            self.graph
                .neighbors_directed(index, Direction::Incoming)
                .count()
        })
    }

    /// Deterministic execution order: dependencies first, ties broken by name.
    #[must_use]
    pub fn topological_order(&self) -> Vec<TaskName> {
        let mut remaining: HashMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|index| {
                let count = self
                    .graph
                    .neighbors_directed(index, Direction::Incoming)
                    .count();
                (index, count)
            })
            .collect();
        let mut ready: BTreeSet<(&TaskName, NodeIndex)> = remaining
            .iter()
            .filter(|(_, count)| **count == 0)
            .filter_map(|(&index, _)| self.graph.node_weight(index).map(|name| (name, index)))
            .collect();

        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some((name, index)) = ready.pop_first() {
            order.push(name.clone());
            for next in self.graph.neighbors_directed(index, Direction::Outgoing) {
                if let Some(count) = remaining.get_mut(&next) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        if let Some(name) = self.graph.node_weight(next) {
                            ready.insert((name, next));
                        }
                    }
                }
            }
        }
        order
    }

    /// All task names.
    pub fn nodes(&self) -> impl Iterator<Item = &TaskName> {
        self.graph.node_weights()
    }

    #[must_use]
    pub fn contains(&self, task: &str) -> bool {
        self.node_map.contains_key(task)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}
