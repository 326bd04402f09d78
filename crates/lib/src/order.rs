//! Build sequencing over prerequisite edges.
//!
//! Packages are ordered with Kahn's algorithm over a petgraph `DiGraph` whose
//! edges point from a prerequisite to its dependent. Among packages that are
//! ready at the same time the one registered first wins, so identical input
//! always yields the identical sequence.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use thiserror::Error;
use tracing::debug;

use crate::registry::{ConfigurationError, PackageSpec, Registry};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
  #[error(transparent)]
  Configuration(#[from] ConfigurationError),

  #[error("cyclic dependency between packages: {}", .cycle.join(" -> "))]
  CyclicDependency {
    /// Closed cycle path; the first name is repeated at the end.
    cycle: Vec<String>,
  },
}

impl Registry {
  /// Names of all packages in build order.
  pub fn build_order(&self) -> Result<Vec<String>, OrderError> {
    let packages = self.packages();
    let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(packages.len(), 0);
    let nodes: Vec<NodeIndex> = (0..packages.len()).map(|i| graph.add_node(i)).collect();

    for (i, spec) in packages.iter().enumerate() {
      for prerequisite in &spec.requires {
        // Registry construction guarantees every prerequisite is known.
        if let Some(dep) = self.position(prerequisite) {
          graph.update_edge(nodes[dep], nodes[i], ());
        }
      }
    }

    let mut in_degree: HashMap<NodeIndex, usize> = graph
      .node_indices()
      .map(|idx| (idx, graph.neighbors_directed(idx, Direction::Incoming).count()))
      .collect();

    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
      .iter()
      .filter(|(_, deg)| **deg == 0)
      .map(|(idx, _)| Reverse(graph[*idx]))
      .collect();

    let mut order = Vec::with_capacity(packages.len());

    while let Some(Reverse(i)) = ready.pop() {
      order.push(packages[i].name.clone());

      for dependent in graph.neighbors_directed(nodes[i], Direction::Outgoing) {
        if let Some(deg) = in_degree.get_mut(&dependent) {
          *deg -= 1;
          if *deg == 0 {
            ready.push(Reverse(graph[dependent]));
          }
        }
      }
    }

    if order.len() < packages.len() {
      let remaining: Vec<usize> = (0..packages.len()).filter(|&i| in_degree[&nodes[i]] > 0).collect();
      return Err(OrderError::CyclicDependency {
        cycle: self.find_cycle(&remaining),
      });
    }

    debug!(order = ?order, "resolved build order");
    Ok(order)
  }

  /// Follow unresolved prerequisites from the earliest blocked package until
  /// a name repeats. Every blocked package has a blocked prerequisite, so the
  /// walk always closes.
  fn find_cycle(&self, remaining: &[usize]) -> Vec<String> {
    let packages = self.packages();
    let blocked = |name: &str| self.position(name).is_some_and(|i| remaining.contains(&i));

    let mut path: Vec<usize> = Vec::new();
    let mut current = remaining[0];

    loop {
      if let Some(start) = path.iter().position(|&p| p == current) {
        let mut cycle: Vec<String> = path[start..].iter().map(|&i| packages[i].name.clone()).collect();
        cycle.push(packages[current].name.clone());
        return cycle;
      }
      path.push(current);

      let next = packages[current]
        .requires
        .iter()
        .find(|name| blocked(name))
        .and_then(|name| self.position(name));

      match next {
        Some(n) => current = n,
        None => return path.iter().map(|&i| packages[i].name.clone()).collect(),
      }
    }
  }
}

/// Validate `packages` and return their names in build order.
pub fn resolve(packages: &[PackageSpec]) -> Result<Vec<String>, OrderError> {
  Registry::new(packages.to_vec())?.build_order()
}
