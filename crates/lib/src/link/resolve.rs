use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap, HashSet};

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use tracing::{debug, warn};

use crate::registry::ConfigurationError;

use super::types::{Anchor, LibraryLinkNode, LinkError, LinkOrder, RepeatedToken};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EdgeKind {
  /// The source references symbols defined by the target.
  Symbol,
  /// Ordering only.
  Order,
}

/// Strongly connected component of the link graph, emitted as one block.
struct Component {
  /// Member node positions sorted by introduction order.
  members: Vec<usize>,
  rank: u8,
}

impl Component {
  fn key(&self) -> (u8, usize) {
    (self.rank, self.members[0])
  }
}

fn anchor_rank(anchor: Option<Anchor>) -> u8 {
  match anchor {
    Some(Anchor::Front) => 0,
    None => 1,
    Some(Anchor::Back) => 2,
  }
}

/// Compute the static-link order for `nodes`: every dependent precedes the
/// libraries it needs, ties go to the token introduced first.
///
/// Two-member cycles, and larger cycles whose members all opt in, are broken
/// by emitting the smallest set of members a second time after the cycle.
pub fn resolve(nodes: &[LibraryLinkNode]) -> Result<LinkOrder, LinkError> {
  let mut index: HashMap<&str, usize> = HashMap::with_capacity(nodes.len());
  for (i, node) in nodes.iter().enumerate() {
    if index.insert(node.token.as_str(), i).is_some() {
      return Err(ConfigurationError::DuplicateToken(node.token.clone()).into());
    }
  }

  let mut graph: DiGraph<usize, EdgeKind> = DiGraph::with_capacity(nodes.len(), 0);
  let ids: Vec<NodeIndex> = (0..nodes.len()).map(|i| graph.add_node(i)).collect();

  for (i, node) in nodes.iter().enumerate() {
    let edges = node
      .depends_on
      .iter()
      .map(|t| (t, EdgeKind::Symbol))
      .chain(node.before.iter().map(|t| (t, EdgeKind::Order)));

    for (target, kind) in edges {
      let Some(&j) = index.get(target.as_str()) else {
        return Err(LinkError::UnresolvedDependency {
          token: node.token.clone(),
          dependency: target.clone(),
        });
      };
      if i != j {
        graph.add_edge(ids[i], ids[j], kind);
      }
    }
  }

  let sccs = tarjan_scc(&graph);
  let mut component_of = vec![0usize; nodes.len()];
  let mut components = Vec::with_capacity(sccs.len());

  for (c, scc) in sccs.iter().enumerate() {
    let mut members: Vec<usize> = scc.iter().map(|&idx| graph[idx]).collect();
    members.sort_unstable();
    for &m in &members {
      component_of[m] = c;
    }
    let rank = members.iter().map(|&m| anchor_rank(nodes[m].anchor)).min().unwrap_or(1);
    components.push(Component { members, rank });
  }

  for component in components.iter().filter(|c| c.members.len() > 1) {
    let members = &component.members;
    let has_order_edge = graph.edge_references().any(|e| {
      *e.weight() == EdgeKind::Order
        && members.contains(&graph[e.source()])
        && members.contains(&graph[e.target()])
    });
    let opted_in = members.len() == 2 || members.iter().all(|&m| nodes[m].allow_cycle);

    if has_order_edge || !opted_in {
      return Err(LinkError::CyclicDependency {
        members: members.iter().map(|&m| nodes[m].token.clone()).collect(),
      });
    }
  }

  // Kahn's algorithm over the condensation.
  let mut successors: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); components.len()];
  let mut in_degree = vec![0usize; components.len()];
  for edge in graph.edge_references() {
    let from = component_of[graph[edge.source()]];
    let to = component_of[graph[edge.target()]];
    if from != to && successors[from].insert(to) {
      in_degree[to] += 1;
    }
  }

  let mut ready: BinaryHeap<Reverse<((u8, usize), usize)>> = (0..components.len())
    .filter(|&c| in_degree[c] == 0)
    .map(|c| Reverse((components[c].key(), c)))
    .collect();

  let mut order = LinkOrder::default();

  while let Some(Reverse((_, c))) = ready.pop() {
    let component = &components[c];

    if component.members.len() == 1 {
      order.tokens.push(nodes[component.members[0]].token.clone());
    } else {
      emit_cycle(&graph, &ids, nodes, &component.members, &mut order);
    }

    for &next in &successors[c] {
      in_degree[next] -= 1;
      if in_degree[next] == 0 {
        ready.push(Reverse((components[next].key(), next)));
      }
    }
  }

  debug!(tokens = order.tokens.len(), repeats = order.diagnostics.len(), "resolved link order");
  Ok(order)
}

/// Emit the members of one cycle dependents-first where possible, then repeat
/// every member that a later member of the block still needs.
fn emit_cycle(
  graph: &DiGraph<usize, EdgeKind>,
  ids: &[NodeIndex],
  nodes: &[LibraryLinkNode],
  members: &[usize],
  order: &mut LinkOrder,
) {
  let needs = |from: usize, to: usize| graph.find_edge(ids[from], ids[to]).is_some();

  let mut remaining: Vec<usize> = members.to_vec();
  let mut placed: Vec<usize> = Vec::with_capacity(members.len());

  while !remaining.is_empty() {
    let pick = remaining
      .iter()
      .position(|&m| !remaining.iter().any(|&other| other != m && needs(other, m)))
      .unwrap_or(0);
    placed.push(remaining.remove(pick));
  }

  let tokens: Vec<String> = placed.iter().map(|&m| nodes[m].token.clone()).collect();
  order.tokens.extend(tokens.iter().cloned());

  let mut repeated = HashSet::new();
  for (pos, &member) in placed.iter().enumerate() {
    let needed_later = placed[pos + 1..].iter().any(|&later| needs(later, member));
    if needed_later && repeated.insert(member) {
      let diagnostic = RepeatedToken {
        token: nodes[member].token.clone(),
        cycle: tokens.clone(),
      };
      warn!(token = %diagnostic.token, cycle = ?diagnostic.cycle, "repeating link token to resolve cycle");
      order.tokens.push(diagnostic.token.clone());
      order.diagnostics.push(diagnostic);
    }
  }

  debug!(members = ?tokens, "resolved link cycle");
}
