use std::collections::{BTreeSet, HashMap};

use crate::error::GraphError;

/// Dependency structure derived from input references.
///
/// Built once at lock time and read-only afterwards.
#[derive(Debug, Clone)]
pub struct Graph {
  /// Node names in declaration order.
  order: Vec<String>,
  /// Adjacency list: name -> downstream names.
  adjacency: HashMap<String, Vec<String>>,
  /// Reverse adjacency: name -> upstream names.
  reverse_adjacency: HashMap<String, Vec<String>>,
  /// Nodes with no incoming edges.
  entry_points: Vec<String>,
}

impl Graph {
  /// Build a graph from declaration order and a deduplicated edge set.
  pub fn new(order: Vec<String>, edges: Vec<(String, String)>) -> Self {
    let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
    let mut reverse_adjacency: HashMap<String, Vec<String>> = HashMap::new();

    for name in &order {
      adjacency.entry(name.clone()).or_default();
      reverse_adjacency.entry(name.clone()).or_default();
    }

    for (from, to) in edges {
      adjacency.entry(from.clone()).or_default().push(to.clone());
      reverse_adjacency.entry(to).or_default().push(from);
    }

    let entry_points: Vec<String> = order
      .iter()
      .filter(|name| reverse_adjacency.get(*name).is_none_or(|v| v.is_empty()))
      .cloned()
      .collect();

    Self {
      order,
      adjacency,
      reverse_adjacency,
      entry_points,
    }
  }

  /// Node names in declaration order.
  pub fn order(&self) -> &[String] {
    &self.order
  }

  /// Nodes with no incoming edges.
  pub fn entry_points(&self) -> &[String] {
    &self.entry_points
  }

  /// Downstream nodes for a given node.
  pub fn downstream(&self, name: &str) -> &[String] {
    self.adjacency.get(name).map(|v| v.as_slice()).unwrap_or(&[])
  }

  /// Upstream nodes for a given node.
  pub fn upstream(&self, name: &str) -> &[String] {
    self
      .reverse_adjacency
      .get(name)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// A sequence placing every node after all nodes it depends on, with ties
  /// among independent nodes broken by declaration order.
  ///
  /// # Errors
  /// Returns [`GraphError::CycleDetected`] naming the cycle's members if no
  /// such ordering exists.
  pub fn topological_order(&self) -> Result<Vec<String>, GraphError> {
    let index_of: HashMap<&str, usize> = self
      .order
      .iter()
      .enumerate()
      .map(|(index, name)| (name.as_str(), index))
      .collect();

    let mut remaining: Vec<usize> = self
      .order
      .iter()
      .map(|name| self.upstream(name).len())
      .collect();

    let mut ready: BTreeSet<usize> = remaining
      .iter()
      .enumerate()
      .filter(|(_, count)| **count == 0)
      .map(|(index, _)| index)
      .collect();

    let mut sorted = Vec::with_capacity(self.order.len());

    while let Some(index) = ready.pop_first() {
      let name = &self.order[index];
      sorted.push(name.clone());

      for dependent in self.downstream(name) {
        let dependent_index = index_of[dependent.as_str()];
        remaining[dependent_index] -= 1;
        if remaining[dependent_index] == 0 {
          ready.insert(dependent_index);
        }
      }
    }

    if sorted.len() != self.order.len() {
      return Err(GraphError::CycleDetected {
        members: self.find_cycle(),
      });
    }

    Ok(sorted)
  }

  /// Locate one cycle and return its member names in path order.
  ///
  /// Only called after Kahn's algorithm left nodes unsorted, so a cycle
  /// exists.
  fn find_cycle(&self) -> Vec<String> {
    // DFS coloring: 0 = unvisited, 1 = on the current path, 2 = done.
    fn dfs<'a>(
      node: &'a str,
      adjacency: &'a HashMap<String, Vec<String>>,
      color: &mut HashMap<&'a str, u8>,
      path: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
      color.insert(node, 1);
      path.push(node);

      if let Some(neighbors) = adjacency.get(node) {
        for neighbor in neighbors {
          match color.get(neighbor.as_str()).copied().unwrap_or(0) {
            // Back edge: the cycle is the path suffix starting at `neighbor`.
            1 => {
              let start = path
                .iter()
                .position(|n| *n == neighbor.as_str())
                .unwrap_or(0);
              return Some(path[start..].iter().map(|n| (*n).to_string()).collect());
            }
            0 => {
              if let Some(cycle) = dfs(neighbor, adjacency, color, path) {
                return Some(cycle);
              }
            }
            _ => {}
          }
        }
      }

      path.pop();
      color.insert(node, 2);
      None
    }

    let mut color: HashMap<&str, u8> = HashMap::new();
    let mut path: Vec<&str> = Vec::new();

    for name in &self.order {
      if color.get(name.as_str()).copied().unwrap_or(0) == 0 {
        if let Some(cycle) = dfs(name, &self.adjacency, &mut color, &mut path) {
          return cycle;
        }
      }
    }

    Vec::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|n| (*n).to_string()).collect()
  }

  fn edges(list: &[(&str, &str)]) -> Vec<(String, String)> {
    list
      .iter()
      .map(|(from, to)| ((*from).to_string(), (*to).to_string()))
      .collect()
  }

  #[test]
  fn test_topological_order_respects_dependencies() {
    let graph = Graph::new(
      names(&["cmdr", "redis", "net"]),
      edges(&[("net", "redis"), ("net", "cmdr"), ("redis", "cmdr")]),
    );

    let order = graph.topological_order().unwrap();
    let position =
      |name: &str| order.iter().position(|n| n == name).unwrap();

    assert!(position("net") < position("redis"));
    assert!(position("redis") < position("cmdr"));
  }

  #[test]
  fn test_independent_nodes_keep_declaration_order() {
    let graph = Graph::new(names(&["c", "a", "b"]), Vec::new());

    assert_eq!(graph.topological_order().unwrap(), names(&["c", "a", "b"]));
    assert_eq!(graph.entry_points(), names(&["c", "a", "b"]).as_slice());
  }

  #[test]
  fn test_cycle_is_reported_with_members() {
    let graph = Graph::new(
      names(&["a", "b", "c"]),
      edges(&[("a", "b"), ("b", "c"), ("c", "b")]),
    );

    let err = graph.topological_order().unwrap_err();
    match err {
      GraphError::CycleDetected { members } => {
        assert!(members.contains(&"b".to_string()));
        assert!(members.contains(&"c".to_string()));
        assert!(!members.contains(&"a".to_string()));
      }
      other => panic!("expected cycle error, got {other:?}"),
    }
  }

  #[test]
  fn test_self_reference_is_a_cycle() {
    let graph = Graph::new(names(&["a"]), edges(&[("a", "a")]));

    let err = graph.topological_order().unwrap_err();
    assert_eq!(
      err,
      GraphError::CycleDetected {
        members: vec!["a".to_string()],
      }
    );
  }

  #[test]
  fn test_upstream_and_downstream() {
    let graph = Graph::new(
      names(&["net", "redis", "cmdr"]),
      edges(&[("net", "redis"), ("redis", "cmdr")]),
    );

    assert_eq!(graph.downstream("net"), &["redis".to_string()]);
    assert_eq!(graph.upstream("cmdr"), &["redis".to_string()]);
    assert_eq!(graph.entry_points(), &["net".to_string()]);
  }
}
