use rayon::prelude::*;

use crate::graph::UndirectedCsrGraph;
use crate::Error;

/// Creates an [`UndirectedCsrGraph`] from a list of edges.
///
/// Both edge directions are materialized, self loops are dropped and
/// duplicate edges are deduplicated, so the result is always a simple
/// symmetric CSR no matter how messy the input list is.
///
/// # Example
///
/// ```
/// use pscan_builder::prelude::*;
///
/// let graph: UndirectedCsrGraph = GraphBuilder::new()
///     .edges(vec![(0, 1), (1, 0), (1, 1), (1, 2)])
///     .build()
///     .unwrap();
///
/// assert_eq!(graph.node_count(), 3);
/// assert_eq!(graph.neighbors(1), &[0, 2]);
/// ```
pub struct GraphBuilder {
    edges: Vec<(u32, u32)>,
    node_count: Option<usize>,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self {
            edges: Vec::new(),
            node_count: None,
        }
    }

    pub fn edges<I>(mut self, edges: I) -> Self
    where
        I: IntoIterator<Item = (u32, u32)>,
    {
        self.edges.extend(edges);
        self
    }

    /// Sets an explicit vertex count. Without it, the count is the highest
    /// vertex id in the edge list plus one, which cannot represent trailing
    /// isolated vertices.
    pub fn node_count(mut self, node_count: usize) -> Self {
        self.node_count = Some(node_count);
        self
    }

    pub fn build(self) -> Result<UndirectedCsrGraph, Error> {
        let mut directed = Vec::with_capacity(self.edges.len() * 2);
        for &(u, v) in &self.edges {
            if u == v {
                continue;
            }
            directed.push((u, v));
            directed.push((v, u));
        }

        directed.par_sort_unstable();
        directed.dedup();

        let max_id = directed.iter().map(|&(u, _)| u).max();
        let node_count = match (self.node_count, max_id) {
            (Some(n), Some(max)) if n <= max as usize => {
                return Err(Error::invalid_input(format!(
                    "node count {n} too small for vertex id {max}"
                )))
            }
            (Some(n), _) => n,
            (None, Some(max)) => max as usize + 1,
            (None, None) => 0,
        };

        let mut offsets = vec![0_usize; node_count + 1];
        for &(u, _) in &directed {
            offsets[u as usize + 1] += 1;
        }
        for i in 0..node_count {
            offsets[i + 1] += offsets[i];
        }

        let targets = directed.into_iter().map(|(_, v)| v).collect();

        UndirectedCsrGraph::from_csr(offsets, targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symmetrizes_and_dedups() {
        let graph = GraphBuilder::new()
            .edges(vec![(0, 1), (1, 0), (0, 1), (2, 0)])
            .build()
            .unwrap();

        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 4);
        assert_eq!(graph.neighbors(0), &[1, 2]);
        assert_eq!(graph.neighbors(1), &[0]);
        assert_eq!(graph.neighbors(2), &[0]);
    }

    #[test]
    fn drops_self_loops() {
        let graph = GraphBuilder::new()
            .edges(vec![(0, 0), (0, 1)])
            .build()
            .unwrap();

        assert_eq!(graph.neighbors(0), &[1]);
    }

    #[test]
    fn explicit_node_count_keeps_isolated_vertices() {
        let graph = GraphBuilder::new().node_count(3).build().unwrap();

        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(graph.degree(2), 0);
    }

    #[test]
    fn rejects_too_small_node_count() {
        let result = GraphBuilder::new().node_count(2).edges(vec![(0, 2)]).build();
        assert!(matches!(result, Err(Error::InvalidInput { .. })));
    }

    #[test]
    fn empty_builder() {
        let graph = GraphBuilder::new().build().unwrap();
        assert_eq!(graph.node_count(), 0);
        assert_eq!(graph.edge_count(), 0);
    }
}
