use std::ops::Range;

use rayon::prelude::*;

use crate::Error;

/// An immutable undirected simple graph in CSR form.
///
/// The neighbors of vertex `u` live at `targets[offsets[u]..offsets[u + 1]]`
/// and are strictly sorted ascending. Every undirected edge appears twice,
/// once per endpoint, so `edge_count` is `2 * |E|`.
///
/// Vertex ids are dense `u32` values; both the vertex and the directed edge
/// count must fit into `i32` because the clustering engine compares ids in
/// 32-bit signed SIMD lanes.
pub struct UndirectedCsrGraph {
    offsets: Box<[usize]>,
    targets: Box<[u32]>,
}

impl UndirectedCsrGraph {
    /// Builds a graph from raw CSR arrays, validating every invariant the
    /// clustering engine relies on: monotone offsets, strictly sorted
    /// neighbor lists without self loops, in-range target ids, and edge
    /// symmetry.
    pub fn from_csr(offsets: Vec<usize>, targets: Vec<u32>) -> Result<Self, Error> {
        if offsets.is_empty() {
            return Err(Error::malformed_csr("offsets array must not be empty"));
        }
        let node_count = offsets.len() - 1;
        if node_count > i32::MAX as usize || targets.len() > i32::MAX as usize {
            return Err(Error::GraphTooLarge);
        }
        if offsets[0] != 0 {
            return Err(Error::malformed_csr("offsets must start at zero"));
        }
        if offsets.windows(2).any(|w| w[0] > w[1]) {
            return Err(Error::malformed_csr("offsets must be non-decreasing"));
        }
        if offsets[node_count] != targets.len() {
            return Err(Error::malformed_csr(
                "last offset must equal the target count",
            ));
        }

        let graph = Self {
            offsets: offsets.into_boxed_slice(),
            targets: targets.into_boxed_slice(),
        };

        graph.validate_adjacency()?;

        Ok(graph)
    }

    fn validate_adjacency(&self) -> Result<(), Error> {
        let node_count = self.node_count() as u32;

        (0..node_count)
            .into_par_iter()
            .try_for_each(|u| {
                let neighbors = self.neighbors(u);
                if neighbors.windows(2).any(|w| w[0] >= w[1]) {
                    return Err(Error::malformed_csr(format!(
                        "neighbors of {u} are not strictly sorted"
                    )));
                }
                if let Some(&last) = neighbors.last() {
                    if last >= node_count {
                        return Err(Error::malformed_csr(format!(
                            "neighbor id {last} of {u} out of range"
                        )));
                    }
                }
                if neighbors.binary_search(&u).is_ok() {
                    return Err(Error::malformed_csr(format!("self loop at {u}")));
                }
                for &v in neighbors {
                    if self.neighbors(v).binary_search(&u).is_err() {
                        return Err(Error::malformed_csr(format!(
                            "edge ({u}, {v}) has no symmetric twin"
                        )));
                    }
                }
                Ok(())
            })
    }

    /// Number of vertices.
    pub fn node_count(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Number of directed edges, i.e. twice the undirected edge count.
    pub fn edge_count(&self) -> usize {
        self.targets.len()
    }

    pub fn degree(&self, node: u32) -> usize {
        self.offsets[node as usize + 1] - self.offsets[node as usize]
    }

    pub fn neighbors(&self, node: u32) -> &[u32] {
        &self.targets[self.neighbor_range(node)]
    }

    /// The edge index range of `node`'s adjacency slice.
    pub fn neighbor_range(&self, node: u32) -> Range<usize> {
        self.offsets[node as usize]..self.offsets[node as usize + 1]
    }

    /// The full target array; `targets()[e]` is the head of edge `e`.
    pub fn targets(&self) -> &[u32] {
        &self.targets
    }

    /// Edge index of `(source, target)`, found by binary search in the
    /// sorted adjacency slice of `source`. Returns `None` if the edge does
    /// not exist.
    pub fn reverse_edge_index(&self, source: u32, target: u32) -> Option<usize> {
        let range = self.neighbor_range(source);
        self.targets[range.clone()]
            .binary_search(&target)
            .ok()
            .map(|pos| range.start + pos)
    }
}
