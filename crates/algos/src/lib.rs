//! A parallel structural graph clustering (SCAN) engine.
//!
//! Given an undirected simple graph and two parameters `ε ∈ (0, 1]` and
//! `μ ≥ 2`, structural clustering partitions the vertices into clusters of
//! structurally similar vertices plus hubs and outliers. Two adjacent
//! vertices are ε-similar when their closed neighborhoods overlap enough:
//! `|N[u] ∩ N[v]| / √(|N[u]|·|N[v]|) ≥ ε`. A vertex with at least `μ`
//! ε-similar closed neighbors (itself included) is a core; clusters are
//! connected components of ε-similar core pairs, extended by the non-core
//! vertices attached to their cores.
//!
//! The implementation follows the pruning-based pSCAN algorithm [1] and its
//! parallelization [2]: a degree-based pruning pass labels as many edges as
//! possible without touching adjacency lists, two check-core rounds settle
//! the remaining vertices with as few exact set intersections as possible,
//! and clustering runs on a concurrent union-find [3]. The exact
//! intersection kernel is vectorized, see [`intersect`].
//!
//! [1] Lijun Chang, Wei Li, Xuemin Lin, Lu Qin, Wenjie Zhang:
//! "pSCAN: Fast and Exact Structural Graph Clustering", ICDE 2016
//! [2] Yulin Che, Shixuan Sun, Qiong Luo:
//! "Parallelizing Pruning-based Graph Structural Clustering", ICPP 2018
//! [3] Richard J. Anderson, Heather Woll:
//! "Wait-free Parallel Algorithms for the Union-Find Problem", STOC 1991

pub mod dss;
pub mod intersect;
pub mod partition;
pub mod prelude;
pub mod scan;
pub mod similarity;

pub use crate::scan::{scan, scan_with_kernel, Clustering, ScanConfig};
pub use crate::similarity::Epsilon;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("epsilon must be a fraction `a/b` with 0 < a <= b, got `{input}`")]
    InvalidEpsilon { input: String },
    #[error("mu must be at least 2, got {mu}")]
    InvalidMu { mu: usize },
}
