//! The four-phase parallel clustering driver.
//!
//! The phases run strictly in order, each one a fork-join over ranges of
//! roughly equal summed degree:
//!
//! 1. *Prune* labels every edge with `SIMILAR`, `NOT_SIMILAR` or the
//!    common neighbor lower bound, using degrees only. Many vertices are
//!    classified as core or non-core right here.
//! 2. *Check core* settles the remaining vertices in two rounds. The first
//!    round only computes exact intersections for edges owned by the
//!    smaller endpoint; the second round picks up whatever is left.
//! 3. *Cluster core* unions ε-similar core pairs in a concurrent disjoint
//!    set, first along already-decided edges, then computing the undecided
//!    ones.
//! 4. *Cluster non-core* stamps each component with its minimum core id
//!    and attaches ε-similar non-core neighbors to their cores' clusters.
//!
//! Edge labels live in one `AtomicI32` slot per directed edge, accessed
//! with relaxed ordering. Concurrent evaluators of the same edge always
//! store the same value, so the races are benign; the fork-join boundary
//! between phases publishes everything else.

use std::cmp::max;
use std::ops::Range;
use std::sync::atomic::{AtomicI32, AtomicU32, AtomicU8, Ordering};
use std::time::Instant;

use log::info;
use num_format::{Locale, ToFormattedString};
use rayon::prelude::*;

use pscan_builder::UndirectedCsrGraph;

use crate::dss::DisjointSetStruct;
use crate::intersect::{IntersectKind, Intersector, Similarity};
use crate::partition::greedy_degree_partition;
use crate::similarity::{Epsilon, NOT_SIMILAR, SIMILAR};
use crate::Error;

const UNKNOWN: u8 = 0;
const CORE: u8 = 1;
const NON_CORE: u8 = 2;

/// Work-splitting thresholds for the individual phases.
///
/// A task covers a contiguous vertex (or core) range whose degrees sum up
/// to roughly the configured value. The defaults are tuned for graphs in
/// the hundreds-of-millions-of-edges range; they balance load without
/// drowning the pool in tiny tasks. None of them affect the result.
#[derive(Copy, Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "clap", derive(clap::Args))]
pub struct ScanConfig {
    /// Summed degree per task of the pruning phase.
    #[cfg_attr(feature = "clap", clap(long, default_value_t = ScanConfig::DEFAULT_PRUNE_TASK_DEGREES))]
    pub prune_task_degrees: usize,

    /// Summed degree per task of the first check-core round.
    #[cfg_attr(feature = "clap", clap(long, default_value_t = ScanConfig::DEFAULT_FIRST_BSP_TASK_DEGREES))]
    pub first_bsp_task_degrees: usize,

    /// Summed degree per task of the second check-core round.
    #[cfg_attr(feature = "clap", clap(long, default_value_t = ScanConfig::DEFAULT_SECOND_BSP_TASK_DEGREES))]
    pub second_bsp_task_degrees: usize,

    /// Summed degree per task of the two core clustering passes.
    #[cfg_attr(feature = "clap", clap(long, default_value_t = ScanConfig::DEFAULT_CLUSTER_CORE_TASK_DEGREES))]
    pub cluster_core_task_degrees: usize,

    /// Summed degree per task of the non-core attachment phase.
    #[cfg_attr(feature = "clap", clap(long, default_value_t = ScanConfig::DEFAULT_NONCORE_TASK_DEGREES))]
    pub noncore_task_degrees: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            prune_task_degrees: ScanConfig::DEFAULT_PRUNE_TASK_DEGREES,
            first_bsp_task_degrees: ScanConfig::DEFAULT_FIRST_BSP_TASK_DEGREES,
            second_bsp_task_degrees: ScanConfig::DEFAULT_SECOND_BSP_TASK_DEGREES,
            cluster_core_task_degrees: ScanConfig::DEFAULT_CLUSTER_CORE_TASK_DEGREES,
            noncore_task_degrees: ScanConfig::DEFAULT_NONCORE_TASK_DEGREES,
        }
    }
}

impl ScanConfig {
    pub const DEFAULT_PRUNE_TASK_DEGREES: usize = 64 * 1024;
    pub const DEFAULT_FIRST_BSP_TASK_DEGREES: usize = 32 * 1024;
    pub const DEFAULT_SECOND_BSP_TASK_DEGREES: usize = 64 * 1024;
    pub const DEFAULT_CLUSTER_CORE_TASK_DEGREES: usize = 128 * 1024;
    pub const DEFAULT_NONCORE_TASK_DEGREES: usize = 32 * 1024;
}

/// The clustering result.
///
/// Cores are partitioned into clusters; non-core members are attached to
/// every cluster holding a core they are ε-similar to, so the same vertex
/// can appear in several attachment pairs. A vertex occurring in neither
/// list is a hub or an outlier.
pub struct Clustering {
    core_clusters: Vec<(u32, u32)>,
    noncore_clusters: Vec<(u32, u32)>,
    core: Vec<bool>,
}

impl Clustering {
    /// One `(cluster_id, vertex)` pair per core, ascending by vertex. The
    /// cluster id is the minimum core id of the component.
    pub fn core_clusters(&self) -> &[(u32, u32)] {
        &self.core_clusters
    }

    /// `(cluster_id, vertex)` attachment pairs for non-core vertices.
    pub fn noncore_clusters(&self) -> &[(u32, u32)] {
        &self.noncore_clusters
    }

    pub fn is_core(&self, vertex: u32) -> bool {
        self.core[vertex as usize]
    }

    pub fn core_count(&self) -> usize {
        self.core_clusters.len()
    }
}

/// Runs structural clustering with the fastest intersection kernel
/// available on this machine.
pub fn scan(
    graph: &UndirectedCsrGraph,
    epsilon: Epsilon,
    mu: usize,
    config: ScanConfig,
) -> Result<Clustering, Error> {
    scan_with_kernel(graph, epsilon, mu, config, IntersectKind::detect())
}

/// Runs structural clustering with an explicitly chosen intersection
/// kernel.
pub fn scan_with_kernel(
    graph: &UndirectedCsrGraph,
    epsilon: Epsilon,
    mu: usize,
    config: ScanConfig,
    kernel: IntersectKind,
) -> Result<Clustering, Error> {
    if mu < 2 {
        return Err(Error::InvalidMu { mu });
    }

    let scanner = Scanner::new(graph, epsilon, mu, kernel);

    let start = Instant::now();
    scanner.prune(&config);
    info!("1st: prune execution time: {:?}", start.elapsed());

    let start = Instant::now();
    scanner.check_core_first_bsp(&config);
    info!(
        "2nd: check core first-phase bsp time: {:?}",
        start.elapsed()
    );

    let start = Instant::now();
    scanner.check_core_second_bsp(&config);
    info!(
        "2nd: check core second-phase bsp time: {:?}",
        start.elapsed()
    );

    let start = Instant::now();
    let cores = scanner.collect_cores();
    info!(
        "core size: {}",
        cores.len().to_formatted_string(&Locale::en)
    );
    let dss = DisjointSetStruct::new(graph.node_count());
    scanner.cluster_core_first_phase(&config, &cores, &dss);
    scanner.cluster_core_second_phase(&config, &cores, &dss);
    info!("3rd: core clustering time: {:?}", start.elapsed());

    let start = Instant::now();
    let cluster_dict = scanner.mark_cluster_min_id(&dss);
    info!("4th: marking cluster id time: {:?}", start.elapsed());

    let start = Instant::now();
    let noncore_clusters = scanner.cluster_noncore(&config, &cores, &dss, &cluster_dict);
    info!("4th: non-core clustering time: {:?}", start.elapsed());

    let core_clusters = cores
        .iter()
        .map(|&u| (cluster_dict[dss.find(u) as usize].load(Ordering::Relaxed), u))
        .collect();

    let core = scanner
        .status
        .iter()
        .map(|status| status.load(Ordering::Relaxed) == CORE)
        .collect();

    Ok(Clustering {
        core_clusters,
        noncore_clusters,
        core,
    })
}

struct Scanner<'g> {
    graph: &'g UndirectedCsrGraph,
    epsilon: Epsilon,
    mu: usize,
    intersector: Intersector,
    min_cn: Box<[AtomicI32]>,
    status: Box<[AtomicU8]>,
}

impl<'g> Scanner<'g> {
    fn new(graph: &'g UndirectedCsrGraph, epsilon: Epsilon, mu: usize, kernel: IntersectKind) -> Self {
        let min_cn = (0..graph.edge_count())
            .map(|_| AtomicI32::new(0))
            .collect();
        let status = (0..graph.node_count())
            .map(|_| AtomicU8::new(UNKNOWN))
            .collect();

        Self {
            graph,
            epsilon,
            mu,
            intersector: Intersector::new(kernel),
            min_cn,
            status,
        }
    }

    fn status(&self, u: u32) -> u8 {
        self.status[u as usize].load(Ordering::Relaxed)
    }

    fn set_status(&self, u: u32, status: u8) {
        self.status[u as usize].store(status, Ordering::Relaxed);
    }

    fn is_core(&self, u: u32) -> bool {
        self.status(u) == CORE
    }

    fn min_cn(&self, edge: usize) -> i32 {
        self.min_cn[edge].load(Ordering::Relaxed)
    }

    fn set_min_cn(&self, edge: usize, label: i32) {
        self.min_cn[edge].store(label, Ordering::Relaxed);
    }

    /// `|N[u]|`: the degree including the vertex itself.
    fn closed_degree(&self, u: u32) -> usize {
        self.graph.degree(u) + 1
    }

    /// Evaluates the edge exactly against its stored lower bound.
    fn eval_similarity(&self, u: u32, edge: usize) -> i32 {
        let v = self.graph.targets()[edge];
        let decision = self.intersector.intersect(
            self.graph.neighbors(u),
            self.graph.neighbors(v),
            self.min_cn(edge),
        );
        match decision {
            Similarity::Similar => SIMILAR,
            Similarity::NotSimilar => NOT_SIMILAR,
        }
    }

    /// Stores the decision on the edge and its symmetric twin.
    fn eval_and_label(&self, u: u32, v: u32, edge: usize) -> i32 {
        let label = self.eval_similarity(u, edge);
        self.set_min_cn(edge, label);
        let twin = self
            .graph
            .reverse_edge_index(v, u)
            .expect("csr is symmetric");
        self.set_min_cn(twin, label);
        label
    }

    // --- phase 1 ---

    fn prune(&self, config: &ScanConfig) {
        let partition = greedy_degree_partition(
            self.graph.node_count(),
            config.prune_task_degrees,
            |u| self.graph.degree(u as u32),
        );

        partition.into_par_iter().for_each(|range| {
            for u in range {
                self.prune_vertex(u as u32);
            }
        });
    }

    fn prune_vertex(&self, u: u32) {
        // the vertex is ε-similar to itself, which both counters include
        let mut sd = 1_usize;
        let mut ed = self.closed_degree(u);

        for edge in self.graph.neighbor_range(u) {
            let v = self.graph.targets()[edge];
            // the bound formula works on the raw adjacency degrees
            let du = self.graph.degree(u);
            let dv = self.graph.degree(v);
            let (a, b) = if du <= dv { (du, dv) } else { (dv, du) };

            if self.epsilon.rules_out(a, b) {
                self.set_min_cn(edge, NOT_SIMILAR);
                ed -= 1;
            } else {
                let c = self.epsilon.cn_lower_bound(a, b);
                if c <= 2 {
                    self.set_min_cn(edge, SIMILAR);
                    sd += 1;
                } else {
                    self.set_min_cn(edge, c);
                }
            }
        }

        if sd >= self.mu {
            self.set_status(u, CORE);
        } else if ed < self.mu {
            self.set_status(u, NON_CORE);
        }
    }

    // --- phase 2 ---

    fn check_core_first_bsp(&self, config: &ScanConfig) {
        let partition = greedy_degree_partition(
            self.graph.node_count(),
            config.first_bsp_task_degrees,
            |u| {
                let u = u as u32;
                if self.status(u) == UNKNOWN {
                    self.graph.degree(u)
                } else {
                    0
                }
            },
        );

        partition.into_par_iter().for_each(|range| {
            for u in range {
                self.check_core_first_bsp_vertex(u as u32);
            }
        });
    }

    fn check_core_first_bsp_vertex(&self, u: u32) {
        if self.status(u) != UNKNOWN {
            return;
        }

        let mut sd = 1_usize;
        let mut ed = self.closed_degree(u);

        // first sweep: consume labels other tasks have already produced
        for edge in self.graph.neighbor_range(u) {
            match self.min_cn(edge) {
                SIMILAR => {
                    sd += 1;
                    if sd >= self.mu {
                        self.set_status(u, CORE);
                        return;
                    }
                }
                NOT_SIMILAR => {
                    ed -= 1;
                    if ed < self.mu {
                        self.set_status(u, NON_CORE);
                        return;
                    }
                }
                _ => {}
            }
        }

        // second sweep: evaluate undecided edges owned by this endpoint
        for edge in self.graph.neighbor_range(u) {
            let v = self.graph.targets()[edge];
            if u <= v && self.min_cn(edge) > 0 {
                if self.eval_and_label(u, v, edge) == SIMILAR {
                    sd += 1;
                    if sd >= self.mu {
                        self.set_status(u, CORE);
                        return;
                    }
                } else {
                    ed -= 1;
                    if ed < self.mu {
                        self.set_status(u, NON_CORE);
                        return;
                    }
                }
            }
        }
    }

    fn check_core_second_bsp(&self, config: &ScanConfig) {
        let partition = greedy_degree_partition(
            self.graph.node_count(),
            config.second_bsp_task_degrees,
            |u| {
                let u = u as u32;
                if self.status(u) == UNKNOWN {
                    self.graph.degree(u)
                } else {
                    0
                }
            },
        );

        partition.into_par_iter().for_each(|range| {
            for u in range {
                self.check_core_second_bsp_vertex(u as u32);
            }
        });
    }

    fn check_core_second_bsp_vertex(&self, u: u32) {
        if self.status(u) != UNKNOWN {
            return;
        }

        let mut sd = 1_usize;
        let mut ed = self.closed_degree(u);

        for edge in self.graph.neighbor_range(u) {
            let label = self.min_cn(edge);
            if label == SIMILAR {
                sd += 1;
                if sd >= self.mu {
                    self.set_status(u, CORE);
                    return;
                }
            }
            if label == NOT_SIMILAR {
                ed -= 1;
                // another task may still prove this vertex a core, so the
                // status deliberately stays UNKNOWN here
                if ed < self.mu {
                    return;
                }
            }
        }

        for edge in self.graph.neighbor_range(u) {
            let v = self.graph.targets()[edge];
            if self.min_cn(edge) > 0 {
                if self.eval_and_label(u, v, edge) == SIMILAR {
                    sd += 1;
                    if sd >= self.mu {
                        self.set_status(u, CORE);
                        return;
                    }
                } else {
                    ed -= 1;
                    if ed < self.mu {
                        return;
                    }
                }
            }
        }
    }

    // --- phase 3 ---

    fn collect_cores(&self) -> Vec<u32> {
        (0..self.graph.node_count() as u32)
            .filter(|&u| self.is_core(u))
            .collect()
    }

    fn cluster_core_first_phase(&self, config: &ScanConfig, cores: &[u32], dss: &DisjointSetStruct) {
        let partition = greedy_degree_partition(cores.len(), config.cluster_core_task_degrees, |i| {
            self.graph.degree(cores[i])
        });

        partition.into_par_iter().for_each(|range| {
            for index in range {
                self.cluster_core_first_vertex(cores[index], dss);
            }
        });
    }

    fn cluster_core_first_vertex(&self, u: u32, dss: &DisjointSetStruct) {
        for edge in self.graph.neighbor_range(u) {
            let v = self.graph.targets()[edge];
            if u < v
                && self.is_core(v)
                && !dss.is_same_set(u, v)
                && self.min_cn(edge) == SIMILAR
            {
                dss.union(u, v);
            }
        }
    }

    fn cluster_core_second_phase(&self, config: &ScanConfig, cores: &[u32], dss: &DisjointSetStruct) {
        let partition = greedy_degree_partition(cores.len(), config.cluster_core_task_degrees, |i| {
            self.graph.degree(cores[i])
        });

        partition.into_par_iter().for_each(|range| {
            for index in range {
                self.cluster_core_second_vertex(cores[index], dss);
            }
        });
    }

    fn cluster_core_second_vertex(&self, u: u32, dss: &DisjointSetStruct) {
        for edge in self.graph.neighbor_range(u) {
            let v = self.graph.targets()[edge];
            if u < v
                && self.is_core(v)
                && !dss.is_same_set(u, v)
                && self.min_cn(edge) > 0
                && self.eval_and_label(u, v, edge) == SIMILAR
            {
                dss.union(u, v);
            }
        }
    }

    // --- phase 4 ---

    fn mark_cluster_min_id(&self, dss: &DisjointSetStruct) -> Vec<AtomicU32> {
        let node_count = self.graph.node_count();
        let cluster_dict: Vec<AtomicU32> = (0..node_count)
            .map(|_| AtomicU32::new(node_count as u32))
            .collect();

        let step = max(1, node_count / rayon::current_num_threads());
        let slabs: Vec<Range<usize>> = (0..node_count)
            .step_by(step)
            .map(|start| start..(start + step).min(node_count))
            .collect();

        slabs.into_par_iter().for_each(|range| {
            for u in range {
                let u = u as u32;
                if self.is_core(u) {
                    let root = dss.find(u);
                    cluster_dict[root as usize].fetch_min(u, Ordering::Relaxed);
                }
            }
        });

        cluster_dict
    }

    fn cluster_noncore(
        &self,
        config: &ScanConfig,
        cores: &[u32],
        dss: &DisjointSetStruct,
        cluster_dict: &[AtomicU32],
    ) -> Vec<(u32, u32)> {
        let partition = greedy_degree_partition(cores.len(), config.noncore_task_degrees, |i| {
            self.graph.degree(cores[i])
        });

        let buffers: Vec<Vec<(u32, u32)>> = partition
            .into_par_iter()
            .map(|range| {
                let mut attachments = Vec::new();
                for index in range {
                    self.cluster_noncore_vertex(cores[index], dss, cluster_dict, &mut attachments);
                }
                attachments
            })
            .collect();

        let mut noncore_clusters = Vec::with_capacity(buffers.iter().map(Vec::len).sum());
        for buffer in buffers {
            noncore_clusters.extend(buffer);
        }
        noncore_clusters
    }

    fn cluster_noncore_vertex(
        &self,
        u: u32,
        dss: &DisjointSetStruct,
        cluster_dict: &[AtomicU32],
        attachments: &mut Vec<(u32, u32)>,
    ) {
        for edge in self.graph.neighbor_range(u) {
            let v = self.graph.targets()[edge];
            if !self.is_core(v) {
                let mut label = self.min_cn(edge);
                if label > 0 {
                    label = self.eval_and_label(u, v, edge);
                }
                if label == SIMILAR {
                    let root = dss.find(u);
                    attachments.push((cluster_dict[root as usize].load(Ordering::Relaxed), v));
                }
            }
        }
    }
}
