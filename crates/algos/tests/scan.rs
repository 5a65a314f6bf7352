use std::collections::BTreeSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use pscan::prelude::*;

fn run(graph: &UndirectedCsrGraph, eps: &str, mu: usize) -> Clustering {
    let epsilon: Epsilon = eps.parse().unwrap();
    scan(graph, epsilon, mu, ScanConfig::default()).unwrap()
}

fn core_set(clustering: &Clustering) -> BTreeSet<(u32, u32)> {
    clustering.core_clusters().iter().copied().collect()
}

fn noncore_set(clustering: &Clustering) -> BTreeSet<(u32, u32)> {
    clustering.noncore_clusters().iter().copied().collect()
}

// ---------------------------------------------------------------------
// a sequential reference implementation: exact similarity for every
// edge, no pruning, no parallelism
// ---------------------------------------------------------------------

struct Reference {
    core_pairs: BTreeSet<(u32, u32)>,
    noncore_pairs: BTreeSet<(u32, u32)>,
    core: Vec<bool>,
}

fn closed_neighborhood(graph: &UndirectedCsrGraph, u: u32) -> Vec<u32> {
    let mut closed = graph.neighbors(u).to_vec();
    let position = closed.partition_point(|&w| w < u);
    closed.insert(position, u);
    closed
}

fn intersection_size(lu: &[u32], lv: &[u32]) -> usize {
    let mut count = 0;
    let mut j = 0;
    for &x in lu {
        while j < lv.len() && lv[j] < x {
            j += 1;
        }
        if j < lv.len() && lv[j] == x {
            count += 1;
        }
    }
    count
}

fn reference_scan(graph: &UndirectedCsrGraph, eps: (u64, u64), mu: usize) -> Reference {
    let (eps_a, eps_b) = eps;
    let n = graph.node_count() as u32;

    // similarity as the engine defines it: the degree ratio alone can rule
    // a pair out, otherwise the exact common closed neighbor count is
    // compared against the bound over the adjacency degrees
    let is_similar = |u: u32, v: u32| {
        let du = graph.degree(u) as u128;
        let dv = graph.degree(v) as u128;
        let (a, b) = if du <= dv { (du, dv) } else { (dv, du) };
        if a * u128::from(eps_b * eps_b) < b * u128::from(eps_a * eps_a) {
            return false;
        }
        let nu = closed_neighborhood(graph, u);
        let nv = closed_neighborhood(graph, v);
        let cn = intersection_size(&nu, &nv) as u128;
        cn * cn * u128::from(eps_b * eps_b) >= a * b * u128::from(eps_a * eps_a)
    };

    let mut core = vec![false; n as usize];
    for u in 0..n {
        let similar_neighbors = 1 + graph
            .neighbors(u)
            .iter()
            .filter(|&&v| is_similar(u, v))
            .count();
        core[u as usize] = similar_neighbors >= mu;
    }

    let mut parent: Vec<u32> = (0..n).collect();
    fn find(parent: &mut [u32], mut u: u32) -> u32 {
        while parent[u as usize] != u {
            parent[u as usize] = parent[parent[u as usize] as usize];
            u = parent[u as usize];
        }
        u
    }

    for u in 0..n {
        if !core[u as usize] {
            continue;
        }
        for &v in graph.neighbors(u) {
            if u < v && core[v as usize] && is_similar(u, v) {
                let ru = find(&mut parent, u);
                let rv = find(&mut parent, v);
                if ru != rv {
                    parent[ru.max(rv) as usize] = ru.min(rv);
                }
            }
        }
    }

    let mut min_id = vec![u32::MAX; n as usize];
    for u in 0..n {
        if core[u as usize] {
            let root = find(&mut parent, u);
            min_id[root as usize] = min_id[root as usize].min(u);
        }
    }

    let mut core_pairs = BTreeSet::new();
    let mut noncore_pairs = BTreeSet::new();
    for u in 0..n {
        if !core[u as usize] {
            continue;
        }
        let cluster = min_id[find(&mut parent, u) as usize];
        core_pairs.insert((cluster, u));
        for &v in graph.neighbors(u) {
            if !core[v as usize] && is_similar(u, v) {
                noncore_pairs.insert((cluster, v));
            }
        }
    }

    Reference {
        core_pairs,
        noncore_pairs,
        core,
    }
}

fn assert_matches_reference(graph: &UndirectedCsrGraph, eps: &str, eps_frac: (u64, u64), mu: usize) {
    let clustering = run(graph, eps, mu);
    let reference = reference_scan(graph, eps_frac, mu);

    for u in 0..graph.node_count() as u32 {
        assert_eq!(
            clustering.is_core(u),
            reference.core[u as usize],
            "core status of vertex {u} diverges for eps={eps}, mu={mu}"
        );
    }
    assert_eq!(
        core_set(&clustering),
        reference.core_pairs,
        "core clusters diverge for eps={eps}, mu={mu}"
    );
    assert_eq!(
        noncore_set(&clustering),
        reference.noncore_pairs,
        "non-core attachments diverge for eps={eps}, mu={mu}"
    );
}

fn random_graph(rng: &mut StdRng, n: u32, edge_percent: u32) -> UndirectedCsrGraph {
    let mut edges = Vec::new();
    for u in 0..n {
        for v in u + 1..n {
            if rng.gen_range(0..100) < edge_percent {
                edges.push((u, v));
            }
        }
    }
    GraphBuilder::new()
        .node_count(n as usize)
        .edges(edges)
        .build()
        .unwrap()
}

// ---------------------------------------------------------------------
// hand-checked scenarios
// ---------------------------------------------------------------------

#[test]
fn triangle_is_one_cluster() {
    let graph = GraphBuilder::new()
        .edges(vec![(0, 1), (0, 2), (1, 2)])
        .build()
        .unwrap();

    let clustering = run(&graph, "1/1", 2);

    assert_eq!(
        core_set(&clustering),
        BTreeSet::from([(0, 0), (0, 1), (0, 2)])
    );
    assert!(clustering.noncore_clusters().is_empty());
}

#[test]
fn path_of_four_with_loose_epsilon() {
    let graph = GraphBuilder::new()
        .edges(vec![(0, 1), (1, 2), (2, 3)])
        .build()
        .unwrap();

    // every adjacent pair is similar at ε = 1/2, so the whole path is one
    // cluster of cores labeled by vertex 0
    let clustering = run(&graph, "1/2", 2);

    assert_eq!(
        core_set(&clustering),
        BTreeSet::from([(0, 0), (0, 1), (0, 2), (0, 3)])
    );
    assert!(clustering.noncore_clusters().is_empty());

    assert_matches_reference(&graph, "1/2", (1, 2), 2);
}

fn linked_triangles() -> UndirectedCsrGraph {
    GraphBuilder::new()
        .edges(vec![(0, 1), (0, 2), (1, 2), (3, 4), (3, 5), (4, 5), (2, 3)])
        .build()
        .unwrap()
}

#[test]
fn linked_triangles_strict() {
    let graph = linked_triangles();

    // at ε = 1/1 the bridge lifts its endpoints' degrees above their
    // neighbors', which rules those edges out, and the remaining triangle
    // vertices only reach two similar closed neighbors, so μ = 3 leaves
    // no cores at all
    let clustering = run(&graph, "1/1", 3);

    assert!(clustering.core_clusters().is_empty());
    assert!(clustering.noncore_clusters().is_empty());

    assert_matches_reference(&graph, "1/1", (1, 1), 3);
}

#[test]
fn linked_triangles_split_into_two_clusters() {
    let graph = linked_triangles();

    // ε = 4/5 keeps the in-triangle edges similar but not the bridge,
    // whose endpoints share no third vertex. Two clusters, labeled by
    // their minimum ids.
    let clustering = run(&graph, "4/5", 2);

    assert_eq!(
        core_set(&clustering),
        BTreeSet::from([(0, 0), (0, 1), (0, 2), (3, 3), (3, 4), (3, 5)])
    );
    assert!(clustering.noncore_clusters().is_empty());

    assert_matches_reference(&graph, "4/5", (4, 5), 2);
}

fn star() -> UndirectedCsrGraph {
    GraphBuilder::new()
        .edges(vec![(0, 1), (0, 2), (0, 3), (0, 4)])
        .build()
        .unwrap()
}

#[test]
fn star_with_small_mu_is_all_core() {
    let graph = star();

    // every hub-leaf edge is similar at ε = 1/2, so at μ = 2 even the
    // leaves are cores
    let clustering = run(&graph, "1/2", 2);

    assert_eq!(
        core_set(&clustering),
        BTreeSet::from([(0, 0), (0, 1), (0, 2), (0, 3), (0, 4)])
    );
    assert!(clustering.noncore_clusters().is_empty());

    assert_matches_reference(&graph, "1/2", (1, 2), 2);
}

#[test]
fn star_with_larger_mu_attaches_leaves() {
    let graph = star();

    // only the hub reaches μ = 3 similar closed neighbors; the leaves are
    // attached to its cluster as non-core members
    let clustering = run(&graph, "1/2", 3);

    assert_eq!(core_set(&clustering), BTreeSet::from([(0, 0)]));
    assert_eq!(
        noncore_set(&clustering),
        BTreeSet::from([(0, 1), (0, 2), (0, 3), (0, 4)])
    );
    assert!(clustering.is_core(0));
    assert!(!clustering.is_core(1));

    assert_matches_reference(&graph, "1/2", (1, 2), 3);
}

#[test]
fn degree_bound_decides_skewed_pairs() {
    // vertices 0 and 1 share no neighbors besides each other, so their
    // exact common closed neighbor count is the bare minimum of 2. With
    // degrees 2 and 8 at ε = 1/2 the pruning bound is also 2, so the edge
    // is similar purely by the degree bound and no intersection may flip
    // it. Inflating the degrees by one in the bound formula would demand
    // three common neighbors and wrongly declare the pair dissimilar.
    let mut edges = vec![(0, 1), (0, 2)];
    for leaf in 3..10 {
        edges.push((1, leaf));
    }
    let graph = GraphBuilder::new().edges(edges).build().unwrap();

    let clustering = run(&graph, "1/2", 2);

    assert!(clustering.is_core(1));
    assert_eq!(
        core_set(&clustering),
        BTreeSet::from([(0, 0), (0, 1), (0, 2)])
    );
    // the leaves hanging off vertex 1 are ruled out by the degree ratio
    assert!(clustering.noncore_clusters().is_empty());

    assert_matches_reference(&graph, "1/2", (1, 2), 2);
}

#[test]
fn disconnected_singletons_are_outliers() {
    let graph = GraphBuilder::new().node_count(3).build().unwrap();

    let clustering = run(&graph, "1/2", 2);

    assert!(clustering.core_clusters().is_empty());
    assert!(clustering.noncore_clusters().is_empty());
    assert_eq!(clustering.core_count(), 0);
}

#[test]
fn complete_graph_is_one_cluster() {
    let mut edges = Vec::new();
    for u in 0..8 {
        for v in u + 1..8 {
            edges.push((u, v));
        }
    }
    let graph = GraphBuilder::new().edges(edges).build().unwrap();

    // in K8 every pair shares all eight closed neighbors
    let clustering = run(&graph, "1/1", 8);

    let expected: BTreeSet<(u32, u32)> = (0..8).map(|u| (0, u)).collect();
    assert_eq!(core_set(&clustering), expected);
    assert!(clustering.noncore_clusters().is_empty());

    assert_matches_reference(&graph, "1/1", (1, 1), 8);
}

// ---------------------------------------------------------------------
// laws
// ---------------------------------------------------------------------

#[test]
fn matches_reference_on_random_graphs() {
    let mut rng = StdRng::seed_from_u64(0xC0FFEE);

    let parameters = [
        ("1/3", (1_u64, 3_u64)),
        ("1/2", (1, 2)),
        ("3/5", (3, 5)),
        ("2/3", (2, 3)),
        ("1/1", (1, 1)),
    ];

    for round in 0..24 {
        let n = rng.gen_range(2..60);
        let edge_percent = [5, 15, 40, 80][round % 4];
        let graph = random_graph(&mut rng, n, edge_percent);

        let (eps, eps_frac) = parameters[round % parameters.len()];
        for mu in [2, 3, 5] {
            assert_matches_reference(&graph, eps, eps_frac, mu);
        }
    }
}

#[test]
fn result_is_deterministic_across_pool_sizes() {
    let mut rng = StdRng::seed_from_u64(7);
    let graph = random_graph(&mut rng, 120, 10);
    let epsilon: Epsilon = "3/5".parse().unwrap();

    let baseline = scan(&graph, epsilon, 3, ScanConfig::default()).unwrap();

    for threads in [1, 2, 4] {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .unwrap();
        let clustering = pool
            .install(|| scan(&graph, epsilon, 3, ScanConfig::default()))
            .unwrap();

        assert_eq!(
            clustering.core_clusters(),
            baseline.core_clusters(),
            "core clusters diverge with {threads} threads"
        );
        assert_eq!(
            noncore_set(&clustering),
            noncore_set(&baseline),
            "non-core attachments diverge with {threads} threads"
        );
    }
}

#[test]
fn tiny_task_thresholds_do_not_change_the_result() {
    let mut rng = StdRng::seed_from_u64(99);
    let graph = random_graph(&mut rng, 80, 20);
    let epsilon: Epsilon = "1/2".parse().unwrap();

    let baseline = scan(&graph, epsilon, 3, ScanConfig::default()).unwrap();

    // one-ish vertex per task: maximum scheduling churn
    let config = ScanConfig {
        prune_task_degrees: 1,
        first_bsp_task_degrees: 1,
        second_bsp_task_degrees: 1,
        cluster_core_task_degrees: 1,
        noncore_task_degrees: 1,
    };
    let clustering = scan(&graph, epsilon, 3, config).unwrap();

    assert_eq!(core_set(&clustering), core_set(&baseline));
    assert_eq!(noncore_set(&clustering), noncore_set(&baseline));
}

#[test]
fn all_kernels_agree_end_to_end() {
    let mut rng = StdRng::seed_from_u64(4711);
    let graph = random_graph(&mut rng, 100, 25);
    let epsilon: Epsilon = "2/3".parse().unwrap();

    let baseline =
        scan_with_kernel(&graph, epsilon, 3, ScanConfig::default(), IntersectKind::Scalar).unwrap();

    for kind in [
        IntersectKind::Sse,
        IntersectKind::Avx2,
        IntersectKind::Avx2Merge,
    ] {
        if !kind.is_available() {
            continue;
        }
        let clustering = scan_with_kernel(&graph, epsilon, 3, ScanConfig::default(), kind).unwrap();
        assert_eq!(core_set(&clustering), core_set(&baseline));
        assert_eq!(noncore_set(&clustering), noncore_set(&baseline));
    }
}

#[test]
fn raising_epsilon_only_shrinks_cores() {
    let mut rng = StdRng::seed_from_u64(21);
    let graph = random_graph(&mut rng, 70, 30);

    let loose = run(&graph, "1/2", 3);
    let tight = run(&graph, "4/5", 3);

    for u in 0..graph.node_count() as u32 {
        if tight.is_core(u) {
            assert!(
                loose.is_core(u),
                "vertex {u} is core at ε=4/5 but not at ε=1/2"
            );
        }
    }
    assert!(tight.core_count() <= loose.core_count());
}

#[test]
fn raising_mu_only_shrinks_cores() {
    let mut rng = StdRng::seed_from_u64(22);
    let graph = random_graph(&mut rng, 70, 30);

    let previous = run(&graph, "1/2", 2);
    for mu in 3..8 {
        let current = run(&graph, "1/2", mu);
        for u in 0..graph.node_count() as u32 {
            if current.is_core(u) {
                assert!(
                    previous.is_core(u),
                    "vertex {u} became core when raising mu to {mu}"
                );
            }
        }
    }
}

#[test]
fn cluster_ids_are_component_minima() {
    let mut rng = StdRng::seed_from_u64(5);
    let graph = random_graph(&mut rng, 90, 15);

    let clustering = run(&graph, "1/2", 3);

    for &(cluster, u) in clustering.core_clusters() {
        assert!(cluster <= u);
        // the labeling core is part of its own cluster
        assert!(clustering.core_clusters().contains(&(cluster, cluster)));
    }
}
