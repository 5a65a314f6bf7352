use ahash::{AHashMap, AHashSet};
use log::info;

use pscan::prelude::*;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;
use std::time::Instant;

#[derive(Debug)]
enum FileFormat {
    Binary,
    EdgeList,
}

impl FromStr for FileFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "binary" => Ok(Self::Binary),
            "edgelist" => Ok(Self::EdgeList),
            _ => Err(format!("unsupported file format {}", s)),
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stdout)
        .init();

    let args = cli::create()?;

    let threads = args.threads.unwrap_or_else(num_cpus::get);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()?;

    info!(
        "Reading {:?} graph from {:?} using {} workers",
        args.format, args.path, threads
    );

    let graph = match args.format {
        FileFormat::Binary => BinaryInput::load(&args.path)?,
        FileFormat::EdgeList => EdgeListInput::load(&args.path)?,
    };
    info!(
        "Loaded graph with {} vertices and {} directed edges",
        graph.node_count(),
        graph.edge_count()
    );

    let epsilon: Epsilon = args.eps.parse()?;
    let kernel = match args.kernel.as_deref() {
        None | Some("auto") => IntersectKind::detect(),
        Some(kind) => kind.parse()?,
    };
    info!("Intersection kernel: {kernel:?}");

    let start = Instant::now();
    let clustering = scan_with_kernel(&graph, epsilon, args.mu, args.config, kernel)?;
    info!("Total clustering time: {:?}", start.elapsed());

    let classification = classify(&graph, &clustering);
    info!(
        "Found {} clusters, {} cores, {} hubs and {} outliers",
        classification.cluster_count,
        clustering.core_count(),
        classification.hubs.len(),
        classification.outliers.len()
    );

    if let Some(path) = args.output {
        write_result(&path, &clustering, &classification)?;
        info!("Wrote result to {:?}", path);
    }

    Ok(())
}

struct Classification {
    cluster_count: usize,
    hubs: Vec<u32>,
    outliers: Vec<u32>,
}

/// Splits the vertices outside every cluster into hubs and outliers: a hub
/// neighbors cores of at least two different clusters, an outlier does not.
fn classify(graph: &UndirectedCsrGraph, clustering: &Clustering) -> Classification {
    let mut clustered = vec![false; graph.node_count()];
    let mut cluster_ids = AHashSet::new();
    let mut core_cluster = AHashMap::new();

    for &(cluster, u) in clustering.core_clusters() {
        clustered[u as usize] = true;
        cluster_ids.insert(cluster);
        core_cluster.insert(u, cluster);
    }
    for &(cluster, v) in clustering.noncore_clusters() {
        clustered[v as usize] = true;
        cluster_ids.insert(cluster);
    }

    let mut hubs = Vec::new();
    let mut outliers = Vec::new();
    let mut touched = AHashSet::new();

    for u in 0..graph.node_count() as u32 {
        if clustered[u as usize] {
            continue;
        }
        touched.clear();
        for v in graph.neighbors(u) {
            if let Some(&cluster) = core_cluster.get(v) {
                touched.insert(cluster);
            }
        }
        if touched.len() >= 2 {
            hubs.push(u);
        } else {
            outliers.push(u);
        }
    }

    Classification {
        cluster_count: cluster_ids.len(),
        hubs,
        outliers,
    }
}

fn write_result(
    path: &Path,
    clustering: &Clustering,
    classification: &Classification,
) -> std::io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);

    for &(cluster, u) in clustering.core_clusters() {
        writeln!(writer, "core {u} {cluster}")?;
    }
    for &(cluster, v) in clustering.noncore_clusters() {
        writeln!(writer, "noncore {v} {cluster}")?;
    }
    for &u in &classification.hubs {
        writeln!(writer, "hub {u}")?;
    }
    for &u in &classification.outliers {
        writeln!(writer, "outlier {u}")?;
    }

    writer.flush()
}

mod cli {
    use pico_args::Arguments;
    use pscan::ScanConfig;
    use std::{convert::Infallible, ffi::OsStr, path::PathBuf};

    #[derive(Debug)]
    pub(crate) struct AppArgs {
        pub(crate) path: PathBuf,
        pub(crate) format: crate::FileFormat,
        pub(crate) eps: String,
        pub(crate) mu: usize,
        pub(crate) threads: Option<usize>,
        pub(crate) kernel: Option<String>,
        pub(crate) output: Option<PathBuf>,
        pub(crate) config: ScanConfig,
    }

    pub(crate) fn create() -> Result<AppArgs, Box<dyn std::error::Error>> {
        let mut pargs = Arguments::from_env();

        fn as_path_buf(arg: &OsStr) -> Result<PathBuf, Infallible> {
            Ok(arg.into())
        }

        let default_config = ScanConfig::default();

        let config = ScanConfig {
            prune_task_degrees: pargs
                .opt_value_from_str("--prune-task-degrees")?
                .unwrap_or(default_config.prune_task_degrees),
            first_bsp_task_degrees: pargs
                .opt_value_from_str("--first-bsp-task-degrees")?
                .unwrap_or(default_config.first_bsp_task_degrees),
            second_bsp_task_degrees: pargs
                .opt_value_from_str("--second-bsp-task-degrees")?
                .unwrap_or(default_config.second_bsp_task_degrees),
            cluster_core_task_degrees: pargs
                .opt_value_from_str("--cluster-core-task-degrees")?
                .unwrap_or(default_config.cluster_core_task_degrees),
            noncore_task_degrees: pargs
                .opt_value_from_str("--noncore-task-degrees")?
                .unwrap_or(default_config.noncore_task_degrees),
        };

        let args = AppArgs {
            path: pargs.value_from_os_str(["-p", "--path"], as_path_buf)?,
            format: pargs
                .opt_value_from_str(["-f", "--format"])?
                .unwrap_or(crate::FileFormat::Binary),
            eps: pargs.value_from_str(["-e", "--eps"])?,
            mu: pargs.value_from_str(["-m", "--mu"])?,
            threads: pargs.opt_value_from_str(["-t", "--threads"])?,
            kernel: pargs.opt_value_from_str("--kernel")?,
            output: pargs.opt_value_from_os_str(["-o", "--output"], as_path_buf)?,
            config,
        };

        Ok(args)
    }
}
