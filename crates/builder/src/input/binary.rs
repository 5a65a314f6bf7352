use std::fs::File;
use std::path::Path;

use byte_slice_cast::AsSliceOf;
use log::info;
use memmap2::Mmap;

use crate::graph::UndirectedCsrGraph;
use crate::Error;

/// Reads a graph from the binary dataset layout used by the SCAN family
/// of clustering tools.
///
/// A dataset is a directory containing two little-endian files:
///
/// * `b_degree.bin` holds `u32` words: the word size (must be 4), the
///   vertex count `n`, the directed edge count `m`, followed by `n`
///   degrees.
/// * `b_adj.bin` holds `m` `u32` words with the concatenated, sorted
///   adjacency lists.
pub struct BinaryInput;

const DEGREE_FILE: &str = "b_degree.bin";
const ADJACENCY_FILE: &str = "b_adj.bin";

impl BinaryInput {
    pub fn load(dir: impl AsRef<Path>) -> Result<UndirectedCsrGraph, Error> {
        let dir = dir.as_ref();

        let degree_map = map_file(&dir.join(DEGREE_FILE))?;
        let words = as_words(&degree_map)?;

        if words.len() < 3 {
            return Err(Error::invalid_input("degree file header truncated"));
        }
        if words[0] as usize != std::mem::size_of::<u32>() {
            return Err(Error::invalid_input(format!(
                "unsupported word size {}",
                words[0]
            )));
        }
        let node_count = words[1] as usize;
        let edge_count = words[2] as usize;
        let degrees = &words[3..];
        if degrees.len() != node_count {
            return Err(Error::invalid_input(format!(
                "expected {} degrees, found {}",
                node_count,
                degrees.len()
            )));
        }

        let mut offsets = Vec::with_capacity(node_count + 1);
        let mut total = 0_usize;
        offsets.push(0);
        for &degree in degrees {
            total += degree as usize;
            offsets.push(total);
        }
        if total != edge_count {
            return Err(Error::invalid_input(format!(
                "degrees sum to {total}, header claims {edge_count} edges"
            )));
        }

        let adjacency_map = map_file(&dir.join(ADJACENCY_FILE))?;
        let targets = as_words(&adjacency_map)?;
        if targets.len() != edge_count {
            return Err(Error::invalid_input(format!(
                "expected {} adjacency entries, found {}",
                edge_count,
                targets.len()
            )));
        }

        info!("Read binary graph with {node_count} vertices and {edge_count} directed edges");

        UndirectedCsrGraph::from_csr(offsets, targets.to_vec())
    }
}

fn map_file(path: &Path) -> Result<Mmap, Error> {
    let file = File::open(path)?;
    // SAFETY: the mapping is read-only and dropped before the file handle.
    let map = unsafe { Mmap::map(&file)? };
    Ok(map)
}

fn as_words(map: &Mmap) -> Result<&[u32], Error> {
    map[..]
        .as_slice_of::<u32>()
        .map_err(|e| Error::invalid_input(e.to_string()))
}
