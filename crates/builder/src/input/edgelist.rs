use std::fs::File;
use std::path::Path;

use atoi::FromRadix10;
use linereader::LineReader;
use log::info;

use crate::builder::GraphBuilder;
use crate::graph::UndirectedCsrGraph;
use crate::Error;

/// Reads a graph from a file that contains an edge per line.
///
/// An edge is represented by a source vertex id and a target vertex id,
/// separated by ASCII whitespace. Lines starting with `#` are skipped.
/// The vertex count of the resulting graph is the highest vertex id within
/// the file plus one.
///
/// # Example
///
/// ```ignore
/// > cat my_graph.el
/// # a triangle
/// 0 1
/// 0 2
/// 1 2
/// ```
pub struct EdgeListInput;

impl EdgeListInput {
    pub fn load(path: impl AsRef<Path>) -> Result<UndirectedCsrGraph, Error> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let mut lines = LineReader::new(file);

        let mut edges = Vec::new();
        let mut line_no = 0_u64;

        while let Some(line) = lines.next_line() {
            let line = line?;
            line_no += 1;
            if let Some(edge) = parse_edge(line, line_no)? {
                edges.push(edge);
            }
        }

        info!("Read {} edges from {:?}", edges.len(), path);

        GraphBuilder::new().edges(edges).build()
    }
}

fn parse_edge(line: &[u8], line_no: u64) -> Result<Option<(u32, u32)>, Error> {
    let mut pos = match line.iter().position(|b| !b.is_ascii_whitespace()) {
        Some(pos) => pos,
        None => return Ok(None),
    };
    if line[pos] == b'#' {
        return Ok(None);
    }

    let (source, used) = u32::from_radix_10(&line[pos..]);
    if used == 0 {
        return Err(Error::invalid_input(format!(
            "expected source vertex id in line {line_no}"
        )));
    }
    pos += used;

    while pos < line.len() && line[pos].is_ascii_whitespace() {
        pos += 1;
    }

    let (target, used) = u32::from_radix_10(&line[pos..]);
    if used == 0 {
        return Err(Error::invalid_input(format!(
            "expected target vertex id in line {line_no}"
        )));
    }

    Ok(Some((source, target)))
}
