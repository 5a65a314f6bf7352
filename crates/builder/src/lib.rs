//! A building block for the `pscan` structural clustering engine.
//!
//! The crate provides an immutable Compressed-Sparse-Row (CSR)
//! representation of an undirected simple graph, a builder to create it
//! from an edge list, and readers for the input formats the `pscan`
//! binary consumes.
//!
//! The CSR is tailored for concurrent read access: neighbor lists are
//! strictly sorted slices, every edge `(u, v)` has a symmetric twin
//! `(v, u)`, and vertex ids are dense `u32` values. These properties are
//! validated once at construction; the clustering engine treats them as
//! preconditions.
//!
//! # Example
//!
//! ```
//! use pscan_builder::prelude::*;
//!
//! let graph: UndirectedCsrGraph = GraphBuilder::new()
//!     .edges(vec![(0, 1), (0, 2), (1, 2), (1, 3)])
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(graph.node_count(), 4);
//! assert_eq!(graph.edge_count(), 8);
//! assert_eq!(graph.neighbors(1), &[0, 2, 3]);
//! ```

pub mod builder;
pub mod graph;
pub mod input;
pub mod prelude;

pub use crate::builder::GraphBuilder;
pub use crate::graph::UndirectedCsrGraph;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("error while loading graph")]
    IoError {
        #[from]
        source: std::io::Error,
    },
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("graph exceeds the 32-bit vertex id range")]
    GraphTooLarge,
    #[error("malformed csr: {message}")]
    MalformedCsr { message: String },
}

impl Error {
    pub(crate) fn invalid_input(message: impl Into<String>) -> Self {
        Error::InvalidInput {
            message: message.into(),
        }
    }

    pub(crate) fn malformed_csr(message: impl Into<String>) -> Self {
        Error::MalformedCsr {
            message: message.into(),
        }
    }
}
