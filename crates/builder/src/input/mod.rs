//! Input formats understood by the `pscan` binary.

mod binary;
mod edgelist;

pub use binary::BinaryInput;
pub use edgelist::EdgeListInput;
