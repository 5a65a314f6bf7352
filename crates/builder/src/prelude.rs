pub use crate::builder::GraphBuilder;

pub use crate::graph::UndirectedCsrGraph;

pub use crate::input::BinaryInput;
pub use crate::input::EdgeListInput;

pub use crate::Error;
