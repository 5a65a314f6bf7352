pub use crate::dss::DisjointSetStruct;

pub use crate::intersect::IntersectKind;
pub use crate::intersect::Intersector;
pub use crate::intersect::Similarity;

pub use crate::scan::scan;
pub use crate::scan::scan_with_kernel;
pub use crate::scan::Clustering;
pub use crate::scan::ScanConfig;

pub use crate::similarity::Epsilon;

pub use crate::Error;

pub use pscan_builder::prelude::*;
