//! Internal helpers: patent number parsing and local paths.

pub(crate) mod patent_number;
pub(crate) mod paths;
