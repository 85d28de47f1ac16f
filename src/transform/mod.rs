//! Transform adapters from backend records into report-facing entity models.

pub(crate) mod molecule;
pub(crate) mod patent;
