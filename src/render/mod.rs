//! Output rendering for search reports and service listings.

pub(crate) mod json;
pub(crate) mod markdown;
