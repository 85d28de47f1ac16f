//! Domain entities shared by the source clients, the pipeline and the renderers.

pub mod molecule;
pub mod patent;
pub mod report;
