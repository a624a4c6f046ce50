//! Reporting and artifact export pipeline.

pub mod artifacts;
pub mod summary;

pub use artifacts::{read_report, ArtifactManager, ArtifactPaths, RunReport};
pub use summary::{format_report, format_top_results, report_rows};
