//! Report query clients.

pub mod query;
pub mod source;

// Re-export commonly used types
pub use query::{ReportClient, ReportQuery};
pub use source::{QuerySource, SourceArgs};
