//! End-to-end document pipeline: URL → crawl → index → capabilities → stages.

pub mod pipeline;
pub mod stages;

pub use pipeline::{
    DocumentConfig, DocumentRun, ProgressReporter, SilentProgress, run_document_pipeline,
};
pub use stages::document_plan;
