// src/extractors/mod.rs
pub mod catalog;
pub mod metrics;

// Re-export key extraction types for convenience
pub use catalog::{DerivedMetric, Metric, MetricCatalog};
pub use metrics::{ExtractionResult, MetricExtractor};
