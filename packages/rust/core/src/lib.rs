//! Pipeline orchestration for stacharvest.
//!
//! This crate composes the registry, extractor, transformer, and storage
//! crates into the four collection-level operations — extract, transform,
//! ingest, and discovery — plus the sequential multi-collection `process`
//! run. See [`crawler::Crawler`].

pub mod artifacts;
pub mod crawler;
pub mod ingest;

pub use artifacts::ArtifactStore;
pub use crawler::{CollectionOutcome, Crawler, StageReport};
pub use ingest::{Ingest, StacApiIngestor};
