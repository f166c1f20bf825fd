//! Shared types, error model, and configuration for stacharvest.
//!
//! This crate is the foundation depended on by all other stacharvest crates.
//! It provides:
//! - [`HarvestError`] — the unified error type
//! - Registry and collection domain types ([`ExternalService`], [`SourceCollection`])
//! - Source and target metadata schemas ([`schemas`], [`stac`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod schemas;
pub mod stac;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CollectionPolicy, DatastoreConfig, ExtractConfig, IngestConfig, PoliciesConfig,
    RegistryConfig, config_dir, config_file_path, expand_home, init_config, load_config,
    load_config_from, validate_auth_token,
};
pub use error::{HarvestError, Result};
pub use schemas::{SourceSchema, TargetSchema};
pub use types::{
    CollectionFilters, ExternalService, ExternalServiceType, ProviderRole, RunId, Service,
    ServiceProvider, ServiceType, SourceCollection,
};
