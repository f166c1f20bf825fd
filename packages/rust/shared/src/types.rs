//! Core domain types for stacharvest service registries and collections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::schemas::SourceSchema;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for pipeline run identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Services
// ---------------------------------------------------------------------------

/// Role of an organization providing a service or collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderRole {
    Producer,
    Licensor,
    Processor,
    Host,
}

impl ProviderRole {
    /// STAC spelling of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Producer => "producer",
            Self::Licensor => "licensor",
            Self::Processor => "processor",
            Self::Host => "host",
        }
    }
}

/// Catalog service types exposed by the services registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ServiceType {
    Stac,
    Wfs,
    Wms,
    Wmts,
    Xyz,
}

/// Source protocols the extractor family knows how to speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExternalServiceType {
    Epntap,
    PdsOde,
    Wfs,
}

impl ExternalServiceType {
    /// Registry-document spelling of the type tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Epntap => "EPNTAP",
            Self::PdsOde => "PDSODE",
            Self::Wfs => "WFS",
        }
    }

    /// The source schema records of this protocol are declared under.
    pub fn source_schema(&self) -> SourceSchema {
        match self {
            Self::Epntap => SourceSchema::Epntap,
            Self::PdsOde => SourceSchema::PdsOde,
            Self::Wfs => SourceSchema::MarssiWfs,
        }
    }
}

impl std::fmt::Display for ExternalServiceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An organization providing a service, with STAC-style roles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceProvider {
    /// Organization name.
    pub name: String,
    /// Organization description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Organization roles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<ProviderRole>>,
    /// Organization homepage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// A data-catalog service declared in the services registry.
///
/// Read-only once loaded; identified by `url` within a registry snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub title: String,
    pub description: String,
    pub providers: Vec<ServiceProvider>,
    #[serde(rename = "type")]
    pub service_type: ServiceType,
    pub url: Url,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ping_url: Option<Url>,
    #[serde(
        default,
        rename = "ssys:targets",
        skip_serializing_if = "Option::is_none"
    )]
    pub ssys_targets: Option<Vec<String>>,
}

/// A registry entry for an external (non-STAC) data service, tagged with the
/// protocol its extractor must speak.
///
/// `extra_params` carries protocol specifics the registry declares up front:
/// `table` for EPN-TAP, `layers` for WFS, optionally `odemetadb` for PDS-ODE.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalService {
    pub title: String,
    pub description: String,
    pub providers: Vec<ServiceProvider>,
    #[serde(rename = "type")]
    pub service_type: ExternalServiceType,
    pub url: Url,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ping_url: Option<Url>,
    #[serde(
        default,
        rename = "ssys:targets",
        skip_serializing_if = "Option::is_none"
    )]
    pub ssys_targets: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra_params: serde_json::Map<String, serde_json::Value>,
}

impl ExternalService {
    /// Look up a string-valued entry in `extra_params`.
    pub fn extra_param(&self, key: &str) -> Option<&str> {
        self.extra_params.get(key).and_then(|v| v.as_str())
    }
}

// ---------------------------------------------------------------------------
// Source collections
// ---------------------------------------------------------------------------

/// A source collection indexed in the datastore, with its pipeline status.
///
/// One row per (service, collection identifier). The status flags are the
/// only mutable state the pipeline keeps between stages; everything else is
/// re-derivable by re-running.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceCollection {
    /// Collection identifier, unique within the datastore.
    pub collection_id: String,
    /// The service this collection was enumerated from.
    pub service: ExternalService,
    /// Declared schema of the raw records this collection yields.
    pub source_schema: SourceSchema,
    /// Primary target body (e.g. `mars`), when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Item count advertised by the service, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_items: Option<u64>,
    /// Additional target bodies advertised by the service.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<String>,
    #[serde(default)]
    pub extracted: bool,
    /// Stage artifacts written by extraction, in read order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extracted_files: Vec<String>,
    #[serde(default)]
    pub transformed: bool,
    /// Directory holding the transformed STAC collection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stac_dir: Option<String>,
    #[serde(default)]
    pub ingested: bool,
    /// Destination URL of the ingested STAC collection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stac_url: Option<String>,
    /// Last time any stage touched this row.
    pub updated_at: DateTime<Utc>,
}

impl SourceCollection {
    /// Create a fresh, unprocessed collection row.
    pub fn new(
        collection_id: impl Into<String>,
        service: ExternalService,
        n_items: Option<u64>,
        targets: Vec<String>,
    ) -> Self {
        let source_schema = service.service_type.source_schema();
        let target = targets.first().cloned();
        Self {
            collection_id: collection_id.into(),
            service,
            source_schema,
            target,
            n_items,
            targets,
            extracted: false,
            extracted_files: Vec::new(),
            transformed: false,
            stac_dir: None,
            ingested: false,
            stac_url: None,
            updated_at: Utc::now(),
        }
    }
}

/// Filters for selecting source collections from the datastore.
///
/// All fields are conjunctive; `id` and `target` match as case-insensitive
/// substrings.
#[derive(Debug, Clone, Default)]
pub struct CollectionFilters {
    pub id: Option<String>,
    pub service_type: Option<ExternalServiceType>,
    pub target: Option<String>,
    pub extracted: Option<bool>,
    pub transformed: Option<bool>,
    pub ingested: Option<bool>,
}

impl CollectionFilters {
    /// True when `collection` passes every configured filter.
    pub fn matches(&self, collection: &SourceCollection) -> bool {
        if let Some(id) = &self.id {
            if !collection
                .collection_id
                .to_lowercase()
                .contains(&id.to_lowercase())
            {
                return false;
            }
        }
        if let Some(service_type) = self.service_type {
            if collection.service.service_type != service_type {
                return false;
            }
        }
        if let Some(target) = &self.target {
            let matched = collection
                .target
                .as_deref()
                .is_some_and(|t| t.to_lowercase().contains(&target.to_lowercase()));
            if !matched {
                return false;
            }
        }
        if let Some(extracted) = self.extracted {
            if collection.extracted != extracted {
                return false;
            }
        }
        if let Some(transformed) = self.transformed {
            if collection.transformed != transformed {
                return false;
            }
        }
        if let Some(ingested) = self.ingested {
            if collection.ingested != ingested {
                return false;
            }
        }
        true
    }
}
