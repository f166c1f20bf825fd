//! Target catalog schema: STAC-shaped items and collections.
//!
//! These are the durable output records of the pipeline. Shapes follow the
//! STAC 1.0.0 item and collection specs, with the `ssys:*` solar-system
//! extension fields the harvested services use. Validation is a pure function
//! over the declared shape; records that fail it are rejected, never coerced.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{HarvestError, Result};

/// STAC version stamped on every produced record.
pub const STAC_VERSION: &str = "1.0.0";

// ---------------------------------------------------------------------------
// Building blocks
// ---------------------------------------------------------------------------

/// A link between STAC entities.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StacLink {
    /// The actual link, relative or absolute.
    pub href: String,
    /// Relationship between the current and the linked document.
    pub rel: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// A downloadable asset attached to an item or collection.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StacAsset {
    pub href: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
}

/// A provider entry carried over from the service registry.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StacProvider {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Spatial extent of a collection: one or more bounding boxes.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StacSpatialExtent {
    pub bbox: Vec<Vec<f64>>,
}

/// Temporal extent of a collection: one or more `[start, end]` intervals,
/// open ends encoded as `null`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StacTemporalExtent {
    pub interval: Vec<Vec<Option<String>>>,
}

/// Combined collection extent.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StacExtent {
    pub spatial: StacSpatialExtent,
    pub temporal: StacTemporalExtent,
}

/// STAC common metadata plus the `ssys:*` fields used by planetary catalogs.
///
/// Optional source fields that were absent stay omitted here — never a
/// sentinel value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct StacProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Nominal acquisition time, ISO 8601. Required unless both
    /// `start_datetime` and `end_datetime` are set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_datetime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_datetime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    /// Instrument host (PDS `instrument_host_id`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruments: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mission: Option<String>,
    /// Ground sample distance in meters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gsd: Option<f64>,
    #[serde(
        default,
        rename = "ssys:targets",
        skip_serializing_if = "Option::is_none"
    )]
    pub ssys_targets: Option<Vec<String>>,
    #[serde(
        default,
        rename = "ssys:solar_longitude",
        skip_serializing_if = "Option::is_none"
    )]
    pub ssys_solar_longitude: Option<f64>,
    #[serde(
        default,
        rename = "ssys:incidence_angle",
        skip_serializing_if = "Option::is_none"
    )]
    pub ssys_incidence_angle: Option<f64>,
    #[serde(
        default,
        rename = "ssys:emission_angle",
        skip_serializing_if = "Option::is_none"
    )]
    pub ssys_emission_angle: Option<f64>,
    #[serde(
        default,
        rename = "ssys:phase_angle",
        skip_serializing_if = "Option::is_none"
    )]
    pub ssys_phase_angle: Option<f64>,
    /// Extension fields (e.g. `processing:level`) keyed by their full name.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Item
// ---------------------------------------------------------------------------

/// A validated catalog item — the durable per-record output unit.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StacItem {
    /// Always `"Feature"`.
    #[serde(rename = "type")]
    pub item_type: String,
    pub stac_version: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stac_extensions: Vec<String>,
    pub id: String,
    /// GeoJSON geometry, `null` when the footprint was absent or invalid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<serde_json::Value>,
    /// `[west, south, east, north]`, present only alongside a geometry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<Vec<f64>>,
    pub properties: StacProperties,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<StacLink>,
    pub assets: BTreeMap<String, StacAsset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
}

impl StacItem {
    /// Create an empty item skeleton with the version and type tags set.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            item_type: "Feature".into(),
            stac_version: STAC_VERSION.into(),
            stac_extensions: Vec::new(),
            id: id.into(),
            geometry: None,
            bbox: None,
            properties: StacProperties::default(),
            links: Vec::new(),
            assets: BTreeMap::new(),
            collection: None,
        }
    }

    /// Validate the item against the target schema. Fail-closed: any
    /// violation is a [`HarvestError::SchemaInput`].
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(HarvestError::schema_input("item `id` must not be empty"));
        }
        if self.item_type != "Feature" {
            return Err(HarvestError::schema_input(format!(
                "item `type` must be `Feature`, got `{}`",
                self.item_type
            )));
        }
        let has_interval = self.properties.start_datetime.is_some()
            && self.properties.end_datetime.is_some();
        if self.properties.datetime.is_none() && !has_interval {
            return Err(HarvestError::schema_input(format!(
                "item `{}` has neither `datetime` nor a start/end interval",
                self.id
            )));
        }
        if let (Some(start), Some(end)) = (
            &self.properties.start_datetime,
            &self.properties.end_datetime,
        ) {
            if start > end {
                return Err(HarvestError::schema_input(format!(
                    "item `{}` start_datetime `{start}` is after end_datetime `{end}`",
                    self.id
                )));
            }
        }
        if let Some(bbox) = &self.bbox {
            validate_bbox(bbox)?;
        }
        for (name, asset) in &self.assets {
            if asset.href.trim().is_empty() {
                return Err(HarvestError::schema_input(format!(
                    "item `{}` asset `{name}` has an empty href",
                    self.id
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Collection
// ---------------------------------------------------------------------------

/// A validated catalog collection.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StacCollection {
    /// Always `"Collection"`.
    #[serde(rename = "type")]
    pub collection_type: String,
    pub stac_version: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stac_extensions: Vec<String>,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
    pub license: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub providers: Option<Vec<StacProvider>>,
    pub extent: StacExtent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summaries: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<StacLink>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assets: Option<BTreeMap<String, StacAsset>>,
}

impl StacCollection {
    /// Validate the collection against the target schema.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(HarvestError::schema_input(
                "collection `id` must not be empty",
            ));
        }
        if self.collection_type != "Collection" {
            return Err(HarvestError::schema_input(format!(
                "collection `type` must be `Collection`, got `{}`",
                self.collection_type
            )));
        }
        if self.description.trim().is_empty() {
            return Err(HarvestError::schema_input(format!(
                "collection `{}` has an empty description",
                self.id
            )));
        }
        if self.license.trim().is_empty() {
            return Err(HarvestError::schema_input(format!(
                "collection `{}` has an empty license",
                self.id
            )));
        }
        for bbox in &self.extent.spatial.bbox {
            validate_bbox(bbox)?;
        }
        for interval in &self.extent.temporal.interval {
            if interval.len() != 2 {
                return Err(HarvestError::schema_input(format!(
                    "collection `{}` temporal interval must have two entries",
                    self.id
                )));
            }
            if let (Some(start), Some(end)) = (&interval[0], &interval[1]) {
                if start > end {
                    return Err(HarvestError::schema_input(format!(
                        "collection `{}` temporal interval `{start}` > `{end}`",
                        self.id
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Check a bbox has 4 (2D) or 6 (3D) coordinates with min ≤ max per axis.
pub fn validate_bbox(bbox: &[f64]) -> Result<()> {
    let dims = match bbox.len() {
        4 => 2,
        6 => 3,
        n => {
            return Err(HarvestError::schema_input(format!(
                "bbox must have 4 or 6 coordinates, got {n}"
            )));
        }
    };
    for axis in 0..dims {
        let min = bbox[axis];
        let max = bbox[axis + dims];
        if min > max {
            return Err(HarvestError::schema_input(format!(
                "bbox axis {axis} min {min} > max {max}"
            )));
        }
    }
    Ok(())
}
