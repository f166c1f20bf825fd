//! Source metadata schemas for the harvested protocols, plus the schema-doc
//! lookup backing the `schemas` CLI command.
//!
//! | Schema       | Collection metadata | Item metadata     |
//! |--------------|---------------------|-------------------|
//! | `PDSODE`     | [`PdsOdeIiptSet`]   | [`PdsOdeProduct`] |
//! | `EPNTAP`     | —                   | [`EpntapGranule`] |
//! | `MARSSI_WFS` | —                   | [`WfsFeature`]    |
//! | `STAC`       | `StacCollection`    | `StacItem`        |
//!
//! Raw records are transient: created by an extractor, consumed by a
//! transformer, never persisted beyond the extraction artifact. Field
//! requiredness is enforced by the transformers, not by deserialization, so
//! that an incomplete upstream record surfaces as a schema-input error rather
//! than a parse failure.

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{HarvestError, Result};
use crate::stac::{StacCollection, StacItem};

// ---------------------------------------------------------------------------
// Schema identifiers
// ---------------------------------------------------------------------------

/// Declared schema of raw records produced by an extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceSchema {
    #[serde(rename = "PDSODE")]
    PdsOde,
    #[serde(rename = "EPNTAP")]
    Epntap,
    #[serde(rename = "MARSSI_WFS")]
    MarssiWfs,
}

impl SourceSchema {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PdsOde => "PDSODE",
            Self::Epntap => "EPNTAP",
            Self::MarssiWfs => "MARSSI_WFS",
        }
    }
}

impl std::fmt::Display for SourceSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared schema of transformed records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetSchema {
    #[serde(rename = "STAC")]
    Stac,
}

impl TargetSchema {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stac => "STAC",
        }
    }
}

impl std::fmt::Display for TargetSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Lenient field deserializers
// ---------------------------------------------------------------------------

/// Accept a JSON string or number as an optional string.
///
/// The ODE REST API serializes most numeric label fields as strings, but not
/// consistently across product types.
fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        Some(other) => Some(other.to_string()),
    })
}

/// Accept a JSON number or numeric string as an optional f64.
fn lenient_f64<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    })
}

/// One value or a list of values; the ODE API uses both for `ValidTarget`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T: Clone> OneOrMany<T> {
    /// Flatten into a vector regardless of shape.
    pub fn to_vec(&self) -> Vec<T> {
        match self {
            Self::One(v) => vec![v.clone()],
            Self::Many(vs) => vs.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// PDS-ODE schemas
// ---------------------------------------------------------------------------

/// Valid target bodies of an IIPTSet.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PdsOdeValidTargets {
    #[serde(rename = "ValidTarget")]
    pub valid_target: OneOrMany<String>,
}

/// Collection-level descriptor returned by the ODE `query=iipy` call:
/// one (instrument host, instrument, product type) set.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PdsOdeIiptSet {
    #[serde(rename = "ODEMetaDB")]
    pub ode_meta_db: String,
    #[serde(rename = "IHID")]
    pub ihid: String,
    #[serde(default, rename = "IHName", skip_serializing_if = "Option::is_none")]
    pub ih_name: Option<String>,
    #[serde(rename = "IID")]
    pub iid: String,
    #[serde(default, rename = "IName", skip_serializing_if = "Option::is_none")]
    pub i_name: Option<String>,
    #[serde(rename = "PT")]
    pub pt: String,
    #[serde(default, rename = "PTName", skip_serializing_if = "Option::is_none")]
    pub pt_name: Option<String>,
    #[serde(default, rename = "DataSetId", skip_serializing_if = "Option::is_none")]
    pub data_set_id: Option<String>,
    #[serde(
        default,
        rename = "ValidTargets",
        skip_serializing_if = "Option::is_none"
    )]
    pub valid_targets: Option<PdsOdeValidTargets>,
    /// `"T"` when the set's products carry valid footprints.
    #[serde(
        default,
        rename = "ValidFootprints",
        skip_serializing_if = "Option::is_none"
    )]
    pub valid_footprints: Option<String>,
    #[serde(
        default,
        rename = "NumberProducts",
        deserialize_with = "lenient_f64",
        skip_serializing_if = "Option::is_none"
    )]
    #[schemars(with = "Option<f64>")]
    pub number_products: Option<f64>,
}

impl PdsOdeIiptSet {
    /// Collection identifier derived from the set: `{IHID}_{IID}_{PT}`.
    pub fn collection_id(&self) -> String {
        format!("{}_{}_{}", self.ihid, self.iid, self.pt)
    }

    /// Target bodies: the metadata database first, then declared valid targets.
    pub fn targets(&self) -> Vec<String> {
        let mut targets = vec![self.ode_meta_db.clone()];
        if let Some(valid) = &self.valid_targets {
            for target in valid.valid_target.to_vec() {
                if !targets.contains(&target) {
                    targets.push(target);
                }
            }
        }
        targets
    }
}

/// One file attached to an ODE product.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PdsOdeProductFile {
    #[serde(
        default,
        rename = "Description",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<String>,
    #[serde(rename = "FileName")]
    pub file_name: String,
    #[serde(
        default,
        rename = "KBytes",
        deserialize_with = "lenient_f64",
        skip_serializing_if = "Option::is_none"
    )]
    #[schemars(with = "Option<f64>")]
    pub kbytes: Option<f64>,
    #[serde(default, rename = "Type", skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    #[serde(default, rename = "URL", skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Wrapper object the ODE API nests product files under.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct PdsOdeProductFiles {
    #[serde(default, rename = "Product_file")]
    pub product_file: Vec<PdsOdeProductFile>,
}

/// A PDS-ODE product record (`query=product&results=copmf`).
///
/// Every field is optional at the wire level; the PDS-ODE transformer
/// enforces which ones a usable record must carry. The nested `Product_files`
/// sequence is preserved as-is, never flattened.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct PdsOdeProduct {
    /// Internal ODE product identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ode_id: Option<String>,
    /// PDS product id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdsid: Option<String>,
    /// Instrument host id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ihid: Option<String>,
    /// Instrument id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iid: Option<String>,
    /// ODE product type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pt: Option<String>,
    #[serde(
        default,
        rename = "Data_Set_Id",
        skip_serializing_if = "Option::is_none"
    )]
    pub data_set_id: Option<String>,
    #[serde(
        default,
        rename = "PDSVolume_Id",
        skip_serializing_if = "Option::is_none"
    )]
    pub pds_volume_id: Option<String>,
    /// Relative path from the volume root to the product label file.
    #[serde(
        default,
        rename = "RelativePathtoVol",
        skip_serializing_if = "Option::is_none"
    )]
    pub relative_path_to_vol: Option<String>,
    #[serde(
        default,
        rename = "LabelFileName",
        skip_serializing_if = "Option::is_none"
    )]
    pub label_file_name: Option<String>,
    /// Product creation time (UTC).
    #[serde(
        default,
        rename = "Product_creation_time",
        skip_serializing_if = "Option::is_none"
    )]
    pub product_creation_time: Option<String>,
    /// Product target (example: Mars).
    #[serde(
        default,
        rename = "Target_name",
        skip_serializing_if = "Option::is_none"
    )]
    pub target_name: Option<String>,
    #[serde(
        default,
        rename = "Product_version_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub product_version_id: Option<String>,
    /// Identifies a scientific observation within a data set.
    #[serde(
        default,
        rename = "Observation_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub observation_id: Option<String>,
    /// Observation mid-point time.
    #[serde(
        default,
        rename = "Observation_time",
        skip_serializing_if = "Option::is_none"
    )]
    pub observation_time: Option<String>,
    #[serde(
        default,
        rename = "Product_release_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub product_release_date: Option<String>,
    /// Observation start time in UTC.
    #[serde(
        default,
        rename = "UTC_start_time",
        skip_serializing_if = "Option::is_none"
    )]
    pub utc_start_time: Option<String>,
    /// Observation stop time in UTC.
    #[serde(
        default,
        rename = "UTC_stop_time",
        skip_serializing_if = "Option::is_none"
    )]
    pub utc_stop_time: Option<String>,
    #[serde(
        default,
        rename = "Emission_angle",
        deserialize_with = "lenient_f64",
        skip_serializing_if = "Option::is_none"
    )]
    #[schemars(with = "Option<f64>")]
    pub emission_angle: Option<f64>,
    #[serde(
        default,
        rename = "Phase_angle",
        deserialize_with = "lenient_f64",
        skip_serializing_if = "Option::is_none"
    )]
    #[schemars(with = "Option<f64>")]
    pub phase_angle: Option<f64>,
    #[serde(
        default,
        rename = "Incidence_angle",
        deserialize_with = "lenient_f64",
        skip_serializing_if = "Option::is_none"
    )]
    #[schemars(with = "Option<f64>")]
    pub incidence_angle: Option<f64>,
    #[serde(
        default,
        rename = "Map_resolution",
        deserialize_with = "lenient_f64",
        skip_serializing_if = "Option::is_none"
    )]
    #[schemars(with = "Option<f64>")]
    pub map_resolution: Option<f64>,
    #[serde(
        default,
        rename = "Map_scale",
        deserialize_with = "lenient_f64",
        skip_serializing_if = "Option::is_none"
    )]
    #[schemars(with = "Option<f64>")]
    pub map_scale: Option<f64>,
    #[serde(
        default,
        rename = "Solar_longitude",
        deserialize_with = "lenient_f64",
        skip_serializing_if = "Option::is_none"
    )]
    #[schemars(with = "Option<f64>")]
    pub solar_longitude: Option<f64>,
    /// `"T"` when the product has a footprint bounding box.
    #[serde(
        default,
        rename = "BB_georeferenced",
        skip_serializing_if = "Option::is_none"
    )]
    pub bb_georeferenced: Option<String>,
    /// Longitude 0–360 easternmost longitude of the footprint.
    #[serde(
        default,
        rename = "Easternmost_longitude",
        deserialize_with = "lenient_f64",
        skip_serializing_if = "Option::is_none"
    )]
    #[schemars(with = "Option<f64>")]
    pub easternmost_longitude: Option<f64>,
    #[serde(
        default,
        rename = "Maximum_latitude",
        deserialize_with = "lenient_f64",
        skip_serializing_if = "Option::is_none"
    )]
    #[schemars(with = "Option<f64>")]
    pub maximum_latitude: Option<f64>,
    #[serde(
        default,
        rename = "Minimum_latitude",
        deserialize_with = "lenient_f64",
        skip_serializing_if = "Option::is_none"
    )]
    #[schemars(with = "Option<f64>")]
    pub minimum_latitude: Option<f64>,
    #[serde(
        default,
        rename = "Westernmost_longitude",
        deserialize_with = "lenient_f64",
        skip_serializing_if = "Option::is_none"
    )]
    #[schemars(with = "Option<f64>")]
    pub westernmost_longitude: Option<f64>,
    /// Planetocentric, longitude −180–180 footprint in WKT.
    #[serde(
        default,
        rename = "Footprint_C0_geometry",
        skip_serializing_if = "Option::is_none"
    )]
    pub footprint_c0_geometry: Option<String>,
    /// Planetocentric, longitude 0–360 footprint in WKT (unprojected).
    #[serde(
        default,
        rename = "Footprint_GL_geometry",
        skip_serializing_if = "Option::is_none"
    )]
    pub footprint_gl_geometry: Option<String>,
    /// `"T"` when the footprint crosses the 0/360 longitude line.
    #[serde(
        default,
        rename = "Footprints_cross_meridian",
        skip_serializing_if = "Option::is_none"
    )]
    pub footprints_cross_meridian: Option<String>,
    #[serde(
        default,
        rename = "Description",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<String>,
    /// URL to an external reference for the product.
    #[serde(
        default,
        rename = "External_url",
        skip_serializing_if = "Option::is_none"
    )]
    pub external_url: Option<String>,
    #[serde(default, rename = "FilesURL", skip_serializing_if = "Option::is_none")]
    pub files_url: Option<String>,
    #[serde(
        default,
        rename = "ProductURL",
        skip_serializing_if = "Option::is_none"
    )]
    pub product_url: Option<String>,
    #[serde(default, rename = "LabelURL", skip_serializing_if = "Option::is_none")]
    pub label_url: Option<String>,
    /// Associated product files, preserved as nested records.
    #[serde(default, rename = "Product_files")]
    pub product_files: PdsOdeProductFiles,
}

// ---------------------------------------------------------------------------
// EPN-TAP schema
// ---------------------------------------------------------------------------

/// One row of an EPN-TAP `epn_core` table.
///
/// Every epn_core column is present in the table but may be NULL, so every
/// field except the granule identifier is optional. Times are Julian Dates,
/// coordinate ranges are in the frame declared by `spatial_frame_type`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct EpntapGranule {
    pub granule_uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub granule_gid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obs_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataproduct_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_class: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_f64",
        skip_serializing_if = "Option::is_none"
    )]
    #[schemars(with = "Option<f64>")]
    pub time_min: Option<f64>,
    #[serde(
        default,
        deserialize_with = "lenient_f64",
        skip_serializing_if = "Option::is_none"
    )]
    #[schemars(with = "Option<f64>")]
    pub time_max: Option<f64>,
    #[serde(
        default,
        deserialize_with = "lenient_f64",
        skip_serializing_if = "Option::is_none"
    )]
    #[schemars(with = "Option<f64>")]
    pub c1min: Option<f64>,
    #[serde(
        default,
        deserialize_with = "lenient_f64",
        skip_serializing_if = "Option::is_none"
    )]
    #[schemars(with = "Option<f64>")]
    pub c1max: Option<f64>,
    #[serde(
        default,
        deserialize_with = "lenient_f64",
        skip_serializing_if = "Option::is_none"
    )]
    #[schemars(with = "Option<f64>")]
    pub c2min: Option<f64>,
    #[serde(
        default,
        deserialize_with = "lenient_f64",
        skip_serializing_if = "Option::is_none"
    )]
    #[schemars(with = "Option<f64>")]
    pub c2max: Option<f64>,
    #[serde(
        default,
        deserialize_with = "lenient_f64",
        skip_serializing_if = "Option::is_none"
    )]
    #[schemars(with = "Option<f64>")]
    pub c3min: Option<f64>,
    #[serde(
        default,
        deserialize_with = "lenient_f64",
        skip_serializing_if = "Option::is_none"
    )]
    #[schemars(with = "Option<f64>")]
    pub c3max: Option<f64>,
    /// STC-S footprint string (e.g. `Polygon UNKNOWNFrame 10 -5 ...`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s_region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spatial_frame_type: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_f64",
        skip_serializing_if = "Option::is_none"
    )]
    #[schemars(with = "Option<f64>")]
    pub incidence_min: Option<f64>,
    #[serde(
        default,
        deserialize_with = "lenient_f64",
        skip_serializing_if = "Option::is_none"
    )]
    #[schemars(with = "Option<f64>")]
    pub incidence_max: Option<f64>,
    #[serde(
        default,
        deserialize_with = "lenient_f64",
        skip_serializing_if = "Option::is_none"
    )]
    #[schemars(with = "Option<f64>")]
    pub emergence_min: Option<f64>,
    #[serde(
        default,
        deserialize_with = "lenient_f64",
        skip_serializing_if = "Option::is_none"
    )]
    #[schemars(with = "Option<f64>")]
    pub emergence_max: Option<f64>,
    #[serde(
        default,
        deserialize_with = "lenient_f64",
        skip_serializing_if = "Option::is_none"
    )]
    #[schemars(with = "Option<f64>")]
    pub phase_min: Option<f64>,
    #[serde(
        default,
        deserialize_with = "lenient_f64",
        skip_serializing_if = "Option::is_none"
    )]
    #[schemars(with = "Option<f64>")]
    pub phase_max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instrument_host_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instrument_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measurement_type: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    #[schemars(with = "Option<String>")]
    pub processing_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modification_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_format: Option<String>,
    /// Estimated file size in kilobytes.
    #[serde(
        default,
        deserialize_with = "lenient_f64",
        skip_serializing_if = "Option::is_none"
    )]
    #[schemars(with = "Option<f64>")]
    pub access_estsize: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
}

// ---------------------------------------------------------------------------
// WFS schema
// ---------------------------------------------------------------------------

/// A WFS feature as returned by a GeoJSON `GetFeature` response.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct WfsFeature {
    /// Always `"Feature"` in well-formed responses.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub feature_type: Option<String>,
    /// Feature identifier; servers emit strings or numbers.
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    #[schemars(with = "Option<String>")]
    pub id: Option<String>,
    /// GeoJSON geometry; may be null or structurally invalid upstream.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<serde_json::Value>,
    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<Vec<f64>>,
}

// ---------------------------------------------------------------------------
// Raw records
// ---------------------------------------------------------------------------

/// A protocol-specific raw item record.
///
/// Transient: produced by an extractor's record stream, consumed by a
/// transformer or written verbatim into an extraction page artifact.
/// Serializes untagged — the artifact, not the record, carries the schema
/// tag, and parsing back is always schema-explicit via [`RawRecord::from_value`].
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum RawRecord {
    PdsOde(PdsOdeProduct),
    Epntap(EpntapGranule),
    Wfs(WfsFeature),
}

impl RawRecord {
    /// Schema this record is declared under.
    pub fn source_schema(&self) -> SourceSchema {
        match self {
            Self::PdsOde(_) => SourceSchema::PdsOde,
            Self::Epntap(_) => SourceSchema::Epntap,
            Self::Wfs(_) => SourceSchema::MarssiWfs,
        }
    }

    /// Parse a raw record of a known schema from its JSON form.
    ///
    /// The schema is explicit — no shape sniffing across protocols.
    pub fn from_value(schema: SourceSchema, value: serde_json::Value) -> Result<Self> {
        let record = match schema {
            SourceSchema::PdsOde => Self::PdsOde(
                serde_json::from_value(value)
                    .map_err(|e| HarvestError::schema_input(format!("PDSODE record: {e}")))?,
            ),
            SourceSchema::Epntap => Self::Epntap(
                serde_json::from_value(value)
                    .map_err(|e| HarvestError::schema_input(format!("EPNTAP record: {e}")))?,
            ),
            SourceSchema::MarssiWfs => Self::Wfs(
                serde_json::from_value(value)
                    .map_err(|e| HarvestError::schema_input(format!("MARSSI_WFS record: {e}")))?,
            ),
        };
        Ok(record)
    }
}

// ---------------------------------------------------------------------------
// Schema-doc lookup
// ---------------------------------------------------------------------------

/// Object kind within a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaObjectKind {
    Collection,
    Item,
}

impl std::str::FromStr for SchemaObjectKind {
    type Err = HarvestError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "collection" => Ok(Self::Collection),
            "item" => Ok(Self::Item),
            other => Err(HarvestError::schema_input(format!(
                "unknown schema object type `{other}` (expected `collection` or `item`)"
            ))),
        }
    }
}

/// Names of all known schemas, with the object kinds each defines.
pub fn schema_names() -> Vec<(&'static str, &'static [&'static str])> {
    vec![
        ("PDSODE", &["collection", "item"] as &[_]),
        ("EPNTAP", &["item"]),
        ("MARSSI_WFS", &["item"]),
        ("STAC", &["collection", "item"]),
    ]
}

/// JSON Schema document for a (schema name, object kind) pair.
///
/// Unknown names or kinds fail with a schema-input error rather than
/// returning an empty document.
pub fn schema_json(name: &str, kind: SchemaObjectKind) -> Result<String> {
    let schema = match (name, kind) {
        ("PDSODE", SchemaObjectKind::Collection) => schemars::schema_for!(PdsOdeIiptSet),
        ("PDSODE", SchemaObjectKind::Item) => schemars::schema_for!(PdsOdeProduct),
        ("EPNTAP", SchemaObjectKind::Item) => schemars::schema_for!(EpntapGranule),
        ("MARSSI_WFS", SchemaObjectKind::Item) => schemars::schema_for!(WfsFeature),
        ("STAC", SchemaObjectKind::Collection) => schemars::schema_for!(StacCollection),
        ("STAC", SchemaObjectKind::Item) => schemars::schema_for!(StacItem),
        _ => {
            return Err(HarvestError::schema_input(format!(
                "no schema defined for `{name}` {} objects",
                match kind {
                    SchemaObjectKind::Collection => "collection",
                    SchemaObjectKind::Item => "item",
                }
            )));
        }
    };
    serde_json::to_string_pretty(&schema)
        .map_err(|e| HarvestError::schema_input(format!("schema serialization failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iiptset_collection_id_and_targets() {
        let set: PdsOdeIiptSet = serde_json::from_str(
            r#"{
                "ODEMetaDB": "mars",
                "IHID": "MRO",
                "IID": "HIRISE",
                "PT": "RDRV11",
                "ValidTargets": {"ValidTarget": ["MARS", "PHOBOS"]},
                "ValidFootprints": "T",
                "NumberProducts": "12345"
            }"#,
        )
        .expect("deserialize IIPTSet");

        assert_eq!(set.collection_id(), "MRO_HIRISE_RDRV11");
        assert_eq!(set.targets(), vec!["mars", "MARS", "PHOBOS"]);
        assert_eq!(set.number_products, Some(12345.0));
    }

    #[test]
    fn valid_target_accepts_single_string() {
        let set: PdsOdeIiptSet = serde_json::from_str(
            r#"{
                "ODEMetaDB": "mars",
                "IHID": "ODY",
                "IID": "THEMIS",
                "PT": "VISGEO",
                "ValidTargets": {"ValidTarget": "MARS"},
                "NumberProducts": 42
            }"#,
        )
        .expect("deserialize IIPTSet");
        assert_eq!(set.targets(), vec!["mars", "MARS"]);
    }

    #[test]
    fn product_preserves_nested_files() {
        let product: PdsOdeProduct = serde_json::from_str(
            r#"{
                "Observation_id": "obs1",
                "Target_name": "Mars",
                "Product_files": {
                    "Product_file": [
                        {"FileName": "a.img", "KBytes": 10, "URL": "https://example.org/a.img"},
                        {"FileName": "a.lbl", "KBytes": "7", "Type": "Referenced"}
                    ]
                }
            }"#,
        )
        .expect("deserialize product");

        assert_eq!(product.observation_id.as_deref(), Some("obs1"));
        assert_eq!(product.product_files.product_file.len(), 2);
        assert_eq!(product.product_files.product_file[1].kbytes, Some(7.0));
        // Re-serialization keeps the nested wrapper intact.
        let json = serde_json::to_value(&product).unwrap();
        assert!(json["Product_files"]["Product_file"].is_array());
    }

    #[test]
    fn granule_lenient_numerics() {
        let granule: EpntapGranule = serde_json::from_str(
            r#"{
                "granule_uid": "g1",
                "c1min": "10.5",
                "c1max": 12,
                "processing_level": 3
            }"#,
        )
        .expect("deserialize granule");
        assert_eq!(granule.c1min, Some(10.5));
        assert_eq!(granule.c1max, Some(12.0));
        assert_eq!(granule.processing_level.as_deref(), Some("3"));
    }

    #[test]
    fn wfs_feature_numeric_id() {
        let feature: WfsFeature = serde_json::from_str(
            r#"{"type": "Feature", "id": 17, "geometry": null, "properties": {"name": "crater"}}"#,
        )
        .expect("deserialize feature");
        assert_eq!(feature.id.as_deref(), Some("17"));
        assert!(feature.geometry.is_none() || feature.geometry == Some(serde_json::Value::Null));
    }

    #[test]
    fn schema_lookup() {
        let doc = schema_json("PDSODE", SchemaObjectKind::Item).expect("schema doc");
        assert!(doc.contains("Product_files"));

        let err = schema_json("EPNTAP", SchemaObjectKind::Collection).unwrap_err();
        assert!(matches!(err, HarvestError::SchemaInput { .. }));

        let err = schema_json("NOPE", SchemaObjectKind::Item).unwrap_err();
        assert!(err.to_string().contains("NOPE"));
    }

    #[test]
    fn source_schema_tags() {
        assert_eq!(SourceSchema::MarssiWfs.as_str(), "MARSSI_WFS");
        let parsed: SourceSchema = serde_json::from_str("\"PDSODE\"").unwrap();
        assert_eq!(parsed, SourceSchema::PdsOde);
    }

    #[test]
    fn raw_record_from_value_is_schema_explicit() {
        let value = serde_json::json!({"granule_uid": "g1", "c1min": 10.0});
        let record = RawRecord::from_value(SourceSchema::Epntap, value).expect("parse granule");
        assert_eq!(record.source_schema(), SourceSchema::Epntap);

        // The same value under a schema whose required fields are absent fails.
        let value = serde_json::json!({"c1min": 10.0});
        let err = RawRecord::from_value(SourceSchema::Epntap, value).unwrap_err();
        assert!(matches!(err, HarvestError::SchemaInput { .. }));
    }
}
