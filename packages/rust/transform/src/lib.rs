//! Transformer family: one mapping per (source schema, target schema) pair.
//!
//! A transformer is a pure mapping from a raw protocol record into a
//! validated STAC record. The field mapping per pair is a static table in the
//! protocol module — no fuzzy matching, no reflective field walking. Optional
//! source fields that are absent stay omitted in the target record.
//!
//! Failure policy: a record that cannot be mapped (missing required source
//! fields, inverted numeric ranges, schema mismatch) fails with
//! `HarvestError::SchemaInput` and produces no partial output. Footprints
//! that fail geometry parsing are dropped from the record with a warning
//! without invalidating the rest.

pub mod epntap;
pub mod geometry;
pub mod pdsode;
pub mod wfs;

use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use tracing::instrument;

use stacharvest_shared::schemas::{RawRecord, SourceSchema, TargetSchema};
use stacharvest_shared::stac::{
    STAC_VERSION, StacCollection, StacExtent, StacItem, StacProvider, StacSpatialExtent,
    StacTemporalExtent,
};
use stacharvest_shared::{HarvestError, Result, SourceCollection};

/// STAC solar-system extension declared on produced records.
pub const SSYS_EXTENSION: &str = "https://stac-extensions.github.io/ssys/v1.1.0/schema.json";

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Per-collection context threaded through item transforms.
#[derive(Debug, Clone)]
pub struct TransformContext {
    /// Collection the produced items belong to.
    pub collection_id: String,
    /// When the raw records were extracted; the datetime fallback for source
    /// records that carry no usable time field.
    pub extracted_at: DateTime<Utc>,
}

impl TransformContext {
    pub fn new(collection_id: impl Into<String>, extracted_at: DateTime<Utc>) -> Self {
        Self {
            collection_id: collection_id.into(),
            extracted_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Transformer selection
// ---------------------------------------------------------------------------

/// The closed set of (source schema → target schema) transformers.
///
/// Selection is a total static match: a pair outside this table is
/// unrepresentable, and a record whose schema does not match the selected
/// transformer fails per record with a schema-input error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transformer {
    PdsOdeToStac,
    EpntapToStac,
    WfsToStac,
}

impl Transformer {
    /// Select the transformer for a (source, target) schema pair.
    pub fn for_pair(source: SourceSchema, target: TargetSchema) -> Self {
        match (source, target) {
            (SourceSchema::PdsOde, TargetSchema::Stac) => Self::PdsOdeToStac,
            (SourceSchema::Epntap, TargetSchema::Stac) => Self::EpntapToStac,
            (SourceSchema::MarssiWfs, TargetSchema::Stac) => Self::WfsToStac,
        }
    }

    /// Source schema this transformer accepts.
    pub fn source_schema(&self) -> SourceSchema {
        match self {
            Self::PdsOdeToStac => SourceSchema::PdsOde,
            Self::EpntapToStac => SourceSchema::Epntap,
            Self::WfsToStac => SourceSchema::MarssiWfs,
        }
    }

    /// Target schema this transformer produces.
    pub fn target_schema(&self) -> TargetSchema {
        TargetSchema::Stac
    }

    /// Map one raw record into a validated STAC item.
    pub fn transform_item(&self, record: &RawRecord, ctx: &TransformContext) -> Result<StacItem> {
        let item = match (self, record) {
            (Self::PdsOdeToStac, RawRecord::PdsOde(product)) => {
                pdsode::transform_product(product, ctx)?
            }
            (Self::EpntapToStac, RawRecord::Epntap(granule)) => {
                epntap::transform_granule(granule, ctx)?
            }
            (Self::WfsToStac, RawRecord::Wfs(feature)) => wfs::transform_feature(feature, ctx)?,
            _ => {
                return Err(HarvestError::schema_input(format!(
                    "record schema `{}` does not match transformer source schema `{}`",
                    record.source_schema(),
                    self.source_schema()
                )));
            }
        };
        item.validate()?;
        Ok(item)
    }

    /// Map a source collection's metadata into a validated STAC collection.
    ///
    /// `extent` is the accumulated extent of the collection's transformed
    /// items; without one, the extent is the whole-body open interval.
    pub fn transform_collection(
        &self,
        collection: &SourceCollection,
        extent: Option<StacExtent>,
    ) -> Result<StacCollection> {
        if collection.source_schema != self.source_schema() {
            return Err(HarvestError::schema_input(format!(
                "collection schema `{}` does not match transformer source schema `{}`",
                collection.source_schema,
                self.source_schema()
            )));
        }

        let service = &collection.service;
        let providers: Vec<StacProvider> = service
            .providers
            .iter()
            .map(|p| StacProvider {
                name: p.name.clone(),
                description: p.description.clone(),
                roles: p
                    .roles
                    .as_ref()
                    .map(|roles| roles.iter().map(|r| r.as_str().to_string()).collect()),
                url: p.url.clone(),
            })
            .collect();

        let mut summaries = serde_json::Map::new();
        if !collection.targets.is_empty() {
            summaries.insert(
                "ssys:targets".into(),
                serde_json::Value::from(collection.targets.clone()),
            );
        }

        let stac_collection = StacCollection {
            collection_type: "Collection".into(),
            stac_version: STAC_VERSION.into(),
            stac_extensions: vec![SSYS_EXTENSION.into()],
            id: collection.collection_id.clone(),
            title: Some(format!(
                "{} ({})",
                collection.collection_id, service.title
            )),
            description: service.description.clone(),
            keywords: (!collection.targets.is_empty()).then(|| collection.targets.clone()),
            license: "proprietary".into(),
            providers: (!providers.is_empty()).then_some(providers),
            extent: extent.unwrap_or_else(default_extent),
            summaries: (!summaries.is_empty()).then_some(summaries),
            links: Vec::new(),
            assets: None,
        };
        stac_collection.validate()?;
        Ok(stac_collection)
    }

    /// File-level transform for record types that arrive as whole files
    /// (e.g. a product label): validate and copy to the destination.
    #[instrument(skip(self))]
    pub fn transform_source_file(&self, src: &Path, dst: &Path) -> Result<()> {
        let content =
            std::fs::read_to_string(src).map_err(|e| HarvestError::io(src, e))?;
        if content.trim().is_empty() {
            return Err(HarvestError::schema_input(format!(
                "source file `{}` is empty",
                src.display()
            )));
        }
        if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent).map_err(|e| HarvestError::io(parent, e))?;
        }
        std::fs::write(dst, content).map_err(|e| HarvestError::io(dst, e))?;
        Ok(())
    }
}

fn default_extent() -> StacExtent {
    StacExtent {
        spatial: StacSpatialExtent {
            bbox: vec![vec![-180.0, -90.0, 180.0, 90.0]],
        },
        temporal: StacTemporalExtent {
            interval: vec![vec![None, None]],
        },
    }
}

// ---------------------------------------------------------------------------
// Extent accumulation
// ---------------------------------------------------------------------------

/// Accumulates the spatial/temporal extent of a stream of transformed items,
/// one item at a time, for the collection-level record.
#[derive(Debug, Default)]
pub struct ExtentAccumulator {
    bbox: Option<[f64; 4]>,
    start: Option<String>,
    end: Option<String>,
}

impl ExtentAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one item into the running extent.
    pub fn observe(&mut self, item: &StacItem) {
        if let Some(bbox) = &item.bbox {
            if bbox.len() == 4 {
                match &mut self.bbox {
                    Some(b) => {
                        b[0] = b[0].min(bbox[0]);
                        b[1] = b[1].min(bbox[1]);
                        b[2] = b[2].max(bbox[2]);
                        b[3] = b[3].max(bbox[3]);
                    }
                    None => self.bbox = Some([bbox[0], bbox[1], bbox[2], bbox[3]]),
                }
            }
        }

        let start = item
            .properties
            .start_datetime
            .as_ref()
            .or(item.properties.datetime.as_ref());
        if let Some(start) = start {
            if self.start.as_ref().is_none_or(|s| start < s) {
                self.start = Some(start.clone());
            }
        }
        let end = item
            .properties
            .end_datetime
            .as_ref()
            .or(item.properties.datetime.as_ref());
        if let Some(end) = end {
            if self.end.as_ref().is_none_or(|e| end > e) {
                self.end = Some(end.clone());
            }
        }
    }

    /// Produce the collection extent; whole-body/open when nothing observed.
    pub fn finish(self) -> StacExtent {
        StacExtent {
            spatial: StacSpatialExtent {
                bbox: vec![
                    self.bbox
                        .map(|b| b.to_vec())
                        .unwrap_or_else(|| vec![-180.0, -90.0, 180.0, 90.0]),
                ],
            },
            temporal: StacTemporalExtent {
                interval: vec![vec![self.start, self.end]],
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Datetime normalization
// ---------------------------------------------------------------------------

/// Normalize the datetime spellings the source services use to RFC 3339 UTC.
pub(crate) fn normalize_datetime(value: &str) -> Option<String> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(
            dt.with_timezone(&Utc)
                .to_rfc3339_opts(SecondsFormat::Millis, true),
        );
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt.and_utc().to_rfc3339_opts(SecondsFormat::Millis, true));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(
            date.and_hms_opt(0, 0, 0)?
                .and_utc()
                .to_rfc3339_opts(SecondsFormat::Millis, true),
        );
    }
    None
}

/// RFC 3339 spelling of a UTC timestamp, as used for fallback datetimes.
pub(crate) fn rfc3339(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stacharvest_shared::schemas::{EpntapGranule, PdsOdeProduct};
    use stacharvest_shared::{ExternalService, ExternalServiceType};

    fn ctx() -> TransformContext {
        TransformContext::new(
            "MRO_HIRISE_RDRV11",
            DateTime::parse_from_rfc3339("2023-06-01T00:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        )
    }

    fn pdsode_service() -> ExternalService {
        ExternalService {
            title: "PDS ODE API".into(),
            description: "PDS Orbital Data Explorer REST interface".into(),
            providers: vec![],
            service_type: ExternalServiceType::PdsOde,
            url: "https://example.org/ode".parse().unwrap(),
            ping_url: None,
            ssys_targets: Some(vec!["Mars".into()]),
            extra_params: serde_json::Map::new(),
        }
    }

    #[test]
    fn selection_is_a_static_table() {
        assert_eq!(
            Transformer::for_pair(SourceSchema::PdsOde, TargetSchema::Stac),
            Transformer::PdsOdeToStac
        );
        let transformer = Transformer::for_pair(SourceSchema::MarssiWfs, TargetSchema::Stac);
        assert_eq!(transformer.source_schema(), SourceSchema::MarssiWfs);
        assert_eq!(transformer.target_schema(), TargetSchema::Stac);
    }

    #[test]
    fn mismatched_record_schema_is_rejected() {
        let transformer = Transformer::for_pair(SourceSchema::PdsOde, TargetSchema::Stac);
        let record = RawRecord::Epntap(EpntapGranule {
            granule_uid: "g1".into(),
            ..Default::default()
        });
        let err = transformer.transform_item(&record, &ctx()).unwrap_err();
        assert!(matches!(err, HarvestError::SchemaInput { .. }));
        assert!(err.to_string().contains("EPNTAP"));
    }

    #[test]
    fn mismatched_collection_schema_is_rejected() {
        let transformer = Transformer::for_pair(SourceSchema::Epntap, TargetSchema::Stac);
        let collection = SourceCollection::new(
            "MRO_HIRISE_RDRV11",
            pdsode_service(),
            Some(4),
            vec!["mars".into()],
        );
        let err = transformer.transform_collection(&collection, None).unwrap_err();
        assert!(matches!(err, HarvestError::SchemaInput { .. }));
    }

    #[test]
    fn collection_transform_carries_service_metadata() {
        let transformer = Transformer::for_pair(SourceSchema::PdsOde, TargetSchema::Stac);
        let collection = SourceCollection::new(
            "MRO_HIRISE_RDRV11",
            pdsode_service(),
            Some(4),
            vec!["mars".into()],
        );
        let stac = transformer
            .transform_collection(&collection, None)
            .expect("collection transform");
        assert_eq!(stac.id, "MRO_HIRISE_RDRV11");
        assert!(stac.title.as_deref().unwrap().contains("PDS ODE API"));
        assert_eq!(stac.extent.temporal.interval[0], vec![None, None]);
        assert_eq!(stac.keywords.as_deref(), Some(&["mars".to_string()][..]));
    }

    #[test]
    fn idempotent_item_transform() {
        let transformer = Transformer::for_pair(SourceSchema::PdsOde, TargetSchema::Stac);
        let record = RawRecord::PdsOde(PdsOdeProduct {
            observation_id: Some("obs1".into()),
            target_name: Some("Mars".into()),
            utc_start_time: Some("2007-03-25T10:15:32.733".into()),
            ..Default::default()
        });
        let a = transformer.transform_item(&record, &ctx()).unwrap();
        let b = transformer.transform_item(&record, &ctx()).unwrap();
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn extent_accumulates_items() {
        let mut accumulator = ExtentAccumulator::new();

        let mut item = StacItem::new("a");
        item.properties.datetime = Some("2007-03-25T10:15:32.733Z".into());
        item.bbox = Some(vec![10.0, -5.0, 12.0, -3.0]);
        accumulator.observe(&item);

        let mut item = StacItem::new("b");
        item.properties.datetime = Some("2006-01-01T00:00:00.000Z".into());
        item.bbox = Some(vec![8.0, -4.0, 11.0, -1.0]);
        accumulator.observe(&item);

        let extent = accumulator.finish();
        assert_eq!(extent.spatial.bbox[0], vec![8.0, -5.0, 12.0, -1.0]);
        assert_eq!(
            extent.temporal.interval[0][0].as_deref(),
            Some("2006-01-01T00:00:00.000Z")
        );
        assert_eq!(
            extent.temporal.interval[0][1].as_deref(),
            Some("2007-03-25T10:15:32.733Z")
        );
    }

    #[test]
    fn datetime_normalization_spellings() {
        assert_eq!(
            normalize_datetime("2007-03-25T10:15:32.733").as_deref(),
            Some("2007-03-25T10:15:32.733Z")
        );
        assert_eq!(
            normalize_datetime("2008-09-12T07:14:11Z").as_deref(),
            Some("2008-09-12T07:14:11.000Z")
        );
        assert_eq!(
            normalize_datetime("2006-01-01").as_deref(),
            Some("2006-01-01T00:00:00.000Z")
        );
        assert!(normalize_datetime("N/A").is_none());
    }

    #[test]
    fn source_file_transform_copies_valid_labels() {
        let dir = std::env::temp_dir().join(format!("sh-transform-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let src = dir.join("label.lbl");
        let dst = dir.join("out/label.lbl");
        std::fs::write(&src, "PDS_VERSION_ID = PDS3\nEND\n").unwrap();

        let transformer = Transformer::for_pair(SourceSchema::PdsOde, TargetSchema::Stac);
        transformer
            .transform_source_file(&src, &dst)
            .expect("copy label");
        assert!(dst.is_file());

        // An empty source file fails validation and writes nothing.
        let empty = dir.join("empty.lbl");
        std::fs::write(&empty, "  \n").unwrap();
        let err = transformer
            .transform_source_file(&empty, &dir.join("out/empty.lbl"))
            .unwrap_err();
        assert!(matches!(err, HarvestError::SchemaInput { .. }));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
