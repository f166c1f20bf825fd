//! EPN-TAP granule → STAC item mapping.
//!
//! Field mapping:
//!
//! | Source                         | Target                          |
//! |--------------------------------|---------------------------------|
//! | `granule_uid`                  | `id`, title                     |
//! | `time_min` / `time_max` (JD)   | `start_datetime` / `end_datetime` |
//! | `s_region` (STC-S)             | `geometry` + `bbox`             |
//! | `instrument_host_name`         | `platform`                      |
//! | `instrument_name`              | `instruments`                   |
//! | `target_name`                  | `properties."ssys:targets"`     |
//! | angle min/max pairs            | `ssys:*` (mid-point)            |
//! | `processing_level`             | `properties."processing:level"` |
//! | `access_url` / `access_format` | `assets`                        |
//!
//! Every min/max pair is checked for ordering before mapping; an inverted
//! range is a schema-input error for the whole record.

use chrono::DateTime;
use tracing::warn;

use stacharvest_shared::schemas::EpntapGranule;
use stacharvest_shared::stac::{StacAsset, StacItem};
use stacharvest_shared::{HarvestError, Result};

use crate::geometry::{geometry_bounds, stcs_to_geojson};
use crate::{TransformContext, normalize_datetime, rfc3339};

/// Map one EPN-TAP granule row into a STAC item.
pub(crate) fn transform_granule(
    granule: &EpntapGranule,
    ctx: &TransformContext,
) -> Result<StacItem> {
    if granule.granule_uid.trim().is_empty() {
        return Err(HarvestError::schema_input(
            "granule record has an empty `granule_uid`",
        ));
    }
    let id = granule.granule_uid.as_str();

    check_range(id, "c1", granule.c1min, granule.c1max)?;
    check_range(id, "c2", granule.c2min, granule.c2max)?;
    check_range(id, "c3", granule.c3min, granule.c3max)?;
    check_range(id, "time", granule.time_min, granule.time_max)?;
    check_range(id, "incidence", granule.incidence_min, granule.incidence_max)?;
    check_range(id, "emergence", granule.emergence_min, granule.emergence_max)?;
    check_range(id, "phase", granule.phase_min, granule.phase_max)?;

    let mut item = StacItem::new(id);
    item.collection = Some(ctx.collection_id.clone());
    item.stac_extensions.push(crate::SSYS_EXTENSION.into());

    let start = granule.time_min.and_then(jd_to_rfc3339);
    let end = granule.time_max.and_then(jd_to_rfc3339);
    item.properties.datetime = start.clone().or_else(|| Some(rfc3339(ctx.extracted_at)));
    item.properties.start_datetime = start;
    item.properties.end_datetime = end;
    item.properties.created = granule.creation_date.as_deref().and_then(normalize_datetime);
    item.properties.updated = granule
        .modification_date
        .as_deref()
        .and_then(normalize_datetime);

    item.properties.title = Some(match granule.target_name.as_deref() {
        Some(target) => format!("{id} ({target})"),
        None => id.to_string(),
    });
    item.properties.platform = granule.instrument_host_name.clone();
    item.properties.instruments = granule
        .instrument_name
        .as_ref()
        .map(|name| vec![name.clone()]);
    item.properties.ssys_targets = granule.target_name.as_ref().map(|t| vec![t.clone()]);
    item.properties.ssys_incidence_angle = midpoint(granule.incidence_min, granule.incidence_max);
    item.properties.ssys_emission_angle = midpoint(granule.emergence_min, granule.emergence_max);
    item.properties.ssys_phase_angle = midpoint(granule.phase_min, granule.phase_max);
    if let Some(level) = &granule.processing_level {
        item.properties
            .extra
            .insert("processing:level".into(), serde_json::Value::from(level.clone()));
    }

    if let Some(s_region) = &granule.s_region {
        match stcs_to_geojson(s_region) {
            Some(geometry) => {
                item.bbox = geometry_bounds(&geometry);
                item.geometry = Some(geometry);
            }
            None => {
                warn!(id, "unparseable `s_region`, geometry omitted");
            }
        }
    }

    if let Some(url) = &granule.access_url {
        let key = granule
            .file_name
            .clone()
            .unwrap_or_else(|| "data".to_string());
        item.assets.insert(
            key,
            StacAsset {
                href: url.clone(),
                title: granule.file_name.clone(),
                description: None,
                media_type: granule.access_format.clone(),
                roles: Some(vec!["data".into()]),
            },
        );
    }

    Ok(item)
}

/// Reject inverted min/max pairs before any mapping happens.
fn check_range(id: &str, name: &str, min: Option<f64>, max: Option<f64>) -> Result<()> {
    if let (Some(min), Some(max)) = (min, max) {
        if min > max {
            return Err(HarvestError::schema_input(format!(
                "granule `{id}` has {name}min {min} > {name}max {max}"
            )));
        }
    }
    Ok(())
}

fn midpoint(min: Option<f64>, max: Option<f64>) -> Option<f64> {
    match (min, max) {
        (Some(min), Some(max)) => Some((min + max) / 2.0),
        (Some(v), None) | (None, Some(v)) => Some(v),
        (None, None) => None,
    }
}

/// Convert a Julian Date to an RFC 3339 UTC timestamp (millisecond precision).
fn jd_to_rfc3339(jd: f64) -> Option<String> {
    if !jd.is_finite() {
        return None;
    }
    // Unix epoch is JD 2440587.5.
    let millis = ((jd - 2440587.5) * 86_400_000.0).round();
    let dt = DateTime::from_timestamp_millis(millis as i64)?;
    Some(rfc3339(dt))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn ctx() -> TransformContext {
        TransformContext::new(
            "omega_cubes.epn_core",
            DateTime::parse_from_rfc3339("2023-06-01T00:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        )
    }

    fn valid_granule() -> EpntapGranule {
        EpntapGranule {
            granule_uid: "ORB0030_1".into(),
            obs_id: Some("ORB0030".into()),
            target_name: Some("Mars".into()),
            time_min: Some(2453033.02),
            time_max: Some(2453033.03),
            c1min: Some(12.1),
            c1max: Some(14.9),
            c2min: Some(-44.2),
            c2max: Some(-41.8),
            s_region: Some(
                "Polygon UNKNOWNFrame 12.1 -44.2 14.9 -44.2 14.9 -41.8 12.1 -41.8".into(),
            ),
            instrument_host_name: Some("Mars Express".into()),
            instrument_name: Some("OMEGA".into()),
            processing_level: Some("3".into()),
            access_url: Some("https://example.org/data/ORB0030_1.QUB".into()),
            access_format: Some("application/octet-stream".into()),
            file_name: Some("ORB0030_1.QUB".into()),
            ..Default::default()
        }
    }

    #[test]
    fn valid_granule_maps_and_validates() {
        let item = transform_granule(&valid_granule(), &ctx()).expect("transform");
        item.validate().expect("validates");

        assert_eq!(item.id, "ORB0030_1");
        assert_eq!(item.properties.title.as_deref(), Some("ORB0030_1 (Mars)"));
        assert_eq!(item.properties.platform.as_deref(), Some("Mars Express"));
        assert_eq!(
            item.properties.ssys_targets.as_deref(),
            Some(&["Mars".to_string()][..])
        );
        assert_eq!(
            item.properties.extra["processing:level"],
            serde_json::Value::from("3")
        );

        // JD 2453033.02 is 2004-01-28T12:28:48Z.
        assert_eq!(
            item.properties.start_datetime.as_deref(),
            Some("2004-01-28T12:28:48.000Z")
        );

        let bbox = item.bbox.as_deref().expect("bbox from s_region");
        assert_eq!(bbox, &[12.1, -44.2, 14.9, -41.8]);
        assert_eq!(item.assets["ORB0030_1.QUB"].href, "https://example.org/data/ORB0030_1.QUB");
    }

    #[test]
    fn inverted_c1_range_is_schema_input_error() {
        let granule = EpntapGranule {
            granule_uid: "g1".into(),
            c1min: Some(10.0),
            c1max: Some(5.0),
            ..Default::default()
        };
        let err = transform_granule(&granule, &ctx()).unwrap_err();
        assert!(matches!(err, HarvestError::SchemaInput { .. }));
        assert!(err.to_string().contains("c1min 10 > c1max 5"));
    }

    #[test]
    fn inverted_time_range_is_schema_input_error() {
        let granule = EpntapGranule {
            granule_uid: "g1".into(),
            time_min: Some(2453033.05),
            time_max: Some(2453033.02),
            ..Default::default()
        };
        assert!(transform_granule(&granule, &ctx()).is_err());
    }

    #[test]
    fn empty_uid_is_schema_input_error() {
        let granule = EpntapGranule {
            granule_uid: "  ".into(),
            ..Default::default()
        };
        let err = transform_granule(&granule, &ctx()).unwrap_err();
        assert!(err.to_string().contains("granule_uid"));
    }

    #[test]
    fn missing_times_fall_back_to_extraction_timestamp() {
        let granule = EpntapGranule {
            granule_uid: "g1".into(),
            ..Default::default()
        };
        let item = transform_granule(&granule, &ctx()).expect("transform");
        assert_eq!(
            item.properties.datetime.as_deref(),
            Some("2023-06-01T00:00:00.000Z")
        );
    }

    #[test]
    fn bad_s_region_drops_geometry_only() {
        let granule = EpntapGranule {
            s_region: Some("Circle ICRS 10 10 1".into()),
            ..valid_granule()
        };
        let item = transform_granule(&granule, &ctx()).expect("transform");
        assert!(item.geometry.is_none());
        assert!(item.bbox.is_none());
    }

    #[test]
    fn jd_conversion_epoch() {
        assert_eq!(
            jd_to_rfc3339(2440587.5).as_deref(),
            Some("1970-01-01T00:00:00.000Z")
        );
        assert!(jd_to_rfc3339(f64::NAN).is_none());
    }
}
