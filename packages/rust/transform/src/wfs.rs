//! WFS feature → STAC item mapping.
//!
//! Field mapping:
//!
//! | Source                                   | Target                      |
//! |------------------------------------------|-----------------------------|
//! | feature `id` / `properties.product_id`   | `id` (first present)        |
//! | `geometry` (validated GeoJSON)           | `geometry` + `bbox`         |
//! | `properties.datetime|date|timestamp`     | `datetime`                  |
//! | `properties.product_id|name|title`       | title                       |
//! | `properties.instrument`                  | `instruments`               |
//! | `properties.target`                      | `properties."ssys:targets"` |
//! | `properties.data_url|url`                | `assets.data`               |
//!
//! A feature whose geometry is missing or structurally invalid still
//! transforms; the geometry is omitted with a warning (the target schema does
//! not require one).

use tracing::warn;

use stacharvest_shared::schemas::WfsFeature;
use stacharvest_shared::stac::{StacAsset, StacItem};
use stacharvest_shared::{HarvestError, Result};

use crate::geometry::{geometry_bounds, is_valid_geometry};
use crate::{TransformContext, normalize_datetime, rfc3339};

/// Property keys probed, in order, for the item datetime.
const DATETIME_KEYS: [&str; 4] = ["datetime", "date", "timestamp", "acquisition_date"];

/// Property keys probed, in order, for the item title.
const TITLE_KEYS: [&str; 3] = ["product_id", "name", "title"];

/// Property keys probed, in order, for the data asset href.
const DATA_URL_KEYS: [&str; 2] = ["data_url", "url"];

/// Map one WFS feature into a STAC item.
pub(crate) fn transform_feature(feature: &WfsFeature, ctx: &TransformContext) -> Result<StacItem> {
    let id = feature
        .id
        .clone()
        .or_else(|| string_property(feature, "product_id"))
        .or_else(|| string_property(feature, "id"))
        .ok_or_else(|| HarvestError::schema_input("feature record has no identifier"))?;

    let mut item = StacItem::new(&id);
    item.collection = Some(ctx.collection_id.clone());
    item.stac_extensions.push(crate::SSYS_EXTENSION.into());

    match &feature.geometry {
        Some(geometry) if is_valid_geometry(geometry) => {
            item.bbox = geometry_bounds(geometry);
            item.geometry = Some(geometry.clone());
        }
        Some(_) => {
            warn!(id, "invalid feature geometry, omitted from item");
        }
        None => {}
    }

    item.properties.datetime = DATETIME_KEYS
        .iter()
        .find_map(|key| string_property(feature, key))
        .and_then(|value| normalize_datetime(&value))
        .or_else(|| Some(rfc3339(ctx.extracted_at)));

    item.properties.title = TITLE_KEYS
        .iter()
        .find_map(|key| string_property(feature, key));
    item.properties.instruments = string_property(feature, "instrument").map(|i| vec![i]);
    item.properties.ssys_targets = string_property(feature, "target").map(|t| vec![t]);

    if let Some(url) = DATA_URL_KEYS
        .iter()
        .find_map(|key| string_property(feature, key))
    {
        item.assets.insert(
            "data".into(),
            StacAsset {
                href: url,
                title: item.properties.title.clone(),
                description: None,
                media_type: None,
                roles: Some(vec!["data".into()]),
            },
        );
    }

    Ok(item)
}

/// A string-valued feature property, with numbers stringified.
fn string_property(feature: &WfsFeature, key: &str) -> Option<String> {
    match feature.properties.get(key)? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
