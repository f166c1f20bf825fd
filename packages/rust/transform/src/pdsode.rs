//! PDS-ODE product → STAC item mapping.
//!
//! Field mapping:
//!
//! | Source                                  | Target                        |
//! |-----------------------------------------|-------------------------------|
//! | `Observation_id` / `pdsid` / `ode_id`   | `id` (first present)          |
//! | `Target_name`                           | `properties."ssys:targets"`, title |
//! | `UTC_start_time` / `UTC_stop_time`      | `start_datetime` / `end_datetime` |
//! | `ihid` / `iid`                          | `platform` / `instruments`, `mission` |
//! | `Solar_longitude`, angle fields         | `ssys:*` properties           |
//! | `Map_scale`                             | `gsd`                         |
//! | `Footprint_C0_geometry` (WKT)           | `geometry` + `bbox`           |
//! | `Product_files.Product_file[]`          | `assets` (one per file)       |
//! | `External_url`                          | `links` (rel `via`)           |

use tracing::warn;

use stacharvest_shared::schemas::{PdsOdeProduct, PdsOdeProductFile};
use stacharvest_shared::stac::{StacAsset, StacItem, StacLink};
use stacharvest_shared::{HarvestError, Result};

use crate::geometry::{geometry_bounds, wkt_to_geojson};
use crate::{TransformContext, normalize_datetime, rfc3339};

/// Map one ODE product record into a STAC item.
pub(crate) fn transform_product(
    product: &PdsOdeProduct,
    ctx: &TransformContext,
) -> Result<StacItem> {
    let id = product
        .observation_id
        .as_deref()
        .or(product.pdsid.as_deref())
        .or(product.ode_id.as_deref())
        .ok_or_else(|| {
            HarvestError::schema_input(
                "product record has no identifier (`Observation_id`, `pdsid` or `ode_id`)",
            )
        })?;

    let target = product.target_name.as_deref().ok_or_else(|| {
        HarvestError::schema_input(format!("product `{id}` is missing required `Target_name`"))
    })?;

    let mut item = StacItem::new(id);
    item.collection = Some(ctx.collection_id.clone());
    item.stac_extensions.push(crate::SSYS_EXTENSION.into());

    // Time: observation start, then mid-point, then creation time; the
    // extraction timestamp keeps validation fail-closed when all are absent.
    let start = product.utc_start_time.as_deref().and_then(normalize_datetime);
    let end = product.utc_stop_time.as_deref().and_then(normalize_datetime);
    item.properties.datetime = start
        .clone()
        .or_else(|| {
            product
                .observation_time
                .as_deref()
                .and_then(normalize_datetime)
        })
        .or_else(|| {
            product
                .product_creation_time
                .as_deref()
                .and_then(normalize_datetime)
        })
        .or_else(|| Some(rfc3339(ctx.extracted_at)));
    item.properties.start_datetime = start;
    item.properties.end_datetime = end;
    item.properties.created = product
        .product_creation_time
        .as_deref()
        .and_then(normalize_datetime);
    item.properties.updated = product
        .product_release_date
        .as_deref()
        .and_then(normalize_datetime);

    item.properties.title = Some(match product.iid.as_deref() {
        Some(iid) => format!("{iid} observation of {target}"),
        None => format!("Observation of {target}"),
    });
    item.properties.description = product.description.clone();
    item.properties.platform = product.ihid.clone();
    item.properties.mission = product.ihid.clone();
    item.properties.instruments = product.iid.as_ref().map(|iid| vec![iid.clone()]);
    item.properties.gsd = product.map_scale;
    item.properties.ssys_targets = Some(vec![target.to_string()]);
    item.properties.ssys_solar_longitude = product.solar_longitude;
    item.properties.ssys_incidence_angle = product.incidence_angle;
    item.properties.ssys_emission_angle = product.emission_angle;
    item.properties.ssys_phase_angle = product.phase_angle;

    // Footprint: prefer the −180..180 cylindrical geometry; a failed parse
    // drops the footprint, not the record.
    let wkt = product
        .footprint_c0_geometry
        .as_deref()
        .or(product.footprint_gl_geometry.as_deref());
    if let Some(wkt) = wkt {
        match wkt_to_geojson(wkt) {
            Some(geometry) => {
                item.bbox = geometry_bounds(&geometry);
                item.geometry = Some(geometry);
            }
            None => {
                warn!(id, "unparseable footprint WKT, geometry omitted");
            }
        }
    }

    for file in &product.product_files.product_file {
        item.assets
            .insert(file.file_name.clone(), file_asset(file));
    }
    if let Some(url) = &product.product_url {
        item.assets.entry("product".into()).or_insert(StacAsset {
            href: url.clone(),
            title: Some("Product data".into()),
            description: None,
            media_type: media_type_for(url),
            roles: Some(vec!["data".into()]),
        });
    }
    if let Some(url) = &product.label_url {
        item.assets.entry("label".into()).or_insert(StacAsset {
            href: url.clone(),
            title: Some("Product label".into()),
            description: None,
            media_type: Some("text/plain".into()),
            roles: Some(vec!["metadata".into()]),
        });
    }

    if let Some(url) = &product.external_url {
        item.links.push(StacLink {
            href: url.clone(),
            rel: "via".into(),
            media_type: Some("text/html".into()),
            title: None,
        });
    }

    Ok(item)
}

/// Asset entry for one attached product file.
fn file_asset(file: &PdsOdeProductFile) -> StacAsset {
    StacAsset {
        href: file
            .url
            .clone()
            .unwrap_or_else(|| file.file_name.clone()),
        title: file.description.clone(),
        description: None,
        media_type: media_type_for(&file.file_name),
        roles: roles_for(file.file_type.as_deref()),
    }
}

/// STAC asset roles for an ODE file type tag.
fn roles_for(file_type: Option<&str>) -> Option<Vec<String>> {
    let role = match file_type?.to_ascii_lowercase().as_str() {
        "product" => "data",
        "label" => "metadata",
        "referenced" => "metadata",
        "browse" => "overview",
        _ => return None,
    };
    Some(vec![role.to_string()])
}

/// Best-effort media type from a file name extension.
fn media_type_for(file_name: &str) -> Option<String> {
    let lower = file_name.to_ascii_lowercase();
    let media_type = if lower.ends_with(".jp2") {
        "image/jp2"
    } else if lower.ends_with(".img") || lower.ends_with(".qub") || lower.ends_with(".cub") {
        "application/octet-stream"
    } else if lower.ends_with(".lbl") || lower.ends_with(".cat") || lower.ends_with(".txt") {
        "text/plain"
    } else if lower.ends_with(".xml") {
        "application/xml"
    } else if lower.ends_with(".png") {
        "image/png"
    } else if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
        "image/jpeg"
    } else if lower.ends_with(".tif") || lower.ends_with(".tiff") {
        "image/tiff"
    } else {
        return None;
    };
    Some(media_type.to_string())
}
