//! Footprint parsing and bbox helpers.
//!
//! Source services describe footprints as WKT (PDS-ODE) or STC-S strings
//! (EPN-TAP `s_region`). Both are converted to GeoJSON geometry values;
//! parse failures return `None` so callers can drop the footprint without
//! failing the record.

use serde_json::{Value, json};

/// Parse a WKT `POINT`, `POLYGON` or `MULTIPOLYGON` into GeoJSON.
pub fn wkt_to_geojson(wkt: &str) -> Option<Value> {
    let trimmed = wkt.trim();
    let upper = trimmed.to_uppercase();

    if let Some(rest) = upper.strip_prefix("POINT") {
        let inner = strip_parens(rest.trim())?;
        let point = parse_position(inner)?;
        return Some(json!({"type": "Point", "coordinates": point}));
    }
    if upper.starts_with("MULTIPOLYGON") {
        let body = trimmed["MULTIPOLYGON".len()..].trim();
        let rings_groups = split_groups(strip_parens(body)?)?;
        let mut polygons = Vec::new();
        for group in rings_groups {
            polygons.push(parse_polygon_rings(&group)?);
        }
        if polygons.is_empty() {
            return None;
        }
        return Some(json!({"type": "MultiPolygon", "coordinates": polygons}));
    }
    if upper.starts_with("POLYGON") {
        let body = trimmed["POLYGON".len()..].trim();
        let rings = parse_polygon_rings(strip_parens(body)?)?;
        return Some(json!({"type": "Polygon", "coordinates": rings}));
    }
    None
}

/// Parse an STC-S polygon string (`Polygon [frame] x1 y1 x2 y2 ...`) into a
/// closed GeoJSON polygon.
pub fn stcs_to_geojson(s_region: &str) -> Option<Value> {
    let mut tokens = s_region.split_whitespace().peekable();
    let shape = tokens.next()?;
    if !shape.eq_ignore_ascii_case("polygon") {
        return None;
    }

    // An optional frame token (e.g. `UNKNOWNFrame`, `ICRS`) precedes the
    // coordinate list.
    if tokens.peek().is_some_and(|t| t.parse::<f64>().is_err()) {
        tokens.next();
    }

    let coords: Vec<f64> = tokens.map(|t| t.parse::<f64>().ok()).collect::<Option<_>>()?;
    if coords.len() < 6 || coords.len() % 2 != 0 {
        return None;
    }

    let mut ring: Vec<Vec<f64>> = coords.chunks(2).map(|c| vec![c[0], c[1]]).collect();
    if ring.first() != ring.last() {
        let first = ring[0].clone();
        ring.push(first);
    }
    Some(json!({"type": "Polygon", "coordinates": [ring]}))
}

/// Structural validity check for a GeoJSON geometry value: a known type tag
/// and non-empty coordinates.
pub fn is_valid_geometry(geometry: &Value) -> bool {
    let Some(kind) = geometry.get("type").and_then(|t| t.as_str()) else {
        return false;
    };
    const KNOWN: [&str; 6] = [
        "Point",
        "MultiPoint",
        "LineString",
        "MultiLineString",
        "Polygon",
        "MultiPolygon",
    ];
    if !KNOWN.contains(&kind) {
        return false;
    }
    geometry
        .get("coordinates")
        .and_then(|c| c.as_array())
        .is_some_and(|c| !c.is_empty())
}

/// Compute the `[west, south, east, north]` bounds of a GeoJSON geometry.
pub fn geometry_bounds(geometry: &Value) -> Option<Vec<f64>> {
    let coordinates = geometry.get("coordinates")?;
    let mut bounds: Option<[f64; 4]> = None;
    collect_bounds(coordinates, &mut bounds);
    bounds.map(|b| b.to_vec())
}

fn collect_bounds(value: &Value, bounds: &mut Option<[f64; 4]>) {
    let Some(array) = value.as_array() else {
        return;
    };
    // A position is an array of numbers; anything else nests deeper.
    if array.len() >= 2 && array.iter().all(|v| v.is_number()) {
        let x = array[0].as_f64().unwrap_or(f64::NAN);
        let y = array[1].as_f64().unwrap_or(f64::NAN);
        if x.is_nan() || y.is_nan() {
            return;
        }
        match bounds {
            Some(b) => {
                b[0] = b[0].min(x);
                b[1] = b[1].min(y);
                b[2] = b[2].max(x);
                b[3] = b[3].max(y);
            }
            None => *bounds = Some([x, y, x, y]),
        }
        return;
    }
    for item in array {
        collect_bounds(item, bounds);
    }
}

// ---------------------------------------------------------------------------
// WKT parsing internals
// ---------------------------------------------------------------------------

/// Strip one level of balanced outer parentheses.
fn strip_parens(s: &str) -> Option<&str> {
    let s = s.trim();
    let inner = s.strip_prefix('(')?.strip_suffix(')')?;
    Some(inner.trim())
}

/// Split a parenthesized group list `(..), (..)` at depth zero.
fn split_groups(s: &str) -> Option<Vec<String>> {
    let mut groups = Vec::new();
    let mut depth = 0usize;
    let mut start = None;
    for (i, ch) in s.char_indices() {
        match ch {
            '(' => {
                if depth == 0 {
                    start = Some(i + 1);
                }
                depth += 1;
            }
            ')' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    groups.push(s[start?..i].to_string());
                    start = None;
                }
            }
            _ => {}
        }
    }
    if depth != 0 || groups.is_empty() {
        return None;
    }
    Some(groups)
}

/// Parse `(x y, x y, ...), (...)` ring groups into GeoJSON ring arrays.
fn parse_polygon_rings(s: &str) -> Option<Vec<Vec<Vec<f64>>>> {
    let ring_strs = if s.contains('(') {
        split_groups(s)?
    } else {
        vec![s.to_string()]
    };

    let mut rings = Vec::new();
    for ring_str in ring_strs {
        let mut ring = Vec::new();
        for pos in ring_str.split(',') {
            ring.push(parse_position(pos)?);
        }
        if ring.len() < 4 {
            return None;
        }
        rings.push(ring);
    }
    Some(rings)
}

/// Parse a `x y` pair.
fn parse_position(s: &str) -> Option<Vec<f64>> {
    let mut parts = s.split_whitespace();
    let x = parts.next()?.parse::<f64>().ok()?;
    let y = parts.next()?.parse::<f64>().ok()?;
    Some(vec![x, y])
}
