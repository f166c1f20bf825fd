//! WFS extractor.
//!
//! Issues `GetFeature` queries with GeoJSON output against registry-declared
//! layers (`extra_params.layers`, comma-separated). Pagination uses the WFS
//! 2.0 `startIndex`/`count` parameters, bounded by the server's
//! `numberMatched` when reported. Features with missing or structurally
//! invalid geometry are kept — the transformer decides what to drop.

use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use stacharvest_shared::config::ExtractConfig;
use stacharvest_shared::schemas::WfsFeature;
use stacharvest_shared::{ExternalService, ExternalServiceType, HarvestError, Result, SourceCollection};

use crate::{Extraction, Page, Pager, RawRecord, RecordStream, build_client, check_service_type, get_json};

// ---------------------------------------------------------------------------
// Response shape
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FeatureCollectionResponse {
    #[serde(default)]
    features: Vec<WfsFeature>,
    /// Servers report a number or the string `"unknown"`.
    #[serde(default, rename = "numberMatched")]
    number_matched: Option<serde_json::Value>,
}

impl FeatureCollectionResponse {
    fn matched(&self) -> Option<u64> {
        match &self.number_matched {
            Some(serde_json::Value::Number(n)) => n.as_u64(),
            Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

/// Extractor bound to one WFS service.
pub struct WfsExtractor {
    service: ExternalService,
    client: Client,
    page_size: u64,
    max_items: Option<u64>,
}

impl WfsExtractor {
    /// Bind to a service; fails if the service does not declare `WFS`.
    pub fn new(service: ExternalService, options: &ExtractConfig) -> Result<Self> {
        check_service_type(&service, ExternalServiceType::Wfs)?;
        Ok(Self {
            service,
            client: build_client(options)?,
            page_size: options.page_size,
            max_items: options.max_items,
        })
    }

    fn layers(&self) -> Result<Vec<String>> {
        let layers: Vec<String> = self
            .service
            .extra_param("layers")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect();
        if layers.is_empty() {
            return Err(HarvestError::Extraction(format!(
                "service `{}` declares no `layers` extra param",
                self.service.title
            )));
        }
        Ok(layers)
    }

    /// Enumerate collections: one per registry-declared layer.
    pub async fn service_collections(&self) -> Result<Vec<SourceCollection>> {
        let targets = self.service.ssys_targets.clone().unwrap_or_default();
        Ok(self
            .layers()?
            .into_iter()
            .map(|layer| SourceCollection::new(layer, self.service.clone(), None, targets.clone()))
            .collect())
    }

    /// Start extracting one layer's features.
    pub async fn extract(&self, collection_id: &str) -> Result<Extraction> {
        let collections = self.service_collections().await?;
        let collection = collections
            .into_iter()
            .find(|c| c.collection_id == collection_id)
            .ok_or_else(|| {
                HarvestError::Extraction(format!(
                    "layer `{collection_id}` not declared by `{}`",
                    self.service.title
                ))
            })?;

        let pager = WfsPager {
            client: self.client.clone(),
            url: self.service.url.to_string(),
            layer: collection.collection_id.clone(),
            start_index: 0,
            count: self.page_size,
            number_matched: None,
        };

        Ok(Extraction {
            collection,
            records: RecordStream::new(Pager::Wfs(pager), self.max_items),
        })
    }
}

// ---------------------------------------------------------------------------
// Pager
// ---------------------------------------------------------------------------

/// `startIndex`/`count` cursor over a WFS layer.
pub(crate) struct WfsPager {
    client: Client,
    url: String,
    layer: String,
    start_index: u64,
    count: u64,
    /// Total reported by the server on the first page, when numeric.
    number_matched: Option<u64>,
}

impl WfsPager {
    pub(crate) async fn next_page(&mut self) -> Result<Page> {
        if self
            .number_matched
            .is_some_and(|matched| self.start_index >= matched)
        {
            return Ok(Page {
                records: Vec::new(),
                has_more: false,
            });
        }

        let query = [
            ("service", "WFS".to_string()),
            ("version", "2.0.0".to_string()),
            ("request", "GetFeature".to_string()),
            ("typeNames", self.layer.clone()),
            ("outputFormat", "application/json".to_string()),
            ("startIndex", self.start_index.to_string()),
            ("count", self.count.to_string()),
        ];
        let body = get_json(&self.client, &self.url, &query).await?;
        let response: FeatureCollectionResponse = serde_json::from_value(body).map_err(|e| {
            HarvestError::Extraction(format!(
                "{}: GetFeature response not conform to expected model: {e}",
                self.url
            ))
        })?;

        if self.number_matched.is_none() {
            self.number_matched = response.matched();
            debug!(layer = %self.layer, matched = ?self.number_matched, "feature count reported");
        }

        let records: Vec<RawRecord> = response.features.into_iter().map(RawRecord::Wfs).collect();
        let fetched = records.len() as u64;
        self.start_index += fetched;
        let has_more = fetched == self.count
            && fetched > 0
            && self
                .number_matched
                .is_none_or(|matched| self.start_index < matched);

        Ok(Page { records, has_more })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_options(page_size: u64) -> ExtractConfig {
        ExtractConfig {
            page_size,
            max_items: None,
            timeout_secs: 5,
        }
    }

    fn test_service(url: &str) -> ExternalService {
        let mut extra_params = serde_json::Map::new();
        extra_params.insert(
            "layers".into(),
            serde_json::Value::String("ctx, hirise_rdr".into()),
        );
        ExternalService {
            title: "MarsSI WFS".into(),
            description: "test".into(),
            providers: vec![],
            service_type: ExternalServiceType::Wfs,
            url: url.parse().unwrap(),
            ping_url: None,
            ssys_targets: Some(vec!["Mars".into()]),
            extra_params,
        }
    }

    #[tokio::test]
    async fn wrong_service_type_is_rejected() {
        let mut service = test_service("https://example.org/wfs");
        service.service_type = ExternalServiceType::PdsOde;
        let err = WfsExtractor::new(service, &test_options(100)).unwrap_err();
        assert!(matches!(err, HarvestError::UnsupportedServiceType { .. }));
    }

    #[tokio::test]
    async fn collections_come_from_declared_layers() {
        let extractor =
            WfsExtractor::new(test_service("https://example.org/wfs"), &test_options(100)).unwrap();
        let collections = extractor.service_collections().await.expect("enumerate");

        let ids: Vec<&str> = collections
            .iter()
            .map(|c| c.collection_id.as_str())
            .collect();
        assert_eq!(ids, vec!["ctx", "hirise_rdr"]);
        assert_eq!(collections[0].n_items, None);
    }

    #[tokio::test]
    async fn missing_layers_param_fails() {
        let mut service = test_service("https://example.org/wfs");
        service.extra_params.clear();
        let extractor = WfsExtractor::new(service, &test_options(100)).unwrap();
        let err = extractor.service_collections().await.unwrap_err();
        assert!(err.to_string().contains("layers"));
    }

    #[tokio::test]
    async fn unknown_layer_fails_extraction() {
        let extractor =
            WfsExtractor::new(test_service("https://example.org/wfs"), &test_options(100)).unwrap();
        let err = extractor.extract("craters").await.unwrap_err();
        assert!(matches!(err, HarvestError::Extraction(_)));
    }

    #[tokio::test]
    async fn features_page_until_number_matched() {
        let server = MockServer::start().await;

        let page1 = r#"{
            "type": "FeatureCollection",
            "numberMatched": 3,
            "features": [
                {"type": "Feature", "id": "ctx.1", "geometry": null, "properties": {"datetime": "2008-09-12T07:14:11Z"}},
                {"type": "Feature", "id": "ctx.2", "geometry": {"type": "Point", "coordinates": [1.0, 2.0]}, "properties": {}}
            ]
        }"#;
        let page2 = r#"{
            "type": "FeatureCollection",
            "numberMatched": 3,
            "features": [
                {"type": "Feature", "id": "ctx.3", "geometry": {"type": "Polygon", "coordinates": []}, "properties": {}}
            ]
        }"#;

        Mock::given(method("GET"))
            .and(query_param("request", "GetFeature"))
            .and(query_param("typeNames", "ctx"))
            .and(query_param("startIndex", "0"))
            .and(query_param("count", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page1))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("request", "GetFeature"))
            .and(query_param("startIndex", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page2))
            .expect(1)
            .mount(&server)
            .await;

        let extractor = WfsExtractor::new(test_service(&server.uri()), &test_options(2)).unwrap();
        let mut stream = extractor.extract("ctx").await.expect("extract").records;

        let mut ids = Vec::new();
        while let Some(record) = stream.next_record().await.expect("record") {
            let RawRecord::Wfs(feature) = record else {
                panic!("wrong variant");
            };
            ids.push(feature.id.unwrap_or_default());
        }
        // All three features are yielded, including the null-geometry one.
        assert_eq!(ids, vec!["ctx.1", "ctx.2", "ctx.3"]);
    }

    #[tokio::test]
    async fn fixture_page_parses_with_degenerate_geometries() {
        let server = MockServer::start().await;
        let body = std::fs::read_to_string("../../../fixtures/records/wfs-features-page.json")
            .expect("read features fixture");

        Mock::given(method("GET"))
            .and(query_param("request", "GetFeature"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let extractor = WfsExtractor::new(test_service(&server.uri()), &test_options(10)).unwrap();
        let mut stream = extractor.extract("ctx").await.expect("extract").records;

        let mut count = 0;
        while stream.next_record().await.expect("record").is_some() {
            count += 1;
        }
        assert_eq!(count, 3);
    }
}
