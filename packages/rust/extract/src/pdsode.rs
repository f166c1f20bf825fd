//! PDS-ODE (Orbital Data Explorer) extractor.
//!
//! Two-phase protocol: collection-level metadata comes from a `query=iipy`
//! call enumerating (instrument host, instrument, product type) sets; item
//! records come from `query=product` calls paged with an offset/limit cursor.

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use stacharvest_shared::config::ExtractConfig;
use stacharvest_shared::schemas::{OneOrMany, PdsOdeIiptSet, PdsOdeProduct};
use stacharvest_shared::{ExternalService, ExternalServiceType, HarvestError, Result, SourceCollection};

use crate::{Extraction, Page, Pager, RawRecord, RecordStream, build_client, check_service_type, get_json};

// ---------------------------------------------------------------------------
// Response shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct IipyResponse {
    #[serde(rename = "ODEResults")]
    ode_results: IipyResults,
}

#[derive(Debug, Deserialize)]
struct IipyResults {
    #[serde(rename = "IIPTSets")]
    iipt_sets: IiptSets,
}

#[derive(Debug, Deserialize)]
struct IiptSets {
    #[serde(rename = "IIPTSet")]
    iipt_set: OneOrMany<PdsOdeIiptSet>,
}

#[derive(Debug, Deserialize)]
struct ProductsResponse {
    #[serde(rename = "ODEResults")]
    ode_results: ProductsResults,
}

#[derive(Debug, Deserialize)]
struct ProductsResults {
    #[serde(rename = "Products", default)]
    products: Option<Products>,
}

#[derive(Debug, Deserialize)]
struct Products {
    #[serde(rename = "Product")]
    product: OneOrMany<PdsOdeProduct>,
}

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

/// Extractor bound to one PDS-ODE REST service.
pub struct PdsOdeExtractor {
    service: ExternalService,
    client: Client,
    page_size: u64,
    max_items: Option<u64>,
}

impl PdsOdeExtractor {
    /// Bind to a service; fails if the service does not declare `PDSODE`.
    pub fn new(service: ExternalService, options: &ExtractConfig) -> Result<Self> {
        check_service_type(&service, ExternalServiceType::PdsOde)?;
        Ok(Self {
            service,
            client: build_client(options)?,
            page_size: options.page_size,
            max_items: options.max_items,
        })
    }

    /// Enumerate the IIPT sets the service declares as collections.
    ///
    /// Sets without valid footprints or without a product count are skipped,
    /// not failed: they cannot be extracted usefully.
    pub async fn service_collections(&self) -> Result<Vec<SourceCollection>> {
        let mut query = vec![
            ("query", "iipy".to_string()),
            ("output", "JSON".to_string()),
        ];
        if let Some(db) = self.service.extra_param("odemetadb") {
            query.push(("odemetadb", db.to_string()));
        }

        let body = get_json(&self.client, self.service.url.as_str(), &query).await?;
        let response: IipyResponse = serde_json::from_value(body).map_err(|e| {
            HarvestError::Extraction(format!(
                "{}: IIPTSet response not conform to expected model: {e}",
                self.service.url
            ))
        })?;

        let mut collections = Vec::new();
        for set in response.ode_results.iipt_sets.iipt_set.to_vec() {
            let collection_id = set.collection_id();

            if let Some(valid) = &set.valid_footprints {
                if valid != "T" {
                    debug!(collection_id, "products have no valid footprints, skipping");
                    continue;
                }
            }

            let Some(n_products) = set.number_products else {
                warn!(collection_id, "missing `NumberProducts`, not added to service collections");
                continue;
            };

            collections.push(SourceCollection::new(
                collection_id,
                self.service.clone(),
                Some(n_products as u64),
                set.targets(),
            ));
        }

        Ok(collections)
    }

    /// Start extracting one collection's product records.
    pub async fn extract(&self, collection_id: &str) -> Result<Extraction> {
        let collections = self.service_collections().await?;
        let collection = collections
            .into_iter()
            .find(|c| c.collection_id == collection_id)
            .ok_or_else(|| {
                HarvestError::Extraction(format!(
                    "collection `{collection_id}` not declared by `{}`",
                    self.service.title
                ))
            })?;

        // Collection id carries the (ihid, iid, pt) query triple.
        let mut parts = collection_id.splitn(3, '_');
        let (Some(ihid), Some(iid), Some(pt)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(HarvestError::Extraction(format!(
                "collection id `{collection_id}` is not of the form IHID_IID_PT"
            )));
        };

        let target = collection
            .target
            .as_deref()
            .map(str::to_lowercase)
            .ok_or_else(|| {
                HarvestError::Extraction(format!(
                    "collection `{collection_id}` declares no target body"
                ))
            })?;

        let pager = PdsOdePager {
            client: self.client.clone(),
            url: self.service.url.to_string(),
            target,
            ihid: ihid.to_string(),
            iid: iid.to_string(),
            pt: pt.to_string(),
            offset: 0,
            limit: self.page_size,
            total: collection.n_items,
        };

        Ok(Extraction {
            collection,
            records: RecordStream::new(Pager::PdsOde(pager), self.max_items),
        })
    }
}

// ---------------------------------------------------------------------------
// Pager
// ---------------------------------------------------------------------------

/// Offset/limit cursor over the ODE `query=product` endpoint.
pub(crate) struct PdsOdePager {
    client: Client,
    url: String,
    target: String,
    ihid: String,
    iid: String,
    pt: String,
    offset: u64,
    limit: u64,
    total: Option<u64>,
}

impl PdsOdePager {
    pub(crate) async fn next_page(&mut self) -> Result<Page> {
        if self.total.is_some_and(|total| self.offset >= total) {
            return Ok(Page {
                records: Vec::new(),
                has_more: false,
            });
        }

        let query = [
            ("target", self.target.clone()),
            ("query", "product".to_string()),
            // `copmf` shapes the result metadata to include product files.
            ("results", "copmf".to_string()),
            ("output", "JSON".to_string()),
            ("offset", self.offset.to_string()),
            ("limit", self.limit.to_string()),
            ("ihid", self.ihid.clone()),
            ("iid", self.iid.clone()),
            ("pt", self.pt.clone()),
        ];

        let body = get_json(&self.client, &self.url, &query).await?;
        let response: ProductsResponse = serde_json::from_value(body).map_err(|e| {
            HarvestError::Extraction(format!(
                "{}: product response not conform to expected model: {e}",
                self.url
            ))
        })?;

        let records: Vec<RawRecord> = response
            .ode_results
            .products
            .map(|p| p.product.to_vec())
            .unwrap_or_default()
            .into_iter()
            .map(RawRecord::PdsOde)
            .collect();

        let count = records.len() as u64;
        self.offset += count;
        let has_more = count == self.limit
            && count > 0
            && self.total.is_none_or(|total| self.offset < total);

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
        ExternalService {
            title: "PDS ODE API".into(),
            description: "test".into(),
            providers: vec![],
            service_type: ExternalServiceType::PdsOde,
            url: url.parse().unwrap(),
            ping_url: None,
            ssys_targets: Some(vec!["Mars".into()]),
            extra_params: serde_json::Map::new(),
        }
    }

    fn epntap_service(url: &str) -> ExternalService {
        ExternalService {
            service_type: ExternalServiceType::Epntap,
            ..test_service(url)
        }
    }

    async fn mount_iipy(server: &MockServer) {
        let body = std::fs::read_to_string("../../../fixtures/records/pdsode-iipy-response.json")
            .expect("read iipy fixture");
        Mock::given(method("GET"))
            .and(query_param("query", "iipy"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn wrong_service_type_is_rejected() {
        let err =
            PdsOdeExtractor::new(epntap_service("https://example.org/tap"), &test_options(100))
                .unwrap_err();
        assert!(matches!(err, HarvestError::UnsupportedServiceType { .. }));
    }

    #[tokio::test]
    async fn collections_enumeration_applies_skip_rules() {
        let server = MockServer::start().await;
        mount_iipy(&server).await;

        let extractor =
            PdsOdeExtractor::new(test_service(&server.uri()), &test_options(100)).unwrap();
        let collections = extractor.service_collections().await.expect("enumerate");

        // 4 declared sets: one without valid footprints, one without a
        // product count — both skipped.
        let ids: Vec<&str> = collections
            .iter()
            .map(|c| c.collection_id.as_str())
            .collect();
        assert_eq!(ids, vec!["MRO_HIRISE_RDRV11", "ODY_THEMIS_VISGEO"]);
        assert_eq!(collections[0].n_items, Some(4));
        assert_eq!(collections[0].target.as_deref(), Some("mars"));
        assert_eq!(collections[1].targets, vec!["mars", "MARS", "PHOBOS"]);
    }

    #[tokio::test]
    async fn unknown_collection_fails_extraction() {
        let server = MockServer::start().await;
        mount_iipy(&server).await;

        let extractor =
            PdsOdeExtractor::new(test_service(&server.uri()), &test_options(100)).unwrap();
        let err = extractor.extract("MRO_CTX_EDR").await.unwrap_err();
        assert!(matches!(err, HarvestError::Extraction(_)));
    }

    #[tokio::test]
    async fn extraction_pages_lazily_with_offset_cursor() {
        let server = MockServer::start().await;
        mount_iipy(&server).await;

        let page = std::fs::read_to_string("../../../fixtures/records/pdsode-products-page.json")
            .expect("read products fixture");

        // Two pages of two records cover the declared total of four.
        Mock::given(method("GET"))
            .and(query_param("query", "product"))
            .and(query_param("offset", "0"))
            .and(query_param("limit", "2"))
            .and(query_param("ihid", "MRO"))
            .and(query_param("iid", "HIRISE"))
            .and(query_param("pt", "RDRV11"))
            .and(query_param("target", "mars"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page.clone()))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("query", "product"))
            .and(query_param("offset", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page))
            .expect(1)
            .mount(&server)
            .await;

        let extractor =
            PdsOdeExtractor::new(test_service(&server.uri()), &test_options(2)).unwrap();
        let extraction = extractor.extract("MRO_HIRISE_RDRV11").await.expect("extract");
        assert_eq!(extraction.collection.n_items, Some(4));

        let mut stream = extraction.records;
        let first = stream.next_record().await.expect("first record");
        assert!(matches!(first, Some(RawRecord::PdsOde(_))));

        // Only the first product page has been requested so far.
        let product_requests = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|r| r.url.query().is_some_and(|q| q.contains("query=product")))
            .count();
        assert_eq!(product_requests, 1);

        let mut count = 1;
        while let Some(record) = stream.next_record().await.expect("record") {
            if let RawRecord::PdsOde(product) = &record {
                assert!(product.product_files.product_file.len() <= 2);
            }
            count += 1;
        }
        assert_eq!(count, 4);
        assert!(stream.next_record().await.expect("drained").is_none());
    }

    #[tokio::test]
    async fn max_items_caps_the_stream() {
        let server = MockServer::start().await;
        mount_iipy(&server).await;

        let page = std::fs::read_to_string("../../../fixtures/records/pdsode-products-page.json")
            .expect("read products fixture");
        Mock::given(method("GET"))
            .and(query_param("query", "product"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page))
            .mount(&server)
            .await;

        let options = ExtractConfig {
            page_size: 2,
            max_items: Some(3),
            timeout_secs: 5,
        };
        let extractor = PdsOdeExtractor::new(test_service(&server.uri()), &options).unwrap();
        let mut stream = extractor
            .extract("MRO_HIRISE_RDRV11")
            .await
            .expect("extract")
            .records;

        let mut count = 0;
        while stream.next_record().await.expect("record").is_some() {
            count += 1;
        }
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn http_error_mid_iteration_terminates_stream() {
        let server = MockServer::start().await;
        mount_iipy(&server).await;

        Mock::given(method("GET"))
            .and(query_param("query", "product"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let extractor =
            PdsOdeExtractor::new(test_service(&server.uri()), &test_options(2)).unwrap();
        let mut stream = extractor
            .extract("MRO_HIRISE_RDRV11")
            .await
            .expect("extract")
            .records;

        let err = stream.next_record().await.unwrap_err();
        assert!(matches!(err, HarvestError::Extraction(_)));
        // The stream is terminated, not restartable.
        assert!(stream.next_record().await.expect("terminated").is_none());
    }
}
