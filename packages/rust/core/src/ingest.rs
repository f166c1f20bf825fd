//! Ingestor boundary: hands validated STAC records to the destination
//! catalog service.
//!
//! The pipeline only depends on the [`Ingest`] trait; [`StacApiIngestor`] is
//! the production implementation speaking to a STAC API with admin
//! authentication. Per-item failures are the caller's to tally
//! (skip-and-report); a collection-level failure is terminal for that
//! collection's ingestion attempt.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::{debug, info};

use stacharvest_shared::stac::{StacCollection, StacItem};
use stacharvest_shared::{HarvestError, Result};

/// Catalog model applied to newly created collections when none is declared.
const COLLECTION_DEFAULT_MODEL: &str = "DefaultModel";

/// User-Agent string for ingestion requests.
const USER_AGENT: &str = concat!("stacharvest/", env!("CARGO_PKG_VERSION"));

/// Destination for validated target-schema records.
pub trait Ingest {
    /// Create (or update) the collection record. Returns the destination URL
    /// of the collection.
    fn put_collection(
        &self,
        collection: &StacCollection,
        update_if_exists: bool,
    ) -> impl Future<Output = Result<String>> + Send;

    /// Create (or update) one item within a collection.
    fn put_item(
        &self,
        collection_id: &str,
        item: &StacItem,
        update_if_exists: bool,
    ) -> impl Future<Output = Result<()>> + Send;
}

// ---------------------------------------------------------------------------
// STAC API implementation
// ---------------------------------------------------------------------------

/// Ingestor posting records to a STAC API catalog service.
pub struct StacApiIngestor {
    api_url: String,
    client: Client,
    auth_token: String,
}

impl StacApiIngestor {
    /// Build an ingestor for the given STAC API root.
    pub fn new(api_url: impl Into<String>, auth_token: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| HarvestError::Ingest(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            client,
            auth_token: auth_token.into(),
        })
    }

    async fn send_json(
        &self,
        method: reqwest::Method,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response> {
        self.client
            .request(method, url)
            .bearer_auth(&self.auth_token)
            .json(body)
            .send()
            .await
            .map_err(|e| HarvestError::Ingest(format!("{url}: {e}")))
    }
}

/// Collection payload for the destination API: summaries and links are
/// catalog-managed there and are stripped; a default model is applied when
/// none is declared.
fn collection_payload(collection: &StacCollection) -> Result<serde_json::Value> {
    let mut payload = serde_json::to_value(collection)
        .map_err(|e| HarvestError::Ingest(e.to_string()))?;
    let object = payload
        .as_object_mut()
        .ok_or_else(|| HarvestError::Ingest("collection payload is not an object".into()))?;
    object.remove("summaries");
    object.remove("links");
    object
        .entry("model")
        .or_insert_with(|| serde_json::Value::String(COLLECTION_DEFAULT_MODEL.into()));
    Ok(payload)
}

impl Ingest for StacApiIngestor {
    async fn put_collection(
        &self,
        collection: &StacCollection,
        update_if_exists: bool,
    ) -> Result<String> {
        let payload = collection_payload(collection)?;
        let post_url = format!("{}/collections", self.api_url);
        let collection_url = format!("{}/collections/{}", self.api_url, collection.id);

        let response = self
            .send_json(reqwest::Method::POST, &post_url, &payload)
            .await?;
        let status = response.status();
        if status.is_success() {
            info!(collection = %collection.id, "collection created");
            return Ok(collection_url);
        }
        if status == StatusCode::CONFLICT {
            if !update_if_exists {
                return Err(HarvestError::Ingest(format!(
                    "collection `{}` already exists (use update to overwrite)",
                    collection.id
                )));
            }
            debug!(collection = %collection.id, "collection exists, updating");
            let response = self
                .send_json(reqwest::Method::PUT, &collection_url, &payload)
                .await?;
            if response.status().is_success() {
                info!(collection = %collection.id, "collection updated");
                return Ok(collection_url);
            }
            return Err(HarvestError::Ingest(format!(
                "collection `{}` update failed: HTTP {}",
                collection.id,
                response.status()
            )));
        }
        Err(HarvestError::Ingest(format!(
            "collection `{}` creation failed: HTTP {status}",
            collection.id
        )))
    }

    async fn put_item(
        &self,
        collection_id: &str,
        item: &StacItem,
        update_if_exists: bool,
    ) -> Result<()> {
        let payload = serde_json::to_value(item)
            .map_err(|e| HarvestError::Ingest(e.to_string()))?;
        let post_url = format!("{}/collections/{collection_id}/items", self.api_url);
        let item_url = format!("{post_url}/{}", item.id);

        let response = self
            .send_json(reqwest::Method::POST, &post_url, &payload)
            .await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        if status == StatusCode::CONFLICT {
            if !update_if_exists {
                return Err(HarvestError::Ingest(format!(
                    "item `{}` already exists (use update to overwrite)",
                    item.id
                )));
            }
            let response = self
                .send_json(reqwest::Method::PUT, &item_url, &payload)
                .await?;
            if response.status().is_success() {
                return Ok(());
            }
            return Err(HarvestError::Ingest(format!(
                "item `{}` update failed: HTTP {}",
                item.id,
                response.status()
            )));
        }
        Err(HarvestError::Ingest(format!(
            "item `{}` creation failed: HTTP {status}",
            item.id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stacharvest_shared::stac::{
        STAC_VERSION, StacExtent, StacSpatialExtent, StacTemporalExtent,
    };
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_collection() -> StacCollection {
        StacCollection {
            collection_type: "Collection".into(),
            stac_version: STAC_VERSION.into(),
            stac_extensions: vec![],
            id: "mro_hirise".into(),
            title: None,
            description: "HiRISE RDR products".into(),
            keywords: None,
            license: "proprietary".into(),
            providers: None,
            extent: StacExtent {
                spatial: StacSpatialExtent {
                    bbox: vec![vec![-180.0, -90.0, 180.0, 90.0]],
                },
                temporal: StacTemporalExtent {
                    interval: vec![vec![None, None]],
                },
            },
            summaries: None,
            links: vec![],
            assets: None,
        }
    }

    fn test_item() -> StacItem {
        let mut item = StacItem::new("obs1");
        item.properties.datetime = Some("2007-03-25T10:15:32.733Z".into());
        item
    }

    #[tokio::test]
    async fn collection_post_strips_catalog_managed_fields() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/collections"))
            .and(header("authorization", "Bearer sekrit"))
            .and(body_partial_json(
                serde_json::json!({"id": "mro_hirise", "model": "DefaultModel"}),
            ))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let ingestor = StacApiIngestor::new(server.uri(), "sekrit").unwrap();
        let url = ingestor
            .put_collection(&test_collection(), false)
            .await
            .expect("post collection");
        assert!(url.ends_with("/collections/mro_hirise"));
    }

    #[tokio::test]
    async fn conflict_retries_with_put_when_updating() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/collections"))
            .respond_with(ResponseTemplate::new(409))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/collections/mro_hirise"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let ingestor = StacApiIngestor::new(server.uri(), "sekrit").unwrap();
        ingestor
            .put_collection(&test_collection(), true)
            .await
            .expect("update collection");
    }

    #[tokio::test]
    async fn conflict_without_update_is_ingest_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(409))
            .mount(&server)
            .await;

        let ingestor = StacApiIngestor::new(server.uri(), "sekrit").unwrap();
        let err = ingestor
            .put_collection(&test_collection(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, HarvestError::Ingest(_)));
        assert!(err.to_string().contains("already exists"));
    }

    #[tokio::test]
    async fn item_posts_into_collection_route() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/collections/mro_hirise/items"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let ingestor = StacApiIngestor::new(server.uri(), "sekrit").unwrap();
        ingestor
            .put_item("mro_hirise", &test_item(), false)
            .await
            .expect("post item");
    }

    #[tokio::test]
    async fn item_server_error_is_ingest_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let ingestor = StacApiIngestor::new(server.uri(), "sekrit").unwrap();
        let err = ingestor
            .put_item("mro_hirise", &test_item(), false)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("500"));
    }
}
