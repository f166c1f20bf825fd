//! The Crawler: composes registry → extractor → transformer → ingestor for
//! collection-level pipeline operations.
//!
//! Execution is sequential: one collection's extract → transform → ingest
//! runs to completion (or failure) before the next begins. Record streams
//! are consumed as they are produced, so peak memory stays at one page of
//! records regardless of collection size. Each operation is idempotent at
//! collection granularity: re-running a stage overwrites only that stage's
//! artifact.

use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use stacharvest_extract::Extractor;
use stacharvest_registry::{ServiceRegistry, registered_services};
use stacharvest_shared::config::CollectionPolicy;
use stacharvest_shared::schemas::TargetSchema;
use stacharvest_shared::{
    AppConfig, CollectionFilters, ExternalService, HarvestError, Result, SourceCollection,
    expand_home, validate_auth_token,
};
use stacharvest_storage::Storage;
use stacharvest_transform::{ExtentAccumulator, TransformContext, Transformer};

use crate::artifacts::ArtifactStore;
use crate::ingest::{Ingest, StacApiIngestor};

/// Database file name under the source data directory.
const INDEX_DB_NAME: &str = "stacharvest.db";

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Per-stage record tally. Every operation reports one; no stage returns a
/// bare silent success.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct StageReport {
    /// Records processed successfully.
    pub succeeded: u64,
    /// Records rejected by validation and skipped.
    pub skipped_invalid: u64,
    /// Records that failed at the destination boundary.
    pub failed: u64,
    /// Combined content hash of the stage's artifacts, when applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
}

impl StageReport {
    pub(crate) fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".into())
    }
}

impl std::fmt::Display for StageReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} succeeded, {} skipped-invalid, {} failed",
            self.succeeded, self.skipped_invalid, self.failed
        )
    }
}

/// Outcome of processing one collection in a multi-collection run.
#[derive(Debug, Default)]
pub struct CollectionOutcome {
    pub collection_id: String,
    pub extract: Option<StageReport>,
    pub transform: Option<StageReport>,
    pub ingest: Option<StageReport>,
    /// First stage error; set when the collection was aborted.
    pub error: Option<String>,
}

impl CollectionOutcome {
    fn new(collection_id: impl Into<String>) -> Self {
        Self {
            collection_id: collection_id.into(),
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Crawler
// ---------------------------------------------------------------------------

/// High-level pipeline interface used by the CLI.
pub struct Crawler {
    config: AppConfig,
    registries: Vec<ServiceRegistry>,
    storage: Storage,
    artifacts: ArtifactStore,
}

impl Crawler {
    /// Open the datastore and resolve the configured registries.
    pub async fn new(config: AppConfig) -> Result<Self> {
        let source_dir = expand_home(&config.datastore.source_data_dir);
        let stac_dir = expand_home(&config.datastore.stac_data_dir);

        let storage = Storage::open(&source_dir.join(INDEX_DB_NAME)).await?;
        let artifacts = ArtifactStore::new(&source_dir, &stac_dir);

        let mut registries = Vec::new();
        if !config.registry.endpoint_url.is_empty() {
            registries.push(ServiceRegistry::healthcheck(
                config.registry.endpoint_url.clone(),
            ));
        }
        let local_dir = expand_home(&config.registry.local_dir);
        if local_dir.is_dir() {
            registries.push(ServiceRegistry::local(local_dir));
        } else {
            debug!(dir = %local_dir.display(), "local registry directory not present");
        }

        Ok(Self {
            config,
            registries,
            storage,
            artifacts,
        })
    }

    /// Services declared by the configured registries.
    pub async fn registered_services(&self) -> Result<Vec<ExternalService>> {
        registered_services(&self.registries).await
    }

    /// Collections one service exposes, without touching the datastore.
    pub async fn service_collections(
        &self,
        service: &ExternalService,
    ) -> Result<Vec<SourceCollection>> {
        let extractor = Extractor::for_service(service, &self.config.extract)?;
        debug!(protocol = %extractor.service_type(), service = %service.title, "enumerating collections");
        extractor.service_collections().await
    }

    /// Rebuild the collection index from the registries' declared services.
    ///
    /// A service whose enumeration fails is skipped with a warning; registry
    /// resolution failures are fatal.
    #[instrument(skip(self))]
    pub async fn init_datastore(&self) -> Result<usize> {
        let services = self.registered_services().await?;
        let policy = CollectionPolicy::from_config(&self.config.policies)?;

        let mut collections: Vec<SourceCollection> = Vec::new();
        for service in &services {
            let extractor = Extractor::for_service(service, &self.config.extract)?;
            match extractor.service_collections().await {
                Ok(found) => {
                    info!(service = %service.title, count = found.len(), "collections found");
                    for collection in found {
                        if policy.allows(&collection.collection_id) {
                            collections.push(collection);
                        } else {
                            debug!(
                                collection_id = %collection.collection_id,
                                "excluded by collection policy"
                            );
                        }
                    }
                }
                Err(e) => {
                    warn!(service = %service.title, error = %e, "enumeration failed, service skipped");
                }
            }
        }

        self.storage.reset_collections(&collections).await?;
        Ok(collections.len())
    }

    /// Collections in the datastore matching the filters.
    pub async fn list_source_collections(
        &self,
        filters: &CollectionFilters,
    ) -> Result<Vec<SourceCollection>> {
        self.storage.list_collections(filters).await
    }

    /// Run history for one collection.
    pub async fn collection_runs(
        &self,
        collection_id: &str,
    ) -> Result<Vec<(String, String, Option<String>, Option<String>)>> {
        self.storage.list_runs(collection_id).await
    }

    async fn require_collection(&self, collection_id: &str) -> Result<SourceCollection> {
        self.storage
            .get_collection(collection_id)
            .await?
            .ok_or_else(|| {
                HarvestError::Extraction(format!(
                    "collection `{collection_id}` is not in the datastore (run `init-ds` first)"
                ))
            })
    }

    // -----------------------------------------------------------------------
    // Extract
    // -----------------------------------------------------------------------

    /// Extract a collection's raw records into page artifacts.
    #[instrument(skip(self))]
    pub async fn extract_collection(
        &self,
        collection_id: &str,
        overwrite: bool,
    ) -> Result<StageReport> {
        let collection = self.require_collection(collection_id).await?;
        if collection.extracted && !overwrite {
            info!(collection_id, "already extracted, use overwrite to re-extract");
            return Ok(StageReport::default());
        }

        let run_id = self.storage.insert_run(collection_id, "extract").await?;
        let result = self.do_extract(&collection).await;
        match &result {
            Ok(report) => self.storage.finish_run(&run_id, &report.to_json()).await?,
            Err(e) => {
                let stats = serde_json::json!({"error": e.to_string()}).to_string();
                let _ = self.storage.finish_run(&run_id, &stats).await;
            }
        }
        result
    }

    async fn do_extract(&self, collection: &SourceCollection) -> Result<StageReport> {
        let extractor = Extractor::for_service(&collection.service, &self.config.extract)?;
        let extraction = extractor.extract(&collection.collection_id).await?;
        let mut fresh = extraction.collection;
        let mut stream = extraction.records;

        // Fresh-run semantics: this stage's artifacts are replaced wholesale.
        self.artifacts.clear_extraction(&fresh.collection_id)?;
        let mut files = vec![self.artifacts.write_collection_metadata(&fresh)?];

        let page_size = self.config.extract.page_size.max(1) as usize;
        let mut report = StageReport::default();
        let mut hasher = Sha256::new();
        let mut page = Vec::with_capacity(page_size);
        let mut page_number = 1;

        loop {
            let next = stream.next_record().await?;
            let done = next.is_none();
            if let Some(record) = next {
                page.push(record);
            }
            if page.len() >= page_size || (done && !page.is_empty()) {
                let (relative, hash) = self.artifacts.write_page(
                    &fresh.collection_id,
                    page_number,
                    fresh.source_schema,
                    &page,
                )?;
                hasher.update(hash.as_bytes());
                report.succeeded += page.len() as u64;
                files.push(relative);
                page.clear();
                page_number += 1;
            }
            if done {
                break;
            }
        }
        report.content_hash = Some(format!("{:x}", hasher.finalize()));

        fresh.extracted = true;
        fresh.extracted_files = files;
        self.storage.upsert_collection(&fresh).await?;

        info!(
            collection_id = %fresh.collection_id,
            records = stream.yielded(),
            pages = page_number - 1,
            "collection extracted"
        );
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Transform
    // -----------------------------------------------------------------------

    /// Transform a collection under explicitly declared schemas.
    ///
    /// Fails fast when the declared source schema does not match what the
    /// collection's extraction artifacts carry; no transformer silently
    /// accepts an unmatched pair.
    pub async fn transform_collection_between(
        &self,
        collection_id: &str,
        source_schema: stacharvest_shared::SourceSchema,
        target_schema: TargetSchema,
        overwrite: bool,
    ) -> Result<StageReport> {
        let collection = self.require_collection(collection_id).await?;
        if collection.source_schema != source_schema {
            return Err(HarvestError::schema_input(format!(
                "collection `{collection_id}` declares schema `{}`, not `{source_schema}`",
                collection.source_schema
            )));
        }
        let transformer = Transformer::for_pair(source_schema, target_schema);
        debug!(?transformer, collection_id, "transformer selected");
        self.transform_collection(collection_id, overwrite).await
    }

    /// Transform a collection's extracted records into validated STAC
    /// artifacts. Extracts first when no extraction artifact exists.
    #[instrument(skip(self))]
    pub async fn transform_collection(
        &self,
        collection_id: &str,
        overwrite: bool,
    ) -> Result<StageReport> {
        let mut collection = self.require_collection(collection_id).await?;
        if collection.transformed && !overwrite {
            info!(collection_id, "already transformed, use overwrite to re-transform");
            return Ok(StageReport::default());
        }
        if !collection.extracted {
            info!(collection_id, "not extracted yet, extracting first");
            self.extract_collection(collection_id, overwrite).await?;
            collection = self.require_collection(collection_id).await?;
        }

        let run_id = self.storage.insert_run(collection_id, "transform").await?;
        let result = self.do_transform(&collection).await;
        match &result {
            Ok(report) => self.storage.finish_run(&run_id, &report.to_json()).await?,
            Err(e) => {
                let stats = serde_json::json!({"error": e.to_string()}).to_string();
                let _ = self.storage.finish_run(&run_id, &stats).await;
            }
        }
        result
    }

    async fn do_transform(&self, collection: &SourceCollection) -> Result<StageReport> {
        let collection_id = &collection.collection_id;
        let transformer = Transformer::for_pair(collection.source_schema, TargetSchema::Stac);
        let ctx = TransformContext::new(collection_id.as_str(), collection.updated_at);

        let mut accumulator = ExtentAccumulator::new();
        let mut writer = self.artifacts.items_writer(collection_id)?;
        let mut report = StageReport::default();

        // The first extracted file is the collection metadata; the rest are
        // record pages, streamed one page at a time.
        for relative in collection.extracted_files.iter().skip(1) {
            let records = self
                .artifacts
                .read_page(relative, collection.source_schema)?;
            for record in records {
                match transformer.transform_item(&record, &ctx) {
                    Ok(item) => {
                        accumulator.observe(&item);
                        writer.append(&item)?;
                        report.succeeded += 1;
                    }
                    Err(e) if e.is_record_level() => {
                        if self.config.policies.abort_on_invalid {
                            return Err(e);
                        }
                        warn!(collection_id, error = %e, "invalid record skipped");
                        report.skipped_invalid += 1;
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        let stac_collection =
            transformer.transform_collection(collection, Some(accumulator.finish()))?;
        self.artifacts
            .write_stac_collection(collection_id, &stac_collection)?;
        let (items_path, count) = writer.finish()?;
        debug!(items = count, path = %items_path.display(), "items artifact written");

        let mut updated = collection.clone();
        updated.transformed = true;
        updated.stac_dir = Some(
            self.artifacts
                .stac_collection_dir(collection_id)
                .display()
                .to_string(),
        );
        self.storage.upsert_collection(&updated).await?;

        info!(collection_id, %report, "collection transformed");
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Ingest
    // -----------------------------------------------------------------------

    /// Ingest a collection's transformed records into the configured STAC API.
    pub async fn ingest_collection(
        &self,
        collection_id: &str,
        update: bool,
    ) -> Result<StageReport> {
        if self.config.ingest.stac_api_url.is_empty() {
            return Err(HarvestError::config(
                "no destination STAC API configured (set [ingest] stac_api_url)",
            ));
        }
        let token = validate_auth_token(&self.config)?;
        let ingestor = StacApiIngestor::new(self.config.ingest.stac_api_url.clone(), token)?;
        self.ingest_collection_with(collection_id, &ingestor, update)
            .await
    }

    /// Ingest through a caller-provided destination boundary.
    ///
    /// Per-item failures are skipped and tallied (skip-and-report); the
    /// collection is marked ingested only when every item succeeded.
    #[instrument(skip(self, ingestor))]
    pub async fn ingest_collection_with(
        &self,
        collection_id: &str,
        ingestor: &impl Ingest,
        update: bool,
    ) -> Result<StageReport> {
        let mut collection = self.require_collection(collection_id).await?;
        if collection.ingested && !update {
            info!(collection_id, "already ingested, use update to re-ingest");
            return Ok(StageReport::default());
        }
        if !collection.transformed {
            info!(collection_id, "not transformed yet, transforming first");
            self.transform_collection(collection_id, update).await?;
            collection = self.require_collection(collection_id).await?;
        }

        let run_id = self.storage.insert_run(collection_id, "ingest").await?;
        let result = self.do_ingest(&collection, ingestor, update).await;
        match &result {
            Ok(report) => self.storage.finish_run(&run_id, &report.to_json()).await?,
            Err(e) => {
                let stats = serde_json::json!({"error": e.to_string()}).to_string();
                let _ = self.storage.finish_run(&run_id, &stats).await;
            }
        }
        result
    }

    async fn do_ingest(
        &self,
        collection: &SourceCollection,
        ingestor: &impl Ingest,
        update: bool,
    ) -> Result<StageReport> {
        let collection_id = &collection.collection_id;
        let stac_collection = self.artifacts.read_stac_collection(collection_id)?;
        let stac_url = ingestor.put_collection(&stac_collection, update).await?;

        let mut reader = self.artifacts.items_reader(collection_id)?;
        let mut report = StageReport::default();
        while let Some(item) = reader.next_item()? {
            match ingestor.put_item(collection_id, &item, update).await {
                Ok(()) => report.succeeded += 1,
                Err(e) => {
                    warn!(collection_id, item = %item.id, error = %e, "item ingestion failed, skipped");
                    report.failed += 1;
                }
            }
        }

        let mut updated = collection.clone();
        updated.ingested = report.failed == 0;
        updated.stac_url = Some(stac_url);
        self.storage.upsert_collection(&updated).await?;

        info!(collection_id, %report, "collection ingested");
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Process
    // -----------------------------------------------------------------------

    /// Run extract → transform → ingest over every collection matching the
    /// filters, sequentially. A collection's failure aborts that collection
    /// only; the run continues with the next one.
    #[instrument(skip(self))]
    pub async fn process_collections(
        &self,
        filters: &CollectionFilters,
        overwrite: bool,
    ) -> Result<Vec<CollectionOutcome>> {
        let collections = self.storage.list_collections(filters).await?;
        info!(count = collections.len(), "processing collections");

        let mut outcomes = Vec::new();
        for collection in collections {
            let collection_id = collection.collection_id.clone();
            let mut outcome = CollectionOutcome::new(collection_id.as_str());

            match self.extract_collection(&collection_id, overwrite).await {
                Ok(report) => outcome.extract = Some(report),
                Err(e) => {
                    warn!(collection_id, error = %e, "extraction failed, collection aborted");
                    outcome.error = Some(e.to_string());
                    outcomes.push(outcome);
                    continue;
                }
            }
            match self.transform_collection(&collection_id, overwrite).await {
                Ok(report) => outcome.transform = Some(report),
                Err(e) => {
                    warn!(collection_id, error = %e, "transformation failed, collection aborted");
                    outcome.error = Some(e.to_string());
                    outcomes.push(outcome);
                    continue;
                }
            }
            if self.config.ingest.stac_api_url.is_empty() {
                debug!(collection_id, "no destination STAC API configured, ingest skipped");
            } else {
                match self.ingest_collection(&collection_id, overwrite).await {
                    Ok(report) => outcome.ingest = Some(report),
                    Err(e) => {
                        warn!(collection_id, error = %e, "ingestion failed, collection aborted");
                        outcome.error = Some(e.to_string());
                    }
                }
            }
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Mutex;

    use stacharvest_shared::stac::{StacCollection, StacItem};
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Test double for the ingest boundary, recording item ids and failing
    /// on request.
    #[derive(Default)]
    struct MockIngestor {
        items: Mutex<Vec<String>>,
        fail_on: Option<String>,
    }

    impl Ingest for MockIngestor {
        async fn put_collection(
            &self,
            collection: &StacCollection,
            _update_if_exists: bool,
        ) -> Result<String> {
            Ok(format!("mock://collections/{}", collection.id))
        }

        async fn put_item(
            &self,
            _collection_id: &str,
            item: &StacItem,
            _update_if_exists: bool,
        ) -> Result<()> {
            if self.fail_on.as_deref() == Some(item.id.as_str()) {
                return Err(HarvestError::Ingest(format!("item `{}` rejected", item.id)));
            }
            self.items.lock().unwrap().push(item.id.clone());
            Ok(())
        }
    }

    /// Spin up a mock PDS-ODE service and a config rooted in a temp dir.
    async fn pdsode_harness(tag: &str) -> (MockServer, PathBuf, AppConfig) {
        let server = MockServer::start().await;

        let iipy =
            std::fs::read_to_string("../../../fixtures/records/pdsode-iipy-response.json")
                .expect("read iipy fixture");
        Mock::given(method("GET"))
            .and(query_param("query", "iipy"))
            .respond_with(ResponseTemplate::new(200).set_body_string(iipy))
            .mount(&server)
            .await;

        let page =
            std::fs::read_to_string("../../../fixtures/records/pdsode-products-page.json")
                .expect("read products fixture");
        Mock::given(method("GET"))
            .and(query_param("query", "product"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page))
            .mount(&server)
            .await;

        let root = std::env::temp_dir().join(format!("sh-crawler-{tag}-{}", uuid::Uuid::now_v7()));
        let registry_dir = root.join("services");
        std::fs::create_dir_all(&registry_dir).unwrap();
        let service = serde_json::json!({
            "title": "PDS ODE API",
            "description": "mock ODE service",
            "providers": [{"name": "ODE", "roles": ["host"]}],
            "type": "PDSODE",
            "url": server.uri(),
            "ssys:targets": ["Mars"]
        });
        std::fs::write(
            registry_dir.join("pdsode.json"),
            serde_json::to_string_pretty(&service).unwrap(),
        )
        .unwrap();

        let mut config = AppConfig::default();
        config.registry.local_dir = registry_dir.display().to_string();
        config.datastore.source_data_dir = root.join("source").display().to_string();
        config.datastore.stac_data_dir = root.join("stac").display().to_string();
        config.extract.page_size = 2;
        config.extract.timeout_secs = 5;

        (server, root, config)
    }

    #[tokio::test]
    async fn init_datastore_indexes_declared_collections() {
        let (_server, root, config) = pdsode_harness("init").await;
        let crawler = Crawler::new(config).await.unwrap();

        let count = crawler.init_datastore().await.expect("init datastore");
        assert_eq!(count, 2);

        let collections = crawler
            .list_source_collections(&CollectionFilters::default())
            .await
            .unwrap();
        let ids: Vec<&str> = collections
            .iter()
            .map(|c| c.collection_id.as_str())
            .collect();
        assert_eq!(ids, vec!["MRO_HIRISE_RDRV11", "ODY_THEMIS_VISGEO"]);

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn extract_writes_paged_artifacts() {
        let (_server, root, config) = pdsode_harness("extract").await;
        let crawler = Crawler::new(config).await.unwrap();
        crawler.init_datastore().await.unwrap();

        let report = crawler
            .extract_collection("MRO_HIRISE_RDRV11", false)
            .await
            .expect("extract");
        assert_eq!(report.succeeded, 4);
        assert!(report.content_hash.is_some());

        let collection = crawler
            .list_source_collections(&CollectionFilters {
                extracted: Some(true),
                ..Default::default()
            })
            .await
            .unwrap()
            .remove(0);
        // Metadata file plus two pages of two records.
        assert_eq!(collection.extracted_files.len(), 3);
        assert!(root
            .join("source/MRO_HIRISE_RDRV11/MRO_HIRISE_RDRV11_002.json")
            .is_file());

        // A second run without overwrite is a no-op.
        let rerun = crawler
            .extract_collection("MRO_HIRISE_RDRV11", false)
            .await
            .unwrap();
        assert_eq!(rerun.succeeded, 0);

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn transform_streams_pages_into_validated_items() {
        let (_server, root, config) = pdsode_harness("transform").await;
        let crawler = Crawler::new(config).await.unwrap();
        crawler.init_datastore().await.unwrap();

        // Not extracted yet: transform pulls extraction in first.
        let report = crawler
            .transform_collection("MRO_HIRISE_RDRV11", false)
            .await
            .expect("transform");
        assert_eq!(report.succeeded, 4);
        assert_eq!(report.skipped_invalid, 0);

        let items_path = root.join("stac/MRO_HIRISE_RDRV11/items.ndjson");
        let content = std::fs::read_to_string(&items_path).unwrap();
        assert_eq!(content.lines().count(), 4);
        for line in content.lines() {
            let item: StacItem = serde_json::from_str(line).unwrap();
            item.validate().expect("persisted items are valid");
        }

        let collection_json =
            std::fs::read_to_string(root.join("stac/MRO_HIRISE_RDRV11/collection.json")).unwrap();
        let stac_collection: StacCollection = serde_json::from_str(&collection_json).unwrap();
        stac_collection.validate().unwrap();
        assert_eq!(stac_collection.id, "MRO_HIRISE_RDRV11");
        // Extent accumulated from the transformed items.
        assert_eq!(
            stac_collection.extent.temporal.interval[0][0].as_deref(),
            Some("2007-03-25T10:15:32.733Z")
        );

        // Idempotence: re-transforming unchanged artifacts is byte-identical.
        crawler
            .transform_collection("MRO_HIRISE_RDRV11", true)
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(&items_path).unwrap(), content);

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn ingest_skips_and_reports_failed_items() {
        let (_server, root, config) = pdsode_harness("ingest").await;
        let crawler = Crawler::new(config).await.unwrap();
        crawler.init_datastore().await.unwrap();
        crawler
            .transform_collection("MRO_HIRISE_RDRV11", false)
            .await
            .unwrap();

        let ingestor = MockIngestor {
            fail_on: Some("PSP_003158_1985".into()),
            ..Default::default()
        };
        let report = crawler
            .ingest_collection_with("MRO_HIRISE_RDRV11", &ingestor, false)
            .await
            .expect("ingest");
        // The fixture pair appears twice (two pages), both copies rejected.
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 2);

        // Failed items leave the collection not fully ingested.
        let collection = crawler
            .list_source_collections(&CollectionFilters::default())
            .await
            .unwrap()
            .remove(0);
        assert!(!collection.ingested);
        assert_eq!(
            collection.stac_url.as_deref(),
            Some("mock://collections/MRO_HIRISE_RDRV11")
        );

        // A clean destination ingests everything and marks the collection.
        let ingestor = MockIngestor::default();
        let report = crawler
            .ingest_collection_with("MRO_HIRISE_RDRV11", &ingestor, true)
            .await
            .unwrap();
        assert_eq!(report.succeeded, 4);
        assert_eq!(ingestor.items.lock().unwrap().len(), 4);

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn process_isolates_collection_failures() {
        let (server, root, config) = pdsode_harness("process").await;
        let crawler = Crawler::new(config).await.unwrap();
        crawler.init_datastore().await.unwrap();

        // The THEMIS product query fails; the HiRISE one succeeds.
        server.reset().await;
        let iipy =
            std::fs::read_to_string("../../../fixtures/records/pdsode-iipy-response.json").unwrap();
        Mock::given(method("GET"))
            .and(query_param("query", "iipy"))
            .respond_with(ResponseTemplate::new(200).set_body_string(iipy))
            .mount(&server)
            .await;
        let page =
            std::fs::read_to_string("../../../fixtures/records/pdsode-products-page.json").unwrap();
        Mock::given(method("GET"))
            .and(query_param("query", "product"))
            .and(query_param("ihid", "MRO"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("query", "product"))
            .and(query_param("ihid", "ODY"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let outcomes = crawler
            .process_collections(&CollectionFilters::default(), false)
            .await
            .expect("process run");

        assert_eq!(outcomes.len(), 2);
        let hirise = &outcomes[0];
        assert_eq!(hirise.collection_id, "MRO_HIRISE_RDRV11");
        assert!(hirise.error.is_none());
        assert_eq!(hirise.extract.as_ref().unwrap().succeeded, 4);
        assert_eq!(hirise.transform.as_ref().unwrap().succeeded, 4);
        // No STAC API configured: ingest stage is skipped, not failed.
        assert!(hirise.ingest.is_none());

        let themis = &outcomes[1];
        assert!(themis.error.is_some());
        assert!(themis.extract.is_none());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn unknown_collection_is_an_error() {
        let (_server, root, config) = pdsode_harness("unknown").await;
        let crawler = Crawler::new(config).await.unwrap();
        crawler.init_datastore().await.unwrap();

        let err = crawler
            .extract_collection("NOT_A_COLLECTION", false)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not in the datastore"));

        let _ = std::fs::remove_dir_all(&root);
    }
}
