//! EPN-TAP extractor.
//!
//! Speaks the TAP sync protocol against a service's `epn_core` table. The
//! table name is registry-declared (`extra_params.table`); enumeration is one
//! collection per table with a `COUNT(*)` probe, and item extraction pages
//! through the table with `TOP`/`OFFSET` queries in `RESPONSEFORMAT=json`
//! (column `metadata` plus row `data` arrays).

use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use stacharvest_shared::config::ExtractConfig;
use stacharvest_shared::schemas::EpntapGranule;
use stacharvest_shared::{ExternalService, ExternalServiceType, HarvestError, Result, SourceCollection};

use crate::{Extraction, Page, Pager, RawRecord, RecordStream, build_client, check_service_type, get_json};

// ---------------------------------------------------------------------------
// Response shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TapResponse {
    metadata: Vec<TapColumn>,
    data: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct TapColumn {
    name: String,
}

/// Map one TAP row onto an object keyed by column name.
fn row_to_object(
    columns: &[TapColumn],
    row: &[serde_json::Value],
) -> Result<serde_json::Map<String, serde_json::Value>> {
    if row.len() != columns.len() {
        return Err(HarvestError::Extraction(format!(
            "TAP row has {} values for {} columns",
            row.len(),
            columns.len()
        )));
    }
    Ok(columns
        .iter()
        .zip(row.iter())
        .map(|(col, value)| (col.name.clone(), value.clone()))
        .collect())
}

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

/// Extractor bound to one EPN-TAP service.
pub struct EpntapExtractor {
    service: ExternalService,
    client: Client,
    page_size: u64,
    max_items: Option<u64>,
}

impl EpntapExtractor {
    /// Bind to a service; fails if the service does not declare `EPNTAP`.
    pub fn new(service: ExternalService, options: &ExtractConfig) -> Result<Self> {
        check_service_type(&service, ExternalServiceType::Epntap)?;
        Ok(Self {
            service,
            client: build_client(options)?,
            page_size: options.page_size,
            max_items: options.max_items,
        })
    }

    fn table(&self) -> Result<&str> {
        self.service.extra_param("table").ok_or_else(|| {
            HarvestError::Extraction(format!(
                "service `{}` declares no `table` extra param",
                self.service.title
            ))
        })
    }

    fn sync_url(&self) -> String {
        format!("{}/sync", self.service.url.as_str().trim_end_matches('/'))
    }

    async fn tap_query(&self, adql: String) -> Result<TapResponse> {
        let query = [
            ("REQUEST", "doQuery".to_string()),
            ("LANG", "ADQL".to_string()),
            ("RESPONSEFORMAT", "json".to_string()),
            ("QUERY", adql),
        ];
        let body = get_json(&self.client, &self.sync_url(), &query).await?;
        serde_json::from_value(body).map_err(|e| {
            HarvestError::Extraction(format!(
                "{}: TAP response not conform to expected model: {e}",
                self.sync_url()
            ))
        })
    }

    /// Enumerate collections: one per registry-declared `epn_core` table.
    pub async fn service_collections(&self) -> Result<Vec<SourceCollection>> {
        let table = self.table()?;

        let response = self
            .tap_query(format!("SELECT COUNT(*) AS nb FROM {table}"))
            .await?;
        let count = response
            .data
            .first()
            .and_then(|row| row.first())
            .and_then(value_as_u64);
        debug!(table, ?count, "granule count probed");

        let targets = self.service.ssys_targets.clone().unwrap_or_default();
        Ok(vec![SourceCollection::new(
            table,
            self.service.clone(),
            count,
            targets,
        )])
    }

    /// Start extracting one table's granule records.
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

        let pager = EpntapPager {
            client: self.client.clone(),
            sync_url: self.sync_url(),
            table: collection.collection_id.clone(),
            offset: 0,
            limit: self.page_size,
            total: collection.n_items,
        };

        Ok(Extraction {
            collection,
            records: RecordStream::new(Pager::Epntap(pager), self.max_items),
        })
    }
}

fn value_as_u64(value: &serde_json::Value) -> Option<u64> {
    match value {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Pager
// ---------------------------------------------------------------------------

/// `TOP`/`OFFSET` cursor over an `epn_core` table.
pub(crate) struct EpntapPager {
    client: Client,
    sync_url: String,
    table: String,
    offset: u64,
    limit: u64,
    total: Option<u64>,
}

impl EpntapPager {
    pub(crate) async fn next_page(&mut self) -> Result<Page> {
        if self.total.is_some_and(|total| self.offset >= total) {
            return Ok(Page {
                records: Vec::new(),
                has_more: false,
            });
        }

        let adql = format!(
            "SELECT TOP {} * FROM {} OFFSET {}",
            self.limit, self.table, self.offset
        );
        let query = [
            ("REQUEST", "doQuery".to_string()),
            ("LANG", "ADQL".to_string()),
            ("RESPONSEFORMAT", "json".to_string()),
            ("QUERY", adql),
        ];
        let body = get_json(&self.client, &self.sync_url, &query).await?;
        let response: TapResponse = serde_json::from_value(body).map_err(|e| {
            HarvestError::Extraction(format!(
                "{}: TAP response not conform to expected model: {e}",
                self.sync_url
            ))
        })?;

        let mut records = Vec::with_capacity(response.data.len());
        for row in &response.data {
            let object = row_to_object(&response.metadata, row)?;
            let granule: EpntapGranule =
                serde_json::from_value(serde_json::Value::Object(object)).map_err(|e| {
                    HarvestError::Extraction(format!("{}: malformed granule row: {e}", self.sync_url))
                })?;
            records.push(RawRecord::Epntap(granule));
        }

        let count = records.len() as u64;
        self.offset += count;
        let has_more = count == self.limit
            && count > 0
            && self.total.is_none_or(|total| self.offset < total);

        Ok(Page { records, has_more })
    }
}
