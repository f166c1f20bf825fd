//! Extractor family: one implementation per source protocol, behind a single
//! contract.
//!
//! An extractor is bound to one [`ExternalService`] and can enumerate the
//! collections the service exposes and pull a collection's raw item records
//! as a lazy, finite, paged stream. Protocol differences — pagination,
//! query shape, response parsing — stay inside the protocol modules.
//!
//! The stream is intentionally *not* restartable: it mirrors an on-the-wire
//! cursor, and re-extraction means calling [`Extractor::extract`] again.
//! Peak memory is bounded by one page of records regardless of collection
//! size.

pub mod epntap;
pub mod pdsode;
pub mod wfs;

use std::collections::VecDeque;
use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use stacharvest_shared::config::ExtractConfig;
use stacharvest_shared::{ExternalService, ExternalServiceType, HarvestError, Result, SourceCollection};

pub use epntap::EpntapExtractor;
pub use pdsode::PdsOdeExtractor;
pub use stacharvest_shared::schemas::RawRecord;
pub use wfs::WfsExtractor;

/// User-Agent string for source service requests.
const USER_AGENT: &str = concat!("stacharvest/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Record stream
// ---------------------------------------------------------------------------

/// One page of records plus the advanced cursor, as returned by a pager.
pub(crate) struct Page {
    pub records: Vec<RawRecord>,
    /// False once the source reports no further records.
    pub has_more: bool,
}

/// Protocol-specific page fetchers. Each holds its own explicit cursor; there
/// is no reset — a fresh extraction builds a fresh pager.
pub(crate) enum Pager {
    PdsOde(pdsode::PdsOdePager),
    Epntap(epntap::EpntapPager),
    Wfs(wfs::WfsPager),
}

impl Pager {
    async fn next_page(&mut self) -> Result<Page> {
        match self {
            Self::PdsOde(pager) => pager.next_page().await,
            Self::Epntap(pager) => pager.next_page().await,
            Self::Wfs(pager) => pager.next_page().await,
        }
    }
}

/// A lazy, finite sequence of raw records for one collection.
///
/// At most one page is buffered. Errors terminate the stream: after an `Err`,
/// further calls return `Ok(None)`.
pub struct RecordStream {
    pager: Pager,
    buffer: VecDeque<RawRecord>,
    /// Cap on total records yielded, when configured.
    max_items: Option<u64>,
    yielded: u64,
    exhausted: bool,
}

impl RecordStream {
    pub(crate) fn new(pager: Pager, max_items: Option<u64>) -> Self {
        Self {
            pager,
            buffer: VecDeque::new(),
            max_items,
            yielded: 0,
            exhausted: false,
        }
    }

    /// Pull the next record, fetching the next page when the buffer drains.
    pub async fn next_record(&mut self) -> Result<Option<RawRecord>> {
        loop {
            if self.max_items.is_some_and(|max| self.yielded >= max) {
                self.exhausted = true;
                self.buffer.clear();
            }
            if let Some(record) = self.buffer.pop_front() {
                self.yielded += 1;
                return Ok(Some(record));
            }
            if self.exhausted {
                return Ok(None);
            }

            let page = match self.pager.next_page().await {
                Ok(page) => page,
                Err(e) => {
                    self.exhausted = true;
                    return Err(e);
                }
            };
            debug!(records = page.records.len(), has_more = page.has_more, "page fetched");
            if !page.has_more {
                self.exhausted = true;
            }
            if page.records.is_empty() && self.exhausted {
                return Ok(None);
            }
            self.buffer.extend(page.records);
        }
    }

    /// Number of records yielded so far.
    pub fn yielded(&self) -> u64 {
        self.yielded
    }
}

/// Result of binding an extraction to a collection: its metadata plus the
/// lazy record stream.
pub struct Extraction {
    pub collection: SourceCollection,
    pub records: RecordStream,
}

// ---------------------------------------------------------------------------
// Extractor selection
// ---------------------------------------------------------------------------

/// The closed set of protocol extractors.
///
/// Selection is a static match on the service's declared type; there is no
/// runtime type inspection and no global extractor table.
pub enum Extractor {
    Epntap(EpntapExtractor),
    PdsOde(PdsOdeExtractor),
    Wfs(WfsExtractor),
}

impl Extractor {
    /// Select and bind the extractor matching the service's declared type.
    pub fn for_service(service: &ExternalService, options: &ExtractConfig) -> Result<Self> {
        match service.service_type {
            ExternalServiceType::Epntap => {
                Ok(Self::Epntap(EpntapExtractor::new(service.clone(), options)?))
            }
            ExternalServiceType::PdsOde => {
                Ok(Self::PdsOde(PdsOdeExtractor::new(service.clone(), options)?))
            }
            ExternalServiceType::Wfs => {
                Ok(Self::Wfs(WfsExtractor::new(service.clone(), options)?))
            }
        }
    }

    /// Protocol this extractor speaks.
    pub fn service_type(&self) -> ExternalServiceType {
        match self {
            Self::Epntap(_) => ExternalServiceType::Epntap,
            Self::PdsOde(_) => ExternalServiceType::PdsOde,
            Self::Wfs(_) => ExternalServiceType::Wfs,
        }
    }

    /// Enumerate the collections the bound service exposes.
    pub async fn service_collections(&self) -> Result<Vec<SourceCollection>> {
        match self {
            Self::Epntap(extractor) => extractor.service_collections().await,
            Self::PdsOde(extractor) => extractor.service_collections().await,
            Self::Wfs(extractor) => extractor.service_collections().await,
        }
    }

    /// Start an extraction of one collection: collection metadata plus a lazy
    /// record stream.
    pub async fn extract(&self, collection_id: &str) -> Result<Extraction> {
        match self {
            Self::Epntap(extractor) => extractor.extract(collection_id).await,
            Self::PdsOde(extractor) => extractor.extract(collection_id).await,
            Self::Wfs(extractor) => extractor.extract(collection_id).await,
        }
    }
}

// ---------------------------------------------------------------------------
// Shared helpers for protocol modules
// ---------------------------------------------------------------------------

/// Check the service's declared type against the extractor's protocol.
pub(crate) fn check_service_type(
    service: &ExternalService,
    expected: ExternalServiceType,
) -> Result<()> {
    if service.service_type != expected {
        return Err(HarvestError::unsupported_service_type(
            expected.as_str(),
            service.service_type.as_str(),
        ));
    }
    Ok(())
}

/// Build the HTTP client used for source service calls.
pub(crate) fn build_client(options: &ExtractConfig) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(5))
        .timeout(Duration::from_secs(options.timeout_secs))
        .build()
        .map_err(|e| HarvestError::Extraction(format!("failed to build HTTP client: {e}")))
}

/// Issue a GET returning JSON, mapping transport and HTTP failures to
/// [`HarvestError::Extraction`].
pub(crate) async fn get_json(
    client: &Client,
    url: &str,
    query: &[(&str, String)],
) -> Result<serde_json::Value> {
    let response = client
        .get(url)
        .query(query)
        .send()
        .await
        .map_err(|e| HarvestError::Extraction(format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(HarvestError::Extraction(format!("{url}: HTTP {status}")));
    }

    response
        .json()
        .await
        .map_err(|e| HarvestError::Extraction(format!("{url}: invalid JSON: {e}")))
}
