//! Stage artifacts on the filesystem.
//!
//! Each pipeline stage owns exactly one artifact per collection:
//!
//! - extract → `{source_dir}/{collection_id}/{collection_id}.json` (collection
//!   metadata) plus `{collection_id}_{NNN}.json` page files of raw records
//! - transform → `{stac_dir}/{collection_id}/collection.json` plus
//!   `items.ndjson`, one validated STAC item per line
//!
//! Writes go to a `.tmp` sibling and are renamed into place, so a failed
//! stage never leaves a half-written artifact where a previous run's output
//! was. Artifact keys are collection-scoped; nothing here crosses collection
//! boundaries.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use stacharvest_shared::schemas::{RawRecord, SourceSchema};
use stacharvest_shared::stac::{StacCollection, StacItem};
use stacharvest_shared::{HarvestError, Result, SourceCollection};

/// Filesystem layout for stage artifacts.
pub struct ArtifactStore {
    source_dir: PathBuf,
    stac_dir: PathBuf,
}

/// On-disk shape of one extraction page file.
#[derive(Debug, Deserialize)]
struct PageFile {
    schema: SourceSchema,
    records: Vec<serde_json::Value>,
}

impl ArtifactStore {
    pub fn new(source_dir: impl Into<PathBuf>, stac_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            stac_dir: stac_dir.into(),
        }
    }

    /// Root of the extraction artifacts for one collection.
    pub fn source_collection_dir(&self, collection_id: &str) -> PathBuf {
        self.source_dir.join(collection_id)
    }

    /// Root of the transformed STAC artifacts for one collection.
    pub fn stac_collection_dir(&self, collection_id: &str) -> PathBuf {
        self.stac_dir.join(collection_id)
    }

    /// Resolve a stored (source-dir-relative) artifact path.
    pub fn resolve_source(&self, relative: &str) -> PathBuf {
        self.source_dir.join(relative)
    }

    // -----------------------------------------------------------------------
    // Extraction artifacts
    // -----------------------------------------------------------------------

    /// Remove a collection's extraction artifacts (fresh-run semantics).
    pub fn clear_extraction(&self, collection_id: &str) -> Result<()> {
        let dir = self.source_collection_dir(collection_id);
        if dir.is_dir() {
            std::fs::remove_dir_all(&dir).map_err(|e| HarvestError::io(&dir, e))?;
        }
        Ok(())
    }

    /// Write the collection metadata file. Returns its source-dir-relative
    /// path.
    pub fn write_collection_metadata(&self, collection: &SourceCollection) -> Result<String> {
        let relative = format!(
            "{}/{}.json",
            collection.collection_id, collection.collection_id
        );
        let json = serde_json::to_vec_pretty(collection)
            .map_err(|e| HarvestError::Storage(e.to_string()))?;
        self.write_atomically(&self.source_dir.join(&relative), &json)?;
        Ok(relative)
    }

    /// Write one page of raw records. Returns the source-dir-relative path
    /// and the page's content hash.
    pub fn write_page(
        &self,
        collection_id: &str,
        page_number: usize,
        schema: SourceSchema,
        records: &[RawRecord],
    ) -> Result<(String, String)> {
        let relative = format!("{collection_id}/{collection_id}_{page_number:03}.json");
        let body = serde_json::json!({
            "schema": schema,
            "records": records,
        });
        let json =
            serde_json::to_vec(&body).map_err(|e| HarvestError::Storage(e.to_string()))?;
        self.write_atomically(&self.source_dir.join(&relative), &json)?;

        let hash = format!("{:x}", Sha256::digest(&json));
        debug!(page = relative, hash, records = records.len(), "page written");
        Ok((relative, hash))
    }

    /// Read one page of raw records, checking the declared schema tag.
    pub fn read_page(&self, relative: &str, expected: SourceSchema) -> Result<Vec<RawRecord>> {
        let path = self.resolve_source(relative);
        let content =
            std::fs::read_to_string(&path).map_err(|e| HarvestError::io(&path, e))?;
        let page: PageFile = serde_json::from_str(&content).map_err(|e| {
            HarvestError::Storage(format!("corrupt page file `{}`: {e}", path.display()))
        })?;
        if page.schema != expected {
            return Err(HarvestError::schema_input(format!(
                "page `{}` declares schema `{}`, expected `{}`",
                path.display(),
                page.schema,
                expected
            )));
        }
        page.records
            .into_iter()
            .map(|value| RawRecord::from_value(expected, value))
            .collect()
    }

    // -----------------------------------------------------------------------
    // STAC artifacts
    // -----------------------------------------------------------------------

    /// Write the transformed STAC collection record.
    pub fn write_stac_collection(
        &self,
        collection_id: &str,
        collection: &StacCollection,
    ) -> Result<PathBuf> {
        let path = self.stac_collection_dir(collection_id).join("collection.json");
        let json = serde_json::to_vec_pretty(collection)
            .map_err(|e| HarvestError::Storage(e.to_string()))?;
        self.write_atomically(&path, &json)?;
        Ok(path)
    }

    /// Read back a transformed STAC collection record.
    pub fn read_stac_collection(&self, collection_id: &str) -> Result<StacCollection> {
        let path = self.stac_collection_dir(collection_id).join("collection.json");
        let content =
            std::fs::read_to_string(&path).map_err(|e| HarvestError::io(&path, e))?;
        serde_json::from_str(&content).map_err(|e| {
            HarvestError::Storage(format!("corrupt collection file `{}`: {e}", path.display()))
        })
    }

    /// Open a streaming writer for a collection's `items.ndjson`.
    pub fn items_writer(&self, collection_id: &str) -> Result<ItemsWriter> {
        let final_path = self.stac_collection_dir(collection_id).join("items.ndjson");
        let tmp_path = final_path.with_extension("ndjson.tmp");
        if let Some(parent) = final_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| HarvestError::io(parent, e))?;
        }
        let file = File::create(&tmp_path).map_err(|e| HarvestError::io(&tmp_path, e))?;
        Ok(ItemsWriter {
            writer: BufWriter::new(file),
            tmp_path,
            final_path,
            count: 0,
        })
    }

    /// Open a streaming reader over a collection's `items.ndjson`.
    pub fn items_reader(&self, collection_id: &str) -> Result<ItemsReader> {
        let path = self.stac_collection_dir(collection_id).join("items.ndjson");
        let file = File::open(&path).map_err(|e| HarvestError::io(&path, e))?;
        Ok(ItemsReader {
            reader: BufReader::new(file),
            path,
        })
    }

    /// Write bytes to `path` through a `.tmp` sibling and an atomic rename.
    fn write_atomically(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| HarvestError::io(parent, e))?;
        }
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, bytes).map_err(|e| HarvestError::io(&tmp, e))?;
        std::fs::rename(&tmp, path).map_err(|e| HarvestError::io(path, e))?;
        Ok(())
    }
}

/// Streaming newline-delimited writer for validated STAC items.
pub struct ItemsWriter {
    writer: BufWriter<File>,
    tmp_path: PathBuf,
    final_path: PathBuf,
    count: u64,
}

impl ItemsWriter {
    /// Append one item as a single JSON line.
    pub fn append(&mut self, item: &StacItem) -> Result<()> {
        let line =
            serde_json::to_string(item).map_err(|e| HarvestError::Storage(e.to_string()))?;
        self.writer
            .write_all(line.as_bytes())
            .and_then(|_| self.writer.write_all(b"\n"))
            .map_err(|e| HarvestError::io(&self.tmp_path, e))?;
        self.count += 1;
        Ok(())
    }

    /// Flush and move the file into place. Returns (path, item count).
    pub fn finish(mut self) -> Result<(PathBuf, u64)> {
        self.writer
            .flush()
            .map_err(|e| HarvestError::io(&self.tmp_path, e))?;
        drop(self.writer);
        std::fs::rename(&self.tmp_path, &self.final_path)
            .map_err(|e| HarvestError::io(&self.final_path, e))?;
        Ok((self.final_path, self.count))
    }
}

/// Streaming reader over an `items.ndjson` artifact.
pub struct ItemsReader {
    reader: BufReader<File>,
    path: PathBuf,
}

impl ItemsReader {
    /// Read the next item, or `None` at end of file.
    pub fn next_item(&mut self) -> Result<Option<StacItem>> {
        let mut line = String::new();
        loop {
            line.clear();
            let read = self
                .reader
                .read_line(&mut line)
                .map_err(|e| HarvestError::io(&self.path, e))?;
            if read == 0 {
                return Ok(None);
            }
            if line.trim().is_empty() {
                continue;
            }
            let item = serde_json::from_str(&line).map_err(|e| {
                HarvestError::Storage(format!("corrupt item line in `{}`: {e}", self.path.display()))
            })?;
            return Ok(Some(item));
        }
    }
}
