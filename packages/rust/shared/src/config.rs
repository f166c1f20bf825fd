//! Application configuration for stacharvest.
//!
//! User config lives at `~/.stacharvest/stacharvest.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{HarvestError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "stacharvest.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".stacharvest";

// ---------------------------------------------------------------------------
// Config structs (matching stacharvest.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Service registry sources.
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Data store locations.
    #[serde(default)]
    pub datastore: DatastoreConfig,

    /// Extraction tuning.
    #[serde(default)]
    pub extract: ExtractConfig,

    /// Destination STAC API settings.
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Collection selection and error policies.
    #[serde(default)]
    pub policies: PoliciesConfig,
}

/// `[registry]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Remote health-check registry endpoint; empty disables it.
    #[serde(default)]
    pub endpoint_url: String,

    /// Directory of local service definition JSON files.
    #[serde(default = "default_registry_dir")]
    pub local_dir: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            endpoint_url: String::new(),
            local_dir: default_registry_dir(),
        }
    }
}

fn default_registry_dir() -> String {
    "~/stacharvest-data/services".into()
}

/// `[datastore]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatastoreConfig {
    /// Directory for extracted source collection artifacts and the index DB.
    #[serde(default = "default_source_data_dir")]
    pub source_data_dir: String,

    /// Directory for transformed STAC collection artifacts.
    #[serde(default = "default_stac_data_dir")]
    pub stac_data_dir: String,
}

impl Default for DatastoreConfig {
    fn default() -> Self {
        Self {
            source_data_dir: default_source_data_dir(),
            stac_data_dir: default_stac_data_dir(),
        }
    }
}

fn default_source_data_dir() -> String {
    "~/stacharvest-data/source".into()
}
fn default_stac_data_dir() -> String {
    "~/stacharvest-data/stac".into()
}

/// `[extract]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// Records requested per page from source services.
    #[serde(default = "default_page_size")]
    pub page_size: u64,

    /// Optional cap on records extracted per collection (testing aid).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_items: Option<u64>,

    /// HTTP timeout for source service calls, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_items: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_page_size() -> u64 {
    100
}
fn default_timeout_secs() -> u64 {
    30
}

/// `[ingest]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Destination STAC API root; empty disables ingestion.
    #[serde(default)]
    pub stac_api_url: String,

    /// Name of the env var holding the admin token (never the token itself).
    #[serde(default = "default_auth_token_env")]
    pub auth_token_env: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            stac_api_url: String::new(),
            auth_token_env: default_auth_token_env(),
        }
    }
}

fn default_auth_token_env() -> String {
    "STAC_API_AUTH_TOKEN".into()
}

/// `[policies]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoliciesConfig {
    /// Collection-id include patterns (regex; empty = include all).
    #[serde(default)]
    pub include_patterns: Vec<String>,

    /// Collection-id exclude patterns (regex).
    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    /// Abort a collection's transform on the first invalid record instead of
    /// skip-and-report.
    #[serde(default)]
    pub abort_on_invalid: bool,
}

impl Default for PoliciesConfig {
    fn default() -> Self {
        Self {
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            abort_on_invalid: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Collection selection policy (runtime, compiled from config)
// ---------------------------------------------------------------------------

/// Compiled include/exclude patterns applied to collection identifiers.
#[derive(Debug, Default)]
pub struct CollectionPolicy {
    include: Vec<regex::Regex>,
    exclude: Vec<regex::Regex>,
}

impl CollectionPolicy {
    /// Compile the configured patterns; invalid patterns are a config error.
    pub fn from_config(config: &PoliciesConfig) -> Result<Self> {
        let compile = |patterns: &[String]| -> Result<Vec<regex::Regex>> {
            patterns
                .iter()
                .map(|p| {
                    regex::Regex::new(p).map_err(|e| {
                        HarvestError::config(format!("invalid collection pattern `{p}`: {e}"))
                    })
                })
                .collect()
        };
        Ok(Self {
            include: compile(&config.include_patterns)?,
            exclude: compile(&config.exclude_patterns)?,
        })
    }

    /// True when the collection id passes the include/exclude patterns.
    pub fn allows(&self, collection_id: &str) -> bool {
        if self.exclude.iter().any(|p| p.is_match(collection_id)) {
            return false;
        }
        if self.include.is_empty() {
            return true;
        }
        self.include.iter().any(|p| p.is_match(collection_id))
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.stacharvest/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| HarvestError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.stacharvest/stacharvest.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| HarvestError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| HarvestError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| HarvestError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| HarvestError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| HarvestError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Expand a leading `~/` against the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Check that the ingest auth token env var is set and non-empty.
pub fn validate_auth_token(config: &AppConfig) -> Result<String> {
    let var_name = &config.ingest.auth_token_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(HarvestError::config(format!(
            "ingest auth token not found. Set the {var_name} environment variable."
        ))),
    }
}
