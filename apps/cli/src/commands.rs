//! CLI command definitions, routing, and tracing setup.

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use stacharvest_core::{CollectionOutcome, Crawler, StageReport};
use stacharvest_shared::schemas::{SchemaObjectKind, schema_json, schema_names};
use stacharvest_shared::{
    AppConfig, CollectionFilters, ExternalServiceType, init_config, load_config,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// stacharvest — planetary-science data services into STAC catalogs.
#[derive(Parser)]
#[command(
    name = "stacharvest",
    version,
    about = "Harvest planetary data services (EPN-TAP, PDS-ODE, WFS) into STAC catalogs.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Collection filter flags shared by `collections` and `process`.
#[derive(Debug, clap::Args)]
pub(crate) struct FilterArgs {
    /// Collection ID filter (substring match).
    #[arg(long, default_value = "")]
    id: String,

    /// Service type filter: EPNTAP, PDSODE or WFS.
    #[arg(long)]
    service_type: Option<String>,

    /// Target body filter (substring match).
    #[arg(long, default_value = "")]
    target: String,

    /// Only extracted collections.
    #[arg(long, conflicts_with = "no_extracted")]
    extracted: bool,
    /// Only not-yet-extracted collections.
    #[arg(long)]
    no_extracted: bool,

    /// Only transformed collections.
    #[arg(long, conflicts_with = "no_transformed")]
    transformed: bool,
    /// Only not-yet-transformed collections.
    #[arg(long)]
    no_transformed: bool,

    /// Only ingested collections.
    #[arg(long, conflicts_with = "no_ingested")]
    ingested: bool,
    /// Only not-yet-ingested collections.
    #[arg(long)]
    no_ingested: bool,
}

impl FilterArgs {
    fn to_filters(&self) -> Result<CollectionFilters> {
        let service_type = match self.service_type.as_deref() {
            None => None,
            Some(tag) => Some(parse_service_type(tag)?),
        };
        Ok(CollectionFilters {
            id: (!self.id.is_empty()).then(|| self.id.clone()),
            service_type,
            target: (!self.target.is_empty()).then(|| self.target.clone()),
            extracted: tri_state(self.extracted, self.no_extracted),
            transformed: tri_state(self.transformed, self.no_transformed),
            ingested: tri_state(self.ingested, self.no_ingested),
        })
    }
}

fn tri_state(yes: bool, no: bool) -> Option<bool> {
    match (yes, no) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

fn parse_service_type(tag: &str) -> Result<ExternalServiceType> {
    match tag.to_uppercase().as_str() {
        "EPNTAP" => Ok(ExternalServiceType::Epntap),
        "PDSODE" => Ok(ExternalServiceType::PdsOde),
        "WFS" => Ok(ExternalServiceType::Wfs),
        other => Err(eyre!(
            "unknown service type '{other}': expected EPNTAP, PDSODE or WFS"
        )),
    }
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Initialise the datastore from the registered services.
    #[command(name = "init-ds")]
    InitDs,

    /// Show registered services, or one service's collections.
    Registry {
        /// Show collections for the service with this title.
        #[arg(short, long)]
        service_title: Option<String>,
    },

    /// Show source collections available in the datastore.
    Collections {
        #[command(flatten)]
        filters: FilterArgs,
    },

    /// Extract source collection records from the source service.
    Extract {
        /// Collection ID.
        #[arg(long)]
        id: String,

        /// Overwrite existing extraction artifacts.
        #[arg(short, long)]
        overwrite: bool,
    },

    /// Transform extracted records into STAC catalog files.
    Transform {
        /// Collection ID.
        #[arg(long)]
        id: String,

        /// Overwrite existing STAC artifacts.
        #[arg(short, long)]
        overwrite: bool,
    },

    /// Ingest transformed STAC records into the destination catalog.
    Ingest {
        /// Collection ID.
        #[arg(long)]
        id: String,

        /// Update destination records if they exist.
        #[arg(long)]
        update: bool,
    },

    /// Process collections end to end: extract, transform, ingest.
    Process {
        #[command(flatten)]
        filters: FilterArgs,

        /// Overwrite existing stage artifacts.
        #[arg(long)]
        overwrite: bool,
    },

    /// Show pipeline run history for a collection.
    Runs {
        /// Collection ID.
        #[arg(long)]
        id: String,
    },

    /// Show metadata schema information.
    Schemas {
        /// Print the JSON Schema document for --name/--type.
        #[arg(long)]
        get: bool,

        /// Schema name (e.g. PDSODE, EPNTAP, MARSSI_WFS, STAC).
        #[arg(long, default_value = "")]
        name: String,

        /// Schema object type: collection or item.
        #[arg(long = "type", default_value = "item")]
        object_type: String,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "stacharvest=info",
        1 => "stacharvest=debug",
        _ => "stacharvest=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
        Command::InitDs => cmd_init_ds().await,
        Command::Registry { service_title } => cmd_registry(service_title.as_deref()).await,
        Command::Collections { filters } => cmd_collections(&filters).await,
        Command::Extract { id, overwrite } => cmd_extract(&id, overwrite).await,
        Command::Transform { id, overwrite } => cmd_transform(&id, overwrite).await,
        Command::Ingest { id, update } => cmd_ingest(&id, update).await,
        Command::Process { filters, overwrite } => cmd_process(&filters, overwrite).await,
        Command::Runs { id } => cmd_runs(&id).await,
        Command::Schemas {
            get,
            name,
            object_type,
        } => cmd_schemas(get, &name, &object_type),
    }
}

async fn open_crawler() -> Result<Crawler> {
    let config: AppConfig = load_config()?;
    Ok(Crawler::new(config).await?)
}

fn spinner(message: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap()
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    bar.enable_steady_tick(std::time::Duration::from_millis(80));
    bar.set_message(message.to_string());
    bar
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

async fn cmd_init_ds() -> Result<()> {
    let crawler = open_crawler().await?;
    let bar = spinner("Resolving registries and enumerating collections");
    let count = crawler.init_datastore().await;
    bar.finish_and_clear();

    let count = count?;
    println!("Datastore initialised with {count} source collections.");
    Ok(())
}

async fn cmd_registry(service_title: Option<&str>) -> Result<()> {
    let crawler = open_crawler().await?;
    let services = crawler.registered_services().await?;

    match service_title {
        Some(title) => {
            let service = services
                .iter()
                .find(|s| s.title == title)
                .ok_or_else(|| eyre!("no registered service titled '{title}'"))?;

            let collections = crawler.service_collections(service).await?;
            println!();
            println!("{} collections found in {title}:", collections.len());
            for collection in &collections {
                println!("- {}", collection.collection_id);
            }
            println!();
        }
        None => {
            println!();
            println!("{} registered services found:", services.len());
            for service in &services {
                println!("- {} [{}] {}", service.title, service.service_type, service.url);
            }
            println!();
        }
    }
    Ok(())
}

async fn cmd_collections(filters: &FilterArgs) -> Result<()> {
    let crawler = open_crawler().await?;
    let collections = crawler
        .list_source_collections(&filters.to_filters()?)
        .await?;

    if collections.is_empty() {
        println!("No collections matching input filters.");
        return Ok(());
    }

    println!();
    println!("{} collections matching input filters:", collections.len());
    println!();
    println!(
        "{:<30}  {:<8}  {:<11}  {:>9}  {:<9}  {:<11}  {:<8}  {:<10}",
        "ID", "service", "schema", "items", "extracted", "transformed", "ingested", "target"
    );
    println!(
        "{}  {}  {}  {}  {}  {}  {}  {}",
        "-".repeat(30),
        "-".repeat(8),
        "-".repeat(11),
        "-".repeat(9),
        "-".repeat(9),
        "-".repeat(11),
        "-".repeat(8),
        "-".repeat(10)
    );
    for collection in &collections {
        let n_items = collection
            .n_items
            .map(|n| n.to_string())
            .unwrap_or_else(|| "?".into());
        println!(
            "{:<30}  {:<8}  {:<11}  {:>9}  {:<9}  {:<11}  {:<8}  {:<10}",
            collection.collection_id,
            collection.service.service_type.as_str(),
            collection.source_schema.as_str(),
            n_items,
            if collection.extracted { "Y" } else { "N" },
            if collection.transformed { "Y" } else { "N" },
            if collection.ingested { "Y" } else { "N" },
            collection.target.as_deref().unwrap_or("-"),
        );
    }
    println!();
    Ok(())
}

async fn cmd_extract(id: &str, overwrite: bool) -> Result<()> {
    let crawler = open_crawler().await?;
    info!(id, overwrite, "extracting collection");

    let bar = spinner(&format!("Extracting {id}"));
    let report = crawler.extract_collection(id, overwrite).await;
    bar.finish_and_clear();

    print_report("Extract", id, &report?);
    Ok(())
}

async fn cmd_transform(id: &str, overwrite: bool) -> Result<()> {
    let crawler = open_crawler().await?;
    info!(id, overwrite, "transforming collection");

    let bar = spinner(&format!("Transforming {id}"));
    let report = crawler.transform_collection(id, overwrite).await;
    bar.finish_and_clear();

    print_report("Transform", id, &report?);
    Ok(())
}

async fn cmd_ingest(id: &str, update: bool) -> Result<()> {
    let crawler = open_crawler().await?;
    info!(id, update, "ingesting collection");

    let bar = spinner(&format!("Ingesting {id}"));
    let report = crawler.ingest_collection(id, update).await;
    bar.finish_and_clear();

    print_report("Ingest", id, &report?);
    Ok(())
}

async fn cmd_process(filters: &FilterArgs, overwrite: bool) -> Result<()> {
    let crawler = open_crawler().await?;

    let bar = spinner("Processing collections");
    let outcomes = crawler
        .process_collections(&filters.to_filters()?, overwrite)
        .await;
    bar.finish_and_clear();

    let outcomes = outcomes?;
    let failed = outcomes.iter().filter(|o| o.error.is_some()).count();

    println!();
    for outcome in &outcomes {
        print_outcome(outcome);
    }
    println!();
    println!(
        "{} collections processed, {} failed.",
        outcomes.len() - failed,
        failed
    );
    Ok(())
}

async fn cmd_runs(id: &str) -> Result<()> {
    let crawler = open_crawler().await?;
    let runs = crawler.collection_runs(id).await?;

    if runs.is_empty() {
        println!("No recorded runs for {id}.");
        return Ok(());
    }

    println!();
    println!("{} runs recorded for {id}:", runs.len());
    for (stage, started_at, finished_at, stats) in &runs {
        println!(
            "  {:<10}  started {}  finished {}  {}",
            stage,
            started_at,
            finished_at.as_deref().unwrap_or("-"),
            stats.as_deref().unwrap_or(""),
        );
    }
    println!();
    Ok(())
}

fn cmd_schemas(get: bool, name: &str, object_type: &str) -> Result<()> {
    if !get {
        println!();
        println!("Known metadata schemas:");
        for (name, kinds) in schema_names() {
            println!("- {name} {kinds:?}");
        }
        println!();
        return Ok(());
    }

    if name.is_empty() {
        return Err(eyre!("--get requires --name"));
    }
    let kind: SchemaObjectKind = object_type.parse()?;
    println!("{}", schema_json(name, kind)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Output helpers
// ---------------------------------------------------------------------------

fn print_report(stage: &str, id: &str, report: &StageReport) {
    println!();
    println!("  {stage} {id}: {report}");
    println!();
}

fn print_outcome(outcome: &CollectionOutcome) {
    let stage = |report: &Option<StageReport>| match report {
        Some(report) => report.to_string(),
        None => "skipped".into(),
    };
    match &outcome.error {
        Some(error) => {
            println!("  {:<30}  ABORTED: {error}", outcome.collection_id);
        }
        None => {
            println!(
                "  {:<30}  extract: {} | transform: {} | ingest: {}",
                outcome.collection_id,
                stage(&outcome.extract),
                stage(&outcome.transform),
                stage(&outcome.ingest),
            );
        }
    }
}
