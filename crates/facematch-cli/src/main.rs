use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use facematch_core::{
    batch::BatchError, BatchRegenerationJob, CandidateCorpus, CandidateEntity, DescriptorRecord,
    DescriptorStore, FaceProvider, ImageInput, MatchSearch, ProviderConfig, ProviderFactory,
    ProviderRegistry, SearchError,
};
use facematch_providers::DefaultProviderFactory;
use facematch_store::SqliteStore;
use tracing_subscriber::EnvFilter;

mod config;
use config::Config;

#[derive(Parser)]
#[command(name = "facematch", about = "Photo-based identity resolution CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register an entity's photo for matching
    Register {
        /// Unique entity identifier
        #[arg(long)]
        id: String,
        /// Display name
        #[arg(long)]
        name: String,
        /// Contact phone shown with matches
        #[arg(long)]
        phone: Option<String>,
        /// Relationship status shown with matches
        #[arg(long)]
        entity_status: Option<String>,
        /// Photo: file path, remote URL, or data: URI
        photo: String,
    },
    /// Remove an entity and its descriptor record
    Remove {
        /// Entity ID to remove
        id: String,
    },
    /// Search registered entities by photo
    Search {
        /// Override the provider's similarity threshold
        #[arg(short, long)]
        threshold: Option<f32>,
        /// Query photo: file path, remote URL, or data: URI
        photo: String,
    },
    /// Re-extract descriptors for every registered entity
    Regenerate,
    /// Show corpus and provider status
    Status,
    /// Manage recognition provider configurations
    Provider {
        #[command(subcommand)]
        command: ProviderCommands,
    },
}

#[derive(Subcommand)]
enum ProviderCommands {
    /// Import a provider config from a TOML file
    Import {
        /// TOML file with provider_type, credentials and thresholds
        file: PathBuf,
    },
    /// List stored provider configs
    List,
    /// Make a config the single active one
    Activate {
        /// Config ID to activate
        id: String,
    },
    /// Show the currently active config
    Show,
}

struct App {
    config: Config,
    store: Arc<SqliteStore>,
    registry: Arc<ProviderRegistry>,
    factory: Arc<DefaultProviderFactory>,
}

impl App {
    async fn open(config: Config) -> Result<Self> {
        if let Some(parent) = config.db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating data directory {}", parent.display()))?;
        }
        let store = Arc::new(SqliteStore::open(&config.db_path).await?);
        let registry = Arc::new(ProviderRegistry::with_ttl(
            Arc::clone(&store) as _,
            config.cache_ttl,
        ));
        let factory =
            Arc::new(DefaultProviderFactory::new().with_http_timeout(config.http_timeout));
        Ok(Self {
            config,
            store,
            registry,
            factory,
        })
    }

    fn match_search(&self) -> MatchSearch {
        MatchSearch::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.factory) as Arc<dyn ProviderFactory>,
            Arc::clone(&self.store) as Arc<dyn CandidateCorpus>,
            Arc::clone(&self.store) as Arc<dyn DescriptorStore>,
        )
        .with_compare_concurrency(self.config.compare_concurrency)
    }

    fn batch_job(&self) -> BatchRegenerationJob {
        BatchRegenerationJob::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.factory) as Arc<dyn ProviderFactory>,
            Arc::clone(&self.store) as Arc<dyn CandidateCorpus>,
            Arc::clone(&self.store) as Arc<dyn DescriptorStore>,
        )
        .with_pacing(self.config.batch_size, self.config.batch_delay)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let app = App::open(Config::from_env()).await?;

    match cli.command {
        Commands::Register {
            id,
            name,
            phone,
            entity_status,
            photo,
        } => register(&app, id, name, phone, entity_status, photo).await,
        Commands::Remove { id } => {
            if app.store.remove_entity(&id).await? {
                println!("removed entity {id}");
                Ok(())
            } else {
                bail!("unknown entity {id}")
            }
        }
        Commands::Search { threshold, photo } => search(&app, threshold, &photo).await,
        Commands::Regenerate => regenerate(&app).await,
        Commands::Status => status(&app).await,
        Commands::Provider { command } => provider(&app, command).await,
    }
}

async fn register(
    app: &App,
    id: String,
    name: String,
    phone: Option<String>,
    entity_status: Option<String>,
    photo: String,
) -> Result<()> {
    app.store
        .register_entity(CandidateEntity {
            entity_id: id.clone(),
            photo_url: photo.clone(),
            name,
            phone,
            status: entity_status,
        })
        .await?;

    // Extract eagerly when a provider is available; a soft failure leaves
    // a pending record for the next regeneration run to pick up.
    let Some(provider_config) = app.registry.get_active().await? else {
        println!("registered {id}; no active provider, descriptor extraction deferred");
        return Ok(());
    };
    let provider = app.factory.create(&provider_config);

    let record = match provider.extract(&ImageInput::parse(&photo)).await {
        Ok(Some(descriptor_id)) => DescriptorRecord::extracted(
            id.as_str(),
            provider.provider_type(),
            photo.as_str(),
            descriptor_id,
        ),
        Ok(None) => {
            tracing::warn!(entity = %id, "no usable face in registered photo");
            DescriptorRecord::pending(id.as_str(), provider.provider_type(), photo.as_str())
        }
        Err(err) => {
            tracing::warn!(entity = %id, error = %err, "descriptor extraction failed");
            DescriptorRecord::pending(id.as_str(), provider.provider_type(), photo.as_str())
        }
    };
    let status = record.status;
    app.store.upsert(record).await?;
    println!("registered {id} (descriptor: {status})");
    Ok(())
}

async fn search(app: &App, threshold: Option<f32>, photo: &str) -> Result<()> {
    // An empty result list is ambiguous between "no provider" and "no
    // matches"; check the registry first so the user can tell them apart.
    if app.registry.get_active().await?.is_none() {
        println!("no active provider; search unavailable");
        return Ok(());
    }

    match app
        .match_search()
        .search(&ImageInput::parse(photo), threshold)
        .await
    {
        Ok(results) => {
            println!("{}", serde_json::to_string_pretty(&results)?);
            Ok(())
        }
        Err(SearchError::NoFaceDetected) => bail!("no face detected in query photo"),
        Err(err) => Err(err.into()),
    }
}

async fn regenerate(app: &App) -> Result<()> {
    match app.batch_job().run().await {
        Ok(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Err(BatchError::ProviderUnavailable) => {
            bail!("no active provider; nothing to regenerate")
        }
        Err(err) => Err(err.into()),
    }
}

async fn status(app: &App) -> Result<()> {
    let entities = app.store.count_entities().await?;
    let needing = app.store.list_needing_descriptor().await?.len();
    let provider = app.registry.get_active().await?.map(|cfg| {
        serde_json::json!({
            "id": cfg.id,
            "provider_type": cfg.provider_type().as_str(),
            "similarity_threshold": cfg.similarity_threshold,
            "max_results": cfg.max_results,
        })
    });

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "db_path": app.config.db_path,
            "entities": entities,
            "descriptors_needing_work": needing,
            "provider": provider,
        }))?
    );
    Ok(())
}

async fn provider(app: &App, command: ProviderCommands) -> Result<()> {
    match command {
        ProviderCommands::Import { file } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let mut config: ProviderConfig =
                toml::from_str(&text).context("parsing provider config")?;
            if config.id.is_empty() {
                config.id = uuid::Uuid::new_v4().to_string();
            }
            config.validate()?;
            let summary = format!("{} ({})", config.id, config.provider_type());
            app.store.save_config(config).await?;
            app.registry.invalidate();
            println!("imported provider config {summary}");
            Ok(())
        }
        ProviderCommands::List => {
            let configs = app.store.list_configs().await?;
            if configs.is_empty() {
                println!("no provider configs");
                return Ok(());
            }
            for cfg in configs {
                println!(
                    "{}  {}  active={} enabled={} threshold={} max_results={}",
                    cfg.id,
                    cfg.provider_type(),
                    cfg.active,
                    cfg.enabled,
                    cfg.similarity_threshold,
                    cfg.max_results,
                );
            }
            Ok(())
        }
        ProviderCommands::Activate { id } => {
            if app.store.activate_config(&id).await? {
                app.registry.invalidate();
                println!("activated provider config {id}");
                Ok(())
            } else {
                bail!("no provider config with id {id}")
            }
        }
        ProviderCommands::Show => {
            match app.registry.get_active().await? {
                Some(cfg) => println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "id": cfg.id,
                        "provider_type": cfg.provider_type().as_str(),
                        "active": cfg.active,
                        "enabled": cfg.enabled,
                        "similarity_threshold": cfg.similarity_threshold,
                        "max_results": cfg.max_results,
                        "updated_at": cfg.updated_at,
                    }))?
                ),
                None => println!("no active provider"),
            }
            Ok(())
        }
    }
}
