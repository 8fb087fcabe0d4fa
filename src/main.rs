//! CLI entry point for the embedding-space index.
//!
//! Imports embeddings into collections, manages collection weights and
//! activation, and runs single-collection or federated searches.

use anyhow::{Context, Result, anyhow, bail};
use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use semspace::display::{
    create_collections_table, create_federated_table, create_neighbor_table, create_params_table,
    create_progress_bar, create_spinner, track_federation,
};
use semspace::{CollectionId, FederatedQuery, Settings, SpaceEngine, read_import_file};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Space-filling-curve embedding index
#[derive(Parser)]
#[command(
    name = "semspace",
    version = env!("CARGO_PKG_VERSION"),
    about = "Embedding index with federated semantic search",
    long_about = "Index embeddings along a space-filling curve and search across weighted collections.",
    next_line_help = true,
    styles = clap_cargo_style()
)]
struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
enum Commands {
    /// Initialize project
    #[command(about = "Set up .semspace directory with default configuration")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Import nodes from a JSONL file
    #[command(
        about = "Import embeddings into a collection, creating it on first import",
        after_help = "Each line: {\"id\": 1, \"embedding\": [0.1, 0.2, ...], \"payload\": {...}}"
    )]
    Import {
        /// Collection name
        collection: String,

        /// JSONL file with one node per line
        file: PathBuf,
    },

    /// Manage collections
    Collections {
        #[command(subcommand)]
        action: CollectionAction,
    },

    /// Search one collection
    Search {
        /// Collection id
        collection: u32,

        #[command(flatten)]
        query: QueryArgs,

        /// Number of results (default: federation.default_k)
        #[arg(short, long)]
        k: Option<usize>,
    },

    /// Search every active collection
    Federated {
        #[command(flatten)]
        query: QueryArgs,

        /// Number of results (default: federation.default_k)
        #[arg(short, long)]
        k: Option<usize>,

        /// Collections that must respond before results count as complete
        #[arg(long)]
        min_collections: Option<usize>,

        /// Restrict the search to these collection ids
        #[arg(long, num_args = 1..)]
        only: Vec<u32>,
    },

    /// Show current configuration settings
    #[command(about = "Display active settings from .semspace/settings.toml")]
    Config,
}

#[derive(Subcommand)]
enum CollectionAction {
    /// List collections with weight, activation and node count
    List,
    /// Show fitted quantization bounds of a collection
    Show { id: u32 },
    /// Set the federation weight (clamped to 0.1..=2.0)
    Weight { id: u32, weight: f32 },
    /// Include a collection in federated search
    Activate { id: u32 },
    /// Exclude a collection from federated search
    Deactivate { id: u32 },
    /// Delete a collection with its index and nodes
    Delete { id: u32 },
    /// Re-fit bounds from all stored embeddings and re-encode every node
    Refit { id: u32 },
}

#[derive(clap::Args)]
struct QueryArgs {
    /// Query embedding as a JSON array
    #[arg(long, conflicts_with = "text", required_unless_present = "text")]
    vector: Option<String>,

    /// Query text, embedded with the configured model
    #[arg(long)]
    text: Option<String>,
}

fn collection_id(raw: u32) -> Result<CollectionId> {
    CollectionId::new(raw).ok_or_else(|| anyhow!("collection id must be non-zero"))
}

async fn query_embedding(engine: &SpaceEngine, args: &QueryArgs) -> Result<Vec<f32>> {
    if let Some(raw) = &args.vector {
        return serde_json::from_str(raw).context("--vector must be a JSON array of numbers");
    }
    let Some(text) = &args.text else {
        bail!("either --vector or --text is required");
    };
    let guarded = engine.embed_query(text).await;
    if guarded.placeholder {
        eprintln!("Warning: embedding provider unavailable, using a placeholder embedding");
    }
    Ok(guarded.embedding)
}

fn init_tracing(debug: bool) {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .with_target(false)
        .init();
}

/// Cancels the returned token on Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            child.cancel();
        }
    });
    token
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &cli.config {
        Settings::load_from(config_path).map_err(|e| {
            anyhow!(
                "Configuration error loading from {}: {e}",
                config_path.display()
            )
        })?
    } else {
        Settings::load().unwrap_or_else(|e| {
            eprintln!("Configuration error: {e}");
            Settings::default()
        })
    };
    if cli.debug {
        config.debug = true;
    }
    init_tracing(config.debug);

    match cli.command {
        Commands::Init { force } => {
            let path = Settings::init_config_file(force).map_err(|e| anyhow!("{e}"))?;
            println!("Created configuration file at: {}", path.display());
            println!("Edit this file to customize your settings.");
            return Ok(());
        }
        Commands::Config => {
            println!("Current Configuration:");
            println!("{}", "=".repeat(50));
            println!("{}", toml::to_string_pretty(&config)?);
            return Ok(());
        }
        _ => {}
    }

    let engine = SpaceEngine::open(Arc::new(config)).context("Failed to open the index")?;

    match cli.command {
        Commands::Init { .. } | Commands::Config => {}

        Commands::Import { collection, file } => {
            let start = Instant::now();
            let records = read_import_file(&file)?;
            let spinner = create_spinner(&format!(
                "Importing {} nodes into '{collection}'",
                records.len()
            ));
            let summary = engine.import(&collection, records)?;
            spinner.finish_and_clear();
            engine.save()?;

            if let Some(id) = summary.collection {
                let verb = if summary.created { "Created" } else { "Updated" };
                println!("{verb} collection {id} '{collection}'");
            }
            println!(
                "Imported {} nodes in {:.2}s",
                summary.inserted,
                start.elapsed().as_secs_f64()
            );
            for (node, reason) in &summary.rejected {
                eprintln!("  rejected node {node}: {reason}");
            }
        }

        Commands::Collections { action } => match action {
            CollectionAction::List => {
                let collections = engine.collections()?;
                if collections.is_empty() {
                    println!("No collections yet. Run 'semspace import <name> <file>' to create one.");
                } else {
                    println!("{}", create_collections_table(&collections));
                }
            }
            CollectionAction::Show { id } => {
                let id = collection_id(id)?;
                let meta = engine.registry().get(id)?;
                println!("{} '{}': {} nodes", meta.id, meta.name, meta.node_count);
                match engine.index(id)?.params() {
                    Some(params) => {
                        println!(
                            "{} dimensions x {} bits, {:?} reduction",
                            params.dims.get(),
                            params.bits.get(),
                            params.strategy
                        );
                        println!("{}", create_params_table(&params));
                    }
                    None => println!("Not fitted yet"),
                }
            }
            CollectionAction::Weight { id, weight } => {
                let meta = engine.set_weight(collection_id(id)?, weight)?;
                engine.save()?;
                println!("Collection {} weight set to {:.2}", meta.id, meta.weight);
            }
            CollectionAction::Activate { id } => {
                engine.set_active(collection_id(id)?, true)?;
                engine.save()?;
                println!("Collection {id} activated");
            }
            CollectionAction::Deactivate { id } => {
                engine.set_active(collection_id(id)?, false)?;
                engine.save()?;
                println!("Collection {id} deactivated");
            }
            CollectionAction::Delete { id } => {
                if engine.delete_collection(collection_id(id)?)? {
                    engine.save()?;
                    println!("Deleted collection {id}");
                } else {
                    println!("Collection {id} does not exist");
                }
            }
            CollectionAction::Refit { id } => {
                let params = engine.refit(collection_id(id)?)?;
                engine.save()?;
                println!("Re-fitted collection {id}");
                println!("{}", create_params_table(&params));
            }
        },

        Commands::Search {
            collection,
            query,
            k,
        } => {
            let id = collection_id(collection)?;
            let embedding = query_embedding(&engine, &query).await?;
            let k = k.unwrap_or(engine.settings().federation.default_k);
            let cancel = cancel_on_ctrl_c();
            let result = engine.search(id, &embedding, k, &cancel)?;
            engine.save()?;

            println!("{}", create_neighbor_table(&result));
            tracing::debug!(
                "{} candidates after {} widenings, final radius {:#x}",
                result.candidates,
                result.widenings,
                result.final_radius
            );
        }

        Commands::Federated {
            query,
            k,
            min_collections,
            only,
        } => {
            let embedding = query_embedding(&engine, &query).await?;
            let settings = engine.settings();
            let mut request = FederatedQuery::new(embedding, k.unwrap_or(settings.federation.default_k))
                .with_min_collections(
                    min_collections.unwrap_or(settings.federation.min_collections),
                );
            if !only.is_empty() {
                let ids = only
                    .into_iter()
                    .map(collection_id)
                    .collect::<Result<Vec<_>>>()?;
                request = request.with_allow_list(ids);
            }

            let collections = engine.collections()?;
            let targets = collections
                .iter()
                .filter(|meta| request.includes(meta))
                .count() as u64;
            let tracker = track_federation(
                engine.events(),
                create_progress_bar(targets, "Searching collections"),
            );

            let response = engine.federated(request, cancel_on_ctrl_c()).await?;
            if let Ok(bar) = tracker.await {
                bar.finish_and_clear();
            }
            engine.save()?;

            let names: HashMap<CollectionId, String> = collections
                .into_iter()
                .map(|meta| (meta.id, meta.name))
                .collect();
            println!("{}", create_federated_table(&response.hits, &names));
            for (id, reason) in &response.failed {
                eprintln!("  collection {id} failed: {reason}");
            }
            for id in &response.timed_out {
                eprintln!("  collection {id} timed out");
            }
            if response.partial {
                eprintln!(
                    "Partial result: {} collections responded",
                    response.responded.len()
                );
            }
        }
    }

    Ok(())
}
