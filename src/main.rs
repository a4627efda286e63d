//! tog CLI: Think-on-Graph question answering over a partitioned graph.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use serde::Serialize;

use tog_engine::config::ToGConfig;
use tog_engine::graph::neighborhood::NeighborhoodProvider;
use tog_engine::link::{DenseRetriever, EntityLinker};
use tog_engine::llm::OllamaClient;
use tog_engine::partition::PartitionKey;

#[derive(Parser)]
#[command(name = "tog", version, about = "Think-on-Graph reasoning over a knowledge graph")]
struct Cli {
    /// TOML config file. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Knowledge base (partition key) to query.
    #[arg(long, global = true, default_value = "default")]
    partition: PartitionKey,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a question by reasoning over the graph.
    Ask {
        #[arg(long)]
        question: String,

        /// Maximum number of relational hops (config default when omitted).
        #[arg(long)]
        max_depth: Option<usize>,

        /// Beam width (config default when omitted).
        #[arg(long)]
        max_width: Option<usize>,
    },

    /// Link entity mentions to canonical node names.
    Link {
        /// Comma-separated mentions, e.g. "drill press,workshop".
        #[arg(long, value_delimiter = ',')]
        mentions: Vec<String>,
    },

    /// Show the neighborhood of an entity.
    Neighbors {
        #[arg(long)]
        entity: String,

        #[arg(long, default_value = "1")]
        depth: usize,
    },

    /// Shortest relation paths between two entities.
    Path {
        #[arg(long)]
        source: String,

        #[arg(long)]
        target: String,

        #[arg(long, default_value = "3")]
        max_hops: usize,
    },

    /// Print the effective configuration as TOML.
    Config,
}

#[derive(Serialize)]
struct LinkedMention {
    mention: String,
    linked: Vec<String>,
    nearest: Option<(String, f32)>,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).into_diagnostic()?);
    Ok(())
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,hnsw_rs=warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = ToGConfig::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Ask {
            question,
            max_depth,
            max_width,
        } => {
            let chat = OllamaClient::new(config.llm.clone());
            if !chat.probe() {
                tracing::warn!(
                    url = %config.llm.base_url,
                    model = chat.model(),
                    "model server not ready, requests may fail"
                );
            }
            let engine = config.build_engine(cli.partition, Arc::new(chat))?;
            let result = engine.reason(
                &question,
                max_depth.unwrap_or(config.engine.default_max_depth),
                max_width.unwrap_or(config.engine.default_max_width),
            );
            print_json(&result)?;
        }

        Commands::Link { mentions } => {
            let index = config.load_index(&cli.partition).map(Arc::new);
            let mut linker = EntityLinker::new(config.open_store()?, cli.partition);
            if let Some(index) = &index {
                linker = linker.with_retriever(Arc::clone(index) as Arc<dyn DenseRetriever>);
            }
            let threshold = config.engine.linking_threshold;

            let mut out = Vec::with_capacity(mentions.len());
            for mention in mentions {
                let nearest = index
                    .as_ref()
                    .and_then(|i| i.top1(&mention).ok().flatten());
                let linked = linker.link(std::slice::from_ref(&mention), threshold);
                out.push(LinkedMention {
                    mention,
                    linked,
                    nearest,
                });
            }
            print_json(&out)?;
        }

        Commands::Neighbors { entity, depth } => {
            let provider = NeighborhoodProvider::new(config.open_store()?)
                .with_limit(config.engine.neighbor_limit);
            print_json(&provider.neighbors(&entity, &cli.partition, depth))?;
        }

        Commands::Path {
            source,
            target,
            max_hops,
        } => {
            let provider = NeighborhoodProvider::new(config.open_store()?);
            print_json(&provider.relation_paths(&source, &target, &cli.partition, max_hops))?;
        }

        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}
