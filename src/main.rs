use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use docvec::config::{SearchMethod, Settings};
use docvec::loader::PAGE_KEY;
use docvec::{embedder, IndexBuilder, QueryService, VectorIndex};

#[derive(Parser)]
#[command(name = "docvec")]
#[command(version = "0.1")]
#[command(about = "Index documents into a vector store and query them", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load, chunk and embed a document, then save the index
    Build {
        document: PathBuf,
        #[arg(long)]
        index: Option<PathBuf>,
        #[arg(long)]
        chunk_size: Option<usize>,
        #[arg(long)]
        overlap: Option<usize>,
    },
    /// Return the chunks most similar to a query
    Query {
        text: String,
        #[arg(long)]
        index: Option<PathBuf>,
        #[arg(short)]
        k: Option<usize>,
        #[arg(long, value_enum)]
        method: Option<SearchMethod>,
    },
    /// Print every chunk stored in an index
    List {
        #[arg(long)]
        index: Option<PathBuf>,
    },
    /// Print the effective configuration
    Config,
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::new().filter_or("DOCVEC_LOG", default_level))
        .init();
}

fn build_command(state: &Settings, document: &Path) -> Result<()> {
    let embedder = embedder::from_config(&state.embedder_config())?;
    let report = IndexBuilder::new(embedder.as_ref())
        .build_index(document, &state.index_path, state.chunk_size, state.overlap)
        .with_context(|| format!("Failed to build index from '{}'", document.display()))?;

    println!("Loaded {} document unit(s).", report.units);
    println!("Split into {} chunks.", report.chunks);
    println!("Vector store created and saved at {}", state.index_path.display());
    Ok(())
}

fn query_command(state: &Settings, text: &str) -> Result<()> {
    let embedder = embedder::from_config(&state.embedder_config())?;
    let mut service = QueryService::open(embedder.as_ref(), &state.index_path)
        .with_context(|| format!("Failed to open index '{}'", state.index_path.display()))?;
    if state.search_method != SearchMethod::Exact {
        service = service.with_ann();
    }

    let (results, timings) = service
        .query_timed(text, state.top_k, state.search_method)
        .context("Query failed")?;

    let output = serde_json::json!({
        "query": text,
        "search_method": state.search_method,
        "database_record_count": service.index().len(),
        "results": results.iter().enumerate().map(|(rank, hit)| {
            serde_json::json!({
                "rank": rank + 1,
                "score": hit.score,
                "text": hit.chunk.text,
                "metadata": hit.chunk.metadata,
                "sequence_index": hit.chunk.sequence_index,
            })
        }).collect::<Vec<_>>(),
        "actual_results_count": results.len(),
        "requested_results_count": state.top_k,
        "elapsed_ms": timings.total_duration.as_secs_f64() * 1000.0,
    });

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn list_command(state: &Settings) -> Result<()> {
    let index = VectorIndex::load(&state.index_path)
        .with_context(|| format!("Failed to open index '{}'", state.index_path.display()))?;
    for (i, chunk) in index.chunks().iter().enumerate() {
        let page = chunk.metadata.get(PAGE_KEY).map(String::as_str).unwrap_or("-");
        let preview: String = chunk.text.chars().take(60).collect();
        println!("{}\tpage={}\tseq={}\t{:?}", i, page, chunk.sequence_index, preview);
    }
    Ok(())
}

fn config_command(state: &Settings) -> Result<()> {
    state.print_config();
    Ok(())
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_logging(args.verbose);

    let mut state = Settings::load()?;

    match args.command {
        Commands::Build {
            document,
            index,
            chunk_size,
            overlap,
        } => {
            state.index_path = index.unwrap_or(state.index_path);
            state.chunk_size = chunk_size.unwrap_or(state.chunk_size);
            state.overlap = overlap.unwrap_or(state.overlap);
            state.validate()?;
            build_command(&state, &document)?
        }
        Commands::Query {
            text,
            index,
            k,
            method,
        } => {
            state.index_path = index.unwrap_or(state.index_path);
            state.top_k = k.unwrap_or(state.top_k);
            state.search_method = method.unwrap_or(state.search_method);
            state.validate()?;
            query_command(&state, &text)?
        }
        Commands::List { index } => {
            state.index_path = index.unwrap_or(state.index_path);
            list_command(&state)?
        }
        Commands::Config => config_command(&state)?,
    }
    Ok(())
}
