use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use triage_core::config;
use triage_core::pipeline;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let cfg = config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Build { inputs, json } => {
            let summary = pipeline::run_build(&cfg, &inputs).await?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "status": "ok",
                        "loaded": summary.loaded,
                        "indexed": summary.indexed,
                        "nlist": summary.nlist,
                    }))?
                );
            } else {
                println!(
                    "build: loaded {}, indexed {}, nlist {}",
                    summary.loaded, summary.indexed, summary.nlist
                );
            }
        }
        Commands::Enrich {
            inputs,
            output,
            json,
        } => {
            let summary = pipeline::run_enrich(&cfg, &inputs, &output).await?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "status": "ok",
                        "loaded": summary.loaded,
                        "enriched": summary.enriched,
                        "skipped": summary.skipped,
                        "output": output,
                    }))?
                );
            } else {
                println!(
                    "enrich: loaded {}, enriched {}, skipped {}",
                    summary.loaded, summary.enriched, summary.skipped
                );
            }
        }
        Commands::Search { query, topk } => {
            let results = pipeline::run_search(&cfg, &query, topk).await?;
            if results.is_empty() {
                println!("no similar vulnerabilities found");
            } else {
                for m in &results {
                    println!(
                        "{}  distance={:.4}  {}",
                        m.entry.id,
                        m.distance,
                        if m.entry.title.is_empty() {
                            &m.entry.description
                        } else {
                            &m.entry.title
                        }
                    );
                }
            }
        }
    }
    Ok(())
}

#[derive(Parser)]
#[command(name = "vuln-triage")]
#[command(about = "Vulnerability matching and CVSS enrichment", long_about = None)]
struct Cli {
    /// Path to config TOML
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the vector index from vulnerability JSON files
    Build {
        /// Input JSON files or directories
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Output JSON summary
        #[arg(long)]
        json: bool,
    },
    /// Resolve CVSS vectors and generate remediation text
    Enrich {
        /// Input JSON files or directories
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Output file for enriched records
        #[arg(short, long, default_value = "enriched.json")]
        output: PathBuf,
        /// Output JSON summary
        #[arg(long)]
        json: bool,
    },
    /// Query the index for similar vulnerabilities
    Search {
        /// Query text to embed and search
        query: String,
        /// Number of results
        #[arg(short = 'k', long, default_value_t = 5)]
        topk: usize,
    },
}
