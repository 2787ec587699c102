use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nfp_core::EngineConfig;
use nfp_metrics::{MetricsCollector, MetricsServer};
use nfp_nft::{Connection, Engine, Ruleset};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nfplane")]
#[command(version, about = "nf_tables control plane", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the requests a ruleset compiles to
    Plan {
        #[arg(short, long, default_value = "ruleset.yaml")]
        file: PathBuf,
    },
    /// Apply a ruleset to an in-process engine and print the result
    Apply {
        #[arg(short, long, default_value = "ruleset.yaml")]
        file: PathBuf,
        /// Engine configuration (limits, log filter)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Print the namespace status as JSON
        #[arg(long)]
        json: bool,
    },
    /// Apply a ruleset and serve Prometheus metrics
    Metrics {
        #[arg(short, long, default_value = "ruleset.yaml")]
        file: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, default_value = "9138")]
        port: u16,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Plan { file } => {
            init_tracing(&EngineConfig::default());
            let ruleset = Ruleset::from_file(&file)?;
            ruleset.display()?;
        }
        Commands::Apply { file, config, json } => {
            let config = load_config(config.as_deref())?;
            init_tracing(&config);
            let engine = Engine::new(config);
            // Owner tables live as long as the connection that created them.
            let _conn = apply(&engine, &file, !json)?;

            let status = engine.status();
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!();
                status.display();
            }
        }
        Commands::Metrics { file, config, port } => {
            let config = load_config(config.as_deref())?;
            init_tracing(&config);
            let collector = Arc::new(MetricsCollector::new()?);
            let engine = Engine::new(config).with_observer(collector.clone());
            let _conn = apply(&engine, &file, true)?;

            println!("🚀 Starting metrics server on port {}...", port);
            let server = MetricsServer::new(collector, engine, port);
            tokio::runtime::Runtime::new()?.block_on(server.serve())?;
        }
    }

    Ok(())
}

fn init_tracing(config: &EngineConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::from_file(path),
        None => Ok(EngineConfig::default()),
    }
}

/// Send every planned request of the ruleset over one connection, stopping at the first error.
fn apply(engine: &Engine, file: &Path, verbose: bool) -> Result<Connection> {
    let ruleset = Ruleset::from_file(file)?;
    let requests = ruleset.requests()?;
    let conn = engine.connect();

    if verbose {
        println!("⚡ Applying {} ({} requests)", file.display(), requests.len());
    }
    for (i, request) in requests.iter().enumerate() {
        if verbose {
            println!("[{}/{}] {}", i + 1, requests.len(), request.description);
        }
        conn.execute(&request.message)
            .with_context(|| format!("Request failed: {}", request.description))?;
    }
    if verbose {
        println!("✅ Ruleset applied");
    }

    Ok(conn)
}
