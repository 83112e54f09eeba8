//! Cost Lens CLI

use clap::{Parser, Subcommand, ValueEnum};
use cost_lens::cli::{OutputFormat, OutputFormatter};
use cost_lens::{AggregateOrder, CanonicalQuery, CostPipeline, PipelineConfig, PipelineState};
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "cost_lens")]
#[command(about = "Load a cost-and-usage export and query it locally")]
struct Cli {
    /// Data directory holding the database (overrides COST_LENS_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum QueryKind {
    Detail,
    Aggregate,
    All,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the export and materialize it as the cost table
    Load {
        /// Object key (overrides COST_LENS_OBJECT_KEY)
        #[arg(short, long)]
        key: Option<String>,

        /// Presign endpoint (overrides COST_LENS_PRESIGN_ENDPOINT)
        #[arg(short, long)]
        endpoint: Option<String>,

        /// Reload even if the table is already present
        #[arg(short, long)]
        force: bool,
    },

    /// Run the canonical queries against the loaded table
    Query {
        /// Which result set to print
        #[arg(short, long, value_enum, default_value = "all")]
        kind: QueryKind,

        /// Output format: table, csv, json, vertical
        #[arg(short, long, default_value = "table")]
        format: String,

        /// Aggregate ordering: engine, service, total_desc
        #[arg(short, long)]
        order: Option<String>,

        /// Maximum rows to print per result set
        #[arg(short, long)]
        max_rows: Option<usize>,
    },

    /// Show where the database lives and whether the table is loaded
    Status,
}

#[tokio::main]
async fn main() {
    // Set up logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(message) = run(cli).await {
        eprintln!("Error: {}", message);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    let mut config = PipelineConfig::from_env().map_err(|e| e.to_string())?;
    if let Some(dir) = cli.data_dir {
        config.storage.data_dir = dir;
    }

    match cli.command {
        Commands::Load {
            key,
            endpoint,
            force,
        } => {
            if let Some(key) = key {
                config = config.with_object_key(key);
            }
            if let Some(endpoint) = endpoint {
                config = config.with_presign_endpoint(endpoint);
            }

            let pipeline = CostPipeline::from_config(&config).map_err(|e| e.to_string())?;
            pipeline.open().await.map_err(|e| e.to_string())?;

            let report = if force {
                Some(pipeline.reload().await.map_err(|e| e.to_string())?)
            } else {
                pipeline.load().await.map_err(|e| e.to_string())?
            };

            match report {
                Some(report) => {
                    println!(
                        "Loaded '{}' into table 'cost': {} rows, {} bytes in {:?}",
                        report.object_key,
                        report.table_rows,
                        report.payload.size_bytes,
                        report.elapsed
                    );
                    let missing = report.payload.missing_columns();
                    if !missing.is_empty() {
                        println!("Warning: payload lacks columns {:?}", missing);
                    }
                }
                None => println!("Table 'cost' is already loaded; use --force to reload"),
            }
        }

        Commands::Query {
            kind,
            format,
            order,
            max_rows,
        } => {
            let format = OutputFormat::from_str(&format).ok_or_else(|| {
                format!(
                    "unknown format '{}', expected one of {:?}",
                    format,
                    OutputFormat::all_names()
                )
            })?;
            if let Some(order) = order {
                let order = AggregateOrder::from_str(&order)
                    .ok_or_else(|| format!("unknown ordering '{}'", order))?;
                config = config.with_aggregate_order(order);
            }

            let mut formatter = OutputFormatter::new(format);
            if let Some(max) = max_rows {
                formatter = formatter.with_max_rows(max);
            }

            // Queries never touch the network, so no endpoint is required
            let pipeline = CostPipeline::with_source(&config, offline_source());
            let state = pipeline.open().await.map_err(|e| e.to_string())?;
            if state != PipelineState::Loaded {
                return Err("table 'cost' is not loaded; run `cost_lens load` first".into());
            }

            let start = Instant::now();
            let queries: &[CanonicalQuery] = match kind {
                QueryKind::Detail => &[CanonicalQuery::Detail],
                QueryKind::Aggregate => &[CanonicalQuery::Aggregate],
                QueryKind::All => &[CanonicalQuery::Detail, CanonicalQuery::Aggregate],
            };
            for query in queries {
                let output = pipeline.execute(*query).await.map_err(|e| e.to_string())?;
                formatter.print(&output).map_err(|e| e.to_string())?;
                println!("{} rows", output.row_count);
            }
            eprintln!("Query time: {:?}", start.elapsed());
        }

        Commands::Status => {
            let pipeline = CostPipeline::with_source(&config, offline_source());
            let state = pipeline.open().await.map_err(|e| e.to_string())?;
            println!("Database: {}", config.storage.database_path().display());
            println!("State:    {}", state);
            if state == PipelineState::Loaded {
                let rows = pipeline.query_aggregate().await.map_err(|e| e.to_string())?;
                println!("Services: {}", rows.len());
            }
        }
    }

    Ok(())
}

fn offline_source() -> std::sync::Arc<dyn cost_lens::ObjectSource> {
    std::sync::Arc::new(offline::Offline)
}

mod offline {
    use async_trait::async_trait;
    use bytes::Bytes;
    use cost_lens::{ObjectSource, PipelineError, RemoteObjectRef, Result};

    /// Source for commands that only read the local database
    pub struct Offline;

    #[async_trait]
    impl ObjectSource for Offline {
        async fn resolve(&self, key: &str) -> Result<RemoteObjectRef> {
            Err(PipelineError::AuthResolution(format!(
                "no presign endpoint available to resolve '{}'",
                key
            )))
        }

        async fn fetch(&self, object: &RemoteObjectRef) -> Result<Bytes> {
            Err(PipelineError::ObjectFetch(format!(
                "offline, cannot fetch {}",
                object.redacted_url()
            )))
        }
    }
}
