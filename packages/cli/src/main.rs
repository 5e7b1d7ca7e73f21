use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use treedbs::{StoreConfig, TreeDbs};

mod explore;
mod model;

use model::Counters;

/// Tree compression store driver
#[derive(Parser)]
#[command(name = "treedbs", version)]
#[command(about = "Explore state spaces with a concurrent tree compression store", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Explore the counters model in parallel
    Explore {
        #[command(flatten)]
        store: StoreArgs,

        /// Number of counters
        #[arg(short, long, default_value_t = 8)]
        width: usize,

        /// Largest counter value
        #[arg(short, long, default_value_t = 3)]
        max: i32,

        /// Worker threads
        #[arg(short, long, default_value_t = 4)]
        threads: usize,
    },
    /// Validate a configuration and print its table sizes
    Info {
        #[command(flatten)]
        store: StoreArgs,

        /// Vector length, when not given by the config file
        #[arg(short, long)]
        width: Option<usize>,
    },
}

#[derive(Args)]
struct StoreArgs {
    /// JSON store configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// log2 of the root table capacity
    #[arg(long)]
    size_exp: Option<u32>,

    /// log2 of root capacity / data capacity
    #[arg(long)]
    ratio: Option<u32>,

    /// Use the compact root table
    #[arg(long)]
    slim: bool,
}

impl StoreArgs {
    /// Config file (or defaults) with command line overrides applied
    fn load(&self, width: Option<usize>) -> Result<StoreConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("parsing {}", path.display()))?
            }
            None => StoreConfig::default(),
        };
        if let Some(width) = width {
            config.vector_len = width;
        }
        if let Some(size_exp) = self.size_exp {
            config.size_exp = size_exp;
        }
        if let Some(ratio) = self.ratio {
            config.ratio = ratio;
        }
        if self.slim {
            config = config.with_slim(true).with_satellite_bits(0);
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Explore {
            store,
            width,
            max,
            threads,
        } => {
            anyhow::ensure!(max >= 0, "counter maximum must be non-negative");
            let mut config = store.load(Some(width))?;
            if !config.slim && config.satellite_bits == 0 {
                config = config.with_satellite_bits(1);
            }
            let model = Counters::new(width, max);
            let dbs = TreeDbs::with_matrix(config, &model.dependencies())?;
            info!(
                roots = dbs.root_capacity(),
                data = dbs.data_capacity(),
                slim = dbs.config().slim,
                "store ready"
            );

            let report = explore::explore(&dbs, &model, threads)?;
            match report.expected {
                Some(expected) => println!("states: {} (expected {})", report.states, expected),
                None => println!("states: {}", report.states),
            }
            for (id, stats) in report.per_thread.iter().enumerate() {
                println!(
                    "worker {}: roots {} nodes {} lookups {} misses {} rehashes {}",
                    id, stats.roots, stats.nodes, stats.lookups, stats.misses, stats.rehashes
                );
            }
        }
        Commands::Info { store, width } => {
            let config = store.load(width)?;
            println!("vector length: {}", config.vector_len);
            println!("root table:    2^{} slots", config.root_log());
            println!("data table:    2^{} slots", config.data_log());
            println!("satellite:     {} bits", config.satellite_bits);
            println!("slim:          {}", config.slim);
            println!("memory:        {} bytes", config.memory_bytes());
        }
    }

    Ok(())
}
