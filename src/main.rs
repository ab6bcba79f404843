use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use qbench::bench::{self, Bench};
use qbench::config::Config;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize tracing subscriber; stdout is reserved for the report
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Parse CLI arguments
    let config = Config::parse();

    info!("qbench v{} starting...", env!("CARGO_PKG_VERSION"));

    // Prepare and run the benchmark
    let bench = Bench::new(&config)?;
    let format = bench.format();
    let report = bench.run().await;

    println!("{}", bench::render(&report, format)?);

    Ok(())
}
