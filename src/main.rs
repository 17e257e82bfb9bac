use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use forgecat::catalog::queries;
use forgecat::{Catalog, CatalogConfig};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// File with one query per line; each valid query writes
    /// commandN_output.txt (1-indexed) to the output directory.
    queries: PathBuf,

    /// Directory containing the delimited text inputs
    #[arg(long, default_value = "entrada")]
    input_dir: PathBuf,

    /// Directory for the persisted catalogue and query outputs
    #[arg(long, default_value = "saida")]
    output_dir: PathBuf,

    /// Number of 1024-byte page frames held resident by the cache
    #[arg(long, default_value_t = 1 << 20)]
    cache_frames: usize,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let config = CatalogConfig::new(args.input_dir, args.output_dir).cache_frames(args.cache_frames);

    let catalog = match Catalog::open(config) {
        Ok(catalog) => catalog,
        Err(err) => {
            error!(%err, "failed to open the catalogue");
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = queries::run_query_file(&catalog, &args.queries) {
        error!(%err, "failed to execute the query file");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
