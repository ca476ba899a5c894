use std::io;

use tracing_subscriber::EnvFilter;
use tuple_design::apps::run_estimate_design;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();
    let stdout = io::stdout();
    run_estimate_design(std::env::args().skip(1), &mut stdout.lock())
}
