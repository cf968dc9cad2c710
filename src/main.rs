//! onchain-metrics CLI entry point.

use onchain_metrics::cli::{self, Cli};
use onchain_metrics::core::Result;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let cli = Cli::parse_args();

    // Execute the command
    cli::execute(cli).await
}
