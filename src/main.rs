//! SIAAS incident server binary.

use anyhow::Result;
use siaas::cli::Cli;
use siaas::config::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();
    init_logging(&cli.effective_log_level())?;
    cli.run().await
}
