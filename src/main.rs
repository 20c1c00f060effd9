use anyhow::Result;
use tracing::{error, info, warn};

mod api;
mod cli;
mod storage;
mod sweep;
mod utils;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = cli::parse_args();

    // Initialize logging
    utils::init_logging(args.verbose, args.log_file.clone())?;

    info!("Starting keyword sweep v{}", env!("CARGO_PKG_VERSION"));

    // Process commands
    match cli::process_command(args).await {
        Ok(cli::Completion::Full) => {
            info!("Command completed successfully");
            Ok(())
        }
        Ok(partial) => {
            warn!("Command completed with failed or skipped cells");
            std::process::exit(partial.exit_code());
        }
        Err(e) => {
            error!("Command failed: {:#}", e);
            Err(e)
        }
    }
}
