mod cli;
mod config;
mod dsn;
mod engine;
mod error;
mod logging;
mod model;
mod orchestrator;
mod probe;
mod report;
mod text_summary;
#[cfg(feature = "tui")]
mod tui;
mod validate;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    // Must run before any other thread exists.
    model::capture_local_offset();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    rt.block_on(run_main())
}

async fn run_main() -> Result<()> {
    let args = cli::Cli::parse();
    let is_non_tui = !args.tui_mode();

    logging::init_logging(logging::LogConfig {
        verbose: args.verbose,
        tui_mode: args.tui_mode(),
    })?;

    match cli::run(args).await {
        Ok(()) => {
            // A stopped engine may still be draining; do not wait for it.
            if is_non_tui {
                std::process::exit(0);
            }
            Ok(())
        }
        Err(e) => Err(e),
    }
}
