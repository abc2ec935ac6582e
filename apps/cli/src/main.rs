//! DeepResearch CLI: iterative, frontier-expanding web research.
//!
//! Expands seed queries depth by depth, condenses every result into a
//! persistent knowledge base, and writes a report plus a JSON export.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    // A missing .env is fine; keys may come from the real environment.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
