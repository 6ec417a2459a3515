//! spritevault CLI: community sprite vault with review votes.
//!
//! Submits new sprite revisions through a staged review, settles votes,
//! and lists published sprites and their credits.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
