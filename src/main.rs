//! Corpus CLI - multi-tenant RAG backend with quota enforcement.

mod cli;
mod commands;
mod embeddings;
mod engine;
mod local;
mod quota;
mod types;

use clap::Parser;
use cli::Cli;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Controlled by the RUST_LOG env var.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();
    if let Err(e) = cli.command.execute().await {
        eprintln!("{}", commands::render_error(&e));
        std::process::exit(1);
    }
}
