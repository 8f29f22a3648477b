//! CLI argument definitions.

use clap::{Parser, Subcommand};

use crate::commands::{
    ConfigCmd, ImageCmd, IngestCmd, InitCmd, ListCmd, PlanCmd, ProjectCmd, QueryCmd, RemoveCmd,
    SignupCmd, StatsCmd, UsageCmd,
};

#[derive(Parser)]
#[command(name = "corpus")]
#[command(about = "Corpus - multi-tenant RAG backend with quota enforcement")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Initialize local state and seed plans
    Init(InitCmd),

    /// Create a tenant with a subscription
    Signup(SignupCmd),

    /// List plans or move a tenant between them
    Plan(PlanCmd),

    /// Provision a project for a tenant
    Project(ProjectCmd),

    /// List a tenant's projects
    List(ListCmd),

    /// Ingest a document into a project
    Ingest(IngestCmd),

    /// Hybrid search over a project
    Query(QueryCmd),

    /// Delete a document from a project
    Remove(RemoveCmd),

    /// Ingest, search, or delete images
    Image(ImageCmd),

    /// Show a tenant's usage counters and rate limits
    Usage(UsageCmd),

    /// Show deployment-wide totals
    Stats(StatsCmd),

    /// Manage configuration (API keys, endpoints)
    Config(ConfigCmd),
}

impl Command {
    pub async fn execute(&self) -> anyhow::Result<()> {
        match self {
            Command::Init(cmd) => cmd.run().await,
            Command::Signup(cmd) => cmd.run().await,
            Command::Plan(cmd) => cmd.run().await,
            Command::Project(cmd) => cmd.run().await,
            Command::List(cmd) => cmd.run().await,
            Command::Ingest(cmd) => cmd.run().await,
            Command::Query(cmd) => cmd.run().await,
            Command::Remove(cmd) => cmd.run().await,
            Command::Image(cmd) => cmd.run().await,
            Command::Usage(cmd) => cmd.run().await,
            Command::Stats(cmd) => cmd.run().await,
            Command::Config(cmd) => cmd.run().await,
        }
    }
}
