use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

mod cli;
mod commands;
mod output;
mod store;

use cli::{Cli, Commands};
use output::OutputFormat;
use store::LocalDocStore;

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    setup_logging();

    let cli = Cli::parse();
    let format = if cli.json { OutputFormat::Json } else { OutputFormat::Human };

    let model = racer::Model::builder(Arc::new(LocalDocStore)).build();
    if let Ok(data) = tokio::fs::read_to_string(&cli.data_file).await {
        if let Err(err) = model.unbundle(&data).await {
            tracing::warn!(%err, path = %cli.data_file.display(), "ignoring unreadable bundle file, starting empty");
        }
    }

    let root = model.root();
    match &cli.command {
        Commands::Get(args) => commands::get(&root, args, format).await?,
        Commands::Set(args) => commands::set(&root, args, format).await?,
        Commands::SetDiff(args) => commands::set_diff(&root, args, format).await?,
        Commands::SetDiffDeep(args) => commands::set_diff_deep(&root, args, format).await?,
        Commands::SetNull(args) => commands::set_null(&root, args, format).await?,
        Commands::Del(args) => commands::del(&root, args, format).await?,
        Commands::Increment(args) => commands::increment(&root, args, format).await?,
        Commands::Push(args) => commands::push(&root, args, format).await?,
        Commands::Insert(args) => commands::insert(&root, args, format).await?,
        Commands::Remove(args) => commands::remove(&root, args, format).await?,
        Commands::Add(args) => commands::add(&root, args, format).await?,
        Commands::Dump => commands::dump(&model, format).await?,
    }

    let bundle = model.bundle(Vec::new()).await?;
    tokio::fs::write(&cli.data_file, bundle).await?;

    Ok(())
}
