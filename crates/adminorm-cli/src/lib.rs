mod check;
mod cli;
mod describe;
mod sql;

use adminorm::Catalog;
use anyhow::Context;
use std::path::Path;

pub async fn run(args: Vec<String>) -> anyhow::Result<()> {
    let cmd = cli::parse_args(&args)?;
    match cmd {
        cli::Command::Help(topic) => {
            cli::print_help(topic);
            Ok(())
        }
        cli::Command::Check(args) => check::run(args).await,
        cli::Command::Describe(args) => describe::run(args),
        cli::Command::Sql(args) => sql::run(args),
    }
}

fn load_catalog(path: &Path) -> anyhow::Result<Catalog> {
    let catalog = Catalog::load(path)
        .with_context(|| format!("failed to load catalog {}", path.display()))?;
    tracing::debug!(path = %path.display(), entities = catalog.len(), "catalog loaded");
    Ok(catalog)
}
