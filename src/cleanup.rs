// Maintenance binary: delete archived field history

#[path = "repo/mod.rs"]
mod repo;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use pest_risk_backend::config::StoreConfig;
use pest_risk_backend::history_cleanup::clean_history;
use repo::FirebaseStore;

/// Delete `users/{uid}/fields/{field}/data` so fields rebuild their history
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Report what would be deleted without deleting anything
    #[arg(long)]
    dry_run: bool,

    /// Only clean this user's fields
    #[arg(long, value_name = "UID")]
    user: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with_target(false)
        .init();

    let args = Args::parse();

    let config = StoreConfig::from_env().context("Failed to load database configuration")?;
    let store = FirebaseStore::new(&config).context("Failed to create database client")?;

    info!(dry_run = args.dry_run, user = ?args.user, "Cleaning field history");

    let report = clean_history(&store, args.user.as_deref(), args.dry_run)
        .await
        .context("History cleanup failed")?;

    info!(
        users = report.users_scanned,
        fields = report.fields_scanned,
        deleted = report.deleted.len(),
        dry_run = args.dry_run,
        "History cleanup complete"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_defaults() {
        let args = Args::try_parse_from(["cleanup-history"]).unwrap();
        assert!(!args.dry_run);
        assert_eq!(args.user, None);
    }

    #[test]
    fn test_args_flags() {
        let args =
            Args::try_parse_from(["cleanup-history", "--dry-run", "--user", "abc123"]).unwrap();
        assert!(args.dry_run);
        assert_eq!(args.user.as_deref(), Some("abc123"));
    }
}
