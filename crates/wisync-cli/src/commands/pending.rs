//! Pending command - Inspect or discard unpushed local changes
//!
//! Reads the pending change snapshot straight from the state database, so it
//! works without a remote connection.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Subcommand;
use tracing::info;

use wisync_cache::{DatabasePool, SqliteKeyValueStore};
use wisync_core::config::Config;
use wisync_core::domain::{PendingChangeSnapshot, WorkItemId};
use wisync_sync::pending::PendingChangeStore;

use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum PendingCommand {
    /// List pending moves and edited notes
    Show,
    /// Drop all pending changes without pushing them
    Discard {
        /// Confirm discarding
        #[arg(long)]
        yes: bool,
    },
}

/// What the state database holds for the pending key
#[derive(Debug)]
struct PendingReport {
    snapshot: Option<PendingChangeSnapshot>,
    updated_at: Option<DateTime<Utc>>,
}

impl PendingReport {
    fn count(&self) -> usize {
        self.snapshot
            .as_ref()
            .map_or(0, |s| s.changed_notes.len() + s.changed_relationships.len())
    }
}

async fn open(config: &Config) -> Result<(Arc<SqliteKeyValueStore>, PendingChangeStore)> {
    let pool = DatabasePool::new(&config.state.database)
        .await
        .with_context(|| {
            format!(
                "Failed to open state database {}",
                config.state.database.display()
            )
        })?;
    let kv = Arc::new(SqliteKeyValueStore::new(pool.pool().clone()));
    let pending = PendingChangeStore::new(kv.clone(), config.state.pending_key.clone());
    Ok((kv, pending))
}

async fn load_report(config: &Config) -> Result<PendingReport> {
    let (kv, pending) = open(config).await?;
    let snapshot = pending.load().await?;
    let updated_at = kv.updated_at(pending.key()).await?;
    Ok(PendingReport {
        snapshot,
        updated_at,
    })
}

fn describe_move(child: WorkItemId, target: Option<WorkItemId>) -> String {
    match target {
        Some(parent) => format!("#{child} -> under #{parent}"),
        None => format!("#{child} -> root"),
    }
}

impl PendingCommand {
    pub async fn execute(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        let config = Config::load_or_default(config_path);
        match self {
            PendingCommand::Show => self.execute_show(format, &config).await,
            PendingCommand::Discard { yes } => self.execute_discard(*yes, format, &config).await,
        }
    }

    async fn execute_show(&self, format: OutputFormat, config: &Config) -> Result<()> {
        let formatter = get_formatter(format);
        let report = load_report(config).await?;
        let count = report.count();

        info!(
            database = %config.state.database.display(),
            pending = count,
            "Showing pending changes"
        );

        if format.is_json() {
            let json = serde_json::json!({
                "database": config.state.database.display().to_string(),
                "key": config.state.pending_key,
                "pending": count,
                "updated_at": report.updated_at.map(|t| t.to_rfc3339()),
                "snapshot": report.snapshot,
            });
            formatter.print_json(&json);
            return Ok(());
        }

        let Some(snapshot) = report.snapshot.filter(|s| !s.is_empty()) else {
            formatter.success("No pending changes");
            return Ok(());
        };

        formatter.success(&format!("{count} pending change(s)"));
        if !snapshot.changed_relationships.is_empty() {
            formatter.info("");
            formatter.info("Moves:");
            for (child, target) in &snapshot.changed_relationships {
                formatter.info(&format!("  {}", describe_move(*child, *target)));
            }
        }
        if !snapshot.changed_notes.is_empty() {
            formatter.info("");
            formatter.info("Edited notes:");
            for id in &snapshot.changed_notes {
                formatter.info(&format!("  #{id}"));
            }
        }
        if let Some(saved) = snapshot.saved_at() {
            formatter.info("");
            formatter.info(&format!("Last saved: {}", saved.to_rfc3339()));
        }
        Ok(())
    }

    async fn execute_discard(&self, yes: bool, format: OutputFormat, config: &Config) -> Result<()> {
        let formatter = get_formatter(format);

        if !yes {
            formatter.warn("This drops every unpushed move and note edit. Re-run with --yes to confirm.");
            return Ok(());
        }

        let (_, pending) = open(config).await?;
        let discarded = pending
            .load()
            .await?
            .map_or(0, |s| s.changed_notes.len() + s.changed_relationships.len());
        pending.clear().await?;

        info!(discarded, "Discarded pending changes");

        if format.is_json() {
            formatter.print_json(&serde_json::json!({
                "success": true,
                "discarded": discarded,
            }));
        } else {
            formatter.success(&format!("Discarded {discarded} pending change(s)"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wisync_core::config::ConfigBuilder;
    use wisync_sync::tracker::ChangeSet;

    fn config_in(dir: &TempDir) -> Config {
        ConfigBuilder::new()
            .state_database(dir.path().join("state.db"))
            .build()
    }

    #[test]
    fn test_describe_move() {
        assert_eq!(
            describe_move(WorkItemId::new(4), Some(WorkItemId::new(5))),
            "#4 -> under #5"
        );
        assert_eq!(describe_move(WorkItemId::new(2), None), "#2 -> root");
    }

    #[tokio::test]
    async fn test_report_on_fresh_database() {
        let dir = TempDir::new().unwrap();
        let report = load_report(&config_in(&dir)).await.unwrap();
        assert!(report.snapshot.is_none());
        assert!(report.updated_at.is_none());
        assert_eq!(report.count(), 0);
    }

    #[tokio::test]
    async fn test_report_reads_persisted_changes() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        {
            let (_, pending) = open(&config).await.unwrap();
            let mut changes = ChangeSet::new();
            changes.insert_relationship(WorkItemId::new(4), Some(WorkItemId::new(5)));
            changes.mark_content(WorkItemId::new(9), true);
            pending.persist(&changes).await.unwrap();
        }

        let report = load_report(&config).await.unwrap();
        assert_eq!(report.count(), 2);
        assert!(report.updated_at.is_some());
    }

    #[tokio::test]
    async fn test_discard_clears_snapshot() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        {
            let (_, pending) = open(&config).await.unwrap();
            let mut changes = ChangeSet::new();
            changes.mark_content(WorkItemId::new(1), true);
            pending.persist(&changes).await.unwrap();
        }

        PendingCommand::Discard { yes: true }
            .execute_discard(true, OutputFormat::Json, &config)
            .await
            .unwrap();

        let report = load_report(&config).await.unwrap();
        let snapshot = report.snapshot.expect("cleared snapshot is stored");
        assert!(snapshot.is_empty());
        assert!(!snapshot.is_saved());
    }

    #[tokio::test]
    async fn test_discard_without_confirmation_keeps_changes() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        {
            let (_, pending) = open(&config).await.unwrap();
            let mut changes = ChangeSet::new();
            changes.mark_content(WorkItemId::new(1), true);
            pending.persist(&changes).await.unwrap();
        }

        PendingCommand::Discard { yes: false }
            .execute_discard(false, OutputFormat::Human, &config)
            .await
            .unwrap();

        assert_eq!(load_report(&config).await.unwrap().count(), 1);
    }
}
