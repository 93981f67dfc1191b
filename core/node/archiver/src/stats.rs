use std::time::Duration;

use serde::Serialize;

/// Per-table outcome of one run.
#[derive(Debug, Clone, Serialize)]
pub struct TableStats {
    pub database: String,
    pub table: String,
    pub status: TableStatus,
    pub records_archived: u64,
    pub batches_processed: u64,
    pub bytes_uploaded: u64,
    pub duration_secs: f64,
    /// Only set in dry-run mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records_would_archive: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    Completed,
    DryRun,
    Interrupted,
    Failed,
}

impl TableStats {
    pub fn new(database: &str, table: &str) -> Self {
        Self {
            database: database.to_string(),
            table: table.to_string(),
            status: TableStatus::Completed,
            records_archived: 0,
            batches_processed: 0,
            bytes_uploaded: 0,
            duration_secs: 0.0,
            records_would_archive: None,
            error: None,
        }
    }
}

/// Run-level aggregate across all databases and tables.
#[derive(Debug, Default, Serialize)]
pub struct RunStats {
    pub tables: Vec<TableStats>,
    pub records_archived: u64,
    pub batches_processed: u64,
    pub bytes_uploaded: u64,
    pub failures: u64,
    pub interrupted: bool,
    pub duration_secs: f64,
}

impl RunStats {
    pub fn push(&mut self, stats: TableStats) {
        self.records_archived += stats.records_archived;
        self.batches_processed += stats.batches_processed;
        self.bytes_uploaded += stats.bytes_uploaded;
        match stats.status {
            TableStatus::Failed => self.failures += 1,
            TableStatus::Interrupted => self.interrupted = true,
            _ => {}
        }
        self.tables.push(stats);
    }

    pub fn finalize(&mut self, duration: Duration) {
        self.duration_secs = duration.as_secs_f64();
    }

    pub fn has_failures(&self) -> bool {
        self.failures > 0
    }

    /// Human-readable per-table and run-level summary.
    pub fn summary(&self) -> String {
        let mut lines = Vec::with_capacity(self.tables.len() + 2);
        for table in &self.tables {
            let detail = match (table.status, table.records_would_archive) {
                (TableStatus::DryRun, Some(count)) => {
                    format!("would archive {count} records (dry run)")
                }
                (TableStatus::Failed, _) => format!(
                    "FAILED after {} records: {}",
                    table.records_archived,
                    table.error.as_deref().unwrap_or("unknown error")
                ),
                (TableStatus::Interrupted, _) => format!(
                    "interrupted after {} records in {} batches",
                    table.records_archived, table.batches_processed
                ),
                _ => format!(
                    "{} records in {} batches, {} bytes, {:.1}s",
                    table.records_archived,
                    table.batches_processed,
                    table.bytes_uploaded,
                    table.duration_secs
                ),
            };
            lines.push(format!("  {}.{}: {detail}", table.database, table.table));
        }
        lines.push(format!(
            "total: {} records in {} batches across {} tables, {} bytes, {:.1}s, {} failure(s)",
            self.records_archived,
            self.batches_processed,
            self.tables.len(),
            self.bytes_uploaded,
            self.duration_secs,
            self.failures,
        ));
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregation_counts_failures() {
        let mut run = RunStats::default();

        let mut ok = TableStats::new("app", "audit_logs");
        ok.records_archived = 250;
        ok.batches_processed = 3;
        run.push(ok);

        let mut failed = TableStats::new("app", "events");
        failed.status = TableStatus::Failed;
        failed.error = Some("lock already held".to_string());
        run.push(failed);

        run.finalize(Duration::from_secs(12));

        assert_eq!(run.records_archived, 250);
        assert_eq!(run.failures, 1);
        assert!(run.has_failures());
        let summary = run.summary();
        assert!(summary.contains("app.audit_logs: 250 records"));
        assert!(summary.contains("app.events: FAILED"));
        assert!(summary.contains("1 failure(s)"));
    }

    #[test]
    fn dry_run_summary_reports_would_archive() {
        let mut run = RunStats::default();
        let mut stats = TableStats::new("app", "audit_logs");
        stats.status = TableStatus::DryRun;
        stats.records_would_archive = Some(100);
        run.push(stats);
        assert!(run.summary().contains("would archive 100 records"));
    }
}
