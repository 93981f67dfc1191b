use std::time::Duration;

use vise::{Buckets, Counter, Gauge, Histogram, Metrics, Unit};

#[derive(Debug, Metrics)]
#[metrics(prefix = "audit_archiver")]
pub struct ArchiverMetrics {
    /// End-to-end latency of one batch (select through watermark save).
    #[metrics(buckets = Buckets::LATENCIES, unit = Unit::Seconds)]
    pub batch_latency: Histogram<Duration>,

    /// Latency of the archive object upload.
    #[metrics(buckets = Buckets::LATENCIES, unit = Unit::Seconds)]
    pub upload_latency: Histogram<Duration>,

    /// Latency of the transactional delete.
    #[metrics(buckets = Buckets::LATENCIES, unit = Unit::Seconds)]
    pub delete_latency: Histogram<Duration>,

    /// Rows archived and deleted across all tables.
    pub records_archived: Counter,

    /// Batches fully committed.
    pub batches_processed: Counter,

    /// Compressed bytes uploaded.
    pub bytes_uploaded: Counter,

    /// Fatal batch or table errors.
    pub errors: Counter,

    /// Lock heartbeat failures (lock may go stale if these persist).
    pub lock_heartbeat_failures: Counter,

    /// Last batch number committed for the most recent table run.
    pub last_processed_batch: Gauge<usize>,
}

#[vise::register]
pub static METRICS: vise::Global<ArchiverMetrics> = vise::Global::new();
