use archiver_config::MonitoringConfig;
use archiver_dal::BatchSelectorDal;
use archiver_types::{PkType, PkValue};
use rand::{rngs::StdRng, seq::index, SeedableRng};
use serde_json::Value as JsonValue;

use crate::error::{ArchiverError, ErrorContext};

/// Post-archive spot checks: a random sample of the batch's primary keys is
/// confirmed present in the uploaded object before the delete, and absent
/// from the source after the commit.
#[derive(Debug, Clone)]
pub struct SampleVerifier {
    sample_percentage: f64,
    min_samples: usize,
    max_samples: usize,
    seed: Option<u64>,
}

impl SampleVerifier {
    pub fn new(config: &MonitoringConfig) -> Self {
        Self {
            sample_percentage: config.sample_percentage,
            min_samples: config.min_samples,
            max_samples: config.max_samples,
            seed: config.sample_seed,
        }
    }

    /// Uniform sample of size `clamp(min, ceil(pct * n), max)`, capped at n.
    pub fn select_samples(&self, pks: &[PkValue]) -> Vec<PkValue> {
        let total = pks.len();
        if total == 0 {
            return Vec::new();
        }
        let target = (self.sample_percentage * total as f64).ceil() as usize;
        let sample_size = target
            .clamp(self.min_samples, self.max_samples)
            .min(total);

        let mut rng: StdRng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(rand::thread_rng()).expect("rng seeding"),
        };
        index::sample(&mut rng, total, sample_size)
            .into_iter()
            .map(|i| pks[i].clone())
            .collect()
    }

    /// Streams the decompressed JSONL and asserts every sampled key appears
    /// in it.
    pub fn verify_pks_in_archive(
        &self,
        jsonl: &[u8],
        primary_key_column: &str,
        sample_pks: &[PkValue],
    ) -> Result<(), ArchiverError> {
        if sample_pks.is_empty() {
            return Ok(());
        }
        let mut remaining: Vec<JsonValue> = sample_pks.iter().map(PkValue::to_json).collect();

        let text = std::str::from_utf8(jsonl).map_err(|err| ArchiverError::Serialization {
            message: format!("archive JSONL is not valid UTF-8: {err}"),
            context: ErrorContext::new(),
        })?;
        for line in text.lines().filter(|line| !line.trim().is_empty()) {
            let record: JsonValue = match serde_json::from_str(line) {
                Ok(record) => record,
                Err(err) => {
                    let preview: String = line.chars().take(100).collect();
                    tracing::warn!(%err, line_preview = %preview, "Failed to parse JSONL line");
                    continue;
                }
            };
            if let Some(pk_value) = record.get(primary_key_column) {
                remaining.retain(|candidate| candidate != pk_value);
                if remaining.is_empty() {
                    return Ok(());
                }
            }
        }

        let missing: Vec<String> = remaining.iter().take(10).map(JsonValue::to_string).collect();
        Err(ArchiverError::Verification {
            message: format!(
                "{} of {} sampled primary keys missing from uploaded archive",
                remaining.len(),
                sample_pks.len()
            ),
            context: ErrorContext::from([
                ("sample_count".to_string(), sample_pks.len().to_string()),
                ("missing".to_string(), missing.join(",")),
            ]),
        })
    }

    /// Queries the source for the sampled keys after the delete committed;
    /// any surviving row is a verification failure.
    pub async fn verify_absent_from_source(
        &self,
        dal: &BatchSelectorDal<'_>,
        pk_type: PkType,
        sample_pks: &[PkValue],
    ) -> Result<(), ArchiverError> {
        if sample_pks.is_empty() {
            tracing::warn!("No samples to verify");
            return Ok(());
        }
        let found = dal.fetch_present_pks(sample_pks, pk_type).await?;
        if found.is_empty() {
            return Ok(());
        }
        let found_preview: Vec<String> = found.iter().take(10).map(PkValue::to_string).collect();
        Err(ArchiverError::Verification {
            message: format!(
                "sample verification failed: {} of {} sampled primary keys still present in source",
                found.len(),
                sample_pks.len()
            ),
            context: ErrorContext::from([
                ("sample_count".to_string(), sample_pks.len().to_string()),
                ("found_in_db".to_string(), found.len().to_string()),
                ("found_pks".to_string(), found_preview.join(",")),
            ]),
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn verifier(pct: f64, min: usize, max: usize, seed: Option<u64>) -> SampleVerifier {
        SampleVerifier {
            sample_percentage: pct,
            min_samples: min,
            max_samples: max,
            seed,
        }
    }

    fn pks(n: i64) -> Vec<PkValue> {
        (0..n).map(PkValue::Int).collect()
    }

    #[test]
    fn sample_size_is_clamped() {
        let v = verifier(0.01, 10, 1000, Some(7));
        // 1% of 50 = 1, clamped up to min 10.
        assert_eq!(v.select_samples(&pks(50)).len(), 10);
        // Fewer records than min: sample everything.
        assert_eq!(v.select_samples(&pks(4)).len(), 4);
        // 1% of 500_000 = 5000, clamped down to max 1000.
        assert_eq!(v.select_samples(&pks(500_000)).len(), 1000);
        assert!(v.select_samples(&[]).is_empty());
    }

    #[test]
    fn seeded_sampling_is_deterministic() {
        let v = verifier(0.1, 5, 100, Some(42));
        let keys = pks(1000);
        assert_eq!(v.select_samples(&keys), v.select_samples(&keys));
    }

    #[test]
    fn archive_presence_check_passes_when_keys_are_there() {
        let v = verifier(0.5, 1, 10, Some(1));
        let jsonl = b"{\"id\":1,\"x\":\"a\"}\n{\"id\":2,\"x\":\"b\"}\n{\"id\":3,\"x\":\"c\"}";
        v.verify_pks_in_archive(jsonl, "id", &[PkValue::Int(1), PkValue::Int(3)])
            .unwrap();
    }

    #[test]
    fn archive_presence_check_fails_on_missing_key() {
        let v = verifier(0.5, 1, 10, Some(1));
        let jsonl = b"{\"id\":1}\n{\"id\":2}";
        let err = v
            .verify_pks_in_archive(jsonl, "id", &[PkValue::Int(2), PkValue::Int(9)])
            .unwrap_err();
        assert_matches!(&err, ArchiverError::Verification { .. });
        assert_eq!(err.context()["missing"], "9");
    }

    #[test]
    fn malformed_lines_are_skipped_not_fatal() {
        let v = verifier(0.5, 1, 10, Some(1));
        let jsonl = b"not json at all\n{\"id\":5}";
        v.verify_pks_in_archive(jsonl, "id", &[PkValue::Int(5)]).unwrap();
    }

    #[test]
    fn empty_sample_is_a_no_op() {
        let v = verifier(0.5, 1, 10, Some(1));
        v.verify_pks_in_archive(b"", "id", &[]).unwrap();
    }
}
