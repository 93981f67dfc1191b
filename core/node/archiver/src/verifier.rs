use std::collections::HashSet;

use archiver_types::PkValue;

use crate::error::{ArchiverError, ErrorContext};

/// Count and primary-key set verification between the three representations
/// of a batch: database, memory, and the uploaded object.
#[derive(Debug, Default)]
pub struct Verifier;

impl Verifier {
    pub fn new() -> Self {
        Self
    }

    /// All three counts must be equal; the error names the pair that
    /// disagreed and carries all three values.
    pub fn verify_counts(
        &self,
        db_count: u64,
        memory_count: u64,
        store_count: u64,
    ) -> Result<(), ArchiverError> {
        let context = ErrorContext::from([
            ("db_count".to_string(), db_count.to_string()),
            ("memory_count".to_string(), memory_count.to_string()),
            ("store_count".to_string(), store_count.to_string()),
        ]);

        if db_count != memory_count {
            return Err(ArchiverError::Verification {
                message: format!(
                    "count mismatch: DB count ({db_count}) != memory count ({memory_count})"
                ),
                context,
            });
        }
        if memory_count != store_count {
            return Err(ArchiverError::Verification {
                message: format!(
                    "count mismatch: memory count ({memory_count}) != store count ({store_count})"
                ),
                context,
            });
        }
        Ok(())
    }

    /// Order-independent set equality; reports up to ten missing and ten
    /// extra keys on mismatch.
    pub fn verify_primary_keys(
        &self,
        fetched_pks: &[PkValue],
        delete_pks: &[PkValue],
    ) -> Result<(), ArchiverError> {
        let fetched: HashSet<&PkValue> = fetched_pks.iter().collect();
        let deleted: HashSet<&PkValue> = delete_pks.iter().collect();
        if fetched == deleted {
            return Ok(());
        }

        let missing_in_delete: Vec<String> = fetched
            .difference(&deleted)
            .take(10)
            .map(|pk| pk.to_string())
            .collect();
        let extra_in_delete: Vec<String> = deleted
            .difference(&fetched)
            .take(10)
            .map(|pk| pk.to_string())
            .collect();
        let missing_count = fetched.difference(&deleted).count();
        let extra_count = deleted.difference(&fetched).count();

        Err(ArchiverError::Verification {
            message: format!(
                "primary key mismatch: {missing_count} missing in delete, {extra_count} extra in delete"
            ),
            context: ErrorContext::from([
                ("fetched_count".to_string(), fetched_pks.len().to_string()),
                ("delete_count".to_string(), delete_pks.len().to_string()),
                ("missing_in_delete".to_string(), missing_in_delete.join(",")),
                ("extra_in_delete".to_string(), extra_in_delete.join(",")),
            ]),
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn equal_counts_pass() {
        Verifier::new().verify_counts(100, 100, 100).unwrap();
        Verifier::new().verify_counts(0, 0, 0).unwrap();
    }

    #[test]
    fn mismatched_counts_name_the_disagreeing_pair() {
        let err = Verifier::new().verify_counts(99, 100, 100).unwrap_err();
        assert_matches!(&err, ArchiverError::Verification { message, .. } if message.contains("DB count (99)"));
        assert_eq!(err.context()["store_count"], "100");

        let err = Verifier::new().verify_counts(100, 100, 98).unwrap_err();
        assert_matches!(&err, ArchiverError::Verification { message, .. } if message.contains("store count (98)"));
    }

    #[test]
    fn pk_sets_compare_order_independently() {
        let verifier = Verifier::new();
        let a = vec![PkValue::Int(1), PkValue::Int(2), PkValue::Int(3)];
        let b = vec![PkValue::Int(3), PkValue::Int(1), PkValue::Int(2)];
        verifier.verify_primary_keys(&a, &b).unwrap();
    }

    #[test]
    fn pk_mismatch_reports_missing_and_extra() {
        let verifier = Verifier::new();
        let fetched = vec![PkValue::Int(1), PkValue::Int(2)];
        let deleted = vec![PkValue::Int(2), PkValue::Int(9)];
        let err = verifier.verify_primary_keys(&fetched, &deleted).unwrap_err();
        assert_matches!(&err, ArchiverError::Verification { .. });
        assert_eq!(err.context()["missing_in_delete"], "1");
        assert_eq!(err.context()["extra_in_delete"], "9");
    }

    #[test]
    fn pk_mismatch_samples_are_capped_at_ten() {
        let verifier = Verifier::new();
        let fetched: Vec<PkValue> = (0..50).map(PkValue::Int).collect();
        let deleted: Vec<PkValue> = Vec::new();
        let err = verifier.verify_primary_keys(&fetched, &deleted).unwrap_err();
        let missing = &err.context()["missing_in_delete"];
        assert_eq!(missing.split(',').count(), 10);
    }
}
