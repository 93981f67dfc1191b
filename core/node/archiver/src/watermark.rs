use archiver_object_store::ArchiveStore;
use archiver_types::{keys, Cursor, Watermark};
use chrono::Utc;

use crate::error::ArchiverError;

/// Persists the per-table keyset cursor. Saved only after the delete
/// transaction commits; an absent watermark means the first batch runs
/// without a cursor.
#[derive(Debug, Clone)]
pub struct WatermarkStore {
    store: ArchiveStore,
}

impl WatermarkStore {
    pub fn new(store: ArchiveStore) -> Self {
        Self { store }
    }

    pub async fn load(
        &self,
        database: &str,
        schema: &str,
        table: &str,
    ) -> Result<Option<Watermark>, ArchiverError> {
        let key = keys::watermark_key(database, schema, table);
        Ok(self.store.get_json(&key).await?)
    }

    pub async fn save(
        &self,
        database: &str,
        schema: &str,
        table: &str,
        cursor: &Cursor,
    ) -> Result<Watermark, ArchiverError> {
        let watermark = Watermark::new(database, table, cursor, Utc::now());
        let key = keys::watermark_key(database, schema, table);
        self.store.put_json(&key, &watermark).await?;
        Ok(watermark)
    }
}
