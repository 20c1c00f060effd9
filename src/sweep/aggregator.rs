use std::sync::Arc;
use tokio::sync::Mutex;

use crate::sweep::KeywordRecord;

/// The only writer of the aggregate result.
///
/// Each `append` holds the lock for the whole batch, so batches from
/// concurrently finishing cells never interleave.
#[derive(Debug, Clone, Default)]
pub struct ResultAggregator {
    records: Arc<Mutex<Vec<KeywordRecord>>>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one cell's records, attaching `query` where a record has none.
    /// Returns the aggregate size after the append.
    pub async fn append(&self, query: &str, mut batch: Vec<KeywordRecord>) -> usize {
        for record in batch.iter_mut().filter(|r| r.query.trim().is_empty()) {
            record.query = query.to_string();
        }

        let mut records = self.records.lock().await;
        records.extend(batch);
        records.len()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn snapshot(&self) -> Vec<KeywordRecord> {
        self.records.lock().await.clone()
    }

    /// Take the final result, cloning only if another handle is still alive
    pub async fn into_records(self) -> Vec<KeywordRecord> {
        match Arc::try_unwrap(self.records) {
            Ok(records) => records.into_inner(),
            Err(records) => Self { records }.snapshot().await,
        }
    }
}
