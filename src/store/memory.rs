use super::{NewRunRecord, RecordId, ResultStore, RunRecord};
use crate::error::StoreError;
use crate::NNVFloat;
use chrono::{DateTime, Utc};
use log::info;

/// Volatile store. Also the query engine behind [`super::JsonLinesStore`].
#[derive(Clone, Debug, Default)]
pub struct InMemoryStore {
    records: Vec<RunRecord>,
    next_id: u64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Validates `record` and assigns the next id and the given timestamp
    /// without storing it.
    pub(super) fn stamp(
        &self,
        record: NewRunRecord,
        timestamp: DateTime<Utc>,
    ) -> Result<RunRecord, StoreError> {
        record.validate()?;
        Ok(RunRecord {
            id: RecordId(self.next_id.max(1)),
            timestamp,
            record,
        })
    }

    /// Adds an already stamped record, keeping ids monotonic.
    pub(super) fn insert(&mut self, record: RunRecord) {
        self.next_id = self.next_id.max(record.id.0 + 1);
        self.records.push(record);
    }

    fn select<F>(&self, mut keep: F, limit: Option<usize>) -> Vec<RunRecord>
    where
        F: FnMut(&RunRecord) -> bool,
    {
        let mut hits: Vec<RunRecord> = self.records.iter().filter(|r| keep(r)).cloned().collect();
        hits.sort_by(RunRecord::newest_first);
        if let Some(limit) = limit {
            hits.truncate(limit);
        }
        hits
    }
}

impl ResultStore for InMemoryStore {
    fn save(&mut self, record: NewRunRecord) -> Result<RecordId, StoreError> {
        let stamped = self.stamp(record, Utc::now())?;
        let id = stamped.id;
        self.insert(stamped);
        info!("saved run record {}", id);
        Ok(id)
    }

    fn recent(&self, limit: usize) -> Result<Vec<RunRecord>, StoreError> {
        Ok(self.select(|_| true, Some(limit)))
    }

    fn by_model(&self, model_name: &str) -> Result<Vec<RunRecord>, StoreError> {
        Ok(self.select(|r| r.record.model_name == model_name, None))
    }

    fn by_attack(
        &self,
        model_name: &str,
        attack: &str,
        epsilon: Option<NNVFloat>,
    ) -> Result<Vec<RunRecord>, StoreError> {
        #[allow(clippy::float_cmp)]
        let matches_epsilon = |r: &RunRecord| epsilon.map_or(true, |e| r.record.epsilon == e);
        Ok(self.select(
            |r| {
                r.record.model_name == model_name && r.record.attack == attack && matches_epsilon(r)
            },
            None,
        ))
    }
}
