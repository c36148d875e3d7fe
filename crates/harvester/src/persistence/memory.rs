//! In-memory implementation of MarkingStore for testing

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use rand::seq::SliceRandom;
use tracing::debug;

use super::records::ResultRecord;
use super::store::*;
use crate::requirement::{EntityScope, Requirement, SubjectKind};

/// In-memory implementation of MarkingStore
///
/// Stores everything behind `parking_lot` locks and provides the same
/// semantics as the PostgreSQL implementation. Selection order defaults to
/// random; tests that need reproducible batches use [`SelectionOrder::Stable`].
///
/// # Example
///
/// ```
/// use crawlmark_harvester::persistence::{InMemoryMarkingStore, SelectionOrder};
///
/// let store = InMemoryMarkingStore::new().with_selection_order(SelectionOrder::Stable);
/// ```
pub struct InMemoryMarkingStore {
    markings: RwLock<HashMap<String, MarkingRecord>>,
    subject_markings: RwLock<HashMap<String, SubjectMarkingRecord>>,
    records: RwLock<Vec<ResultRecord>>,
    order: SelectionOrder,
}

impl InMemoryMarkingStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self {
            markings: RwLock::new(HashMap::new()),
            subject_markings: RwLock::new(HashMap::new()),
            records: RwLock::new(Vec::new()),
            order: SelectionOrder::default(),
        }
    }

    /// Set the selection order for unfinished markings
    pub fn with_selection_order(mut self, order: SelectionOrder) -> Self {
        self.order = order;
        self
    }

    /// Snapshot of every stored record
    pub fn records(&self) -> Vec<ResultRecord> {
        self.records.read().clone()
    }

    /// Stored records belonging to one entity
    pub fn records_for(&self, entity_id: &str) -> Vec<ResultRecord> {
        self.records
            .read()
            .iter()
            .filter(|r| r.entity_id() == entity_id)
            .cloned()
            .collect()
    }

    /// Get the number of person markings
    pub fn marking_count(&self) -> usize {
        self.markings.read().len()
    }

    /// Get the number of subject markings
    pub fn subject_marking_count(&self) -> usize {
        self.subject_markings.read().len()
    }

    /// Clear all data (for testing)
    pub fn clear(&self) {
        self.markings.write().clear();
        self.subject_markings.write().clear();
        self.records.write().clear();
    }

    fn select<T, K>(&self, mut candidates: Vec<T>, limit: usize, key: K) -> Vec<T>
    where
        K: Fn(&T) -> &str,
    {
        match self.order {
            SelectionOrder::Random => candidates.shuffle(&mut rand::thread_rng()),
            SelectionOrder::Stable => candidates.sort_by(|a, b| key(a).cmp(key(b))),
        }
        candidates.truncate(limit);
        candidates
    }
}

impl Default for InMemoryMarkingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarkingStore for InMemoryMarkingStore {
    async fn fetch_unfinished_markings(
        &self,
        requirement: Requirement,
        limit: usize,
    ) -> Result<Vec<MarkingRecord>, StoreError> {
        StoreError::check_scope(requirement, EntityScope::Person)?;

        let candidates: Vec<MarkingRecord> = {
            let markings = self.markings.read();
            let mut unfinished = Vec::new();
            for marking in markings.values() {
                if !marking.flag(requirement)? {
                    unfinished.push(marking.clone());
                }
            }
            unfinished
        };

        Ok(self.select(candidates, limit, |m| m.person_id.as_str()))
    }

    async fn fetch_unfinished_subject_markings(
        &self,
        requirement: Requirement,
        limit: usize,
        kind: Option<SubjectKind>,
    ) -> Result<Vec<SubjectMarkingRecord>, StoreError> {
        StoreError::check_scope(requirement, EntityScope::Subject)?;

        let candidates: Vec<SubjectMarkingRecord> = {
            let markings = self.subject_markings.read();
            let mut unfinished = Vec::new();
            for marking in markings.values() {
                if kind.is_some_and(|k| k != marking.kind) {
                    continue;
                }
                if !marking.flag(requirement)? {
                    unfinished.push(marking.clone());
                }
            }
            unfinished
        };

        Ok(self.select(candidates, limit, |m| m.subject_id.as_str()))
    }

    async fn set_flag(
        &self,
        entity_id: &str,
        requirement: Requirement,
        value: bool,
    ) -> Result<(), StoreError> {
        match requirement.scope() {
            EntityScope::Person => {
                let mut markings = self.markings.write();
                let marking = markings
                    .get_mut(entity_id)
                    .ok_or_else(|| StoreError::NotFound(entity_id.to_string()))?;
                marking.set_flag(requirement, value)
            }
            EntityScope::Subject => {
                let mut markings = self.subject_markings.write();
                let marking = markings
                    .get_mut(entity_id)
                    .ok_or_else(|| StoreError::NotFound(entity_id.to_string()))?;
                marking.set_flag(requirement, value)
            }
        }
    }

    async fn bulk_insert(&self, records: Vec<ResultRecord>) -> Result<usize, StoreError> {
        let count = records.len();
        self.records.write().extend(records);
        Ok(count)
    }

    async fn count_records(&self, requirement: Requirement) -> Result<usize, StoreError> {
        Ok(self
            .records
            .read()
            .iter()
            .filter(|r| r.requirement() == requirement)
            .count())
    }

    async fn seed_markings(&self, person_ids: Vec<String>) -> Result<usize, StoreError> {
        let mut markings = self.markings.write();
        let mut inserted = 0;
        for person_id in person_ids {
            if markings.contains_key(&person_id) {
                debug!(%person_id, "marking already exists");
                continue;
            }
            markings.insert(person_id.clone(), MarkingRecord::new(person_id));
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn seed_subject_markings(
        &self,
        subjects: Vec<(String, SubjectKind)>,
    ) -> Result<usize, StoreError> {
        let mut markings = self.subject_markings.write();
        let mut inserted = 0;
        for (subject_id, kind) in subjects {
            if markings.contains_key(&subject_id) {
                debug!(%subject_id, "subject marking already exists");
                continue;
            }
            markings.insert(
                subject_id.clone(),
                SubjectMarkingRecord::new(subject_id, kind),
            );
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn get_marking(&self, person_id: &str) -> Result<MarkingRecord, StoreError> {
        self.markings
            .read()
            .get(person_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(person_id.to_string()))
    }

    async fn get_subject_marking(
        &self,
        subject_id: &str,
    ) -> Result<SubjectMarkingRecord, StoreError> {
        self.subject_markings
            .read()
            .get(subject_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(subject_id.to_string()))
    }
}
