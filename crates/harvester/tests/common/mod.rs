//! Test doubles shared by the integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crawlmark_harvester::extractor::{ExtractError, ExtractRequest, Extractor};
use crawlmark_harvester::persistence::records::{CastMember, PersonProfile, PersonWork};
use crawlmark_harvester::persistence::{
    InMemoryMarkingStore, MarkingRecord, MarkingStore, ResultRecord, SelectionOrder, StoreError,
    SubjectMarkingRecord,
};
use crawlmark_harvester::requirement::{Requirement, SubjectKind};

/// In-memory store that records claim sizes and can fail flag updates
pub struct TrackingStore {
    pub inner: InMemoryMarkingStore,
    pub fetch_sizes: Mutex<Vec<usize>>,
    flag_failures: AtomicUsize,
}

impl TrackingStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryMarkingStore::new().with_selection_order(SelectionOrder::Stable),
            fetch_sizes: Mutex::new(vec![]),
            flag_failures: AtomicUsize::new(0),
        }
    }

    /// Make the next `count` flag updates fail
    pub fn fail_next_flag_updates(&self, count: usize) {
        self.flag_failures.store(count, Ordering::SeqCst);
    }

    pub fn fetch_sizes(&self) -> Vec<usize> {
        self.fetch_sizes.lock().clone()
    }
}

#[async_trait]
impl MarkingStore for TrackingStore {
    async fn fetch_unfinished_markings(
        &self,
        requirement: Requirement,
        limit: usize,
    ) -> Result<Vec<MarkingRecord>, StoreError> {
        let batch = self
            .inner
            .fetch_unfinished_markings(requirement, limit)
            .await?;
        self.fetch_sizes.lock().push(batch.len());
        Ok(batch)
    }

    async fn fetch_unfinished_subject_markings(
        &self,
        requirement: Requirement,
        limit: usize,
        kind: Option<SubjectKind>,
    ) -> Result<Vec<SubjectMarkingRecord>, StoreError> {
        let batch = self
            .inner
            .fetch_unfinished_subject_markings(requirement, limit, kind)
            .await?;
        self.fetch_sizes.lock().push(batch.len());
        Ok(batch)
    }

    async fn set_flag(
        &self,
        entity_id: &str,
        requirement: Requirement,
        value: bool,
    ) -> Result<(), StoreError> {
        let failing = self
            .flag_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StoreError::Database("connection reset".to_string()));
        }
        self.inner.set_flag(entity_id, requirement, value).await
    }

    async fn bulk_insert(&self, records: Vec<ResultRecord>) -> Result<usize, StoreError> {
        self.inner.bulk_insert(records).await
    }

    async fn count_records(&self, requirement: Requirement) -> Result<usize, StoreError> {
        self.inner.count_records(requirement).await
    }

    async fn seed_markings(&self, person_ids: Vec<String>) -> Result<usize, StoreError> {
        self.inner.seed_markings(person_ids).await
    }

    async fn seed_subject_markings(
        &self,
        subjects: Vec<(String, SubjectKind)>,
    ) -> Result<usize, StoreError> {
        self.inner.seed_subject_markings(subjects).await
    }

    async fn get_marking(&self, person_id: &str) -> Result<MarkingRecord, StoreError> {
        self.inner.get_marking(person_id).await
    }

    async fn get_subject_marking(
        &self,
        subject_id: &str,
    ) -> Result<SubjectMarkingRecord, StoreError> {
        self.inner.get_subject_marking(subject_id).await
    }
}

/// What the scripted extractor does on a given call for an entity
#[derive(Clone)]
pub enum Step {
    Succeed,
    Fail(ExtractError),
    Panic,
}

/// Extractor driven by a per-entity script
///
/// Calls beyond the end of an entity's script succeed. Every call is logged
/// with the credential it carried.
pub struct ScriptedExtractor {
    requirement: Requirement,
    delay: Duration,
    scripts: Mutex<HashMap<String, Vec<Step>>>,
    default_step: Step,
    pub calls: Mutex<Vec<Call>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub entity_id: String,
    pub attempt: u32,
    pub credentials: Option<String>,
}

impl ScriptedExtractor {
    pub fn new(requirement: Requirement) -> Self {
        Self {
            requirement,
            delay: Duration::ZERO,
            scripts: Mutex::new(HashMap::new()),
            default_step: Step::Succeed,
            calls: Mutex::new(vec![]),
        }
    }

    /// Sleep this long inside every call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Behavior once an entity's script is used up
    pub fn with_default(mut self, step: Step) -> Self {
        self.default_step = step;
        self
    }

    pub fn script(self, entity_id: &str, steps: Vec<Step>) -> Self {
        self.scripts.lock().insert(entity_id.to_string(), steps);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    fn next_step(&self, entity_id: &str) -> Step {
        let mut scripts = self.scripts.lock();
        match scripts.get_mut(entity_id) {
            Some(steps) if !steps.is_empty() => steps.remove(0),
            _ => self.default_step.clone(),
        }
    }

    fn record_for(&self, entity_id: &str) -> ResultRecord {
        match self.requirement {
            Requirement::PersonWorks => PersonWork {
                person_id: entity_id.to_string(),
                title: Some(format!("work of {}", entity_id)),
                ..Default::default()
            }
            .into(),
            Requirement::SubjectCast => CastMember {
                subject_id: entity_id.to_string(),
                name: Some("cast".to_string()),
                ..Default::default()
            }
            .into(),
            _ => PersonProfile {
                person_id: entity_id.to_string(),
                ..Default::default()
            }
            .into(),
        }
    }
}

#[async_trait]
impl Extractor for ScriptedExtractor {
    fn requirement(&self) -> Requirement {
        self.requirement
    }

    async fn extract(&self, request: &ExtractRequest) -> Result<Vec<ResultRecord>, ExtractError> {
        let entity_id = request.entity_id().to_string();
        self.calls.lock().push(Call {
            entity_id: entity_id.clone(),
            attempt: request.attempt,
            credentials: request.credentials.as_ref().map(|c| c.cookie_header()),
        });

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match self.next_step(&entity_id) {
            Step::Succeed => Ok(vec![self.record_for(&entity_id)]),
            Step::Fail(err) => Err(err),
            Step::Panic => panic!("extractor blew up on {}", entity_id),
        }
    }
}

pub fn network_error() -> Step {
    Step::Fail(ExtractError::Network("connection reset by peer".to_string()))
}

pub async fn seed_people(store: &dyn MarkingStore, count: usize) -> Vec<String> {
    let ids: Vec<String> = (1..=count).map(|i| format!("{}", 1000 + i)).collect();
    store.seed_markings(ids.clone()).await.unwrap();
    ids
}
