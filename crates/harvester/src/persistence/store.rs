//! MarkingStore trait definition

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::records::ResultRecord;
use crate::requirement::{EntityScope, Requirement, SubjectKind};

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Marking not found
    #[error("marking not found: {0}")]
    NotFound(String),

    /// Requirement flag does not belong to the addressed marking table
    #[error("invalid configuration: {requirement} is not a {scope:?} flag")]
    InvalidFlag {
        requirement: Requirement,
        scope: EntityScope,
    },

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Reject a requirement whose flag lives on the other marking table
    pub fn check_scope(requirement: Requirement, scope: EntityScope) -> Result<(), StoreError> {
        if requirement.scope() == scope {
            Ok(())
        } else {
            Err(StoreError::InvalidFlag { requirement, scope })
        }
    }
}

/// Completion state of one person
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkingRecord {
    pub person_id: String,
    pub requirement_1: bool,
    pub requirement_2: bool,
    pub requirement_3: bool,
    pub requirement_4: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MarkingRecord {
    /// Create a fresh marking with every flag cleared
    pub fn new(person_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            person_id: person_id.into(),
            requirement_1: false,
            requirement_2: false,
            requirement_3: false,
            requirement_4: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Read the flag for a person requirement
    pub fn flag(&self, requirement: Requirement) -> Result<bool, StoreError> {
        match requirement {
            Requirement::PersonProfile => Ok(self.requirement_1),
            Requirement::PersonWorks => Ok(self.requirement_2),
            Requirement::PersonAwards => Ok(self.requirement_3),
            Requirement::PersonCollaborations => Ok(self.requirement_4),
            other => Err(StoreError::InvalidFlag {
                requirement: other,
                scope: EntityScope::Person,
            }),
        }
    }

    /// Write the flag for a person requirement
    pub fn set_flag(&mut self, requirement: Requirement, value: bool) -> Result<(), StoreError> {
        let slot = match requirement {
            Requirement::PersonProfile => &mut self.requirement_1,
            Requirement::PersonWorks => &mut self.requirement_2,
            Requirement::PersonAwards => &mut self.requirement_3,
            Requirement::PersonCollaborations => &mut self.requirement_4,
            other => {
                return Err(StoreError::InvalidFlag {
                    requirement: other,
                    scope: EntityScope::Person,
                })
            }
        };
        *slot = value;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Completion state of one subject
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectMarkingRecord {
    pub subject_id: String,
    pub kind: SubjectKind,
    pub requirement_5: bool,
    pub requirement_6: bool,
    pub requirement_7: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SubjectMarkingRecord {
    /// Create a fresh subject marking with every flag cleared
    pub fn new(subject_id: impl Into<String>, kind: SubjectKind) -> Self {
        let now = Utc::now();
        Self {
            subject_id: subject_id.into(),
            kind,
            requirement_5: false,
            requirement_6: false,
            requirement_7: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Read the flag for a subject requirement
    pub fn flag(&self, requirement: Requirement) -> Result<bool, StoreError> {
        match requirement {
            Requirement::SubjectDetail => Ok(self.requirement_5),
            Requirement::SubjectCast => Ok(self.requirement_6),
            Requirement::SubjectAwards => Ok(self.requirement_7),
            other => Err(StoreError::InvalidFlag {
                requirement: other,
                scope: EntityScope::Subject,
            }),
        }
    }

    /// Write the flag for a subject requirement
    pub fn set_flag(&mut self, requirement: Requirement, value: bool) -> Result<(), StoreError> {
        let slot = match requirement {
            Requirement::SubjectDetail => &mut self.requirement_5,
            Requirement::SubjectCast => &mut self.requirement_6,
            Requirement::SubjectAwards => &mut self.requirement_7,
            other => {
                return Err(StoreError::InvalidFlag {
                    requirement: other,
                    scope: EntityScope::Subject,
                })
            }
        };
        *slot = value;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// One unit of work claimed for a requirement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkItem {
    Person(MarkingRecord),
    Subject(SubjectMarkingRecord),
}

impl WorkItem {
    /// Identifier of the underlying marking
    pub fn entity_id(&self) -> &str {
        match self {
            Self::Person(m) => &m.person_id,
            Self::Subject(m) => &m.subject_id,
        }
    }

    /// Subject kind, for subject work
    pub fn kind(&self) -> Option<SubjectKind> {
        match self {
            Self::Person(_) => None,
            Self::Subject(m) => Some(m.kind),
        }
    }

    pub fn scope(&self) -> EntityScope {
        match self {
            Self::Person(_) => EntityScope::Person,
            Self::Subject(_) => EntityScope::Subject,
        }
    }
}

/// Order in which unfinished markings are handed out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SelectionOrder {
    /// Any subset of the candidates, shuffled
    #[default]
    Random,
    /// Ascending identifier order, for reproducible runs
    Stable,
}

/// Store for markings and result records
///
/// Implementations must be thread-safe: every worker of a pool calls into the
/// same store concurrently.
#[async_trait]
pub trait MarkingStore: Send + Sync + 'static {
    // =========================================================================
    // Claiming
    // =========================================================================

    /// Fetch up to `limit` person markings whose flag for `requirement` is false
    async fn fetch_unfinished_markings(
        &self,
        requirement: Requirement,
        limit: usize,
    ) -> Result<Vec<MarkingRecord>, StoreError>;

    /// Fetch up to `limit` subject markings whose flag for `requirement` is
    /// false, optionally restricted to one kind
    async fn fetch_unfinished_subject_markings(
        &self,
        requirement: Requirement,
        limit: usize,
        kind: Option<SubjectKind>,
    ) -> Result<Vec<SubjectMarkingRecord>, StoreError>;

    /// Fetch unfinished work for any requirement
    ///
    /// Dispatches on the requirement's scope; `kind` is ignored for person
    /// requirements.
    async fn fetch_unfinished(
        &self,
        requirement: Requirement,
        limit: usize,
        kind: Option<SubjectKind>,
    ) -> Result<Vec<WorkItem>, StoreError> {
        match requirement.scope() {
            EntityScope::Person => Ok(self
                .fetch_unfinished_markings(requirement, limit)
                .await?
                .into_iter()
                .map(WorkItem::Person)
                .collect()),
            EntityScope::Subject => Ok(self
                .fetch_unfinished_subject_markings(requirement, limit, kind)
                .await?
                .into_iter()
                .map(WorkItem::Subject)
                .collect()),
        }
    }

    // =========================================================================
    // Completion flags
    // =========================================================================

    /// Set the completion flag of a marking
    ///
    /// The marking table is chosen by the requirement's scope.
    async fn set_flag(
        &self,
        entity_id: &str,
        requirement: Requirement,
        value: bool,
    ) -> Result<(), StoreError>;

    // =========================================================================
    // Result records
    // =========================================================================

    /// Append result records; returns the number inserted
    ///
    /// No de-duplication is performed.
    async fn bulk_insert(&self, records: Vec<ResultRecord>) -> Result<usize, StoreError>;

    /// Count stored records produced by a requirement
    async fn count_records(&self, requirement: Requirement) -> Result<usize, StoreError>;

    // =========================================================================
    // Seeding and lookup
    // =========================================================================

    /// Insert person markings with all flags false, skipping existing ids
    ///
    /// Returns the number of newly inserted markings.
    async fn seed_markings(&self, person_ids: Vec<String>) -> Result<usize, StoreError>;

    /// Insert subject markings with all flags false, skipping existing ids
    async fn seed_subject_markings(
        &self,
        subjects: Vec<(String, SubjectKind)>,
    ) -> Result<usize, StoreError>;

    /// Get a person marking
    async fn get_marking(&self, person_id: &str) -> Result<MarkingRecord, StoreError>;

    /// Get a subject marking
    async fn get_subject_marking(
        &self,
        subject_id: &str,
    ) -> Result<SubjectMarkingRecord, StoreError>;
}
