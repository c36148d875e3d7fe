//! Per-item task execution
//!
//! A [`TaskRunner`] takes one claimed item through
//! credential assignment, extraction with retries, record persistence, and
//! the completion flag update. Every failure is returned as a typed
//! [`TaskFailure`]; nothing escapes as a panic or cancels sibling items.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::credentials::CredentialRotator;
use crate::extractor::{ErrorKind, ExtractError, ExtractRequest, Extractor};
use crate::persistence::{MarkingStore, StoreError, WorkItem};
use crate::reliability::RetryPolicy;
use crate::requirement::Requirement;

/// Error type for a failed item
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// Setup is unusable; fatal at startup
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Network or status failure after the last attempt
    #[error("transient fetch error: {0}")]
    TransientFetch(String),

    /// Credentials were rejected on the last attempt
    #[error("login required at {url}")]
    LoginRequired { url: String },

    /// Page structure did not match
    #[error("parse error: {0}")]
    Parse(String),

    /// Records or flag could not be written
    #[error("persistence error: {0}")]
    Persistence(#[from] StoreError),
}

impl TaskError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidConfiguration(_) => ErrorKind::InvalidConfiguration,
            Self::TransientFetch(_) => ErrorKind::TransientFetch,
            Self::LoginRequired { .. } => ErrorKind::LoginRequired,
            Self::Parse(_) => ErrorKind::Parse,
            Self::Persistence(_) => ErrorKind::Persistence,
        }
    }
}

impl From<ExtractError> for TaskError {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::InvalidConfiguration(msg) => Self::InvalidConfiguration(msg),
            ExtractError::LoginRequired { url } => Self::LoginRequired { url },
            ExtractError::Parse(msg) => Self::Parse(msg),
            other @ (ExtractError::Http { .. } | ExtractError::Network(_)) => {
                Self::TransientFetch(other.to_string())
            }
        }
    }
}

/// Outcome of a completed item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSuccess {
    pub entity_id: String,
    /// Records persisted for the item
    pub records: usize,
    /// Extraction attempts used
    pub attempts: u32,
    pub elapsed: Duration,
}

/// Outcome of a failed item; its flag is left untouched
#[derive(Debug)]
pub struct TaskFailure {
    pub entity_id: String,
    pub attempts: u32,
    pub elapsed: Duration,
    pub error: TaskError,
}

impl std::fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} failed after {} attempt(s): {}",
            self.entity_id, self.attempts, self.error
        )
    }
}

impl std::error::Error for TaskFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Runs single items for one requirement
///
/// Cheap to clone; every worker of a pool shares the same store, extractor,
/// and credential rotator.
///
/// # Example
///
/// ```ignore
/// let runner = TaskRunner::new(store, Arc::new(WorksExtractor::new(fetcher)))
///     .with_retry_policy(RetryPolicy::exponential())
///     .with_credentials(Arc::new(rotator));
///
/// runner.validate()?;
/// match runner.run(item).await {
///     Ok(success) => println!("{} records", success.records),
///     Err(failure) => eprintln!("{}", failure),
/// }
/// ```
#[derive(Clone)]
pub struct TaskRunner {
    store: Arc<dyn MarkingStore>,
    extractor: Arc<dyn Extractor>,
    retry_policy: RetryPolicy,
    credentials: Option<Arc<CredentialRotator>>,
}

impl TaskRunner {
    /// Create a runner with the default exponential retry policy
    pub fn new(store: Arc<dyn MarkingStore>, extractor: Arc<dyn Extractor>) -> Self {
        Self {
            store,
            extractor,
            retry_policy: RetryPolicy::exponential(),
            credentials: None,
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Attach a shared credential rotator
    pub fn with_credentials(mut self, rotator: Arc<CredentialRotator>) -> Self {
        self.credentials = Some(rotator);
        self
    }

    /// Requirement completed by this runner
    pub fn requirement(&self) -> Requirement {
        self.extractor.requirement()
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    pub fn store(&self) -> &Arc<dyn MarkingStore> {
        &self.store
    }

    /// Check that the runner can serve its requirement at all
    pub fn validate(&self) -> Result<(), TaskError> {
        let requirement = self.requirement();
        if requirement.requires_credentials() && self.credentials.is_none() {
            return Err(TaskError::InvalidConfiguration(format!(
                "{} needs a credential pool",
                requirement
            )));
        }
        if self.retry_policy.max_attempts == 0 {
            return Err(TaskError::InvalidConfiguration(
                "retry policy must allow at least one attempt".to_string(),
            ));
        }
        Ok(())
    }

    /// Process one item end to end
    ///
    /// On success the records are persisted and then the flag is set; the two
    /// writes are independent, so a flag failure after a successful insert
    /// leaves records that will be written again on the next claim.
    #[instrument(skip(self, item), fields(requirement = %self.requirement(), entity_id = %item.entity_id()))]
    pub async fn run(&self, item: WorkItem) -> Result<TaskSuccess, TaskFailure> {
        let started = Instant::now();
        let entity_id = item.entity_id().to_string();
        let mut attempts = 0;

        let result = self.execute(item, &mut attempts).await;
        let elapsed = started.elapsed();

        match result {
            Ok(records) => {
                info!(
                    %entity_id,
                    records,
                    attempts,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Item completed"
                );
                Ok(TaskSuccess {
                    entity_id,
                    records,
                    attempts,
                    elapsed,
                })
            }
            Err(error) => {
                warn!(
                    %entity_id,
                    attempts,
                    elapsed_ms = elapsed.as_millis() as u64,
                    error_kind = %error.kind(),
                    "Item failed: {}",
                    error
                );
                if let TaskError::LoginRequired { url } = &error {
                    warn!(%entity_id, %url, "Credentials rejected repeatedly; rotate the credential pool");
                }
                Err(TaskFailure {
                    entity_id,
                    attempts,
                    elapsed,
                    error,
                })
            }
        }
    }

    async fn execute(&self, item: WorkItem, attempts: &mut u32) -> Result<usize, TaskError> {
        let requirement = self.requirement();
        if item.scope() != requirement.scope() {
            return Err(TaskError::InvalidConfiguration(format!(
                "{} cannot process a {:?} item",
                requirement,
                item.scope()
            )));
        }

        // One credential set per item, held across its retries
        let credentials = match &self.credentials {
            Some(rotator) => Some(rotator.next()),
            None if requirement.requires_credentials() => {
                return Err(TaskError::InvalidConfiguration(format!(
                    "{} needs a credential pool",
                    requirement
                )));
            }
            None => None,
        };

        let entity_id = item.entity_id().to_string();
        let mut request = ExtractRequest::new(requirement, item).with_credentials(credentials);

        let records = loop {
            *attempts += 1;
            request.attempt = *attempts;

            match self.extractor.extract(&request).await {
                Ok(records) => break records,
                Err(err) => {
                    let kind = err.kind();
                    // Configuration failures are fatal under every policy
                    if kind != ErrorKind::InvalidConfiguration
                        && self.retry_policy.should_retry(kind)
                        && self.retry_policy.has_attempts_remaining(*attempts)
                    {
                        let delay = self.retry_policy.delay_for_attempt(*attempts + 1);
                        debug!(
                            %entity_id,
                            attempt = *attempts,
                            error_kind = %kind,
                            delay_ms = delay.as_millis() as u64,
                            "Extraction failed, retrying: {}",
                            err
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(err.into());
                }
            }
        };

        let inserted = self.store.bulk_insert(records).await?;
        self.store.set_flag(&entity_id, requirement, true).await?;

        Ok(inserted)
    }
}
