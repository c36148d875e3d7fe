//! # Crawl Orchestration Core
//!
//! Drives catalogue scraping requirements to completion against a relational
//! store of markings.
//!
//! ## Features
//!
//! - **Flag-driven work queue**: every person or subject carries one boolean flag per requirement; unfinished items are claimed in batches
//! - **Bounded worker pool**: a fixed number of workers shared across cycles, with graceful shutdown
//! - **Automatic retries**: exponential backoff with additive jitter around each extraction
//! - **Credential rotation**: cookie jars handed out round-robin to concurrent workers
//! - **Pluggable extractors**: page parsing lives behind the [`Extractor`] trait
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       WorkerPool                             │
//! │  (claims batches, bounds concurrency, pauses between cycles) │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       TaskRunner                             │
//! │  (credential → extract with retries → persist → set flag)   │
//! └─────────────────────────────────────────────────────────────┘
//!                  │                           │
//!                  ▼                           ▼
//! ┌───────────────────────────┐ ┌───────────────────────────────┐
//! │        Extractor           │ │         MarkingStore           │
//! │  (PageFetcher + parsing)   │ │  (PostgreSQL: marking,         │
//! │                            │ │   subject_marking, records)    │
//! └───────────────────────────┘ └───────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use crawlmark_harvester::prelude::*;
//!
//! let config = HarvestConfig::load()?;
//! let store = PostgresMarkingStore::connect(config.require_database_url()?).await?;
//! let fetcher = PageFetcher::new(config.fetcher_config())?;
//!
//! let pool = Arc::new(config.build_pool(Arc::new(store), Arc::new(ProfileExtractor::new(fetcher)))?);
//! pool.shutdown_on_ctrl_c();
//! let summary = pool.run().await?;
//! ```

pub mod config;
pub mod credentials;
pub mod extractor;
pub mod persistence;
pub mod reliability;
pub mod requirement;
pub mod seed;
pub mod telemetry;
pub mod worker;

/// Prelude for common imports
pub mod prelude {
    pub use crate::config::{ConfigError, HarvestConfig};
    pub use crate::credentials::{CredentialError, CredentialRotator, CredentialSet};
    pub use crate::extractor::{
        ErrorKind, ExtractError, ExtractRequest, Extractor, FetcherConfig, PageFetcher,
    };
    pub use crate::persistence::{
        InMemoryMarkingStore, MarkingRecord, MarkingStore, PostgresMarkingStore, ResultRecord,
        SelectionOrder, StoreError, SubjectMarkingRecord, WorkItem,
    };
    pub use crate::reliability::RetryPolicy;
    pub use crate::requirement::{EntityScope, Requirement, SubjectKind};
    pub use crate::worker::{
        RunSummary, StopReason, TaskError, TaskRunner, WorkerPool, WorkerPoolConfig,
        WorkerPoolError,
    };
}

// Re-export key types at crate root
pub use config::{ConfigError, HarvestConfig};
pub use credentials::{CredentialRotator, CredentialSet};
pub use extractor::{ExtractError, ExtractRequest, Extractor};
pub use persistence::{InMemoryMarkingStore, MarkingStore, PostgresMarkingStore, StoreError};
pub use reliability::RetryPolicy;
pub use requirement::Requirement;
pub use worker::{RunSummary, TaskRunner, WorkerPool, WorkerPoolConfig, WorkerPoolError};
