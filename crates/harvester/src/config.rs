//! Startup configuration
//!
//! All operational parameters are read once from the environment (and an
//! optional `.env` file) and never change while a pool is running.
//!
//! | variable | default |
//! | --- | --- |
//! | `DATABASE_URL` | unset |
//! | `HARVEST_REQUIREMENT` | `requirement_1` |
//! | `HARVEST_BATCH_SIZE` | 10 |
//! | `HARVEST_MAX_WORKERS` | batch size |
//! | `HARVEST_IDLE_PAUSE_SECS` | 20 |
//! | `HARVEST_PAGE_PAUSE_SECS` | 2 |
//! | `HARVEST_PROXY_URL` | unset |
//! | `HARVEST_CREDENTIALS_FILE` | unset |
//! | `HARVEST_SUBJECT_KIND` | requirement default |
//! | `HARVEST_RETRY_MAX_ATTEMPTS` | 3 |

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::credentials::{CredentialError, CredentialRotator};
use crate::extractor::{Extractor, FetcherConfig};
use crate::persistence::MarkingStore;
use crate::reliability::RetryPolicy;
use crate::requirement::{EntityScope, Requirement, SubjectKind};
use crate::worker::{TaskRunner, WorkerPool, WorkerPoolConfig};

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A variable is missing, malformed, or inconsistent with another
    #[error("invalid configuration: {variable}: {message}")]
    InvalidConfiguration { variable: String, message: String },

    /// Credential pool could not be loaded
    #[error(transparent)]
    Credentials(#[from] CredentialError),
}

impl ConfigError {
    fn invalid(variable: &str, message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            variable: variable.to_string(),
            message: message.into(),
        }
    }
}

/// Operational parameters for one harvesting process
#[derive(Debug, Clone, PartialEq)]
pub struct HarvestConfig {
    pub database_url: Option<String>,
    pub requirement: Requirement,
    pub batch_size: usize,
    pub max_workers: usize,
    pub idle_pause: Duration,
    pub page_pause: Duration,
    pub proxy_url: Option<String>,
    pub credentials_file: Option<PathBuf>,
    pub kind_filter: Option<SubjectKind>,
    pub retry_max_attempts: u32,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            requirement: Requirement::PersonProfile,
            batch_size: 10,
            max_workers: 10,
            idle_pause: Duration::from_secs(20),
            page_pause: Duration::from_secs(2),
            proxy_url: None,
            credentials_file: None,
            kind_filter: None,
            retry_max_attempts: 3,
        }
    }
}

impl HarvestConfig {
    /// Load `.env` if present, then read the environment
    pub fn load() -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => debug!(path = %path.display(), "Loaded .env file"),
            Err(e) if e.not_found() => {}
            Err(e) => return Err(ConfigError::invalid(".env", e.to_string())),
        }
        Self::from_env()
    }

    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let requirement = match get("HARVEST_REQUIREMENT") {
            Some(raw) => raw
                .parse::<Requirement>()
                .map_err(|e| ConfigError::invalid("HARVEST_REQUIREMENT", e.to_string()))?,
            None => defaults.requirement,
        };

        let batch_size: usize =
            parse_var(&get, "HARVEST_BATCH_SIZE")?.unwrap_or(defaults.batch_size);
        if batch_size == 0 {
            return Err(ConfigError::invalid("HARVEST_BATCH_SIZE", "must be at least 1"));
        }

        let max_workers: usize = parse_var(&get, "HARVEST_MAX_WORKERS")?.unwrap_or(batch_size);
        if max_workers == 0 {
            return Err(ConfigError::invalid("HARVEST_MAX_WORKERS", "must be at least 1"));
        }

        let idle_pause = parse_var::<u64>(&get, "HARVEST_IDLE_PAUSE_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.idle_pause);
        let page_pause = parse_var::<u64>(&get, "HARVEST_PAGE_PAUSE_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.page_pause);

        let kind_filter = match get("HARVEST_SUBJECT_KIND") {
            Some(raw) => {
                if requirement.scope() != EntityScope::Subject {
                    return Err(ConfigError::invalid(
                        "HARVEST_SUBJECT_KIND",
                        format!("{} is not a subject requirement", requirement),
                    ));
                }
                Some(
                    raw.parse::<SubjectKind>()
                        .map_err(|e| ConfigError::invalid("HARVEST_SUBJECT_KIND", e.to_string()))?,
                )
            }
            None => requirement.default_kind_filter(),
        };

        let retry_max_attempts: u32 =
            parse_var(&get, "HARVEST_RETRY_MAX_ATTEMPTS")?.unwrap_or(defaults.retry_max_attempts);
        if retry_max_attempts == 0 {
            return Err(ConfigError::invalid(
                "HARVEST_RETRY_MAX_ATTEMPTS",
                "must be at least 1",
            ));
        }

        let credentials_file = get("HARVEST_CREDENTIALS_FILE").map(PathBuf::from);
        if requirement.requires_credentials() && credentials_file.is_none() {
            return Err(ConfigError::invalid(
                "HARVEST_CREDENTIALS_FILE",
                format!("{} needs a credential pool", requirement),
            ));
        }

        Ok(Self {
            database_url: get("DATABASE_URL"),
            requirement,
            batch_size,
            max_workers,
            idle_pause,
            page_pause,
            proxy_url: get("HARVEST_PROXY_URL"),
            credentials_file,
            kind_filter,
            retry_max_attempts,
        })
    }

    /// Connection string, required by commands that touch the database
    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or_else(|| ConfigError::invalid("DATABASE_URL", "not set"))
    }

    pub fn worker_pool_config(&self) -> WorkerPoolConfig {
        WorkerPoolConfig::new(self.batch_size)
            .with_max_workers(self.max_workers)
            .with_idle_pause(self.idle_pause)
            .with_kind_filter(self.kind_filter)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::exponential().with_max_attempts(self.retry_max_attempts)
    }

    pub fn fetcher_config(&self) -> FetcherConfig {
        let config = FetcherConfig::new().with_page_pause(self.page_pause);
        match &self.proxy_url {
            Some(proxy) => config.with_proxy(proxy.clone()),
            None => config,
        }
    }

    /// Load the credential pool, if one is configured
    pub fn credential_rotator(&self) -> Result<Option<CredentialRotator>, ConfigError> {
        match &self.credentials_file {
            Some(path) => {
                let rotator = CredentialRotator::from_json_file(path)?;
                info!(path = %path.display(), size = rotator.len(), "Loaded credential pool");
                Ok(Some(rotator))
            }
            None => Ok(None),
        }
    }

    /// Assemble a worker pool for the configured requirement
    pub fn build_pool(
        &self,
        store: Arc<dyn MarkingStore>,
        extractor: Arc<dyn Extractor>,
    ) -> Result<WorkerPool, ConfigError> {
        if extractor.requirement() != self.requirement {
            return Err(ConfigError::invalid(
                "HARVEST_REQUIREMENT",
                format!(
                    "configured {} but extractor serves {}",
                    self.requirement,
                    extractor.requirement()
                ),
            ));
        }

        let mut runner = TaskRunner::new(store, extractor).with_retry_policy(self.retry_policy());
        if let Some(rotator) = self.credential_rotator()? {
            runner = runner.with_credentials(Arc::new(rotator));
        }

        Ok(WorkerPool::new(runner, self.worker_pool_config()))
    }
}

fn parse_var<T>(
    get: &impl Fn(&str) -> Option<String>,
    variable: &str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get(variable)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| ConfigError::invalid(variable, format!("'{}': {}", raw, e)))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use async_trait::async_trait;

    use super::*;
    use crate::extractor::{ExtractError, ExtractRequest};
    use crate::persistence::{InMemoryMarkingStore, ResultRecord};

    fn config_from(vars: &[(&str, &str)]) -> Result<HarvestConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        HarvestConfig::from_lookup(|key| vars.get(key).cloned())
    }

    fn invalid_variable(result: Result<HarvestConfig, ConfigError>) -> String {
        match result {
            Err(ConfigError::InvalidConfiguration { variable, .. }) => variable,
            other => panic!("expected invalid configuration, got {:?}", other),
        }
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config, HarvestConfig::default());
        assert!(config.require_database_url().is_err());
    }

    #[test]
    fn test_max_workers_defaults_to_batch_size() {
        let config = config_from(&[("HARVEST_BATCH_SIZE", "4")]).unwrap();
        assert_eq!(config.max_workers, 4);

        let config =
            config_from(&[("HARVEST_BATCH_SIZE", "4"), ("HARVEST_MAX_WORKERS", "2")]).unwrap();
        assert_eq!(config.max_workers, 2);

        let pool = config.worker_pool_config();
        assert_eq!(pool.batch_size, 4);
        assert_eq!(pool.max_workers, 2);
    }

    #[test]
    fn test_full_configuration() {
        let config = config_from(&[
            ("DATABASE_URL", "postgres://localhost/crawlmark"),
            ("HARVEST_REQUIREMENT", "5"),
            ("HARVEST_IDLE_PAUSE_SECS", "30"),
            ("HARVEST_PAGE_PAUSE_SECS", "0"),
            ("HARVEST_PROXY_URL", "http://127.0.0.1:7890"),
            ("HARVEST_SUBJECT_KIND", "book"),
            ("HARVEST_RETRY_MAX_ATTEMPTS", "5"),
        ])
        .unwrap();

        assert_eq!(config.requirement, Requirement::SubjectDetail);
        assert_eq!(config.idle_pause, Duration::from_secs(30));
        assert_eq!(config.kind_filter, Some(SubjectKind::Book));
        assert_eq!(config.retry_policy().max_attempts, 5);
        assert_eq!(
            config.require_database_url().unwrap(),
            "postgres://localhost/crawlmark"
        );

        let fetcher = config.fetcher_config();
        assert_eq!(fetcher.page_pause, Duration::ZERO);
        assert_eq!(fetcher.proxy_url.as_deref(), Some("http://127.0.0.1:7890"));
    }

    #[test]
    fn test_cast_defaults_to_movies() {
        let config = config_from(&[("HARVEST_REQUIREMENT", "requirement_6")]).unwrap();
        assert_eq!(config.kind_filter, Some(SubjectKind::Movie));
    }

    #[test]
    fn test_invalid_values_name_the_variable() {
        assert_eq!(
            invalid_variable(config_from(&[("HARVEST_REQUIREMENT", "requirement_9")])),
            "HARVEST_REQUIREMENT"
        );
        assert_eq!(
            invalid_variable(config_from(&[("HARVEST_BATCH_SIZE", "ten")])),
            "HARVEST_BATCH_SIZE"
        );
        assert_eq!(
            invalid_variable(config_from(&[("HARVEST_BATCH_SIZE", "0")])),
            "HARVEST_BATCH_SIZE"
        );
        assert_eq!(
            invalid_variable(config_from(&[("HARVEST_SUBJECT_KIND", "movie")])),
            "HARVEST_SUBJECT_KIND"
        );
        assert_eq!(
            invalid_variable(config_from(&[("HARVEST_RETRY_MAX_ATTEMPTS", "0")])),
            "HARVEST_RETRY_MAX_ATTEMPTS"
        );
    }

    #[test]
    fn test_login_walled_requirement_needs_credentials() {
        assert_eq!(
            invalid_variable(config_from(&[("HARVEST_REQUIREMENT", "requirement_2")])),
            "HARVEST_CREDENTIALS_FILE"
        );
    }

    #[test]
    fn test_credential_rotator_from_file() {
        let mut file = tempfile();
        write!(file.1, r#"[{{"a":"1"}},{{"b":"2"}}]"#).unwrap();

        let path = file.0.to_string_lossy().to_string();
        let config = config_from(&[
            ("HARVEST_REQUIREMENT", "3"),
            ("HARVEST_CREDENTIALS_FILE", path.as_str()),
        ])
        .unwrap();

        let rotator = config.credential_rotator().unwrap().unwrap();
        assert_eq!(rotator.len(), 2);
        assert_eq!(rotator.next().get("a"), Some("1"));

        std::fs::remove_file(&file.0).ok();
    }

    #[test]
    fn test_missing_credentials_file() {
        let config = config_from(&[
            ("HARVEST_REQUIREMENT", "2"),
            ("HARVEST_CREDENTIALS_FILE", "/nonexistent/cookies.json"),
        ])
        .unwrap();

        assert!(matches!(
            config.credential_rotator(),
            Err(ConfigError::Credentials(_))
        ));
    }

    struct ProfileStub;

    #[async_trait]
    impl Extractor for ProfileStub {
        fn requirement(&self) -> Requirement {
            Requirement::PersonProfile
        }

        async fn extract(&self, _: &ExtractRequest) -> Result<Vec<ResultRecord>, ExtractError> {
            Ok(vec![])
        }
    }

    #[test]
    fn test_build_pool_checks_requirement() {
        let store = Arc::new(InMemoryMarkingStore::new());

        let config = config_from(&[("HARVEST_BATCH_SIZE", "3")]).unwrap();
        let pool = config.build_pool(store.clone(), Arc::new(ProfileStub)).unwrap();
        assert_eq!(pool.config().batch_size, 3);

        let config = config_from(&[("HARVEST_REQUIREMENT", "5")]).unwrap();
        assert!(config.build_pool(store, Arc::new(ProfileStub)).is_err());
    }

    fn tempfile() -> (PathBuf, std::fs::File) {
        let path = std::env::temp_dir()
            .join(format!("crawlmark-cookies-{}.json", uuid::Uuid::now_v7()));
        let file = std::fs::File::create(&path).unwrap();
        (path, file)
    }
}
