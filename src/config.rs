use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::core::domain::{SolutionId, StudentId};

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 100;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_ms: u64,
    pub max_attempts: u32,
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
        }
    }
}

/// Everything the client needs to know about the deployment it talks to.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ClientConfig {
    pub base_url: String,
    #[serde(default)]
    pub csrf_token: Option<String>,
    #[serde(default)]
    pub student_id: Option<StudentId>,
    #[serde(default = "default_solution_url_template")]
    pub solution_url_template: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub polling: PollingConfig,
}

fn default_solution_url_template() -> String {
    "/api/solutions/{solution_id}/".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

impl ClientConfig {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            csrf_token: None,
            student_id: None,
            solution_url_template: default_solution_url_template(),
            request_timeout_secs: default_request_timeout_secs(),
            polling: PollingConfig::default(),
        }
    }

    pub async fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = tokio::fs::read(path).await.map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        serde_json::from_slice(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn solution_url(&self, solution_id: SolutionId) -> String {
        self.solution_url_template
            .replace("{solution_id}", &solution_id.to_string())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
