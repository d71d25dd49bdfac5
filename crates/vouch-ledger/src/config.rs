use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::retry::RetryPolicy;

/// What to do with a transfer observed before the entity's issuance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreIssuePolicy {
    /// Record an anomaly and keep reconstructing.
    #[default]
    Flag,
    /// Fail the whole reconstruction.
    Reject,
}

/// Configuration for the audit-trail reconstructor.
///
/// Every field has a default, so a TOML file only needs the keys it changes:
///
/// ```toml
/// query_window = 5000
/// timeout_ms = 10000
/// pre_issue_transfer = "reject"
///
/// [retry]
/// max_attempts = 5
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconstructorConfig {
    /// First block to scan.
    pub from_block: u64,
    /// Last block to scan; the source's latest block when unset.
    pub to_block: Option<u64>,
    /// Blocks per event query. `0` queries the whole range at once.
    pub query_window: u64,
    /// Maximum headers walked back when linking two non-adjacent blocks.
    pub max_chain_walk: u64,
    /// Deadline for a whole reconstruction, in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Attach payloads from the content store to events carrying a digest.
    pub resolve_payloads: bool,
    pub pre_issue_transfer: PreIssuePolicy,
    pub retry: RetryPolicy,
}

impl Default for ReconstructorConfig {
    fn default() -> Self {
        Self {
            from_block: 0,
            to_block: None,
            query_window: 10_000,
            max_chain_walk: 256,
            timeout_ms: None,
            resolve_payloads: true,
            pre_issue_transfer: PreIssuePolicy::Flag,
            retry: RetryPolicy::default(),
        }
    }
}

impl ReconstructorConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(input: &str) -> Result<Self, LedgerError> {
        let config: Self = toml::from_str(input).map_err(|e| LedgerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path)
            .map_err(|e| LedgerError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&input)
    }

    pub fn validate(&self) -> Result<(), LedgerError> {
        if let Some(to_block) = self.to_block {
            if to_block < self.from_block {
                return Err(LedgerError::Config(format!(
                    "to_block {to_block} is before from_block {}",
                    self.from_block
                )));
            }
        }
        if self.retry.max_attempts == 0 {
            return Err(LedgerError::Config("retry.max_attempts must be at least 1".into()));
        }
        if !(self.retry.multiplier >= 1.0) {
            return Err(LedgerError::Config("retry.multiplier must be at least 1.0".into()));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}
