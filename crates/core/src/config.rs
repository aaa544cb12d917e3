//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into
//! core services as `Arc<CoreConfig>`. No core service reads process-wide
//! environment variables during request handling; that keeps behaviour
//! consistent across multi-threaded runtimes and test harnesses, where each
//! test gets its own isolated configuration and data directory.

use crate::constants::{
    AUDIT_DIR_NAME, DEFAULT_CLAIM_ATTEMPTS, IDENTIFIERS_DIR_NAME, PLUGINS_DIR_NAME,
    TENANTS_DIR_NAME,
};
use crate::error::{IdentityError, IdentityResult};
use std::path::{Path, PathBuf};

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    data_dir: PathBuf,
    claim_attempts: u32,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// `claim_attempts` bounds the allocator's draw-and-claim loop; it must
    /// be at least 1.
    pub fn new(data_dir: PathBuf, claim_attempts: u32) -> IdentityResult<Self> {
        if claim_attempts == 0 {
            return Err(IdentityError::InvalidInput(
                "claim_attempts must be at least 1".into(),
            ));
        }

        Ok(Self {
            data_dir,
            claim_attempts,
        })
    }

    /// Create a configuration with the default claim-attempt bound.
    pub fn with_defaults(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            claim_attempts: DEFAULT_CLAIM_ATTEMPTS,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn identifiers_dir(&self) -> PathBuf {
        self.data_dir.join(IDENTIFIERS_DIR_NAME)
    }

    pub fn plugins_dir(&self) -> PathBuf {
        self.data_dir.join(PLUGINS_DIR_NAME)
    }

    pub fn tenants_dir(&self) -> PathBuf {
        self.data_dir.join(TENANTS_DIR_NAME)
    }

    pub fn audit_dir(&self) -> PathBuf {
        self.data_dir.join(AUDIT_DIR_NAME)
    }

    pub fn claim_attempts(&self) -> u32 {
        self.claim_attempts
    }
}
