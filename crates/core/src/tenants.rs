//! Tenant directory.
//!
//! One canonical tenant-resolution contract: a tenant is registered once
//! under a slug derived from its display name, and every later lookup is a
//! single indexed fetch by that slug. There is deliberately no fallback
//! chain (by name, by code, by settings-embedded key, case-insensitive
//! search); callers that hold anything other than the slug resolve it
//! upstream.

use crate::config::CoreConfig;
use crate::constants::TENANT_FILENAME;
use crate::error::{IdentityError, IdentityResult};
use chrono::{DateTime, Utc};
use mednet_types::TenantId;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

/// Commercial plan a tenant is subscribed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionPlan {
    Basic,
    Premium,
    Enterprise,
}

/// Directory row for one tenant (hospital).
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TenantRecord {
    pub id: TenantId,
    pub display_name: String,
    pub plan: SubscriptionPlan,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Filesystem-backed tenant directory.
#[derive(Clone, Debug)]
pub struct TenantDirectory {
    cfg: Arc<CoreConfig>,
}

impl TenantDirectory {
    pub fn new(cfg: Arc<CoreConfig>) -> Self {
        Self { cfg }
    }

    fn tenant_dir(&self, id: &TenantId) -> PathBuf {
        self.cfg.tenants_dir().join(id.as_str())
    }

    fn row_path(&self, id: &TenantId) -> PathBuf {
        self.tenant_dir(id).join(TENANT_FILENAME)
    }

    /// Registers a new tenant under the slug of its display name.
    ///
    /// # Errors
    ///
    /// Fails with [`IdentityError::TenantExists`] if the slug is already
    /// taken (directory creation is the atomic claim on the slug).
    pub fn register(&self, display_name: &str, plan: SubscriptionPlan) -> IdentityResult<TenantRecord> {
        let id = TenantId::from_display_name(display_name)?;

        fs::create_dir_all(self.cfg.tenants_dir()).map_err(IdentityError::StoreDirCreation)?;

        let tenant_dir = self.tenant_dir(&id);
        match fs::create_dir(&tenant_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(IdentityError::TenantExists(id));
            }
            Err(e) => return Err(IdentityError::StoreDirCreation(e)),
        }

        let record = TenantRecord {
            id: id.clone(),
            display_name: display_name.trim().to_owned(),
            plan,
            is_active: true,
            created_at: Utc::now(),
        };

        let yaml = serde_yaml::to_string(&record).map_err(IdentityError::YamlSerialization)?;
        if let Err(e) = fs::write(self.row_path(&id), yaml) {
            let _ = fs::remove_dir_all(&tenant_dir);
            return Err(IdentityError::FileWrite(e));
        }

        Ok(record)
    }

    /// Fetches a tenant's directory row, active or not.
    pub fn get(&self, id: &TenantId) -> IdentityResult<TenantRecord> {
        let contents = match fs::read_to_string(self.row_path(id)) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(IdentityError::UnknownTenant(id.as_str().to_owned()));
            }
            Err(e) => return Err(IdentityError::FileRead(e)),
        };

        serde_yaml::from_str(&contents).map_err(IdentityError::YamlDeserialization)
    }

    /// Resolves a tenant key to its id — the single lookup every caller
    /// uses. Unknown keys, malformed keys and deactivated tenants all
    /// resolve the same way: [`IdentityError::UnknownTenant`].
    pub fn resolve(&self, key: &str) -> IdentityResult<TenantId> {
        let id = TenantId::new(key)
            .map_err(|_| IdentityError::UnknownTenant(key.to_owned()))?;

        let record = self.get(&id)?;
        if !record.is_active {
            return Err(IdentityError::UnknownTenant(key.to_owned()));
        }

        Ok(record.id)
    }

    /// Marks a tenant inactive. Its records and activation rows stay on
    /// disk; only resolution stops.
    pub fn deactivate(&self, id: &TenantId) -> IdentityResult<TenantRecord> {
        let mut record = self.get(id)?;
        record.is_active = false;

        let yaml = serde_yaml::to_string(&record).map_err(IdentityError::YamlSerialization)?;
        fs::write(self.row_path(id), yaml).map_err(IdentityError::FileWrite)?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn directory(dir: &std::path::Path) -> TenantDirectory {
        TenantDirectory::new(Arc::new(CoreConfig::with_defaults(dir.to_path_buf())))
    }

    #[test]
    fn register_and_resolve_by_slug() {
        let tmp = TempDir::new().unwrap();
        let directory = directory(tmp.path());

        let record = directory
            .register("St Marys Hospital", SubscriptionPlan::Basic)
            .unwrap();
        assert_eq!(record.id.as_str(), "st-marys-hospital");

        let resolved = directory.resolve("st-marys-hospital").unwrap();
        assert_eq!(resolved, record.id);
    }

    #[test]
    fn duplicate_registration_fails() {
        let tmp = TempDir::new().unwrap();
        let directory = directory(tmp.path());

        directory
            .register("St Marys", SubscriptionPlan::Basic)
            .unwrap();
        assert!(matches!(
            directory.register("St Marys", SubscriptionPlan::Premium),
            Err(IdentityError::TenantExists(_))
        ));
    }

    #[test]
    fn resolve_has_no_fallback() {
        let tmp = TempDir::new().unwrap();
        let directory = directory(tmp.path());

        directory
            .register("St Marys", SubscriptionPlan::Basic)
            .unwrap();

        // Display names and near-misses do not resolve; only the slug does.
        assert!(directory.resolve("St Marys").is_err());
        assert!(directory.resolve("ST-MARYS").is_err());
        assert!(directory.resolve("st-mary").is_err());
    }

    #[test]
    fn deactivated_tenant_stops_resolving() {
        let tmp = TempDir::new().unwrap();
        let directory = directory(tmp.path());

        let record = directory
            .register("St Marys", SubscriptionPlan::Enterprise)
            .unwrap();
        directory.deactivate(&record.id).unwrap();

        assert!(matches!(
            directory.resolve("st-marys"),
            Err(IdentityError::UnknownTenant(_))
        ));
        // The row itself is still there.
        assert!(!directory.get(&record.id).unwrap().is_active);
    }
}
