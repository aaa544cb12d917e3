//! Tenant activation ledger.
//!
//! Per-tenant record of which plugins are activated, their configuration
//! and their lifecycle state. A plugin that is globally registered but has
//! no row for a tenant is merely *discovered*; staff can only use it once
//! the row reaches `Active`.
//!
//! ## Lifecycle
//!
//! ```text
//! (no row) --begin--> SetupInProgress --complete--> Active --deactivate--> Deactivated
//!                            ^                                                 |
//!                            +----------------- begin (re-activation) ---------+
//! ```
//!
//! Re-activation goes back through setup and reuses the stored
//! configuration unless the caller asks for a reset. Deactivation never
//! erases configuration.
//!
//! ## Concurrency
//!
//! Transitions for one (tenant, plugin) pair are serialized by a per-pair
//! lock held across the read-modify-write of the row file, so two
//! concurrent `complete_activation` calls cannot both observe
//! `SetupInProgress` and both succeed. Reads (`is_usable`) take no lock.

use crate::config::CoreConfig;
use crate::constants::{ACTIVATIONS_DIR_NAME, TENANT_FILENAME};
use crate::error::{IdentityError, IdentityResult};
use crate::plugins::PluginManifest;
use chrono::{DateTime, Utc};
use mednet_types::{ActorId, PluginName, PluginVersion, TenantId};
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

/// Lifecycle state of one (tenant, plugin) activation row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ActivationState {
    /// Activation initiated; the setup routine is collecting configuration.
    SetupInProgress,
    /// Configured and usable by the tenant's staff.
    Active,
    /// Manually disabled; configuration retained for re-activation.
    Deactivated,
}

/// One tenant's activation row for one plugin.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TenantActivation {
    pub tenant: TenantId,
    pub plugin: PluginName,
    pub version: PluginVersion,
    pub state: ActivationState,
    /// Tenant-specific configuration collected by the setup routine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
    /// The user who initiated the current activation.
    pub activated_by: ActorId,
    pub begun_at: DateTime<Utc>,
    /// Set when the row last reached `Active`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activated_at: Option<DateTime<Utc>>,
}

/// Filesystem-backed activation ledger.
///
/// Rows live at `tenants/<tenant>/activations/<plugin>.yaml`; the ledger
/// refuses to write rows for tenants that do not exist in the tenant
/// directory.
#[derive(Debug)]
pub struct ActivationLedger {
    cfg: Arc<CoreConfig>,
    pair_locks: Mutex<HashMap<(TenantId, PluginName), Arc<Mutex<()>>>>,
}

impl ActivationLedger {
    pub fn new(cfg: Arc<CoreConfig>) -> Self {
        Self {
            cfg,
            pair_locks: Mutex::new(HashMap::new()),
        }
    }

    fn tenant_dir(&self, tenant: &TenantId) -> PathBuf {
        self.cfg.tenants_dir().join(tenant.as_str())
    }

    fn row_path(&self, tenant: &TenantId, plugin: &PluginName) -> PathBuf {
        self.tenant_dir(tenant)
            .join(ACTIVATIONS_DIR_NAME)
            .join(format!("{}.yaml", plugin.as_str()))
    }

    /// Returns the lock serializing transitions for one (tenant, plugin)
    /// pair. The map only ever grows; pairs are few and long-lived.
    fn pair_lock(&self, tenant: &TenantId, plugin: &PluginName) -> Arc<Mutex<()>> {
        let mut locks = self.pair_locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry((tenant.clone(), plugin.clone()))
            .or_default()
            .clone()
    }

    fn require_tenant(&self, tenant: &TenantId) -> IdentityResult<()> {
        if self.tenant_dir(tenant).join(TENANT_FILENAME).is_file() {
            Ok(())
        } else {
            Err(IdentityError::UnknownTenant(tenant.as_str().to_owned()))
        }
    }

    /// Loads one activation row, if present.
    pub fn load(
        &self,
        tenant: &TenantId,
        plugin: &PluginName,
    ) -> IdentityResult<Option<TenantActivation>> {
        let row_path = self.row_path(tenant, plugin);

        let contents = match fs::read_to_string(&row_path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(IdentityError::FileRead(e)),
        };

        let row = serde_yaml::from_str(&contents).map_err(IdentityError::YamlDeserialization)?;
        Ok(Some(row))
    }

    fn write_row(&self, row: &TenantActivation) -> IdentityResult<()> {
        let row_path = self.row_path(&row.tenant, &row.plugin);
        if let Some(parent) = row_path.parent() {
            fs::create_dir_all(parent).map_err(IdentityError::StoreDirCreation)?;
        }

        let yaml = serde_yaml::to_string(row).map_err(IdentityError::YamlSerialization)?;
        fs::write(&row_path, yaml).map_err(IdentityError::FileWrite)
    }

    /// Initiates activation of a registered plugin for a tenant, entering
    /// `SetupInProgress`.
    ///
    /// Taking the manifest (rather than bare coordinates) means callers
    /// must have fetched the plugin from the registry first; the ledger
    /// never activates something that was never published.
    ///
    /// Re-running `begin_activation` while setup is in progress restarts
    /// setup. From `Deactivated` this is the re-activation path: the stored
    /// configuration is kept unless `reset` is set. The version is taken
    /// from the manifest, so re-activation may move a tenant to a newer
    /// published version.
    ///
    /// # Errors
    ///
    /// Fails with [`IdentityError::AlreadyActive`] if the row is `Active`,
    /// or [`IdentityError::UnknownTenant`] for tenants not in the directory.
    pub fn begin_activation(
        &self,
        tenant: &TenantId,
        plugin: &PluginManifest,
        acting_user: &ActorId,
        reset: bool,
    ) -> IdentityResult<TenantActivation> {
        self.require_tenant(tenant)?;

        let lock = self.pair_lock(tenant, &plugin.name);
        let _guard: MutexGuard<'_, ()> = lock.lock().unwrap_or_else(|e| e.into_inner());

        let existing = self.load(tenant, &plugin.name)?;
        if let Some(row) = &existing {
            if row.state == ActivationState::Active {
                return Err(IdentityError::AlreadyActive {
                    tenant: tenant.clone(),
                    plugin: plugin.name.clone(),
                });
            }
        }

        let config = if reset {
            None
        } else {
            existing.and_then(|row| row.config)
        };

        let row = TenantActivation {
            tenant: tenant.clone(),
            plugin: plugin.name.clone(),
            version: plugin.version.clone(),
            state: ActivationState::SetupInProgress,
            config,
            activated_by: acting_user.clone(),
            begun_at: Utc::now(),
            activated_at: None,
        };

        self.write_row(&row)?;
        Ok(row)
    }

    /// Completes setup, transitioning `SetupInProgress -> Active`.
    ///
    /// `config` replaces the stored configuration when given; `None` keeps
    /// whatever setup retained, which is how re-activation reuses the
    /// configuration from before deactivation.
    ///
    /// # Errors
    ///
    /// Fails with [`IdentityError::NotInSetup`] if called out of order —
    /// no row, or a row not in `SetupInProgress`.
    pub fn complete_activation(
        &self,
        tenant: &TenantId,
        plugin: &PluginName,
        config: Option<serde_json::Value>,
    ) -> IdentityResult<TenantActivation> {
        let lock = self.pair_lock(tenant, plugin);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut row = self
            .load(tenant, plugin)?
            .ok_or_else(|| IdentityError::NotInSetup {
                tenant: tenant.clone(),
                plugin: plugin.clone(),
            })?;

        if row.state != ActivationState::SetupInProgress {
            return Err(IdentityError::NotInSetup {
                tenant: tenant.clone(),
                plugin: plugin.clone(),
            });
        }

        if config.is_some() {
            row.config = config;
        }
        row.state = ActivationState::Active;
        row.activated_at = Some(Utc::now());

        self.write_row(&row)?;
        Ok(row)
    }

    /// Disables an active plugin, transitioning `Active -> Deactivated`.
    /// Configuration is preserved for later re-activation.
    ///
    /// # Errors
    ///
    /// Fails with [`IdentityError::ActivationNotFound`] if the tenant has no
    /// row for this plugin, or [`IdentityError::PluginNotActive`] if the row
    /// is not currently `Active`.
    pub fn deactivate(
        &self,
        tenant: &TenantId,
        plugin: &PluginName,
    ) -> IdentityResult<TenantActivation> {
        let lock = self.pair_lock(tenant, plugin);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut row = self
            .load(tenant, plugin)?
            .ok_or_else(|| IdentityError::ActivationNotFound {
                tenant: tenant.clone(),
                plugin: plugin.clone(),
            })?;

        if row.state != ActivationState::Active {
            return Err(IdentityError::PluginNotActive {
                tenant: tenant.clone(),
                plugin: plugin.clone(),
            });
        }

        row.state = ActivationState::Deactivated;
        self.write_row(&row)?;
        Ok(row)
    }

    /// The single usability predicate the access gate consults: true only
    /// when the tenant's row for this plugin is `Active`.
    pub fn is_usable(&self, tenant: &TenantId, plugin: &PluginName) -> IdentityResult<bool> {
        Ok(self
            .load(tenant, plugin)?
            .is_some_and(|row| row.state == ActivationState::Active))
    }

    /// Lists a tenant's activation rows, any state.
    pub fn list_for_tenant(&self, tenant: &TenantId) -> IdentityResult<Vec<TenantActivation>> {
        let activations_dir = self.tenant_dir(tenant).join(ACTIVATIONS_DIR_NAME);

        let iter = match fs::read_dir(&activations_dir) {
            Ok(it) => it,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(IdentityError::FileRead(e)),
        };

        let mut rows = Vec::new();
        for entry in iter.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
                continue;
            }

            match fs::read_to_string(&path)
                .map_err(IdentityError::FileRead)
                .and_then(|s| {
                    serde_yaml::from_str::<TenantActivation>(&s)
                        .map_err(IdentityError::YamlDeserialization)
                }) {
                Ok(row) => rows.push(row),
                Err(err) => {
                    tracing::warn!("skipping unreadable activation row {}: {err}", path.display());
                }
            }
        }

        rows.sort_by(|a, b| a.plugin.cmp(&b.plugin));
        Ok(rows)
    }

    /// Finds every tenant activation row referencing a plugin name, in any
    /// state. Used to guard plugin unregistration.
    pub fn tenants_with_plugin(&self, plugin: &PluginName) -> IdentityResult<Vec<TenantActivation>> {
        let tenants_dir = self.cfg.tenants_dir();

        let iter = match fs::read_dir(&tenants_dir) {
            Ok(it) => it,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(IdentityError::FileRead(e)),
        };

        let mut rows = Vec::new();
        for entry in iter.flatten() {
            let Ok(tenant) = TenantId::new(entry.file_name().to_string_lossy().as_ref()) else {
                continue;
            };

            if let Some(row) = self.load(&tenant, plugin)? {
                rows.push(row);
            }
        }

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::manifest_fixture;
    use crate::tenants::{SubscriptionPlan, TenantDirectory};
    use tempfile::TempDir;

    struct Fixture {
        _tmp: TempDir,
        ledger: ActivationLedger,
        tenant: TenantId,
        plugin: PluginManifest,
    }

    fn fixture() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let cfg = Arc::new(CoreConfig::with_defaults(tmp.path().to_path_buf()));

        let directory = TenantDirectory::new(Arc::clone(&cfg));
        let tenant = directory
            .register("St Marys", SubscriptionPlan::Premium)
            .unwrap()
            .id;

        Fixture {
            _tmp: tmp,
            ledger: ActivationLedger::new(cfg),
            tenant,
            plugin: manifest_fixture("antenatal-care", "1.0.0"),
        }
    }

    fn midwife() -> ActorId {
        ActorId::new("admin.ngozi").unwrap()
    }

    #[test]
    fn full_lifecycle_restores_usability() {
        let fx = fixture();
        let name = &fx.plugin.name;

        fx.ledger
            .begin_activation(&fx.tenant, &fx.plugin, &midwife(), false)
            .unwrap();
        assert!(!fx.ledger.is_usable(&fx.tenant, name).unwrap());

        let config = serde_json::json!({ "roles": ["midwife"] });
        let row = fx
            .ledger
            .complete_activation(&fx.tenant, name, Some(config.clone()))
            .unwrap();
        assert_eq!(row.state, ActivationState::Active);
        assert!(fx.ledger.is_usable(&fx.tenant, name).unwrap());

        let row = fx.ledger.deactivate(&fx.tenant, name).unwrap();
        assert_eq!(row.state, ActivationState::Deactivated);
        assert_eq!(row.config, Some(config.clone()));
        assert!(!fx.ledger.is_usable(&fx.tenant, name).unwrap());

        // Re-activation reuses the stored configuration.
        fx.ledger
            .begin_activation(&fx.tenant, &fx.plugin, &midwife(), false)
            .unwrap();
        let row = fx.ledger.complete_activation(&fx.tenant, name, None).unwrap();
        assert_eq!(row.config, Some(config));
        assert!(fx.ledger.is_usable(&fx.tenant, name).unwrap());
    }

    #[test]
    fn complete_without_begin_fails() {
        let fx = fixture();

        assert!(matches!(
            fx.ledger
                .complete_activation(&fx.tenant, &fx.plugin.name, None),
            Err(IdentityError::NotInSetup { .. })
        ));
    }

    #[test]
    fn complete_twice_fails() {
        let fx = fixture();
        let name = &fx.plugin.name;

        fx.ledger
            .begin_activation(&fx.tenant, &fx.plugin, &midwife(), false)
            .unwrap();
        fx.ledger
            .complete_activation(&fx.tenant, name, Some(serde_json::json!({})))
            .unwrap();

        assert!(matches!(
            fx.ledger.complete_activation(&fx.tenant, name, None),
            Err(IdentityError::NotInSetup { .. })
        ));
    }

    #[test]
    fn begin_while_active_fails() {
        let fx = fixture();

        fx.ledger
            .begin_activation(&fx.tenant, &fx.plugin, &midwife(), false)
            .unwrap();
        fx.ledger
            .complete_activation(&fx.tenant, &fx.plugin.name, Some(serde_json::json!({})))
            .unwrap();

        assert!(matches!(
            fx.ledger
                .begin_activation(&fx.tenant, &fx.plugin, &midwife(), false),
            Err(IdentityError::AlreadyActive { .. })
        ));
    }

    #[test]
    fn reset_clears_stored_config() {
        let fx = fixture();
        let name = &fx.plugin.name;

        fx.ledger
            .begin_activation(&fx.tenant, &fx.plugin, &midwife(), false)
            .unwrap();
        fx.ledger
            .complete_activation(
                &fx.tenant,
                name,
                Some(serde_json::json!({"roles": ["midwife"]})),
            )
            .unwrap();
        fx.ledger.deactivate(&fx.tenant, name).unwrap();

        let row = fx
            .ledger
            .begin_activation(&fx.tenant, &fx.plugin, &midwife(), true)
            .unwrap();
        assert_eq!(row.config, None);
    }

    #[test]
    fn reactivation_can_move_to_newer_version() {
        let fx = fixture();
        let name = &fx.plugin.name;

        fx.ledger
            .begin_activation(&fx.tenant, &fx.plugin, &midwife(), false)
            .unwrap();
        fx.ledger
            .complete_activation(&fx.tenant, name, Some(serde_json::json!({})))
            .unwrap();
        fx.ledger.deactivate(&fx.tenant, name).unwrap();

        let upgraded = manifest_fixture("antenatal-care", "1.1.0");
        let row = fx
            .ledger
            .begin_activation(&fx.tenant, &upgraded, &midwife(), false)
            .unwrap();
        assert_eq!(row.version.as_str(), "1.1.0");
    }

    #[test]
    fn deactivate_requires_active_row() {
        let fx = fixture();
        let name = &fx.plugin.name;

        assert!(matches!(
            fx.ledger.deactivate(&fx.tenant, name),
            Err(IdentityError::ActivationNotFound { .. })
        ));

        fx.ledger
            .begin_activation(&fx.tenant, &fx.plugin, &midwife(), false)
            .unwrap();
        assert!(matches!(
            fx.ledger.deactivate(&fx.tenant, name),
            Err(IdentityError::PluginNotActive { .. })
        ));
    }

    #[test]
    fn unknown_tenant_cannot_begin() {
        let fx = fixture();
        let ghost = TenantId::new("ghost-hospital").unwrap();

        assert!(matches!(
            fx.ledger
                .begin_activation(&ghost, &fx.plugin, &midwife(), false),
            Err(IdentityError::UnknownTenant(_))
        ));
    }

    #[test]
    fn tenants_with_plugin_sees_all_states() {
        let fx = fixture();
        let name = &fx.plugin.name;

        fx.ledger
            .begin_activation(&fx.tenant, &fx.plugin, &midwife(), false)
            .unwrap();
        fx.ledger
            .complete_activation(&fx.tenant, name, Some(serde_json::json!({})))
            .unwrap();
        fx.ledger.deactivate(&fx.tenant, name).unwrap();

        let rows = fx.ledger.tenants_with_plugin(name).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].state, ActivationState::Deactivated);
    }

    #[test]
    fn concurrent_completions_have_one_winner() {
        let fx = fixture();
        let name = fx.plugin.name.clone();

        fx.ledger
            .begin_activation(&fx.tenant, &fx.plugin, &midwife(), false)
            .unwrap();

        let ledger = Arc::new(fx.ledger);
        let mut handles = Vec::new();
        for _ in 0..4 {
            let ledger = Arc::clone(&ledger);
            let tenant = fx.tenant.clone();
            let name = name.clone();
            handles.push(std::thread::spawn(move || {
                ledger
                    .complete_activation(&tenant, &name, Some(serde_json::json!({})))
                    .is_ok()
            }));
        }

        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(wins, 1);
    }
}
