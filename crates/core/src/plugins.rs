//! Global plugin registry.
//!
//! Plugins are installable capability modules (antenatal care, radiology
//! worklists, billing exports and so on). The registry holds the *global*
//! metadata for each published (name, version): its category, declared
//! capability requirements, the four mandated analytics surfaces, and its
//! setup routine. Per-tenant activation state lives in the activation
//! ledger, not here.
//!
//! ## Storage layout
//!
//! ```text
//! plugins/
//!   <name>/
//!     <version>/
//!       manifest.yaml
//! ```
//!
//! Publishing a version creates the version directory atomically, so two
//! concurrent uploads of the same (name, version) resolve to one winner and
//! one `DuplicateVersion` error.

use crate::config::CoreConfig;
use crate::constants::MANIFEST_FILENAME;
use crate::error::{IdentityError, IdentityResult};
use crate::ledger::ActivationLedger;
use mednet_types::{PluginName, PluginVersion, TenantId};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::fs;
use std::sync::Arc;

/// References to the four analytics surfaces every plugin must ship.
///
/// Each value is the plugin-relative identifier of a view definition; the
/// reporting service resolves them, this subsystem only requires that they
/// are declared.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AnalyticsViews {
    pub patient_level: String,
    pub staff_level: String,
    pub tenant_level: String,
    pub network_level: String,
}

/// Global metadata for one published plugin version.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PluginManifest {
    pub name: PluginName,
    pub version: PluginVersion,
    pub category: String,
    /// Capability requirements declared by the plugin (e.g. `patient:read`).
    #[serde(default)]
    pub capabilities: Vec<String>,
    pub analytics: AnalyticsViews,
    /// Reference to the routine the activation flow runs to collect
    /// tenant-specific configuration.
    pub setup_routine: String,
}

impl PluginManifest {
    /// Checks the manifest's required fields.
    ///
    /// The four analytics view references and the setup routine are
    /// mandatory; a manifest missing any of them is rejected at
    /// registration, before anything is persisted.
    fn validate(&self) -> IdentityResult<()> {
        let required = [
            ("analytics.patient_level", &self.analytics.patient_level),
            ("analytics.staff_level", &self.analytics.staff_level),
            ("analytics.tenant_level", &self.analytics.tenant_level),
            ("analytics.network_level", &self.analytics.network_level),
            ("setup_routine", &self.setup_routine),
        ];

        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(IdentityError::InvalidManifest(format!(
                    "missing required field: {field}"
                )));
            }
        }

        if self.category.trim().is_empty() {
            return Err(IdentityError::InvalidManifest(
                "missing required field: category".into(),
            ));
        }

        Ok(())
    }
}

/// Filesystem-backed registry of plugin manifests.
#[derive(Clone, Debug)]
pub struct PluginRegistry {
    cfg: Arc<CoreConfig>,
}

impl PluginRegistry {
    pub fn new(cfg: Arc<CoreConfig>) -> Self {
        Self { cfg }
    }

    fn version_dir(&self, name: &PluginName, version: &PluginVersion) -> PathBuf {
        self.cfg
            .plugins_dir()
            .join(name.as_str())
            .join(version.as_str())
    }

    /// Registers a new plugin version.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::InvalidManifest`] if required fields are
    /// missing, or [`IdentityError::DuplicateVersion`] if this
    /// (name, version) was already published. A published manifest is
    /// immutable; corrections ship as a new version.
    pub fn register(&self, manifest: &PluginManifest) -> IdentityResult<PluginManifest> {
        manifest.validate()?;

        let version_dir = self.version_dir(&manifest.name, &manifest.version);
        if let Some(parent) = version_dir.parent() {
            fs::create_dir_all(parent).map_err(IdentityError::StoreDirCreation)?;
        }

        match fs::create_dir(&version_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(IdentityError::DuplicateVersion {
                    name: manifest.name.clone(),
                    version: manifest.version.clone(),
                });
            }
            Err(e) => return Err(IdentityError::StoreDirCreation(e)),
        }

        let yaml = serde_yaml::to_string(manifest).map_err(IdentityError::YamlSerialization)?;
        if let Err(e) = fs::write(version_dir.join(MANIFEST_FILENAME), yaml) {
            // Roll the registration back rather than leave a version
            // directory with no manifest.
            let _ = fs::remove_dir_all(&version_dir);
            return Err(IdentityError::FileWrite(e));
        }

        Ok(manifest.clone())
    }

    /// Fetches one published manifest.
    pub fn get(&self, name: &PluginName, version: &PluginVersion) -> IdentityResult<PluginManifest> {
        let manifest_path = self.version_dir(name, version).join(MANIFEST_FILENAME);

        let contents = match fs::read_to_string(&manifest_path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(IdentityError::PluginNotFound {
                    name: name.clone(),
                    version: version.clone(),
                });
            }
            Err(e) => return Err(IdentityError::FileRead(e)),
        };

        serde_yaml::from_str(&contents).map_err(IdentityError::YamlDeserialization)
    }

    /// Lists every published manifest, newest version of a name last.
    ///
    /// Unreadable or corrupt manifests are logged and skipped rather than
    /// failing the whole listing.
    pub fn list_all(&self) -> IdentityResult<Vec<PluginManifest>> {
        let plugins_dir = self.cfg.plugins_dir();

        let name_iter = match fs::read_dir(&plugins_dir) {
            Ok(it) => it,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(IdentityError::FileRead(e)),
        };

        let mut manifests = Vec::new();
        for name_entry in name_iter.flatten() {
            if !name_entry.path().is_dir() {
                continue;
            }

            let version_iter = match fs::read_dir(name_entry.path()) {
                Ok(it) => it,
                Err(_) => continue,
            };

            for version_entry in version_iter.flatten() {
                let manifest_path = version_entry.path().join(MANIFEST_FILENAME);
                if !manifest_path.is_file() {
                    continue;
                }

                match fs::read_to_string(&manifest_path)
                    .map_err(IdentityError::FileRead)
                    .and_then(|s| {
                        serde_yaml::from_str::<PluginManifest>(&s)
                            .map_err(IdentityError::YamlDeserialization)
                    }) {
                    Ok(manifest) => manifests.push(manifest),
                    Err(err) => {
                        tracing::warn!(
                            "skipping unreadable plugin manifest {}: {err}",
                            manifest_path.display()
                        );
                    }
                }
            }
        }

        manifests.sort_by(|a, b| {
            a.name
                .cmp(&b.name)
                .then_with(|| a.version.components().cmp(&b.version.components()))
        });
        Ok(manifests)
    }

    /// Lists the plugins a tenant's admin can install or re-activate: every
    /// published manifest the tenant cannot currently use. Plugins with an
    /// `Active` activation row are hidden; rows mid-setup or deactivated
    /// still show so the admin view can resume or re-activate them.
    pub fn list_for_discovery(
        &self,
        tenant: &TenantId,
        ledger: &ActivationLedger,
    ) -> IdentityResult<Vec<PluginManifest>> {
        let mut discoverable = Vec::new();
        for manifest in self.list_all()? {
            if !ledger.is_usable(tenant, &manifest.name)? {
                discoverable.push(manifest);
            }
        }
        Ok(discoverable)
    }

    /// Removes a published version.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::PluginInUse`] while any tenant holds an
    /// activation row for this version, in any state — deactivated tenants
    /// still hold configuration that references the manifest.
    pub fn unregister(
        &self,
        name: &PluginName,
        version: &PluginVersion,
        ledger: &ActivationLedger,
    ) -> IdentityResult<()> {
        // Existence check first so unknown versions report PluginNotFound.
        self.get(name, version)?;

        let holders = ledger.tenants_with_plugin(name)?;
        if holders.iter().any(|row| row.version == *version) {
            return Err(IdentityError::PluginInUse {
                name: name.clone(),
                version: version.clone(),
            });
        }

        fs::remove_dir_all(self.version_dir(name, version)).map_err(IdentityError::FileWrite)?;
        self.prune_empty_name_dir(name);
        Ok(())
    }

    fn prune_empty_name_dir(&self, name: &PluginName) {
        let name_dir = self.cfg.plugins_dir().join(name.as_str());
        if let Ok(mut entries) = fs::read_dir(&name_dir) {
            if entries.next().is_none() {
                let _ = fs::remove_dir(&name_dir);
            }
        }
    }
}

#[cfg(test)]
pub(crate) fn manifest_fixture(name: &str, version: &str) -> PluginManifest {
    PluginManifest {
        name: PluginName::new(name).unwrap(),
        version: PluginVersion::new(version).unwrap(),
        category: "clinical".into(),
        capabilities: vec!["patient:read".into(), "patient:write".into()],
        analytics: AnalyticsViews {
            patient_level: "views/patient.yaml".into(),
            staff_level: "views/staff.yaml".into(),
            tenant_level: "views/tenant.yaml".into(),
            network_level: "views/network.yaml".into(),
        },
        setup_routine: "setup/configure.yaml".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn registry(dir: &std::path::Path) -> PluginRegistry {
        PluginRegistry::new(Arc::new(CoreConfig::with_defaults(dir.to_path_buf())))
    }

    #[test]
    fn register_and_get_round_trip() {
        let tmp = TempDir::new().unwrap();
        let registry = registry(tmp.path());
        let manifest = manifest_fixture("antenatal-care", "1.0.0");

        registry.register(&manifest).unwrap();
        let fetched = registry.get(&manifest.name, &manifest.version).unwrap();
        assert_eq!(fetched, manifest);
    }

    #[test]
    fn duplicate_version_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let registry = registry(tmp.path());
        let manifest = manifest_fixture("antenatal-care", "1.0.0");

        registry.register(&manifest).unwrap();
        assert!(matches!(
            registry.register(&manifest),
            Err(IdentityError::DuplicateVersion { .. })
        ));
    }

    #[test]
    fn new_version_of_same_plugin_is_allowed() {
        let tmp = TempDir::new().unwrap();
        let registry = registry(tmp.path());

        registry
            .register(&manifest_fixture("antenatal-care", "1.0.0"))
            .unwrap();
        registry
            .register(&manifest_fixture("antenatal-care", "1.1.0"))
            .unwrap();

        assert_eq!(registry.list_all().unwrap().len(), 2);
    }

    #[test]
    fn manifest_missing_analytics_view_is_invalid() {
        let tmp = TempDir::new().unwrap();
        let registry = registry(tmp.path());

        let mut manifest = manifest_fixture("antenatal-care", "1.0.0");
        manifest.analytics.network_level = String::new();

        let err = registry.register(&manifest).unwrap_err();
        assert!(matches!(err, IdentityError::InvalidManifest(_)));
        // Nothing persisted for the rejected manifest.
        assert!(registry.list_all().unwrap().is_empty());
    }

    #[test]
    fn manifest_missing_setup_routine_is_invalid() {
        let tmp = TempDir::new().unwrap();
        let registry = registry(tmp.path());

        let mut manifest = manifest_fixture("antenatal-care", "1.0.0");
        manifest.setup_routine = "   ".into();

        assert!(matches!(
            registry.register(&manifest),
            Err(IdentityError::InvalidManifest(_))
        ));
    }

    #[test]
    fn get_unknown_plugin_fails() {
        let tmp = TempDir::new().unwrap();
        let registry = registry(tmp.path());

        let name = PluginName::new("radiology").unwrap();
        let version = PluginVersion::new("2.0.0").unwrap();
        assert!(matches!(
            registry.get(&name, &version),
            Err(IdentityError::PluginNotFound { .. })
        ));
    }

    #[test]
    fn unregister_refused_while_any_tenant_holds_activation() {
        use crate::ledger::ActivationLedger;
        use crate::tenants::{SubscriptionPlan, TenantDirectory};
        use mednet_types::ActorId;

        let tmp = TempDir::new().unwrap();
        let cfg = Arc::new(CoreConfig::with_defaults(tmp.path().to_path_buf()));
        let registry = PluginRegistry::new(Arc::clone(&cfg));
        let ledger = ActivationLedger::new(Arc::clone(&cfg));

        let tenant = TenantDirectory::new(cfg)
            .register("St Marys", SubscriptionPlan::Basic)
            .unwrap()
            .id;

        let manifest = manifest_fixture("antenatal-care", "1.0.0");
        registry.register(&manifest).unwrap();

        let user = ActorId::new("admin.ngozi").unwrap();
        ledger
            .begin_activation(&tenant, &manifest, &user, false)
            .unwrap();
        ledger
            .complete_activation(&tenant, &manifest.name, Some(serde_json::json!({})))
            .unwrap();
        ledger.deactivate(&tenant, &manifest.name).unwrap();

        // Even a deactivated row still references the manifest.
        assert!(matches!(
            registry.unregister(&manifest.name, &manifest.version, &ledger),
            Err(IdentityError::PluginInUse { .. })
        ));
    }

    #[test]
    fn unregister_removes_unused_version() {
        use crate::ledger::ActivationLedger;

        let tmp = TempDir::new().unwrap();
        let cfg = Arc::new(CoreConfig::with_defaults(tmp.path().to_path_buf()));
        let registry = PluginRegistry::new(Arc::clone(&cfg));
        let ledger = ActivationLedger::new(cfg);

        let manifest = manifest_fixture("antenatal-care", "1.0.0");
        registry.register(&manifest).unwrap();

        registry
            .unregister(&manifest.name, &manifest.version, &ledger)
            .unwrap();
        assert!(matches!(
            registry.get(&manifest.name, &manifest.version),
            Err(IdentityError::PluginNotFound { .. })
        ));
    }

    #[test]
    fn list_all_sorts_versions() {
        let tmp = TempDir::new().unwrap();
        let registry = registry(tmp.path());

        registry
            .register(&manifest_fixture("antenatal-care", "1.10.0"))
            .unwrap();
        registry
            .register(&manifest_fixture("antenatal-care", "1.2.0"))
            .unwrap();

        let versions: Vec<String> = registry
            .list_all()
            .unwrap()
            .into_iter()
            .map(|m| m.version.as_str().to_owned())
            .collect();
        // Numeric ordering, not lexicographic.
        assert_eq!(versions, vec!["1.2.0", "1.10.0"]);
    }
}
