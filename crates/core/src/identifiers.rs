//! Identifier ownership registry (the uniqueness store).
//!
//! The registry is the sole arbiter of identifier uniqueness across the
//! whole network: every binding of a medical identifier to a patient record
//! goes through [`IdentifierStore::try_claim`], and no component above the
//! store may assume a code is free without winning that claim. An
//! "available" answer from [`IdentifierStore::resolve`] is only ever a hint.
//!
//! ## Storage layout (filesystem implementation)
//!
//! ```text
//! identifiers/
//!   <c1>/
//!     <CODE>/
//!       ownership.yaml
//! ```
//!
//! where `c1` is the first character of the code. The *directory creation*
//! is the atomic claim: `fs::create_dir` either wins or fails with
//! `AlreadyExists`, so two processes racing on the same code cannot both
//! succeed. The ownership row inside completes the claim; a claim directory
//! whose row failed to write is removed again rather than left half-bound.

use crate::config::CoreConfig;
use crate::constants::OWNERSHIP_FILENAME;
use crate::error::{IdentityError, IdentityResult};
use chrono::{DateTime, Utc};
use medid::MedicalId;
use mednet_types::{PatientRecordId, TenantId};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::fs;
use std::sync::{Arc, Mutex};

/// The permanent binding of a medical identifier to one patient record.
///
/// The identifier-to-patient mapping is immutable for the patient's
/// lifetime. Deactivating a patient retires the binding (sets `retired`)
/// but never unbinds or recycles the code.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct IdentifierOwnership {
    pub identifier: MedicalId,
    pub patient: PatientRecordId,
    /// The tenant that performed the original registration.
    pub home_tenant: TenantId,
    pub registered_at: DateTime<Utc>,
    #[serde(default)]
    pub retired: bool,
}

impl IdentifierOwnership {
    /// Builds a fresh, non-retired binding stamped with the current time.
    pub fn new(identifier: MedicalId, patient: PatientRecordId, home_tenant: TenantId) -> Self {
        Self {
            identifier,
            patient,
            home_tenant,
            registered_at: Utc::now(),
            retired: false,
        }
    }
}

/// Durable, concurrency-safe registry of identifier ownership.
///
/// Implementations must guarantee that for any code, at most one
/// `try_claim` across any number of concurrent callers returns `Ok(true)`.
pub trait IdentifierStore: Send + Sync {
    /// Atomically binds the identifier if and only if it is currently
    /// unbound. Returns `Ok(false)` — not an error — when the code is
    /// already owned, so callers decide whether that is an expected
    /// collision or a hard conflict.
    fn try_claim(&self, ownership: &IdentifierOwnership) -> IdentityResult<bool>;

    /// Resolves an identifier to its ownership row, if bound.
    fn resolve(&self, identifier: &MedicalId) -> IdentityResult<Option<IdentifierOwnership>>;

    /// Marks a binding retired without unbinding it. The code stays
    /// resolvable and is never returned to the allocation pool.
    fn retire(&self, identifier: &MedicalId) -> IdentityResult<IdentifierOwnership>;
}

/// Filesystem-backed identifier registry.
#[derive(Clone, Debug)]
pub struct FsIdentifierStore {
    cfg: Arc<CoreConfig>,
}

impl FsIdentifierStore {
    pub fn new(cfg: Arc<CoreConfig>) -> Self {
        Self { cfg }
    }

    /// Returns `identifiers/<c1>/<CODE>` for a code.
    fn code_dir(&self, identifier: &MedicalId) -> PathBuf {
        let code = identifier.as_str();
        let shard = &code[0..1];
        self.cfg.identifiers_dir().join(shard).join(code)
    }

    fn row_path(&self, identifier: &MedicalId) -> PathBuf {
        self.code_dir(identifier).join(OWNERSHIP_FILENAME)
    }

    fn write_row(&self, path: &PathBuf, ownership: &IdentifierOwnership) -> IdentityResult<()> {
        let yaml = serde_yaml::to_string(ownership).map_err(IdentityError::YamlSerialization)?;
        fs::write(path, yaml).map_err(IdentityError::FileWrite)
    }
}

impl IdentifierStore for FsIdentifierStore {
    fn try_claim(&self, ownership: &IdentifierOwnership) -> IdentityResult<bool> {
        let code_dir = self.code_dir(&ownership.identifier);

        if let Some(parent) = code_dir.parent() {
            fs::create_dir_all(parent).map_err(IdentityError::StoreDirCreation)?;
        }

        // The directory creation is the atomic claim.
        match fs::create_dir(&code_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(IdentityError::StoreDirCreation(e)),
        }

        match self.write_row(&self.row_path(&ownership.identifier), ownership) {
            Ok(()) => Ok(true),
            Err(write_error) => {
                // Roll the claim back so the code is not left half-bound.
                match fs::remove_dir_all(&code_dir) {
                    Ok(()) => Err(write_error),
                    Err(cleanup_error) => Err(IdentityError::CleanupAfterClaimFailed {
                        path: code_dir,
                        write_error: Box::new(write_error),
                        cleanup_error,
                    }),
                }
            }
        }
    }

    fn resolve(&self, identifier: &MedicalId) -> IdentityResult<Option<IdentifierOwnership>> {
        let row_path = self.row_path(identifier);

        let contents = match fs::read_to_string(&row_path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(IdentityError::FileRead(e)),
        };

        let ownership: IdentifierOwnership =
            serde_yaml::from_str(&contents).map_err(IdentityError::YamlDeserialization)?;
        Ok(Some(ownership))
    }

    fn retire(&self, identifier: &MedicalId) -> IdentityResult<IdentifierOwnership> {
        let mut ownership =
            self.resolve(identifier)?
                .ok_or_else(|| IdentityError::UnknownPatient {
                    identifier: identifier.clone(),
                })?;

        ownership.retired = true;
        self.write_row(&self.row_path(identifier), &ownership)?;
        Ok(ownership)
    }
}

/// In-memory identifier registry.
///
/// Used by tests and embedded callers; component wiring takes an explicit
/// store instance rather than reaching for process-global state, so
/// isolated instances are cheap to create.
#[derive(Debug, Default)]
pub struct InMemoryIdentifierStore {
    entries: Mutex<HashMap<MedicalId, IdentifierOwnership>>,
}

impl InMemoryIdentifierStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<MedicalId, IdentifierOwnership>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of bound identifiers.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl IdentifierStore for InMemoryIdentifierStore {
    fn try_claim(&self, ownership: &IdentifierOwnership) -> IdentityResult<bool> {
        let mut entries = self.lock();
        if entries.contains_key(&ownership.identifier) {
            return Ok(false);
        }
        entries.insert(ownership.identifier.clone(), ownership.clone());
        Ok(true)
    }

    fn resolve(&self, identifier: &MedicalId) -> IdentityResult<Option<IdentifierOwnership>> {
        Ok(self.lock().get(identifier).cloned())
    }

    fn retire(&self, identifier: &MedicalId) -> IdentityResult<IdentifierOwnership> {
        let mut entries = self.lock();
        let ownership = entries
            .get_mut(identifier)
            .ok_or_else(|| IdentityError::UnknownPatient {
                identifier: identifier.clone(),
            })?;
        ownership.retired = true;
        Ok(ownership.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    fn fs_store(dir: &Path) -> FsIdentifierStore {
        let cfg = Arc::new(CoreConfig::with_defaults(dir.to_path_buf()));
        FsIdentifierStore::new(cfg)
    }

    fn ownership(code: &str) -> IdentifierOwnership {
        IdentifierOwnership::new(
            MedicalId::format(code).unwrap(),
            PatientRecordId::new(),
            TenantId::new("st-marys").unwrap(),
        )
    }

    #[test]
    fn memory_store_claims_once() {
        let store = InMemoryIdentifierStore::new();
        let first = ownership("A3TV2");
        let second = ownership("A3TV2");

        assert!(store.try_claim(&first).unwrap());
        assert!(!store.try_claim(&second).unwrap());

        let resolved = store.resolve(&first.identifier).unwrap().unwrap();
        assert_eq!(resolved.patient, first.patient);
    }

    #[test]
    fn fs_store_round_trips_ownership() {
        let tmp = TempDir::new().unwrap();
        let store = fs_store(tmp.path());
        let row = ownership("A3TV2");

        assert!(store.try_claim(&row).unwrap());

        let resolved = store.resolve(&row.identifier).unwrap().unwrap();
        assert_eq!(resolved, row);

        // The row lives where the sharded layout says it should.
        let expected = tmp
            .path()
            .join("identifiers")
            .join("A")
            .join("A3TV2")
            .join(OWNERSHIP_FILENAME);
        assert!(expected.is_file());
    }

    #[test]
    fn fs_store_rejects_second_claim() {
        let tmp = TempDir::new().unwrap();
        let store = fs_store(tmp.path());

        let winner = ownership("A3TV2");
        let loser = ownership("A3TV2");

        assert!(store.try_claim(&winner).unwrap());
        assert!(!store.try_claim(&loser).unwrap());

        // Losing the race never disturbs the winner's binding.
        let resolved = store.resolve(&winner.identifier).unwrap().unwrap();
        assert_eq!(resolved.patient, winner.patient);
    }

    #[test]
    fn resolve_unknown_returns_none() {
        let tmp = TempDir::new().unwrap();
        let store = fs_store(tmp.path());
        let id = MedicalId::format("ZZZZZ").unwrap();
        assert!(store.resolve(&id).unwrap().is_none());
    }

    #[test]
    fn retire_preserves_binding() {
        let tmp = TempDir::new().unwrap();
        let store = fs_store(tmp.path());
        let row = ownership("A3TV2");

        store.try_claim(&row).unwrap();
        let retired = store.retire(&row.identifier).unwrap();
        assert!(retired.retired);

        // Still resolvable, still the same patient, still claimed.
        let resolved = store.resolve(&row.identifier).unwrap().unwrap();
        assert!(resolved.retired);
        assert_eq!(resolved.patient, row.patient);
        assert!(!store.try_claim(&ownership("A3TV2")).unwrap());
    }

    #[test]
    fn retire_unknown_fails() {
        let store = InMemoryIdentifierStore::new();
        let id = MedicalId::format("A3TV2").unwrap();
        assert!(matches!(
            store.retire(&id),
            Err(IdentityError::UnknownPatient { .. })
        ));
    }

    #[test]
    fn concurrent_claims_have_exactly_one_winner() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(fs_store(tmp.path()));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                store.try_claim(&ownership("A3TV2")).unwrap()
            }));
        }

        let wins: usize = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(wins, 1);

        let id = MedicalId::format("A3TV2").unwrap();
        assert!(store.resolve(&id).unwrap().is_some());
    }

    #[test]
    fn concurrent_claims_memory_store() {
        let store = Arc::new(InMemoryIdentifierStore::new());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                store.try_claim(&ownership("H7Q2M")).unwrap()
            }));
        }

        let wins: usize = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(wins, 1);
        assert_eq!(store.len(), 1);
    }
}
