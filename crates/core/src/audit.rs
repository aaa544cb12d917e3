//! Access audit log.
//!
//! Append-only record of every patient-record touch the access gate
//! permits or denies. Compliance tooling reads it; nothing in this system
//! ever mutates or deletes an entry.
//!
//! The filesystem implementation is a JSON Lines file: one entry per line,
//! appended under a mutex so concurrent writers cannot interleave partial
//! lines. Reads stream the file and skip unparseable lines with a warning,
//! so one corrupt line cannot hide the rest of the trail from compliance.

use crate::config::CoreConfig;
use crate::constants::ACCESS_LOG_FILENAME;
use crate::error::{IdentityError, IdentityResult};
use chrono::{DateTime, Utc};
use medid::MedicalId;
use mednet_types::{ActorId, PluginName, PluginVersion, TenantId};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// The kind of touch a plugin performed on a patient record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessAction {
    Read,
    Write,
    View,
    Update,
}

/// What actually happened at the gate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessOutcome {
    /// The inner operation ran and succeeded.
    Permitted,
    /// The inner operation ran and failed; the failure is in `context`.
    Failed,
    /// The gate refused before the inner operation; nothing ran.
    Denied,
}

/// One immutable audit entry.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AccessLogEntry {
    pub identifier: MedicalId,
    pub tenant: TenantId,
    pub user: ActorId,
    pub plugin: PluginName,
    pub plugin_version: PluginVersion,
    pub action: AccessAction,
    pub outcome: AccessOutcome,
    /// Free-form context: caller-supplied detail, or the failure or denial
    /// reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Wall-clock duration of the inner operation. Absent on denials.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    pub recorded_at: DateTime<Utc>,
}

/// Append-only sink plus the compliance read paths.
pub trait AuditSink: Send + Sync {
    fn append(&self, entry: &AccessLogEntry) -> IdentityResult<()>;

    /// Every entry for one identifier, oldest first.
    fn entries_for_identifier(&self, identifier: &MedicalId)
        -> IdentityResult<Vec<AccessLogEntry>>;

    /// Every entry for one tenant, oldest first.
    fn entries_for_tenant(&self, tenant: &TenantId) -> IdentityResult<Vec<AccessLogEntry>>;
}

/// JSON Lines audit log on the filesystem.
#[derive(Debug)]
pub struct FsAuditLog {
    cfg: Arc<CoreConfig>,
    append_lock: Mutex<()>,
}

impl FsAuditLog {
    pub fn new(cfg: Arc<CoreConfig>) -> Self {
        Self {
            cfg,
            append_lock: Mutex::new(()),
        }
    }

    fn log_path(&self) -> PathBuf {
        self.cfg.audit_dir().join(ACCESS_LOG_FILENAME)
    }

    fn read_filtered(
        &self,
        mut keep: impl FnMut(&AccessLogEntry) -> bool,
    ) -> IdentityResult<Vec<AccessLogEntry>> {
        let file = match fs::File::open(self.log_path()) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(IdentityError::FileRead(e)),
        };

        let mut entries = Vec::new();
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(IdentityError::FileRead)?;
            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<AccessLogEntry>(&line) {
                Ok(entry) => {
                    if keep(&entry) {
                        entries.push(entry);
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        "skipping corrupt audit line {} in {}: {err}",
                        line_no + 1,
                        self.log_path().display()
                    );
                }
            }
        }

        Ok(entries)
    }
}

impl AuditSink for FsAuditLog {
    fn append(&self, entry: &AccessLogEntry) -> IdentityResult<()> {
        let line = serde_json::to_string(entry).map_err(IdentityError::Serialization)?;

        let _guard = self.append_lock.lock().unwrap_or_else(|e| e.into_inner());

        fs::create_dir_all(self.cfg.audit_dir()).map_err(IdentityError::AuditWriteFailed)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path())
            .map_err(IdentityError::AuditWriteFailed)?;

        writeln!(file, "{line}").map_err(IdentityError::AuditWriteFailed)
    }

    fn entries_for_identifier(
        &self,
        identifier: &MedicalId,
    ) -> IdentityResult<Vec<AccessLogEntry>> {
        self.read_filtered(|entry| entry.identifier == *identifier)
    }

    fn entries_for_tenant(&self, tenant: &TenantId) -> IdentityResult<Vec<AccessLogEntry>> {
        self.read_filtered(|entry| entry.tenant == *tenant)
    }
}

/// In-memory audit log for tests and embedded callers.
#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    entries: Mutex<Vec<AccessLogEntry>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of every entry, in append order.
    pub fn entries(&self) -> Vec<AccessLogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl AuditSink for InMemoryAuditLog {
    fn append(&self, entry: &AccessLogEntry) -> IdentityResult<()> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(entry.clone());
        Ok(())
    }

    fn entries_for_identifier(
        &self,
        identifier: &MedicalId,
    ) -> IdentityResult<Vec<AccessLogEntry>> {
        Ok(self
            .entries()
            .into_iter()
            .filter(|entry| entry.identifier == *identifier)
            .collect())
    }

    fn entries_for_tenant(&self, tenant: &TenantId) -> IdentityResult<Vec<AccessLogEntry>> {
        Ok(self
            .entries()
            .into_iter()
            .filter(|entry| entry.tenant == *tenant)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(code: &str, tenant: &str, outcome: AccessOutcome) -> AccessLogEntry {
        AccessLogEntry {
            identifier: MedicalId::format(code).unwrap(),
            tenant: TenantId::new(tenant).unwrap(),
            user: ActorId::new("dr.okafor").unwrap(),
            plugin: PluginName::new("antenatal-care").unwrap(),
            plugin_version: PluginVersion::new("1.0.0").unwrap(),
            action: AccessAction::Read,
            outcome,
            context: None,
            duration_ms: Some(3),
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn append_and_query_by_identifier() {
        let tmp = TempDir::new().unwrap();
        let log = FsAuditLog::new(Arc::new(CoreConfig::with_defaults(tmp.path().to_path_buf())));

        log.append(&entry("A3TV2", "st-marys", AccessOutcome::Permitted))
            .unwrap();
        log.append(&entry("H7Q2M", "st-marys", AccessOutcome::Failed))
            .unwrap();
        log.append(&entry("A3TV2", "greenfield", AccessOutcome::Denied))
            .unwrap();

        let id = MedicalId::format("A3TV2").unwrap();
        let for_id = log.entries_for_identifier(&id).unwrap();
        assert_eq!(for_id.len(), 2);

        let tenant = TenantId::new("st-marys").unwrap();
        let for_tenant = log.entries_for_tenant(&tenant).unwrap();
        assert_eq!(for_tenant.len(), 2);
    }

    #[test]
    fn corrupt_lines_are_skipped_not_fatal() {
        let tmp = TempDir::new().unwrap();
        let cfg = Arc::new(CoreConfig::with_defaults(tmp.path().to_path_buf()));
        let log = FsAuditLog::new(Arc::clone(&cfg));

        log.append(&entry("A3TV2", "st-marys", AccessOutcome::Permitted))
            .unwrap();

        // Simulate a torn write.
        let path = cfg.audit_dir().join(ACCESS_LOG_FILENAME);
        let mut contents = fs::read_to_string(&path).unwrap();
        contents.push_str("{\"identifier\": \"A3TV2\", truncated\n");
        fs::write(&path, contents).unwrap();

        log.append(&entry("A3TV2", "st-marys", AccessOutcome::Failed))
            .unwrap();

        let id = MedicalId::format("A3TV2").unwrap();
        let entries = log.entries_for_identifier(&id).unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn concurrent_appends_all_land() {
        let tmp = TempDir::new().unwrap();
        let cfg = Arc::new(CoreConfig::with_defaults(tmp.path().to_path_buf()));
        let log = Arc::new(FsAuditLog::new(cfg));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let log = Arc::clone(&log);
            handles.push(std::thread::spawn(move || {
                for _ in 0..25 {
                    log.append(&entry("A3TV2", "st-marys", AccessOutcome::Permitted))
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let id = MedicalId::format("A3TV2").unwrap();
        assert_eq!(log.entries_for_identifier(&id).unwrap().len(), 200);
    }

    #[test]
    fn memory_log_preserves_append_order() {
        let log = InMemoryAuditLog::new();
        log.append(&entry("A3TV2", "st-marys", AccessOutcome::Permitted))
            .unwrap();
        log.append(&entry("A3TV2", "st-marys", AccessOutcome::Denied))
            .unwrap();

        let entries = log.entries();
        assert_eq!(entries[0].outcome, AccessOutcome::Permitted);
        assert_eq!(entries[1].outcome, AccessOutcome::Denied);
    }
}
