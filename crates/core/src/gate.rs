//! The access gate.
//!
//! Every plugin-initiated touch of a patient record goes through
//! [`AccessGate::access`] — the one place where cross-tenant identifier
//! resolution, per-tenant plugin authorization and audit logging happen.
//! Plugins never resolve identifiers through tenant-local lookups and never
//! write their own audit entries; routing around the gate is a contract
//! violation on the plugin's side.
//!
//! The gate deliberately holds no lock while the caller's operation runs;
//! whatever locking the underlying record accessor needs is its own
//! business.

use crate::audit::{AccessAction, AccessLogEntry, AccessOutcome, AuditSink};
use crate::error::IdentityError;
use crate::identifiers::{IdentifierOwnership, IdentifierStore};
use crate::ledger::ActivationLedger;
use chrono::Utc;
use medid::MedicalId;
use mednet_types::{ActorId, PluginName, PluginVersion, TenantId};
use std::sync::Arc;
use std::time::Instant;

/// Who is touching which record, how, and why.
#[derive(Clone, Debug)]
pub struct AccessRequest {
    /// Raw identifier as supplied by the plugin; normalised by the gate.
    pub identifier: String,
    pub tenant: TenantId,
    pub user: ActorId,
    pub plugin: PluginName,
    pub plugin_version: PluginVersion,
    pub action: AccessAction,
    /// Caller-supplied context recorded with the audit entry.
    pub context: Option<String>,
}

/// Outcome of a gated access.
///
/// `Refused` means the gate itself said no (bad identifier, unknown
/// patient, plugin not active) and, except for denials, nothing ran.
/// `Operation` carries the inner operation's own error unchanged.
#[derive(Debug, thiserror::Error)]
pub enum AccessError<E> {
    #[error(transparent)]
    Refused(#[from] IdentityError),
    #[error("record operation failed: {0}")]
    Operation(#[source] E),
}

/// The mandatory chokepoint for plugin access to patient records.
pub struct AccessGate {
    store: Arc<dyn IdentifierStore>,
    ledger: Arc<ActivationLedger>,
    audit: Arc<dyn AuditSink>,
}

impl AccessGate {
    pub fn new(
        store: Arc<dyn IdentifierStore>,
        ledger: Arc<ActivationLedger>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            store,
            ledger,
            audit,
        }
    }

    /// Runs `op` against the patient record named by the request, enforcing
    /// authorization and appending exactly one audit entry for everything
    /// that gets as far as a decision about the record.
    ///
    /// Sequence: normalise the identifier, resolve it to its owner, check
    /// the tenant's activation of the plugin, run `op`, audit, and hand the
    /// operation's outcome back unchanged. A denial at the activation check
    /// is audited as `Denied` and `op` is never called; failures before
    /// that point (malformed or unknown identifier) produce no entry since
    /// no record was ever in reach.
    ///
    /// Audit writes are best-effort relative to the operation: a failing
    /// audit store is reported to the operational log and never turns a
    /// successful operation into an error.
    pub fn access<T, E, F>(&self, request: &AccessRequest, op: F) -> Result<T, AccessError<E>>
    where
        E: std::error::Error,
        F: FnOnce(&IdentifierOwnership) -> Result<T, E>,
    {
        let identifier = MedicalId::format(&request.identifier).map_err(IdentityError::from)?;

        let ownership = self
            .store
            .resolve(&identifier)
            .map_err(AccessError::Refused)?
            .ok_or_else(|| IdentityError::UnknownPatient {
                identifier: identifier.clone(),
            })?;

        let usable = self
            .ledger
            .is_usable(&request.tenant, &request.plugin)
            .map_err(AccessError::Refused)?;
        if !usable {
            self.append(
                &identifier,
                request,
                AccessOutcome::Denied,
                Some("plugin not active for tenant".into()),
                None,
            );
            return Err(AccessError::Refused(IdentityError::PluginNotActive {
                tenant: request.tenant.clone(),
                plugin: request.plugin.clone(),
            }));
        }

        let started = Instant::now();
        let outcome = op(&ownership);
        let duration_ms = started.elapsed().as_millis() as u64;

        match &outcome {
            Ok(_) => self.append(
                &identifier,
                request,
                AccessOutcome::Permitted,
                request.context.clone(),
                Some(duration_ms),
            ),
            Err(err) => {
                let context = match &request.context {
                    Some(context) => format!("{context}; failure: {err}"),
                    None => format!("failure: {err}"),
                };
                self.append(
                    &identifier,
                    request,
                    AccessOutcome::Failed,
                    Some(context),
                    Some(duration_ms),
                );
            }
        }

        outcome.map_err(AccessError::Operation)
    }

    fn append(
        &self,
        identifier: &MedicalId,
        request: &AccessRequest,
        outcome: AccessOutcome,
        context: Option<String>,
        duration_ms: Option<u64>,
    ) {
        let entry = AccessLogEntry {
            identifier: identifier.clone(),
            tenant: request.tenant.clone(),
            user: request.user.clone(),
            plugin: request.plugin.clone(),
            plugin_version: request.plugin_version.clone(),
            action: request.action,
            outcome,
            context,
            duration_ms,
            recorded_at: Utc::now(),
        };

        if let Err(err) = self.audit.append(&entry) {
            tracing::error!(
                "audit append failed for identifier {} (tenant {}, plugin {}): {err}",
                entry.identifier,
                entry.tenant,
                entry.plugin
            );
        }
    }
}
