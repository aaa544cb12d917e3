//! Identifier allocation.
//!
//! The allocator produces a fresh, available medical identifier by drawing
//! uniformly random candidates and racing each one through the uniqueness
//! store's atomic claim. Availability is only ever re-checked *at claim
//! time*: a candidate that looked free can still lose the race, in which
//! case the loop simply moves to a new draw.
//!
//! The loop is bounded. With a 31-symbol alphabet the space holds about
//! 28.6 million codes, so hitting the bound in practice means the space is
//! saturating or the store is misbehaving; exhaustion is therefore surfaced
//! as its own error and logged as an operational alarm, never silently
//! retried forever.

use crate::error::{IdentityError, IdentityResult};
use crate::identifiers::{IdentifierOwnership, IdentifierStore};
use medid::MedicalId;
use mednet_types::{PatientRecordId, TenantId};
use std::sync::Arc;

/// Answer to an interactive availability probe.
///
/// Advisory only: `available` can be stale by the time a claim is
/// attempted, and the claim re-checks atomically.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AvailabilityReport {
    pub format_valid: bool,
    pub available: bool,
}

/// Produces fresh identifiers against a uniqueness store.
#[derive(Clone)]
pub struct IdentifierAllocator {
    store: Arc<dyn IdentifierStore>,
    max_attempts: u32,
}

impl IdentifierAllocator {
    /// `max_attempts` bounds the draw-and-claim loop (the configured
    /// default is 5).
    pub fn new(store: Arc<dyn IdentifierStore>, max_attempts: u32) -> Self {
        Self {
            store,
            max_attempts,
        }
    }

    /// Allocates a fresh identifier for a newly registered patient.
    ///
    /// Collisions and transient store failures both count against the
    /// attempt budget; permanent conflicts are never retried on the same
    /// candidate, the loop moves to a new draw.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::AllocationExhausted`] when no candidate
    /// could be claimed within the budget. Callers must treat that as an
    /// operational alarm and fail the surrounding registration; a patient
    /// record must never exist without an identifier.
    pub fn allocate(
        &self,
        patient: PatientRecordId,
        home_tenant: &TenantId,
    ) -> IdentityResult<MedicalId> {
        let mut rng = rand::thread_rng();

        for _attempt in 0..self.max_attempts {
            let candidate = MedicalId::random(&mut rng);

            // Cheap advisory pre-check; the claim below is what decides.
            match self.store.resolve(&candidate) {
                Ok(Some(_)) => continue,
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!("transient resolve failure for candidate {candidate}: {err}");
                    continue;
                }
            }

            let ownership =
                IdentifierOwnership::new(candidate.clone(), patient, home_tenant.clone());
            match self.store.try_claim(&ownership) {
                Ok(true) => return Ok(candidate),
                Ok(false) => continue,
                Err(err) => {
                    tracing::warn!("transient claim failure for candidate {candidate}: {err}");
                    continue;
                }
            }
        }

        tracing::error!(
            "identifier allocation exhausted after {} attempts; \
             identifier space may be saturating or the store is faulty",
            self.max_attempts
        );
        Err(IdentityError::AllocationExhausted {
            attempts: self.max_attempts,
        })
    }

    /// Interactive availability probe for hand-picked identifiers.
    ///
    /// Format failures short-circuit to unavailable without touching the
    /// store.
    pub fn check_availability(&self, raw: &str) -> IdentityResult<AvailabilityReport> {
        let Ok(identifier) = MedicalId::format(raw) else {
            return Ok(AvailabilityReport {
                format_valid: false,
                available: false,
            });
        };

        let available = self.store.resolve(&identifier)?.is_none();
        Ok(AvailabilityReport {
            format_valid: true,
            available,
        })
    }

    /// Explicit administrative assignment of a chosen identifier.
    ///
    /// Unlike [`allocate`](Self::allocate), this never substitutes a
    /// different code: if the requested identifier is taken the call fails
    /// with [`IdentityError::AlreadyOwned`], leaving the existing binding
    /// untouched.
    pub fn assign(
        &self,
        raw: &str,
        patient: PatientRecordId,
        home_tenant: &TenantId,
    ) -> IdentityResult<MedicalId> {
        let identifier = MedicalId::format(raw)?;

        let ownership = IdentifierOwnership::new(identifier.clone(), patient, home_tenant.clone());
        if self.store.try_claim(&ownership)? {
            Ok(identifier)
        } else {
            Err(IdentityError::AlreadyOwned { identifier })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifiers::InMemoryIdentifierStore;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn tenant() -> TenantId {
        TenantId::new("st-marys").unwrap()
    }

    #[test]
    fn allocate_returns_resolvable_identifier() {
        let store = Arc::new(InMemoryIdentifierStore::new());
        let allocator = IdentifierAllocator::new(store.clone(), 5);

        let patient = PatientRecordId::new();
        let id = allocator.allocate(patient, &tenant()).unwrap();

        assert!(MedicalId::validate(id.as_str()));
        let ownership = store.resolve(&id).unwrap().unwrap();
        assert_eq!(ownership.patient, patient);
        assert_eq!(ownership.home_tenant, tenant());
    }

    #[test]
    fn allocate_ten_thousand_distinct_identifiers() {
        let store = Arc::new(InMemoryIdentifierStore::new());
        let allocator = IdentifierAllocator::new(store.clone(), 5);

        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            let id = allocator.allocate(PatientRecordId::new(), &tenant()).unwrap();
            assert!(MedicalId::validate(id.as_str()));
            assert!(seen.insert(id));
        }
        assert_eq!(store.len(), 10_000);
    }

    /// Store that refuses every claim, as if the space were saturated.
    struct SaturatedStore;

    impl IdentifierStore for SaturatedStore {
        fn try_claim(&self, _ownership: &IdentifierOwnership) -> IdentityResult<bool> {
            Ok(false)
        }

        fn resolve(&self, _identifier: &MedicalId) -> IdentityResult<Option<IdentifierOwnership>> {
            Ok(None)
        }

        fn retire(&self, identifier: &MedicalId) -> IdentityResult<IdentifierOwnership> {
            Err(IdentityError::UnknownPatient {
                identifier: identifier.clone(),
            })
        }
    }

    #[test]
    fn allocate_exhausts_after_bounded_attempts() {
        let allocator = IdentifierAllocator::new(Arc::new(SaturatedStore), 5);

        let err = allocator
            .allocate(PatientRecordId::new(), &tenant())
            .unwrap_err();
        assert!(matches!(
            err,
            IdentityError::AllocationExhausted { attempts: 5 }
        ));
    }

    /// Store that fails transiently before recovering.
    struct FlakyStore {
        inner: InMemoryIdentifierStore,
        failures_left: AtomicU32,
    }

    impl IdentifierStore for FlakyStore {
        fn try_claim(&self, ownership: &IdentifierOwnership) -> IdentityResult<bool> {
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(IdentityError::FileWrite(std::io::Error::other(
                    "store briefly unavailable",
                )));
            }
            self.inner.try_claim(ownership)
        }

        fn resolve(&self, identifier: &MedicalId) -> IdentityResult<Option<IdentifierOwnership>> {
            self.inner.resolve(identifier)
        }

        fn retire(&self, identifier: &MedicalId) -> IdentityResult<IdentifierOwnership> {
            self.inner.retire(identifier)
        }
    }

    #[test]
    fn transient_claim_failures_stay_within_budget() {
        let store = Arc::new(FlakyStore {
            inner: InMemoryIdentifierStore::new(),
            failures_left: AtomicU32::new(2),
        });
        let allocator = IdentifierAllocator::new(store, 5);

        // Two failed attempts still leave room in the budget.
        assert!(allocator.allocate(PatientRecordId::new(), &tenant()).is_ok());
    }

    #[test]
    fn transient_failures_beyond_budget_exhaust() {
        let store = Arc::new(FlakyStore {
            inner: InMemoryIdentifierStore::new(),
            failures_left: AtomicU32::new(u32::MAX),
        });
        let allocator = IdentifierAllocator::new(store, 3);

        assert!(matches!(
            allocator.allocate(PatientRecordId::new(), &tenant()),
            Err(IdentityError::AllocationExhausted { attempts: 3 })
        ));
    }

    #[test]
    fn check_availability_short_circuits_on_format() {
        let allocator = IdentifierAllocator::new(Arc::new(InMemoryIdentifierStore::new()), 5);

        let report = allocator.check_availability("A1").unwrap();
        assert_eq!(
            report,
            AvailabilityReport {
                format_valid: false,
                available: false
            }
        );
    }

    #[test]
    fn check_availability_reflects_store_state() {
        let store = Arc::new(InMemoryIdentifierStore::new());
        let allocator = IdentifierAllocator::new(store, 5);

        let report = allocator.check_availability("a3tv2").unwrap();
        assert_eq!(
            report,
            AvailabilityReport {
                format_valid: true,
                available: true
            }
        );

        allocator
            .assign("A3TV2", PatientRecordId::new(), &tenant())
            .unwrap();

        let report = allocator.check_availability("a3tv2").unwrap();
        assert_eq!(
            report,
            AvailabilityReport {
                format_valid: true,
                available: false
            }
        );
    }

    #[test]
    fn assign_never_substitutes() {
        let store = Arc::new(InMemoryIdentifierStore::new());
        let allocator = IdentifierAllocator::new(store.clone(), 5);

        let patient_a = PatientRecordId::new();
        let patient_c = PatientRecordId::new();

        allocator.assign("A3TV2", patient_a, &tenant()).unwrap();

        let err = allocator.assign("A3TV2", patient_c, &tenant()).unwrap_err();
        assert!(matches!(err, IdentityError::AlreadyOwned { .. }));

        // The original binding is untouched.
        let id = MedicalId::format("A3TV2").unwrap();
        let ownership = store.resolve(&id).unwrap().unwrap();
        assert_eq!(ownership.patient, patient_a);
    }

    #[test]
    fn assign_rejects_bad_format() {
        let allocator = IdentifierAllocator::new(Arc::new(InMemoryIdentifierStore::new()), 5);
        assert!(matches!(
            allocator.assign("A1TV2", PatientRecordId::new(), &tenant()),
            Err(IdentityError::InvalidFormat(_))
        ));
    }
}
