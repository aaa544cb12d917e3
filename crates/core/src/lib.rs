//! # MedNet Core
//!
//! Core business logic for the MedNet cross-tenant patient identity
//! subsystem:
//!
//! - Allocation and explicit assignment of permanent medical identifiers
//! - The durable uniqueness registry that arbitrates every claim
//! - Global plugin registry and the per-tenant activation ledger
//! - The tenant directory (one canonical slug lookup)
//! - The access gate every plugin-record touch goes through, and the
//!   append-only audit log it writes
//!
//! **No API concerns**: HTTP routing, authentication and OpenAPI surfaces
//! belong in the `mednet-run` binary; administrative tooling in
//! `mednet-cli`.
//!
//! Services are constructed around an explicit [`CoreConfig`] (and, for
//! the allocator and gate, explicit store handles) rather than ambient
//! process state, so tests and embedders can instantiate isolated stacks.

pub mod allocator;
pub mod audit;
pub mod config;
pub mod constants;
pub mod error;
pub mod gate;
pub mod identifiers;
pub mod ledger;
pub mod plugins;
pub mod tenants;

pub use allocator::{AvailabilityReport, IdentifierAllocator};
pub use audit::{AccessAction, AccessLogEntry, AccessOutcome, AuditSink, FsAuditLog, InMemoryAuditLog};
pub use config::CoreConfig;
pub use error::{IdentityError, IdentityResult};
pub use gate::{AccessError, AccessGate, AccessRequest};
pub use identifiers::{
    FsIdentifierStore, IdentifierOwnership, IdentifierStore, InMemoryIdentifierStore,
};
pub use ledger::{ActivationLedger, ActivationState, TenantActivation};
pub use plugins::{AnalyticsViews, PluginManifest, PluginRegistry};
pub use tenants::{SubscriptionPlan, TenantDirectory, TenantRecord};

// Re-export the identifier type most callers need alongside the services.
pub use medid::MedicalId;
