//! Constants used throughout the MedNet core crate.
//!
//! This module contains the directory and filename constants for the durable
//! store layout, so the layout is defined in exactly one place.

/// Directory name for the identifier ownership registry.
pub const IDENTIFIERS_DIR_NAME: &str = "identifiers";

/// Directory name for global plugin manifests.
pub const PLUGINS_DIR_NAME: &str = "plugins";

/// Directory name for tenant records and their activation rows.
pub const TENANTS_DIR_NAME: &str = "tenants";

/// Directory name for per-tenant activation rows, under a tenant directory.
pub const ACTIVATIONS_DIR_NAME: &str = "activations";

/// Directory name for the access audit log.
pub const AUDIT_DIR_NAME: &str = "audit";

/// Filename for an identifier's ownership row.
pub const OWNERSHIP_FILENAME: &str = "ownership.yaml";

/// Filename for a plugin version's manifest.
pub const MANIFEST_FILENAME: &str = "manifest.yaml";

/// Filename for a tenant's directory row.
pub const TENANT_FILENAME: &str = "tenant.yaml";

/// Filename for the append-only access log (JSON Lines).
pub const ACCESS_LOG_FILENAME: &str = "access.jsonl";

/// Default directory for durable state when no explicit directory is configured.
pub const DEFAULT_DATA_DIR: &str = "mednet_data";

/// Default bound on identifier claim attempts before allocation gives up.
pub const DEFAULT_CLAIM_ATTEMPTS: u32 = 5;
