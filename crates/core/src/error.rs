use medid::{MedicalId, MedicalIdError};
use mednet_types::{PluginName, PluginVersion, TenantId, TypeError};

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error(transparent)]
    InvalidFormat(#[from] MedicalIdError),
    #[error(transparent)]
    InvalidValue(#[from] TypeError),
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("identifier '{identifier}' is already owned by another patient")]
    AlreadyOwned { identifier: MedicalId },
    #[error("no available identifier after {attempts} attempts (possible space saturation or store fault)")]
    AllocationExhausted { attempts: u32 },
    #[error("identifier '{identifier}' has no registered owner")]
    UnknownPatient { identifier: MedicalId },

    #[error("plugin '{name}' version {version} is already registered")]
    DuplicateVersion {
        name: PluginName,
        version: PluginVersion,
    },
    #[error("invalid plugin manifest: {0}")]
    InvalidManifest(String),
    #[error("plugin '{name}' version {version} is not registered")]
    PluginNotFound {
        name: PluginName,
        version: PluginVersion,
    },
    #[error("plugin '{name}' version {version} still has tenant activations")]
    PluginInUse {
        name: PluginName,
        version: PluginVersion,
    },

    #[error("plugin '{plugin}' is not active for tenant '{tenant}'")]
    PluginNotActive {
        tenant: TenantId,
        plugin: PluginName,
    },
    #[error("plugin '{plugin}' is already active for tenant '{tenant}'")]
    AlreadyActive {
        tenant: TenantId,
        plugin: PluginName,
    },
    #[error("activation of plugin '{plugin}' for tenant '{tenant}' is not in setup")]
    NotInSetup {
        tenant: TenantId,
        plugin: PluginName,
    },
    #[error("no activation of plugin '{plugin}' found for tenant '{tenant}'")]
    ActivationNotFound {
        tenant: TenantId,
        plugin: PluginName,
    },

    #[error("unknown tenant: '{0}'")]
    UnknownTenant(String),
    #[error("tenant '{0}' already exists")]
    TenantExists(TenantId),

    #[error("failed to create store directory: {0}")]
    StoreDirCreation(std::io::Error),
    #[error("failed to write store file: {0}")]
    FileWrite(std::io::Error),
    #[error("failed to read store file: {0}")]
    FileRead(std::io::Error),
    #[error(
        "claim succeeded but writing the ownership row failed (path: {path}): write={write_error}; cleanup={cleanup_error}",
        path = path.display()
    )]
    CleanupAfterClaimFailed {
        path: std::path::PathBuf,
        #[source]
        write_error: Box<IdentityError>,
        cleanup_error: std::io::Error,
    },
    #[error("failed to serialize record: {0}")]
    Serialization(serde_json::Error),
    #[error("failed to deserialize record: {0}")]
    Deserialization(serde_json::Error),
    #[error("failed to serialize YAML record: {0}")]
    YamlSerialization(serde_yaml::Error),
    #[error("failed to deserialize YAML record: {0}")]
    YamlDeserialization(serde_yaml::Error),
    #[error("failed to append audit entry: {0}")]
    AuditWriteFailed(std::io::Error),
}

pub type IdentityResult<T> = std::result::Result<T, IdentityError>;
