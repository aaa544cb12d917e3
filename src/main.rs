use axum::{
    Router,
    extract::{Path as AxumPath, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::{IntoParams, OpenApi, ToSchema};

use mednet_core::{
    AccessAction, AccessError, AccessGate, AccessRequest, ActivationLedger, AuditSink, CoreConfig,
    FsAuditLog, FsIdentifierStore, IdentifierAllocator, IdentifierStore, IdentityError,
    PluginManifest, PluginRegistry, SubscriptionPlan, TenantActivation, TenantDirectory,
    constants::DEFAULT_DATA_DIR,
};
use mednet_types::{ActorId, PatientRecordId, PluginName, PluginVersion, TenantId};

/// Application state shared across REST API handlers
///
/// Holds the identity services; everything durable lives under the data
/// directory resolved once at startup.
#[derive(Clone)]
struct AppState {
    allocator: IdentifierAllocator,
    store: Arc<FsIdentifierStore>,
    registry: PluginRegistry,
    ledger: Arc<ActivationLedger>,
    tenants: TenantDirectory,
    audit: Arc<FsAuditLog>,
    gate: Arc<AccessGate>,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        allocate_identifier,
        check_availability,
        assign_identifier,
        retire_identifier,
        register_tenant,
        register_plugin,
        list_plugins,
        begin_activation,
        complete_activation,
        deactivate_plugin,
        view_patient,
        list_audit,
    ),
    components(schemas(
        HealthRes,
        AllocateReq,
        IdentifierRes,
        AvailabilityRes,
        AssignReq,
        RetireRes,
        TenantAddReq,
        TenantRes,
        PluginManifestReq,
        AnalyticsViewsReq,
        PluginRes,
        ListPluginsRes,
        BeginActivationReq,
        CompleteActivationReq,
        ActivationRes,
        RecordViewRes,
        AuditEntryRes,
    ))
)]
struct ApiDoc;

#[derive(serde::Serialize, ToSchema)]
struct HealthRes {
    ok: bool,
    message: String,
}

#[derive(serde::Deserialize, ToSchema)]
struct AllocateReq {
    /// Patient record id, 32 lowercase hex characters
    patient_id: String,
    /// Registering tenant slug
    tenant: String,
}

#[derive(serde::Serialize, ToSchema)]
struct IdentifierRes {
    identifier: String,
}

#[derive(serde::Serialize, ToSchema)]
struct AvailabilityRes {
    format_valid: bool,
    available: bool,
}

#[derive(serde::Deserialize, ToSchema)]
struct AssignReq {
    patient_id: String,
    tenant: String,
}

#[derive(serde::Serialize, ToSchema)]
struct RetireRes {
    identifier: String,
    patient_id: String,
    retired: bool,
}

#[derive(serde::Deserialize, ToSchema)]
struct TenantAddReq {
    /// Display name, e.g. "St Marys Hospital"
    name: String,
    /// basic, premium or enterprise
    plan: String,
}

#[derive(serde::Serialize, ToSchema)]
struct TenantRes {
    id: String,
    display_name: String,
    plan: String,
}

#[derive(serde::Deserialize, ToSchema)]
struct AnalyticsViewsReq {
    patient_level: String,
    staff_level: String,
    tenant_level: String,
    network_level: String,
}

#[derive(serde::Deserialize, ToSchema)]
struct PluginManifestReq {
    name: String,
    version: String,
    category: String,
    #[serde(default)]
    capabilities: Vec<String>,
    analytics: AnalyticsViewsReq,
    setup_routine: String,
}

impl PluginManifestReq {
    fn into_manifest(self) -> Result<PluginManifest, IdentityError> {
        Ok(PluginManifest {
            name: PluginName::new(&self.name)?,
            version: PluginVersion::new(&self.version)?,
            category: self.category,
            capabilities: self.capabilities,
            analytics: mednet_core::AnalyticsViews {
                patient_level: self.analytics.patient_level,
                staff_level: self.analytics.staff_level,
                tenant_level: self.analytics.tenant_level,
                network_level: self.analytics.network_level,
            },
            setup_routine: self.setup_routine,
        })
    }
}

#[derive(serde::Serialize, ToSchema)]
struct PluginRes {
    name: String,
    version: String,
    category: String,
}

#[derive(serde::Serialize, ToSchema)]
struct ListPluginsRes {
    plugins: Vec<PluginRes>,
}

#[derive(serde::Deserialize, ToSchema)]
struct BeginActivationReq {
    /// Acting administrator
    user: String,
    /// Discard configuration stored by a previous activation
    #[serde(default)]
    reset: bool,
}

#[derive(serde::Deserialize, ToSchema)]
struct CompleteActivationReq {
    /// Tenant-specific configuration; omit to reuse stored configuration
    #[serde(default)]
    config: Option<serde_json::Value>,
}

#[derive(serde::Serialize, ToSchema)]
struct ActivationRes {
    tenant: String,
    plugin: String,
    version: String,
    state: String,
}

#[derive(serde::Serialize, ToSchema)]
struct RecordViewRes {
    identifier: String,
    patient_id: String,
    home_tenant: String,
    registered_at: String,
    retired: bool,
}

#[derive(serde::Deserialize, IntoParams)]
struct AccessQuery {
    tenant: String,
    user: String,
    plugin: String,
    version: String,
}

#[derive(serde::Deserialize, IntoParams)]
struct AuditQuery {
    identifier: Option<String>,
    tenant: Option<String>,
}

#[derive(serde::Deserialize, IntoParams)]
struct DiscoveryQuery {
    /// Tenant slug: restrict the listing to plugins this tenant can install
    tenant: Option<String>,
}

#[derive(serde::Serialize, ToSchema)]
struct AuditEntryRes {
    identifier: String,
    tenant: String,
    user: String,
    plugin: String,
    plugin_version: String,
    action: String,
    outcome: String,
    context: Option<String>,
    duration_ms: Option<u64>,
    recorded_at: String,
}

impl From<mednet_core::AccessLogEntry> for AuditEntryRes {
    fn from(entry: mednet_core::AccessLogEntry) -> Self {
        Self {
            identifier: entry.identifier.to_string(),
            tenant: entry.tenant.to_string(),
            user: entry.user.to_string(),
            plugin: entry.plugin.to_string(),
            plugin_version: entry.plugin_version.to_string(),
            action: format!("{:?}", entry.action).to_lowercase(),
            outcome: format!("{:?}", entry.outcome).to_lowercase(),
            context: entry.context,
            duration_ms: entry.duration_ms,
            recorded_at: entry.recorded_at.to_rfc3339(),
        }
    }
}

impl From<TenantActivation> for ActivationRes {
    fn from(row: TenantActivation) -> Self {
        Self {
            tenant: row.tenant.to_string(),
            plugin: row.plugin.to_string(),
            version: row.version.to_string(),
            state: format!("{:?}", row.state),
        }
    }
}

/// Maps core errors onto HTTP statuses.
///
/// Store-level failures are logged and collapsed to a generic 500 so
/// internal paths never leak to API clients.
fn identity_error(err: IdentityError) -> (StatusCode, String) {
    use IdentityError::*;

    match &err {
        InvalidFormat(_) | InvalidValue(_) | InvalidInput(_) | InvalidManifest(_) => {
            (StatusCode::BAD_REQUEST, err.to_string())
        }
        UnknownPatient { .. } | UnknownTenant(_) | PluginNotFound { .. }
        | ActivationNotFound { .. } => (StatusCode::NOT_FOUND, err.to_string()),
        AlreadyOwned { .. } | AlreadyActive { .. } | DuplicateVersion { .. } | TenantExists(_)
        | NotInSetup { .. } | PluginInUse { .. } => (StatusCode::CONFLICT, err.to_string()),
        PluginNotActive { .. } => (StatusCode::FORBIDDEN, err.to_string()),
        AllocationExhausted { .. } => (StatusCode::SERVICE_UNAVAILABLE, err.to_string()),
        _ => {
            tracing::error!("internal error: {err}");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal error".into())
        }
    }
}

fn parse_plan(plan: &str) -> Result<SubscriptionPlan, (StatusCode, String)> {
    match plan {
        "basic" => Ok(SubscriptionPlan::Basic),
        "premium" => Ok(SubscriptionPlan::Premium),
        "enterprise" => Ok(SubscriptionPlan::Enterprise),
        other => Err((
            StatusCode::BAD_REQUEST,
            format!("unknown plan '{other}' (expected basic, premium or enterprise)"),
        )),
    }
}

/// Main entry point for the MedNet identity service
///
/// Starts the REST server that fronts the identity subsystem: identifier
/// allocation and assignment, tenant and plugin administration, the gated
/// patient record view, and audit queries.
///
/// # Environment Variables
/// - `MEDNET_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `MEDNET_DATA_DIR`: Directory for durable state (default: "mednet_data")
/// - `MEDNET_CLAIM_ATTEMPTS`: Allocation attempt budget (default: 5)
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("mednet=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::var("MEDNET_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let data_dir = PathBuf::from(
        std::env::var("MEDNET_DATA_DIR").unwrap_or_else(|_| DEFAULT_DATA_DIR.into()),
    );

    let cfg = match std::env::var("MEDNET_CLAIM_ATTEMPTS") {
        Ok(raw) => CoreConfig::new(data_dir, raw.parse()?)?,
        Err(_) => CoreConfig::with_defaults(data_dir),
    };
    let cfg = Arc::new(cfg);

    tracing::info!("++ Starting MedNet REST on {}", addr);
    tracing::info!("++ Durable state under {}", cfg.data_dir().display());

    let store = Arc::new(FsIdentifierStore::new(Arc::clone(&cfg)));
    let ledger = Arc::new(ActivationLedger::new(Arc::clone(&cfg)));
    let audit = Arc::new(FsAuditLog::new(Arc::clone(&cfg)));

    let state = AppState {
        allocator: IdentifierAllocator::new(
            store.clone() as Arc<dyn IdentifierStore>,
            cfg.claim_attempts(),
        ),
        store: Arc::clone(&store),
        registry: PluginRegistry::new(Arc::clone(&cfg)),
        ledger: Arc::clone(&ledger),
        tenants: TenantDirectory::new(Arc::clone(&cfg)),
        audit: Arc::clone(&audit),
        gate: Arc::new(AccessGate::new(
            store as Arc<dyn IdentifierStore>,
            ledger,
            audit as Arc<dyn AuditSink>,
        )),
    };

    let app = Router::new()
        .route("/health", get(health))
        .route("/identifiers", post(allocate_identifier))
        .route("/identifiers/:candidate/availability", get(check_availability))
        .route("/identifiers/:candidate/assign", post(assign_identifier))
        .route("/identifiers/:identifier/retire", post(retire_identifier))
        .route("/tenants", post(register_tenant))
        .route("/plugins", get(list_plugins))
        .route("/plugins", post(register_plugin))
        .route(
            "/tenants/:tenant/plugins/:plugin/:version/activation/begin",
            post(begin_activation),
        )
        .route(
            "/tenants/:tenant/plugins/:plugin/activation/complete",
            post(complete_activation),
        )
        .route(
            "/tenants/:tenant/plugins/:plugin/deactivate",
            post(deactivate_plugin),
        )
        .route("/patients/:identifier", get(view_patient))
        .route("/audit", get(list_audit))
        .route(
            "/api-docs/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        )
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for monitoring and load balancers
async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthRes {
        ok: true,
        message: "MedNet is alive".into(),
    })
}

#[utoipa::path(
    post,
    path = "/identifiers",
    request_body = AllocateReq,
    responses(
        (status = 201, description = "Identifier allocated", body = IdentifierRes),
        (status = 400, description = "Bad request"),
        (status = 404, description = "Unknown tenant"),
        (status = 503, description = "Allocation exhausted")
    )
)]
/// Allocate a fresh identifier for a newly registered patient
///
/// Called by the registration flow exactly once per new patient. Allocation
/// failure must abort the surrounding registration: no patient record may
/// exist without an identifier.
async fn allocate_identifier(
    State(state): State<AppState>,
    Json(req): Json<AllocateReq>,
) -> Result<(StatusCode, Json<IdentifierRes>), (StatusCode, String)> {
    let patient = PatientRecordId::parse(&req.patient_id)
        .map_err(IdentityError::from)
        .map_err(identity_error)?;
    let tenant = state.tenants.resolve(&req.tenant).map_err(identity_error)?;

    let identifier = state
        .allocator
        .allocate(patient, &tenant)
        .map_err(identity_error)?;

    Ok((
        StatusCode::CREATED,
        Json(IdentifierRes {
            identifier: identifier.to_string(),
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/identifiers/{candidate}/availability",
    params(("candidate" = String, Path, description = "Candidate identifier")),
    responses(
        (status = 200, description = "Availability report", body = AvailabilityRes)
    )
)]
/// Interactive availability probe for hand-picked identifiers
///
/// The answer is advisory: the atomic claim at assignment time is what
/// decides.
async fn check_availability(
    State(state): State<AppState>,
    AxumPath(candidate): AxumPath<String>,
) -> Result<Json<AvailabilityRes>, (StatusCode, String)> {
    let report = state
        .allocator
        .check_availability(&candidate)
        .map_err(identity_error)?;

    Ok(Json(AvailabilityRes {
        format_valid: report.format_valid,
        available: report.available,
    }))
}

#[utoipa::path(
    post,
    path = "/identifiers/{candidate}/assign",
    params(("candidate" = String, Path, description = "Requested identifier")),
    request_body = AssignReq,
    responses(
        (status = 201, description = "Identifier assigned", body = IdentifierRes),
        (status = 400, description = "Bad request"),
        (status = 409, description = "Identifier already owned")
    )
)]
/// Explicitly assign a hand-picked identifier
///
/// Never substitutes a generated identifier: a taken code is a 409, not a
/// fallback to allocation.
async fn assign_identifier(
    State(state): State<AppState>,
    AxumPath(candidate): AxumPath<String>,
    Json(req): Json<AssignReq>,
) -> Result<(StatusCode, Json<IdentifierRes>), (StatusCode, String)> {
    let patient = PatientRecordId::parse(&req.patient_id)
        .map_err(IdentityError::from)
        .map_err(identity_error)?;
    let tenant = state.tenants.resolve(&req.tenant).map_err(identity_error)?;

    let identifier = state
        .allocator
        .assign(&candidate, patient, &tenant)
        .map_err(identity_error)?;

    Ok((
        StatusCode::CREATED,
        Json(IdentifierRes {
            identifier: identifier.to_string(),
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/identifiers/{identifier}/retire",
    params(("identifier" = String, Path, description = "Identifier to retire")),
    responses(
        (status = 200, description = "Binding retired", body = RetireRes),
        (status = 404, description = "Unknown identifier")
    )
)]
/// Retire an identifier binding when its patient record is deactivated
///
/// The binding stays resolvable and the code is never recycled.
async fn retire_identifier(
    State(state): State<AppState>,
    AxumPath(identifier): AxumPath<String>,
) -> Result<Json<RetireRes>, (StatusCode, String)> {
    let identifier: mednet_core::MedicalId = identifier
        .parse()
        .map_err(IdentityError::from)
        .map_err(identity_error)?;

    let ownership = state.store.retire(&identifier).map_err(identity_error)?;

    Ok(Json(RetireRes {
        identifier: ownership.identifier.to_string(),
        patient_id: ownership.patient.to_string(),
        retired: ownership.retired,
    }))
}

#[utoipa::path(
    post,
    path = "/tenants",
    request_body = TenantAddReq,
    responses(
        (status = 201, description = "Tenant registered", body = TenantRes),
        (status = 409, description = "Tenant already exists")
    )
)]
/// Register a tenant (hospital) under the slug of its display name
async fn register_tenant(
    State(state): State<AppState>,
    Json(req): Json<TenantAddReq>,
) -> Result<(StatusCode, Json<TenantRes>), (StatusCode, String)> {
    let plan = parse_plan(&req.plan)?;
    let record = state
        .tenants
        .register(&req.name, plan)
        .map_err(identity_error)?;

    Ok((
        StatusCode::CREATED,
        Json(TenantRes {
            id: record.id.to_string(),
            display_name: record.display_name,
            plan: req.plan,
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/plugins",
    request_body = PluginManifestReq,
    responses(
        (status = 201, description = "Plugin registered", body = PluginRes),
        (status = 400, description = "Invalid manifest"),
        (status = 409, description = "Duplicate version")
    )
)]
/// Publish a plugin version
async fn register_plugin(
    State(state): State<AppState>,
    Json(req): Json<PluginManifestReq>,
) -> Result<(StatusCode, Json<PluginRes>), (StatusCode, String)> {
    let manifest = req.into_manifest().map_err(identity_error)?;
    let registered = state.registry.register(&manifest).map_err(identity_error)?;

    Ok((
        StatusCode::CREATED,
        Json(PluginRes {
            name: registered.name.to_string(),
            version: registered.version.to_string(),
            category: registered.category,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/plugins",
    params(DiscoveryQuery),
    responses(
        (status = 200, description = "Plugin listing", body = ListPluginsRes)
    )
)]
/// List published plugins
///
/// With `tenant`, this is the admin "apps" view: only plugins the tenant
/// can currently install or re-activate.
async fn list_plugins(
    State(state): State<AppState>,
    Query(query): Query<DiscoveryQuery>,
) -> Result<Json<ListPluginsRes>, (StatusCode, String)> {
    let manifests = match query.tenant {
        Some(key) => {
            let tenant = state.tenants.resolve(&key).map_err(identity_error)?;
            state
                .registry
                .list_for_discovery(&tenant, &state.ledger)
                .map_err(identity_error)?
        }
        None => state.registry.list_all().map_err(identity_error)?,
    };

    Ok(Json(ListPluginsRes {
        plugins: manifests
            .into_iter()
            .map(|m| PluginRes {
                name: m.name.to_string(),
                version: m.version.to_string(),
                category: m.category,
            })
            .collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/tenants/{tenant}/plugins/{plugin}/{version}/activation/begin",
    params(
        ("tenant" = String, Path, description = "Tenant slug"),
        ("plugin" = String, Path, description = "Plugin name"),
        ("version" = String, Path, description = "Plugin version"),
    ),
    request_body = BeginActivationReq,
    responses(
        (status = 200, description = "Activation entered setup", body = ActivationRes),
        (status = 404, description = "Unknown tenant or plugin"),
        (status = 409, description = "Already active")
    )
)]
/// Begin plugin activation for a tenant
async fn begin_activation(
    State(state): State<AppState>,
    AxumPath((tenant, plugin, version)): AxumPath<(String, String, String)>,
    Json(req): Json<BeginActivationReq>,
) -> Result<Json<ActivationRes>, (StatusCode, String)> {
    let tenant = state.tenants.resolve(&tenant).map_err(identity_error)?;
    let name = PluginName::new(&plugin)
        .map_err(IdentityError::from)
        .map_err(identity_error)?;
    let version = PluginVersion::new(&version)
        .map_err(IdentityError::from)
        .map_err(identity_error)?;
    let user = ActorId::new(&req.user)
        .map_err(IdentityError::from)
        .map_err(identity_error)?;

    let manifest = state.registry.get(&name, &version).map_err(identity_error)?;
    let row = state
        .ledger
        .begin_activation(&tenant, &manifest, &user, req.reset)
        .map_err(identity_error)?;

    Ok(Json(row.into()))
}

#[utoipa::path(
    post,
    path = "/tenants/{tenant}/plugins/{plugin}/activation/complete",
    params(
        ("tenant" = String, Path, description = "Tenant slug"),
        ("plugin" = String, Path, description = "Plugin name"),
    ),
    request_body = CompleteActivationReq,
    responses(
        (status = 200, description = "Plugin activated", body = ActivationRes),
        (status = 409, description = "Activation not in setup")
    )
)]
/// Complete plugin activation with the configuration the setup routine
/// collected
async fn complete_activation(
    State(state): State<AppState>,
    AxumPath((tenant, plugin)): AxumPath<(String, String)>,
    Json(req): Json<CompleteActivationReq>,
) -> Result<Json<ActivationRes>, (StatusCode, String)> {
    let tenant = state.tenants.resolve(&tenant).map_err(identity_error)?;
    let name = PluginName::new(&plugin)
        .map_err(IdentityError::from)
        .map_err(identity_error)?;

    let row = state
        .ledger
        .complete_activation(&tenant, &name, req.config)
        .map_err(identity_error)?;

    Ok(Json(row.into()))
}

#[utoipa::path(
    post,
    path = "/tenants/{tenant}/plugins/{plugin}/deactivate",
    params(
        ("tenant" = String, Path, description = "Tenant slug"),
        ("plugin" = String, Path, description = "Plugin name"),
    ),
    responses(
        (status = 200, description = "Plugin deactivated", body = ActivationRes),
        (status = 404, description = "No activation row"),
        (status = 403, description = "Plugin not active")
    )
)]
/// Deactivate a plugin for a tenant, keeping its configuration
async fn deactivate_plugin(
    State(state): State<AppState>,
    AxumPath((tenant, plugin)): AxumPath<(String, String)>,
) -> Result<Json<ActivationRes>, (StatusCode, String)> {
    let tenant = state.tenants.resolve(&tenant).map_err(identity_error)?;
    let name = PluginName::new(&plugin)
        .map_err(IdentityError::from)
        .map_err(identity_error)?;

    let row = state
        .ledger
        .deactivate(&tenant, &name)
        .map_err(identity_error)?;

    Ok(Json(row.into()))
}

#[utoipa::path(
    get,
    path = "/patients/{identifier}",
    params(
        ("identifier" = String, Path, description = "Medical identifier"),
        AccessQuery,
    ),
    responses(
        (status = 200, description = "Gated record view", body = RecordViewRes),
        (status = 403, description = "Plugin not active for tenant"),
        (status = 404, description = "Unknown patient")
    )
)]
/// View the record binding for an identifier, through the access gate
///
/// This is the reference consumer of the gate: the touch is authorized
/// against the tenant's plugin activation and audited, like every other
/// plugin-initiated record access.
async fn view_patient(
    State(state): State<AppState>,
    AxumPath(identifier): AxumPath<String>,
    Query(query): Query<AccessQuery>,
) -> Result<Json<RecordViewRes>, (StatusCode, String)> {
    let tenant = state.tenants.resolve(&query.tenant).map_err(identity_error)?;
    let user = ActorId::new(&query.user)
        .map_err(IdentityError::from)
        .map_err(identity_error)?;
    let plugin = PluginName::new(&query.plugin)
        .map_err(IdentityError::from)
        .map_err(identity_error)?;
    let plugin_version = PluginVersion::new(&query.version)
        .map_err(IdentityError::from)
        .map_err(identity_error)?;

    let request = AccessRequest {
        identifier,
        tenant,
        user,
        plugin,
        plugin_version,
        action: AccessAction::View,
        context: None,
    };

    let view = state
        .gate
        .access(&request, |ownership| {
            Ok::<_, Infallible>(RecordViewRes {
                identifier: ownership.identifier.to_string(),
                patient_id: ownership.patient.to_string(),
                home_tenant: ownership.home_tenant.to_string(),
                registered_at: ownership.registered_at.to_rfc3339(),
                retired: ownership.retired,
            })
        })
        .map_err(|err| match err {
            AccessError::Refused(err) => identity_error(err),
            AccessError::Operation(never) => match never {},
        })?;

    Ok(Json(view))
}

#[utoipa::path(
    get,
    path = "/audit",
    params(AuditQuery),
    responses(
        (status = 200, description = "Audit entries, oldest first", body = Vec<AuditEntryRes>),
        (status = 400, description = "Missing filter")
    )
)]
/// Compliance read of the access audit log, by identifier or tenant
async fn list_audit(
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Vec<AuditEntryRes>>, (StatusCode, String)> {
    let entries = match (query.identifier, query.tenant) {
        (Some(raw), _) => {
            let identifier: mednet_core::MedicalId = raw
                .parse()
                .map_err(IdentityError::from)
                .map_err(identity_error)?;
            state
                .audit
                .entries_for_identifier(&identifier)
                .map_err(identity_error)?
        }
        (None, Some(key)) => {
            let tenant = TenantId::new(&key)
                .map_err(IdentityError::from)
                .map_err(identity_error)?;
            state
                .audit
                .entries_for_tenant(&tenant)
                .map_err(identity_error)?
        }
        (None, None) => {
            return Err((
                StatusCode::BAD_REQUEST,
                "pass an identifier or tenant filter".into(),
            ));
        }
    };

    Ok(Json(entries.into_iter().map(AuditEntryRes::from).collect()))
}
