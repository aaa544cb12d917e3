use clap::{Parser, Subcommand};
use mednet_core::{
    constants::DEFAULT_DATA_DIR, ActivationLedger, AuditSink, CoreConfig, FsAuditLog,
    FsIdentifierStore, IdentifierAllocator, IdentifierStore, PluginManifest, PluginRegistry,
    SubscriptionPlan, TenantDirectory,
};
use mednet_types::{ActorId, PatientRecordId, PluginName, PluginVersion, TenantId};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "mednet")]
#[command(about = "MedNet patient identity administration CLI")]
struct Cli {
    /// Data directory holding the durable stores
    #[arg(long, global = true, default_value = DEFAULT_DATA_DIR)]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Allocate a fresh identifier for a patient record
    Allocate {
        /// Patient record id (32 lowercase hex characters)
        patient: String,
        /// Registering tenant slug
        tenant: String,
    },
    /// Check format and availability of a candidate identifier
    Check {
        /// Candidate identifier
        candidate: String,
    },
    /// Assign a hand-picked identifier to a patient record
    Assign {
        /// Requested identifier
        candidate: String,
        /// Patient record id (32 lowercase hex characters)
        patient: String,
        /// Registering tenant slug
        tenant: String,
    },
    /// Retire an identifier binding (keeps the binding, stops reuse questions)
    Retire {
        /// Identifier to retire
        identifier: String,
    },
    /// Register a tenant (hospital)
    TenantAdd {
        /// Display name, e.g. "St Marys Hospital"
        name: String,
        /// Subscription plan: basic, premium or enterprise
        #[arg(long, default_value = "basic")]
        plan: String,
    },
    /// Resolve a tenant key to its canonical id
    TenantResolve {
        /// Tenant slug
        key: String,
    },
    /// Register a plugin version from a manifest YAML file
    PluginRegister {
        /// Path to manifest.yaml
        manifest: PathBuf,
    },
    /// List plugins, optionally as a tenant's discovery view
    PluginList {
        /// Tenant slug: list only plugins this tenant can install
        #[arg(long)]
        tenant: Option<String>,
    },
    /// Remove a plugin version no tenant holds an activation for
    PluginUnregister {
        plugin: String,
        version: String,
    },
    /// Begin plugin activation for a tenant (enters setup)
    ActivationBegin {
        tenant: String,
        plugin: String,
        version: String,
        /// Acting administrator
        user: String,
        /// Discard configuration stored by a previous activation
        #[arg(long)]
        reset: bool,
    },
    /// Complete plugin activation with configuration JSON
    ActivationComplete {
        tenant: String,
        plugin: String,
        /// Configuration as a JSON object; omit to reuse stored configuration
        #[arg(long)]
        config: Option<String>,
    },
    /// Deactivate an active plugin for a tenant
    Deactivate {
        tenant: String,
        plugin: String,
    },
    /// Print recent audit entries for an identifier or a tenant
    AuditTail {
        #[arg(long)]
        identifier: Option<String>,
        #[arg(long)]
        tenant: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

fn parse_plan(plan: &str) -> Result<SubscriptionPlan, String> {
    match plan {
        "basic" => Ok(SubscriptionPlan::Basic),
        "premium" => Ok(SubscriptionPlan::Premium),
        "enterprise" => Ok(SubscriptionPlan::Enterprise),
        other => Err(format!(
            "unknown plan '{other}' (expected basic, premium or enterprise)"
        )),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let cfg = Arc::new(CoreConfig::with_defaults(cli.data_dir));
    let store = Arc::new(FsIdentifierStore::new(Arc::clone(&cfg)));
    let allocator =
        IdentifierAllocator::new(store.clone() as Arc<dyn IdentifierStore>, cfg.claim_attempts());
    let registry = PluginRegistry::new(Arc::clone(&cfg));
    let ledger = ActivationLedger::new(Arc::clone(&cfg));
    let tenants = TenantDirectory::new(Arc::clone(&cfg));
    let audit = FsAuditLog::new(Arc::clone(&cfg));

    match cli.command {
        Commands::Allocate { patient, tenant } => {
            let patient = PatientRecordId::parse(&patient)?;
            let tenant = tenants.resolve(&tenant)?;
            let id = allocator.allocate(patient, &tenant)?;
            println!("Allocated identifier: {id}");
        }
        Commands::Check { candidate } => {
            let report = allocator.check_availability(&candidate)?;
            println!(
                "format_valid: {}, available: {}",
                report.format_valid, report.available
            );
        }
        Commands::Assign {
            candidate,
            patient,
            tenant,
        } => {
            let patient = PatientRecordId::parse(&patient)?;
            let tenant = tenants.resolve(&tenant)?;
            let id = allocator.assign(&candidate, patient, &tenant)?;
            println!("Assigned identifier: {id}");
        }
        Commands::Retire { identifier } => {
            let id: mednet_core::MedicalId = identifier.parse()?;
            let ownership = store.retire(&id)?;
            println!(
                "Retired identifier {} (patient {})",
                ownership.identifier, ownership.patient
            );
        }
        Commands::TenantAdd { name, plan } => {
            let plan = parse_plan(&plan)?;
            let record = tenants.register(&name, plan)?;
            println!("Registered tenant '{}' as {}", record.display_name, record.id);
        }
        Commands::TenantResolve { key } => {
            let id = tenants.resolve(&key)?;
            println!("{id}");
        }
        Commands::PluginRegister { manifest } => {
            let contents = std::fs::read_to_string(&manifest)?;
            let manifest: PluginManifest = serde_yaml::from_str(&contents)?;
            let registered = registry.register(&manifest)?;
            println!(
                "Registered plugin {} version {}",
                registered.name, registered.version
            );
        }
        Commands::PluginList { tenant } => {
            let manifests = match tenant {
                Some(key) => {
                    let tenant = tenants.resolve(&key)?;
                    registry.list_for_discovery(&tenant, &ledger)?
                }
                None => registry.list_all()?,
            };

            if manifests.is_empty() {
                println!("No plugins found.");
            } else {
                for manifest in manifests {
                    println!(
                        "{} {} ({})",
                        manifest.name, manifest.version, manifest.category
                    );
                }
            }
        }
        Commands::PluginUnregister { plugin, version } => {
            let name = PluginName::new(&plugin)?;
            let version = PluginVersion::new(&version)?;
            registry.unregister(&name, &version, &ledger)?;
            println!("Unregistered plugin {name} version {version}");
        }
        Commands::ActivationBegin {
            tenant,
            plugin,
            version,
            user,
            reset,
        } => {
            let tenant = tenants.resolve(&tenant)?;
            let name = PluginName::new(&plugin)?;
            let version = PluginVersion::new(&version)?;
            let user = ActorId::new(&user)?;

            let manifest = registry.get(&name, &version)?;
            let row = ledger.begin_activation(&tenant, &manifest, &user, reset)?;
            println!(
                "Activation of {} {} for {} is now in setup",
                row.plugin, row.version, row.tenant
            );
        }
        Commands::ActivationComplete {
            tenant,
            plugin,
            config,
        } => {
            let tenant = tenants.resolve(&tenant)?;
            let name = PluginName::new(&plugin)?;
            let config = config
                .as_deref()
                .map(serde_json::from_str::<serde_json::Value>)
                .transpose()?;

            let row = ledger.complete_activation(&tenant, &name, config)?;
            println!("Plugin {} is now active for {}", row.plugin, row.tenant);
        }
        Commands::Deactivate { tenant, plugin } => {
            let tenant = tenants.resolve(&tenant)?;
            let name = PluginName::new(&plugin)?;
            let row = ledger.deactivate(&tenant, &name)?;
            println!("Plugin {} deactivated for {}", row.plugin, row.tenant);
        }
        Commands::AuditTail {
            identifier,
            tenant,
            limit,
        } => {
            let entries = match (identifier, tenant) {
                (Some(raw), _) => {
                    let id: mednet_core::MedicalId = raw.parse()?;
                    audit.entries_for_identifier(&id)?
                }
                (None, Some(key)) => {
                    let tenant = TenantId::new(&key)?;
                    audit.entries_for_tenant(&tenant)?
                }
                (None, None) => {
                    return Err("pass --identifier or --tenant".into());
                }
            };

            for entry in entries.iter().rev().take(limit).rev() {
                println!(
                    "{} {} {:?}/{:?} tenant={} user={} plugin={} {}",
                    entry.recorded_at.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
                    entry.identifier,
                    entry.action,
                    entry.outcome,
                    entry.tenant,
                    entry.user,
                    entry.plugin,
                    entry.context.as_deref().unwrap_or("-"),
                );
            }
        }
    }

    Ok(())
}
