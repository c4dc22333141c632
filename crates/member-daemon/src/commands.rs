//! Command implementations for member-sync.
//!
//! Every command opens the RocksDB store and the tantivy index named by the
//! settings, wires them into the engine and runs one operation. `start` keeps
//! them open and runs the scheduled jobs until SIGINT/SIGTERM.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::signal;
use tracing::{info, warn};

use member_indexing::{
    CleanupReconciler, CleanupResult, MemberSyncOutcome, ResyncResult, StorageMemberStore,
    SyncConfig, SyncOrchestrator, TantivyIndexClient,
};
use member_scheduler::{
    create_cleanup_job, create_pending_drain_job, CleanupJobConfig, PendingDrainJobConfig,
    SchedulerConfig, SchedulerService, CLEANUP_JOB_NAME, PENDING_DRAIN_JOB_NAME,
};
use member_search::{MemberSearchIndex, SearchIndexConfig};
use member_storage::Storage;
use member_types::{AttributeDefinition, MemberSnapshot, Settings};

use crate::cli::Cli;

/// Load settings and apply CLI flags on top.
pub fn resolve_settings(cli: &Cli) -> Result<Settings> {
    let mut settings =
        Settings::load(cli.config.as_deref()).context("Failed to load configuration")?;

    if let Some(db_path) = &cli.db_path {
        settings.db_path = db_path.clone();
    }
    if let Some(index_path) = &cli.index_path {
        settings.index_path = index_path.clone();
    }
    if let Some(log_level) = &cli.log_level {
        settings.log_level = log_level.clone();
    }
    settings.validate().context("Invalid configuration")?;
    Ok(settings)
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init_logging(log_level: &str) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to set tracing subscriber: {}", e))
}

/// Open store and index, shared by all commands.
pub struct Engine {
    settings: Settings,
    storage: Arc<Storage>,
    store: Arc<StorageMemberStore>,
    client: Arc<TantivyIndexClient>,
    _index: MemberSearchIndex,
}

impl Engine {
    pub fn open(settings: Settings) -> Result<Self> {
        let db_path = settings.expanded_db_path();
        fs::create_dir_all(&db_path)
            .with_context(|| format!("Failed to create database directory {:?}", db_path))?;
        let storage = Arc::new(Storage::open(&db_path).context("Failed to open member store")?);

        let index_path = settings.expanded_index_path();
        let index = MemberSearchIndex::open_or_create(SearchIndexConfig::new(&index_path))
            .with_context(|| format!("Failed to open member index at {:?}", index_path))?;
        let client = Arc::new(
            TantivyIndexClient::open(&settings.index_name, &index)
                .context("Failed to open index writer")?,
        );

        info!(
            db_path = ?db_path,
            index_path = ?index_path,
            index_name = %settings.index_name,
            "Engine opened"
        );

        Ok(Self {
            store: Arc::new(StorageMemberStore::new(storage.clone())),
            storage,
            client,
            settings,
            _index: index,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    pub fn orchestrator(&self) -> SyncOrchestrator {
        SyncOrchestrator::new(
            self.store.clone(),
            self.client.clone(),
            SyncConfig::from_settings(&self.settings),
        )
    }

    pub fn reconciler(&self, page_size: Option<usize>) -> CleanupReconciler {
        CleanupReconciler::new(
            self.store.clone(),
            self.client.clone(),
            self.settings.index_name.clone(),
        )
        .with_page_size(page_size.unwrap_or(self.settings.cleanup.page_size))
    }
}

/// Contents of an import file.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportFixture {
    /// tenant id -> attribute definitions
    #[serde(default)]
    pub attribute_definitions: BTreeMap<String, Vec<AttributeDefinition>>,
    /// One entry per (member, segment)
    #[serde(default)]
    pub members: Vec<MemberSnapshot>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub definitions: usize,
    pub snapshots: usize,
}

pub fn read_fixture(path: &Path) -> Result<ImportFixture> {
    let raw = fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {:?}", path))
}

/// Write a fixture into the store. Every imported member is queued for sync.
pub fn import_fixture(storage: &Storage, fixture: &ImportFixture) -> Result<ImportSummary> {
    let mut summary = ImportSummary::default();
    for (tenant_id, definitions) in &fixture.attribute_definitions {
        for definition in definitions {
            storage
                .put_attribute_definition(tenant_id, definition)
                .with_context(|| format!("Failed to store attribute '{}'", definition.name))?;
            summary.definitions += 1;
        }
    }
    for snapshot in &fixture.members {
        storage
            .put_member_snapshot(snapshot)
            .with_context(|| format!("Failed to store member {}", snapshot.id))?;
        summary.snapshots += 1;
    }
    storage.flush().context("Failed to flush member store")?;
    Ok(summary)
}

pub fn handle_import(engine: &Engine, file: &Path) -> Result<()> {
    let fixture = read_fixture(file)?;
    let summary = import_fixture(engine.storage(), &fixture)?;
    println!(
        "Imported {} attribute definitions and {} member snapshots",
        summary.definitions, summary.snapshots
    );
    Ok(())
}

pub async fn handle_resync(
    engine: &Engine,
    tenant_id: &str,
    reset: bool,
    batch_size: Option<usize>,
) -> Result<ResyncResult> {
    let batch_size = batch_size.unwrap_or(engine.settings().sync.batch_size);
    let result = engine
        .orchestrator()
        .full_resync(tenant_id, reset, batch_size)
        .await
        .with_context(|| format!("Resync of tenant {} failed", tenant_id))?;

    println!(
        "Run {}: {} members in {} batches, {} documents indexed, {} missing ({} ms)",
        result.run_id,
        result.members_synced,
        result.batches,
        result.documents_indexed,
        result.missing.len(),
        result.elapsed_ms
    );
    Ok(result)
}

pub async fn handle_sync_member(engine: &Engine, member_id: &str) -> Result<MemberSyncOutcome> {
    let outcome = engine
        .orchestrator()
        .sync_member(member_id)
        .await
        .with_context(|| format!("Sync of member {} failed", member_id))?;

    match outcome {
        MemberSyncOutcome::Synced { attempts } => {
            println!("Member {} indexed after {} attempt(s)", member_id, attempts)
        }
        MemberSyncOutcome::Removed { attempts } => println!(
            "Member {} not found after {} attempt(s); document removed",
            member_id, attempts
        ),
    }
    Ok(outcome)
}

pub async fn handle_remove_member(engine: &Engine, member_id: &str) -> Result<()> {
    engine
        .orchestrator()
        .remove_member(member_id)
        .await
        .with_context(|| format!("Removal of member {} failed", member_id))?;
    println!("Removed document {}", member_id);
    Ok(())
}

pub async fn handle_cleanup(
    engine: &Engine,
    tenant_id: &str,
    page_size: Option<usize>,
) -> Result<CleanupResult> {
    let result = engine
        .reconciler(page_size)
        .cleanup(tenant_id)
        .await
        .with_context(|| format!("Cleanup of tenant {} failed", tenant_id))?;

    println!(
        "Scanned {} documents in {} pages, removed {} orphans ({} ms)",
        result.scanned,
        result.pages,
        result.removed.len(),
        result.elapsed_ms
    );
    for id in &result.removed {
        println!("  removed {}", id);
    }
    Ok(result)
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct TenantStatus {
    pub tenant_id: String,
    pub members: usize,
    pub pending: usize,
    pub indexed: usize,
}

#[derive(Debug, Default)]
pub struct StatusReport {
    pub snapshot_count: u64,
    pub member_count: u64,
    pub pending_count: u64,
    pub disk_usage_bytes: u64,
    pub indexed_documents: u64,
    pub tenants: Vec<TenantStatus>,
}

pub fn collect_status(engine: &Engine, tenants: &[String]) -> Result<StatusReport> {
    let stats = engine
        .storage()
        .get_stats()
        .context("Failed to read store statistics")?;
    let searcher = engine.client.searcher();

    let mut report = StatusReport {
        snapshot_count: stats.snapshot_count,
        member_count: stats.member_count,
        pending_count: stats.pending_count,
        disk_usage_bytes: stats.disk_usage_bytes,
        indexed_documents: searcher.num_docs(),
        tenants: Vec::with_capacity(tenants.len()),
    };

    for tenant_id in tenants {
        report.tenants.push(TenantStatus {
            tenant_id: tenant_id.clone(),
            members: engine.storage().get_tenant_member_ids(tenant_id)?.len(),
            pending: engine.storage().pending_count(tenant_id)?,
            indexed: searcher.count_tenant(tenant_id)?,
        });
    }
    Ok(report)
}

pub fn handle_status(engine: &Engine, tenants: &[String]) -> Result<()> {
    let tenants = if tenants.is_empty() {
        engine.settings().cleanup.tenants.clone()
    } else {
        tenants.to_vec()
    };
    let report = collect_status(engine, &tenants)?;

    println!("Member store:");
    println!("  snapshots:  {}", report.snapshot_count);
    println!("  members:    {}", report.member_count);
    println!("  pending:    {}", report.pending_count);
    println!("  disk bytes: {}", report.disk_usage_bytes);
    println!("Member index '{}':", engine.settings().index_name);
    println!("  documents:  {}", report.indexed_documents);
    for tenant in &report.tenants {
        println!(
            "  tenant {}: {} members, {} pending, {} indexed",
            tenant.tenant_id, tenant.members, tenant.pending, tenant.indexed
        );
    }
    Ok(())
}

/// Register the jobs enabled in `settings`, returning their names.
pub async fn register_jobs(
    scheduler: &SchedulerService,
    engine: &Engine,
    settings: &Settings,
) -> Result<Vec<&'static str>> {
    let mut registered = Vec::new();

    if settings.cleanup.enabled {
        create_cleanup_job(
            scheduler,
            Arc::new(engine.reconciler(None)),
            CleanupJobConfig::from_settings(&settings.cleanup),
        )
        .await
        .context("Failed to register cleanup job")?;
        registered.push(CLEANUP_JOB_NAME);
    }

    if settings.cleanup.pending_enabled {
        create_pending_drain_job(
            scheduler,
            Arc::new(engine.orchestrator()),
            PendingDrainJobConfig::from_settings(settings),
        )
        .await
        .context("Failed to register pending drain job")?;
        registered.push(PENDING_DRAIN_JOB_NAME);
    }

    Ok(registered)
}

/// Run cleanup and pending drains on their cron schedules until interrupted.
pub async fn run_daemon(engine: Engine) -> Result<()> {
    let settings = engine.settings().clone();
    if !settings.cleanup.enabled && !settings.cleanup.pending_enabled {
        warn!("All scheduled jobs disabled, nothing to run");
        return Ok(());
    }
    if settings.cleanup.tenants.is_empty() {
        anyhow::bail!("No tenants configured (set cleanup.tenants or MEMBER_SYNC_CLEANUP__TENANTS)");
    }

    let mut scheduler = SchedulerService::new(
        SchedulerConfig::default().with_timezone(settings.cleanup.timezone.clone()),
    )
    .await
    .context("Failed to create scheduler")?;

    let jobs = register_jobs(&scheduler, &engine, &settings).await?;

    scheduler.start().await.context("Failed to start scheduler")?;
    info!(tenants = ?settings.cleanup.tenants, jobs = ?jobs, "member-sync daemon running");

    wait_for_shutdown().await?;

    scheduler
        .shutdown()
        .await
        .context("Failed to stop scheduler")?;
    engine
        .storage()
        .flush()
        .context("Failed to flush member store")?;
    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("Failed to install SIGTERM handler")?;
        tokio::select! {
            result = signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl+C")?;
                info!("Received Ctrl+C, shutting down...");
            }
            _ = terminate.recv() => {
                info!("Received SIGTERM, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl+C")?;
        info!("Received Ctrl+C, shutting down...");
    }

    Ok(())
}
