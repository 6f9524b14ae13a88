//! # Settlement Runtime
//!
//! Owns the three subsystems and the one periodic scheduler.
//!
//! ## Wiring
//!
//! ```text
//! ChainSyncService ──DomainTransition──→ RuleEngineService ──request_multisig──→ QuorumService
//!        │                                     │                                      │
//!        └──────────── JobStore ───────────────┤                                      │
//!                                              └──────── SettlementGateway ───────────┘
//! ```
//!
//! ## Startup Sequence
//!
//! 1. Warm the quorum manager's proposal cache
//! 2. Rebuild the rule schedule index
//! 3. Initialize the synchronizer (network, contract, cursor)
//! 4. Backfill and enter live mode
//! 5. Spawn the scheduler (rule tick and expiry sweep)
//!
//! The rule engine is loaded before the synchronizer starts so no transition
//! produced by the backfill reaches an empty engine.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use es_01_chain_sync::{ChainLogSource, ChainSyncApi, ChainSyncPorts, ChainSyncService, SyncStatus};
use es_02_automation_rules::{
    AutomationRule, OracleVerifier, RuleEngineApi, RuleEnginePorts, RuleEngineResult,
    RuleEngineService, TickReport,
};
use es_03_authorization_quorum::{
    MultiSigProposal, ProposalFilter, QuorumApi, QuorumPorts, QuorumResult, QuorumService,
};
use parking_lot::Mutex;
use shared_types::{DurableStore, JobEventSink, JobId, JobStore, SettlementGateway, TimeSource};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::adapters::QuorumGatewayAdapter;
use crate::config::{ConfigError, SettlementConfig};

/// External collaborators of the runtime.
pub struct RuntimePorts {
    pub source: Arc<dyn ChainLogSource>,
    /// Source of truth for cursor, audit trail, rules and proposals.
    pub durable: Arc<dyn DurableStore>,
    /// Fast cursor mirror.
    pub cache: Arc<dyn DurableStore>,
    pub jobs: Arc<dyn JobStore>,
    pub settlement: Arc<dyn SettlementGateway>,
    pub oracle: Arc<dyn OracleVerifier>,
    pub sink: Arc<dyn JobEventSink>,
    pub clock: Arc<dyn TimeSource>,
}

/// Snapshot returned by [`SettlementRuntime::status`].
#[derive(Clone, Debug)]
pub struct RuntimeStatus {
    pub sync: SyncStatus,
    pub scheduler_running: bool,
    /// Time-based rules and scheduled payments waiting in the index.
    pub scheduled_entries: usize,
}

/// The composed settlement core.
pub struct SettlementRuntime {
    config: SettlementConfig,
    sync: ChainSyncService,
    rules: Arc<RuleEngineService>,
    quorum: Arc<QuorumService>,
    clock: Arc<dyn TimeSource>,
    shutdown_tx: watch::Sender<bool>,
    scheduler: Mutex<Option<JoinHandle<()>>>,
}

impl SettlementRuntime {
    /// Validate the configuration and wire the subsystems. Nothing runs until
    /// [`start`](Self::start).
    pub fn new(config: SettlementConfig, ports: RuntimePorts) -> Result<Self, ConfigError> {
        config.validate()?;

        let quorum = Arc::new(QuorumService::new(
            config.quorum.clone(),
            QuorumPorts {
                store: Arc::clone(&ports.durable),
                settlement: Arc::clone(&ports.settlement),
                sink: Arc::clone(&ports.sink),
                clock: Arc::clone(&ports.clock),
            },
        ));

        let rules = Arc::new(RuleEngineService::new(
            config.rules.clone(),
            RuleEnginePorts {
                store: Arc::clone(&ports.durable),
                jobs: Arc::clone(&ports.jobs),
                settlement: Arc::clone(&ports.settlement),
                quorum: Arc::new(QuorumGatewayAdapter::new(Arc::clone(&quorum))),
                oracle: ports.oracle,
                sink: Arc::clone(&ports.sink),
                clock: Arc::clone(&ports.clock),
            },
        ));

        let sync = ChainSyncService::new(
            config.chain_sync.clone(),
            ChainSyncPorts {
                source: ports.source,
                durable: ports.durable,
                cache: ports.cache,
                jobs: ports.jobs,
                listener: rules.clone(),
                sink: ports.sink,
                clock: Arc::clone(&ports.clock),
            },
        );

        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            config,
            sync,
            rules,
            quorum,
            clock: ports.clock,
            shutdown_tx,
            scheduler: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    pub fn sync(&self) -> &ChainSyncService {
        &self.sync
    }

    pub fn rules(&self) -> &RuleEngineService {
        &self.rules
    }

    pub fn quorum(&self) -> &QuorumService {
        &self.quorum
    }

    pub async fn start(&self) -> Result<()> {
        info!("===========================================");
        info!("  Escrow Settlement Runtime");
        info!("===========================================");

        let proposals = self
            .quorum
            .load()
            .await
            .context("failed to load proposals")?;
        let scheduled = self
            .rules
            .load()
            .await
            .context("failed to rebuild the rule schedule")?;

        self.sync
            .initialize()
            .await
            .context("chain synchronizer failed to initialize")?;
        self.sync
            .start()
            .await
            .context("chain synchronizer failed to start")?;

        self.start_scheduler();

        info!(
            live_proposals = proposals,
            scheduled_entries = scheduled,
            "Settlement runtime started"
        );
        Ok(())
    }

    /// Stop the scheduler, then the synchronizer. Committed state stays in
    /// the durable store.
    pub async fn shutdown(&self) {
        info!("Shutting down settlement runtime");
        self.shutdown_tx.send_replace(true);
        let handle = self.scheduler.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Scheduler ended abnormally: {}", e);
            }
        }
        self.sync.stop().await;
        info!("Settlement runtime stopped");
    }

    /// One scheduler pass, outside the periodic loop.
    pub async fn run_scheduled_pass(&self) -> (Option<TickReport>, Option<usize>) {
        let report = run_rule_tick(&self.rules, self.clock.as_ref()).await;
        let expired = run_expiry_sweep(&self.quorum, self.clock.as_ref()).await;
        (report, expired)
    }

    // Read APIs for the API layer.

    pub async fn sync_status(&self) -> SyncStatus {
        self.sync.get_status().await
    }

    pub async fn rule_status(&self, job_id: JobId) -> RuleEngineResult<Vec<AutomationRule>> {
        self.rules.get_rule_status(job_id).await
    }

    pub async fn proposal(&self, proposal_id: Uuid) -> QuorumResult<MultiSigProposal> {
        self.quorum.get_proposal(proposal_id).await
    }

    pub async fn list_proposals(
        &self,
        filter: ProposalFilter,
    ) -> QuorumResult<Vec<MultiSigProposal>> {
        self.quorum.list_proposals(filter).await
    }

    pub async fn status(&self) -> RuntimeStatus {
        RuntimeStatus {
            sync: self.sync.get_status().await,
            scheduler_running: self
                .scheduler
                .lock()
                .as_ref()
                .is_some_and(|handle| !handle.is_finished()),
            scheduled_entries: self.rules.scheduled_entries(),
        }
    }

    fn start_scheduler(&self) {
        let mut slot = self.scheduler.lock();
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        self.shutdown_tx.send_replace(false);
        let handle = tokio::spawn(run_scheduler(
            Arc::clone(&self.rules),
            Arc::clone(&self.quorum),
            Arc::clone(&self.clock),
            self.config.rules.tick_interval(),
            self.config.quorum.sweep_interval(),
            self.shutdown_tx.subscribe(),
        ));
        *slot = Some(handle);
    }
}

/// Single periodic task for both time-driven duties.
async fn run_scheduler(
    rules: Arc<RuleEngineService>,
    quorum: Arc<QuorumService>,
    clock: Arc<dyn TimeSource>,
    tick_every: Duration,
    sweep_every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut tick = tokio::time::interval(tick_every);
    let mut sweep = tokio::time::interval(sweep_every);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(
        tick_ms = tick_every.as_millis() as u64,
        sweep_ms = sweep_every.as_millis() as u64,
        "Scheduler started"
    );

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = tick.tick() => {
                run_rule_tick(&rules, clock.as_ref()).await;
            }
            _ = sweep.tick() => {
                run_expiry_sweep(&quorum, clock.as_ref()).await;
            }
        }
    }
    info!("Scheduler stopped");
}

async fn run_rule_tick(rules: &RuleEngineService, clock: &dyn TimeSource) -> Option<TickReport> {
    match rules.tick(clock.now()).await {
        Ok(report) => {
            if report.rules_executed + report.payments_executed > 0 {
                info!(
                    rules_executed = report.rules_executed,
                    payments_executed = report.payments_executed,
                    "Scheduled settlements dispatched"
                );
            } else {
                debug!(
                    rules_evaluated = report.rules_evaluated,
                    payments_evaluated = report.payments_evaluated,
                    "Rule tick"
                );
            }
            Some(report)
        }
        Err(e) => {
            warn!("Rule tick failed: {}", e);
            None
        }
    }
}

async fn run_expiry_sweep(quorum: &QuorumService, clock: &dyn TimeSource) -> Option<usize> {
    match quorum.sweep_expired(clock.now()).await {
        Ok(expired) => {
            if expired > 0 {
                info!(expired, "Expired proposals swept");
            }
            Some(expired)
        }
        Err(e) => {
            warn!("Expiry sweep failed: {}", e);
            None
        }
    }
}
