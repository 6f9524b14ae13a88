//! Authorization Quorum Manager service
//!
//! Every mutation of a proposal runs under that proposal's lock and reloads
//! it first, so the signature that crosses the threshold is the only one
//! that observes "below threshold" and transitions the proposal.

use std::sync::Arc;

use async_trait::async_trait;
use shared_types::{
    format_address, format_hash, retry_with_backoff, Address, DurableStore, Hash, JobEventSink,
    JobId, KeyedLocks, SettlementGateway, TimeSource, Timestamp,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::adapters::ProposalRepository;
use crate::config::QuorumConfig;
use crate::domain::{
    verify_signer, MultiSigProposal, ProposalFilter, ProposalStatus, ProposalType, QuorumError,
    QuorumResult, Signature,
};
use crate::metrics;
use crate::ports::{ProposalRequest, QuorumApi};

/// Collaborators the quorum manager is wired with.
pub struct QuorumPorts {
    pub store: Arc<dyn DurableStore>,
    pub settlement: Arc<dyn SettlementGateway>,
    pub sink: Arc<dyn JobEventSink>,
    pub clock: Arc<dyn TimeSource>,
}

/// Authorization Quorum Manager.
pub struct QuorumService {
    config: QuorumConfig,
    repository: ProposalRepository,
    settlement: Arc<dyn SettlementGateway>,
    sink: Arc<dyn JobEventSink>,
    clock: Arc<dyn TimeSource>,
    locks: KeyedLocks<Uuid>,
}

impl QuorumService {
    pub fn new(config: QuorumConfig, ports: QuorumPorts) -> Self {
        if config.authorized_signers.is_empty() {
            warn!("[es-03] No authorized signer set configured; any recovered identity may sign");
        }
        Self {
            repository: ProposalRepository::new(ports.store, config.terminal_retention()),
            config,
            settlement: ports.settlement,
            sink: ports.sink,
            clock: ports.clock,
            locks: KeyedLocks::new(),
        }
    }

    pub fn config(&self) -> &QuorumConfig {
        &self.config
    }

    /// Warm the live-proposal cache from the store.
    pub async fn load(&self) -> QuorumResult<usize> {
        let live = self.repository.warm().await?;
        info!(live, "[es-03] Quorum manager loaded");
        Ok(live)
    }

    async fn require(&self, proposal_id: Uuid) -> QuorumResult<MultiSigProposal> {
        self.repository
            .get(proposal_id)
            .await?
            .ok_or(QuorumError::ProposalNotFound(proposal_id))
    }

    fn require_authorized(&self, address: &Address) -> QuorumResult<()> {
        if self.config.is_authorized(address) {
            Ok(())
        } else {
            Err(QuorumError::UnauthorizedSigner(*address))
        }
    }

    fn notify(&self, proposal: &MultiSigProposal, name: &str) {
        self.sink.on_job_event(
            proposal.job_id,
            name,
            serde_json::json!({
                "proposal_id": proposal.id,
                "proposal_type": proposal.proposal_type,
                "status": proposal.status,
                "amount": proposal.amount.to_string(),
                "destination": format_address(&proposal.destination),
                "signatures": proposal.signatures.len(),
                "required_signatures": proposal.required_signatures,
            }),
        );
    }

    /// Persist an expiry observed outside the sweep.
    async fn expire_now(
        &self,
        proposal: &mut MultiSigProposal,
        now: Timestamp,
    ) -> QuorumResult<()> {
        if proposal.expire(now) {
            self.repository.save(proposal).await?;
            metrics::record_finalized("expired");
            info!(proposal_id = %proposal.id, "[es-03] Proposal expired");
            self.notify(proposal, "proposal_expired");
        }
        Ok(())
    }

    /// Checks and append for one signature. Returns whether it crossed the
    /// threshold.
    async fn accept_signature(
        &self,
        proposal: &mut MultiSigProposal,
        signer: Address,
        signature: &Signature,
        now: Timestamp,
    ) -> QuorumResult<bool> {
        if proposal.status == ProposalStatus::Pending && proposal.is_expired(now) {
            self.expire_now(proposal, now).await?;
            return Err(QuorumError::Expired(proposal.id));
        }
        if proposal.status != ProposalStatus::Pending {
            return Err(QuorumError::NotPending {
                id: proposal.id,
                status: proposal.status,
            });
        }
        self.require_authorized(&signer)?;
        verify_signer(&proposal.digest(), signature, signer)?;
        proposal.add_signature(signer, now)
    }

    fn validate_request(&self, request: &ProposalRequest) -> QuorumResult<u64> {
        if request.required_signatures == 0 {
            return Err(QuorumError::InvalidProposal(
                "required_signatures must be > 0".into(),
            ));
        }
        if request.amount == 0 {
            return Err(QuorumError::InvalidProposal("amount must be > 0".into()));
        }
        if request.destination == [0u8; 20] {
            return Err(QuorumError::InvalidProposal(
                "destination must not be the zero address".into(),
            ));
        }
        let ttl = request.ttl_secs.unwrap_or(self.config.default_ttl_secs);
        if ttl == 0 || ttl > self.config.max_ttl_secs {
            return Err(QuorumError::InvalidProposal(format!(
                "ttl {}s outside (0, {}]",
                ttl, self.config.max_ttl_secs
            )));
        }
        self.require_authorized(&request.proposer)?;
        let owners = self.config.authorized_signers.len();
        if owners > 0 && request.required_signatures as usize > owners {
            return Err(QuorumError::InvalidProposal(format!(
                "{} signatures required but only {} owners authorized",
                request.required_signatures, owners
            )));
        }
        Ok(ttl)
    }
}

fn settlement_operation(proposal_type: ProposalType) -> &'static str {
    match proposal_type {
        ProposalType::ReleasePayment => "release_payment",
        ProposalType::Refund => "refund",
        ProposalType::DisputeSettlement => "dispute_settlement",
        ProposalType::EmergencyWithdrawal => "emergency_withdrawal",
    }
}

fn rejection_reason(err: &QuorumError) -> &'static str {
    match err {
        QuorumError::NotPending { .. } => "not_pending",
        QuorumError::Expired(_) => "expired",
        QuorumError::AlreadySigned { .. } => "duplicate",
        QuorumError::UnauthorizedSigner(_) => "unauthorized",
        QuorumError::InvalidSignature(_) => "invalid_signature",
        _ => "other",
    }
}

#[async_trait]
impl QuorumApi for QuorumService {
    async fn propose(&self, request: ProposalRequest) -> QuorumResult<MultiSigProposal> {
        let ttl = self.validate_request(&request)?;
        let proposal = MultiSigProposal::new(
            request.job_id,
            request.proposal_type,
            request.destination,
            request.amount,
            request.data,
            request.proposer,
            request.required_signatures,
            self.clock.now(),
            ttl,
        );
        self.repository.save(&proposal).await?;

        metrics::record_proposal_created();
        info!(
            proposal_id = %proposal.id,
            job_id = proposal.job_id,
            proposal_type = settlement_operation(proposal.proposal_type),
            amount = %proposal.amount,
            required = proposal.required_signatures,
            expires_at = proposal.expires_at,
            "[es-03] Proposal created"
        );
        self.notify(&proposal, "proposal_created");
        if proposal.status == ProposalStatus::ReadyForExecution {
            self.notify(&proposal, "proposal_ready");
        }
        Ok(proposal)
    }

    async fn sign(
        &self,
        proposal_id: Uuid,
        signer: Address,
        signature: Signature,
    ) -> QuorumResult<MultiSigProposal> {
        let _guard = self.locks.lock(&proposal_id).await;
        let now = self.clock.now();
        let mut proposal = self.require(proposal_id).await?;

        let checked = self
            .accept_signature(&mut proposal, signer, &signature, now)
            .await;

        let crossed = match checked {
            Ok(crossed) => crossed,
            Err(err) => {
                metrics::record_signature_rejected(rejection_reason(&err));
                warn!(
                    proposal_id = %proposal_id,
                    signer = %format_address(&signer),
                    "[es-03] Signature rejected: {}",
                    err
                );
                return Err(err);
            }
        };

        self.repository.save(&proposal).await?;
        metrics::record_signature_accepted();
        debug!(
            proposal_id = %proposal_id,
            signer = %format_address(&signer),
            signatures = proposal.signatures.len(),
            required = proposal.required_signatures,
            "[es-03] Signature accepted"
        );
        self.notify(&proposal, "proposal_signed");
        if crossed {
            info!(proposal_id = %proposal_id, "[es-03] Quorum reached, proposal ready for execution");
            self.notify(&proposal, "proposal_ready");
        }
        Ok(proposal)
    }

    async fn execute(
        &self,
        proposal_id: Uuid,
        executor: Address,
    ) -> QuorumResult<MultiSigProposal> {
        let _guard = self.locks.lock(&proposal_id).await;
        let now = self.clock.now();
        let mut proposal = self.require(proposal_id).await?;

        if proposal.status != ProposalStatus::ReadyForExecution {
            return Err(QuorumError::NotReady {
                id: proposal_id,
                status: proposal.status,
            });
        }
        if !proposal.is_executable(now) {
            self.expire_now(&mut proposal, now).await?;
            return Err(QuorumError::Expired(proposal_id));
        }
        let owner = !self.config.authorized_signers.is_empty()
            && self.config.authorized_signers.contains(&executor);
        if !proposal.has_signed(&executor) && !owner {
            return Err(QuorumError::NotExecutor {
                id: proposal_id,
                executor,
            });
        }

        let operation = settlement_operation(proposal.proposal_type);
        let (job_id, destination, amount) =
            (proposal.job_id, proposal.destination, proposal.amount);
        let dispatched = retry_with_backoff(&self.config.settlement_retry, operation, || {
            self.settlement.release_funds(job_id, destination, amount)
        })
        .await;

        match dispatched {
            Ok(tx_hash) => {
                proposal.mark_executed(tx_hash, executor);
                self.repository.save(&proposal).await?;
                metrics::record_finalized("executed");
                info!(
                    proposal_id = %proposal_id,
                    job_id,
                    operation,
                    tx_hash = %format_hash(&tx_hash),
                    "[es-03] Proposal executed"
                );
                self.notify(&proposal, "proposal_executed");
                Ok(proposal)
            }
            Err(err) => {
                proposal.record_failure(err.to_string());
                self.repository.save(&proposal).await?;
                warn!(
                    proposal_id = %proposal_id,
                    operation,
                    "[es-03] Execution failed, proposal stays ready: {}",
                    err
                );
                Err(err.into())
            }
        }
    }

    async fn cancel(
        &self,
        proposal_id: Uuid,
        canceler: Address,
    ) -> QuorumResult<MultiSigProposal> {
        let _guard = self.locks.lock(&proposal_id).await;
        let mut proposal = self.require(proposal_id).await?;
        proposal.cancel(canceler)?;
        self.repository.save(&proposal).await?;

        metrics::record_finalized("cancelled");
        info!(proposal_id = %proposal_id, "[es-03] Proposal cancelled");
        self.notify(&proposal, "proposal_cancelled");
        Ok(proposal)
    }

    async fn sweep_expired(&self, now: Timestamp) -> QuorumResult<usize> {
        let stale: Vec<Uuid> = self
            .repository
            .all()
            .await?
            .into_iter()
            .filter(|p| !p.status.is_terminal() && p.is_expired(now))
            .map(|p| p.id)
            .collect();

        let mut expired = 0;
        for id in stale {
            let _guard = self.locks.lock(&id).await;
            let Some(mut proposal) = self.repository.get(id).await? else {
                continue;
            };
            if proposal.expire(now) {
                self.repository.save(&proposal).await?;
                metrics::record_finalized("expired");
                self.notify(&proposal, "proposal_expired");
                expired += 1;
            }
        }
        if expired > 0 {
            info!(expired, "[es-03] Expiry sweep complete");
        }
        Ok(expired)
    }

    async fn get_proposal(&self, proposal_id: Uuid) -> QuorumResult<MultiSigProposal> {
        self.require(proposal_id).await
    }

    async fn list_proposals(&self, filter: ProposalFilter) -> QuorumResult<Vec<MultiSigProposal>> {
        Ok(self
            .repository
            .all()
            .await?
            .into_iter()
            .filter(|p| filter.matches(p))
            .collect())
    }

    async fn quorum_reached(&self, job_id: JobId) -> QuorumResult<bool> {
        let now = self.clock.now();
        Ok(self.repository.all().await?.iter().any(|p| {
            p.job_id == job_id
                && (p.is_executable(now) || p.status == ProposalStatus::Executed)
        }))
    }

    async fn digest(&self, proposal_id: Uuid) -> QuorumResult<Hash> {
        Ok(self.require(proposal_id).await?.digest())
    }
}
