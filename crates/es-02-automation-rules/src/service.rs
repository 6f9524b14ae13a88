//! Automation Rule Engine service
//!
//! Evaluation of a rule or scheduled payment runs under a per-id lock and
//! re-reads the record from the store, so `on_event` and `tick` racing on the
//! same rule observe each other's status change and the action fires once.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use shared_types::{
    retry_with_backoff, Address, Amount, Classified, DomainTransition, DurableStore, ErrorClass,
    GatewayError,
    Job, JobEventSink, JobId, JobStore, KeyedLocks, Milestone, MilestoneIndex, SettlementGateway,
    TimeSource, Timestamp, TransitionListener, TriggerType, TxHash,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::adapters::RuleRepository;
use crate::config::RuleEngineConfig;
use crate::domain::{
    ActionType, AutomationRule, Condition, ConditionContext, ExecutionRef, PaymentStatus,
    RuleEngineError, RuleEngineResult, RuleSpec, RuleStatus, ScheduleEntry, ScheduleIndex,
    ScheduledPayment,
};
use crate::metrics;
use crate::ports::{
    MultisigRequest, OracleVerifier, PaymentRequest, QuorumGateway, RuleEngineApi, RuleOutcome,
    TickReport,
};

/// Collaborators the rule engine is wired with.
pub struct RuleEnginePorts {
    pub store: Arc<dyn DurableStore>,
    pub jobs: Arc<dyn JobStore>,
    pub settlement: Arc<dyn SettlementGateway>,
    pub quorum: Arc<dyn QuorumGateway>,
    pub oracle: Arc<dyn OracleVerifier>,
    pub sink: Arc<dyn JobEventSink>,
    pub clock: Arc<dyn TimeSource>,
}

/// A release that passed pre-flight.
struct SettlementPlan {
    job_id: JobId,
    milestone: MilestoneIndex,
    recipient: Address,
    amount: Amount,
}

/// Automation Rule Engine.
pub struct RuleEngineService {
    config: RuleEngineConfig,
    repository: RuleRepository,
    jobs: Arc<dyn JobStore>,
    settlement: Arc<dyn SettlementGateway>,
    quorum: Arc<dyn QuorumGateway>,
    oracle: Arc<dyn OracleVerifier>,
    sink: Arc<dyn JobEventSink>,
    clock: Arc<dyn TimeSource>,
    schedule: RwLock<ScheduleIndex>,
    locks: KeyedLocks<Uuid>,
}

impl RuleEngineService {
    pub fn new(config: RuleEngineConfig, ports: RuleEnginePorts) -> Self {
        Self {
            config,
            repository: RuleRepository::new(ports.store),
            jobs: ports.jobs,
            settlement: ports.settlement,
            quorum: ports.quorum,
            oracle: ports.oracle,
            sink: ports.sink,
            clock: ports.clock,
            schedule: RwLock::new(ScheduleIndex::new()),
            locks: KeyedLocks::new(),
        }
    }

    pub fn config(&self) -> &RuleEngineConfig {
        &self.config
    }

    /// Number of entries waiting in the scheduler.
    pub fn scheduled_entries(&self) -> usize {
        self.schedule.read().len()
    }

    async fn require_job_milestone(
        &self,
        job_id: JobId,
        milestone: Option<MilestoneIndex>,
    ) -> RuleEngineResult<Job> {
        let job = self
            .jobs
            .get_job(job_id)
            .await?
            .ok_or(RuleEngineError::JobNotFound(job_id))?;
        if let Some(index) = milestone {
            if job.milestone(index).is_none() {
                return Err(RuleEngineError::MilestoneNotFound {
                    job_id,
                    milestone: index,
                });
            }
        }
        Ok(job)
    }

    /// Kinds of the conditions that do not hold.
    async fn unmet_conditions(
        &self,
        conditions: &[Condition],
        ctx: &ConditionContext<'_>,
    ) -> RuleEngineResult<Vec<&'static str>> {
        let mut unmet = Vec::new();
        for condition in conditions {
            let met = match condition.evaluate_local(ctx) {
                Some(met) => met,
                None => match condition {
                    Condition::MultisigQuorumReached => {
                        self.quorum.quorum_reached(ctx.job.id).await?
                    }
                    Condition::OracleVerified { source } => {
                        self.oracle
                            .verify(ctx.job.id, ctx.milestone.map(|m| m.index), source)
                            .await?
                    }
                    _ => false,
                },
            };
            if !met {
                unmet.push(condition.kind());
            }
        }
        Ok(unmet)
    }

    /// Checks that must hold before any money moves.
    async fn preflight(
        &self,
        job: &Job,
        milestone: &Milestone,
        amount: Option<Amount>,
        recipient: Option<Address>,
    ) -> RuleEngineResult<SettlementPlan> {
        if !job.accepts_settlement() {
            return Err(RuleEngineError::Precondition(format!(
                "job {} is {:?}",
                job.id, job.status
            )));
        }
        if !milestone.is_completed_unpaid() {
            return Err(RuleEngineError::Precondition(format!(
                "milestone {} is {:?}, not completed-but-unpaid",
                milestone.index, milestone.status
            )));
        }
        let remaining = milestone.remaining();
        if remaining == 0 {
            return Err(RuleEngineError::Precondition(format!(
                "milestone {} has nothing left to release",
                milestone.index
            )));
        }
        let amount = amount.unwrap_or(remaining);
        if amount > remaining {
            return Err(RuleEngineError::Precondition(format!(
                "amount {} exceeds unreleased milestone amount {}",
                amount, remaining
            )));
        }
        let recipient = recipient.or(job.freelancer).ok_or_else(|| {
            RuleEngineError::Precondition(format!("job {} has no freelancer", job.id))
        })?;

        let contract = self.config.contract_address;
        let funded = retry_with_backoff(
            &self.config.settlement_retry,
            "check_sufficient_balance",
            || self.settlement.check_sufficient_balance(contract, amount),
        )
        .await?;
        if !funded {
            return Err(RuleEngineError::Precondition(format!(
                "contract balance below {}",
                amount
            )));
        }

        Ok(SettlementPlan {
            job_id: job.id,
            milestone: milestone.index,
            recipient,
            amount,
        })
    }

    async fn release(&self, plan: &SettlementPlan) -> Result<TxHash, GatewayError> {
        retry_with_backoff(&self.config.settlement_retry, "release_funds", || {
            self.settlement
                .release_funds(plan.job_id, plan.recipient, plan.amount)
        })
        .await
    }

    /// Pre-flight and dispatch a rule's action. Mutates only `rule`.
    async fn execute_action(
        &self,
        rule: &mut AutomationRule,
        job: &Job,
        milestone: &Milestone,
    ) -> RuleOutcome {
        let plan = match self
            .preflight(job, milestone, rule.parameters.amount, rule.parameters.recipient)
            .await
        {
            Ok(plan) => plan,
            Err(err) => {
                metrics::record_preflight_failure();
                warn!(
                    rule_id = %rule.id,
                    job_id = rule.job_id,
                    class = ?err.class(),
                    "[es-02] Pre-flight failed, rule stays pending: {}",
                    err
                );
                rule.last_error = Some(err.to_string());
                return RuleOutcome::Deferred(err.to_string());
            }
        };

        let dispatched = match rule.action {
            ActionType::ReleasePayment => self
                .release(&plan)
                .await
                .map(|tx_hash| ExecutionRef::Settlement { tx_hash })
                .map_err(RuleEngineError::from),
            ActionType::RequestMultisig => {
                let request = MultisigRequest {
                    job_id: plan.job_id,
                    milestone: plan.milestone,
                    destination: plan.recipient,
                    amount: plan.amount,
                    proposer: rule.parameters.proposer.unwrap_or(job.client),
                    required_signatures: rule.parameters.required_signatures.unwrap_or(1),
                    ttl_secs: rule.parameters.ttl_secs,
                };
                retry_with_backoff(&self.config.settlement_retry, "request_release", || {
                    self.quorum.request_release(request.clone())
                })
                .await
                .map(|proposal_id| ExecutionRef::Proposal { proposal_id })
            }
        };

        match dispatched {
            Ok(execution) => {
                rule.status = RuleStatus::Executed;
                rule.execution = Some(execution);
                rule.last_error = None;
                metrics::record_rule_executed(action_name(rule.action));
                info!(
                    rule_id = %rule.id,
                    job_id = rule.job_id,
                    milestone = plan.milestone,
                    amount = %plan.amount,
                    "[es-02] Rule executed: {}",
                    action_name(rule.action)
                );
                self.sink.on_job_event(
                    rule.job_id,
                    "automation_rule_executed",
                    serde_json::json!({
                        "rule_id": rule.id,
                        "milestone": plan.milestone,
                        "action": rule.action,
                        "amount": plan.amount.to_string(),
                        "execution": execution,
                    }),
                );
                RuleOutcome::Executed(execution)
            }
            Err(err) if stays_pending(err.class()) => {
                warn!(
                    rule_id = %rule.id,
                    class = ?err.class(),
                    "[es-02] Dispatch failed, rule stays pending: {}",
                    err
                );
                rule.last_error = Some(err.to_string());
                RuleOutcome::Deferred(err.to_string())
            }
            Err(err) => {
                warn!(
                    rule_id = %rule.id,
                    class = ?err.class(),
                    "[es-02] Dispatch failed, rule moved to error: {}",
                    err
                );
                rule.status = RuleStatus::Error;
                rule.last_error = Some(err.to_string());
                self.sink.on_job_event(
                    rule.job_id,
                    "automation_rule_failed",
                    serde_json::json!({ "rule_id": rule.id, "error": err.to_string() }),
                );
                RuleOutcome::Failed(err.to_string())
            }
        }
    }

    /// Evaluate one rule under its lock.
    async fn evaluate_rule(
        &self,
        job_id: JobId,
        rule_id: Uuid,
        now: Timestamp,
    ) -> RuleEngineResult<RuleOutcome> {
        let _guard = self.locks.lock(&rule_id).await;
        let mut rule = self
            .repository
            .rule(job_id, rule_id)
            .await?
            .ok_or(RuleEngineError::RuleNotFound(rule_id))?;

        if !rule.is_armed() {
            return Ok(RuleOutcome::Skipped(if rule.is_active {
                format!("rule is {:?}", rule.status)
            } else {
                "rule is inactive".to_string()
            }));
        }
        if rule.due_at().is_some_and(|at| now < at) {
            return Ok(RuleOutcome::Skipped("not due".into()));
        }

        let job = self.jobs.get_job(job_id).await?;
        let (job, index) = match (job, rule.milestone) {
            (Some(job), Some(index)) => (job, index),
            (job, _) => {
                let reason = match job {
                    None => format!("job {} not found", job_id),
                    Some(_) => "rule has no milestone".to_string(),
                };
                warn!(rule_id = %rule_id, "[es-02] Skipping rule: {}", reason);
                rule.last_error = Some(reason.clone());
                self.repository.save_rule(&rule, None).await?;
                return Ok(RuleOutcome::Skipped(reason));
            }
        };
        let Some(milestone) = job.milestone(index) else {
            let reason = format!("milestone {} no longer exists on job {}", index, job_id);
            warn!(rule_id = %rule_id, "[es-02] Skipping rule: {}", reason);
            rule.last_error = Some(reason.clone());
            self.repository.save_rule(&rule, None).await?;
            return Ok(RuleOutcome::Skipped(reason));
        };

        rule.trigger_count += 1;
        rule.last_triggered = Some(now);

        let ctx = ConditionContext {
            job: &job,
            milestone: Some(milestone),
            created_at: rule.created_at,
            now,
        };
        let checked = self.unmet_conditions(&rule.conditions, &ctx).await;
        let outcome = match checked {
            Err(err) => {
                warn!(rule_id = %rule_id, "[es-02] Condition check failed: {}", err);
                rule.last_error = Some(err.to_string());
                RuleOutcome::Deferred(err.to_string())
            }
            Ok(unmet) if !unmet.is_empty() => {
                debug!(rule_id = %rule_id, ?unmet, "[es-02] Conditions not met");
                RuleOutcome::ConditionsUnmet(unmet)
            }
            Ok(_) => self.execute_action(&mut rule, &job, milestone).await,
        };

        self.repository.save_rule(&rule, None).await?;
        Ok(outcome)
    }

    /// Evaluate one scheduled payment under its lock.
    async fn execute_payment(
        &self,
        job_id: JobId,
        payment_id: Uuid,
        now: Timestamp,
    ) -> RuleEngineResult<RuleOutcome> {
        let _guard = self.locks.lock(&payment_id).await;
        let mut payment = self
            .repository
            .payment(job_id, payment_id)
            .await?
            .ok_or(RuleEngineError::PaymentNotFound(payment_id))?;

        if payment.status != PaymentStatus::Scheduled {
            return Ok(RuleOutcome::Skipped(format!(
                "payment is {:?}",
                payment.status
            )));
        }
        if !payment.is_due(now) {
            return Ok(RuleOutcome::Skipped("not due".into()));
        }

        let job = self.jobs.get_job(job_id).await?;
        let Some(job) = job else {
            let reason = format!("job {} not found", job_id);
            payment.last_error = Some(reason.clone());
            self.repository.save_payment(&payment).await?;
            return Ok(RuleOutcome::Skipped(reason));
        };
        let Some(milestone) = job.milestone(payment.milestone) else {
            let reason = format!(
                "milestone {} no longer exists on job {}",
                payment.milestone, job_id
            );
            warn!(payment_id = %payment_id, "[es-02] Skipping payment: {}", reason);
            payment.last_error = Some(reason.clone());
            self.repository.save_payment(&payment).await?;
            return Ok(RuleOutcome::Skipped(reason));
        };

        let ctx = ConditionContext {
            job: &job,
            milestone: Some(milestone),
            created_at: payment.created_at,
            now,
        };
        let unmet = match self.unmet_conditions(&payment.conditions, &ctx).await {
            Ok(unmet) => unmet,
            Err(err) => {
                payment.last_error = Some(err.to_string());
                self.repository.save_payment(&payment).await?;
                return Ok(RuleOutcome::Deferred(err.to_string()));
            }
        };
        if !unmet.is_empty() {
            return Ok(RuleOutcome::ConditionsUnmet(unmet));
        }

        let plan = match self
            .preflight(&job, milestone, payment.amount, payment.recipient)
            .await
        {
            Ok(plan) => plan,
            Err(err) => {
                metrics::record_preflight_failure();
                warn!(payment_id = %payment_id, "[es-02] Pre-flight failed, payment stays scheduled: {}", err);
                payment.last_error = Some(err.to_string());
                self.repository.save_payment(&payment).await?;
                return Ok(RuleOutcome::Deferred(err.to_string()));
            }
        };

        let outcome = match self.release(&plan).await {
            Ok(tx_hash) => {
                payment.status = PaymentStatus::Executed;
                payment.executed_at = Some(now);
                payment.execution_hash = Some(tx_hash);
                payment.last_error = None;
                metrics::record_payment_executed();
                info!(
                    payment_id = %payment_id,
                    job_id,
                    amount = %plan.amount,
                    "[es-02] Scheduled payment released"
                );
                self.sink.on_job_event(
                    job_id,
                    "scheduled_payment_executed",
                    serde_json::json!({
                        "payment_id": payment_id,
                        "milestone": plan.milestone,
                        "amount": plan.amount.to_string(),
                    }),
                );
                RuleOutcome::Executed(ExecutionRef::Settlement { tx_hash })
            }
            Err(err) => {
                // Settlement errors are transient or precondition failures, so
                // the payment stays scheduled for the next tick.
                warn!(payment_id = %payment_id, class = ?err.class(), "[es-02] Scheduled release failed: {}", err);
                payment.last_error = Some(err.to_string());
                RuleOutcome::Deferred(err.to_string())
            }
        };
        self.repository.save_payment(&payment).await?;
        Ok(outcome)
    }

    async fn lookup_rule(&self, rule_id: Uuid) -> RuleEngineResult<AutomationRule> {
        self.repository
            .find_rule(rule_id)
            .await?
            .ok_or(RuleEngineError::RuleNotFound(rule_id))
    }
}

fn action_name(action: ActionType) -> &'static str {
    match action {
        ActionType::ReleasePayment => "release_payment",
        ActionType::RequestMultisig => "request_multisig",
    }
}

/// Transient and precondition failures leave the rule armed.
fn stays_pending(class: ErrorClass) -> bool {
    class.is_retryable() || class == ErrorClass::DomainPrecondition
}

/// Outcomes after which a scheduled entry is dropped.
fn is_final(outcome: &RuleOutcome) -> bool {
    match outcome {
        RuleOutcome::Executed(_) | RuleOutcome::Failed(_) => true,
        RuleOutcome::Skipped(reason) => reason != "not due",
        RuleOutcome::ConditionsUnmet(_) | RuleOutcome::Deferred(_) => false,
    }
}

#[async_trait]
impl RuleEngineApi for RuleEngineService {
    async fn create_rule(&self, spec: RuleSpec) -> RuleEngineResult<AutomationRule> {
        spec.validate()?;
        self.require_job_milestone(spec.job_id, spec.milestone).await?;

        let rule = AutomationRule::from_spec(spec, self.clock.now());
        self.repository.save_rule(&rule, None).await?;
        if let Some(at) = rule.due_at() {
            self.schedule
                .write()
                .insert(at, ScheduleEntry::Rule(rule.job_id, rule.id));
        }
        info!(
            rule_id = %rule.id,
            job_id = rule.job_id,
            trigger = %rule.trigger.trigger_type,
            conditions = rule.conditions.len(),
            "[es-02] Rule created"
        );
        Ok(rule)
    }

    async fn create_rule_from_json(&self, json: &str) -> RuleEngineResult<AutomationRule> {
        self.create_rule(RuleSpec::from_json(json)?).await
    }

    async fn get_rule(&self, rule_id: Uuid) -> RuleEngineResult<AutomationRule> {
        self.lookup_rule(rule_id).await
    }

    async fn get_rule_status(&self, job_id: JobId) -> RuleEngineResult<Vec<AutomationRule>> {
        let mut rules = self.repository.rules_for_job(job_id).await?;
        rules.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(rules)
    }

    async fn deactivate_rule(&self, rule_id: Uuid) -> RuleEngineResult<AutomationRule> {
        let job_id = self.lookup_rule(rule_id).await?.job_id;
        let _guard = self.locks.lock(&rule_id).await;
        let mut rule = self
            .repository
            .rule(job_id, rule_id)
            .await?
            .ok_or(RuleEngineError::RuleNotFound(rule_id))?;
        rule.is_active = false;
        self.repository
            .save_rule(&rule, Some(self.config.rule_retention()))
            .await?;
        self.schedule
            .write()
            .remove(ScheduleEntry::Rule(job_id, rule_id));
        info!(rule_id = %rule_id, "[es-02] Rule deactivated");
        Ok(rule)
    }

    async fn reset_rule(&self, rule_id: Uuid) -> RuleEngineResult<AutomationRule> {
        let job_id = self.lookup_rule(rule_id).await?.job_id;
        let _guard = self.locks.lock(&rule_id).await;
        let mut rule = self
            .repository
            .rule(job_id, rule_id)
            .await?
            .ok_or(RuleEngineError::RuleNotFound(rule_id))?;
        rule.reset();
        self.repository.save_rule(&rule, None).await?;
        if let Some(at) = rule.due_at() {
            self.schedule
                .write()
                .insert(at, ScheduleEntry::Rule(job_id, rule_id));
        }
        info!(rule_id = %rule_id, "[es-02] Rule reset");
        Ok(rule)
    }

    async fn on_event(
        &self,
        job_id: JobId,
        milestone: Option<MilestoneIndex>,
        trigger: TriggerType,
    ) -> RuleEngineResult<Vec<(Uuid, RuleOutcome)>> {
        let now = self.clock.now();
        let mut rules: Vec<AutomationRule> = self
            .repository
            .rules_for_job(job_id)
            .await?
            .into_iter()
            .filter(|r| r.is_armed() && r.matches(job_id, milestone, trigger))
            .collect();
        rules.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_at.cmp(&b.created_at))
        });
        debug!(
            job_id,
            ?milestone,
            %trigger,
            candidates = rules.len(),
            "[es-02] Evaluating rules"
        );

        let mut outcomes = Vec::with_capacity(rules.len());
        for rule in rules {
            let outcome = self.evaluate_rule(job_id, rule.id, now).await?;
            if rule.due_at().is_some() && is_final(&outcome) {
                self.schedule
                    .write()
                    .remove(ScheduleEntry::Rule(job_id, rule.id));
            }
            outcomes.push((rule.id, outcome));
        }
        Ok(outcomes)
    }

    async fn tick(&self, now: Timestamp) -> RuleEngineResult<TickReport> {
        let due = self.schedule.read().due(now);
        let mut report = TickReport::default();

        for entry in due {
            let outcome = match entry {
                ScheduleEntry::Rule(job_id, id) => {
                    report.rules_evaluated += 1;
                    self.evaluate_rule(job_id, id, now).await
                }
                ScheduleEntry::Payment(job_id, id) => {
                    report.payments_evaluated += 1;
                    self.execute_payment(job_id, id, now).await
                }
            };
            let drop_entry = match &outcome {
                Ok(outcome) => {
                    if outcome.is_executed() {
                        match entry {
                            ScheduleEntry::Rule(..) => report.rules_executed += 1,
                            ScheduleEntry::Payment(..) => report.payments_executed += 1,
                        }
                    }
                    is_final(outcome)
                }
                Err(RuleEngineError::RuleNotFound(_) | RuleEngineError::PaymentNotFound(_)) => {
                    true
                }
                Err(err) => {
                    warn!(?entry, "[es-02] Scheduled evaluation failed: {}", err);
                    false
                }
            };
            if drop_entry {
                self.schedule.write().remove(entry);
            }
        }

        if report.rules_evaluated + report.payments_evaluated > 0 {
            debug!(
                rules = report.rules_evaluated,
                payments = report.payments_evaluated,
                "[es-02] Tick complete"
            );
        }
        Ok(report)
    }

    async fn schedule_payment(&self, request: PaymentRequest) -> RuleEngineResult<ScheduledPayment> {
        if request.amount == Some(0) {
            return Err(RuleEngineError::InvalidRule("amount must be > 0".into()));
        }
        self.require_job_milestone(request.job_id, Some(request.milestone))
            .await?;

        let mut payment = ScheduledPayment::new(
            request.job_id,
            request.milestone,
            request.release_date,
            request.conditions,
            self.clock.now(),
        );
        payment.amount = request.amount;
        payment.recipient = request.recipient;
        self.repository.save_payment(&payment).await?;
        self.schedule.write().insert(
            payment.release_date,
            ScheduleEntry::Payment(payment.job_id, payment.id),
        );
        info!(
            payment_id = %payment.id,
            job_id = payment.job_id,
            release_date = payment.release_date,
            "[es-02] Payment scheduled"
        );
        Ok(payment)
    }

    async fn cancel_scheduled_payment(
        &self,
        payment_id: Uuid,
    ) -> RuleEngineResult<ScheduledPayment> {
        let job_id = self
            .repository
            .find_payment(payment_id)
            .await?
            .ok_or(RuleEngineError::PaymentNotFound(payment_id))?
            .job_id;
        let _guard = self.locks.lock(&payment_id).await;
        let mut payment = self
            .repository
            .payment(job_id, payment_id)
            .await?
            .ok_or(RuleEngineError::PaymentNotFound(payment_id))?;
        if payment.status != PaymentStatus::Scheduled {
            return Err(RuleEngineError::NotCancellable(payment_id));
        }
        payment.status = PaymentStatus::Cancelled;
        self.repository.save_payment(&payment).await?;
        self.schedule
            .write()
            .remove(ScheduleEntry::Payment(job_id, payment_id));
        info!(payment_id = %payment_id, "[es-02] Scheduled payment cancelled");
        Ok(payment)
    }

    async fn scheduled_payments(&self, job_id: JobId) -> RuleEngineResult<Vec<ScheduledPayment>> {
        let mut payments = self.repository.payments_for_job(job_id).await?;
        payments.sort_by_key(|p| p.release_date);
        Ok(payments)
    }

    async fn load(&self) -> RuleEngineResult<usize> {
        let rules = self.repository.all_rules().await?;
        let payments = self.repository.all_payments().await?;

        let mut index = ScheduleIndex::new();
        for rule in rules.iter().filter(|r| r.is_armed()) {
            if let Some(at) = rule.due_at() {
                index.insert(at, ScheduleEntry::Rule(rule.job_id, rule.id));
            }
        }
        for payment in payments
            .iter()
            .filter(|p| p.status == PaymentStatus::Scheduled)
        {
            index.insert(
                payment.release_date,
                ScheduleEntry::Payment(payment.job_id, payment.id),
            );
        }
        let count = index.len();
        *self.schedule.write() = index;
        info!(
            rules = rules.len(),
            payments = payments.len(),
            scheduled = count,
            "[es-02] Rule engine loaded"
        );
        Ok(count)
    }
}

#[async_trait]
impl TransitionListener for RuleEngineService {
    async fn on_transition(&self, transition: DomainTransition) {
        match self
            .on_event(transition.job_id, transition.milestone, transition.trigger)
            .await
        {
            Ok(outcomes) => {
                let executed = outcomes.iter().filter(|(_, o)| o.is_executed()).count();
                if executed > 0 {
                    debug!(
                        job_id = transition.job_id,
                        executed, "[es-02] Transition fired rules"
                    );
                }
            }
            Err(err) => warn!(
                job_id = transition.job_id,
                "[es-02] Rule evaluation for transition failed: {}",
                err
            ),
        }
    }
}
