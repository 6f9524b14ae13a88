//! Rule and scheduled-payment records over the shared `DurableStore` port.
//!
//! Keys carry the job id so per-job reads are a prefix scan:
//! `rule:{job:020}:{uuid}` and `payment:{job:020}:{uuid}`.

use std::sync::Arc;
use std::time::Duration;

use shared_types::{load_json, save_json, scan_json, DurableStore, JobId, StoreError};
use uuid::Uuid;

use crate::domain::{AutomationRule, ScheduledPayment};

const RULE_PREFIX: &str = "rule:";
const PAYMENT_PREFIX: &str = "payment:";

fn rule_key(job_id: JobId, id: Uuid) -> String {
    format!("{}{:020}:{}", RULE_PREFIX, job_id, id)
}

fn payment_key(job_id: JobId, id: Uuid) -> String {
    format!("{}{:020}:{}", PAYMENT_PREFIX, job_id, id)
}

pub struct RuleRepository {
    store: Arc<dyn DurableStore>,
}

impl RuleRepository {
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        Self { store }
    }

    /// Persist a rule. `ttl` is set for deactivated rules only.
    pub async fn save_rule(
        &self,
        rule: &AutomationRule,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        save_json(self.store.as_ref(), &rule_key(rule.job_id, rule.id), rule, ttl).await
    }

    pub async fn rule(&self, job_id: JobId, id: Uuid) -> Result<Option<AutomationRule>, StoreError> {
        load_json(self.store.as_ref(), &rule_key(job_id, id)).await
    }

    /// Lookup by id alone.
    pub async fn find_rule(&self, id: Uuid) -> Result<Option<AutomationRule>, StoreError> {
        Ok(self.all_rules().await?.into_iter().find(|r| r.id == id))
    }

    pub async fn rules_for_job(&self, job_id: JobId) -> Result<Vec<AutomationRule>, StoreError> {
        scan_json(
            self.store.as_ref(),
            &format!("{}{:020}:", RULE_PREFIX, job_id),
        )
        .await
    }

    pub async fn all_rules(&self) -> Result<Vec<AutomationRule>, StoreError> {
        scan_json(self.store.as_ref(), RULE_PREFIX).await
    }

    pub async fn save_payment(&self, payment: &ScheduledPayment) -> Result<(), StoreError> {
        save_json(
            self.store.as_ref(),
            &payment_key(payment.job_id, payment.id),
            payment,
            None,
        )
        .await
    }

    pub async fn payment(
        &self,
        job_id: JobId,
        id: Uuid,
    ) -> Result<Option<ScheduledPayment>, StoreError> {
        load_json(self.store.as_ref(), &payment_key(job_id, id)).await
    }

    pub async fn find_payment(&self, id: Uuid) -> Result<Option<ScheduledPayment>, StoreError> {
        Ok(self.all_payments().await?.into_iter().find(|p| p.id == id))
    }

    pub async fn payments_for_job(
        &self,
        job_id: JobId,
    ) -> Result<Vec<ScheduledPayment>, StoreError> {
        scan_json(
            self.store.as_ref(),
            &format!("{}{:020}:", PAYMENT_PREFIX, job_id),
        )
        .await
    }

    pub async fn all_payments(&self) -> Result<Vec<ScheduledPayment>, StoreError> {
        scan_json(self.store.as_ref(), PAYMENT_PREFIX).await
    }
}
