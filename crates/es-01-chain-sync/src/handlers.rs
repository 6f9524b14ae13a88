//! # Event Handlers
//!
//! Pure domain transitions applied to the job mirror, one per escrow event.
//! Dispatch is an exhaustive match over [`EscrowEvent`].
//!
//! Each job records the ids of the events folded into it, in the same write
//! as the mutation. An event re-dispatched after a crash between that write
//! and the processed mark is recognised and leaves the job untouched; its
//! notifications are sent again. Statuses never move backwards and released
//! amounts are capped at the milestone amount.

use std::sync::Arc;

use shared_types::{
    DomainTransition, Job, JobEventSink, JobId, JobStatus, JobStore, MilestoneIndex,
    MilestoneStatus, Timestamp, TransitionListener, TriggerType,
};
use tracing::debug;

use crate::domain::{ChainSyncError, ChainSyncResult, EscrowEvent};

/// Applies decoded events to the job store and fans out notifications.
pub struct EventHandlers {
    jobs: Arc<dyn JobStore>,
    listener: Arc<dyn TransitionListener>,
    sink: Arc<dyn JobEventSink>,
}

impl EventHandlers {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        listener: Arc<dyn TransitionListener>,
        sink: Arc<dyn JobEventSink>,
    ) -> Self {
        Self {
            jobs,
            listener,
            sink,
        }
    }

    /// Apply one event identified by `event_id`. Notifies the sink and then
    /// every listener.
    pub async fn apply(
        &self,
        event: &EscrowEvent,
        event_id: &str,
        at: Timestamp,
    ) -> ChainSyncResult<Vec<DomainTransition>> {
        let transitions = match event {
            EscrowEvent::JobCreated {
                job_id,
                client,
                milestone_amounts,
            } => {
                if self.jobs.get_job(*job_id).await?.is_none() {
                    let mut job = Job::new(*job_id, *client, milestone_amounts, at);
                    job.record_event(event_id);
                    self.jobs.save_job(job).await?;
                }
                Vec::new()
            }
            EscrowEvent::JobAccepted { job_id, freelancer } => {
                self.update_job(*job_id, event_id, at, |job| {
                    job.freelancer = Some(*freelancer);
                    if job.status == JobStatus::Open {
                        job.status = JobStatus::Active;
                    }
                    Ok(())
                })
                .await?;
                Vec::new()
            }
            EscrowEvent::MilestoneSubmitted { job_id, milestone } => {
                self.update_job(*job_id, event_id, at, |job| {
                    let m = milestone_of(job, *milestone)?;
                    if matches!(m.status, MilestoneStatus::Pending) {
                        m.status = MilestoneStatus::Submitted;
                    }
                    m.submitted_at.get_or_insert(at);
                    Ok(())
                })
                .await?;
                vec![transition(
                    *job_id,
                    Some(*milestone),
                    TriggerType::MilestoneCompletion,
                )]
            }
            EscrowEvent::MilestoneApproved { job_id, milestone } => {
                self.update_job(*job_id, event_id, at, |job| {
                    let m = milestone_of(job, *milestone)?;
                    if matches!(
                        m.status,
                        MilestoneStatus::Pending | MilestoneStatus::Submitted
                    ) {
                        m.status = MilestoneStatus::Approved;
                    }
                    m.submitted_at.get_or_insert(at);
                    m.approved_at.get_or_insert(at);
                    Ok(())
                })
                .await?;
                vec![
                    transition(*job_id, Some(*milestone), TriggerType::MilestoneCompletion),
                    transition(*job_id, Some(*milestone), TriggerType::ApprovalConsensus),
                ]
            }
            EscrowEvent::DisputeRaised {
                job_id, milestone, ..
            } => {
                self.update_job(*job_id, event_id, at, |job| {
                    if matches!(job.status, JobStatus::Open | JobStatus::Active) {
                        job.status = JobStatus::Disputed;
                    }
                    if let Some(index) = milestone {
                        let m = milestone_of(job, *index)?;
                        if m.status != MilestoneStatus::Released {
                            m.status = MilestoneStatus::Disputed;
                        }
                    }
                    Ok(())
                })
                .await?;
                Vec::new()
            }
            EscrowEvent::DisputeResolved {
                job_id,
                milestone,
                in_favor_of_freelancer,
            } => {
                self.update_job(*job_id, event_id, at, |job| {
                    if job.status == JobStatus::Disputed {
                        job.status = JobStatus::Active;
                    }
                    if let Some(index) = milestone {
                        let m = milestone_of(job, *index)?;
                        if m.status == MilestoneStatus::Disputed {
                            if *in_favor_of_freelancer {
                                m.status = MilestoneStatus::Approved;
                                m.approved_at.get_or_insert(at);
                            } else {
                                m.status = MilestoneStatus::Pending;
                            }
                        }
                    }
                    Ok(())
                })
                .await?;
                vec![transition(*job_id, *milestone, TriggerType::DisputeResolution)]
            }
            EscrowEvent::FundsReleased {
                job_id,
                milestone,
                amount,
                ..
            } => {
                self.update_job(*job_id, event_id, at, |job| {
                    let m = milestone_of(job, *milestone)?;
                    let before = m.released_amount;
                    m.released_amount = before.saturating_add(*amount).min(m.amount);
                    let delta = m.released_amount - before;
                    if m.released_amount >= m.amount {
                        m.status = MilestoneStatus::Released;
                    }
                    job.released_amount = job.released_amount.saturating_add(delta);
                    if job.is_fully_released() && job.status != JobStatus::Cancelled {
                        job.status = JobStatus::Completed;
                    }
                    Ok(())
                })
                .await?;
                Vec::new()
            }
            EscrowEvent::JobCancelled { job_id } => {
                self.update_job(*job_id, event_id, at, |job| {
                    if job.status != JobStatus::Completed {
                        job.status = JobStatus::Cancelled;
                    }
                    Ok(())
                })
                .await?;
                Vec::new()
            }
        };

        debug!(
            job_id = event.job_id(),
            transitions = transitions.len(),
            "[es-01] Applied {}",
            event.name()
        );

        self.sink
            .on_job_event(event.job_id(), event.notification_name(), event.args());
        for t in &transitions {
            self.listener.on_transition(*t).await;
        }
        Ok(transitions)
    }

    async fn update_job<F>(
        &self,
        job_id: JobId,
        event_id: &str,
        at: Timestamp,
        f: F,
    ) -> ChainSyncResult<()>
    where
        F: FnOnce(&mut Job) -> ChainSyncResult<()>,
    {
        let mut job = self
            .jobs
            .get_job(job_id)
            .await?
            .ok_or(ChainSyncError::JobNotFound(job_id))?;
        if job.has_applied(event_id) {
            debug!(job_id, event_id, "[es-01] Event already applied, job unchanged");
            return Ok(());
        }
        f(&mut job)?;
        job.record_event(event_id);
        job.updated_at = at;
        self.jobs.save_job(job).await?;
        Ok(())
    }
}

fn milestone_of(
    job: &mut Job,
    index: MilestoneIndex,
) -> ChainSyncResult<&mut shared_types::Milestone> {
    let job_id = job.id;
    job.milestone_mut(index)
        .ok_or(ChainSyncError::MilestoneNotFound {
            job_id,
            milestone: index,
        })
}

fn transition(
    job_id: JobId,
    milestone: Option<MilestoneIndex>,
    trigger: TriggerType,
) -> DomainTransition {
    DomainTransition {
        job_id,
        milestone,
        trigger,
    }
}
