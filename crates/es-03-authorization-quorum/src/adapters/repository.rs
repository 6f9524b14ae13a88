//! Proposal records over the shared `DurableStore` port.
//!
//! Live proposals are mirrored in a read-through cache; the store stays the
//! source of truth and terminal proposals are evicted from the cache.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use shared_types::{load_json, save_json, scan_json, DurableStore, StoreError};
use uuid::Uuid;

use crate::domain::MultiSigProposal;

const PROPOSAL_PREFIX: &str = "proposal:";

fn proposal_key(id: Uuid) -> String {
    format!("{}{}", PROPOSAL_PREFIX, id)
}

pub struct ProposalRepository {
    store: Arc<dyn DurableStore>,
    live: RwLock<HashMap<Uuid, MultiSigProposal>>,
    terminal_retention: Duration,
}

impl ProposalRepository {
    pub fn new(store: Arc<dyn DurableStore>, terminal_retention: Duration) -> Self {
        Self {
            store,
            live: RwLock::new(HashMap::new()),
            terminal_retention,
        }
    }

    /// Write through. Terminal proposals get the retention TTL.
    pub async fn save(&self, proposal: &MultiSigProposal) -> Result<(), StoreError> {
        let terminal = proposal.status.is_terminal();
        let ttl = terminal.then_some(self.terminal_retention);
        save_json(
            self.store.as_ref(),
            &proposal_key(proposal.id),
            proposal,
            ttl,
        )
        .await?;

        let mut live = self.live.write();
        if terminal {
            live.remove(&proposal.id);
        } else {
            live.insert(proposal.id, proposal.clone());
        }
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<MultiSigProposal>, StoreError> {
        if let Some(cached) = self.live.read().get(&id).cloned() {
            return Ok(Some(cached));
        }
        let loaded: Option<MultiSigProposal> =
            load_json(self.store.as_ref(), &proposal_key(id)).await?;
        if let Some(proposal) = loaded.as_ref().filter(|p| !p.status.is_terminal()) {
            self.live.write().insert(id, proposal.clone());
        }
        Ok(loaded)
    }

    /// Every stored proposal, oldest first.
    pub async fn all(&self) -> Result<Vec<MultiSigProposal>, StoreError> {
        let mut proposals: Vec<MultiSigProposal> =
            scan_json(self.store.as_ref(), PROPOSAL_PREFIX).await?;
        proposals.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(proposals)
    }

    /// Ids of cached non-terminal proposals.
    pub fn live_ids(&self) -> Vec<Uuid> {
        self.live.read().keys().copied().collect()
    }

    /// Reload the live cache from the store.
    pub async fn warm(&self) -> Result<usize, StoreError> {
        let live: HashMap<Uuid, MultiSigProposal> = self
            .all()
            .await?
            .into_iter()
            .filter(|p| !p.status.is_terminal())
            .map(|p| (p.id, p))
            .collect();
        let count = live.len();
        *self.live.write() = live;
        Ok(count)
    }
}
