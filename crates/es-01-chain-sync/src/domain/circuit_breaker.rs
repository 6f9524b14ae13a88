//! Circuit breaker for the synchronization loop
//!
//! Prevents endless retry loops against a failing provider. After
//! `max_attempts` consecutive failed sync attempts the synchronizer halts and
//! stays halted until an operator restarts it.

use serde::{Deserialize, Serialize};

/// Synchronizer state
///
/// State Machine:
/// ```text
/// [RUNNING] ──sync failed──→ [RETRYING {attempt: 1}]
///     ↑                                │
///     │                                ├── sync committed ──→ [RUNNING]
///     │                                │
///     │                                └── sync failed ──→ [RETRYING {attempt: n+1}]
///     │                                                          │
///     │                                                          ↓
///     │                                           attempt >= max? ──→ [HALTED]
///     │                                                                  │
///     └──────────────────── operator restart ────────────────────────────┘
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// Normal operation
    #[default]
    Running,
    /// Retrying after a failed batch
    Retrying { attempt: u8 },
    /// Retries exhausted or fatal error - requires operator restart
    Halted,
}

/// Events that drive the breaker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncEvent {
    /// Every batch up to head committed
    SyncCommitted,
    /// A sync attempt failed with a retryable error
    SyncFailed,
    /// Non-retryable failure
    FatalError,
    /// Operator restart
    ManualRestart,
}

/// Deterministic circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    state: SyncState,
    max_attempts: u8,
    consecutive_failures: u64,
    restart_count: u64,
}

impl CircuitBreaker {
    pub fn new(max_attempts: u8) -> Self {
        Self {
            state: SyncState::Running,
            max_attempts: max_attempts.max(1),
            consecutive_failures: 0,
            restart_count: 0,
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn is_halted(&self) -> bool {
        matches!(self.state, SyncState::Halted)
    }

    /// Apply an event and return the new state.
    pub fn process_event(&mut self, event: SyncEvent) -> SyncState {
        let new_state = self.next_state(event);

        match event {
            SyncEvent::SyncFailed | SyncEvent::FatalError => self.consecutive_failures += 1,
            SyncEvent::SyncCommitted => {
                if !self.is_halted() {
                    self.consecutive_failures = 0;
                }
            }
            SyncEvent::ManualRestart => {
                self.restart_count += 1;
                self.consecutive_failures = 0;
            }
        }

        self.state = new_state;
        new_state
    }

    fn next_state(&self, event: SyncEvent) -> SyncState {
        match (self.state, event) {
            (SyncState::Halted, SyncEvent::ManualRestart) => SyncState::Running,
            (SyncState::Halted, _) => SyncState::Halted,
            (_, SyncEvent::FatalError) => SyncState::Halted,
            (_, SyncEvent::SyncCommitted) => SyncState::Running,
            (SyncState::Running, SyncEvent::SyncFailed) => SyncState::Retrying { attempt: 1 },
            (SyncState::Retrying { attempt }, SyncEvent::SyncFailed) => {
                if attempt >= self.max_attempts {
                    SyncState::Halted
                } else {
                    SyncState::Retrying {
                        attempt: attempt + 1,
                    }
                }
            }
            (state, SyncEvent::ManualRestart) => state,
        }
    }

    pub fn consecutive_failures(&self) -> u64 {
        self.consecutive_failures
    }

    pub fn restart_count(&self) -> u64 {
        self.restart_count
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_to_retrying() {
        let mut cb = CircuitBreaker::new(3);
        assert_eq!(cb.state(), SyncState::Running);
        cb.process_event(SyncEvent::SyncFailed);
        assert_eq!(cb.state(), SyncState::Retrying { attempt: 1 });
    }

    #[test]
    fn test_retrying_recovers_on_commit() {
        let mut cb = CircuitBreaker::new(3);
        cb.process_event(SyncEvent::SyncFailed);
        cb.process_event(SyncEvent::SyncCommitted);
        assert_eq!(cb.state(), SyncState::Running);
        assert_eq!(cb.consecutive_failures(), 0);
    }

    #[test]
    fn test_exhaustion_halts() {
        let mut cb = CircuitBreaker::new(3);
        cb.process_event(SyncEvent::SyncFailed);
        cb.process_event(SyncEvent::SyncFailed);
        cb.process_event(SyncEvent::SyncFailed);
        assert_eq!(cb.state(), SyncState::Retrying { attempt: 3 });
        cb.process_event(SyncEvent::SyncFailed);
        assert!(cb.is_halted());
        assert_eq!(cb.consecutive_failures(), 4);
    }

    #[test]
    fn test_fatal_error_halts_immediately() {
        let mut cb = CircuitBreaker::new(3);
        cb.process_event(SyncEvent::FatalError);
        assert!(cb.is_halted());
    }

    #[test]
    fn test_halted_only_leaves_on_restart() {
        let mut cb = CircuitBreaker::new(1);
        cb.process_event(SyncEvent::SyncFailed);
        cb.process_event(SyncEvent::SyncFailed);
        assert!(cb.is_halted());

        cb.process_event(SyncEvent::SyncCommitted);
        assert!(cb.is_halted());

        cb.process_event(SyncEvent::ManualRestart);
        assert_eq!(cb.state(), SyncState::Running);
        assert_eq!(cb.restart_count(), 1);
    }
}
