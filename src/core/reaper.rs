use std::sync::Arc;
use std::time::Duration;

use crate::api::config::SwimConfig;
use crate::pb::NodeState;

use super::state::StateMachine;
use super::utils::now_millis;

/// How long a member may stay `Suspect`: `multiplier * ceil(log10(n + 1))` ping intervals.
///
/// Grows with the cluster size `n` so the false positive rate stays bounded.
pub fn suspicion_timeout(n: usize, multiplier: u32, ping_interval: Duration) -> Duration {
    let scale = ((n as f64) + 1.0).log10().ceil().max(1.0) as u32;
    ping_interval * multiplier * scale
}

/// Promotes long suspected members to `Dead` and evicts long departed ones.
#[derive(Debug)]
pub(crate) struct SuspicionReaper {
    addr: String,
    config: Arc<SwimConfig>,
    state: Arc<StateMachine>,
}

impl SuspicionReaper {
    pub(crate) fn new(addr: impl Into<String>, config: Arc<SwimConfig>, state: Arc<StateMachine>) -> Self {
        Self {
            addr: addr.into(),
            config,
            state,
        }
    }

    pub(crate) fn suspicion_timeout(&self) -> Duration {
        suspicion_timeout(
            self.state.membership_list().len(),
            self.config.suspicion_multiplier(),
            self.config.ping_interval(),
        )
    }

    pub(crate) fn tick(&self) {
        self.reap(now_millis());
    }

    /// Runs one pass against the wall clock `now`. Returns the number of transitions.
    pub(crate) fn reap(&self, now: u64) -> usize {
        let suspicion_timeout = self.suspicion_timeout().as_millis() as u64;
        let leave_timeout = suspicion_timeout * self.config.leave_timeout_multiplier() as u64;

        let mut changed = 0;
        for record in self.state.membership_list().snapshot() {
            let elapsed = now.saturating_sub(record.state_changed_at);

            match record.state() {
                NodeState::Suspect if elapsed > suspicion_timeout => {
                    tracing::info!(
                        "[{}] NODE {} suspected for {}ms, declaring dead",
                        &self.addr,
                        &record.id,
                        elapsed
                    );
                    if self.state.confirm_dead(&record.id, record.state_changed_at, now) {
                        changed += 1;
                    }
                }
                NodeState::Left if elapsed > leave_timeout => {
                    if self.state.evict(&record.id) {
                        changed += 1;
                    }
                }
                _ => {}
            }
        }

        changed
    }
}
