use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::pb::{NodeRecord, NodeState};

use super::broadcast::{BroadcastEntry, BroadcastQueue};
use super::event::Event;
use super::member::MembershipList;
use super::shutdown::Shutdown;
use super::utils::now_millis;

/// What a single observation did to the table.
enum Transition {
    /// Stale, unknown target or protocol violation. Nothing changed.
    Ignored,
    /// The record was stored. `broadcast` tells whether peers have to hear about it.
    Applied {
        record: NodeRecord,
        broadcast: bool,
        event: Option<Event>,
    },
    /// The local member refuted a claim about itself.
    Refuted(NodeRecord),
    /// The local member accepted its own departure.
    Departed(NodeRecord),
}

/// The only writer of the membership table and the only producer of broadcasts.
///
/// Every `observe_*` method compares the incoming record with the stored one under the
/// table lock and returns whether the table changed.
#[derive(Debug)]
pub(crate) struct StateMachine {
    addr: String,
    membership_list: Arc<MembershipList>,
    broadcasts: Arc<BroadcastQueue>,
    events: broadcast::Sender<Event>,
    shutdown: Shutdown,
    audience: Option<String>,
    leave_shutdown_delay: Duration,
}

impl StateMachine {
    pub(crate) fn new(
        addr: impl Into<String>,
        membership_list: Arc<MembershipList>,
        broadcasts: Arc<BroadcastQueue>,
        events: broadcast::Sender<Event>,
        shutdown: Shutdown,
        audience: Option<String>,
        leave_shutdown_delay: Duration,
    ) -> Self {
        Self {
            addr: addr.into(),
            membership_list,
            broadcasts,
            events,
            shutdown,
            audience,
            leave_shutdown_delay,
        }
    }

    pub(crate) fn membership_list(&self) -> &MembershipList {
        &self.membership_list
    }

    fn local_id(&self) -> &str {
        self.membership_list.local_id()
    }

    /// Applies a gossiped record according to its state.
    pub(crate) fn apply(&self, record: &NodeRecord) -> bool {
        match record.state() {
            NodeState::Alive => self.observe_alive(record, false),
            NodeState::Suspect => self.observe_suspect(record),
            NodeState::Dead => self.observe_dead(record),
            NodeState::Left => self.observe_leave(record),
        }
    }

    /// Handles a claim that a member is alive.
    ///
    /// A `direct` confirmation comes from our own probe and bypasses the incarnation check.
    /// A departed member stays `Left` either way.
    pub(crate) fn observe_alive(&self, incoming: &NodeRecord, direct: bool) -> bool {
        let local_id = self.local_id().to_string();

        let transition = self.membership_list.mutate(|members| {
            if incoming.id == local_id {
                let local = members.get_mut(&local_id)?;
                if incoming.incarnation <= local.incarnation {
                    return Some(Transition::Ignored);
                }
                return Some(Transition::Refuted(refute(local, incoming.incarnation)));
            }

            match members.entry(incoming.id.clone()) {
                Entry::Vacant(entry) => {
                    let mut record = incoming.clone().with_state(NodeState::Alive);
                    record.state_changed_at = 0;
                    entry.insert(record.clone());

                    Some(Transition::Applied {
                        event: Some(Event::NodeJoined(record.clone())),
                        record,
                        broadcast: true,
                    })
                }
                Entry::Occupied(mut entry) => {
                    let current = entry.get_mut();
                    if current.state() == NodeState::Left {
                        return Some(Transition::Ignored);
                    }
                    if !direct && incoming.incarnation <= current.incarnation {
                        return Some(Transition::Ignored);
                    }

                    let previous_state = current.state();
                    let previous_incarnation = current.incarnation;

                    let mut record = incoming.clone().with_state(NodeState::Alive);
                    record.incarnation = incoming.incarnation.max(previous_incarnation);
                    record.state_changed_at = 0;
                    *current = record.clone();

                    let recovered = previous_state != NodeState::Alive;
                    let event = recovered.then(|| Event::NodeRecovered(record.clone()));

                    Some(Transition::Applied {
                        broadcast: recovered || record.incarnation > previous_incarnation,
                        record,
                        event,
                    })
                }
            }
        });

        self.finish(transition.unwrap_or(Transition::Ignored))
    }

    /// Handles a claim that a member is suspected.
    pub(crate) fn observe_suspect(&self, incoming: &NodeRecord) -> bool {
        self.observe_failure(incoming, NodeState::Suspect)
    }

    /// Handles a claim that a member is dead.
    pub(crate) fn observe_dead(&self, incoming: &NodeRecord) -> bool {
        self.observe_failure(incoming, NodeState::Dead)
    }

    fn observe_failure(&self, incoming: &NodeRecord, state: NodeState) -> bool {
        let local_id = self.local_id().to_string();
        let now = now_millis();

        let transition = self.membership_list.mutate(|members| {
            let current = match members.get_mut(&incoming.id) {
                Some(current) if current.state() == NodeState::Alive => current,
                _ => return Transition::Ignored,
            };

            if incoming.incarnation < current.incarnation {
                return Transition::Ignored;
            }

            if incoming.id == local_id {
                return Transition::Refuted(refute(current, incoming.incarnation));
            }

            current.set_state(state);
            current.incarnation = incoming.incarnation;
            current.state_changed_at = now;

            let record = current.clone();
            let event = match state {
                NodeState::Dead => Event::NodeDeceased(record.clone()),
                _ => Event::NodeSuspected(record.clone()),
            };

            Transition::Applied {
                record,
                broadcast: true,
                event: Some(event),
            }
        });

        self.finish(transition)
    }

    /// Handles a departure announcement.
    ///
    /// A departure of the local member is only accepted when it carries exactly the current
    /// local incarnation; the local member then bumps its incarnation, announces the
    /// departure and shuts down after a delay.
    pub(crate) fn observe_leave(&self, incoming: &NodeRecord) -> bool {
        let local_id = self.local_id().to_string();
        let now = now_millis();

        let transition = self.membership_list.mutate(|members| {
            let current = match members.get_mut(&incoming.id) {
                Some(current) if current.state() != NodeState::Left => current,
                _ => return Transition::Ignored,
            };

            if incoming.id == local_id {
                if incoming.incarnation != current.incarnation {
                    tracing::warn!(
                        "[{}] rejecting leave with incarnation {} (current {})",
                        &self.addr,
                        incoming.incarnation,
                        current.incarnation
                    );
                    return Transition::Ignored;
                }

                current.incarnation += 1;
                current.set_state(NodeState::Left);
                current.state_changed_at = now;
                return Transition::Departed(current.clone());
            }

            if incoming.incarnation < current.incarnation {
                return Transition::Ignored;
            }

            current.set_state(NodeState::Left);
            current.incarnation = incoming.incarnation;
            current.state_changed_at = now;

            let record = current.clone();
            Transition::Applied {
                event: Some(Event::NodeLeft(record.clone())),
                record,
                broadcast: true,
            }
        });

        self.finish(transition)
    }

    /// Makes the local member leave the cluster.
    pub(crate) fn leave(&self) -> bool {
        let local = self.membership_list.local_record();
        self.observe_leave(&local)
    }

    /// Moves a member to `Dead` if it is still in the suspicion observed at `suspected_at`.
    pub(crate) fn confirm_dead(&self, id: &str, suspected_at: u64, now: u64) -> bool {
        let transition = self.membership_list.mutate(|members| match members.get_mut(id) {
            Some(current)
                if current.state() == NodeState::Suspect
                    && current.state_changed_at == suspected_at =>
            {
                current.set_state(NodeState::Dead);
                current.state_changed_at = now;

                let record = current.clone();
                Transition::Applied {
                    event: Some(Event::NodeDeceased(record.clone())),
                    record,
                    broadcast: true,
                }
            }
            _ => Transition::Ignored,
        });

        self.finish(transition)
    }

    /// Removes a member that is still `Left`.
    pub(crate) fn evict(&self, id: &str) -> bool {
        if id == self.local_id() {
            return false;
        }

        let removed = self.membership_list.mutate(|members| match members.get(id) {
            Some(current) if current.state() == NodeState::Left => members.remove(id),
            _ => None,
        });

        match removed {
            Some(record) => {
                tracing::info!("[{}] removing departed NODE {}", &self.addr, &record.id);
                let _ = self.events.send(Event::NodeRemoved(record));
                true
            }
            None => false,
        }
    }

    /// Merges a remote membership table.
    ///
    /// Records sharing an endpoint under different ids are resolved over both tables in
    /// favour of the higher incarnation; the losers are removed from the table. Returns the
    /// removed ids.
    pub(crate) fn merge(&self, records: &[NodeRecord]) -> Vec<String> {
        let local = self.membership_list.local_record();

        // the newest remote copy per id
        let mut remote: HashMap<String, NodeRecord> = HashMap::new();
        for record in records.iter().filter(|r| r.id != local.id) {
            match remote.entry(record.id.clone()) {
                Entry::Occupied(mut entry) => {
                    if record.incarnation > entry.get().incarnation {
                        entry.insert(record.clone());
                    }
                }
                Entry::Vacant(entry) => {
                    entry.insert(record.clone());
                }
            }
        }

        // highest incarnation known for each id, grouped by endpoint
        let mut candidates: HashMap<String, (NodeRecord, u64)> = self
            .membership_list
            .snapshot()
            .into_iter()
            .filter(|r| r.id != local.id)
            .map(|r| {
                let incarnation = r.incarnation;
                (r.id.clone(), (r, incarnation))
            })
            .collect();
        for record in remote.values() {
            candidates
                .entry(record.id.clone())
                .and_modify(|(_, incarnation)| {
                    *incarnation = (*incarnation).max(record.incarnation)
                })
                .or_insert_with(|| (record.clone(), record.incarnation));
        }

        let mut endpoints: HashMap<(String, u32), Vec<(String, u64)>> = HashMap::new();
        let mut stale: HashSet<String> = HashSet::new();
        for (id, (record, incarnation)) in &candidates {
            if record.same_endpoint(&local) {
                stale.insert(id.clone());
                continue;
            }
            endpoints
                .entry((record.address.clone(), record.port))
                .or_default()
                .push((id.clone(), *incarnation));
        }

        for ids in endpoints.values().filter(|ids| ids.len() > 1) {
            let newest = ids.iter().map(|(_, inc)| *inc).max().unwrap_or_default();
            stale.extend(
                ids.iter()
                    .filter(|(_, inc)| *inc < newest)
                    .map(|(id, _)| id.clone()),
            );
        }

        let mut removed = Vec::new();
        for id in &stale {
            if let Some(record) = self.membership_list.delete(id) {
                tracing::info!("[{}] removing stale duplicate NODE {}", &self.addr, id);
                let _ = self.events.send(Event::NodeRemoved(record));
                removed.push(id.clone());
            }
        }

        for record in remote.values().filter(|r| !stale.contains(&r.id)) {
            self.apply(record);
        }

        let mut scheduled: Vec<String> = stale.into_iter().collect();
        scheduled.sort();
        tracing::debug!(
            "[{}] merged {} records, removed {:?}",
            &self.addr,
            records.len(),
            &removed
        );

        scheduled
    }

    fn finish(&self, transition: Transition) -> bool {
        match transition {
            Transition::Ignored => false,
            Transition::Applied {
                record,
                broadcast,
                event,
            } => {
                tracing::info!(
                    "[{}] NODE {} is {:?} (incarnation {})",
                    &self.addr,
                    &record.id,
                    record.state(),
                    record.incarnation
                );
                if broadcast {
                    self.enqueue(record);
                }
                if let Some(event) = event {
                    let _ = self.events.send(event);
                }
                true
            }
            Transition::Refuted(record) => {
                tracing::info!(
                    "[{}] refuting, incarnation is now {}",
                    &self.addr,
                    record.incarnation
                );
                self.enqueue(record);
                true
            }
            Transition::Departed(record) => {
                tracing::info!(
                    "[{}] leaving the cluster, shutting down in {:?}",
                    &self.addr,
                    self.leave_shutdown_delay
                );
                self.enqueue(record.clone());
                let _ = self.events.send(Event::NodeLeft(record));
                self.shutdown.interrupt_after(self.leave_shutdown_delay);
                true
            }
        }
    }

    fn enqueue(&self, record: NodeRecord) {
        self.broadcasts
            .enqueue(BroadcastEntry::new(record, self.audience.clone()));
    }
}

/// Bumps the local incarnation past `seen` and returns the new local record.
fn refute(local: &mut NodeRecord, seen: u64) -> NodeRecord {
    local.incarnation = local.incarnation.max(seen) + 1;
    local.set_state(NodeState::Alive);
    local.state_changed_at = 0;
    local.clone()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::broadcast::{self, Receiver};

    use crate::core::broadcast::BroadcastQueue;
    use crate::core::event::Event;
    use crate::core::member::MembershipList;
    use crate::core::shutdown::Shutdown;
    use crate::pb::{NodeRecord, NodeState};

    use super::StateMachine;

    fn record(id: &str, port: u16, incarnation: u64) -> NodeRecord {
        let addr = format!("127.0.0.1:{port}").parse().unwrap();
        NodeRecord::new(id, addr, id, incarnation)
    }

    fn create_state_machine() -> (StateMachine, Arc<BroadcastQueue>, Receiver<Event>) {
        let membership_list = Arc::new(MembershipList::new(record("NODE_A", 8080, 1)));
        let broadcasts = Arc::new(BroadcastQueue::new(10));
        let (tx, rx) = broadcast::channel(32);
        let shutdown = Shutdown::new(tx.clone());

        let state = StateMachine::new(
            "NODE_A",
            membership_list,
            broadcasts.clone(),
            tx,
            shutdown,
            None,
            Duration::from_millis(10),
        );

        (state, broadcasts, rx)
    }

    #[test]
    fn test_state_observe_alive_unknown_joins() {
        let (state, broadcasts, mut rx) = create_state_machine();

        assert!(state.observe_alive(&record("NODE_B", 8081, 1), false));

        let member = state.membership_list().get("NODE_B").unwrap();
        assert_eq!(member.state(), NodeState::Alive);
        assert_eq!(broadcasts.len(), 1);
        assert!(matches!(rx.try_recv().unwrap(), Event::NodeJoined(r) if r.id == "NODE_B"));
    }

    #[test]
    fn test_state_observe_alive_stale_is_idempotent() {
        let (state, broadcasts, _rx) = create_state_machine();
        state.observe_alive(&record("NODE_B", 8081, 2), false);
        let before = state.membership_list().snapshot();
        let queued = broadcasts.entries();

        assert!(!state.observe_alive(&record("NODE_B", 8081, 2), false));
        assert!(!state.observe_alive(&record("NODE_B", 8081, 1), false));

        let mut after = state.membership_list().snapshot();
        let mut before = before;
        before.sort_by(|a, b| a.id.cmp(&b.id));
        after.sort_by(|a, b| a.id.cmp(&b.id));
        assert_eq!(before, after);
        assert_eq!(broadcasts.entries(), queued);
    }

    #[test]
    fn test_state_observe_alive_direct_confirmation_bypasses_incarnation() {
        let (state, broadcasts, mut rx) = create_state_machine();
        state.observe_alive(&record("NODE_B", 8081, 3), false);
        state.observe_suspect(&record("NODE_B", 8081, 3));
        while rx.try_recv().is_ok() {}

        // the probe only knows an older copy of the record
        assert!(state.observe_alive(&record("NODE_B", 8081, 1), true));

        let member = state.membership_list().get("NODE_B").unwrap();
        assert_eq!(member.state(), NodeState::Alive);
        assert_eq!(member.incarnation, 3);
        assert_eq!(broadcasts.entries()[0].record().state(), NodeState::Alive);
        assert!(matches!(rx.try_recv().unwrap(), Event::NodeRecovered(_)));
    }

    #[test]
    fn test_state_observe_alive_direct_confirmation_of_alive_is_quiet() {
        let (state, broadcasts, _rx) = create_state_machine();
        state.observe_alive(&record("NODE_B", 8081, 1), false);
        broadcasts.drain_for_dissemination(1400, &Default::default());
        let queued = broadcasts.entries();

        state.observe_alive(&record("NODE_B", 8081, 1), true);
        assert_eq!(broadcasts.entries(), queued);
    }

    #[test]
    fn test_state_left_is_not_revived_by_alive() {
        let (state, broadcasts, mut rx) = create_state_machine();
        state.observe_alive(&record("NODE_B", 8081, 1), false);
        let before_leave = state.membership_list().get("NODE_B").unwrap();
        state.observe_leave(&record("NODE_B", 8081, 2));
        while rx.try_recv().is_ok() {}
        let queued = broadcasts.entries();

        // an ack to a probe sent before the departure was heard of
        assert!(!state.observe_alive(&before_leave, true));
        assert!(!state.observe_alive(&record("NODE_B", 8081, 3), false));

        let member = state.membership_list().get("NODE_B").unwrap();
        assert_eq!(member.state(), NodeState::Left);
        assert_eq!(member.incarnation, 2);
        assert_eq!(broadcasts.entries(), queued);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_state_suspect_then_newer_alive_recovers() {
        let (state, _broadcasts, _rx) = create_state_machine();
        state.observe_alive(&record("NODE_B", 8081, 1), false);

        assert!(state.observe_suspect(&record("NODE_B", 8081, 1)));
        assert_eq!(
            state.membership_list().member_state("NODE_B"),
            Some(NodeState::Suspect)
        );
        assert!(state.membership_list().get("NODE_B").unwrap().state_changed_at > 0);

        assert!(state.observe_alive(&record("NODE_B", 8081, 2), false));
        let member = state.membership_list().get("NODE_B").unwrap();
        assert_eq!(member.state(), NodeState::Alive);
        assert_eq!(member.incarnation, 2);
    }

    #[test]
    fn test_state_observe_suspect_ignored_cases() {
        let (state, broadcasts, _rx) = create_state_machine();

        // unknown
        assert!(!state.observe_suspect(&record("NODE_B", 8081, 1)));

        state.observe_alive(&record("NODE_B", 8081, 5), false);
        let queued = broadcasts.len();

        // stale
        assert!(!state.observe_suspect(&record("NODE_B", 8081, 4)));

        // already suspected
        assert!(state.observe_suspect(&record("NODE_B", 8081, 5)));
        assert!(!state.observe_suspect(&record("NODE_B", 8081, 6)));
        assert_eq!(broadcasts.len(), queued);
    }

    #[test]
    fn test_state_self_refutation_on_suspect() {
        let (state, broadcasts, _rx) = create_state_machine();

        assert!(state.observe_suspect(&record("NODE_A", 8080, 1)));

        let local = state.membership_list().local_record();
        assert_eq!(local.state(), NodeState::Alive);
        assert_eq!(local.incarnation, 2);

        let entries = broadcasts.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].record().id, "NODE_A");
        assert_eq!(entries[0].record().incarnation, 2);
        assert_eq!(entries[0].record().state(), NodeState::Alive);
    }

    #[test]
    fn test_state_self_refutation_on_dead() {
        let (state, _broadcasts, _rx) = create_state_machine();

        assert!(state.observe_dead(&record("NODE_A", 8080, 4)));

        let local = state.membership_list().local_record();
        assert_eq!(local.state(), NodeState::Alive);
        assert_eq!(local.incarnation, 5);
    }

    #[test]
    fn test_state_remote_alive_cannot_lower_or_overwrite_self() {
        let (state, broadcasts, _rx) = create_state_machine();

        assert!(!state.observe_alive(&record("NODE_A", 9999, 0), false));
        assert!(!state.observe_alive(&record("NODE_A", 9999, 1), false));
        let local = state.membership_list().local_record();
        assert_eq!(local.incarnation, 1);
        assert_eq!(local.port, 8080);
        assert!(broadcasts.is_empty());

        assert!(state.observe_alive(&record("NODE_A", 9999, 7), false));
        let local = state.membership_list().local_record();
        assert_eq!(local.incarnation, 8);
        assert_eq!(local.port, 8080);
    }

    #[test]
    fn test_state_observe_dead_only_from_alive() {
        let (state, _broadcasts, mut rx) = create_state_machine();
        state.observe_alive(&record("NODE_B", 8081, 1), false);
        state.observe_alive(&record("NODE_C", 8082, 1), false);
        state.observe_suspect(&record("NODE_C", 8082, 1));
        while rx.try_recv().is_ok() {}

        assert!(state.observe_dead(&record("NODE_B", 8081, 1)));
        assert_eq!(
            state.membership_list().member_state("NODE_B"),
            Some(NodeState::Dead)
        );
        assert!(matches!(rx.try_recv().unwrap(), Event::NodeDeceased(_)));

        assert!(!state.observe_dead(&record("NODE_C", 8082, 1)));
        assert_eq!(
            state.membership_list().member_state("NODE_C"),
            Some(NodeState::Suspect)
        );
    }

    #[test]
    fn test_state_observe_leave_remote() {
        let (state, _broadcasts, mut rx) = create_state_machine();
        state.observe_alive(&record("NODE_B", 8081, 3), false);
        while rx.try_recv().is_ok() {}

        assert!(!state.observe_leave(&record("NODE_B", 8081, 2)));
        assert!(state.observe_leave(&record("NODE_B", 8081, 3)));
        assert!(!state.observe_leave(&record("NODE_B", 8081, 4)));

        let member = state.membership_list().get("NODE_B").unwrap();
        assert_eq!(member.state(), NodeState::Left);
        assert!(matches!(rx.try_recv().unwrap(), Event::NodeLeft(_)));
    }

    #[tokio::test]
    async fn test_state_self_leave_guard() {
        let (state, broadcasts, mut rx) = create_state_machine();

        assert!(!state.observe_leave(&record("NODE_A", 8080, 0)));
        assert!(!state.observe_leave(&record("NODE_A", 8080, 2)));
        assert_eq!(
            state.membership_list().local_record().state(),
            NodeState::Alive
        );

        assert!(state.observe_leave(&record("NODE_A", 8080, 1)));
        let local = state.membership_list().local_record();
        assert_eq!(local.state(), NodeState::Left);
        assert_eq!(local.incarnation, 2);
        assert_eq!(broadcasts.entries()[0].record().state(), NodeState::Left);

        // replay
        assert!(!state.observe_leave(&record("NODE_A", 8080, 2)));

        assert!(matches!(rx.recv().await.unwrap(), Event::NodeLeft(_)));
        let interrupt = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await;
        assert_eq!(interrupt.unwrap().unwrap(), Event::Interrupt);
    }

    #[test]
    fn test_state_incarnation_never_decreases() {
        let (state, _broadcasts, _rx) = create_state_machine();
        state.observe_alive(&record("NODE_B", 8081, 5), false);

        let sequence = [
            record("NODE_B", 8081, 2).with_state(NodeState::Suspect),
            record("NODE_B", 8081, 1),
            record("NODE_B", 8081, 0).with_state(NodeState::Dead),
            record("NODE_B", 8081, 3).with_state(NodeState::Left),
            record("NODE_B", 8081, 4),
        ];

        let mut last = 5;
        for incoming in &sequence {
            state.apply(incoming);
            let current = state.membership_list().get("NODE_B").unwrap().incarnation;
            assert!(current >= last);
            last = current;
        }
        assert_eq!(last, 5);
    }

    #[test]
    fn test_state_confirm_dead_and_evict() {
        let (state, _broadcasts, _rx) = create_state_machine();
        state.observe_alive(&record("NODE_B", 8081, 1), false);

        assert!(!state.confirm_dead("NODE_B", 0, 1));
        state.observe_suspect(&record("NODE_B", 8081, 1));
        let suspected_at = state.membership_list().get("NODE_B").unwrap().state_changed_at;
        assert!(state.confirm_dead("NODE_B", suspected_at, 1));
        assert_eq!(
            state.membership_list().member_state("NODE_B"),
            Some(NodeState::Dead)
        );

        assert!(!state.evict("NODE_B"));
        state.observe_alive(&record("NODE_B", 8081, 2), false);
        state.observe_leave(&record("NODE_B", 8081, 2));
        assert!(state.evict("NODE_B"));
        assert!(state.membership_list().get("NODE_B").is_none());
    }

    #[test]
    fn test_state_confirm_dead_requires_the_observed_suspicion() {
        let (state, _broadcasts, _rx) = create_state_machine();
        let list = state.membership_list();

        let mut suspect = record("NODE_B", 8081, 2).with_state(NodeState::Suspect);
        suspect.state_changed_at = 100;
        list.upsert(suspect.clone());

        // refuted and suspected again in the meantime
        suspect.state_changed_at = 200;
        list.upsert(suspect);

        assert!(!state.confirm_dead("NODE_B", 100, 300));
        assert_eq!(list.member_state("NODE_B"), Some(NodeState::Suspect));
        assert!(state.confirm_dead("NODE_B", 200, 300));
        assert_eq!(list.member_state("NODE_B"), Some(NodeState::Dead));
    }

    #[test]
    fn test_state_merge_resolves_duplicate_endpoints() {
        let (state, _broadcasts, _rx) = create_state_machine();

        let remote = vec![record("NODE_X", 9000, 3), record("NODE_Y", 9000, 5)];
        let scheduled = state.merge(&remote);

        assert_eq!(scheduled, vec!["NODE_X".to_string()]);
        assert!(state.membership_list().get("NODE_X").is_none());
        assert_eq!(
            state.membership_list().member_state("NODE_Y"),
            Some(NodeState::Alive)
        );
    }

    #[test]
    fn test_state_merge_keeps_newer_local_copy_of_endpoint() {
        let (state, _broadcasts, mut rx) = create_state_machine();
        state.observe_alive(&record("NODE_X", 9000, 7), false);
        while rx.try_recv().is_ok() {}

        // the remote table holds an older copy of NODE_X next to NODE_Y
        let remote = vec![record("NODE_X", 9000, 3), record("NODE_Y", 9000, 5)];
        let scheduled = state.merge(&remote);

        assert_eq!(scheduled, vec!["NODE_Y".to_string()]);
        let kept = state.membership_list().get("NODE_X").unwrap();
        assert_eq!(kept.incarnation, 7);
        assert_eq!(kept.state(), NodeState::Alive);
        assert!(state.membership_list().get("NODE_Y").is_none());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_state_merge_keeps_equal_endpoint_duplicates() {
        let (state, _broadcasts, _rx) = create_state_machine();
        state.observe_alive(&record("NODE_X", 9000, 2), false);

        let scheduled = state.merge(&[record("NODE_Y", 9000, 2)]);

        assert!(scheduled.is_empty());
        assert!(state.membership_list().get("NODE_X").is_some());
        assert!(state.membership_list().get("NODE_Y").is_some());
    }

    #[test]
    fn test_state_merge_removes_local_duplicate() {
        let (state, _broadcasts, _rx) = create_state_machine();
        state.observe_alive(&record("NODE_OLD", 9000, 1), false);

        let scheduled = state.merge(&[record("NODE_NEW", 9000, 2)]);

        assert_eq!(scheduled, vec!["NODE_OLD".to_string()]);
        assert!(state.membership_list().get("NODE_OLD").is_none());
        assert!(state.membership_list().get("NODE_NEW").is_some());
    }

    #[test]
    fn test_state_merge_dispatches_states() {
        let (state, _broadcasts, _rx) = create_state_machine();
        state.observe_alive(&record("NODE_B", 8081, 1), false);
        state.observe_alive(&record("NODE_C", 8082, 1), false);
        state.observe_alive(&record("NODE_D", 8083, 1), false);

        let remote = vec![
            // describes the local member and must be skipped
            record("NODE_A", 8080, 9).with_state(NodeState::Dead),
            record("NODE_B", 8081, 1).with_state(NodeState::Suspect),
            record("NODE_C", 8082, 1).with_state(NodeState::Dead),
            record("NODE_D", 8083, 1).with_state(NodeState::Left),
            record("NODE_E", 8084, 1),
        ];
        state.merge(&remote);

        let list = state.membership_list();
        assert_eq!(list.local_record().incarnation, 1);
        assert_eq!(list.member_state("NODE_B"), Some(NodeState::Suspect));
        assert_eq!(list.member_state("NODE_C"), Some(NodeState::Dead));
        assert_eq!(list.member_state("NODE_D"), Some(NodeState::Left));
        assert_eq!(list.member_state("NODE_E"), Some(NodeState::Alive));
    }
}
