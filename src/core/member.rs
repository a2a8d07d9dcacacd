use std::collections::HashMap;

use parking_lot::RwLock;
use rand::{seq::IteratorRandom, thread_rng};

use crate::pb::{NodeRecord, NodeState};

/// The membership table: one [`NodeRecord`] per member id, the local member included.
///
/// Every mutation goes through a single exclusive lock. Readers that need to iterate
/// take a [`MembershipList::snapshot`] and work on the copy.
#[derive(Debug)]
pub struct MembershipList {
    local_id: String,
    members: RwLock<HashMap<String, NodeRecord>>,
}

impl MembershipList {
    /// Creates a table holding only the local member.
    pub fn new(local: NodeRecord) -> Self {
        let local_id = local.id.clone();
        let members = HashMap::from_iter([(local_id.clone(), local)]);

        Self {
            local_id,
            members: RwLock::new(members),
        }
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    /// Returns a copy of the local member's record.
    pub fn local_record(&self) -> NodeRecord {
        self.members
            .read()
            .get(&self.local_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn get(&self, id: impl AsRef<str>) -> Option<NodeRecord> {
        self.members.read().get(id.as_ref()).cloned()
    }

    pub fn member_state(&self, id: impl AsRef<str>) -> Option<NodeState> {
        self.members.read().get(id.as_ref()).map(NodeRecord::state)
    }

    pub fn upsert(&self, record: NodeRecord) {
        self.members.write().insert(record.id.clone(), record);
    }

    /// Removes a member. The local member is never removed.
    pub fn delete(&self, id: impl AsRef<str>) -> Option<NodeRecord> {
        let id = id.as_ref();
        if id == self.local_id {
            return None;
        }

        self.members.write().remove(id)
    }

    /// Returns a point-in-time copy of the table.
    pub fn snapshot(&self) -> Vec<NodeRecord> {
        self.members.read().values().cloned().collect()
    }

    /// Returns every record except `id` and except those in one of the `excluded` states.
    pub fn all_except(&self, id: impl AsRef<str>, excluded: &[NodeState]) -> Vec<NodeRecord> {
        let id = id.as_ref();

        self.snapshot()
            .into_iter()
            .filter(|record| record.id != id && !excluded.contains(&record.state()))
            .collect()
    }

    /// Returns up to `amount` distinct members chosen uniformly at random among the
    /// members other than self and `exclude` for which `filter` holds.
    pub fn get_random_member_list<F>(
        &self,
        amount: usize,
        exclude: Option<&str>,
        filter: F,
    ) -> Vec<NodeRecord>
    where
        F: Fn(&NodeRecord) -> bool,
    {
        let mut rng = thread_rng();

        self.snapshot()
            .into_iter()
            .filter(|record| {
                record.id != self.local_id
                    && exclude.map_or(true, |e| record.id != e)
                    && filter(record)
            })
            .choose_multiple(&mut rng, amount)
    }

    /// Finds a member by its display name.
    pub fn find_by_name(&self, name: impl AsRef<str>) -> Option<NodeRecord> {
        let name = name.as_ref();
        self.members
            .read()
            .values()
            .find(|record| record.name == name)
            .cloned()
    }

    /// Number of known members, the local member included.
    pub fn len(&self) -> usize {
        self.members.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.read().is_empty()
    }

    /// Runs `f` with exclusive access to the table.
    /// Used by the state machine to compare and update records atomically.
    pub(crate) fn mutate<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut HashMap<String, NodeRecord>) -> R,
    {
        let mut members = self.members.write();
        f(&mut members)
    }
}
