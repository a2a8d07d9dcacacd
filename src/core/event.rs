use crate::pb::NodeRecord;

/// Notifications published on the node's event bus.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// A member was seen for the first time.
    NodeJoined(NodeRecord),
    NodeSuspected(NodeRecord),
    /// A suspected, dead or departed member is alive again.
    NodeRecovered(NodeRecord),
    NodeDeceased(NodeRecord),
    NodeLeft(NodeRecord),
    /// A member was evicted from the membership table.
    NodeRemoved(NodeRecord),
    /// A remote membership table arrived through an anti-entropy exchange.
    InboundSync {
        from: String,
        members: Vec<NodeRecord>,
    },
    /// The local member left the cluster and every worker should stop.
    Interrupt,
}

impl Event {
    pub(crate) fn new_inbound_sync(from: impl Into<String>, members: Vec<NodeRecord>) -> Self {
        Event::InboundSync {
            from: from.into(),
            members,
        }
    }

    /// The record the event is about, if any.
    pub fn record(&self) -> Option<&NodeRecord> {
        match self {
            Event::NodeJoined(r)
            | Event::NodeSuspected(r)
            | Event::NodeRecovered(r)
            | Event::NodeDeceased(r)
            | Event::NodeLeft(r)
            | Event::NodeRemoved(r) => Some(r),
            Event::InboundSync { .. } | Event::Interrupt => None,
        }
    }
}
