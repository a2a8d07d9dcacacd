//! # Wire Types
//!
//! Protobuf messages exchanged between cluster members. The types are declared with the
//! `prost` derive macros directly, so no code generation step is required.
//!
//! - [`NodeRecord`]: a single member as seen by the sender. It doubles as the element of
//!   a gossip batch and of a push-pull table.
//! - [`SwimMessage`]: the envelope of every datagram.
//! - [`PushPull`]: the payload of an anti-entropy request or response.
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

/// The state of a cluster member.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum NodeState {
    Alive = 0,
    Suspect = 1,
    Dead = 2,
    Left = 3,
}

/// One entry of the membership table.
#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct NodeRecord {
    /// Globally unique and immutable member id.
    #[prost(string, tag = "1")]
    pub id: String,
    /// Last known reachable IP address or host name.
    #[prost(string, tag = "2")]
    pub address: String,
    #[prost(uint32, tag = "3")]
    pub port: u32,
    /// Human readable name, not guaranteed to be unique.
    #[prost(string, tag = "4")]
    pub name: String,
    /// Logical clock owned by the member this record describes.
    #[prost(uint64, tag = "5")]
    pub incarnation: u64,
    #[prost(enumeration = "NodeState", tag = "6")]
    pub state: i32,
    /// Attributes used for gossip audience filtering.
    #[prost(map = "string, string", tag = "7")]
    pub tags: HashMap<String, String>,
    /// Opaque service metadata.
    #[prost(bytes = "vec", tag = "8")]
    pub services: Vec<u8>,
    /// Milliseconds since the unix epoch of the last move into `Suspect`, `Dead` or `Left`.
    #[prost(uint64, tag = "9")]
    pub state_changed_at: u64,
}

impl NodeRecord {
    pub fn new(
        id: impl Into<String>,
        addr: SocketAddr,
        name: impl Into<String>,
        incarnation: u64,
    ) -> Self {
        Self {
            id: id.into(),
            address: addr.ip().to_string(),
            port: addr.port() as u32,
            name: name.into(),
            incarnation,
            state: NodeState::Alive as i32,
            ..Default::default()
        }
    }

    /// Returns a copy of the record with the given state.
    pub fn with_state(mut self, state: NodeState) -> Self {
        self.set_state(state);
        self
    }

    /// Returns the `host:port` endpoint of the member.
    pub fn addr(&self) -> String {
        match self.address.parse::<IpAddr>() {
            Ok(ip) => SocketAddr::new(ip, self.port as u16).to_string(),
            Err(_) => format!("{}:{}", self.address, self.port),
        }
    }

    /// Whether both records point to the same endpoint.
    pub fn same_endpoint(&self, other: &NodeRecord) -> bool {
        self.address == other.address && self.port == other.port
    }
}

/// The envelope of every datagram.
#[derive(Clone, PartialEq, prost::Message)]
pub struct SwimMessage {
    #[prost(oneof = "swim_message::Action", tags = "1, 2, 3, 4")]
    pub action: Option<swim_message::Action>,
}

pub mod swim_message {
    /// Direct liveness probe.
    #[derive(Clone, PartialEq, Eq, prost::Message)]
    pub struct Ping {
        /// The address the ack is sent to.
        #[prost(string, tag = "1")]
        pub from: String,
        #[prost(string, tag = "2")]
        pub from_id: String,
        /// The id the sender expects to reach. A receiver with another id stays silent.
        #[prost(string, tag = "3")]
        pub target_id: String,
        #[prost(uint64, tag = "4")]
        pub seq: u64,
        /// Set when the ping is relayed on behalf of another member.
        #[prost(string, tag = "5")]
        pub requested_by: String,
    }

    #[derive(Clone, PartialEq, Eq, prost::Message)]
    pub struct Ack {
        #[prost(string, tag = "1")]
        pub from: String,
        #[prost(uint64, tag = "2")]
        pub seq: u64,
    }

    /// Asks the receiver to ping `target_id` on behalf of `from`.
    #[derive(Clone, PartialEq, Eq, prost::Message)]
    pub struct PingReq {
        #[prost(string, tag = "1")]
        pub from: String,
        #[prost(uint64, tag = "2")]
        pub seq: u64,
        #[prost(string, tag = "3")]
        pub target_id: String,
        #[prost(string, tag = "4")]
        pub target_addr: String,
    }

    /// A batch of state change announcements.
    #[derive(Clone, PartialEq, Eq, prost::Message)]
    pub struct Gossip {
        #[prost(message, repeated, tag = "1")]
        pub records: Vec<super::NodeRecord>,
    }

    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Action {
        #[prost(message, tag = "1")]
        Ping(Ping),
        #[prost(message, tag = "2")]
        Ack(Ack),
        #[prost(message, tag = "3")]
        PingReq(PingReq),
        #[prost(message, tag = "4")]
        Gossip(Gossip),
    }
}

/// Request and response of an anti-entropy exchange.
#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct PushPull {
    #[prost(string, tag = "1")]
    pub from: String,
    #[prost(message, repeated, tag = "2")]
    pub members: Vec<NodeRecord>,
}

impl From<swim_message::Action> for SwimMessage {
    fn from(action: swim_message::Action) -> Self {
        SwimMessage {
            action: Some(action),
        }
    }
}
