use std::collections::HashMap;
use std::time::Duration;

/// Default interval between two failure detection rounds.
const DEFAULT_PING_INTERVAL: Duration = Duration::from_millis(1000);

/// Default timeout for a direct PING.
/// If no ACK is received within this duration, indirect probing starts.
const DEFAULT_PING_TIMEOUT: Duration = Duration::from_millis(3000);

/// Default number of nodes asked to relay a PING-REQ.
const DEFAULT_PING_REQ_GROUP_SIZE: usize = 3;

/// Default timeout for the first relayed ACK.
/// If no ACK is received within this time, the target becomes a `Suspect`.
const DEFAULT_PING_REQ_TIMEOUT: Duration = Duration::from_millis(6000);

/// Default interval between two gossip rounds.
const DEFAULT_GOSSIP_INTERVAL: Duration = Duration::from_millis(200);

/// Default number of peers per gossip round, also the number of times an update is sent.
const DEFAULT_GOSSIP_FANOUT: usize = 10;

/// Default size limit of a gossip batch, chosen to fit one datagram below common MTUs.
const DEFAULT_GOSSIP_MAX_BYTES: usize = 1400;

/// Default interval between two anti-entropy exchanges.
const DEFAULT_FULL_SYNC_INTERVAL: Duration = Duration::from_secs(30);

/// Default timeout for a whole push-pull request.
const DEFAULT_PUSH_PULL_TIMEOUT: Duration = Duration::from_secs(10);

/// Default interval between two suspicion reaper runs.
const DEFAULT_REAP_INTERVAL: Duration = Duration::from_millis(1000);

/// Default number of ping intervals (scaled by cluster size) a node stays `Suspect`.
const DEFAULT_SUSPICION_MULTIPLIER: u32 = 5;

/// Default factor applied to the suspicion timeout before a `Left` node is removed.
const DEFAULT_LEAVE_TIMEOUT_MULTIPLIER: u32 = 3;

/// Default delay between a voluntary leave and the local shutdown.
const DEFAULT_LEAVE_SHUTDOWN_DELAY: Duration = Duration::from_secs(2);

/// Default pause between two passes over the seed list while joining.
const DEFAULT_JOIN_BACKOFF: Duration = Duration::from_secs(1);

/// Default capacity of the event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 32;

/// The buffer size for receiving new messages. Defaults to 1536 bytes.
pub(crate) const DEFAULT_BUFFER_SIZE: usize = 1536;

/// Builder for creating a [`SwimConfig`] with customized settings for a cluster member.
/// Allows configuring identity, timeouts, intervals, and known peers in the network.
#[derive(Clone, Debug)]
pub struct SwimConfigBuilder {
    known_peers: Vec<String>,
    node_id: Option<String>,
    node_name: Option<String>,
    tags: HashMap<String, String>,
    services: Vec<u8>,
    secret_key: Option<[u8; 32]>,
    ping_interval: Duration,
    ping_timeout: Duration,
    ping_req_group_size: usize,
    ping_req_timeout: Duration,
    gossip_interval: Duration,
    gossip_fanout: usize,
    gossip_max_bytes: usize,
    gossip_audience: Option<String>,
    full_sync_interval: Duration,
    push_pull_timeout: Duration,
    reap_interval: Duration,
    suspicion_multiplier: u32,
    leave_timeout_multiplier: u32,
    leave_shutdown_delay: Duration,
    join_backoff: Duration,
    event_channel_capacity: usize,
}

impl SwimConfigBuilder {
    /// Creates a new [`SwimConfigBuilder`] with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes the builder and returns a fully constructed [`SwimConfig`].
    pub fn build(self) -> SwimConfig {
        let node_id = self
            .node_id
            .unwrap_or_else(|| format!("{:016x}", rand::random::<u64>()));

        SwimConfig {
            known_peers: self.known_peers,
            node_id,
            node_name: self.node_name,
            tags: self.tags,
            services: self.services,
            secret_key: self.secret_key,
            ping_interval: self.ping_interval,
            ping_timeout: self.ping_timeout,
            ping_req_group_size: self.ping_req_group_size,
            ping_req_timeout: self.ping_req_timeout,
            gossip_interval: self.gossip_interval,
            gossip_fanout: self.gossip_fanout,
            gossip_max_bytes: self.gossip_max_bytes,
            gossip_audience: self.gossip_audience,
            full_sync_interval: self.full_sync_interval,
            push_pull_timeout: self.push_pull_timeout,
            reap_interval: self.reap_interval,
            suspicion_multiplier: self.suspicion_multiplier,
            leave_timeout_multiplier: self.leave_timeout_multiplier,
            leave_shutdown_delay: self.leave_shutdown_delay,
            join_backoff: self.join_backoff,
            event_channel_capacity: self.event_channel_capacity,
        }
    }

    /// Sets the seed peers this node contacts when joining the cluster.
    pub fn with_known_peers<T>(mut self, known_peers: T) -> Self
    where
        T: IntoIterator,
        T::Item: AsRef<str>,
    {
        self.known_peers = known_peers
            .into_iter()
            .map(|p| p.as_ref().to_string())
            .collect();
        self
    }

    /// Sets the unique id of this node. A random id is generated otherwise.
    pub fn with_node_id(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self
    }

    /// Sets the display name of this node. Defaults to the bound address.
    pub fn with_node_name(mut self, node_name: impl Into<String>) -> Self {
        self.node_name = Some(node_name.into());
        self
    }

    /// Adds a tag announced with this node's record.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Sets the opaque service metadata announced with this node's record.
    pub fn with_services(mut self, services: impl Into<Vec<u8>>) -> Self {
        self.services = services.into();
        self
    }

    /// Sets the shared cluster key used to encrypt every message.
    pub fn with_secret_key(mut self, secret_key: [u8; 32]) -> Self {
        self.secret_key = Some(secret_key);
        self
    }

    /// Sets the interval between failure detection rounds.
    pub fn with_ping_interval(mut self, ping_interval: Duration) -> Self {
        self.ping_interval = ping_interval;
        self
    }

    /// Sets the timeout for awaiting an ACK to a PING message.
    pub fn with_ping_timeout(mut self, ping_timeout: Duration) -> Self {
        self.ping_timeout = ping_timeout;
        self
    }

    /// Sets the number of nodes involved in a PING-REQ operation.
    pub fn with_ping_req_group_size(mut self, ping_req_group_size: usize) -> Self {
        self.ping_req_group_size = ping_req_group_size;
        self
    }

    /// Sets the timeout for awaiting the first relayed ACK of a PING-REQ.
    pub fn with_ping_req_timeout(mut self, ping_req_timeout: Duration) -> Self {
        self.ping_req_timeout = ping_req_timeout;
        self
    }

    /// Sets the interval between gossip rounds.
    pub fn with_gossip_interval(mut self, gossip_interval: Duration) -> Self {
        self.gossip_interval = gossip_interval;
        self
    }

    /// Sets the gossip fanout.
    pub fn with_gossip_fanout(mut self, gossip_fanout: usize) -> Self {
        self.gossip_fanout = gossip_fanout;
        self
    }

    /// Sets the size limit of one gossip batch in bytes.
    pub fn with_gossip_max_bytes(mut self, gossip_max_bytes: usize) -> Self {
        self.gossip_max_bytes = gossip_max_bytes;
        self
    }

    /// Restricts this node's broadcasts to peers carrying the given tag value.
    pub fn with_gossip_audience(mut self, audience: impl Into<String>) -> Self {
        self.gossip_audience = Some(audience.into());
        self
    }

    /// Sets the interval between anti-entropy exchanges.
    pub fn with_full_sync_interval(mut self, full_sync_interval: Duration) -> Self {
        self.full_sync_interval = full_sync_interval;
        self
    }

    /// Sets the timeout of a push-pull request.
    pub fn with_push_pull_timeout(mut self, push_pull_timeout: Duration) -> Self {
        self.push_pull_timeout = push_pull_timeout;
        self
    }

    /// Sets the interval between suspicion reaper runs.
    pub fn with_reap_interval(mut self, reap_interval: Duration) -> Self {
        self.reap_interval = reap_interval;
        self
    }

    /// Sets how many ping intervals (scaled by cluster size) a node stays suspected.
    pub fn with_suspicion_multiplier(mut self, suspicion_multiplier: u32) -> Self {
        self.suspicion_multiplier = suspicion_multiplier;
        self
    }

    /// Sets the factor applied to the suspicion timeout before `Left` nodes are removed.
    pub fn with_leave_timeout_multiplier(mut self, leave_timeout_multiplier: u32) -> Self {
        self.leave_timeout_multiplier = leave_timeout_multiplier;
        self
    }

    /// Sets the delay between a voluntary leave and the local shutdown.
    pub fn with_leave_shutdown_delay(mut self, leave_shutdown_delay: Duration) -> Self {
        self.leave_shutdown_delay = leave_shutdown_delay;
        self
    }

    /// Sets the pause between two passes over the seed list.
    pub fn with_join_backoff(mut self, join_backoff: Duration) -> Self {
        self.join_backoff = join_backoff;
        self
    }

    /// Sets the capacity of the event channel. The capacity is at least 1.
    pub fn with_event_channel_capacity(mut self, event_channel_capacity: usize) -> Self {
        self.event_channel_capacity = event_channel_capacity.max(1);
        self
    }
}

impl Default for SwimConfigBuilder {
    fn default() -> Self {
        Self {
            known_peers: vec![],
            node_id: None,
            node_name: None,
            tags: HashMap::new(),
            services: vec![],
            secret_key: None,
            ping_interval: DEFAULT_PING_INTERVAL,
            ping_timeout: DEFAULT_PING_TIMEOUT,
            ping_req_group_size: DEFAULT_PING_REQ_GROUP_SIZE,
            ping_req_timeout: DEFAULT_PING_REQ_TIMEOUT,
            gossip_interval: DEFAULT_GOSSIP_INTERVAL,
            gossip_fanout: DEFAULT_GOSSIP_FANOUT,
            gossip_max_bytes: DEFAULT_GOSSIP_MAX_BYTES,
            gossip_audience: None,
            full_sync_interval: DEFAULT_FULL_SYNC_INTERVAL,
            push_pull_timeout: DEFAULT_PUSH_PULL_TIMEOUT,
            reap_interval: DEFAULT_REAP_INTERVAL,
            suspicion_multiplier: DEFAULT_SUSPICION_MULTIPLIER,
            leave_timeout_multiplier: DEFAULT_LEAVE_TIMEOUT_MULTIPLIER,
            leave_shutdown_delay: DEFAULT_LEAVE_SHUTDOWN_DELAY,
            join_backoff: DEFAULT_JOIN_BACKOFF,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
        }
    }
}

/// Configuration for a cluster member,
/// used to store its identity as well as timeouts, intervals, and known peers.
#[derive(Clone, Debug)]
pub struct SwimConfig {
    /// Seed addresses contacted while joining.
    known_peers: Vec<String>,
    node_id: String,
    /// Falls back to the bound address when unset.
    node_name: Option<String>,
    tags: HashMap<String, String>,
    services: Vec<u8>,
    secret_key: Option<[u8; 32]>,
    ping_interval: Duration,
    ping_timeout: Duration,
    ping_req_group_size: usize,
    ping_req_timeout: Duration,
    gossip_interval: Duration,
    gossip_fanout: usize,
    gossip_max_bytes: usize,
    gossip_audience: Option<String>,
    full_sync_interval: Duration,
    push_pull_timeout: Duration,
    reap_interval: Duration,
    suspicion_multiplier: u32,
    leave_timeout_multiplier: u32,
    leave_shutdown_delay: Duration,
    join_backoff: Duration,
    event_channel_capacity: usize,
}

impl SwimConfig {
    /// Creates a new [`SwimConfig`] with default parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a new [`SwimConfigBuilder`] to construct a [`SwimConfig`].
    pub fn builder() -> SwimConfigBuilder {
        SwimConfigBuilder::new()
    }

    /// Returns a reference to the known peers of the node.
    pub fn known_peers(&self) -> &[String] {
        &self.known_peers
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn node_name(&self) -> Option<&str> {
        self.node_name.as_deref()
    }

    pub fn tags(&self) -> &HashMap<String, String> {
        &self.tags
    }

    pub fn services(&self) -> &[u8] {
        &self.services
    }

    pub fn secret_key(&self) -> Option<&[u8; 32]> {
        self.secret_key.as_ref()
    }

    /// Returns the interval between failure detection rounds.
    pub fn ping_interval(&self) -> Duration {
        self.ping_interval
    }

    /// Returns the timeout for awaiting an ACK to a PING message.
    pub fn ping_timeout(&self) -> Duration {
        self.ping_timeout
    }

    /// Returns the number of nodes involved in a PING-REQ operation.
    pub fn ping_req_group_size(&self) -> usize {
        self.ping_req_group_size
    }

    /// Returns the timeout for awaiting the first relayed ACK.
    pub fn ping_req_timeout(&self) -> Duration {
        self.ping_req_timeout
    }

    pub fn gossip_interval(&self) -> Duration {
        self.gossip_interval
    }

    pub fn gossip_fanout(&self) -> usize {
        self.gossip_fanout
    }

    pub fn gossip_max_bytes(&self) -> usize {
        self.gossip_max_bytes
    }

    pub fn gossip_audience(&self) -> Option<&str> {
        self.gossip_audience.as_deref()
    }

    pub fn full_sync_interval(&self) -> Duration {
        self.full_sync_interval
    }

    pub fn push_pull_timeout(&self) -> Duration {
        self.push_pull_timeout
    }

    pub fn reap_interval(&self) -> Duration {
        self.reap_interval
    }

    pub fn suspicion_multiplier(&self) -> u32 {
        self.suspicion_multiplier
    }

    pub fn leave_timeout_multiplier(&self) -> u32 {
        self.leave_timeout_multiplier
    }

    pub fn leave_shutdown_delay(&self) -> Duration {
        self.leave_shutdown_delay
    }

    pub fn join_backoff(&self) -> Duration {
        self.join_backoff
    }

    pub fn event_channel_capacity(&self) -> usize {
        self.event_channel_capacity
    }
}

impl Default for SwimConfig {
    fn default() -> Self {
        SwimConfigBuilder::new().build()
    }
}
