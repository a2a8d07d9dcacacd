use std::net::SocketAddr;
use std::sync::Arc;

use dashmap::DashSet;
use tokio::net::TcpListener;
use tokio::sync::broadcast::{self, Receiver};
use tokio::task::JoinHandle;

use crate::api::config::SwimConfig;
use crate::error::Result;
use crate::pb::swim_message::{Action, Gossip};
use crate::pb::{NodeRecord, NodeState};

use super::broadcast::BroadcastQueue;
use super::crypto::{ChaChaCipher, Cipher, Plaintext};
use super::detection::{AckRegistry, FailureDetector};
use super::disseminate::Disseminator;
use super::event::Event;
use super::member::MembershipList;
use super::message::MessageHandler;
use super::reaper::SuspicionReaper;
use super::shutdown::Shutdown;
use super::state::StateMachine;
use super::sync::AntiEntropy;
use super::transport::{StreamLayer, TransportLayer};
use super::utils::{send_action, spawn_periodic};

/// A single cluster member: owns the membership table and drives every protocol worker.
#[derive(Debug)]
pub struct SwimNode<T: TransportLayer> {
    addr: String,
    config: Arc<SwimConfig>,
    socket: Arc<T>,
    cipher: Arc<dyn Cipher>,
    membership_list: Arc<MembershipList>,
    broadcasts: Arc<BroadcastQueue>,
    state: Arc<StateMachine>,
    acks: Arc<AckRegistry>,
    reconfirm: Arc<DashSet<String>>,
    tx: broadcast::Sender<Event>,
    shutdown: Shutdown,
    sync: AntiEntropy,
}

impl<T: TransportLayer> SwimNode<T> {
    /// Creates a member announcing the address `socket` is bound to.
    pub fn try_new(socket: T, config: SwimConfig, stream: Arc<dyn StreamLayer>) -> Result<Self> {
        let addr = socket.local_addr()?;
        let endpoint: SocketAddr = addr.parse()?;
        let socket = Arc::new(socket);
        let config = Arc::new(config);

        let cipher: Arc<dyn Cipher> = match config.secret_key() {
            Some(key) => Arc::new(ChaChaCipher::new(key)?),
            None => Arc::new(Plaintext),
        };

        let name = config.node_name().unwrap_or(&addr).to_string();
        let mut local = NodeRecord::new(config.node_id(), endpoint, name, 1);
        local.tags = config.tags().clone();
        local.services = config.services().to_vec();

        let membership_list = Arc::new(MembershipList::new(local));
        let broadcasts = Arc::new(BroadcastQueue::new(config.gossip_fanout()));
        let (tx, _) = broadcast::channel(config.event_channel_capacity());
        let shutdown = Shutdown::new(tx.clone());

        let state = Arc::new(StateMachine::new(
            &addr,
            membership_list.clone(),
            broadcasts.clone(),
            tx.clone(),
            shutdown.clone(),
            config.gossip_audience().map(str::to_string),
            config.leave_shutdown_delay(),
        ));

        let sync = AntiEntropy::new(
            &addr,
            config.clone(),
            cipher.clone(),
            stream,
            state.clone(),
            tx.clone(),
            shutdown.clone(),
        );

        Ok(Self {
            addr,
            config,
            socket,
            cipher,
            membership_list,
            broadcasts,
            state,
            acks: Arc::new(AckRegistry::new()),
            reconfirm: Arc::new(DashSet::new()),
            tx,
            shutdown,
            sync,
        })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn config(&self) -> &SwimConfig {
        &self.config
    }

    pub fn subscribe(&self) -> Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn membership_list(&self) -> &MembershipList {
        &self.membership_list
    }

    /// Returns a copy of every known member, the local one included.
    pub fn members(&self) -> Vec<NodeRecord> {
        self.membership_list.snapshot()
    }

    /// Whether the node left the cluster and its workers stopped.
    pub fn is_interrupted(&self) -> bool {
        self.shutdown.is_interrupted()
    }

    /// Asks the member called `name` to leave the cluster.
    ///
    /// The local member leaves right away. A remote member is sent a departure record
    /// carrying the incarnation we know, which it only accepts if that is still current.
    /// Returns `false` if no member is called `name`.
    pub async fn leave(&self, name: &str) -> Result<bool> {
        let local = self.membership_list.local_record();
        if local.name == name {
            return Ok(self.state.leave());
        }

        let Some(member) = self.membership_list.find_by_name(name) else {
            tracing::debug!("[{}] no member called {}", &self.addr, name);
            return Ok(false);
        };

        tracing::info!("[{}] asking {} to leave", &self.addr, &member.id);
        let target = member.addr();
        let action = Action::Gossip(Gossip {
            records: vec![member.with_state(NodeState::Left)],
        });
        send_action(&*self.socket, &*self.cipher, action, target).await?;

        Ok(true)
    }

    /// Runs a full table exchange with the member at `target`.
    pub async fn push_pull(&self, target: &str) -> Result<()> {
        self.sync.push_pull(target).await
    }

    /// Starts the push-pull server on `listener`.
    pub fn serve(&self, listener: TcpListener) -> JoinHandle<()> {
        let sync = self.sync.clone();
        tokio::spawn(async move { sync.serve(listener).await })
    }

    /// Spawns the datagram dispatch loop, the periodic workers and the join procedure.
    ///
    /// Every task ends once the node is interrupted.
    pub fn run(&self) -> Vec<JoinHandle<()>> {
        vec![
            self.dispatch(),
            self.run_failure_detection(),
            self.run_dissemination(),
            self.run_full_sync(),
            self.run_reaper(),
            self.join(),
        ]
    }

    fn dispatch(&self) -> JoinHandle<()> {
        let handler = MessageHandler::new(
            &self.addr,
            self.socket.clone(),
            self.cipher.clone(),
            self.state.clone(),
            self.acks.clone(),
            self.reconfirm.clone(),
        );
        let mut signal = self.shutdown.signal();
        let addr = self.addr.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = handler.dispatch_action() => {
                        if let Err(e) = result {
                            tracing::warn!("[{}] failed to handle datagram: {}", &addr, e);
                        }
                    }
                    _ = signal.recv() => break,
                }
            }
        })
    }

    fn run_failure_detection(&self) -> JoinHandle<()> {
        let detector = Arc::new(FailureDetector::new(
            &self.addr,
            self.socket.clone(),
            self.cipher.clone(),
            self.config.clone(),
            self.state.clone(),
            self.acks.clone(),
            self.reconfirm.clone(),
        ));

        spawn_periodic(self.config.ping_interval(), self.shutdown.signal(), move || {
            let detector = detector.clone();
            async move { detector.tick().await }
        })
    }

    fn run_dissemination(&self) -> JoinHandle<()> {
        let disseminator = Arc::new(Disseminator::new(
            &self.addr,
            self.socket.clone(),
            self.cipher.clone(),
            self.config.clone(),
            self.membership_list.clone(),
            self.broadcasts.clone(),
        ));

        spawn_periodic(self.config.gossip_interval(), self.shutdown.signal(), move || {
            let disseminator = disseminator.clone();
            async move {
                disseminator.tick().await;
            }
        })
    }

    fn run_full_sync(&self) -> JoinHandle<()> {
        let sync = self.sync.clone();

        spawn_periodic(self.config.full_sync_interval(), self.shutdown.signal(), move || {
            let sync = sync.clone();
            async move { sync.tick().await }
        })
    }

    fn run_reaper(&self) -> JoinHandle<()> {
        let reaper = Arc::new(SuspicionReaper::new(
            &self.addr,
            self.config.clone(),
            self.state.clone(),
        ));

        spawn_periodic(self.config.reap_interval(), self.shutdown.signal(), move || {
            let reaper = reaper.clone();
            async move { reaper.tick() }
        })
    }

    fn join(&self) -> JoinHandle<()> {
        let sync = self.sync.clone();
        let addr = self.addr.clone();

        tokio::spawn(async move {
            if !sync.join().await {
                tracing::warn!("[{}] interrupted before joining the cluster", &addr);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use crate::{
        api::config::SwimConfig,
        core::event::Event,
        pb::{
            swim_message::{Action, Ping},
            NodeRecord, NodeState,
        },
        test_utils::mocks::{MockStreamLayer, MockUdpSocket},
    };

    use super::SwimNode;

    fn create_node(config: SwimConfig) -> SwimNode<MockUdpSocket> {
        SwimNode::try_new(
            MockUdpSocket::new(),
            config,
            Arc::new(MockStreamLayer::new()),
        )
        .unwrap()
    }

    #[test]
    fn test_swim_node_local_record_from_config() {
        let config = SwimConfig::builder()
            .with_node_id("NODE_A")
            .with_tag("role", "storage")
            .with_services(b"grpc".to_vec())
            .build();
        let node = create_node(config);

        let local = node.membership_list().local_record();
        assert_eq!(local.id, "NODE_A");
        assert_eq!(local.name, "127.0.0.1:8080");
        assert_eq!(local.addr(), node.addr());
        assert_eq!(local.incarnation, 1);
        assert_eq!(local.state(), NodeState::Alive);
        assert_eq!(local.tags.get("role").map(String::as_str), Some("storage"));
        assert_eq!(local.services, b"grpc");
    }

    #[test]
    fn test_swim_node_rejects_unparsable_addr() {
        let result = SwimNode::try_new(
            MockUdpSocket::with_addr("not-an-addr"),
            SwimConfig::new(),
            Arc::new(MockStreamLayer::new()),
        );

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_swim_node_leave_self() {
        let config = SwimConfig::builder()
            .with_node_name("alpha")
            .with_leave_shutdown_delay(Duration::from_millis(10))
            .build();
        let node = create_node(config);
        let mut rx = node.subscribe();

        assert!(node.leave("alpha").await.unwrap());

        assert_eq!(
            node.membership_list().local_record().state(),
            NodeState::Left
        );
        assert!(matches!(rx.recv().await.unwrap(), Event::NodeLeft(_)));
        assert_eq!(rx.recv().await.unwrap(), Event::Interrupt);
        assert!(node.is_interrupted());
    }

    #[tokio::test]
    async fn test_swim_node_leave_remote_member() {
        let node = create_node(SwimConfig::new());
        let addr = "127.0.0.1:8081".parse().unwrap();
        node.membership_list()
            .upsert(NodeRecord::new("NODE_B", addr, "beta", 4));

        assert!(node.leave("beta").await.unwrap());
        assert!(!node.leave("gamma").await.unwrap());

        let (target, action) = &node.socket.transmitted_actions().await[0];
        assert_eq!(target, "127.0.0.1:8081");
        match action {
            Action::Gossip(gossip) => {
                assert_eq!(gossip.records[0].id, "NODE_B");
                assert_eq!(gossip.records[0].incarnation, 4);
                assert_eq!(gossip.records[0].state(), NodeState::Left);
            }
            other => panic!("unexpected {other:?}"),
        }
        // only the target decides about its departure
        assert_eq!(
            node.membership_list().member_state("NODE_B"),
            Some(NodeState::Alive)
        );
    }

    #[tokio::test]
    async fn test_swim_node_run_answers_pings_until_interrupted() {
        let config = SwimConfig::builder()
            .with_node_id("NODE_A")
            .with_node_name("alpha")
            .with_leave_shutdown_delay(Duration::from_millis(10))
            .build();
        let node = create_node(config);
        let handles = node.run();

        node.socket.push_inbound(Action::Ping(Ping {
            from: "127.0.0.1:8081".to_string(),
            from_id: "NODE_B".to_string(),
            target_id: "NODE_A".to_string(),
            seq: 1,
            requested_by: String::new(),
        }));

        tokio::time::timeout(Duration::from_secs(1), async {
            while node.socket.transmitted().await.is_empty() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .unwrap();

        node.leave("alpha").await.unwrap();
        for handle in handles {
            tokio::time::timeout(Duration::from_secs(1), handle)
                .await
                .unwrap()
                .unwrap();
        }
    }
}
