use std::sync::Arc;

use parking_lot::Mutex;
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::broadcast::Receiver;
use tokio::task::JoinHandle;

use crate::core::event::Event;
use crate::core::member::MembershipList;
use crate::core::node::SwimNode;
use crate::core::transport::TcpStreamLayer;
use crate::error::Result;
use crate::pb::NodeRecord;

use super::config::SwimConfig;
use super::init_tracing;

/// A cluster member on real sockets: UDP for probes and gossip, TCP on the same port
/// for push-pull exchanges.
#[derive(Clone, Debug)]
pub struct SwimCluster {
    node: Arc<SwimNode<UdpSocket>>,
    listener: Arc<Mutex<Option<TcpListener>>>,
}

impl SwimCluster {
    /// Binds both sockets. Use port `0` to let the OS pick one.
    pub async fn try_new(addr: impl AsRef<str>, config: SwimConfig) -> Result<Self> {
        let socket = UdpSocket::bind(addr.as_ref()).await?;
        let listener = TcpListener::bind(socket.local_addr()?).await?;
        let node = Arc::new(SwimNode::try_new(
            socket,
            config,
            Arc::new(TcpStreamLayer),
        )?);

        Ok(Self {
            node,
            listener: Arc::new(Mutex::new(Some(listener))),
        })
    }

    pub fn addr(&self) -> &str {
        self.node.addr()
    }

    pub fn config(&self) -> &SwimConfig {
        self.node.config()
    }

    pub fn subscribe(&self) -> Receiver<Event> {
        self.node.subscribe()
    }

    pub fn membership_list(&self) -> &MembershipList {
        self.node.membership_list()
    }

    /// Lists the current members, this one included.
    pub fn members(&self) -> Vec<NodeRecord> {
        self.node.members()
    }

    /// Makes the member called `name` leave the cluster. See [`SwimNode::leave`].
    pub async fn leave(&self, name: &str) -> Result<bool> {
        self.node.leave(name).await
    }

    /// Runs a full table exchange with the member at `target`.
    pub async fn push_pull(&self, target: &str) -> Result<()> {
        self.node.push_pull(target).await
    }

    /// Starts the node in the background and returns the handles of its tasks.
    ///
    /// The push-pull server is only started by the first call.
    pub async fn run(&self) -> Vec<JoinHandle<()>> {
        init_tracing();

        tracing::info!("[{}] starting SwimNode...", self.node.addr());
        let mut handles = self.node.run();
        if let Some(listener) = self.listener.lock().take() {
            handles.push(self.node.serve(listener));
        }

        handles
    }
}
