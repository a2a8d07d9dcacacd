use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use prost::Message;
use snafu::location;
use tokio::sync::{mpsc, Mutex};

use crate::core::transport::{StreamLayer, TransportLayer};
use crate::error::{Error, Result};
use crate::pb::{swim_message::Action, NodeRecord, PushPull, SwimMessage};

/// Datagram transport that records every outbound message.
/// Payloads are expected to be unencrypted.
#[derive(Clone, Debug)]
pub(crate) struct MockUdpSocket {
    addr: String,
    transmitted: Arc<Mutex<Vec<(String, SwimMessage)>>>,
    unreachable: Arc<Mutex<HashSet<String>>>,
    inbound_tx: mpsc::UnboundedSender<Vec<u8>>,
    inbound_rx: Arc<Mutex<mpsc::UnboundedReceiver<Vec<u8>>>>,
}

impl MockUdpSocket {
    pub(crate) fn new() -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        Self {
            addr: "127.0.0.1:8080".to_string(),
            transmitted: Arc::default(),
            unreachable: Arc::default(),
            inbound_tx,
            inbound_rx: Arc::new(Mutex::new(inbound_rx)),
        }
    }

    /// A socket reporting `addr` as its local address.
    pub(crate) fn with_addr(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            ..Self::new()
        }
    }

    pub(crate) async fn transmitted(&self) -> Vec<(String, SwimMessage)> {
        let tx = self.transmitted.lock().await;
        (*tx).clone()
    }

    /// Returns the transmitted actions only.
    pub(crate) async fn transmitted_actions(&self) -> Vec<(String, Action)> {
        self.transmitted()
            .await
            .into_iter()
            .filter_map(|(target, message)| message.action.map(|action| (target, action)))
            .collect()
    }

    /// Makes every send to `target` fail as unreachable.
    pub(crate) async fn set_unreachable(&self, target: impl Into<String>) {
        self.unreachable.lock().await.insert(target.into());
    }

    /// Queues a datagram to be returned by the next `recv`.
    pub(crate) fn push_inbound(&self, action: Action) {
        let buf = SwimMessage::from(action).encode_to_vec();
        let _ = self.inbound_tx.send(buf);
    }
}

#[async_trait]
impl TransportLayer for MockUdpSocket {
    async fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        let mut rx = self.inbound_rx.lock().await;
        let datagram = rx.recv().await.ok_or_else(|| Error::Io {
            message: "mock socket closed".to_string(),
            location: location!(),
        })?;

        let len = datagram.len().min(buf.len());
        buf[..len].copy_from_slice(&datagram[..len]);
        Ok(len)
    }

    async fn send_to(&self, buf: &[u8], target: &str) -> Result<usize> {
        if self.unreachable.lock().await.contains(target) {
            return Err(Error::Unreachable {
                message: format!("{target} is unreachable"),
                location: location!(),
            });
        }

        let message = SwimMessage::decode(buf)?;
        self.transmitted
            .lock()
            .await
            .push((target.to_string(), message));

        Ok(buf.len())
    }

    fn local_addr(&self) -> Result<String> {
        Ok(self.addr.clone())
    }
}

/// Push-pull channel answering every request with a fixed table.
#[derive(Debug, Default)]
pub(crate) struct MockStreamLayer {
    reply: Mutex<Option<Vec<NodeRecord>>>,
    requests: Mutex<Vec<(String, PushPull)>>,
}

impl MockStreamLayer {
    /// A channel where every peer is unreachable.
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_reply(members: Vec<NodeRecord>) -> Self {
        Self {
            reply: Mutex::new(Some(members)),
            requests: Mutex::default(),
        }
    }

    pub(crate) async fn requests(&self) -> Vec<(String, PushPull)> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl StreamLayer for MockStreamLayer {
    async fn request(&self, target: &str, payload: &[u8]) -> Result<Vec<u8>> {
        let request = PushPull::decode(payload)?;
        self.requests
            .lock()
            .await
            .push((target.to_string(), request));

        match &*self.reply.lock().await {
            Some(members) => Ok(PushPull {
                from: target.to_string(),
                members: members.clone(),
            }
            .encode_to_vec()),
            None => Err(Error::Unreachable {
                message: format!("{target} is unreachable"),
                location: location!(),
            }),
        }
    }
}
