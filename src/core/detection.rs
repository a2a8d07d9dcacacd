use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use tokio::sync::oneshot;

use crate::api::config::SwimConfig;
use crate::core::utils::send_action;
use crate::pb::swim_message::{Action, Ping, PingReq};
use crate::pb::{NodeRecord, NodeState};

use super::crypto::Cipher;
use super::state::StateMachine;
use super::transport::TransportLayer;

/// Outstanding probes keyed by sequence number.
///
/// A late ACK for a sequence that already timed out finds no entry and is dropped.
#[derive(Debug, Default)]
pub(crate) struct AckRegistry {
    seq: AtomicU64,
    pending: DashMap<u64, oneshot::Sender<()>>,
}

impl AckRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&self) -> (u64, oneshot::Receiver<()>) {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let (tx, rx) = oneshot::channel();
        self.pending.insert(seq, tx);

        (seq, rx)
    }

    /// Completes the probe waiting for `seq`. Returns false for unknown or expired sequences.
    pub(crate) fn complete(&self, seq: u64) -> bool {
        match self.pending.remove(&seq) {
            Some((_, tx)) => tx.send(()).is_ok(),
            None => false,
        }
    }

    pub(crate) fn remove(&self, seq: u64) {
        self.pending.remove(&seq);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum ProbeResult {
    /// The target answered, directly or through a relay.
    Alive,
    /// Nobody answered in time.
    Suspected,
    /// The PING could not be sent. Membership was left untouched.
    SendFailed,
}

#[derive(Debug)]
pub(crate) struct FailureDetector<T: TransportLayer> {
    addr: String,
    socket: Arc<T>,
    cipher: Arc<dyn Cipher>,
    config: Arc<SwimConfig>,
    state: Arc<StateMachine>,
    acks: Arc<AckRegistry>,
    /// Suspected members we heard from directly since the last tick.
    reconfirm: Arc<DashSet<String>>,
}

impl<T: TransportLayer> Clone for FailureDetector<T> {
    fn clone(&self) -> Self {
        Self {
            addr: self.addr.clone(),
            socket: self.socket.clone(),
            cipher: self.cipher.clone(),
            config: self.config.clone(),
            state: self.state.clone(),
            acks: self.acks.clone(),
            reconfirm: self.reconfirm.clone(),
        }
    }
}

impl<T: TransportLayer> FailureDetector<T> {
    pub(crate) fn new(
        addr: impl Into<String>,
        socket: Arc<T>,
        cipher: Arc<dyn Cipher>,
        config: Arc<SwimConfig>,
        state: Arc<StateMachine>,
        acks: Arc<AckRegistry>,
        reconfirm: Arc<DashSet<String>>,
    ) -> Self {
        Self {
            addr: addr.into(),
            socket,
            cipher,
            config,
            state,
            acks,
            reconfirm,
        }
    }

    /// One failure detection round: members awaiting reconfirmation first, then one random
    /// member that has not left.
    pub(crate) async fn tick(&self) {
        let membership_list = self.state.membership_list();

        let reconfirm: Vec<String> = self.reconfirm.iter().map(|id| id.key().clone()).collect();
        self.reconfirm.clear();

        for id in reconfirm {
            let record = membership_list
                .get(&id)
                .filter(|r| r.state() != NodeState::Left);
            if let Some(record) = record {
                tracing::debug!("[{}] re-probing {}", &self.addr, &id);
                self.probe(&record).await;
            }
        }

        let target = membership_list
            .get_random_member_list(1, None, |r| r.state() != NodeState::Left)
            .pop();

        if let Some(target) = target {
            self.probe(&target).await;
        }
    }

    /// Probes `target` directly and falls back to indirect probing.
    pub(crate) async fn probe(&self, target: &NodeRecord) -> ProbeResult {
        let (seq, rx) = self.acks.register();
        let local_id = self.state.membership_list().local_id().to_string();

        let action = Action::Ping(Ping {
            from: self.addr.clone(),
            from_id: local_id,
            target_id: target.id.clone(),
            seq,
            requested_by: String::new(),
        });

        tracing::debug!("[{}] sending PING to {}", &self.addr, target.addr());
        if let Err(e) = send_action(&*self.socket, &*self.cipher, action, target.addr()).await {
            self.acks.remove(seq);

            if !e.is_unreachable() {
                tracing::error!("[{}] failed to PING {}: {}", &self.addr, &target.id, e);
                return ProbeResult::SendFailed;
            }

            tracing::debug!("[{}] {} is unreachable: {}", &self.addr, &target.id, e);
            return self.probe_indirect(target).await;
        }

        match tokio::time::timeout(self.config.ping_timeout(), rx).await {
            Ok(Ok(())) => {
                self.state.observe_alive(target, true);
                ProbeResult::Alive
            }
            _ => {
                self.acks.remove(seq);
                self.probe_indirect(target).await
            }
        }
    }

    async fn probe_indirect(&self, target: &NodeRecord) -> ProbeResult {
        let relays = self.state.membership_list().get_random_member_list(
            self.config.ping_req_group_size(),
            Some(&target.id),
            |r| r.state() == NodeState::Alive,
        );

        if relays.is_empty() {
            tracing::debug!("[{}] no relays available for {}", &self.addr, &target.id);
            self.state.observe_suspect(target);
            return ProbeResult::Suspected;
        }

        let (seq, rx) = self.acks.register();

        for relay in relays {
            let action = Action::PingReq(PingReq {
                from: self.addr.clone(),
                seq,
                target_id: target.id.clone(),
                target_addr: target.addr(),
            });

            let addr = self.addr.clone();
            let socket = self.socket.clone();
            let cipher = self.cipher.clone();

            tokio::spawn(async move {
                tracing::debug!("[{}] sending PING_REQ to {}", &addr, relay.addr());
                if let Err(e) = send_action(&*socket, &*cipher, action, relay.addr()).await {
                    tracing::warn!("[{}] failed to send PING_REQ to {}: {}", &addr, &relay.id, e);
                }
            });
        }

        match tokio::time::timeout(self.config.ping_req_timeout(), rx).await {
            Ok(Ok(())) => {
                self.state.observe_alive(target, true);
                ProbeResult::Alive
            }
            _ => {
                self.acks.remove(seq);
                tracing::info!("[{}] no ACK from {}, suspecting", &self.addr, &target.id);
                self.state.observe_suspect(target);
                ProbeResult::Suspected
            }
        }
    }
}
