use std::sync::Arc;

use dashmap::DashSet;

use crate::{
    api::config::DEFAULT_BUFFER_SIZE,
    error::Result,
    pb::{
        swim_message::{Ack, Action, Gossip, Ping, PingReq},
        NodeState,
    },
};

use super::crypto::Cipher;
use super::detection::AckRegistry;
use super::state::StateMachine;
use super::transport::TransportLayer;
use super::utils::{decode_action, send_action};

/// Answers probes, relays indirect probes and applies gossip.
#[derive(Debug)]
pub(crate) struct MessageHandler<T: TransportLayer> {
    addr: String,
    socket: Arc<T>,
    cipher: Arc<dyn Cipher>,
    state: Arc<StateMachine>,
    acks: Arc<AckRegistry>,
    reconfirm: Arc<DashSet<String>>,
}

impl<T: TransportLayer> MessageHandler<T> {
    pub(crate) fn new(
        addr: impl Into<String>,
        socket: Arc<T>,
        cipher: Arc<dyn Cipher>,
        state: Arc<StateMachine>,
        acks: Arc<AckRegistry>,
        reconfirm: Arc<DashSet<String>>,
    ) -> Self {
        Self {
            addr: addr.into(),
            socket,
            cipher,
            state,
            acks,
            reconfirm,
        }
    }

    /// Receives and handles a single datagram.
    pub(crate) async fn dispatch_action(&self) -> Result<()> {
        let mut buf = [0u8; DEFAULT_BUFFER_SIZE];
        let len = self.socket.recv(&mut buf).await?;
        let action = decode_action(&*self.cipher, &buf[..len])?;

        self.handle_action(action).await
    }

    pub(crate) async fn handle_action(&self, action: Action) -> Result<()> {
        match action {
            Action::Ping(v) => self.handle_ping(&v).await,
            Action::PingReq(v) => self.handle_ping_req(&v).await,
            Action::Ack(v) => {
                self.handle_ack(&v);
                Ok(())
            }
            Action::Gossip(v) => {
                self.handle_gossip(&v);
                Ok(())
            }
        }
    }

    pub(crate) async fn handle_ping(&self, action: &Ping) -> Result<()> {
        tracing::trace!("[{}] handling {action:?}", &self.addr);

        let local_id = self.state.membership_list().local_id();
        if !action.target_id.is_empty() && action.target_id != local_id {
            tracing::debug!(
                "[{}] dropping PING for {} from {}",
                &self.addr,
                &action.target_id,
                &action.from
            );
            return Ok(());
        }

        if matches!(
            self.state.membership_list().member_state(&action.from_id),
            Some(NodeState::Suspect | NodeState::Dead)
        ) {
            self.reconfirm.insert(action.from_id.clone());
        }

        let message = Action::Ack(Ack {
            from: self.addr.clone(),
            seq: action.seq,
        });

        // A relayed PING is answered straight to the member that asked for it.
        let target = match action.requested_by.is_empty() {
            true => &action.from,
            false => &action.requested_by,
        };

        send_action(&*self.socket, &*self.cipher, message, target).await
    }

    pub(crate) async fn handle_ping_req(&self, action: &PingReq) -> Result<()> {
        tracing::trace!("[{}] handling {action:?}", &self.addr);

        let message = Action::Ping(Ping {
            from: self.addr.clone(),
            from_id: self.state.membership_list().local_id().to_string(),
            target_id: action.target_id.clone(),
            seq: action.seq,
            requested_by: action.from.clone(),
        });

        send_action(&*self.socket, &*self.cipher, message, &action.target_addr).await
    }

    pub(crate) fn handle_ack(&self, action: &Ack) {
        if !self.acks.complete(action.seq) {
            tracing::trace!(
                "[{}] ignoring late ACK {} from {}",
                &self.addr,
                action.seq,
                &action.from
            );
        }
    }

    pub(crate) fn handle_gossip(&self, action: &Gossip) {
        tracing::trace!(
            "[{}] applying {} gossiped records",
            &self.addr,
            action.records.len()
        );

        for record in &action.records {
            self.state.apply(record);
        }
    }
}
