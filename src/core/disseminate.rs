use std::sync::Arc;

use crate::api::config::SwimConfig;
use crate::pb::swim_message::{Action, Gossip};

use super::broadcast::BroadcastQueue;
use super::crypto::Cipher;
use super::member::MembershipList;
use super::transport::TransportLayer;
use super::utils::send_action;

/// Pushes queued broadcasts to a random subset of peers.
#[derive(Debug)]
pub(crate) struct Disseminator<T: TransportLayer> {
    addr: String,
    socket: Arc<T>,
    cipher: Arc<dyn Cipher>,
    config: Arc<SwimConfig>,
    membership_list: Arc<MembershipList>,
    broadcasts: Arc<BroadcastQueue>,
}

impl<T: TransportLayer> Disseminator<T> {
    pub(crate) fn new(
        addr: impl Into<String>,
        socket: Arc<T>,
        cipher: Arc<dyn Cipher>,
        config: Arc<SwimConfig>,
        membership_list: Arc<MembershipList>,
        broadcasts: Arc<BroadcastQueue>,
    ) -> Self {
        Self {
            addr: addr.into(),
            socket,
            cipher,
            config,
            membership_list,
            broadcasts,
        }
    }

    /// One gossip round. Returns the number of datagrams sent.
    pub(crate) async fn tick(&self) -> usize {
        if self.broadcasts.is_empty() {
            return 0;
        }

        let peers =
            self.membership_list
                .get_random_member_list(self.config.gossip_fanout(), None, |_| true);

        let mut sent = 0;
        for peer in peers {
            let records = self
                .broadcasts
                .drain_for_dissemination(self.config.gossip_max_bytes(), &peer.tags);
            if records.is_empty() {
                continue;
            }

            tracing::trace!(
                "[{}] gossiping {} updates to {}",
                &self.addr,
                records.len(),
                peer.addr()
            );
            let action = Action::Gossip(Gossip { records });
            match send_action(&*self.socket, &*self.cipher, action, peer.addr()).await {
                Ok(()) => sent += 1,
                Err(e) => tracing::warn!("[{}] failed to gossip to {}: {}", &self.addr, &peer.id, e),
            }
        }

        sent
    }
}
