use std::net::SocketAddr;
use std::sync::Arc;

use prost::Message;
use rand::{seq::SliceRandom, thread_rng};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::api::config::SwimConfig;
use crate::error::Result;
use crate::pb::{NodeState, PushPull};

use super::crypto::Cipher;
use super::event::Event;
use super::shutdown::Shutdown;
use super::state::StateMachine;
use super::transport::{read_frame, write_frame, StreamLayer};

/// Full table exchanges with a single peer.
///
/// Used to join through the seed list, periodically to repair what gossip missed,
/// and to answer the exchanges other members start.
#[derive(Clone, Debug)]
pub(crate) struct AntiEntropy {
    addr: String,
    config: Arc<SwimConfig>,
    cipher: Arc<dyn Cipher>,
    stream: Arc<dyn StreamLayer>,
    state: Arc<StateMachine>,
    events: broadcast::Sender<Event>,
    shutdown: Shutdown,
}

impl AntiEntropy {
    pub(crate) fn new(
        addr: impl Into<String>,
        config: Arc<SwimConfig>,
        cipher: Arc<dyn Cipher>,
        stream: Arc<dyn StreamLayer>,
        state: Arc<StateMachine>,
        events: broadcast::Sender<Event>,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            addr: addr.into(),
            config,
            cipher,
            stream,
            state,
            events,
            shutdown,
        }
    }

    /// Contacts the seeds until another member is known.
    ///
    /// Returns `false` if the node was interrupted before it could join.
    pub(crate) async fn join(&self) -> bool {
        let local = self.state.membership_list().local_record().addr();

        let mut seeds: Vec<SocketAddr> = self
            .config
            .known_peers()
            .iter()
            .filter_map(|seed| match seed.parse::<SocketAddr>() {
                Ok(addr) => Some(addr),
                Err(e) => {
                    tracing::warn!("[{}] skipping invalid seed {}: {}", &self.addr, seed, e);
                    None
                }
            })
            .filter(|addr| addr.to_string() != local)
            .collect();

        if seeds.is_empty() {
            tracing::info!("[{}] no seeds to contact, bootstrapping the cluster", &self.addr);
            return true;
        }

        seeds.shuffle(&mut thread_rng());
        let mut signal = self.shutdown.signal();

        loop {
            for seed in &seeds {
                if signal.is_interrupted() {
                    return false;
                }

                let seed = seed.to_string();
                if let Err(e) = self.push_pull(&seed).await {
                    tracing::warn!("[{}] failed to join through {}: {}", &self.addr, &seed, e);
                }

                if self.state.membership_list().len() > 1 {
                    tracing::info!("[{}] joined the cluster through {}", &self.addr, &seed);
                    return true;
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.join_backoff()) => {}
                _ = signal.recv() => return false,
            }
        }
    }

    /// Sends our table to `target` and merges the reply.
    pub(crate) async fn push_pull(&self, target: &str) -> Result<()> {
        tracing::debug!("[{}] starting push-pull with {}", &self.addr, target);

        let payload = self.encode_snapshot()?;
        let reply = tokio::time::timeout(
            self.config.push_pull_timeout(),
            self.stream.request(target, &payload),
        )
        .await??;

        let remote = PushPull::decode(&*self.cipher.decrypt(&reply)?)?;
        self.receive(remote);

        Ok(())
    }

    /// One periodic full sync with a random `Alive` peer.
    pub(crate) async fn tick(&self) {
        let peer = self
            .state
            .membership_list()
            .get_random_member_list(1, None, |r| r.state() == NodeState::Alive)
            .pop();

        if let Some(peer) = peer {
            if let Err(e) = self.push_pull(&peer.addr()).await {
                tracing::warn!("[{}] full sync with {} failed: {}", &self.addr, &peer.id, e);
            }
        }
    }

    /// Accepts push-pull connections until interrupted.
    pub(crate) async fn serve(&self, listener: TcpListener) {
        let mut signal = self.shutdown.signal();

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((mut stream, peer)) => {
                        let sync = self.clone();
                        tokio::spawn(async move {
                            if let Err(e) = sync.handle_connection(&mut stream).await {
                                tracing::warn!("[{}] push-pull from {} failed: {}", &sync.addr, peer, e);
                            }
                        });
                    }
                    Err(e) => tracing::error!("[{}] failed to accept connection: {}", &self.addr, e),
                },
                _ = signal.recv() => break,
            }
        }
    }

    pub(crate) async fn handle_connection<S>(&self, stream: &mut S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let request =
            tokio::time::timeout(self.config.push_pull_timeout(), read_frame(stream)).await??;
        let reply = self.handle_request(&request)?;

        write_frame(stream, &reply).await
    }

    /// Answers an inbound exchange with our table, then merges the caller's.
    pub(crate) fn handle_request(&self, payload: &[u8]) -> Result<Vec<u8>> {
        let remote = PushPull::decode(&*self.cipher.decrypt(payload)?)?;
        let reply = self.encode_snapshot()?;

        self.receive(remote);

        Ok(reply)
    }

    fn encode_snapshot(&self) -> Result<Vec<u8>> {
        let local = PushPull {
            from: self.addr.clone(),
            members: self.state.membership_list().snapshot(),
        };

        self.cipher.encrypt(&local.encode_to_vec())
    }

    fn receive(&self, remote: PushPull) {
        tracing::debug!(
            "[{}] received {} records from {}",
            &self.addr,
            remote.members.len(),
            &remote.from
        );

        let _ = self
            .events
            .send(Event::new_inbound_sync(&remote.from, remote.members.clone()));
        self.state.merge(&remote.members);
    }
}
