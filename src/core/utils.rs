use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use prost::Message;
use snafu::location;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::{Error, Result};
use crate::pb::swim_message::Action;
use crate::pb::SwimMessage;

use super::crypto::Cipher;
use super::shutdown::ShutdownSignal;
use super::transport::TransportLayer;

/// Encrypts and sends a single message as one datagram.
pub(crate) async fn send_action<T: TransportLayer>(
    socket: &T,
    cipher: &dyn Cipher,
    action: Action,
    target: impl AsRef<str>,
) -> Result<()> {
    let buf = SwimMessage::from(action).encode_to_vec();
    let buf = cipher.encrypt(&buf)?;

    socket.send_to(&buf, target.as_ref()).await?;

    Ok(())
}

/// Decrypts and decodes a datagram.
pub(crate) fn decode_action(cipher: &dyn Cipher, buf: &[u8]) -> Result<Action> {
    let buf = cipher.decrypt(buf)?;
    let message = SwimMessage::decode(&*buf)?;

    message.action.ok_or_else(|| Error::InvalidData {
        message: "Message must contain an 'action'".to_string(),
        location: location!(),
    })
}

/// Wall clock time in milliseconds since the unix epoch.
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Runs `on_tick` every `period` until the interrupt fires.
pub(crate) fn spawn_periodic<F, Fut>(
    period: Duration,
    mut shutdown: ShutdownSignal,
    mut on_tick: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => on_tick().await,
                _ = shutdown.recv() => break,
            }
        }
    })
}
