use std::time::Duration;

use tokio::sync::{broadcast, watch};

use super::event::Event;

/// The process wide interrupt observed by every periodic worker.
#[derive(Clone, Debug)]
pub(crate) struct Shutdown {
    tx: watch::Sender<bool>,
    events: broadcast::Sender<Event>,
}

impl Shutdown {
    pub(crate) fn new(events: broadcast::Sender<Event>) -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx, events }
    }

    pub(crate) fn is_interrupted(&self) -> bool {
        *self.tx.borrow()
    }

    pub(crate) fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Flags the interrupt and publishes [`Event::Interrupt`]. Later calls are no-ops.
    pub(crate) fn interrupt(&self) {
        let changed = self.tx.send_if_modified(|interrupted| {
            let changed = !*interrupted;
            *interrupted = true;
            changed
        });

        if changed {
            let _ = self.events.send(Event::Interrupt);
        }
    }

    /// Interrupts after `delay`. The timer cannot be cancelled once scheduled.
    pub(crate) fn interrupt_after(&self, delay: Duration) {
        let shutdown = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            shutdown.interrupt();
        });
    }
}

/// Receiving half of [`Shutdown`].
#[derive(Clone, Debug)]
pub(crate) struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub(crate) fn is_interrupted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the interrupt fires.
    pub(crate) async fn recv(&mut self) {
        let _ = self.rx.wait_for(|interrupted| *interrupted).await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::broadcast;

    use crate::core::event::Event;

    use super::Shutdown;

    #[tokio::test]
    async fn test_shutdown_interrupt_after() {
        let (tx, mut rx) = broadcast::channel(8);
        let shutdown = Shutdown::new(tx);
        let mut signal = shutdown.signal();

        shutdown.interrupt_after(Duration::from_millis(10));
        assert!(!signal.is_interrupted());

        tokio::time::timeout(Duration::from_secs(1), signal.recv())
            .await
            .unwrap();
        assert!(shutdown.is_interrupted());
        assert_eq!(rx.recv().await.unwrap(), Event::Interrupt);

        shutdown.interrupt();
        assert!(rx.try_recv().is_err());
    }
}
