use tokio::sync::watch;

/// Sending half of the shutdown signal.
pub type ShutdownTx = watch::Sender<()>;

/// Receiving half of the shutdown signal.
///
/// The orchestrator checks it between cycles and while sleeping; a cycle that
/// is already running finishes before the loop exits, so watermarks and the
/// record store stay consistent.
pub type ShutdownRx = watch::Receiver<()>;

/// Creates a shutdown channel. Triggering is `tx.send(())`; every receiver
/// clone observes it.
pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    watch::channel(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn receivers_observe_a_sent_shutdown() {
        let (tx, mut rx) = create_shutdown_channel();
        let mut cloned = rx.clone();
        assert!(!rx.has_changed().unwrap());

        tx.send(()).unwrap();

        assert!(rx.has_changed().unwrap());
        cloned.changed().await.unwrap();
    }

    #[test]
    fn a_dropped_sender_reads_as_shutdown() {
        let (tx, rx) = create_shutdown_channel();
        drop(tx);
        assert!(rx.has_changed().is_err());
    }
}
