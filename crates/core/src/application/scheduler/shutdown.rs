// Drain-aware stop signal for the polling loop
//
// Stopping never aborts work: the scheduler reacts by dispatching nothing
// new and draining what is already in flight. The signal is therefore
// level-triggered, not edge-triggered - once stopped, `stopped()` keeps
// resolving immediately no matter when the receiver starts listening.

use tokio::sync::watch;

/// Receiving half held by the scheduler loop.
#[derive(Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    /// Has a stop been requested? Checked at the top of every tick so the
    /// loop stops dispatching even when it never awaits `stopped()`.
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once a stop has been requested, including a request that
    /// landed before this call.
    pub async fn stopped(&mut self) {
        if !self.is_stopped() {
            let _ = self.rx.changed().await;
        }
    }
}

/// Sending half held by the daemon's signal handler.
pub struct StopHandle {
    tx: watch::Sender<bool>,
}

impl StopHandle {
    /// Request a drain-and-stop. Idempotent; in-flight polls still run to
    /// completion after this returns.
    pub fn stop(&self) {
        let _ = self.tx.send(true);
    }
}

pub fn stop_channel() -> (StopHandle, StopSignal) {
    let (tx, rx) = watch::channel(false);
    (StopHandle { tx }, StopSignal { rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stop_before_listening_still_resolves() {
        let (handle, mut signal) = stop_channel();
        handle.stop();
        // Must not hang: the level was already set when we start waiting.
        signal.stopped().await;
        assert!(signal.is_stopped());
    }

    #[tokio::test]
    async fn stop_is_visible_to_every_clone() {
        let (handle, signal) = stop_channel();
        let mut other = signal.clone();
        assert!(!other.is_stopped());
        handle.stop();
        handle.stop(); // idempotent
        other.stopped().await;
        assert!(signal.is_stopped());
    }
}
