//! One-shot cancellation signal
//!
//! A `Trigger` fires once; every `Signal` cloned from it observes the
//! firing, including ones created afterwards. Dropping the trigger counts
//! as firing, so a task that dies without signalling never strands its
//! waiters.

use tokio::sync::watch;

/// Firing side
#[derive(Debug)]
pub struct Trigger {
    tx: watch::Sender<bool>,
}

/// Observing side
#[derive(Debug, Clone)]
pub struct Signal {
    rx: watch::Receiver<bool>,
}

/// Create a linked trigger/signal pair
pub fn channel() -> (Trigger, Signal) {
    let (tx, rx) = watch::channel(false);
    (Trigger { tx }, Signal { rx })
}

impl Trigger {
    /// Fire the signal. Later calls are no-ops.
    pub fn fire(&self) {
        self.tx.send_replace(true);
    }

    pub fn subscribe(&self) -> Signal {
        Signal {
            rx: self.tx.subscribe(),
        }
    }

    pub fn is_fired(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Signal {
    /// Wait until the trigger fires or is dropped
    pub async fn fired(&mut self) {
        let _ = self.rx.wait_for(|fired| *fired).await;
    }

    pub fn is_fired(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }
}
