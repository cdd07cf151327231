use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Debounced wake-up trigger for a slot's pull loop.
///
/// Any number of `schedule` calls between two loop iterations coalesce into
/// a single wake-up. `schedule_after` arms at most one delayed wake-up at a
/// time; `cancel` disarms it if it has not fired yet.
pub struct NextCall {
    wake_tx: mpsc::Sender<()>,
    delayed: Mutex<Option<JoinHandle<()>>>,
}

impl NextCall {
    /// Create a trigger and the receiver its owner loops on
    pub fn channel() -> (Self, mpsc::Receiver<()>) {
        let (wake_tx, wake_rx) = mpsc::channel(1);
        (
            Self {
                wake_tx,
                delayed: Mutex::new(None),
            },
            wake_rx,
        )
    }

    /// Request a wake-up. Coalesces with any wake-up already pending.
    pub fn schedule(&self) {
        // A full channel means a wake-up is already queued
        let _ = self.wake_tx.try_send(());
    }

    /// Request a wake-up after a delay. If a delayed wake-up is already
    /// armed, this is a no-op.
    pub fn schedule_after(&self, delay: Duration) {
        let mut delayed = self.delayed.lock().unwrap();
        if let Some(handle) = delayed.as_ref() {
            if !handle.is_finished() {
                return;
            }
        }

        let wake_tx = self.wake_tx.clone();
        *delayed = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = wake_tx.try_send(());
        }));
    }

    /// Disarm a pending delayed wake-up, if any
    pub fn cancel(&self) {
        if let Some(handle) = self.delayed.lock().unwrap().take() {
            handle.abort();
        }
    }
}

impl Drop for NextCall {
    fn drop(&mut self) {
        self.cancel();
    }
}
