//! Collapsing bursts of resize notifications into one resize.

use std::time::Duration;

use tokio::sync::mpsc;

/// Sending half handed to whatever observes element size changes.
#[derive(Clone, Debug)]
pub struct ResizeDebouncer {
    sender: mpsc::UnboundedSender<()>,
}

impl ResizeDebouncer {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<()>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Records a resize notification. Returns `false` once the receiving
    /// side has shut down.
    pub fn notify(&self) -> bool {
        self.sender.send(()).is_ok()
    }
}

/// Runs `on_fire` once for every burst of notifications separated by at
/// least `window` of quiet. Each new notification restarts the window.
///
/// Completes when every sender has been dropped; a burst still pending at
/// that point fires before returning.
pub async fn debounce<F>(mut receiver: mpsc::UnboundedReceiver<()>, window: Duration, mut on_fire: F)
where
    F: FnMut(),
{
    while receiver.recv().await.is_some() {
        loop {
            tokio::select! {
                next = receiver.recv() => {
                    if next.is_none() {
                        break;
                    }
                }
                () = tokio::time::sleep(window) => break,
            }
        }
        on_fire();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn burst_fires_once() {
        let (debouncer, receiver) = ResizeDebouncer::channel();
        let fired = Cell::new(0);

        let producer = async move {
            for _ in 0..5 {
                debouncer.notify();
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
            debouncer.notify();
        };
        let consumer = debounce(receiver, Duration::from_millis(100), || {
            fired.set(fired.get() + 1)
        });
        tokio::join!(producer, consumer);

        assert_eq!(fired.get(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn spaced_notifications_fire_separately() {
        let (debouncer, receiver) = ResizeDebouncer::channel();
        let fired = Cell::new(0);

        let producer = async move {
            for _ in 0..3 {
                debouncer.notify();
                tokio::time::sleep(Duration::from_millis(300)).await;
            }
        };
        let consumer = debounce(receiver, Duration::from_millis(100), || {
            fired.set(fired.get() + 1)
        });
        tokio::join!(producer, consumer);

        assert_eq!(fired.get(), 3);
    }
}
