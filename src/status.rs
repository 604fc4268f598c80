//! Engine status and its broadcast channel.

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{trace, warn};

/// Per-subscriber buffer. A subscriber that falls further behind loses the
/// oldest updates and resumes from the newest.
pub const STATUS_BUFFER: usize = 64;

/// Observable engine state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    /// The key loop is active.
    pub running: bool,
    /// Both start and stop hotkeys are held.
    pub registered: bool,
    /// Latest failure; cleared by the next successful operation.
    pub last_error: Option<String>,
}

/// Fan-out of [`Status`] transitions to any number of subscribers.
///
/// Publishing never blocks. Identical consecutive values are coalesced.
pub struct StatusChannel {
    current: Mutex<Status>,
    sender: broadcast::Sender<Status>,
}

impl Default for StatusChannel {
    fn default() -> Self {
        Self::new(Status::default())
    }
}

impl StatusChannel {
    pub fn new(initial: Status) -> Self {
        let (sender, _) = broadcast::channel(STATUS_BUFFER);
        Self {
            current: Mutex::new(initial),
            sender,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Status> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn current(&self) -> Status {
        self.lock().clone()
    }

    /// Replace the status. Returns `false` when nothing changed.
    pub fn publish(&self, status: Status) -> bool {
        self.update(|current| *current = status)
    }

    /// Apply `update` to the current status and publish the result.
    pub fn update<F>(&self, update: F) -> bool
    where
        F: FnOnce(&mut Status),
    {
        let mut current = self.lock();
        let mut next = current.clone();
        update(&mut next);
        if *current == next {
            return false;
        }
        *current = next.clone();
        if self.sender.send(next).is_err() {
            trace!("no status subscribers");
        }
        true
    }

    /// Subscribe: the stream yields the current status first, then every
    /// later transition.
    pub fn subscribe(&self) -> StatusStream {
        let current = self.lock();
        StatusStream {
            initial: Some(current.clone()),
            receiver: self.sender.subscribe(),
        }
    }
}

/// One subscriber's view of a [`StatusChannel`].
pub struct StatusStream {
    initial: Option<Status>,
    receiver: broadcast::Receiver<Status>,
}

impl StatusStream {
    /// Next status, or `None` once the channel is gone.
    pub async fn recv(&mut self) -> Option<Status> {
        if let Some(initial) = self.initial.take() {
            return Some(initial);
        }
        loop {
            match self.receiver.recv().await {
                Ok(status) => return Some(status),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "status subscriber lagged, skipping to newest");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`StatusStream::recv`].
    pub fn try_recv(&mut self) -> Option<Status> {
        if let Some(initial) = self.initial.take() {
            return Some(initial);
        }
        loop {
            match self.receiver.try_recv() {
                Ok(status) => return Some(status),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "status subscriber lagged, skipping to newest");
                }
                Err(_) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running(flag: bool) -> Status {
        Status {
            running: flag,
            registered: true,
            last_error: None,
        }
    }

    #[tokio::test]
    async fn test_subscriber_gets_current_then_future() {
        let channel = StatusChannel::default();
        channel.publish(running(false));

        let mut stream = channel.subscribe();
        channel.publish(running(true));

        assert_eq!(stream.recv().await, Some(running(false)));
        assert_eq!(stream.recv().await, Some(running(true)));
        assert_eq!(stream.try_recv(), None);
    }

    #[test]
    fn test_late_subscriber_does_not_see_history() {
        let channel = StatusChannel::default();
        channel.publish(running(true));
        channel.publish(running(false));

        let mut stream = channel.subscribe();
        assert_eq!(stream.try_recv(), Some(running(false)));
        assert_eq!(stream.try_recv(), None);
    }

    #[test]
    fn test_identical_status_is_coalesced() {
        let channel = StatusChannel::default();
        let mut stream = channel.subscribe();
        stream.try_recv();

        assert!(channel.publish(running(true)));
        assert!(!channel.publish(running(true)));
        assert!(!channel.update(|s| s.running = true));

        assert_eq!(stream.try_recv(), Some(running(true)));
        assert_eq!(stream.try_recv(), None);
    }

    #[test]
    fn test_slow_subscriber_does_not_block_publisher() {
        let channel = StatusChannel::default();
        let mut stream = channel.subscribe();
        stream.try_recv();

        for i in 0..(STATUS_BUFFER * 3) {
            channel.update(|s| s.last_error = Some(format!("error {i}")));
        }

        let mut last = None;
        while let Some(status) = stream.try_recv() {
            last = Some(status);
        }
        let expected = format!("error {}", STATUS_BUFFER * 3 - 1);
        assert_eq!(last.and_then(|s| s.last_error), Some(expected));
    }

    #[test]
    fn test_serializes_camel_case() {
        let status = Status {
            running: true,
            registered: false,
            last_error: Some("target window closed".into()),
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["lastError"], "target window closed");
        assert_eq!(json["running"], true);
    }
}
