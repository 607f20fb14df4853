//! Typing indicator debouncer.
//!
//! The first keystroke of a burst sends `typing-start`; the burst ends, with
//! `typing-stop`, after the idle timeout passes without another keystroke or
//! immediately on [`TypingHandle::stop_now`] (sending a message).

use crate::signaling::SignalingHandle;

use room_protocol::ClientEvent;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

const TYPING_BUFFER: usize = 64;

#[derive(Debug)]
enum TypingMessage {
    Keystroke,
    StopNow,
}

/// Handle to the debouncer task.
#[derive(Debug, Clone)]
pub struct TypingHandle {
    sender: mpsc::Sender<TypingMessage>,
    cancel_token: CancellationToken,
}

impl TypingHandle {
    /// Spawn the debouncer writing to `outbox`.
    #[must_use]
    pub fn spawn(outbox: SignalingHandle, idle: Duration) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(TYPING_BUFFER);
        let cancel_token = CancellationToken::new();
        let actor = TypingDebouncer {
            receiver,
            outbox,
            idle,
            deadline: None,
            cancel_token: cancel_token.clone(),
        };
        let task = tokio::spawn(actor.run());
        (
            Self {
                sender,
                cancel_token,
            },
            task,
        )
    }

    /// Record a keystroke. Never blocks; keystrokes beyond the buffer are
    /// dropped since one already keeps the burst alive.
    pub fn keystroke(&self) {
        let _ = self.sender.try_send(TypingMessage::Keystroke);
    }

    /// End the current burst right away.
    pub async fn stop_now(&self) {
        let _ = self.sender.send(TypingMessage::StopNow).await;
    }

    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }
}

struct TypingDebouncer {
    receiver: mpsc::Receiver<TypingMessage>,
    outbox: SignalingHandle,
    idle: Duration,
    /// Set while a burst is active.
    deadline: Option<Instant>,
    cancel_token: CancellationToken,
}

impl TypingDebouncer {
    #[instrument(skip_all, name = "rc.typing")]
    async fn run(mut self) {
        loop {
            let deadline = self.deadline;
            tokio::select! {
                () = self.cancel_token.cancelled() => break,

                () = sleep_until(deadline) => {
                    self.end_burst().await;
                }

                message = self.receiver.recv() => match message {
                    Some(TypingMessage::Keystroke) => {
                        if self.deadline.is_none() {
                            self.send(ClientEvent::TypingStart).await;
                        }
                        self.deadline = Some(Instant::now() + self.idle);
                    }
                    Some(TypingMessage::StopNow) => self.end_burst().await,
                    None => break,
                },
            }
        }
    }

    async fn end_burst(&mut self) {
        if self.deadline.take().is_some() {
            self.send(ClientEvent::TypingStop).await;
        }
    }

    async fn send(&self, event: ClientEvent) {
        if self.outbox.send(event).await.is_err() {
            debug!(target: "rc.typing", "Signaling closed, dropping typing event");
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::error::TryRecvError;

    const IDLE: Duration = Duration::from_secs(2);

    #[tokio::test(start_paused = true)]
    async fn test_burst_sends_single_start_then_stop() {
        let (outbox, mut rx) = SignalingHandle::channel(16);
        let (typing, _task) = TypingHandle::spawn(outbox, IDLE);

        typing.keystroke();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        typing.keystroke();
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert_eq!(rx.try_recv().unwrap(), ClientEvent::TypingStart);
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(rx.try_recv().unwrap(), ClientEvent::TypingStop);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_now_ends_burst_immediately() {
        let (outbox, mut rx) = SignalingHandle::channel(16);
        let (typing, _task) = TypingHandle::spawn(outbox, IDLE);

        typing.keystroke();
        typing.stop_now().await;
        assert_eq!(rx.recv().await.unwrap(), ClientEvent::TypingStart);
        assert_eq!(rx.recv().await.unwrap(), ClientEvent::TypingStop);

        // No second stop when the old deadline passes.
        tokio::time::sleep(IDLE * 2).await;
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_now_without_burst_is_silent() {
        let (outbox, mut rx) = SignalingHandle::channel(16);
        let (typing, _task) = TypingHandle::spawn(outbox, IDLE);

        typing.stop_now().await;
        tokio::time::sleep(IDLE).await;
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_burst_after_stop() {
        let (outbox, mut rx) = SignalingHandle::channel(16);
        let (typing, _task) = TypingHandle::spawn(outbox, IDLE);

        typing.keystroke();
        tokio::time::sleep(IDLE + Duration::from_millis(100)).await;
        typing.keystroke();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let events: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(
            events,
            vec![
                ClientEvent::TypingStart,
                ClientEvent::TypingStop,
                ClientEvent::TypingStart,
            ]
        );
    }

    #[tokio::test]
    async fn test_cancel_stops_task() {
        let (outbox, _rx) = SignalingHandle::channel(16);
        let (typing, task) = TypingHandle::spawn(outbox, IDLE);
        typing.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}
