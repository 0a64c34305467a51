//! Render outcomes and the single-shot completion channel.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use thiserror::Error;
use tokio::sync::oneshot;

use crate::request::RequestError;

/// Why a render request did not fully succeed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RenderError {
    /// Some tiles failed; the composite was drawn from the rest.
    #[error("{failed} of {total} tiles not available")]
    PartialTileFailure { failed: usize, total: usize },

    /// Every tile failed; the destination rectangle was cleared.
    #[error("{failed} of {total} tiles not available, nothing rendered")]
    TotalTileFailure { failed: usize, total: usize },

    /// The render or this consumer's share of it was canceled.
    #[error("render canceled")]
    Canceled,

    /// The last consumer left, so the whole render was dropped.
    #[error("render fully canceled")]
    FullyCanceled,

    /// The renderer went away before the render finished.
    #[error("renderer dropped before the render finished")]
    Abandoned,

    /// The request could not be canonicalized.
    #[error("invalid render request: {0}")]
    InvalidRequest(#[from] RequestError),
}

/// Outcome delivered to each consumer.
pub type RenderResult = Result<(), RenderError>;

/// Sender half of a consumer's completion.
///
/// [`complete`](Self::complete) consumes the value, so a consumer can be
/// notified at most once.
#[derive(Debug)]
pub struct Completion {
    tx: oneshot::Sender<RenderResult>,
}

impl Completion {
    /// Create a completion pair.
    pub fn channel() -> (Completion, RenderCompletion) {
        let (tx, rx) = oneshot::channel();
        (Completion { tx }, RenderCompletion { rx })
    }

    /// Deliver the outcome. A receiver that is gone is ignored.
    pub fn complete(self, result: RenderResult) {
        let _ = self.tx.send(result);
    }
}

/// Future resolving to a consumer's outcome.
///
/// Resolves to [`RenderError::Abandoned`] when the sender is dropped
/// without a result.
#[derive(Debug)]
pub struct RenderCompletion {
    rx: oneshot::Receiver<RenderResult>,
}

impl RenderCompletion {
    /// Non-blocking check for an outcome.
    pub fn try_result(&mut self) -> Option<RenderResult> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(RenderError::Abandoned)),
        }
    }
}

impl Future for RenderCompletion {
    type Output = RenderResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(RenderError::Abandoned)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_completion_delivers_once() {
        let (completion, receiver) = Completion::channel();
        completion.complete(Err(RenderError::Canceled));
        assert_eq!(receiver.await, Err(RenderError::Canceled));
    }

    #[tokio::test]
    async fn test_dropped_completion_is_abandoned() {
        let (completion, receiver) = Completion::channel();
        drop(completion);
        assert_eq!(receiver.await, Err(RenderError::Abandoned));
    }

    #[test]
    fn test_try_result() {
        let (completion, mut receiver) = Completion::channel();
        assert_eq!(receiver.try_result(), None);
        completion.complete(Ok(()));
        assert_eq!(receiver.try_result(), Some(Ok(())));
    }

    #[test]
    fn test_error_messages() {
        let err = RenderError::PartialTileFailure {
            failed: 2,
            total: 5,
        };
        assert_eq!(err.to_string(), "2 of 5 tiles not available");
        let err: RenderError = RequestError::EmptyTileSet.into();
        assert!(err.to_string().contains("no tiles"));
    }
}
