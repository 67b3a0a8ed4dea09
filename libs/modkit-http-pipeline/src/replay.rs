//! Replayable response body.
//!
//! A network body can be polled only once. [`ReplayBody`] tees every byte it
//! pulls from the wire into a capture buffer, so the logical stream can be
//! rewound with [`ReplayBody::reset`] and read again without touching the
//! network. The source is dropped as soon as it reports end of stream or an
//! error, which means a body is fetched at most once no matter how many
//! logical passes (JSON decode, raw copy, text preview) run over it.
//!
//! A failed source leaves the capture incomplete. Replays still deliver the
//! captured prefix, but every read that reaches its end fails again with the
//! original error instead of reporting a clean end of stream.

use crate::error::HttpError;
use crate::response::ResponseBody;
use bytes::Bytes;
use http_body::Body;
use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};
use tokio::io::{AsyncRead, ReadBuf};

enum State {
    /// Source still open; `captured` holds everything read so far
    Draining(ResponseBody),
    /// Source reached end of stream or was closed; `captured` is final
    Exhausted,
    /// Source failed and has been dropped; `captured` is a truncated prefix
    Failed(Failure),
}

enum Failure {
    TooLarge { actual: usize },
    Source(Arc<dyn std::error::Error + Send + Sync>),
}

impl Failure {
    fn to_error(&self, limit: usize) -> HttpError {
        match self {
            Self::TooLarge { actual } => HttpError::BodyTooLarge {
                limit,
                actual: *actual,
            },
            Self::Source(e) => HttpError::Transport(Box::new(Arc::clone(e))),
        }
    }
}

/// Single-pass network body that can be re-read from its capture buffer.
pub struct ReplayBody {
    state: State,
    captured: Vec<u8>,
    cursor: usize,
    limit: usize,
}

impl ReplayBody {
    /// Wrap a live body, capturing at most `limit` bytes.
    #[must_use]
    pub fn new(source: ResponseBody, limit: usize) -> Self {
        Self {
            state: State::Draining(source),
            captured: Vec::new(),
            cursor: 0,
            limit,
        }
    }

    /// A body that is already complete; never touches a network source.
    #[must_use]
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        let bytes: Bytes = bytes.into();
        Self {
            state: State::Exhausted,
            limit: bytes.len(),
            captured: bytes.to_vec(),
            cursor: 0,
        }
    }

    /// Rewind the read cursor to the start of the captured bytes.
    ///
    /// Never reopens or re-reads the source: bytes not yet pulled from the
    /// wire are still delivered by the live source on later reads.
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Drop the source if it is still open. Closing twice is a no-op.
    pub fn close(&mut self) {
        if matches!(self.state, State::Draining(_)) {
            tracing::trace!(captured = self.captured.len(), "response body closed early");
            self.state = State::Exhausted;
        }
    }

    /// Whether the source has been drained or dropped.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        !matches!(self.state, State::Draining(_))
    }

    /// Whether the source failed, leaving the capture incomplete.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self.state, State::Failed(_))
    }

    /// Bytes captured so far, independent of the cursor.
    #[must_use]
    pub fn captured(&self) -> &[u8] {
        &self.captured
    }

    /// Current read offset into the captured bytes.
    #[must_use]
    pub fn position(&self) -> usize {
        self.cursor
    }

    /// Configured capture limit.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Read the next chunk, replaying captured bytes before pulling from the source.
    ///
    /// Returns `Ok(None)` at end of stream.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::Transport` if the source fails and
    /// `HttpError::BodyTooLarge` if the capture limit is exceeded. Once the
    /// source has failed, every read past the captured bytes repeats the error.
    pub async fn chunk(&mut self) -> Result<Option<Bytes>, HttpError> {
        std::future::poll_fn(|cx| self.poll_chunk(cx)).await
    }

    /// Drain whatever is left of the source and return every captured byte.
    ///
    /// The cursor is not moved, so subsequent reads still start where they
    /// left off.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::Transport` if the source fails and
    /// `HttpError::BodyTooLarge` if the capture limit is exceeded, on this
    /// call or any earlier read.
    pub async fn fill(&mut self) -> Result<&[u8], HttpError> {
        self.prefetch(usize::MAX).await
    }

    /// Pull from the source until at least `min` bytes are captured or it ends.
    ///
    /// Like [`fill`](Self::fill), the cursor is not moved.
    ///
    /// # Errors
    ///
    /// Same as [`fill`](Self::fill).
    pub async fn prefetch(&mut self, min: usize) -> Result<&[u8], HttpError> {
        while self.captured.len() < min {
            if std::future::poll_fn(|cx| self.poll_pull(cx)).await? == 0 {
                break;
            }
        }
        Ok(&self.captured)
    }

    /// Pull one data frame from the source into `captured`.
    ///
    /// Resolves to the number of new bytes, `0` once the source is exhausted,
    /// or the stored error once it has failed.
    fn poll_pull(&mut self, cx: &mut Context<'_>) -> Poll<Result<usize, HttpError>> {
        loop {
            let source = match &mut self.state {
                State::Draining(source) => source,
                State::Exhausted => return Poll::Ready(Ok(0)),
                State::Failed(failure) => {
                    return Poll::Ready(Err(failure.to_error(self.limit)));
                }
            };

            match ready!(Pin::new(source).poll_frame(cx)) {
                Some(Ok(frame)) => {
                    // Trailers carry no body bytes.
                    let Ok(data) = frame.into_data() else {
                        continue;
                    };
                    if data.is_empty() {
                        continue;
                    }
                    let total = self.captured.len() + data.len();
                    if total > self.limit {
                        let failure = Failure::TooLarge { actual: total };
                        return Poll::Ready(Err(self.fail(failure)));
                    }
                    self.captured.extend_from_slice(&data);
                    return Poll::Ready(Ok(data.len()));
                }
                Some(Err(e)) => {
                    let failure = Failure::Source(Arc::from(e));
                    return Poll::Ready(Err(self.fail(failure)));
                }
                None => {
                    self.finish();
                    return Poll::Ready(Ok(0));
                }
            }
        }
    }

    fn poll_chunk(&mut self, cx: &mut Context<'_>) -> Poll<Result<Option<Bytes>, HttpError>> {
        if self.cursor == self.captured.len() && ready!(self.poll_pull(cx))? == 0 {
            return Poll::Ready(Ok(None));
        }
        let chunk = Bytes::copy_from_slice(&self.captured[self.cursor..]);
        self.cursor = self.captured.len();
        Poll::Ready(Ok(Some(chunk)))
    }

    fn finish(&mut self) {
        self.state = State::Exhausted;
        tracing::trace!(captured = self.captured.len(), "response body source exhausted");
    }

    fn fail(&mut self, failure: Failure) -> HttpError {
        let err = failure.to_error(self.limit);
        tracing::debug!(
            captured = self.captured.len(),
            error = %err,
            "response body source failed"
        );
        self.state = State::Failed(failure);
        err
    }
}

impl AsyncRead for ReplayBody {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.cursor == this.captured.len() {
            ready!(this.poll_pull(cx)).map_err(io::Error::other)?;
        }
        let available = &this.captured[this.cursor..];
        let n = available.len().min(buf.remaining());
        buf.put_slice(&available[..n]);
        this.cursor += n;
        Poll::Ready(Ok(()))
    }
}

impl fmt::Debug for ReplayBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplayBody")
            .field("exhausted", &self.is_exhausted())
            .field("failed", &self.is_failed())
            .field("captured", &self.captured.len())
            .field("cursor", &self.cursor)
            .field("limit", &self.limit)
            .finish_non_exhaustive()
    }
}
