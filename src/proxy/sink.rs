//! Client-facing streaming sink.
//!
//! # Responsibilities
//! - Accept response bytes incrementally and hand them to the client connection
//! - Report when the client side has gone away
//!
//! # Design Decisions
//! - Every sink supports flush; there is no "can this writer flush" probe
//! - The channel is bounded, so a slow client applies backpressure to the
//!   upstream read instead of growing a buffer

use std::future::Future;
use std::io;
use std::time::Duration;

use axum::body::Body;
use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// How long `abort` waits for room in a full channel before giving up.
const ABORT_SEND_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("client connection closed")]
    Closed,
}

/// Incremental writer towards the client.
pub trait StreamSink: Send {
    /// Buffer `data` for the next flush.
    fn write(&mut self, data: &[u8]);

    /// Hand everything buffered to the transport as one frame.
    fn flush(&mut self) -> impl Future<Output = Result<(), SinkError>> + Send;

    /// Resolve once the client can no longer receive data.
    fn closed(&self) -> impl Future<Output = ()> + Send;
}

type Frame = Result<Bytes, io::Error>;

/// [`StreamSink`] feeding an axum response body through a bounded channel.
#[derive(Debug)]
pub struct ChannelSink {
    tx: mpsc::Sender<Frame>,
    buf: BytesMut,
}

impl ChannelSink {
    /// Create a sink and the response body it feeds.
    pub fn channel(capacity: usize) -> (Self, Body) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let body = Body::from_stream(ReceiverStream::new(rx));
        (
            Self {
                tx,
                buf: BytesMut::new(),
            },
            body,
        )
    }

    /// End the body with an error so the connection is cut and the client
    /// observes a truncated response rather than a clean end of stream.
    pub async fn abort(self, reason: String) {
        let frame = Err(io::Error::other(reason));
        if tokio::time::timeout(ABORT_SEND_TIMEOUT, self.tx.send(frame))
            .await
            .is_err()
        {
            tracing::debug!("Client not draining, dropping stream without error frame");
        }
    }
}

impl StreamSink for ChannelSink {
    fn write(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let frame = self.buf.split().freeze();
        self.tx.send(Ok(frame)).await.map_err(|_| SinkError::Closed)
    }

    async fn closed(&self) {
        self.tx.closed().await
    }
}
