//! Streaming forwarders.
//!
//! # Responsibilities
//! - Copy an upstream body to the client as it arrives, one unit at a time
//! - Measure time-to-first-token (line events) or time-to-first-audio (raw)
//! - Keep the line transcript; keep only counters for raw bytes
//!
//! # Design Decisions
//! - One sequential read, write, flush cycle per request; the flush happens
//!   before the next read so tokens are never held back
//! - Every wait also listens for client disconnect and the engine's abort token
//! - Payload memory is bounded: one line (capped) or one chunk buffer

use std::io;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, FramedRead};
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;

use crate::proxy::context::RequestContext;
use crate::proxy::sink::StreamSink;

/// End-of-stream marker used by event-stream APIs.
pub const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("upstream read failed: {0}")]
    Upstream(#[source] io::Error),

    #[error("client disconnected")]
    ClientGone,

    #[error("relay aborted during shutdown")]
    Cancelled,

    #[error("upstream line exceeds {0} bytes")]
    LineTooLong(usize),
}

/// True for a `data:` event carrying something other than the end sentinel.
fn is_first_token(line: &[u8]) -> bool {
    match line.strip_prefix(b"data:") {
        Some(payload) => std::str::from_utf8(payload).map_or(true, |p| p.trim() != DONE_SENTINEL),
        None => false,
    }
}

fn strip_cr(mut line: Bytes) -> Bytes {
    if line.last() == Some(&b'\r') {
        line.truncate(line.len() - 1);
    }
    line
}

async fn flush<S: StreamSink>(sink: &mut S, abort: &CancellationToken) -> Result<(), ForwardError> {
    tokio::select! {
        biased;
        _ = abort.cancelled() => Err(ForwardError::Cancelled),
        result = sink.flush() => result.map_err(|_| ForwardError::ClientGone),
    }
}

/// Relay a newline-delimited event stream.
pub async fn forward_lines<B, S>(
    body: B,
    sink: &mut S,
    ctx: &mut RequestContext,
    max_line_bytes: usize,
    abort: &CancellationToken,
) -> Result<(), ForwardError>
where
    B: Stream<Item = io::Result<Bytes>> + Unpin,
    S: StreamSink,
{
    let codec = AnyDelimiterCodec::new_with_max_length(vec![b'\n'], Vec::new(), max_line_bytes);
    let mut lines = FramedRead::new(StreamReader::new(body), codec);

    loop {
        let next = tokio::select! {
            biased;
            _ = abort.cancelled() => return Err(ForwardError::Cancelled),
            _ = sink.closed() => return Err(ForwardError::ClientGone),
            next = lines.next() => next,
        };

        let line = match next {
            None => return Ok(()),
            Some(Ok(line)) => strip_cr(line),
            Some(Err(AnyDelimiterCodecError::MaxChunkLengthExceeded)) => {
                return Err(ForwardError::LineTooLong(max_line_bytes))
            }
            Some(Err(AnyDelimiterCodecError::Io(e))) => return Err(ForwardError::Upstream(e)),
        };

        if ctx.ttft_ms().is_none() && is_first_token(&line) {
            ctx.mark_first_token();
            tracing::debug!(ttft_ms = ctx.ttft_ms(), "First token");
        }

        ctx.record_line(&line);
        sink.write(&line);
        sink.write(b"\n");
        flush(sink, abort).await?;
    }
}

/// Relay an opaque byte stream in chunks of at most `chunk_size` bytes.
pub async fn forward_raw<B, S>(
    body: B,
    sink: &mut S,
    ctx: &mut RequestContext,
    chunk_size: usize,
    abort: &CancellationToken,
) -> Result<(), ForwardError>
where
    B: Stream<Item = io::Result<Bytes>> + Unpin,
    S: StreamSink,
{
    let mut reader = StreamReader::new(body);
    let mut buf = vec![0u8; chunk_size.max(1)];

    loop {
        let read = tokio::select! {
            biased;
            _ = abort.cancelled() => return Err(ForwardError::Cancelled),
            _ = sink.closed() => return Err(ForwardError::ClientGone),
            read = reader.read(&mut buf) => read,
        };

        let n = read.map_err(ForwardError::Upstream)?;
        if n == 0 {
            return Ok(());
        }

        if ctx.ttfa_ms().is_none() {
            ctx.mark_first_audio();
            tracing::debug!(ttfa_ms = ctx.ttfa_ms(), "First audio chunk");
        }

        ctx.record_chunk(n);
        sink.write(&buf[..n]);
        flush(sink, abort).await?;
    }
}
