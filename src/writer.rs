//! Dedicated writer task for frames bound to the controller.
//!
//! Outbound frames are queued on an mpsc channel and written by a single task
//! that owns the write half of the connection. This keeps each frame's bytes
//! contiguous on the wire no matter where the send originated.
//!
//! # Architecture
//!
//! ```text
//! Dispatcher ────┐
//! Engine (tx_*) ─┼─► mpsc::Sender<OutboundFrame> ─► Writer Task ─► Controller
//! Startup ───────┘
//! ```
//!
//! A write failure ends the writer task with an error. Every later send then
//! fails with [`AgentError::ConnectionClosed`], which callers treat as link
//! loss.

use std::io::IoSlice;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{AgentError, Result};
use crate::protocol::{LengthPrefix, LENGTH_PREFIX_SIZE, MAX_PAYLOAD_SIZE};

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Maximum frames to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 32;

/// Length prefix plus type byte.
const FRAME_HEAD_SIZE: usize = LENGTH_PREFIX_SIZE + 1;

/// A frame ready to be written to the controller.
#[derive(Debug)]
pub struct OutboundFrame {
    /// Pre-encoded length prefix followed by the type byte.
    pub head: [u8; FRAME_HEAD_SIZE],
    /// Payload bytes.
    pub payload: Bytes,
}

impl OutboundFrame {
    /// Create a new outbound frame.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::PayloadTooLarge`] if the payload would not fit in a
    /// single frame.
    pub fn new(frame_type: u8, payload: Bytes) -> Result<Self> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(AgentError::PayloadTooLarge(payload.len()));
        }

        let mut head = [0u8; FRAME_HEAD_SIZE];
        head[..LENGTH_PREFIX_SIZE]
            .copy_from_slice(&LengthPrefix::for_payload(payload.len()).encode());
        head[LENGTH_PREFIX_SIZE] = frame_type;

        Ok(Self { head, payload })
    }

    /// Outer frame type byte.
    #[inline]
    pub fn frame_type(&self) -> u8 {
        self.head[LENGTH_PREFIX_SIZE]
    }

    /// Total size of this frame on the wire.
    #[inline]
    pub fn size(&self) -> usize {
        FRAME_HEAD_SIZE + self.payload.len()
    }
}

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Channel capacity for the frame queue.
    pub channel_capacity: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Handle for sending frames to the writer task.
///
/// Cheaply cloneable.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<OutboundFrame>,
}

impl WriterHandle {
    pub(crate) fn from_sender(tx: mpsc::Sender<OutboundFrame>) -> Self {
        Self { tx }
    }

    /// Queue a frame without waiting.
    ///
    /// Used from synchronous engine callbacks. A full queue drops the frame
    /// with [`AgentError::QueueFull`] and leaves the link alone.
    pub fn try_send(&self, frame: OutboundFrame) -> Result<()> {
        self.tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                tracing::warn!("controller write queue is full, dropping frame");
                AgentError::QueueFull
            }
            mpsc::error::TrySendError::Closed(_) => AgentError::ConnectionClosed,
        })
    }

    /// Wait until the queue has room for at least one frame.
    pub async fn wait_for_capacity(&self) -> Result<()> {
        let permit = self
            .tx
            .reserve()
            .await
            .map_err(|_| AgentError::ConnectionClosed)?;
        drop(permit);
        Ok(())
    }

    /// Whether the writer task has stopped.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn the writer task and return a handle for sending frames.
///
/// The returned `JoinHandle` resolves when every handle has been dropped
/// (`Ok`) or when a write fails (`Err`).
pub fn spawn_writer_task<W>(
    writer: W,
    config: WriterConfig,
) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity);
    let task = tokio::spawn(writer_loop(writer, rx));
    (WriterHandle::from_sender(tx), task)
}

async fn writer_loop<W>(mut writer: W, mut rx: mpsc::Receiver<OutboundFrame>) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let first = match rx.recv().await {
            Some(f) => f,
            None => {
                tracing::debug!("Writer channel closed, shutting down writer task");
                return Ok(());
            }
        };

        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);
        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(frame) => batch.push(frame),
                Err(_) => break,
            }
        }

        if let Err(e) = write_batch(&mut writer, &batch).await {
            tracing::error!("can't send message to controller: {}", e);
            return Err(e);
        }
    }
}

/// Write a batch of frames using scatter/gather I/O.
async fn write_batch<W>(writer: &mut W, batch: &[OutboundFrame]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if batch.is_empty() {
        return Ok(());
    }

    let total_size: usize = batch.iter().map(|f| f.size()).sum();
    let mut total_written = 0;

    while total_written < total_size {
        let slices = build_remaining_slices(batch, total_written);
        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(AgentError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "short write to controller",
            )));
        }
        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

/// Build IoSlice array for the data not yet written.
fn build_remaining_slices(batch: &[OutboundFrame], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len() * 2);
    let mut offset = 0;

    for frame in batch {
        let head_end = offset + FRAME_HEAD_SIZE;
        if skip_bytes < head_end {
            let start = skip_bytes.saturating_sub(offset);
            slices.push(IoSlice::new(&frame.head[start..]));
        }
        offset = head_end;

        if !frame.payload.is_empty() {
            let payload_end = offset + frame.payload.len();
            if skip_bytes < payload_end {
                let start = skip_bytes.saturating_sub(offset);
                slices.push(IoSlice::new(&frame.payload[start..]));
            }
            offset = payload_end;
        }
    }

    slices
}
