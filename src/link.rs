//! The controller connection.
//!
//! Splits the stream: the write half goes to the writer task, the read half
//! stays here and feeds a [`FrameBuffer`]. Any read failure, framing error
//! or writer failure closes the link for good.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, ReadHalf};
use tokio::task::JoinHandle;

use crate::dispatch::Transmitter;
use crate::error::{AgentError, Result};
use crate::protocol::{Frame, FrameBuffer, MAX_FRAME_SIZE};
use crate::writer::{spawn_writer_task, WriterConfig};

const READ_BUFFER_SIZE: usize = 16 * 1024;

enum Readable {
    Data(std::io::Result<usize>),
    WriterStopped(AgentError),
}

/// A single persistent connection to the controller.
pub struct ControllerLink<S> {
    reader: Option<ReadHalf<S>>,
    buffer: FrameBuffer,
    read_buf: Vec<u8>,
    transmitter: Transmitter,
    writer_task: Option<JoinHandle<Result<()>>>,
}

impl<S> ControllerLink<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Wrap a connected stream. Must be called inside a tokio runtime.
    pub fn new(stream: S) -> Self {
        Self::with_limits(stream, MAX_FRAME_SIZE, WriterConfig::default())
    }

    /// Wrap a connected stream with a custom inbound limit and write queue.
    pub fn with_limits(stream: S, max_frame_size: u32, writer_config: WriterConfig) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        let (handle, writer_task) = spawn_writer_task(writer, writer_config);
        Self {
            reader: Some(reader),
            buffer: FrameBuffer::with_max_frame_size(max_frame_size),
            read_buf: vec![0u8; READ_BUFFER_SIZE],
            transmitter: Transmitter::new(handle),
            writer_task: Some(writer_task),
        }
    }

    /// Queue `u32_be(len + 1) ‖ frame_type ‖ payload` for the controller.
    ///
    /// Returns the payload length.
    pub fn send(&self, frame_type: u8, payload: &[u8]) -> Result<usize> {
        if self.is_closed() {
            return Err(AgentError::ConnectionClosed);
        }
        self.transmitter.send(frame_type, payload)
    }

    /// Wait until an outbound frame can be queued again.
    pub async fn wait_for_capacity(&self) -> Result<()> {
        if self.is_closed() {
            return Err(AgentError::ConnectionClosed);
        }
        self.transmitter.wait_for_capacity().await
    }

    /// Transmit path shared with the dispatcher.
    pub fn transmitter(&self) -> Transmitter {
        self.transmitter.clone()
    }

    /// Wait for data and return every frame it completes (possibly none).
    ///
    /// On error the link is closed and any partial frame is discarded:
    /// - EOF between frames: [`AgentError::ConnectionClosed`]
    /// - EOF inside the length prefix, zero or oversize length: [`AgentError::Protocol`]
    /// - EOF inside a body or a failed read: [`AgentError::Io`]
    /// - writer task failure: its error
    ///
    /// A framing error that follows complete frames in the same read is
    /// returned by the next call, after those frames.
    pub async fn on_readable(&mut self) -> Result<Vec<Frame>> {
        if let Some(err) = self.buffer.take_error() {
            tracing::error!("bad frame from controller: {}", err);
            self.close();
            return Err(err);
        }

        let outcome = {
            let Self {
                reader,
                read_buf,
                writer_task,
                ..
            } = self;
            let reader = reader.as_mut().ok_or(AgentError::ConnectionClosed)?;

            match writer_task.as_mut() {
                Some(task) => tokio::select! {
                    read = reader.read(&mut read_buf[..]) => Readable::Data(read),
                    joined = task => Readable::WriterStopped(writer_failure(joined)),
                },
                None => Readable::Data(reader.read(&mut read_buf[..]).await),
            }
        };

        match outcome {
            Readable::Data(Ok(0)) => {
                let err = self.eof_error();
                tracing::debug!("controller stream ended: {}", err);
                self.close();
                Err(err)
            }
            Readable::Data(Ok(n)) => match self.buffer.push(&self.read_buf[..n]) {
                Ok(frames) => Ok(frames),
                Err(e) => {
                    tracing::error!("bad frame from controller: {}", e);
                    self.close();
                    Err(e)
                }
            },
            Readable::Data(Err(e)) => {
                tracing::error!("unable to read from controller: {}", e);
                self.close();
                Err(AgentError::Io(e))
            }
            Readable::WriterStopped(err) => {
                tracing::error!("controller writer stopped: {}", err);
                self.writer_task = None;
                self.close();
                Err(err)
            }
        }
    }

    /// Drop the read half, stop the writer and discard any partial frame.
    pub fn close(&mut self) {
        if self.reader.take().is_some() {
            tracing::info!("closing controller link");
        }
        self.buffer.clear();
        if let Some(task) = self.writer_task.take() {
            task.abort();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.reader.is_none()
    }

    fn eof_error(&self) -> AgentError {
        if self.buffer.is_reading_body() {
            AgentError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "controller closed the connection mid-frame",
            ))
        } else if self.buffer.has_partial_frame() {
            AgentError::Protocol(format!(
                "short length prefix ({} bytes)",
                self.buffer.len()
            ))
        } else {
            AgentError::ConnectionClosed
        }
    }
}

fn writer_failure(
    joined: std::result::Result<Result<()>, tokio::task::JoinError>,
) -> AgentError {
    match joined {
        Ok(Ok(())) => AgentError::ConnectionClosed,
        Ok(Err(e)) => e,
        Err(e) => AgentError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{build_frame, frame_types};
    use tokio::io::{duplex, AsyncWriteExt};

    #[tokio::test]
    async fn test_reads_frames_across_reads() {
        let (agent_side, mut controller) = duplex(1024);
        let mut link = ControllerLink::new(agent_side);

        let bytes = build_frame(frame_types::PUB_ACTION_VENDOR, b"hello");
        controller.write_all(&bytes[..3]).await.unwrap();
        let mut frames = link.on_readable().await.unwrap();
        assert!(frames.is_empty());

        controller.write_all(&bytes[3..]).await.unwrap();
        while frames.is_empty() {
            frames = link.on_readable().await.unwrap();
        }

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].frame_type, frame_types::PUB_ACTION_VENDOR);
        assert_eq!(frames[0].payload(), b"hello");
    }

    #[tokio::test]
    async fn test_send_reaches_controller() {
        let (agent_side, mut controller) = duplex(1024);
        let link = ControllerLink::new(agent_side);

        assert_eq!(link.send(frame_types::GAS_INITIAL_REQUEST, b"gas").unwrap(), 3);

        let mut buf = [0u8; 8];
        controller.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, &[0, 0, 0, 4, frame_types::GAS_INITIAL_REQUEST, b'g', b'a', b's']);
    }

    #[tokio::test]
    async fn test_zero_length_closes_link() {
        let (agent_side, mut controller) = duplex(1024);
        let mut link = ControllerLink::new(agent_side);

        controller.write_all(&[0, 0, 0, 0]).await.unwrap();

        let err = link.on_readable().await.unwrap_err();
        assert!(matches!(err, AgentError::Protocol(_)));
        assert!(link.is_closed());
        assert!(matches!(
            link.send(frame_types::PUB_ACTION_VENDOR, b"x"),
            Err(AgentError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_bad_prefix_after_good_frame() {
        let (agent_side, mut controller) = duplex(1024);
        let mut link = ControllerLink::new(agent_side);

        let mut bytes = build_frame(frame_types::PUB_ACTION_VENDOR, b"kept");
        bytes.extend_from_slice(&[0, 0, 0, 0]);
        controller.write_all(&bytes).await.unwrap();

        let mut frames = link.on_readable().await.unwrap();
        while frames.is_empty() {
            frames = link.on_readable().await.unwrap();
        }
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload(), b"kept");
        assert!(!link.is_closed());

        assert!(matches!(
            link.on_readable().await,
            Err(AgentError::Protocol(_))
        ));
        assert!(link.is_closed());
    }

    #[tokio::test]
    async fn test_oversize_length_closes_link() {
        let (agent_side, mut controller) = duplex(1024);
        let mut link = ControllerLink::new(agent_side);

        controller
            .write_all(&(MAX_FRAME_SIZE + 1).to_be_bytes())
            .await
            .unwrap();

        assert!(matches!(
            link.on_readable().await,
            Err(AgentError::Protocol(_))
        ));
        assert!(link.is_closed());
    }

    #[tokio::test]
    async fn test_eof_between_frames_is_connection_closed() {
        let (agent_side, controller) = duplex(1024);
        let mut link = ControllerLink::new(agent_side);

        drop(controller);

        assert!(matches!(
            link.on_readable().await,
            Err(AgentError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_eof_in_prefix_is_protocol_error() {
        let (agent_side, mut controller) = duplex(1024);
        let mut link = ControllerLink::new(agent_side);

        controller.write_all(&[0, 0]).await.unwrap();
        drop(controller);

        let mut result = link.on_readable().await;
        while matches!(&result, Ok(frames) if frames.is_empty()) {
            result = link.on_readable().await;
        }
        assert!(matches!(result, Err(AgentError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_eof_in_body_is_io_error() {
        let (agent_side, mut controller) = duplex(1024);
        let mut link = ControllerLink::new(agent_side);

        controller.write_all(&[0, 0, 0, 10, 9, 1, 2]).await.unwrap();
        drop(controller);

        let mut result = link.on_readable().await;
        while matches!(&result, Ok(frames) if frames.is_empty()) {
            result = link.on_readable().await;
        }
        match result {
            Err(AgentError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof),
            other => panic!("expected I/O error, got {:?}", other.map(|f| f.len())),
        }
        assert!(link.is_closed());
    }

    #[tokio::test]
    async fn test_read_after_close() {
        let (agent_side, _controller) = duplex(64);
        let mut link = ControllerLink::new(agent_side);

        link.close();

        assert!(matches!(
            link.on_readable().await,
            Err(AgentError::ConnectionClosed)
        ));
    }
}
