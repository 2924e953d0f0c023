//! Raw chunk readers for the child's output streams.
//!
//! Readers forward bytes exactly as read, without splitting lines or
//! decoding; line assembly happens downstream so a chunk boundary can fall
//! anywhere, including inside a multi-byte character.

use super::types::{OutputChunk, StreamKind};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tracing::debug;

const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Spawn a task that forwards every chunk of `stream` to `sink` until EOF.
pub(crate) fn spawn_stream_reader(
    mut stream: impl AsyncRead + Unpin + Send + 'static,
    kind: StreamKind,
    pid: u32,
    sink: mpsc::UnboundedSender<OutputChunk>,
) {
    tokio::spawn(async move {
        let mut buf = vec![0u8; READ_BUFFER_SIZE];

        loop {
            match stream.read(&mut buf).await {
                Ok(0) => break, // EOF
                Ok(n) => {
                    let chunk = OutputChunk {
                        stream: kind,
                        bytes: buf[..n].to_vec(),
                    };
                    if sink.send(chunk).is_err() {
                        debug!(pid, stream = kind.as_str(), "output receiver dropped");
                        break;
                    }
                }
                Err(e) => {
                    debug!(pid, stream = kind.as_str(), error = %e, "output reader exiting due to read error");
                    break;
                }
            }
        }

        debug!(pid, stream = kind.as_str(), "output reader task exiting");
    });
}
