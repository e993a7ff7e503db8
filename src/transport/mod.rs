use crate::protocol::ServerMessage;

/// A line the transport received but could not decode. The connection is
/// still usable; the next `recv` starts at the following line.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("frame exceeds {0} bytes")]
    TooLong(usize),
    #[error("frame is not valid UTF-8")]
    NotUtf8,
}

/// A reliable, ordered, line-framed connection to one peer.
///
/// `recv` must be cancel-safe: the match worker races it against the turn
/// deadline and against the other participant's connection, and drops the
/// losing futures.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Write one frame. The transport appends the line terminator.
    async fn send(&mut self, frame: &str) -> anyhow::Result<()>;

    /// Next frame without its terminator, or `None` once the peer closed.
    ///
    /// An undecodable line is reported as an error wrapping [`FrameError`].
    /// Any other error means the connection is gone.
    async fn recv(&mut self) -> anyhow::Result<Option<String>>;

    /// Flush and close the connection. Further sends fail.
    async fn close(&mut self) -> anyhow::Result<()>;

    async fn send_message(&mut self, msg: &ServerMessage) -> anyhow::Result<()> {
        self.send(&msg.to_string()).await
    }
}

/// True when `err` is a bad line rather than a failed connection.
pub fn is_frame_error(err: &anyhow::Error) -> bool {
    err.downcast_ref::<FrameError>().is_some()
}

pub mod in_memory;
pub mod tcp;
