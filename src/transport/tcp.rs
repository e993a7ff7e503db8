use std::io::ErrorKind;
use std::net::SocketAddr;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::time::{timeout, Duration};
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};

use crate::transport::{FrameError, Transport};

/// Default timeout for writing one frame (10 seconds).
const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest inbound line accepted by default.
const DEFAULT_MAX_FRAME_LEN: usize = 1024;

/// Newline-framed text transport over a TCP stream.
pub struct TcpTransport {
    framed: Framed<TcpStream, LinesCodec>,
    write_timeout: Duration,
    peer: Option<SocketAddr>,
    closed: bool,
    /// Set after a decode error. `Framed` yields one `None` after an error
    /// before it resumes reading, which must not be taken for EOF.
    resyncing: bool,
}

impl TcpTransport {
    pub fn new(stream: TcpStream) -> Self {
        Self::with_config(stream, DEFAULT_MAX_FRAME_LEN, DEFAULT_WRITE_TIMEOUT)
    }

    pub fn with_config(stream: TcpStream, max_frame_len: usize, write_timeout: Duration) -> Self {
        let peer = stream.peer_addr().ok();
        Self {
            framed: Framed::new(stream, LinesCodec::new_with_max_length(max_frame_len)),
            write_timeout,
            peer,
            closed: false,
            resyncing: false,
        }
    }

    pub async fn connect<A: ToSocketAddrs>(addr: A) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self::new(stream))
    }

    /// Remote address, if the socket reported one when accepted.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }
}

fn map_io(e: std::io::Error) -> anyhow::Error {
    match e.kind() {
        ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted => {
            anyhow::anyhow!("Connection closed by peer")
        }
        _ => anyhow::anyhow!("I/O error: {}", e),
    }
}

#[async_trait::async_trait]
impl Transport for TcpTransport {
    async fn send(&mut self, frame: &str) -> anyhow::Result<()> {
        if self.closed {
            return Err(anyhow::anyhow!("Transport is closed"));
        }
        timeout(self.write_timeout, self.framed.send(frame))
            .await
            .map_err(|_| anyhow::anyhow!("Send timeout after {:?}", self.write_timeout))?
            .map_err(|e| match e {
                LinesCodecError::Io(e) => map_io(e),
                LinesCodecError::MaxLineLengthExceeded => {
                    anyhow::anyhow!("Outgoing frame exceeds the line limit")
                }
            })
    }

    async fn recv(&mut self) -> anyhow::Result<Option<String>> {
        if self.closed {
            return Ok(None);
        }
        loop {
            let item = self.framed.next().await;
            let resyncing = std::mem::take(&mut self.resyncing);
            return match item {
                None if resyncing => continue,
                None => Ok(None),
                Some(Ok(line)) => Ok(Some(line)),
                Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                    self.resyncing = true;
                    Err(FrameError::TooLong(self.framed.codec().max_length()).into())
                }
                Some(Err(LinesCodecError::Io(e))) if e.kind() == ErrorKind::InvalidData => {
                    self.resyncing = true;
                    Err(FrameError::NotUtf8.into())
                }
                Some(Err(LinesCodecError::Io(e)))
                    if matches!(
                        e.kind(),
                        ErrorKind::ConnectionReset
                            | ErrorKind::ConnectionAborted
                            | ErrorKind::UnexpectedEof
                    ) =>
                {
                    Ok(None)
                }
                Some(Err(LinesCodecError::Io(e))) => Err(map_io(e)),
            };
        }
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        SinkExt::<&str>::close(&mut self.framed).await.map_err(|e| match e {
            LinesCodecError::Io(e) => map_io(e),
            LinesCodecError::MaxLineLengthExceeded => anyhow::anyhow!("Close failed"),
        })
    }
}
