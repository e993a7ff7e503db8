use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::transport::Transport;

/// One end of an in-process connection. Frames sent on one end arrive, in
/// order, on the other.
pub struct InMemoryTransport {
    tx: Option<UnboundedSender<String>>,
    rx: UnboundedReceiver<String>,
}

impl InMemoryTransport {
    pub fn pair() -> (Self, Self) {
        let (tx1, rx1) = unbounded_channel();
        let (tx2, rx2) = unbounded_channel();
        (
            Self {
                tx: Some(tx1),
                rx: rx2,
            },
            Self {
                tx: Some(tx2),
                rx: rx1,
            },
        )
    }
}

#[async_trait::async_trait]
impl Transport for InMemoryTransport {
    async fn send(&mut self, frame: &str) -> anyhow::Result<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("Transport is closed"))?;
        tx.send(frame.to_string())
            .map_err(|_| anyhow::anyhow!("Connection closed by peer"))
    }

    async fn recv(&mut self) -> anyhow::Result<Option<String>> {
        Ok(self.rx.recv().await)
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        self.tx = None;
        self.rx.close();
        Ok(())
    }
}
