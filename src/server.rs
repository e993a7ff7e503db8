//! TCP acceptor: pairs incoming connections and hands each pair to a match.

use std::sync::Arc;

use log::{debug, info, warn};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::audit::{AuditLog, FileAuditLog, NullAuditLog};
use crate::config::{ConfigError, ServerConfig};
use crate::pool::SessionPool;
use crate::session::{spawn_match, MatchReport, NoSlotAvailable};
use crate::transport::tcp::TcpTransport;
use crate::transport::Transport;

pub struct Server {
    config: Arc<ServerConfig>,
    pool: Arc<SessionPool>,
    audit: Arc<dyn AuditLog>,
}

impl Server {
    pub fn new(config: ServerConfig, audit: Arc<dyn AuditLog>) -> Result<Self, ConfigError> {
        config.validate()?;
        let pool = Arc::new(SessionPool::new(config.max_sessions));
        Ok(Self {
            config: Arc::new(config),
            pool,
            audit,
        })
    }

    /// Build a server whose audit trail goes to `config.audit_log`, if set.
    pub fn from_config(config: ServerConfig) -> anyhow::Result<Self> {
        let audit: Arc<dyn AuditLog> = match &config.audit_log {
            Some(path) => Arc::new(FileAuditLog::open(path)?),
            None => Arc::new(NullAuditLog),
        };
        Ok(Self::new(config, audit)?)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn pool(&self) -> &Arc<SessionPool> {
        &self.pool
    }

    pub async fn bind(&self) -> anyhow::Result<TcpListener> {
        let listener = TcpListener::bind(&self.config.bind_address)
            .await
            .map_err(|e| anyhow::anyhow!("Cannot bind {}: {}", self.config.bind_address, e))?;
        info!(
            "listening on {} ({} session slots)",
            listener.local_addr()?,
            self.pool.capacity()
        );
        Ok(listener)
    }

    /// Accept connections forever, two at a time, starting a match per pair.
    pub async fn serve(&self, listener: TcpListener) -> anyhow::Result<()> {
        loop {
            let first = self.accept(&listener).await;
            let second = self.accept(&listener).await;
            self.launch(Box::new(first), Box::new(second)).await;
        }
    }

    async fn accept(&self, listener: &TcpListener) -> TcpTransport {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    debug!("connection from {}", addr);
                    return TcpTransport::with_config(
                        stream,
                        self.config.max_frame_len,
                        self.config.write_timeout,
                    );
                }
                Err(e) => warn!("accept failed: {}", e),
            }
        }
    }

    /// Start a match, waiting `retry_interval` between attempts while every
    /// slot is taken.
    pub async fn launch(
        &self,
        mut first: Box<dyn Transport>,
        mut second: Box<dyn Transport>,
    ) -> JoinHandle<MatchReport> {
        loop {
            match spawn_match(
                &self.pool,
                first,
                second,
                Arc::clone(&self.config),
                Arc::clone(&self.audit),
            ) {
                Ok(handle) => return handle,
                Err(NoSlotAvailable {
                    first: f,
                    second: s,
                }) => {
                    warn!(
                        "all {} session slots busy, retrying in {:?}",
                        self.pool.capacity(),
                        self.config.retry_interval
                    );
                    first = f;
                    second = s;
                    sleep(self.config.retry_interval).await;
                }
            }
        }
    }
}
