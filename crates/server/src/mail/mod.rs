//! Embedded mail relay.
//!
//! Alerts are submitted to a listener bound on loopback, which forwards them
//! to the user's outbound mail server. The supervisor here owns the listener
//! and restarts it when the relay configuration changes.

pub mod listener;
pub mod message;
pub mod relay;

pub use listener::ListenerHandle;
pub use message::MailMessage;
pub use relay::{RelayConfig, forward};

use crate::error::RelayError;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Number of received messages kept for inspection.
pub const INBOX_CAPACITY: usize = 64;

/// Most recent messages accepted by the listener, oldest first.
#[derive(Default)]
pub struct Inbox {
    messages: Mutex<VecDeque<MailMessage>>,
}

impl Inbox {
    pub async fn push(&self, msg: MailMessage) {
        let mut messages = self.messages.lock().await;
        if messages.len() == INBOX_CAPACITY {
            messages.pop_front();
        }
        messages.push_back(msg);
    }

    pub async fn snapshot(&self) -> Vec<MailMessage> {
        self.messages.lock().await.iter().cloned().collect()
    }
}

/// Owns the loopback listener and its relay configuration.
pub struct MailRelay {
    domain: String,
    listener: Mutex<Option<ListenerHandle>>,
    config: RwLock<RelayConfig>,
    inbox: Arc<Inbox>,
}

impl MailRelay {
    /// `domain` is announced in the greeting and used as the client name
    /// when submitting.
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            listener: Mutex::new(None),
            config: RwLock::new(RelayConfig::default()),
            inbox: Arc::new(Inbox::default()),
        }
    }

    /// (Re)starts the listener with `config`, returning its port.
    ///
    /// A running listener is stopped and joined before the new one binds.
    #[tracing::instrument(skip(self, config), fields(relay_host = %config.host))]
    pub async fn start(&self, config: RelayConfig) -> Result<u16, RelayError> {
        let mut slot = self.listener.lock().await;
        if let Some(previous) = slot.take() {
            tracing::info!(
                name = "mail.relay.restart",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                old_port = previous.port(),
                message = "Stopping previous mail listener"
            );
            previous.shutdown().await;
        }

        *self.config.write().await = config.clone();
        let handle = listener::bind(self.domain.clone(), config, Arc::clone(&self.inbox)).await?;
        let port = handle.port();
        *slot = Some(handle);
        Ok(port)
    }

    pub async fn stop(&self) {
        if let Some(handle) = self.listener.lock().await.take() {
            handle.shutdown().await;
        }
    }

    pub async fn port(&self) -> Option<u16> {
        self.listener.lock().await.as_ref().map(ListenerHandle::port)
    }

    pub async fn is_running(&self) -> bool {
        self.listener.lock().await.is_some()
    }

    pub async fn config(&self) -> RelayConfig {
        self.config.read().await.clone()
    }

    pub async fn recent_messages(&self) -> Vec<MailMessage> {
        self.inbox.snapshot().await
    }

    /// Submits `msg` to the local listener, starting it with the last known
    /// configuration if it is not running.
    #[tracing::instrument(skip(self, msg), fields(subject = %msg.subject()))]
    pub async fn submit(&self, msg: MailMessage) -> Result<(), RelayError> {
        let port = match self.port().await {
            Some(port) => port,
            None => {
                let config = self.config().await;
                self.start(config).await?
            }
        };
        relay::submit_local(port, &self.domain, &msg).await
    }
}
