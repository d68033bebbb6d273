//! Outbound relay client: hands messages to the user's real mail server.

use super::MailMessage;
use crate::error::RelayError;
use crate::utils::clean_app_password;
use lettre::message::Mailbox;
use lettre::message::Body;
use lettre::message::header::{ContentTransferEncoding, ContentType};
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::transport::smtp::extension::ClientId;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::{Deserialize, Serialize};
use tokio::time::Duration;

/// Upper bound for one relay conversation, connect included.
pub const RELAY_TIMEOUT: Duration = Duration::from_secs(30);

/// Where and how to relay outgoing mail.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub host: String,
    /// `0` picks 587 with TLS and 25 without.
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Require STARTTLS.
    pub tls: bool,
    /// Sender override; falls back to the username.
    pub from: String,
}

impl RelayConfig {
    /// Server settings of well-known providers; credentials are left empty.
    pub fn preset(provider: &str) -> Option<Self> {
        let host = match provider.to_ascii_lowercase().as_str() {
            "gmail" => "smtp.gmail.com",
            "outlook" => "smtp-mail.outlook.com",
            "yahoo" => "smtp.mail.yahoo.com",
            _ => return None,
        };
        Some(Self {
            host: host.to_string(),
            port: 587,
            tls: true,
            ..Self::default()
        })
    }

    pub fn is_configured(&self) -> bool {
        !self.host.trim().is_empty()
    }

    pub fn effective_port(&self) -> u16 {
        match (self.port, self.tls) {
            (0, true) => 587,
            (0, false) => 25,
            (port, _) => port,
        }
    }

    /// Sender address used when relaying `original`.
    pub fn sender_for<'a>(&'a self, original: &'a str) -> &'a str {
        [self.from.as_str(), self.username.as_str(), original]
            .into_iter()
            .map(str::trim)
            .find(|s| !s.is_empty())
            .unwrap_or_default()
    }
}

pub(crate) fn mailbox(address: &str) -> Result<Mailbox, RelayError> {
    address
        .trim()
        .parse::<Mailbox>()
        .map_err(|e| RelayError::Address(format!("{address}: {e}")))
}

/// Builds the plain-text lettre message for `msg`, sent as `sender`.
///
/// lettre picks the transfer encoding of the body.
pub(crate) fn build_message(msg: &MailMessage, sender: &str) -> Result<Message, RelayError> {
    build_with_body(msg, sender, Body::new(msg.body().to_string()))
}

/// Like [`build_message`], but keeps the body as raw 8bit text when it fits,
/// so the loopback listener stores it unencoded.
fn build_local_message(msg: &MailMessage) -> Result<Message, RelayError> {
    let body = Body::new_with_encoding(msg.body().to_string(), ContentTransferEncoding::EightBit)
        .unwrap_or_else(|_| Body::new(msg.body().to_string()));
    build_with_body(msg, msg.from(), body)
}

fn build_with_body(msg: &MailMessage, sender: &str, body: Body) -> Result<Message, RelayError> {
    if msg.to().is_empty() {
        return Err(RelayError::MissingRecipient);
    }

    let mut builder = Message::builder()
        .from(mailbox(sender)?)
        .subject(msg.subject())
        .header(ContentType::TEXT_PLAIN);
    for to in msg.to() {
        builder = builder.to(mailbox(to)?);
    }
    Ok(builder.body(body)?)
}

fn relay_transport(config: &RelayConfig) -> Result<AsyncSmtpTransport<Tokio1Executor>, RelayError> {
    let host = config.host.trim();
    let mut builder = if config.tls {
        AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)?
    } else {
        AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
    };

    builder = builder
        .port(config.effective_port())
        .timeout(Some(RELAY_TIMEOUT));

    if !config.username.trim().is_empty() {
        builder = builder
            .credentials(Credentials::new(
                config.username.trim().to_string(),
                clean_app_password(&config.password),
            ))
            .authentication(vec![Mechanism::Plain, Mechanism::Login]);
    }

    Ok(builder.build())
}

/// Sends `msg` through the configured relay.
///
/// Subject, body and recipients are kept; the sender becomes the configured
/// `from`, else the username, else the original sender.
#[tracing::instrument(skip(msg, config), fields(host = %config.host, port = config.effective_port()))]
pub async fn forward(msg: MailMessage, config: &RelayConfig) -> Result<(), RelayError> {
    if !config.is_configured() {
        return Err(RelayError::NotConfigured);
    }

    let message = build_message(&msg, config.sender_for(msg.from()))?;
    let transport = relay_transport(config)?;
    transport.send(message).await?;

    tracing::info!(
        name = "mail.relay.forwarded",
        target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
        recipients = ?msg.to(),
        subject = %msg.subject(),
        message = "Relayed message to the configured mail server"
    );
    Ok(())
}

/// Submits `msg` to the loopback listener on `port`.
#[tracing::instrument(skip(msg))]
pub async fn submit_local(port: u16, domain: &str, msg: &MailMessage) -> Result<(), RelayError> {
    let message = build_local_message(msg)?;
    let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous("127.0.0.1")
        .port(port)
        .hello_name(ClientId::Domain(domain.to_string()))
        .timeout(Some(RELAY_TIMEOUT))
        .build();
    transport.send(message).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sender_falls_back_in_order() {
        let mut config = RelayConfig {
            from: "from@example.org".into(),
            username: "user@example.org".into(),
            ..RelayConfig::default()
        };
        assert_eq!(config.sender_for("orig@local"), "from@example.org");
        config.from.clear();
        assert_eq!(config.sender_for("orig@local"), "user@example.org");
        config.username.clear();
        assert_eq!(config.sender_for("orig@local"), "orig@local");
    }

    #[test]
    fn presets() {
        let gmail = RelayConfig::preset("Gmail").unwrap();
        assert_eq!(gmail.host, "smtp.gmail.com");
        assert_eq!(gmail.effective_port(), 587);
        assert!(gmail.tls);
        assert!(RelayConfig::preset("aol").is_none());
    }

    #[test]
    fn default_ports_follow_tls() {
        let mut config = RelayConfig::default();
        assert_eq!(config.effective_port(), 25);
        config.tls = true;
        assert_eq!(config.effective_port(), 587);
        config.port = 2525;
        assert_eq!(config.effective_port(), 2525);
    }

    #[test]
    fn messages_need_recipients() {
        let msg = MailMessage::new("a@example.org", vec![], "s", "b");
        assert!(matches!(
            build_message(&msg, "a@example.org"),
            Err(RelayError::MissingRecipient)
        ));
    }

    #[test]
    fn local_messages_keep_8bit_bodies() {
        let msg = MailMessage::new(
            "alert@monitoring-app.local",
            vec!["ops@example.org".into()],
            "ALERT: Serveur \u{e9} is DOWN",
            "Server 'Serveur \u{e9}' is now DOWN.",
        );
        let raw = String::from_utf8(build_local_message(&msg).unwrap().formatted()).unwrap();
        assert!(raw.contains("Content-Transfer-Encoding: 8bit"), "{raw}");
        assert!(raw.contains("Server 'Serveur \u{e9}' is now DOWN."));
    }

    #[test]
    fn bad_addresses_are_reported() {
        let msg = MailMessage::new("a@example.org", vec!["not an address".into()], "s", "b");
        assert!(matches!(
            build_message(&msg, "a@example.org"),
            Err(RelayError::Address(_))
        ));
    }

    #[tokio::test]
    async fn unconfigured_relay_refuses() {
        let msg = MailMessage::new("a@example.org", vec!["b@example.org".into()], "s", "b");
        assert!(matches!(
            forward(msg, &RelayConfig::default()).await,
            Err(RelayError::NotConfigured)
        ));
    }
}
