//! Loopback mail submission listener.
//!
//! Accepts the small subset of the SMTP dialogue needed to submit a message:
//! greeting, `EHLO`/`HELO`, `MAIL FROM`, `RCPT TO`, `DATA`, `RSET`, `NOOP` and
//! `QUIT`. There is no authentication; the socket only ever binds to
//! 127.0.0.1. Accepted messages go to the inbox and, when a relay host is
//! configured, are forwarded in a detached task.

use super::relay::{RelayConfig, forward};
use super::{Inbox, MailMessage};
use crate::error::RelayError;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Duration;

/// A session that sends nothing for this long is closed.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(60);
/// Largest accepted `DATA` block.
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;
const MAX_LINE_LEN: u64 = 4096;

/// Running listener. Dropping it also stops the accept loop, but only
/// [`ListenerHandle::shutdown`] waits for it to exit.
pub struct ListenerHandle {
    port: u16,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ListenerHandle {
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Stops accepting and waits for the accept loop to exit.
    /// Sessions already in progress run to completion.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

struct SessionContext {
    domain: String,
    relay: RelayConfig,
    inbox: Arc<Inbox>,
    idle_timeout: Duration,
}

/// Binds an ephemeral loopback port and starts accepting sessions.
///
/// `relay` is a snapshot; a new configuration needs a new listener.
#[tracing::instrument(skip(relay, inbox), fields(relay_host = %relay.host))]
pub async fn bind(
    domain: String,
    relay: RelayConfig,
    inbox: Arc<Inbox>,
) -> Result<ListenerHandle, RelayError> {
    bind_with_idle_timeout(domain, relay, inbox, IDLE_TIMEOUT).await
}

pub(crate) async fn bind_with_idle_timeout(
    domain: String,
    relay: RelayConfig,
    inbox: Arc<Inbox>,
    idle_timeout: Duration,
) -> Result<ListenerHandle, RelayError> {
    let listener = TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)))
        .await
        .map_err(RelayError::Bind)?;
    let port = listener.local_addr().map_err(RelayError::Bind)?.port();

    tracing::info!(
        name = "mail.listener.started",
        target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
        port = port,
        relay_configured = relay.is_configured(),
        message = "Mail listener started"
    );

    let ctx = Arc::new(SessionContext {
        domain,
        relay,
        inbox,
        idle_timeout,
    });
    let (shutdown, rx) = watch::channel(false);
    let task = tokio::spawn(accept_loop(listener, ctx, rx));

    Ok(ListenerHandle {
        port,
        shutdown,
        task,
    })
}

async fn accept_loop(
    listener: TcpListener,
    ctx: Arc<SessionContext>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let ctx = Arc::clone(&ctx);
                    tokio::spawn(async move {
                        if let Err(e) = handle_session(stream, &ctx).await {
                            tracing::debug!(
                                name = "mail.listener.session_failed",
                                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                                peer = %peer,
                                error = %e,
                                message = "Mail session ended with an error"
                            );
                        }
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        name = "mail.listener.accept_failed",
                        target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                        error = %e,
                        message = "Failed to accept mail connection"
                    );
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            },
            _ = shutdown.changed() => break,
        }
    }

    tracing::info!(
        name = "mail.listener.stopped",
        target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
        message = "Mail listener stopped"
    );
}

#[derive(Default)]
struct Envelope {
    from: Option<String>,
    to: Vec<String>,
}

async fn handle_session(stream: TcpStream, ctx: &SessionContext) -> Result<(), RelayError> {
    let (read, mut writer) = stream.into_split();
    let mut reader = BufReader::new(read);
    let mut envelope = Envelope::default();

    reply(&mut writer, &format!("220 {} ESMTP ready", ctx.domain)).await?;

    loop {
        let Some(line) = read_line(&mut reader, ctx.idle_timeout).await? else {
            return Ok(());
        };
        if !line.ends_with(b"\n") && line.len() as u64 >= MAX_LINE_LEN {
            reply(&mut writer, "500 Line too long").await?;
            return Ok(());
        }

        let line = String::from_utf8_lossy(&line);
        let line = line.trim_end_matches(['\r', '\n']);
        let (verb, arg) = line.split_once(' ').unwrap_or((line, ""));

        match verb.to_ascii_uppercase().as_str() {
            "EHLO" => {
                envelope = Envelope::default();
                let text = format!(
                    "250-{}\r\n250-SIZE {}\r\n250-8BITMIME\r\n250 OK",
                    ctx.domain, MAX_MESSAGE_SIZE
                );
                reply(&mut writer, &text).await?;
            }
            "HELO" => {
                envelope = Envelope::default();
                reply(&mut writer, &format!("250 {}", ctx.domain)).await?;
            }
            "MAIL" => {
                if envelope.from.is_some() {
                    reply(&mut writer, "503 Sender already specified").await?;
                } else if let Some(from) = path_argument(arg, "FROM:") {
                    envelope.from = Some(from);
                    reply(&mut writer, "250 OK").await?;
                } else {
                    reply(&mut writer, "501 Syntax: MAIL FROM:<address>").await?;
                }
            }
            "RCPT" => {
                if envelope.from.is_none() {
                    reply(&mut writer, "503 Need MAIL before RCPT").await?;
                } else if let Some(to) = path_argument(arg, "TO:").filter(|to| !to.is_empty()) {
                    envelope.to.push(to);
                    reply(&mut writer, "250 OK").await?;
                } else {
                    reply(&mut writer, "501 Syntax: RCPT TO:<address>").await?;
                }
            }
            "DATA" => {
                if envelope.to.is_empty() {
                    reply(&mut writer, "503 Need RCPT before DATA").await?;
                    continue;
                }
                reply(&mut writer, "354 End data with <CR><LF>.<CR><LF>").await?;
                let envelope = std::mem::take(&mut envelope);
                match read_data(&mut reader, ctx.idle_timeout).await? {
                    Some(data) => {
                        let msg = MailMessage::from_data(
                            envelope.from.unwrap_or_default(),
                            envelope.to,
                            &data,
                        );
                        deliver(ctx, msg).await;
                        reply(&mut writer, "250 OK: queued").await?;
                    }
                    None => {
                        reply(&mut writer, "552 Message exceeds fixed maximum size").await?;
                    }
                }
            }
            "RSET" => {
                envelope = Envelope::default();
                reply(&mut writer, "250 OK").await?;
            }
            "NOOP" => reply(&mut writer, "250 OK").await?,
            "QUIT" => {
                reply(&mut writer, "221 Bye").await?;
                return Ok(());
            }
            _ => reply(&mut writer, "502 Command not implemented").await?,
        }
    }
}

/// Stores the message and hands it to the relay without waiting for it.
async fn deliver(ctx: &SessionContext, msg: MailMessage) {
    ctx.inbox.push(msg.clone()).await;

    if !ctx.relay.is_configured() {
        tracing::warn!(
            name = "mail.listener.no_relay",
            target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
            recipients = ?msg.to(),
            subject = %msg.subject(),
            message = "No relay host configured, message kept locally only"
        );
        return;
    }

    let relay = ctx.relay.clone();
    tokio::spawn(async move {
        let recipients = msg.to().to_vec();
        if let Err(e) = forward(msg, &relay).await {
            tracing::error!(
                name = "mail.listener.forward_failed",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                recipients = ?recipients,
                host = %relay.host,
                error = %e,
                message = "Failed to relay message"
            );
        }
    });
}

/// Extracts the address from `FROM:<a@b>` style arguments. `<>` yields an
/// empty address.
fn path_argument(arg: &str, keyword: &str) -> Option<String> {
    let arg = arg.trim_start();
    let prefix = arg.get(..keyword.len())?;
    if !prefix.eq_ignore_ascii_case(keyword) {
        return None;
    }
    let rest = arg[keyword.len()..].trim_start();
    // ESMTP parameters such as SIZE=123 follow the path.
    let path = rest.split_whitespace().next().unwrap_or_default();
    let address = path
        .strip_prefix('<')
        .and_then(|p| p.strip_suffix('>'))
        .unwrap_or(path);
    if address.contains(['<', '>']) {
        return None;
    }
    Some(address.to_string())
}

async fn read_line<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    idle_timeout: Duration,
) -> Result<Option<Vec<u8>>, RelayError> {
    let mut buf = Vec::new();
    let mut limited = (&mut *reader).take(MAX_LINE_LEN);
    let read = limited.read_until(b'\n', &mut buf);
    let n = tokio::time::timeout(idle_timeout, read)
        .await
        .map_err(|_| RelayError::Timeout(idle_timeout))??;
    Ok((n > 0).then_some(buf))
}

/// Reads one complete line of any length, keeping at most `keep` bytes.
///
/// The flag is set when bytes were dropped. `None` means end of stream
/// before any byte arrived.
async fn read_long_line<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    idle_timeout: Duration,
    keep: usize,
) -> Result<Option<(Vec<u8>, bool)>, RelayError> {
    let mut line = Vec::new();
    let mut truncated = false;
    loop {
        let Some(chunk) = read_line(reader, idle_timeout).await? else {
            return Ok((!line.is_empty() || truncated).then_some((line, truncated)));
        };
        let complete = chunk.ends_with(b"\n");
        if !truncated && line.len() + chunk.len() <= keep {
            line.extend_from_slice(&chunk);
        } else {
            truncated = true;
        }
        if complete {
            return Ok(Some((line, truncated)));
        }
    }
}

/// Reads a `DATA` block up to the lone `.` line, undoing dot-stuffing.
///
/// Returns `None` when the block exceeded [`MAX_MESSAGE_SIZE`]; the rest of
/// the block is still consumed so the session stays in sync.
async fn read_data<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    idle_timeout: Duration,
) -> Result<Option<String>, RelayError> {
    let mut data = Vec::new();
    let mut oversized = false;

    loop {
        let Some((line, truncated)) =
            read_long_line(reader, idle_timeout, MAX_MESSAGE_SIZE + 2).await?
        else {
            return Err(RelayError::Io(std::io::ErrorKind::UnexpectedEof.into()));
        };
        if truncated {
            oversized = true;
            data.clear();
            continue;
        }
        let content = line
            .strip_suffix(b"\n")
            .map(|l| l.strip_suffix(b"\r").unwrap_or(l))
            .unwrap_or(&line[..]);
        if content == b"." {
            break;
        }
        if oversized {
            continue;
        }

        let content = content.strip_prefix(b".").unwrap_or(content);
        if data.len() + content.len() + 2 > MAX_MESSAGE_SIZE {
            oversized = true;
            data.clear();
            continue;
        }
        data.extend_from_slice(content);
        data.extend_from_slice(b"\r\n");
    }

    Ok((!oversized).then(|| String::from_utf8_lossy(&data).into_owned()))
}

async fn reply<W: AsyncWrite + Unpin>(writer: &mut W, text: &str) -> Result<(), RelayError> {
    writer.write_all(text.as_bytes()).await?;
    writer.write_all(b"\r\n").await?;
    writer.flush().await?;
    Ok(())
}
