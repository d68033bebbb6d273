//! Routes alerts that pass the throttler to the configured channels.

use super::{Alert, LocalNotifier, NotificationThrottler};
use crate::email_templates::{AlertEmailTemplate, SummaryEmailTemplate};
use crate::mail::{MailMessage, MailRelay};
use crate::settings::NotificationMode;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Delivery preferences, replaced whenever settings are saved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Channels {
    pub mode: NotificationMode,
    /// Recipient of email alerts; email is skipped while empty.
    pub recipient: String,
}

pub struct AlertDispatcher {
    throttler: Arc<NotificationThrottler>,
    local: Arc<dyn LocalNotifier>,
    relay: Arc<MailRelay>,
    sender: String,
    channels: RwLock<Channels>,
}

impl AlertDispatcher {
    /// `sender` is the envelope sender of alert emails.
    pub fn new(
        throttler: Arc<NotificationThrottler>,
        local: Arc<dyn LocalNotifier>,
        relay: Arc<MailRelay>,
        sender: impl Into<String>,
    ) -> Self {
        Self {
            throttler,
            local,
            relay,
            sender: sender.into(),
            channels: RwLock::new(Channels::default()),
        }
    }

    pub fn throttler(&self) -> &Arc<NotificationThrottler> {
        &self.throttler
    }

    pub fn relay(&self) -> &Arc<MailRelay> {
        &self.relay
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub async fn set_channels(&self, channels: Channels) {
        *self.channels.write().await = channels;
    }

    pub async fn channels(&self) -> Channels {
        self.channels.read().await.clone()
    }

    /// Delivers a per-target alert if the mode and the throttler allow it.
    ///
    /// Returns whether the alert was let through. Email delivery runs in a
    /// detached task and never delays the caller.
    #[tracing::instrument(skip(self, alert), fields(target_id = %alert.target_id, kind = %alert.kind))]
    pub async fn dispatch(&self, alert: Alert) -> bool {
        let email = AlertEmailTemplate::from_alert(&alert);
        let (subject, body) = (email.subject(), email.render_text());
        self.deliver(alert, subject, body).await
    }

    /// Delivers a digest of the targets currently down.
    #[tracing::instrument(skip(self))]
    pub async fn dispatch_summary(&self, down: &[String]) -> bool {
        let email = SummaryEmailTemplate {
            down: down.to_vec(),
        };
        let (subject, body) = (email.subject(), email.render_text());
        self.deliver(Alert::summary(down), subject, body).await
    }

    async fn deliver(&self, alert: Alert, subject: String, body: String) -> bool {
        let channels = self.channels().await;
        if !channels.mode.notifies() {
            return false;
        }
        if !self.throttler.try_acquire(&alert.target_id, alert.kind) {
            tracing::debug!(
                name = "alerts.dispatch.throttled",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                target_id = %alert.target_id,
                kind = %alert.kind,
                message = "Alert suppressed by throttler"
            );
            return false;
        }

        if let Err(e) = self.local.notify(&alert) {
            tracing::warn!(
                name = "alerts.dispatch.local_failed",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                error = %e,
                message = "Failed to show local notification"
            );
        }

        if channels.mode == NotificationMode::Email {
            self.send_email(&channels.recipient, subject, body);
        }
        true
    }

    fn send_email(&self, recipient: &str, subject: String, body: String) {
        if recipient.trim().is_empty() {
            tracing::warn!(
                name = "alerts.dispatch.no_recipient",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                message = "Email alerts enabled but no recipient configured"
            );
            return;
        }

        let msg = MailMessage::new(
            self.sender.clone(),
            vec![recipient.trim().to_string()],
            subject,
            body,
        );
        let relay = Arc::clone(&self.relay);
        tokio::spawn(async move {
            if let Err(e) = relay.submit(msg).await {
                tracing::error!(
                    name = "alerts.dispatch.email_failed",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    error = %e,
                    message = "Failed to submit alert email"
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::local::NotifyError;
    use crate::alerts::{AlertKind, Verdict};
    use crate::targets::{Status, Target};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<Alert>>);

    impl LocalNotifier for Recorder {
        fn notify(&self, alert: &Alert) -> Result<(), NotifyError> {
            self.0.lock().unwrap().push(alert.clone());
            Ok(())
        }
    }

    fn down_alert() -> Alert {
        let target = Target::new("api", "https://api.example", "http").with_id("t1");
        Alert::from_verdict(&target, Verdict::WentDown, &Status::down(5, "HTTP 500"))
    }

    fn dispatcher(recorder: Arc<Recorder>) -> AlertDispatcher {
        AlertDispatcher::new(
            Arc::new(NotificationThrottler::new(10)),
            recorder,
            Arc::new(MailRelay::new("localhost")),
            "alert@monitoring-app.local",
        )
    }

    #[tokio::test]
    async fn inapp_delivers_once_per_cooldown() {
        let recorder = Arc::new(Recorder::default());
        let dispatcher = dispatcher(Arc::clone(&recorder));

        assert!(dispatcher.dispatch(down_alert()).await);
        assert!(!dispatcher.dispatch(down_alert()).await);
        assert_eq!(recorder.0.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn mode_none_delivers_nothing_and_records_nothing() {
        let recorder = Arc::new(Recorder::default());
        let dispatcher = dispatcher(Arc::clone(&recorder));
        dispatcher
            .set_channels(Channels {
                mode: NotificationMode::None,
                recipient: String::new(),
            })
            .await;

        assert!(!dispatcher.dispatch(down_alert()).await);
        assert!(recorder.0.lock().unwrap().is_empty());
        assert!(
            dispatcher
                .throttler()
                .last_sent("t1", AlertKind::Down)
                .is_none()
        );
    }

    #[tokio::test]
    async fn summary_uses_the_global_key() {
        let recorder = Arc::new(Recorder::default());
        let dispatcher = dispatcher(Arc::clone(&recorder));

        assert!(dispatcher.dispatch_summary(&["a".into()]).await);
        let alerts = recorder.0.lock().unwrap();
        assert_eq!(alerts[0].kind, AlertKind::Summary);
        assert_eq!(alerts[0].target_id, crate::alerts::GLOBAL_ALERT_KEY);
    }
}
