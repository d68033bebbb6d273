//! Operations offered to the front-end.
//!
//! [`MonitorService`] ties the store, the scheduler, the alert pipeline and the
//! mail relay together. Every method is safe to call while check loops run.

use crate::alerts::dispatch::Channels;
use crate::alerts::{AlertDispatcher, LocalNotifier, NotificationThrottler};
use crate::config::AppConfig;
use crate::email_templates::TestEmailTemplate;
use crate::error::{PersistenceError, RelayError, ValidationError};
use crate::mail::{MailMessage, MailRelay, forward};
use crate::probe::Prober;
use crate::scheduler::CheckScheduler;
use crate::settings::{NotificationMode, Settings, load_settings, save_settings};
use crate::targets::persistence::{load_targets, save_targets};
use crate::targets::store::TargetStore;
use crate::targets::{Status, Target, validate};
use crate::utils::timeout_or_default;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

pub struct MonitorService {
    targets_file: PathBuf,
    settings_file: PathBuf,
    store: Arc<TargetStore>,
    scheduler: CheckScheduler,
    dispatcher: Arc<AlertDispatcher>,
    throttler: Arc<NotificationThrottler>,
    relay: Arc<MailRelay>,
    prober: Arc<dyn Prober>,
    settings: RwLock<Settings>,
    /// Held from snapshot to rename so saves land in call order.
    persist_lock: Mutex<()>,
}

impl MonitorService {
    pub fn new(config: &AppConfig, prober: Arc<dyn Prober>, local: Arc<dyn LocalNotifier>) -> Self {
        let store = Arc::new(TargetStore::new());
        let throttler = Arc::new(NotificationThrottler::default());
        let relay = Arc::new(MailRelay::new(config.mail_domain.clone()));
        let dispatcher = Arc::new(AlertDispatcher::new(
            Arc::clone(&throttler),
            local,
            Arc::clone(&relay),
            config.alert_sender.clone(),
        ));
        let scheduler = CheckScheduler::new(
            Arc::clone(&store),
            Arc::clone(&prober),
            Arc::clone(&dispatcher),
        );

        Self {
            targets_file: config.targets_file.clone(),
            settings_file: config.settings_file.clone(),
            store,
            scheduler,
            dispatcher,
            throttler,
            relay,
            prober,
            settings: RwLock::new(Settings::default()),
            persist_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<TargetStore> {
        &self.store
    }

    pub fn scheduler(&self) -> &CheckScheduler {
        &self.scheduler
    }

    pub fn relay(&self) -> &Arc<MailRelay> {
        &self.relay
    }

    /// Loads settings and targets, starts the mail listener and every check loop.
    ///
    /// Unreadable files are logged and replaced by defaults.
    #[tracing::instrument(skip(self))]
    pub async fn start(&self) {
        let settings = match load_settings(&self.settings_file).await {
            Ok(settings) => settings,
            Err(e) => {
                tracing::error!(
                    name = "service.start.settings_load_failed",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    path = %self.settings_file.display(),
                    error = %e,
                    message = "Failed to load settings, using defaults"
                );
                Settings::default()
            }
        };
        self.apply_settings(&settings).await;
        let relay_config = settings.smtp.clone();
        *self.settings.write().await = settings;

        let mut targets = match load_targets(&self.targets_file).await {
            Ok(targets) => targets,
            Err(e) => {
                tracing::error!(
                    name = "service.start.targets_load_failed",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    path = %self.targets_file.display(),
                    error = %e,
                    message = "Failed to load targets, starting empty"
                );
                Vec::new()
            }
        };
        for target in targets.iter_mut().filter(|t| t.id.is_empty()) {
            target.id = Uuid::new_v4().to_string();
        }
        self.store.replace_all(targets).await;

        if let Err(e) = self.relay.start(relay_config).await {
            tracing::error!(
                name = "service.start.relay_failed",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                error = %e,
                message = "Failed to start mail listener"
            );
        }

        let targets = self.store.list().await;
        for target in &targets {
            self.scheduler.start(target).await;
        }

        tracing::info!(
            name = "service.started",
            target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
            targets = targets.len(),
            message = "Monitoring started"
        );
    }

    /// Stops every loop, saves the targets with their last status and stops the listener.
    #[tracing::instrument(skip(self))]
    pub async fn shutdown(&self) {
        self.scheduler.stop_all().await;
        self.persist_targets().await;
        self.relay.stop().await;
    }

    pub async fn list_targets(&self) -> Vec<Target> {
        self.store.list().await
    }

    /// Registers a new target and starts monitoring it. An empty id gets a fresh UUID.
    #[tracing::instrument(skip(self, target), fields(name = %target.name))]
    pub async fn add_target(&self, mut target: Target) -> Result<Target, ValidationError> {
        validate(&target)?;
        if target.id.trim().is_empty() {
            target.id = Uuid::new_v4().to_string();
        }

        let stored = self.store.upsert(target).await?;
        self.persist_targets().await;
        self.scheduler.start(&stored).await;
        Ok(stored)
    }

    /// Replaces the editable fields of an existing target and restarts its loop.
    ///
    /// The last known status is kept; only check loops write statuses.
    #[tracing::instrument(skip(self, target), fields(id = %target.id))]
    pub async fn update_target(&self, target: Target) -> Result<Target, ValidationError> {
        if target.id.trim().is_empty() {
            return Err(ValidationError::MissingId);
        }
        validate(&target)?;
        let stored = self.store.update_fields(target).await?;
        self.persist_targets().await;
        self.scheduler.start(&stored).await;
        Ok(stored)
    }

    /// Stops monitoring `id` and forgets it.
    #[tracing::instrument(skip(self))]
    pub async fn delete_target(&self, id: &str) -> Result<(), ValidationError> {
        self.scheduler.stop(id).await;
        if self.store.remove(id).await.is_none() {
            return Err(ValidationError::UnknownTarget(id.to_string()));
        }
        self.persist_targets().await;
        Ok(())
    }

    /// Probes `target` once with its own timeout. Nothing is stored.
    #[tracing::instrument(skip(self, target), fields(url = %target.url))]
    pub async fn manual_check(&self, target: &Target) -> Status {
        let timeout = timeout_or_default(&target.timeout);
        self.prober.probe(target, timeout).await
    }

    pub fn set_notifications_enabled(&self, enabled: bool) {
        self.throttler.set_enabled(enabled);
    }

    pub fn notifications_enabled(&self) -> bool {
        self.throttler.is_enabled()
    }

    pub fn set_cooldown(&self, minutes: u64) {
        self.throttler.set_cooldown(minutes);
    }

    pub fn cooldown_minutes(&self) -> u64 {
        self.throttler.cooldown_minutes()
    }

    pub fn clear_cooldowns(&self) {
        self.throttler.clear_cooldowns();
    }

    /// Sends a digest of every target currently down. Returns whether one went out.
    #[tracing::instrument(skip(self))]
    pub async fn send_down_summary(&self) -> bool {
        let down = self.store.down_targets().await;
        if down.is_empty() {
            return false;
        }
        self.dispatcher.dispatch_summary(&down).await
    }

    /// Sends a test message straight through the configured relay.
    ///
    /// Unlike alerts this waits for the relay, so its errors reach the caller.
    #[tracing::instrument(skip(self))]
    pub async fn send_test_alert(&self) -> Result<(), RelayError> {
        let settings = self.settings().await;
        let recipient = settings.user_email.trim();
        if recipient.is_empty() {
            return Err(RelayError::MissingRecipient);
        }

        let template = TestEmailTemplate {
            relay_host: settings.smtp.host.clone(),
            relay_port: settings.smtp.effective_port(),
            username: settings.smtp.username.clone(),
            tls: settings.smtp.tls,
        };
        let msg = MailMessage::new(
            self.dispatcher.sender(),
            vec![recipient.to_string()],
            template.subject(),
            template.render_text(),
        );
        forward(msg, &settings.smtp).await
    }

    pub async fn settings(&self) -> Settings {
        self.settings.read().await.clone()
    }

    /// Persists and applies new settings.
    ///
    /// The mail listener is restarted when email alerts are on and its relay
    /// configuration differs from the saved one.
    #[tracing::instrument(skip(self, settings), fields(mode = settings.notification_mode.as_str()))]
    pub async fn save_settings(&self, settings: Settings) -> Result<(), PersistenceError> {
        {
            let mut current = self.settings.write().await;
            save_settings(&self.settings_file, &settings).await?;
            self.apply_settings(&settings).await;
            *current = settings.clone();
        }

        let relay_changed = self.relay.config().await != settings.smtp;
        if relay_changed && settings.notification_mode == NotificationMode::Email {
            tracing::info!(
                name = "service.save_settings.relay_restart",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                host = %settings.smtp.host,
                message = "Relay configuration changed, restarting mail listener"
            );
            if let Err(e) = self.relay.start(settings.smtp).await {
                tracing::error!(
                    name = "service.save_settings.relay_failed",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    error = %e,
                    message = "Failed to restart mail listener"
                );
            }
        }
        Ok(())
    }

    pub async fn mail_port(&self) -> Option<u16> {
        self.relay.port().await
    }

    async fn apply_settings(&self, settings: &Settings) {
        self.throttler
            .set_enabled(settings.notification_mode.notifies());
        self.throttler.set_cooldown(settings.notification_cooldown);
        self.dispatcher
            .set_channels(Channels {
                mode: settings.notification_mode,
                recipient: settings.user_email.clone(),
            })
            .await;
    }

    async fn persist_targets(&self) {
        let _guard = self.persist_lock.lock().await;
        let targets = self.store.list().await;
        if let Err(e) = save_targets(&self.targets_file, &targets).await {
            tracing::error!(
                name = "service.persist_targets.failed",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                path = %self.targets_file.display(),
                error = %e,
                message = "Failed to save targets"
            );
        }
    }
}
