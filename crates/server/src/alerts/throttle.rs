//! Per-target, per-kind alert cooldowns and the global on/off switch.

use super::AlertKind;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;
use tokio::time::Duration;

/// Default cooldown between two alerts of the same kind for the same target.
pub const DEFAULT_COOLDOWN_MINUTES: u64 = 10;

pub struct NotificationThrottler {
    enabled: AtomicBool,
    cooldown_secs: AtomicU64,
    last_sent: DashMap<(String, AlertKind), Instant>,
}

impl Default for NotificationThrottler {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN_MINUTES)
    }
}

impl NotificationThrottler {
    pub fn new(cooldown_minutes: u64) -> Self {
        Self {
            enabled: AtomicBool::new(true),
            cooldown_secs: AtomicU64::new(cooldown_minutes.saturating_mul(60)),
            last_sent: DashMap::new(),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_cooldown(&self, minutes: u64) {
        self.set_cooldown_duration(Duration::from_secs(minutes.saturating_mul(60)));
    }

    pub fn set_cooldown_duration(&self, cooldown: Duration) {
        self.cooldown_secs.store(cooldown.as_secs(), Ordering::SeqCst);
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs.load(Ordering::SeqCst))
    }

    pub fn cooldown_minutes(&self) -> u64 {
        self.cooldown().as_secs() / 60
    }

    /// Forgets every recorded send, so the next alert of any kind goes out.
    pub fn clear_cooldowns(&self) {
        self.last_sent.clear();
    }

    /// When an alert of `kind` was last let through for `target_id`.
    pub fn last_sent(&self, target_id: &str, kind: AlertKind) -> Option<Instant> {
        self.last_sent
            .get(&(target_id.to_string(), kind))
            .map(|entry| *entry)
    }

    /// Asks for permission to emit an alert now, recording the send if granted.
    ///
    /// Critical alerts skip the cooldown but are still recorded; nothing passes
    /// while the throttler is disabled.
    pub fn try_acquire(&self, target_id: &str, kind: AlertKind) -> bool {
        if !self.is_enabled() {
            return false;
        }

        let cooldown = self.cooldown();
        let now = Instant::now();
        match self.last_sent.entry((target_id.to_string(), kind)) {
            Entry::Vacant(slot) => {
                slot.insert(now);
                true
            }
            Entry::Occupied(mut slot) => {
                let last = *slot.get();
                if kind != AlertKind::Critical && now.duration_since(last) < cooldown {
                    return false;
                }
                slot.insert(last.max(now));
                true
            }
        }
    }
}
