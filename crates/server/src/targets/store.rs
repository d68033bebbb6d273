//! Authoritative, lock-guarded set of monitored targets.

use super::{Status, Target, validate};
use crate::error::ValidationError;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Thread-safe target registry.
///
/// Every accessor hands out clones; callers never hold a reference into the map.
#[derive(Default)]
pub struct TargetStore {
    targets: RwLock<HashMap<String, Target>>,
}

impl TargetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all targets, ordered by name then id.
    pub async fn list(&self) -> Vec<Target> {
        let targets = self.targets.read().await;
        let mut out: Vec<Target> = targets.values().cloned().collect();
        out.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        out
    }

    pub async fn get(&self, id: &str) -> Option<Target> {
        self.targets.read().await.get(id).cloned()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.targets.read().await.contains_key(id)
    }

    /// Validates and stores a target, replacing any target with the same id.
    pub async fn upsert(&self, target: Target) -> Result<Target, ValidationError> {
        validate(&target)?;
        if target.id.is_empty() {
            return Err(ValidationError::MissingId);
        }
        let mut targets = self.targets.write().await;
        targets.insert(target.id.clone(), target.clone());
        Ok(target)
    }

    /// Replaces the editable fields of an existing target, keeping its status.
    ///
    /// The status is carried over under the write lock, so a check result
    /// stored concurrently is never lost.
    pub async fn update_fields(&self, mut target: Target) -> Result<Target, ValidationError> {
        validate(&target)?;
        let mut targets = self.targets.write().await;
        let Some(current) = targets.get_mut(&target.id) else {
            return Err(ValidationError::UnknownTarget(target.id));
        };
        target.status = current.status.clone();
        *current = target.clone();
        Ok(target)
    }

    pub async fn remove(&self, id: &str) -> Option<Target> {
        self.targets.write().await.remove(id)
    }

    /// Replaces the whole set, e.g. after loading from disk. Entries are not validated.
    pub async fn replace_all(&self, loaded: Vec<Target>) {
        let mut targets = self.targets.write().await;
        targets.clear();
        for target in loaded {
            targets.insert(target.id.clone(), target);
        }
    }

    pub async fn status(&self, id: &str) -> Option<Status> {
        self.targets.read().await.get(id).map(|t| t.status.clone())
    }

    /// Replaces the status of a target. Returns `false` if the target is gone.
    pub async fn set_status(&self, id: &str, status: Status) -> bool {
        let mut targets = self.targets.write().await;
        match targets.get_mut(id) {
            Some(target) => {
                target.status = status;
                true
            }
            None => false,
        }
    }

    /// Names of targets whose last check failed.
    pub async fn down_targets(&self) -> Vec<String> {
        self.list()
            .await
            .into_iter()
            .filter(|t| !t.status.is_up)
            .map(|t| t.name)
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.targets.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.targets.read().await.is_empty()
    }
}
