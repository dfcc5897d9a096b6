//! Webhook subscription records, kept in an owned, lock-guarded store.
//!
//! These are the long-lived registrations managed through the service's CRUD
//! surface, as opposed to the per-job webhook URL a submitter may attach to a
//! single job. The store is a plain value: construct one at startup and hand
//! it to whatever needs it. No process-wide globals.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::webhook::signing;

/// Unique identifier for a webhook subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "wh_{}", self.0.simple())
    }
}

/// A registered webhook subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub url: String,
    /// Event names this subscriber wants (e.g. "analysis.completed").
    pub events: Vec<String>,
    pub secret: String,
    pub created_at: DateTime<Utc>,
    pub active: bool,
}

/// Lock-guarded registry of webhook subscriptions.
#[derive(Default)]
pub struct SubscriptionStore {
    inner: RwLock<HashMap<SubscriptionId, Subscription>>,
}

impl SubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscription. When no secret is supplied a random one is
    /// generated; either way the secret is returned exactly once here, as
    /// part of the created record.
    pub fn create(
        &self,
        url: impl Into<String>,
        events: Vec<String>,
        secret: Option<String>,
    ) -> Subscription {
        let subscription = Subscription {
            id: SubscriptionId::new(),
            url: url.into(),
            events,
            secret: secret.unwrap_or_else(signing::generate_secret),
            created_at: Utc::now(),
            active: true,
        };
        self.inner
            .write()
            .insert(subscription.id, subscription.clone());
        subscription
    }

    pub fn get(&self, id: SubscriptionId) -> Option<Subscription> {
        self.inner.read().get(&id).cloned()
    }

    /// Remove a subscription; returns whether it existed.
    pub fn delete(&self, id: SubscriptionId) -> bool {
        self.inner.write().remove(&id).is_some()
    }

    /// Every registered subscription, ordered by creation time.
    pub fn list(&self) -> Vec<Subscription> {
        let mut subscriptions: Vec<_> = self.inner.read().values().cloned().collect();
        subscriptions.sort_by_key(|s| s.created_at);
        subscriptions
    }

    /// Active subscriptions for a given event name.
    pub fn subscribers_for(&self, event: &str) -> Vec<Subscription> {
        self.inner
            .read()
            .values()
            .filter(|s| s.active && s.events.iter().any(|e| e == event))
            .cloned()
            .collect()
    }
}
