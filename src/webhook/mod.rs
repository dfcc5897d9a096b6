//! Webhook delivery: event payloads, HMAC signing, the retrying dispatcher,
//! and the subscription registry.

pub mod dispatcher;
pub mod events;
pub mod signing;
pub mod subscriptions;

pub use dispatcher::{WebhookDispatcher, EVENT_HEADER, SIGNATURE_HEADER};
pub use events::{JobEventData, WebhookEvent, WebhookEventType};
pub use subscriptions::{Subscription, SubscriptionId, SubscriptionStore};
