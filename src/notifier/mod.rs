//! Signed merchant callbacks fired after a record becomes paid.

pub mod dispatcher;
pub mod payload;
pub mod signature;

pub use dispatcher::{DeliveryReport, WebhookNotifier};
pub use payload::CallbackPayload;
