//! Provider webhook adapters.
//!
//! Each provider module turns its own JSON into a [`NormalizedWebhookEvent`];
//! nothing past this layer looks at provider-specific field names.

pub mod normalized;
pub mod provider;

mod podpay;
mod reflowpay;
mod veltrax;

pub use normalized::{NormalizedWebhookEvent, ReferenceCandidates};
pub use provider::ProviderKind;
