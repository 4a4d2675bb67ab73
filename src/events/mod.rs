pub mod producer;
pub mod types;

pub use producer::{EventPublisher, KafkaEventPublisher, ProducerConfig};
pub use types::{
    topics, CashInStatusChanged, EventEnvelope, EventType, LedgerEvent, WithdrawStatusChanged,
};
