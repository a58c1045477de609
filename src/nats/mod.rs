//! NATS JetStream plumbing
//!
//! Durable transport for migration partitions and notifications, and the
//! parking subject for deliveries the retry policy gave up on.

pub mod client;
pub mod consumer;
pub mod handlers;
pub mod messages;

pub use client::NatsClient;
pub use consumer::{consume, Delivery};
pub use handlers::{AckOnSuccess, ParkingSink};
pub use messages::{
    ParkedNotification, NOTIFICATION_CONSUMER, NOTIFICATION_SUBJECT, PARKED_SUBJECT,
    PARTITION_CONSUMER, PARTITION_SUBJECT, STREAM_NAME,
};
