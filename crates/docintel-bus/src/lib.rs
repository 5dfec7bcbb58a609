//! # docintel-bus
//!
//! Sources of change events for the DocIntel indexer.
//!
//! A source yields raw [`Delivery`] values; decoding into a
//! [`docintel_types::ChangeEvent`] is left to the caller so a malformed
//! payload can be logged and dropped without tearing down the stream.
//!
//! Two sources are provided:
//! - [`NatsEventSource`]: core NATS subscription, optionally in a queue group
//! - [`ChannelEventSource`]: in-process tokio channel, used by tests and demos

pub mod channel;
pub mod error;
pub mod nats;
pub mod source;

pub use channel::{channel, ChannelEventSource, ChannelPublisher};
pub use error::BusError;
pub use nats::NatsEventSource;
pub use source::{Delivery, EventSource};
