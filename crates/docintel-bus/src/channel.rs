//! In-process event source backed by a tokio mpsc channel.

use async_trait::async_trait;
use tokio::sync::mpsc;

use docintel_types::ChangeEvent;

use crate::error::BusError;
use crate::source::{Delivery, EventSource};

/// Sending half: publishes change events as JSON deliveries.
#[derive(Clone)]
pub struct ChannelPublisher {
    tx: mpsc::Sender<Delivery>,
    subject_prefix: String,
}

impl ChannelPublisher {
    /// Publish a change event on `{prefix}.{suffix}`.
    pub async fn publish(&self, event: &ChangeEvent) -> Result<(), BusError> {
        let subject = format!("{}.{}", self.subject_prefix, event.subject_suffix());
        self.publish_raw(Delivery::new(subject, event.to_bytes()?))
            .await
    }

    /// Publish an arbitrary delivery, including malformed ones.
    pub async fn publish_raw(&self, delivery: Delivery) -> Result<(), BusError> {
        self.tx
            .send(delivery)
            .await
            .map_err(|e| BusError::PublishFailed(e.to_string()))
    }
}

/// Receiving half.
pub struct ChannelEventSource {
    rx: mpsc::Receiver<Delivery>,
}

/// Create a bounded in-process source.
///
/// The source closes once every publisher is dropped.
pub fn channel(buffer: usize, subject_prefix: &str) -> (ChannelPublisher, ChannelEventSource) {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    (
        ChannelPublisher {
            tx,
            subject_prefix: subject_prefix.trim_end_matches('.').to_string(),
        },
        ChannelEventSource { rx },
    )
}

#[async_trait]
impl EventSource for ChannelEventSource {
    async fn next(&mut self) -> Result<Option<Delivery>, BusError> {
        Ok(self.rx.recv().await)
    }

    fn describe(&self) -> String {
        "in-process channel".to_string()
    }
}
