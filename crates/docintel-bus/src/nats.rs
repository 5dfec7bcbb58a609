//! NATS event source.

use async_nats::Subscriber;
use async_trait::async_trait;
use futures::StreamExt;
use tracing::info;

use docintel_types::NatsSettings;

use crate::error::BusError;
use crate::source::{Delivery, EventSource};

/// Core NATS subscription on the configured subject.
///
/// Core NATS has no acknowledgements; redelivery policy, if any, belongs
/// to the broker setup.
pub struct NatsEventSource {
    subscriber: Subscriber,
    description: String,
}

impl NatsEventSource {
    /// Connect and subscribe, joining the queue group when one is set.
    pub async fn connect(settings: &NatsSettings) -> Result<Self, BusError> {
        let client = async_nats::connect(&settings.url)
            .await
            .map_err(|e| BusError::ConnectionFailed(format!("NATS connection failed: {}", e)))?;

        let subscriber = match &settings.queue_group {
            Some(group) => client
                .queue_subscribe(settings.subject.clone(), group.clone())
                .await,
            None => client.subscribe(settings.subject.clone()).await,
        }
        .map_err(|e| BusError::SubscribeFailed(format!("NATS subscribe failed: {}", e)))?;

        let description = match &settings.queue_group {
            Some(group) => format!("nats {} {} (queue {})", settings.url, settings.subject, group),
            None => format!("nats {} {}", settings.url, settings.subject),
        };
        info!(source = %description, "Subscribed to change events");

        Ok(Self {
            subscriber,
            description,
        })
    }
}

#[async_trait]
impl EventSource for NatsEventSource {
    async fn next(&mut self) -> Result<Option<Delivery>, BusError> {
        Ok(self
            .subscriber
            .next()
            .await
            .map(|msg| Delivery::new(msg.subject.to_string(), msg.payload.to_vec())))
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}
