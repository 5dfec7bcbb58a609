//! Event source abstraction.

use async_trait::async_trait;

use docintel_types::ChangeEvent;

use crate::error::BusError;

/// A raw message as delivered by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub subject: String,
    pub payload: Vec<u8>,
}

impl Delivery {
    pub fn new(subject: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            subject: subject.into(),
            payload,
        }
    }

    /// Decode the payload as a change event.
    pub fn decode(&self) -> Result<ChangeEvent, BusError> {
        ChangeEvent::from_bytes(&self.payload).map_err(|e| BusError::InvalidMessage {
            subject: self.subject.clone(),
            reason: e.to_string(),
        })
    }
}

/// A stream of deliveries, at least once and in no guaranteed order.
#[async_trait]
pub trait EventSource: Send {
    /// Wait for the next delivery. `Ok(None)` means the source is closed.
    async fn next(&mut self) -> Result<Option<Delivery>, BusError>;

    /// Human-readable description for logs.
    fn describe(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;
    use docintel_types::TagCreatedMessage;
    use uuid::Uuid;

    #[test]
    fn test_decode_valid_payload() {
        let event: ChangeEvent = TagCreatedMessage {
            tag_id: Uuid::new_v4(),
        }
        .into();
        let delivery = Delivery::new("docintel.index.tag.created", event.to_bytes().unwrap());
        assert_eq!(delivery.decode().unwrap(), event);
    }

    #[test]
    fn test_decode_garbage_names_subject() {
        let delivery = Delivery::new("docintel.index.tag.created", b"not json".to_vec());
        match delivery.decode() {
            Err(BusError::InvalidMessage { subject, .. }) => {
                assert_eq!(subject, "docintel.index.tag.created")
            }
            other => panic!("unexpected result {:?}", other),
        }
    }
}
