//! Change events published when tags or facets mutate.
//!
//! Each event type is its own message struct; [`ChangeEvent`] is the closed
//! set the indexer dispatches over. On the wire an event is a JSON object
//! with a `type` discriminator and PascalCase fields:
//!
//! ```json
//! {"type":"TagMerged","RetainedTagId":"...","RemovedTagId":"..."}
//! ```

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TagCreatedMessage {
    pub tag_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TagUpdatedMessage {
    pub tag_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TagRemovedMessage {
    pub tag_id: Uuid,
}

/// Two tags were merged; `removed_tag_id` no longer exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TagMergedMessage {
    pub retained_tag_id: Uuid,
    pub removed_tag_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FacetCreatedMessage {
    pub facet_tag_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FacetUpdatedMessage {
    pub facet_tag_id: Uuid,
}

/// A facet was deleted along with the listed tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FacetRemovedMessage {
    pub facet_tag_id: Uuid,
    #[serde(default)]
    pub tags: Vec<Uuid>,
}

/// Two facets were merged; `tags` moved to the retained facet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FacetMergedMessage {
    pub retained_facet_id: Uuid,
    pub removed_facet_id: Uuid,
    #[serde(default)]
    pub tags: Vec<Uuid>,
}

/// Every change event the indexer understands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ChangeEvent {
    TagCreated(TagCreatedMessage),
    TagUpdated(TagUpdatedMessage),
    TagRemoved(TagRemovedMessage),
    TagMerged(TagMergedMessage),
    FacetCreated(FacetCreatedMessage),
    FacetUpdated(FacetUpdatedMessage),
    FacetRemoved(FacetRemovedMessage),
    FacetMerged(FacetMergedMessage),
}

impl ChangeEvent {
    /// Short name of the event type, used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            ChangeEvent::TagCreated(_) => "tag_created",
            ChangeEvent::TagUpdated(_) => "tag_updated",
            ChangeEvent::TagRemoved(_) => "tag_removed",
            ChangeEvent::TagMerged(_) => "tag_merged",
            ChangeEvent::FacetCreated(_) => "facet_created",
            ChangeEvent::FacetUpdated(_) => "facet_updated",
            ChangeEvent::FacetRemoved(_) => "facet_removed",
            ChangeEvent::FacetMerged(_) => "facet_merged",
        }
    }

    /// The primary entity the event is about (retained id for merges).
    pub fn subject_id(&self) -> Uuid {
        match self {
            ChangeEvent::TagCreated(m) => m.tag_id,
            ChangeEvent::TagUpdated(m) => m.tag_id,
            ChangeEvent::TagRemoved(m) => m.tag_id,
            ChangeEvent::TagMerged(m) => m.retained_tag_id,
            ChangeEvent::FacetCreated(m) => m.facet_tag_id,
            ChangeEvent::FacetUpdated(m) => m.facet_tag_id,
            ChangeEvent::FacetRemoved(m) => m.facet_tag_id,
            ChangeEvent::FacetMerged(m) => m.retained_facet_id,
        }
    }

    /// Subject suffix used when publishing (e.g. `tag.created`).
    pub fn subject_suffix(&self) -> &'static str {
        match self {
            ChangeEvent::TagCreated(_) => "tag.created",
            ChangeEvent::TagUpdated(_) => "tag.updated",
            ChangeEvent::TagRemoved(_) => "tag.removed",
            ChangeEvent::TagMerged(_) => "tag.merged",
            ChangeEvent::FacetCreated(_) => "facet.created",
            ChangeEvent::FacetUpdated(_) => "facet.updated",
            ChangeEvent::FacetRemoved(_) => "facet.removed",
            ChangeEvent::FacetMerged(_) => "facet.merged",
        }
    }

    /// Serialize to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

impl From<TagCreatedMessage> for ChangeEvent {
    fn from(m: TagCreatedMessage) -> Self {
        ChangeEvent::TagCreated(m)
    }
}

impl From<TagUpdatedMessage> for ChangeEvent {
    fn from(m: TagUpdatedMessage) -> Self {
        ChangeEvent::TagUpdated(m)
    }
}

impl From<TagRemovedMessage> for ChangeEvent {
    fn from(m: TagRemovedMessage) -> Self {
        ChangeEvent::TagRemoved(m)
    }
}

impl From<TagMergedMessage> for ChangeEvent {
    fn from(m: TagMergedMessage) -> Self {
        ChangeEvent::TagMerged(m)
    }
}

impl From<FacetCreatedMessage> for ChangeEvent {
    fn from(m: FacetCreatedMessage) -> Self {
        ChangeEvent::FacetCreated(m)
    }
}

impl From<FacetUpdatedMessage> for ChangeEvent {
    fn from(m: FacetUpdatedMessage) -> Self {
        ChangeEvent::FacetUpdated(m)
    }
}

impl From<FacetRemovedMessage> for ChangeEvent {
    fn from(m: FacetRemovedMessage) -> Self {
        ChangeEvent::FacetRemoved(m)
    }
}

impl From<FacetMergedMessage> for ChangeEvent {
    fn from(m: FacetMergedMessage) -> Self {
        ChangeEvent::FacetMerged(m)
    }
}
