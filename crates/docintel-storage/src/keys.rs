//! Key encoding and decoding for storage layer.
//!
//! Key formats:
//! - `tag:{uuid}` / `facet:{uuid}` for records
//! - `ft:{facet_uuid}:{tag_uuid}` for facet membership
//! - `td:{tag_uuid}:{document_uuid}` for document associations
//! - `user:{lowercase username}` for automation accounts
//!
//! Hyphenated UUIDs have a fixed width, so prefix scans over
//! `ft:{facet}:` and `td:{tag}:` never bleed into a neighbour.

use uuid::Uuid;

use crate::error::StorageError;

fn parse_uuid(part: &str, what: &str) -> Result<Uuid, StorageError> {
    part.parse()
        .map_err(|e| StorageError::Key(format!("Invalid {} id '{}': {}", what, part, e)))
}

fn key_str(bytes: &[u8]) -> Result<&str, StorageError> {
    std::str::from_utf8(bytes).map_err(|e| StorageError::Key(format!("Invalid UTF-8: {}", e)))
}

/// Key for tag records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagKey(pub Uuid);

impl TagKey {
    pub fn to_bytes(&self) -> Vec<u8> {
        format!("tag:{}", self.0).into_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        let s = key_str(bytes)?;
        let id = s
            .strip_prefix("tag:")
            .ok_or_else(|| StorageError::Key(format!("Invalid tag key format: {}", s)))?;
        Ok(Self(parse_uuid(id, "tag")?))
    }
}

/// Key for facet records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FacetKey(pub Uuid);

impl FacetKey {
    pub fn to_bytes(&self) -> Vec<u8> {
        format!("facet:{}", self.0).into_bytes()
    }
}

/// Membership of a tag in a facet
/// Format: ft:{facet_id}:{tag_id}
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FacetTagKey {
    pub facet_id: Uuid,
    pub tag_id: Uuid,
}

impl FacetTagKey {
    pub fn new(facet_id: Uuid, tag_id: Uuid) -> Self {
        Self { facet_id, tag_id }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        format!("ft:{}:{}", self.facet_id, self.tag_id).into_bytes()
    }

    /// Prefix covering every tag of a facet
    pub fn prefix(facet_id: Uuid) -> Vec<u8> {
        format!("ft:{}:", facet_id).into_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        let s = key_str(bytes)?;
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 3 || parts[0] != "ft" {
            return Err(StorageError::Key(format!(
                "Invalid facet membership key format: {}",
                s
            )));
        }
        Ok(Self {
            facet_id: parse_uuid(parts[1], "facet")?,
            tag_id: parse_uuid(parts[2], "tag")?,
        })
    }
}

/// Association of a tag with a document
/// Format: td:{tag_id}:{document_id}
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagDocumentKey {
    pub tag_id: Uuid,
    pub document_id: Uuid,
}

impl TagDocumentKey {
    pub fn new(tag_id: Uuid, document_id: Uuid) -> Self {
        Self {
            tag_id,
            document_id,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        format!("td:{}:{}", self.tag_id, self.document_id).into_bytes()
    }

    /// Prefix covering every document of a tag
    pub fn prefix(tag_id: Uuid) -> Vec<u8> {
        format!("td:{}:", tag_id).into_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        let s = key_str(bytes)?;
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 3 || parts[0] != "td" {
            return Err(StorageError::Key(format!(
                "Invalid tag document key format: {}",
                s
            )));
        }
        Ok(Self {
            tag_id: parse_uuid(parts[1], "tag")?,
            document_id: parse_uuid(parts[2], "document")?,
        })
    }
}

/// Key for automation accounts, case-insensitive on the username
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserKey {
    pub username: String,
}

impl UserKey {
    pub fn new(username: &str) -> Self {
        Self {
            username: username.trim().to_lowercase(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        format!("user:{}", self.username).into_bytes()
    }
}
