//! Hierarchical addressing of entities inside the configuration model.
//!
//! The engine treats a [`Path`] as an opaque token. The only thing it ever
//! asks of one is the key values, which end up inside command text such as
//! `show running-config interface {interface}`.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One `(entity_type, key)` step of a path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Segment {
    pub entity_type: String,
    pub key: Option<String>,
}

/// Address of an entity or of a collection within the model tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Path {
    segments: Vec<Segment>,
}

impl Path {
    /// The empty path (model root).
    pub fn root() -> Self {
        Self::default()
    }

    /// Appends a keyed segment.
    pub fn child(mut self, entity_type: impl Into<String>, key: impl Into<String>) -> Self {
        self.segments.push(Segment {
            entity_type: entity_type.into(),
            key: Some(key.into()),
        });
        self
    }

    /// Appends an unkeyed segment (a singleton container or a whole collection).
    pub fn container(mut self, entity_type: impl Into<String>) -> Self {
        self.segments.push(Segment {
            entity_type: entity_type.into(),
            key: None,
        });
        self
    }

    /// Returns a copy of this path with the last segment keyed by `key`.
    ///
    /// Used to turn a collection path into the path of one of its members.
    pub fn with_key(&self, key: impl Into<String>) -> Self {
        let mut path = self.clone();
        if let Some(last) = path.segments.last_mut() {
            last.key = Some(key.into());
        }
        path
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Entity type of the last segment.
    pub fn entity_type(&self) -> Option<&str> {
        self.segments.last().map(|s| s.entity_type.as_str())
    }

    /// Key of the last segment.
    pub fn key(&self) -> Option<&str> {
        self.segments.last().and_then(|s| s.key.as_deref())
    }

    /// Key of the nearest segment with the given entity type.
    pub fn key_of(&self, entity_type: &str) -> Option<&str> {
        self.segments
            .iter()
            .rev()
            .find(|s| s.entity_type == entity_type)
            .and_then(|s| s.key.as_deref())
    }

    /// All `(entity_type, key)` pairs of keyed segments, root first.
    pub fn keys(&self) -> impl Iterator<Item = (&str, &str)> {
        self.segments
            .iter()
            .filter_map(|s| s.key.as_deref().map(|k| (s.entity_type.as_str(), k)))
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "/");
        }
        for segment in &self.segments {
            write!(f, "/{}", segment.entity_type)?;
            if let Some(key) = &segment.key {
                write!(f, "[{key}]")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::Path;

    #[test]
    fn display_renders_keys_in_brackets() {
        let path = Path::root()
            .container("interfaces")
            .child("interface", "GigabitEthernet0/1");
        assert_eq!(path.to_string(), "/interfaces/interface[GigabitEthernet0/1]");
        assert_eq!(Path::root().to_string(), "/");
    }

    #[test]
    fn key_of_finds_nearest_segment() {
        let path = Path::root()
            .child("upstream", "1/0.0")
            .child("modulation-profile", "3");
        assert_eq!(path.key_of("upstream"), Some("1/0.0"));
        assert_eq!(path.key(), Some("3"));
        assert_eq!(path.entity_type(), Some("modulation-profile"));
        assert_eq!(path.key_of("interface"), None);
    }

    #[test]
    fn with_key_turns_collection_into_member() {
        let collection = Path::root().container("interface");
        let member = collection.with_key("Loopback0");
        assert_eq!(collection.key(), None);
        assert_eq!(member.key(), Some("Loopback0"));
        assert_eq!(member.keys().collect::<Vec<_>>(), vec![("interface", "Loopback0")]);
    }
}
