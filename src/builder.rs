//! Builder payloads.
//!
//! An `ObjectBuilder` is the serializable form of a host entity: a type tag,
//! an optional subtype and a flat list of named properties. Mirrored entities
//! wrap one builder each and hand it back for persistence.
//!
//! Every string field is written as an XML attribute. Element text is trimmed
//! on read; attribute values come back byte for byte.

use serde::{Deserialize, Serialize};

/// Serializable payload backing one mirrored entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectBuilder {
    #[serde(rename = "@type")]
    pub type_id: String,

    #[serde(rename = "@subtype", default, skip_serializing_if = "String::is_empty")]
    pub subtype_name: String,

    #[serde(rename = "Property", default)]
    pub properties: Vec<BuilderProperty>,
}

/// One named property of a builder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuilderProperty {
    #[serde(rename = "@name")]
    pub name: String,

    #[serde(rename = "@value", default)]
    pub value: String,
}

impl ObjectBuilder {
    /// Type tag of a freshly allocated builder.
    pub const ENTITY_BASE: &'static str = "EntityBase";

    /// Creates an empty builder of the given type.
    #[must_use]
    pub fn new(type_id: impl Into<String>) -> Self {
        Self {
            type_id: type_id.into(),
            subtype_name: String::new(),
            properties: Vec::new(),
        }
    }

    /// Creates an empty `EntityBase` builder.
    #[must_use]
    pub fn entity_base() -> Self {
        Self::new(Self::ENTITY_BASE)
    }

    /// Sets the subtype, returning the builder.
    #[must_use]
    pub fn with_subtype(mut self, subtype: impl Into<String>) -> Self {
        self.subtype_name = subtype.into();
        self
    }

    /// Sets a property, returning the builder.
    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_property(name, value);
        self
    }

    /// Returns the value of a property, if set.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }

    /// Sets a property, replacing an existing value of the same name.
    pub fn set_property(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.properties.iter_mut().find(|p| p.name == name) {
            Some(existing) => existing.value = value,
            None => self.properties.push(BuilderProperty { name, value }),
        }
    }
}
