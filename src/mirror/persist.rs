//! XML persistence of definitions containers.
//!
//! A definitions file holds one container value whose schema carries a
//! builder-array field; that field is found once per store by scanning the
//! container schema. Files are written as indented XML (two spaces) and read
//! with comments and insignificant whitespace ignored.

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::builder::ObjectBuilder;
use crate::error::{MirrorResult, PersistenceError};

const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n";

/// Kind of a container field, as seen by the schema scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Array of builder payloads; the field a store persists into.
    BuilderArray,
    StringArray,
    Scalar,
}

/// One field of a container schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerField {
    pub name: &'static str,
    pub kind: FieldKind,
}

/// A serializable root container for definitions files.
pub trait DefinitionsContainer: Serialize + DeserializeOwned + Default + Send + Sync + 'static {
    /// Root element name.
    const ROOT: &'static str;

    /// Declared fields, in declaration order.
    fn schema() -> &'static [ContainerField];

    /// Stores `builders` into the named builder-array field. Returns false if
    /// no such field exists.
    fn set_builders(&mut self, field: &str, builders: Vec<ObjectBuilder>) -> bool;

    /// Reads the named builder-array field.
    fn builders(&self, field: &str) -> Option<&[ObjectBuilder]>;
}

/// First builder-array field of `C`'s schema.
#[must_use]
pub fn locate_builder_field<C: DefinitionsContainer>() -> Option<ContainerField> {
    C::schema()
        .iter()
        .find(|f| f.kind == FieldKind::BuilderArray)
        .copied()
}

/// Stock definitions container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename = "Definitions")]
pub struct Definitions {
    #[serde(rename = "@version", default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(rename = "Category", default)]
    pub categories: Vec<String>,

    #[serde(rename = "Entry", default)]
    pub entries: Vec<ObjectBuilder>,
}

impl DefinitionsContainer for Definitions {
    const ROOT: &'static str = "Definitions";

    fn schema() -> &'static [ContainerField] {
        const SCHEMA: &[ContainerField] = &[
            ContainerField {
                name: "version",
                kind: FieldKind::Scalar,
            },
            ContainerField {
                name: "categories",
                kind: FieldKind::StringArray,
            },
            ContainerField {
                name: "entries",
                kind: FieldKind::BuilderArray,
            },
        ];
        SCHEMA
    }

    fn set_builders(&mut self, field: &str, builders: Vec<ObjectBuilder>) -> bool {
        match field {
            "entries" => {
                self.entries = builders;
                true
            }
            _ => false,
        }
    }

    fn builders(&self, field: &str) -> Option<&[ObjectBuilder]> {
        match field {
            "entries" => Some(&self.entries),
            _ => None,
        }
    }
}

/// Reads and parses a definitions file.
///
/// # Errors
/// - `ConfigFileMissing` if `path` does not exist
/// - `ConfigFileEmpty` if it holds nothing but whitespace
/// - `ConfigFileCorrupted` if it cannot be read or parsed
pub fn load_content_file<C: DefinitionsContainer>(path: &Path) -> MirrorResult<C> {
    if !path.exists() {
        return Err(PersistenceError::ConfigFileMissing {
            path: path.to_path_buf(),
        }
        .into());
    }

    let text = fs::read_to_string(path).map_err(|e| corrupted(path, e.to_string()))?;
    if text.trim().is_empty() {
        return Err(PersistenceError::ConfigFileEmpty {
            path: path.to_path_buf(),
        }
        .into());
    }

    let content = quick_xml::de::from_str::<C>(&text).map_err(|e| {
        error!(path = %path.display(), error = %e, "failed to parse definitions file");
        corrupted(path, e.to_string())
    })?;
    debug!(path = %path.display(), "loaded definitions file");
    Ok(content)
}

/// Serializes `content` and writes it to `path`.
///
/// # Errors
/// `ConfigFileCorrupted` if serialization or the write fails.
pub fn save_content_file<C: DefinitionsContainer>(content: &C, path: &Path) -> MirrorResult<()> {
    let xml = to_xml(content).map_err(|reason| corrupted(path, reason))?;
    fs::write(path, xml).map_err(|e| {
        error!(path = %path.display(), error = %e, "failed to write definitions file");
        corrupted(path, e.to_string())
    })?;
    debug!(path = %path.display(), "saved definitions file");
    Ok(())
}

/// Indented XML text of `content`, including the declaration.
pub fn to_xml<C: DefinitionsContainer>(content: &C) -> Result<String, String> {
    let mut body = String::new();
    let mut ser = quick_xml::se::Serializer::with_root(&mut body, Some(C::ROOT))
        .map_err(|e| e.to_string())?;
    ser.indent(' ', 2);
    content.serialize(ser).map_err(|e| e.to_string())?;

    let mut out = String::with_capacity(XML_DECLARATION.len() + body.len() + 1);
    out.push_str(XML_DECLARATION);
    out.push_str(&body);
    out.push('\n');
    Ok(out)
}

fn corrupted(path: &Path, reason: String) -> PersistenceError {
    PersistenceError::ConfigFileCorrupted {
        path: path.to_path_buf(),
        reason,
    }
}
