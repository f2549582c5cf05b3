//! Index and type definitions
//!
//! An [`IndexDefinition`] is the in-process declaration of one backend index:
//! its settings plus the field mappings of every document type it hosts. The
//! definition is hashed at startup to detect schema drift (see `hash.rs`).

use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Identifies one document type within one index.
///
/// Serializes to the single string key `"index/type"`, which also partitions
/// the recovery queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexType {
    index: String,
    type_name: String,
}

impl IndexType {
    pub fn new(index: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            type_name: type_name.into(),
        }
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// The queue-partition key, `"index/type"`
    pub fn key(&self) -> String {
        format!("{}/{}", self.index, self.type_name)
    }
}

impl fmt::Display for IndexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.index, self.type_name)
    }
}

impl FromStr for IndexType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(index), Some(type_name), None) if !index.is_empty() && !type_name.is_empty() => {
                Ok(IndexType::new(index, type_name))
            }
            _ => Err(AppError::Validation(format!(
                "Unsupported index type value [{}], expected \"index/type\"",
                s
            ))),
        }
    }
}

/// Field mapping types understood by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    Keyword {
        sortable: bool,
        searchable: bool,
        norms: bool,
    },
    Text {
        searchable: bool,
        norms: bool,
    },
    Boolean,
    Integer,
    Long,
    Double,
    Date,
    UuidPath,
    Nested(BTreeMap<String, FieldType>),
}

impl FieldType {
    /// Keyword field with sorting, search and norms enabled
    pub fn keyword() -> Self {
        FieldType::Keyword {
            sortable: true,
            searchable: true,
            norms: true,
        }
    }

    /// Text field with search and norms enabled
    pub fn text() -> Self {
        FieldType::Text {
            searchable: true,
            norms: true,
        }
    }
}

/// Field mappings for one document type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeMapping {
    pub name: String,
    /// BTreeMap so declaration order never affects the definition hash
    pub fields: BTreeMap<String, FieldType>,
}

impl TypeMapping {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.insert(name.into(), field_type);
        self
    }
}

/// Settings carried by a definition and hashed with it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSettingsDef {
    pub shards: u32,
    pub replicas: u32,
    /// None keeps the backend default; Some(-1 semantics) is not modelled,
    /// disable refresh by passing 0
    pub refresh_interval_secs: Option<u32>,
}

impl Default for IndexSettingsDef {
    fn default() -> Self {
        Self {
            shards: 1,
            replicas: 0,
            refresh_interval_secs: None,
        }
    }
}

/// Declaration of one backend index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDefinition {
    pub name: String,
    pub settings: IndexSettingsDef,
    pub types: Vec<TypeMapping>,
}

impl IndexDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            settings: IndexSettingsDef::default(),
            types: Vec::new(),
        }
    }

    pub fn with_settings(mut self, settings: IndexSettingsDef) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_type(mut self, mapping: TypeMapping) -> Self {
        self.types.push(mapping);
        self
    }

    /// All index types declared by this definition
    pub fn index_types(&self) -> Vec<IndexType> {
        self.types
            .iter()
            .map(|t| IndexType::new(&self.name, &t.name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_round_trip() {
        let it = IndexType::new("issues", "issue");
        assert_eq!(it.key(), "issues/issue");
        let parsed: IndexType = "issues/issue".parse().unwrap();
        assert_eq!(parsed, it);
    }

    #[test]
    fn test_invalid_keys_fail_parsing() {
        for bad in ["", "issues", "issues/", "/issue", "a/b/c"] {
            let err = bad.parse::<IndexType>().unwrap_err();
            assert!(err.to_string().contains("Unsupported index type value"));
        }
    }

    #[test]
    fn test_definition_lists_its_types() {
        let def = IndexDefinition::new("issues")
            .with_type(TypeMapping::new("issue"))
            .with_type(TypeMapping::new("authorization"));
        let types = def.index_types();
        assert_eq!(types.len(), 2);
        assert_eq!(types[0].key(), "issues/issue");
        assert_eq!(types[1].key(), "issues/authorization");
    }
}
