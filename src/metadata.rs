//! Entity metadata as seen through an OData `$metadata` document.
//!
//! Only what the filter layer needs survives here: property EDM types, which decide
//! case-insensitive comparison, and the properties a free-text search spans.

use crate::condition::{Condition, Group, Leaf, Operator};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// EDM primitive type of an entity property.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EdmType {
    String,
    Boolean,
    Byte,
    SByte,
    Int16,
    Int32,
    Int64,
    Decimal,
    Double,
    Single,
    Date,
    DateTimeOffset,
    TimeOfDay,
    Guid,
    /// Any type name not listed above, kept verbatim
    Other(String),
}

impl EdmType {
    pub fn name(&self) -> &str {
        match self {
            EdmType::String => "Edm.String",
            EdmType::Boolean => "Edm.Boolean",
            EdmType::Byte => "Edm.Byte",
            EdmType::SByte => "Edm.SByte",
            EdmType::Int16 => "Edm.Int16",
            EdmType::Int32 => "Edm.Int32",
            EdmType::Int64 => "Edm.Int64",
            EdmType::Decimal => "Edm.Decimal",
            EdmType::Double => "Edm.Double",
            EdmType::Single => "Edm.Single",
            EdmType::Date => "Edm.Date",
            EdmType::DateTimeOffset => "Edm.DateTimeOffset",
            EdmType::TimeOfDay => "Edm.TimeOfDay",
            EdmType::Guid => "Edm.Guid",
            EdmType::Other(name) => name,
        }
    }

    /// String properties compare case-insensitively.
    pub fn is_case_insensitive(&self) -> bool {
        matches!(self, EdmType::String)
    }
}

impl From<String> for EdmType {
    fn from(name: String) -> Self {
        match name.as_str() {
            "Edm.String" => EdmType::String,
            "Edm.Boolean" => EdmType::Boolean,
            "Edm.Byte" => EdmType::Byte,
            "Edm.SByte" => EdmType::SByte,
            "Edm.Int16" => EdmType::Int16,
            "Edm.Int32" => EdmType::Int32,
            "Edm.Int64" => EdmType::Int64,
            "Edm.Decimal" => EdmType::Decimal,
            "Edm.Double" => EdmType::Double,
            "Edm.Single" => EdmType::Single,
            "Edm.Date" => EdmType::Date,
            "Edm.DateTimeOffset" => EdmType::DateTimeOffset,
            "Edm.TimeOfDay" => EdmType::TimeOfDay,
            "Edm.Guid" => EdmType::Guid,
            _ => EdmType::Other(name),
        }
    }
}

impl From<EdmType> for String {
    fn from(edm: EdmType) -> Self {
        edm.name().to_string()
    }
}

/// Filter-relevant metadata of one entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMetadata {
    /// Entity set (and table) the entity is queried from
    pub entity_set: String,
    #[serde(default)]
    pub properties: BTreeMap<String, EdmType>,
    /// Properties a free-text search spans; every string property when empty
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub search_fields: Vec<String>,
}

impl EntityMetadata {
    pub fn new(entity_set: impl Into<String>) -> Self {
        Self {
            entity_set: entity_set.into(),
            properties: BTreeMap::new(),
            search_fields: Vec::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, edm: EdmType) -> Self {
        self.properties.insert(name.into(), edm);
        self
    }

    pub fn with_search_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.search_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn property_type(&self, name: &str) -> Option<&EdmType> {
        self.properties.get(name)
    }

    pub fn case_insensitive_fields(&self) -> HashSet<String> {
        self.properties
            .iter()
            .filter(|(_, edm)| edm.is_case_insensitive())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Builds the search-across-fields condition for `text`: one case-insensitive
    /// `Contains` per search field, ORed. `None` for blank text or no searchable field.
    pub fn search_condition(&self, text: &str) -> Option<Condition> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        let fields: Vec<&str> = if self.search_fields.is_empty() {
            self.properties
                .iter()
                .filter(|(_, edm)| edm.is_case_insensitive())
                .map(|(name, _)| name.as_str())
                .collect()
        } else {
            self.search_fields.iter().map(String::as_str).collect()
        };

        let mut leaves: Vec<Condition> = fields
            .into_iter()
            .map(|field| Condition::Leaf(Leaf::new(field, Operator::Contains, text).with_case_sensitive(false)))
            .collect();

        match leaves.len() {
            0 => None,
            1 => leaves.pop(),
            _ => Some(Condition::Group(Group::any(leaves))),
        }
    }
}
