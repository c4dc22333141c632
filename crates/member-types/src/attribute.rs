//! Tenant member attribute schema.
//!
//! Attribute definitions arrive from the member store with their declared type as
//! free text. [`AttributeSchema::from_definitions`] validates them into the closed
//! [`AttributeType`] set once per sync run, so an unknown type is rejected before
//! any member is flattened.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MemberError;

/// Declared type of a member attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttributeType {
    Boolean,
    Number,
    Email,
    String,
    Url,
    Date,
    MultiSelect,
    /// Opaque structured value, indexed as its serialized JSON text
    Special,
}

impl AttributeType {
    /// All declared types, in declaration order.
    pub const ALL: [AttributeType; 8] = [
        AttributeType::Boolean,
        AttributeType::Number,
        AttributeType::Email,
        AttributeType::String,
        AttributeType::Url,
        AttributeType::Date,
        AttributeType::MultiSelect,
        AttributeType::Special,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AttributeType::Boolean => "BOOLEAN",
            AttributeType::Number => "NUMBER",
            AttributeType::Email => "EMAIL",
            AttributeType::String => "STRING",
            AttributeType::Url => "URL",
            AttributeType::Date => "DATE",
            AttributeType::MultiSelect => "MULTI_SELECT",
            AttributeType::Special => "SPECIAL",
        }
    }

    /// Parse a declared type, returning None for anything outside the closed set.
    ///
    /// Matching ignores case and underscores, so `MULTI_SELECT` and `multiSelect`
    /// are the same type.
    pub fn parse(s: &str) -> Option<Self> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '_')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match normalized.as_str() {
            "boolean" => Some(AttributeType::Boolean),
            "number" => Some(AttributeType::Number),
            "email" => Some(AttributeType::Email),
            "string" => Some(AttributeType::String),
            "url" => Some(AttributeType::Url),
            "date" => Some(AttributeType::Date),
            "multiselect" => Some(AttributeType::MultiSelect),
            "special" => Some(AttributeType::Special),
            _ => None,
        }
    }
}

impl FromStr for AttributeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown attribute type: {}", s))
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attribute definition as stored for a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDefinition {
    /// Attribute name, the key used in the member attribute bag
    pub name: String,

    /// Declared type, validated by [`AttributeSchema::from_definitions`]
    #[serde(rename = "type")]
    pub type_name: String,
}

impl AttributeDefinition {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }

    /// Convenience constructor from an already-typed attribute.
    pub fn typed(name: impl Into<String>, attribute_type: AttributeType) -> Self {
        Self::new(name, attribute_type.as_str())
    }
}

/// A validated attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedAttribute {
    pub name: String,
    pub attribute_type: AttributeType,
}

/// Validated attribute schema for one tenant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeSchema {
    attributes: Vec<TypedAttribute>,
}

impl AttributeSchema {
    /// Validate raw definitions.
    ///
    /// # Errors
    ///
    /// Returns `MemberError::UnmappedAttributeType` for the first definition whose
    /// declared type is outside the closed set.
    pub fn from_definitions(definitions: &[AttributeDefinition]) -> Result<Self, MemberError> {
        let attributes = definitions
            .iter()
            .map(|def| {
                AttributeType::parse(&def.type_name)
                    .map(|attribute_type| TypedAttribute {
                        name: def.name.clone(),
                        attribute_type,
                    })
                    .ok_or_else(|| MemberError::UnmappedAttributeType {
                        attribute: def.name.clone(),
                        type_name: def.type_name.clone(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { attributes })
    }

    /// Build a schema from typed pairs.
    pub fn from_typed<I, S>(attributes: I) -> Self
    where
        I: IntoIterator<Item = (S, AttributeType)>,
        S: Into<String>,
    {
        Self {
            attributes: attributes
                .into_iter()
                .map(|(name, attribute_type)| TypedAttribute {
                    name: name.into(),
                    attribute_type,
                })
                .collect(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &TypedAttribute> {
        self.attributes.iter()
    }

    pub fn get(&self, name: &str) -> Option<&TypedAttribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}
