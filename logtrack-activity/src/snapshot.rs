//! Snapshots: named bags of typed properties attached to events and activities.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::{Timestamp, next_id};

/// Declared data type of a user-defined property (`#%type/key=value`)
///
/// Parses from the single-letter specifiers (`i`, `l`, `f`, `d`, `n`, `s`,
/// `b`) as well as the full type names, ignoring case.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::EnumString,
    strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum DataType {
    #[strum(to_string = "integer", serialize = "i", serialize = "int")]
    Integer,
    #[strum(to_string = "long", serialize = "l")]
    Long,
    #[strum(to_string = "float", serialize = "f")]
    Float,
    #[strum(to_string = "double", serialize = "d")]
    Double,
    #[strum(to_string = "number", serialize = "n")]
    Number,
    #[strum(to_string = "string", serialize = "s")]
    String,
    #[strum(to_string = "boolean", serialize = "b", serialize = "bool")]
    Boolean,
}

impl DataType {
    /// Single-letter specifier used in annotations.
    pub fn specifier(&self) -> char {
        match self {
            DataType::Integer => 'i',
            DataType::Long => 'l',
            DataType::Float => 'f',
            DataType::Double => 'd',
            DataType::Number => 'n',
            DataType::String => 's',
            DataType::Boolean => 'b',
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PropertyError {
    #[error("'{value}' is not a valid {data_type}")]
    InvalidValue { data_type: DataType, value: String },
}

/// Typed property value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum PropertyValue {
    Integer(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Number(serde_json::Number),
    String(String),
    Boolean(bool),
}

impl PropertyValue {
    /// Coerce a raw annotation value to the declared data type.
    pub fn parse(data_type: DataType, raw: &str) -> Result<Self, PropertyError> {
        let trimmed = raw.trim();
        let invalid = || PropertyError::InvalidValue {
            data_type,
            value: raw.to_string(),
        };
        let value = match data_type {
            DataType::Integer => PropertyValue::Integer(trimmed.parse().map_err(|_| invalid())?),
            DataType::Long => PropertyValue::Long(trimmed.parse().map_err(|_| invalid())?),
            DataType::Float => PropertyValue::Float(trimmed.parse().map_err(|_| invalid())?),
            DataType::Double => PropertyValue::Double(trimmed.parse().map_err(|_| invalid())?),
            DataType::Number => PropertyValue::Number(trimmed.parse().map_err(|_| invalid())?),
            DataType::String => PropertyValue::String(raw.to_string()),
            DataType::Boolean => PropertyValue::Boolean(trimmed.eq_ignore_ascii_case("true")),
        };
        Ok(value)
    }

    pub fn data_type(&self) -> DataType {
        match self {
            PropertyValue::Integer(_) => DataType::Integer,
            PropertyValue::Long(_) => DataType::Long,
            PropertyValue::Float(_) => DataType::Float,
            PropertyValue::Double(_) => DataType::Double,
            PropertyValue::Number(_) => DataType::Number,
            PropertyValue::String(_) => DataType::String,
            PropertyValue::Boolean(_) => DataType::Boolean,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Integer(v) => write!(f, "{v}"),
            PropertyValue::Long(v) => write!(f, "{v}"),
            PropertyValue::Float(v) => write!(f, "{v}"),
            PropertyValue::Double(v) => write!(f, "{v}"),
            PropertyValue::Number(v) => write!(f, "{v}"),
            PropertyValue::String(v) => f.write_str(v),
            PropertyValue::Boolean(v) => write!(f, "{v}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    #[serde(flatten)]
    pub value: PropertyValue,
    /// Free-form hint about what the value measures (e.g. `currency`, `bytes`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,
}

impl Property {
    pub fn new(name: impl Into<String>, value: PropertyValue) -> Self {
        Self {
            name: name.into(),
            value,
            value_type: None,
        }
    }

    pub fn with_value_type(mut self, value_type: impl Into<String>) -> Self {
        self.value_type = Some(value_type.into());
        self
    }

    pub fn data_type(&self) -> DataType {
        self.value.data_type()
    }
}

/// Named category of properties captured at a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: u64,
    pub category: String,
    pub name: String,
    pub timestamp: Timestamp,
    pub properties: Vec<Property>,
}

impl Snapshot {
    pub fn new(category: impl Into<String>, name: impl Into<String>, timestamp: Timestamp) -> Self {
        Self {
            id: next_id(),
            category: category.into(),
            name: name.into(),
            timestamp,
            properties: Vec::new(),
        }
    }

    pub fn add(&mut self, property: Property) {
        self.properties.push(property);
    }

    pub fn get(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}
