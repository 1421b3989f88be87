//! Collection shapes.
//!
//! A collection file holds either a bare array of entities or a fixed-key
//! aggregate object whose sections are arrays (`List`) or objects (`Map`).
//! Shapes are checked whenever a value is loaded from disk or about to be
//! written, so the in-memory value always matches what the file contains.

use crate::core::types::{ID_FIELD, json_type_name};
use crate::core::{DbError, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionKind {
    List,
    Map,
}

impl SectionKind {
    fn default_value(self) -> Value {
        match self {
            SectionKind::List => Value::Array(Vec::new()),
            SectionKind::Map => Value::Object(Map::new()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    pub kind: SectionKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionShape {
    /// `[ {id, ...}, ... ]`
    Array,
    /// `{ "<section>": [...] | {...}, ... }`
    Aggregate(Vec<Section>),
}

impl CollectionShape {
    pub fn aggregate(sections: &[(&str, SectionKind)]) -> Self {
        Self::Aggregate(
            sections
                .iter()
                .map(|(name, kind)| Section {
                    name: name.to_string(),
                    kind: *kind,
                })
                .collect(),
        )
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Self::Array)
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        match self {
            Self::Array => None,
            Self::Aggregate(sections) => sections.iter().find(|s| s.name == name),
        }
    }

    /// Value written to a collection file that does not exist yet.
    pub fn default_value(&self) -> Value {
        match self {
            Self::Array => Value::Array(Vec::new()),
            Self::Aggregate(sections) => Value::Object(
                sections
                    .iter()
                    .map(|s| (s.name.clone(), s.kind.default_value()))
                    .collect(),
            ),
        }
    }

    /// Adds any declared section missing from an aggregate value.
    pub fn normalize(&self, value: Value) -> Value {
        match (self, value) {
            (Self::Aggregate(sections), Value::Object(mut map)) => {
                for section in sections {
                    map.entry(section.name.clone())
                        .or_insert_with(|| section.kind.default_value());
                }
                Value::Object(map)
            }
            (_, value) => value,
        }
    }

    pub fn check(&self, value: &Value) -> Result<()> {
        match self {
            Self::Array => {
                let items = value.as_array().ok_or_else(|| {
                    DbError::ShapeMismatch(format!(
                        "expected an array collection, found {}",
                        json_type_name(value)
                    ))
                })?;
                check_entities(items, "collection")
            }
            Self::Aggregate(sections) => {
                let map = value.as_object().ok_or_else(|| {
                    DbError::ShapeMismatch(format!(
                        "expected an object collection, found {}",
                        json_type_name(value)
                    ))
                })?;
                for section in sections {
                    let Some(section_value) = map.get(&section.name) else {
                        continue;
                    };
                    match (section.kind, section_value) {
                        (SectionKind::List, Value::Array(items)) => {
                            check_entities(items, &section.name)?
                        }
                        (SectionKind::Map, Value::Object(_)) => {}
                        (kind, other) => {
                            return Err(DbError::ShapeMismatch(format!(
                                "section '{}' must be {}, found {}",
                                section.name,
                                match kind {
                                    SectionKind::List => "an array",
                                    SectionKind::Map => "an object",
                                },
                                json_type_name(other)
                            )));
                        }
                    }
                }
                Ok(())
            }
        }
    }

    /// Number of entities a value holds, as reported by status tooling.
    pub fn entity_count(&self, value: &Value) -> usize {
        match (self, value) {
            (Self::Array, Value::Array(items)) => items.len(),
            (Self::Aggregate(sections), Value::Object(map)) => sections
                .iter()
                .filter_map(|s| map.get(&s.name))
                .map(|v| match v {
                    Value::Array(items) => items.len(),
                    Value::Object(entries) => entries.len(),
                    _ => 0,
                })
                .sum(),
            _ => 0,
        }
    }
}

impl fmt::Display for CollectionShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Array => write!(f, "array"),
            Self::Aggregate(sections) => {
                let names: Vec<&str> = sections.iter().map(|s| s.name.as_str()).collect();
                write!(f, "aggregate{{{}}}", names.join(", "))
            }
        }
    }
}

fn check_entities(items: &[Value], owner: &str) -> Result<()> {
    let mut seen = HashSet::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let Value::Object(record) = item else {
            return Err(DbError::ShapeMismatch(format!(
                "{} entry {} must be an object, found {}",
                owner,
                index,
                json_type_name(item)
            )));
        };
        if let Some(id) = record.get(ID_FIELD).and_then(Value::as_u64) {
            if !seen.insert(id) {
                return Err(DbError::ShapeMismatch(format!(
                    "{} contains duplicate id {}",
                    owner, id
                )));
            }
        }
    }
    Ok(())
}
