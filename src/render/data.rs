//! Template data: the JSON payload split into scalars, lists and row sets.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde_json::{Map, Value as JsonValue};

use crate::error::{Result, TemplateError};

pub type Record = BTreeMap<String, String>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    /// Array of scalars; feeds list expansion.
    List(Vec<String>),
    /// Array of objects; feeds table expansion.
    Rows(Vec<Record>),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TemplateData {
    fields: BTreeMap<String, FieldValue>,
}

impl TemplateData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let json: JsonValue = serde_json::from_str(s)?;
        Self::from_json_value(&json)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn from_json_value(json: &JsonValue) -> Result<Self> {
        let obj = json
            .as_object()
            .ok_or_else(|| TemplateError::InvalidData("top level must be an object".into()))?;
        let mut fields = BTreeMap::new();
        for (key, value) in obj {
            fields.insert(key.clone(), field_from_json(key, value)?);
        }
        Ok(Self { fields })
    }

    pub fn insert(&mut self, key: impl Into<String>, value: FieldValue) {
        self.fields.insert(key.into(), value);
    }

    pub fn with_text(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, FieldValue::Text(value.into()));
        self
    }

    pub fn with_list<I, S>(mut self, key: impl Into<String>, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insert(key, FieldValue::List(items.into_iter().map(Into::into).collect()));
        self
    }

    pub fn with_rows(mut self, key: impl Into<String>, rows: Vec<Record>) -> Self {
        self.insert(key, FieldValue::Rows(rows));
        self
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn scalars(&self) -> BTreeMap<String, String> {
        self.fields
            .iter()
            .filter_map(|(k, v)| match v {
                FieldValue::Text(s) => Some((k.clone(), s.clone())),
                _ => None,
            })
            .collect()
    }

    /// Arrays of scalars. An empty array shows up here and in [`Self::rows`].
    pub fn lists(&self) -> BTreeMap<String, Vec<String>> {
        self.fields
            .iter()
            .filter_map(|(k, v)| match v {
                FieldValue::List(items) => Some((k.clone(), items.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn rows(&self) -> BTreeMap<String, Vec<Record>> {
        self.fields
            .iter()
            .filter_map(|(k, v)| match v {
                FieldValue::Rows(rows) => Some((k.clone(), rows.clone())),
                FieldValue::List(items) if items.is_empty() => Some((k.clone(), Vec::new())),
                _ => None,
            })
            .collect()
    }
}

fn field_from_json(key: &str, value: &JsonValue) -> Result<FieldValue> {
    match value {
        JsonValue::Array(items) => {
            let objects = items.iter().filter(|v| v.is_object()).count();
            if objects == 0 {
                return Ok(FieldValue::List(items.iter().map(scalar_text).collect()));
            }
            if objects != items.len() {
                return Err(TemplateError::InvalidData(format!(
                    "`{key}` mixes objects and scalars"
                )));
            }
            Ok(FieldValue::Rows(
                items
                    .iter()
                    .filter_map(JsonValue::as_object)
                    .map(record_from_object)
                    .collect(),
            ))
        }
        JsonValue::Object(_) => Err(TemplateError::InvalidData(format!(
            "`{key}` is an object; only arrays of objects are supported"
        ))),
        other => Ok(FieldValue::Text(scalar_text(other))),
    }
}

fn record_from_object(obj: &Map<String, JsonValue>) -> Record {
    obj.iter().map(|(k, v)| (k.clone(), scalar_text(v))).collect()
}

/// Text form of a JSON value: strings verbatim, `null` as empty, everything
/// else in its JSON spelling.
pub fn scalar_text(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => String::new(),
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}
