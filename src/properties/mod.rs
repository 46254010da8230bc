//! Typed property bags for algorithms, tools and jobs.
//!
//! A bag travels on the wire as a list of `PropertyMsg { name, type, value }`
//! with the value in string form. Compound values (`dict`, `list`, `bool`)
//! are decoded with [`literal::parse_literal`]; primitives are cast
//! directly; `NoneType` entries are skipped.

pub mod literal;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

/// One configuration value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Dict(Dict),
    List(Vec<PropertyValue>),
    Null,
}

impl PropertyValue {
    /// Wire type name.
    pub fn type_name(&self) -> &'static str {
        match self {
            PropertyValue::Str(_) => "str",
            PropertyValue::Int(_) => "int",
            PropertyValue::Float(_) => "float",
            PropertyValue::Bool(_) => "bool",
            PropertyValue::Dict(_) => "dict",
            PropertyValue::List(_) => "list",
            PropertyValue::Null => "NoneType",
        }
    }

    /// Wire value. Strings are emitted bare at the top level and quoted
    /// when nested, so `parse_literal` reads compound values back.
    pub fn to_text(&self) -> String {
        match self {
            PropertyValue::Str(s) => s.clone(),
            other => other.to_string(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Float(f) => Some(*f),
            PropertyValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[PropertyValue]> {
        match self {
            PropertyValue::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&Dict> {
        match self {
            PropertyValue::Dict(d) => Some(d),
            _ => None,
        }
    }
}

/// Dict value that keeps its keys in insertion order. Inserting an
/// existing key replaces the value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dict {
    entries: Vec<(String, PropertyValue)>,
}

impl Dict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: PropertyValue) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PropertyValue)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, PropertyValue)> for Dict {
    fn from_iter<I: IntoIterator<Item = (K, PropertyValue)>>(iter: I) -> Self {
        let mut dict = Dict::new();
        for (k, v) in iter {
            dict.insert(k, v);
        }
        dict
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Str(s) => {
                write!(f, "'")?;
                for c in s.chars() {
                    match c {
                        '\'' => write!(f, "\\'")?,
                        '\\' => write!(f, "\\\\")?,
                        '\n' => write!(f, "\\n")?,
                        '\t' => write!(f, "\\t")?,
                        '\r' => write!(f, "\\r")?,
                        c => write!(f, "{}", c)?,
                    }
                }
                write!(f, "'")
            }
            PropertyValue::Int(i) => write!(f, "{}", i),
            PropertyValue::Float(x) if x.is_infinite() => {
                write!(f, "{}", if *x > 0.0 { "inf" } else { "-inf" })
            }
            // Keep a decimal point so the value reads back as a float.
            PropertyValue::Float(x) if x.fract() == 0.0 && x.abs() < 1e16 => write!(f, "{:.1}", x),
            PropertyValue::Float(x) => write!(f, "{}", x),
            PropertyValue::Bool(true) => write!(f, "True"),
            PropertyValue::Bool(false) => write!(f, "False"),
            PropertyValue::Null => write!(f, "None"),
            PropertyValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            PropertyValue::Dict(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", PropertyValue::Str(k.clone()), v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::Str(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::Str(s)
    }
}

impl From<i64> for PropertyValue {
    fn from(i: i64) -> Self {
        PropertyValue::Int(i)
    }
}

impl From<f64> for PropertyValue {
    fn from(x: f64) -> Self {
        PropertyValue::Float(x)
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        PropertyValue::Bool(b)
    }
}

/// Wire record for one property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyMsg {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub value: String,
}

impl PropertyMsg {
    pub fn new(name: impl Into<String>, value: &PropertyValue) -> Self {
        Self {
            name: name.into(),
            ty: value.type_name().to_string(),
            value: value.to_text(),
        }
    }

    /// Decode the value. `Ok(None)` for `NoneType` entries.
    pub fn decode(&self) -> Result<Option<PropertyValue>> {
        let fail = |reason: String| Error::PropertyParse {
            name: self.name.clone(),
            ty: self.ty.clone(),
            reason,
        };

        let value = match self.ty.as_str() {
            "NoneType" => return Ok(None),
            "str" => PropertyValue::Str(self.value.clone()),
            "int" => PropertyValue::Int(
                self.value
                    .trim()
                    .parse::<i64>()
                    .map_err(|e| fail(e.to_string()))?,
            ),
            "float" => PropertyValue::Float(
                self.value
                    .trim()
                    .parse::<f64>()
                    .map_err(|e| fail(e.to_string()))?,
            ),
            "bool" | "dict" | "list" => {
                let parsed = literal::parse_literal(&self.value).map_err(fail)?;
                if parsed.type_name() != self.ty {
                    return Err(fail(format!("literal is a {}", parsed.type_name())));
                }
                parsed
            }
            other => return Err(fail(format!("unknown property type {}", other))),
        };
        Ok(Some(value))
    }
}

/// Ordered property bag with a one-way lock.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Properties {
    values: BTreeMap<String, PropertyValue>,
    locked: bool,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(name, value)` pairs.
    pub fn with<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<PropertyValue>,
    {
        let mut props = Self::new();
        for (k, v) in pairs {
            props.values.insert(k.into(), v.into());
        }
        props
    }

    /// Decode a wire bag, skipping `NoneType` entries.
    pub fn from_msg(msgs: &[PropertyMsg]) -> Result<Self> {
        let mut props = Self::new();
        for msg in msgs {
            if let Some(value) = msg.decode()? {
                props.values.insert(msg.name.clone(), value);
            }
        }
        Ok(props)
    }

    pub fn to_msg(&self) -> Vec<PropertyMsg> {
        self.values
            .iter()
            .map(|(k, v)| PropertyMsg::new(k.clone(), v))
            .collect()
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn lock(&mut self) {
        self.locked = true;
    }

    /// Set a property. Returns `false` (and logs) when the bag is locked.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> bool {
        let name = name.into();
        if self.locked {
            warn!("cannot change '{}': properties are locked", name);
            return false;
        }
        self.values.insert(name, value.into());
        true
    }

    /// Insert only when absent. Used to apply defaults under user values.
    pub fn set_default(&mut self, name: impl Into<String>, value: impl Into<PropertyValue>) {
        if self.locked {
            return;
        }
        self.values.entry(name.into()).or_insert_with(|| value.into());
    }

    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PropertyValue)> {
        self.values.iter()
    }

    pub fn str_or(&self, name: &str, default: &str) -> Result<String> {
        match self.values.get(name) {
            None => Ok(default.to_string()),
            Some(v) => v
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| Error::Property(name.to_string())),
        }
    }

    pub fn i64_or(&self, name: &str, default: i64) -> Result<i64> {
        match self.values.get(name) {
            None => Ok(default),
            Some(v) => v.as_i64().ok_or_else(|| Error::Property(name.to_string())),
        }
    }

    pub fn bool_or(&self, name: &str, default: bool) -> Result<bool> {
        match self.values.get(name) {
            None => Ok(default),
            Some(v) => v.as_bool().ok_or_else(|| Error::Property(name.to_string())),
        }
    }

    /// A list of strings, e.g. column names.
    pub fn str_list(&self, name: &str) -> Result<Option<Vec<String>>> {
        let Some(v) = self.values.get(name) else {
            return Ok(None);
        };
        let items = v.as_list().ok_or_else(|| Error::Property(name.to_string()))?;
        items
            .iter()
            .map(|i| {
                i.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| Error::Property(name.to_string()))
            })
            .collect::<Result<Vec<_>>>()
            .map(Some)
    }
}
