//! In-memory image headers: ordered, uppercase-keyed metadata maps.
//!
//! No file container format is read or written here; FITS (or anything else)
//! I/O belongs to the host application. This module only models the keyed
//! metadata that travels alongside a 2-D image in memory.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Informational keys inherited from a primary metadata block when absent on
/// an extension header. Existing values are never overwritten.
pub const INHERITED_KEYS: [&str; 8] = [
    "ROOTNAME", "TARGNAME", "INSTRUME", "DETECTOR", "FILTER", "PUPIL", "DATE-OBS", "TIME-OBS",
];

/// A single header value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Bool(b) => write!(f, "{}", if *b { "T" } else { "F" }),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

/// An ordered key-to-value header. Keys are uppercased on insertion and
/// lookup; insertion order is preserved, updates happen in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Header {
    cards: Vec<(String, Value)>,
}

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        let key = key.to_ascii_uppercase();
        self.cards.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Value::as_f64)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Set a key, updating in place when it already exists and appending
    /// otherwise.
    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        let key = key.to_ascii_uppercase();
        let value = value.into();
        match self.cards.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.cards.push((key, value)),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let key = key.to_ascii_uppercase();
        let idx = self.cards.iter().position(|(k, _)| *k == key)?;
        Some(self.cards.remove(idx).1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.cards.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Copy the listed keys from `primary` for every key absent here.
    /// Values already present are left alone.
    pub fn inherit(&mut self, primary: &Header, keys: &[&str]) {
        for &key in keys {
            if !self.contains(key) {
                if let Some(value) = primary.get(key) {
                    self.insert(key, value.clone());
                }
            }
        }
    }
}
