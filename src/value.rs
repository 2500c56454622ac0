//! Typed action values
//!
//! TR-064 carries every argument as text on the wire. The catalog knows the
//! declared data type of each argument, so values are decoded into a closed
//! variant at the boundary instead of being passed around as raw strings.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::{Error, Result};

/// A single argument value
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// Free-form text
    Text(String),
    /// Signed integer (booleans decode as 0/1)
    Integer(i64),
    /// Ordered list of integers
    IntegerList(Vec<i64>),
}

impl Value {
    /// Borrow the text payload, if this is a text value
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Interpret the value as an unsigned counter
    ///
    /// Text that parses as a number is accepted too, since some firmware
    /// declares counters as strings.
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Integer(n) => u64::try_from(*n).ok(),
            Self::Text(s) => s.trim().parse().ok(),
            Self::IntegerList(_) => None,
        }
    }

    /// Whether the value carries no information (empty text or empty list)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(s) => s.is_empty(),
            Self::Integer(_) => false,
            Self::IntegerList(items) => items.is_empty(),
        }
    }

    /// Encode for the wire
    #[must_use]
    pub fn to_wire(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Integer(n) => write!(f, "{n}"),
            Self::IntegerList(items) => {
                let joined = items
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(",");
                f.write_str(&joined)
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<Vec<i64>> for Value {
    fn from(items: Vec<i64>) -> Self {
        Self::IntegerList(items)
    }
}

/// Declared shape of an argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// Decodes as [`Value::Text`]
    Text,
    /// Decodes as [`Value::Integer`] or [`Value::IntegerList`]
    Integer,
}

impl ValueKind {
    /// Map a UPnP state variable data type to a value kind
    #[must_use]
    pub fn from_data_type(data_type: &str) -> Self {
        match data_type.trim() {
            "ui1" | "ui2" | "ui4" | "ui8" | "i1" | "i2" | "i4" | "i8" | "int" | "boolean" => {
                Self::Integer
            }
            _ => Self::Text,
        }
    }

    /// Decode raw wire text according to this kind
    ///
    /// # Errors
    ///
    /// Returns [`Error::ActionFault`] when an integer-typed value is neither
    /// an integer nor a comma-separated integer list
    pub fn decode(self, name: &str, raw: &str) -> Result<Value> {
        let raw = raw.trim();
        match self {
            Self::Text => Ok(Value::Text(raw.to_string())),
            Self::Integer if raw.is_empty() => Ok(Value::Text(String::new())),
            Self::Integer => decode_integer(raw)
                .ok_or_else(|| Error::malformed(format!("{name}: expected integer, got {raw:?}"))),
        }
    }
}

fn decode_integer(raw: &str) -> Option<Value> {
    match raw {
        "true" => return Some(Value::Integer(1)),
        "false" => return Some(Value::Integer(0)),
        _ => {}
    }

    if let Ok(n) = raw.parse::<i64>() {
        return Some(Value::Integer(n));
    }

    if raw.contains(',') {
        let items = raw
            .split(',')
            .map(|part| part.trim().parse::<i64>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .ok()?;
        return Some(Value::IntegerList(items));
    }

    None
}

/// Input arguments for an action call, keyed by argument name
pub type Arguments = BTreeMap<String, Value>;

/// Output of a successful action call
///
/// Outputs keep the order the action declares them in. A call with no
/// declared outputs yields an empty result, never an absent one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ActionResult {
    outputs: Vec<(String, Value)>,
}

impl ActionResult {
    /// Create an empty result
    #[must_use]
    pub const fn new() -> Self {
        Self {
            outputs: Vec::new(),
        }
    }

    /// Append an output value, replacing an earlier value of the same name
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        if let Some(slot) = self.outputs.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.outputs.push((name, value));
        }
    }

    /// Look up an output by exact name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.outputs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Look up a non-empty text output
    #[must_use]
    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name)
            .and_then(Value::as_text)
            .filter(|s| !s.is_empty())
    }

    /// Look up an output as an unsigned counter
    #[must_use]
    pub fn counter(&self, name: &str) -> Option<u64> {
        self.get(name).and_then(Value::as_u64)
    }

    /// Iterate outputs in declared order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.outputs.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Number of outputs
    #[must_use]
    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    /// Whether the call returned no outputs
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}

impl FromIterator<(String, Value)> for ActionResult {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut result = Self::new();
        for (name, value) in iter {
            result.insert(name, value);
        }
        result
    }
}
