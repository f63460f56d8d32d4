//! Typed, positional bind parameters for the SQL API.
//!
//! Named parameters are turned into `"1"`, `"2"`, ... bindings, each carrying
//! a type tag inferred from the value and a string-encoded value.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

/// Type tag understood by the remote binding format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BindingType {
    Boolean,
    /// Integer.
    Fixed,
    /// Floating point.
    Real,
    Text,
}

impl BindingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Boolean => "BOOLEAN",
            Self::Fixed => "FIXED",
            Self::Real => "REAL",
            Self::Text => "TEXT",
        }
    }
}

impl std::fmt::Display for BindingType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single positional binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindParameter {
    /// 1-based position.
    pub position: usize,
    pub binding_type: BindingType,
    /// String-encoded value; `None` binds SQL NULL.
    pub value: Option<String>,
}

#[derive(Serialize)]
struct WireBinding<'a> {
    #[serde(rename = "type")]
    binding_type: BindingType,
    value: Option<&'a str>,
}

/// Ordered set of bindings, serialized as `{"1": {"type": ..., "value": ...}, ...}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bindings(Vec<BindParameter>);

impl Bindings {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BindParameter> {
        self.0.iter()
    }
}

impl Serialize for Bindings {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for param in &self.0 {
            map.serialize_entry(
                &param.position.to_string(),
                &WireBinding {
                    binding_type: param.binding_type,
                    value: param.value.as_deref(),
                },
            )?;
        }
        map.end()
    }
}

/// Encodes named parameters in insertion order. Names are not sent; only
/// their order matters.
pub fn encode(parameters: &Map<String, Value>) -> Bindings {
    Bindings(
        parameters
            .values()
            .enumerate()
            .map(|(index, value)| {
                let (binding_type, value) = infer(value);
                BindParameter {
                    position: index + 1,
                    binding_type,
                    value,
                }
            })
            .collect(),
    )
}

/// Picks a type tag for one value. First match wins: boolean, round-tripping
/// integer, float, then text.
pub fn infer(value: &Value) -> (BindingType, Option<String>) {
    let text = match value {
        Value::Bool(b) => return (BindingType::Boolean, Some(b.to_string())),
        Value::Null => return (BindingType::Text, None),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    // "00123" parses but does not round-trip; it must not become FIXED.
    if let Ok(int) = text.parse::<i128>() {
        if int.to_string() == text {
            return (BindingType::Fixed, Some(text));
        }
    }

    if let Ok(float) = text.parse::<f64>() {
        return (BindingType::Real, Some(format!("{float:?}")));
    }

    (BindingType::Text, Some(text))
}
