//! Typed property values and snapshots.
//!
//! Trace records arrive as untyped JSON objects. They are coerced into
//! [`PropertySnapshot`]s using the declared [`ScalarKind`] of every property,
//! so that filters compare `BigInt`s as integers and `ID`s as strings no
//! matter how the mutation engine happened to encode them.

use std::collections::BTreeMap;
use std::fmt;

use num_bigint::BigInt;
use serde::{Deserialize, Serialize};

/// Raw JSON object as produced by the mutation engine.
pub type JsonObject = serde_json::Map<String, serde_json::Value>;

// ── Identifiers ───────────────────────────────────────────────────

/// Dense identifier of an entity type inside a [`TypeRegistry`](crate::schema::TypeRegistry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

impl TypeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type#{}", self.0)
    }
}

/// Dense identifier of a relationship kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelKindId(pub u32);

impl RelKindId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for RelKindId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rel#{}", self.0)
    }
}

// ── Scalars ───────────────────────────────────────────────────────

/// Declared kind of a property.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    String,
    Int,
    Float,
    BigInt,
    Boolean,
    #[serde(rename = "ID")]
    Id,
    List,
}

impl ScalarKind {
    /// Whether ordering comparisons (`_LT`, `_GTE`, ...) are defined.
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Int | Self::Float | Self::BigInt)
    }

    /// Whether substring operators (`_CONTAINS`, `_STARTS_WITH`, ...) are defined.
    pub fn is_textual(self) -> bool {
        matches!(self, Self::String | Self::Id)
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "String",
            Self::Int => "Int",
            Self::Float => "Float",
            Self::BigInt => "BigInt",
            Self::Boolean => "Boolean",
            Self::Id => "ID",
            Self::List => "List",
        };
        f.write_str(name)
    }
}

/// A typed property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Null,
    String(String),
    Int(i64),
    Float(f64),
    BigInt(BigInt),
    Boolean(bool),
    Id(String),
    List(Vec<PropertyValue>),
}

/// A JSON value could not be read as the declared scalar kind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("expected {expected}, found {found}")]
pub struct ValueError {
    pub expected: ScalarKind,
    pub found: String,
}

impl PropertyValue {
    /// Coerce a JSON value into the declared kind. `null` is accepted for every kind.
    pub fn from_json(kind: ScalarKind, value: &serde_json::Value) -> Result<Self, ValueError> {
        use serde_json::Value;

        let mismatch = || ValueError {
            expected: kind,
            found: json_type_name(value).to_string(),
        };

        match (kind, value) {
            (_, Value::Null) => Ok(Self::Null),
            (ScalarKind::String, Value::String(s)) => Ok(Self::String(s.clone())),
            (ScalarKind::Int, Value::Number(n)) => n.as_i64().map(Self::Int).ok_or_else(mismatch),
            (ScalarKind::Float, Value::Number(n)) => {
                n.as_f64().map(Self::Float).ok_or_else(mismatch)
            }
            (ScalarKind::BigInt, Value::Number(n)) => {
                if let Some(i) = n.as_i64() {
                    Ok(Self::BigInt(BigInt::from(i)))
                } else if let Some(u) = n.as_u64() {
                    Ok(Self::BigInt(BigInt::from(u)))
                } else {
                    Err(mismatch())
                }
            }
            (ScalarKind::BigInt, Value::String(s)) => s
                .trim()
                .parse::<BigInt>()
                .map(Self::BigInt)
                .map_err(|_| mismatch()),
            (ScalarKind::Boolean, Value::Bool(b)) => Ok(Self::Boolean(*b)),
            (ScalarKind::Id, Value::String(s)) => Ok(Self::Id(s.clone())),
            (ScalarKind::Id, Value::Number(n)) if n.is_i64() || n.is_u64() => {
                Ok(Self::Id(n.to_string()))
            }
            (ScalarKind::List, Value::Array(items)) => items
                .iter()
                .map(Self::from_untyped_json)
                .collect::<Result<_, _>>()
                .map(Self::List),
            _ => Err(mismatch()),
        }
    }

    /// Conversion for list elements, which carry no declared kind.
    ///
    /// Objects have no property representation and are rejected.
    pub fn from_untyped_json(value: &serde_json::Value) -> Result<Self, ValueError> {
        use serde_json::Value;

        Ok(match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Boolean(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => Self::String(s.clone()),
            Value::Array(items) => Self::List(
                items
                    .iter()
                    .map(Self::from_untyped_json)
                    .collect::<Result<_, _>>()?,
            ),
            Value::Object(_) => {
                return Err(ValueError {
                    expected: ScalarKind::List,
                    found: json_type_name(value).to_string(),
                })
            }
        })
    }

    /// Render for a client payload. `BigInt` is rendered as a decimal string.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;

        match self {
            Self::Null => Value::Null,
            Self::String(s) | Self::Id(s) => Value::String(s.clone()),
            Self::Int(i) => Value::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Self::BigInt(b) => Value::String(b.to_string()),
            Self::Boolean(b) => Value::Bool(*b),
            Self::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Textual content for `String` and `ID` values.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::String(s) | Self::Id(s) => Some(s),
            _ => None,
        }
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    use serde_json::Value;

    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

// ── Snapshots ─────────────────────────────────────────────────────

/// Typed property map. Ordered so that snapshots compare and print deterministically.
pub type Properties = BTreeMap<String, PropertyValue>;

/// The properties of one node, tagged with the node's concrete type.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertySnapshot {
    pub concrete: TypeId,
    pub properties: Properties,
}

impl PropertySnapshot {
    pub fn new(concrete: TypeId, properties: Properties) -> Self {
        Self {
            concrete,
            properties,
        }
    }

    /// Look up a property. Absent properties and explicit nulls both read as `None`.
    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name).filter(|v| !v.is_null())
    }

    /// Property-wise equality, ignoring explicit nulls versus absent keys.
    pub fn same_properties(&self, other: &Self) -> bool {
        let present = |p: &Properties| {
            p.iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect::<Properties>()
        };
        self.concrete == other.concrete && present(&self.properties) == present(&other.properties)
    }
}
