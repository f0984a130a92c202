//! GDB/MI value tree with MI-grammar serialization.
//!
//! Objects iterate in insertion order so records serialize
//! deterministically. Only writing is needed by the server; the reader in
//! the test module exists to check the grammar round-trips.

use crate::util::c_escape;

/// Recursive MI value.
#[derive(Debug, Clone, PartialEq)]
pub enum MiValue {
    Null,
    String(String),
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    Array(Vec<MiValue>),
    Object(MiObject),
}

/// String-keyed mapping with insertion-order iteration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MiObject(Vec<(String, MiValue)>);

#[derive(Debug, thiserror::Error)]
#[error("MI value type mismatch: expected {expected}, found {found}")]
pub struct TypeError {
    pub expected: &'static str,
    pub found: &'static str,
}

impl MiObject {
    pub fn new() -> MiObject {
        MiObject::default()
    }

    /// Assign `value` at `key`, replacing an existing entry in place.
    pub fn set(&mut self, key: impl Into<String>, value: MiValue) {
        let key = key.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&MiValue> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, MiValue)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl MiValue {
    /// Empty object value.
    pub fn object() -> MiValue {
        MiValue::Object(MiObject::new())
    }

    /// String value.
    pub fn str(s: impl Into<String>) -> MiValue {
        MiValue::String(s.into())
    }

    fn kind_name(&self) -> &'static str {
        match self {
            MiValue::Null => "null",
            MiValue::String(_) => "string",
            MiValue::Bool(_) => "bool",
            MiValue::Int(_) => "int",
            MiValue::Uint(_) => "uint",
            MiValue::Float(_) => "float",
            MiValue::Array(_) => "array",
            MiValue::Object(_) => "object",
        }
    }

    /// Assign by key; a Null value promotes to an empty Object first.
    /// Assigning into a non-object fails.
    pub fn set(&mut self, key: impl Into<String>, value: MiValue) -> Result<(), TypeError> {
        if matches!(self, MiValue::Null) {
            *self = MiValue::object();
        }
        match self {
            MiValue::Object(obj) => {
                obj.set(key, value);
                Ok(())
            }
            other => Err(TypeError {
                expected: "object",
                found: other.kind_name(),
            }),
        }
    }

    /// Read the Object content, failing on any other kind.
    pub fn as_object(&self) -> Result<&MiObject, TypeError> {
        match self {
            MiValue::Object(obj) => Ok(obj),
            other => Err(TypeError {
                expected: "object",
                found: other.kind_name(),
            }),
        }
    }

    /// Serialize in MI grammar. A root-level Object is emitted as bare
    /// `key=value` pairs; nested Objects are braced, Arrays bracketed, and
    /// scalars always quoted.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        self.write(&mut out, true);
        out
    }

    /// Full record: `prefix,<serialized>\n`.
    pub fn to_message(&self, prefix: &str) -> String {
        format!("{prefix},{}\n", self.serialize())
    }

    fn write(&self, out: &mut String, root: bool) {
        match self {
            MiValue::Null => out.push_str("\"\""),
            MiValue::String(s) => {
                out.push('"');
                out.push_str(&c_escape(s));
                out.push('"');
            }
            MiValue::Bool(b) => {
                out.push('"');
                out.push_str(if *b { "true" } else { "false" });
                out.push('"');
            }
            MiValue::Int(v) => {
                out.push('"');
                out.push_str(&v.to_string());
                out.push('"');
            }
            MiValue::Uint(v) => {
                out.push('"');
                out.push_str(&v.to_string());
                out.push('"');
            }
            MiValue::Float(v) => {
                out.push('"');
                out.push_str(&v.to_string());
                out.push('"');
            }
            MiValue::Array(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    item.write(out, false);
                }
                out.push(']');
            }
            MiValue::Object(obj) => {
                if !root {
                    out.push('{');
                }
                for (i, (key, value)) in obj.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push_str(key);
                    out.push('=');
                    value.write(out, false);
                }
                if !root {
                    out.push('}');
                }
            }
        }
    }
}
