//! The BIN-RPC value model.

use std::fmt;

/// Wire type tag of an integer.
pub const TAG_INTEGER: u32 = 0x01;
/// Wire type tag of a boolean.
pub const TAG_BOOLEAN: u32 = 0x02;
/// Wire type tag of a string.
pub const TAG_STRING: u32 = 0x03;
/// Wire type tag of a double.
pub const TAG_DOUBLE: u32 = 0x04;
/// Wire type tag of an array.
pub const TAG_ARRAY: u32 = 0x100;
/// Wire type tag of a struct.
pub const TAG_STRUCT: u32 = 0x101;
/// Wire type tag of the Homegear binary extension.
#[cfg(feature = "binary")]
pub const TAG_BINARY: u32 = 0xD0;

/// Returns true if `tag` names a type this build can decode.
pub fn is_known_tag(tag: u32) -> bool {
    match tag {
        TAG_INTEGER | TAG_BOOLEAN | TAG_STRING | TAG_DOUBLE | TAG_ARRAY | TAG_STRUCT => true,
        #[cfg(feature = "binary")]
        TAG_BINARY => true,
        _ => false,
    }
}

/// A single BIN-RPC value.
///
/// Struct members keep their wire order and may repeat a key; re-encoding a
/// decoded struct reproduces the original member sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i32),
    Boolean(bool),
    Str(String),
    Double(f64),
    Array(Vec<Value>),
    Struct(Vec<(String, Value)>),
    /// Homegear extension, only understood by Homegear peers.
    #[cfg(feature = "binary")]
    Binary(Vec<u8>),
}

impl Value {
    /// Returns the wire type tag of this value.
    pub fn tag(&self) -> u32 {
        match self {
            Value::Integer(_) => TAG_INTEGER,
            Value::Boolean(_) => TAG_BOOLEAN,
            Value::Str(_) => TAG_STRING,
            Value::Double(_) => TAG_DOUBLE,
            Value::Array(_) => TAG_ARRAY,
            Value::Struct(_) => TAG_STRUCT,
            #[cfg(feature = "binary")]
            Value::Binary(_) => TAG_BINARY,
        }
    }

    /// Human-readable type name.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "integer",
            Value::Boolean(_) => "boolean",
            Value::Str(_) => "string",
            Value::Double(_) => "double",
            Value::Array(_) => "array",
            Value::Struct(_) => "struct",
            #[cfg(feature = "binary")]
            Value::Binary(_) => "binary",
        }
    }

    /// Builds a struct from `(key, value)` pairs.
    pub fn structure<K, I>(members: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Struct(members.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&[(String, Value)]> {
        match self {
            Value::Struct(v) => Some(v),
            _ => None,
        }
    }

    #[cfg(feature = "binary")]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Binary(v) => Some(v),
            _ => None,
        }
    }

    /// Looks up the first struct member named `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_struct()?
            .iter()
            .find_map(|(k, v)| (k == key).then_some(v))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(v) => write!(f, "{}", v),
            Value::Boolean(v) => write!(f, "{}", v),
            Value::Str(v) => write!(f, "{:?}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Struct(members) => {
                write!(f, "{{")?;
                for (i, (key, value)) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{:?}: {}", key, value)?;
                }
                write!(f, "}}")
            }
            #[cfg(feature = "binary")]
            Value::Binary(bytes) => write!(f, "<{} bytes>", bytes.len()),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
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

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}
