//! Conversion between BIN-RPC values and JSON, for tooling and logs.

use crate::value::Value;
use serde_json::{Map, Number, Value as Json};

/// Converts a value into JSON.
///
/// Struct keys collapse into a JSON object, so a repeated key keeps only its
/// last member. Non-finite doubles become `null`.
pub fn to_json(value: &Value) -> Json {
    match value {
        Value::Integer(v) => Json::from(*v),
        Value::Boolean(v) => Json::Bool(*v),
        Value::Str(v) => Json::String(v.clone()),
        Value::Double(v) => Number::from_f64(*v).map_or(Json::Null, Json::Number),
        Value::Array(items) => Json::Array(items.iter().map(to_json).collect()),
        Value::Struct(members) => {
            let mut map = Map::new();
            for (key, member) in members {
                map.insert(key.clone(), to_json(member));
            }
            Json::Object(map)
        }
        #[cfg(feature = "binary")]
        Value::Binary(bytes) => Json::Array(bytes.iter().map(|&b| Json::from(b)).collect()),
    }
}

/// Converts JSON into a value.
///
/// Integers that fit in 32 bits become `Integer`, all other numbers `Double`.
/// `null` becomes an empty string, which is how BIN-RPC peers send "nothing".
pub fn from_json(json: &Json) -> Value {
    match json {
        Json::Null => Value::Str(String::new()),
        Json::Bool(v) => Value::Boolean(*v),
        Json::Number(n) => match n.as_i64().and_then(|v| i32::try_from(v).ok()) {
            Some(v) => Value::Integer(v),
            None => Value::Double(n.as_f64().unwrap_or(0.0)),
        },
        Json::String(v) => Value::Str(v.clone()),
        Json::Array(items) => Value::Array(items.iter().map(from_json).collect()),
        Json::Object(map) => Value::Struct(
            map.iter()
                .map(|(key, member)| (key.clone(), from_json(member)))
                .collect(),
        ),
    }
}
