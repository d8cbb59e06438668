//! Syntactic checks on task parameters.
//!
//! These run before any registry handler is touched, so a malformed task is
//! rejected without side effects.

use crate::error::ValidationError;
use crate::value::{Map, Value};

/// Longest accepted object identifier or type name.
pub const MAX_IDENTIFIER_LEN: usize = 255;

/// True if `id` is a syntactically valid object identifier.
///
/// Valid identifiers are non-negative integers or non-blank text without
/// control characters.
pub fn is_valid_object_id(id: &Value) -> bool {
    match id {
        Value::Int(i) => *i >= 0,
        Value::String(s) => {
            !s.trim().is_empty()
                && s.len() <= MAX_IDENTIFIER_LEN
                && !s.chars().any(char::is_control)
        }
        _ => false,
    }
}

/// True if `name` can name an object type or widget type.
pub fn is_valid_type_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_IDENTIFIER_LEN
        && name.starts_with(|c: char| c.is_ascii_alphabetic())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Fetch a required, non-empty text parameter.
pub fn require_str<'a>(params: &'a Value, name: &'static str) -> Result<&'a str, ValidationError> {
    match params.get(name) {
        None | Some(Value::Null) => Err(ValidationError::MissingParam(name)),
        Some(value) => value
            .as_str()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ValidationError::InvalidParam {
                param: name,
                reason: "expected non-empty text".into(),
            }),
    }
}

/// Fetch a required object identifier.
pub fn require_object_id(params: &Value) -> Result<&Value, ValidationError> {
    let id = params
        .get("id")
        .filter(|id| !id.is_null())
        .ok_or(ValidationError::MissingParam("id"))?;
    if !is_valid_object_id(id) {
        return Err(ValidationError::InvalidObjectId(format!("{:?}", id)));
    }
    Ok(id)
}

/// Fetch the requested field names of a read: a non-empty list or map of names.
pub fn require_field_list(params: &Value) -> Result<Vec<String>, ValidationError> {
    let fields = params
        .get("fields")
        .ok_or(ValidationError::MissingParam("fields"))?;
    let names: Vec<String> = match fields {
        Value::List(items) => items.iter().filter_map(Value::scalar_text).collect(),
        Value::Map(map) => map.values().filter_map(Value::scalar_text).collect(),
        Value::Null => Vec::new(),
        _ => {
            return Err(ValidationError::InvalidParam {
                param: "fields",
                reason: "expected a list of field names".into(),
            })
        }
    };
    if names.is_empty() {
        return Err(ValidationError::EmptyFieldList);
    }
    Ok(names)
}

/// Fetch the field values of a write: a non-empty map.
pub fn require_field_map(params: &Value) -> Result<&Map, ValidationError> {
    let fields = params
        .get("fields")
        .ok_or(ValidationError::MissingParam("fields"))?;
    match fields {
        Value::Map(map) if !map.is_empty() => Ok(map),
        Value::Map(_) | Value::Null => Err(ValidationError::EmptyFieldList),
        _ => Err(ValidationError::InvalidParam {
            param: "fields",
            reason: "expected a map of field values".into(),
        }),
    }
}
