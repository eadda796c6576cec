//! Tool-argument validation
//!
//! Checks arguments against a tool's input schema BEFORE any upstream call:
//! presence of every `required` field, primitive type match for `string`
//! and `integer`, and `minimum`/`maximum` bounds where declared. The schema
//! subset is intentionally small; anything the subset does not express is
//! accepted and left to the upstream.

use cb_types::{AppError, AppResult};
use serde_json::Value;

/// Validate `arguments` against `schema`
pub fn validate_arguments(schema: &Value, arguments: &Value) -> AppResult<()> {
    let args = arguments
        .as_object()
        .ok_or_else(|| AppError::Validation("Arguments must be an object".to_string()))?;

    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for field in required {
            let Some(name) = field.as_str() else { continue };
            if !args.contains_key(name) {
                return Err(AppError::Validation(format!(
                    "Missing required argument: {}",
                    name
                )));
            }
        }
    }

    let Some(properties) = schema.get("properties").and_then(|p| p.as_object()) else {
        return Ok(());
    };

    for (name, value) in args {
        let Some(property) = properties.get(name) else {
            // Unknown arguments pass through; the upstream decides.
            continue;
        };
        check_property(name, property, value)?;
    }

    Ok(())
}

fn check_property(name: &str, property: &Value, value: &Value) -> AppResult<()> {
    match property.get("type").and_then(|t| t.as_str()) {
        Some("string") => {
            if !value.is_string() {
                return Err(AppError::Validation(format!(
                    "Argument {} must be a string",
                    name
                )));
            }
        }
        Some("integer") => {
            let Some(number) = value.as_i64() else {
                return Err(AppError::Validation(format!(
                    "Argument {} must be an integer",
                    name
                )));
            };
            if let Some(minimum) = property.get("minimum").and_then(|m| m.as_i64()) {
                if number < minimum {
                    return Err(AppError::Validation(format!(
                        "Argument {} must be >= {}",
                        name, minimum
                    )));
                }
            }
            if let Some(maximum) = property.get("maximum").and_then(|m| m.as_i64()) {
                if number > maximum {
                    return Err(AppError::Validation(format!(
                        "Argument {} must be <= {}",
                        name, maximum
                    )));
                }
            }
        }
        _ => {}
    }
    Ok(())
}
