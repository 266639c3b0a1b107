//! Input validation utilities.

use validator::Validate;

use crate::error::HuddleError;

/// Validate a request payload, returning a HuddleError::Validation on failure.
pub fn validate_request<T: Validate>(body: &T) -> Result<(), HuddleError> {
    body.validate().map_err(|e| HuddleError::Validation {
        message: format_validation_errors(e),
    })
}

/// Format validation errors into a human-readable string, one
/// `field: message` entry per failure. Field names are reported in camelCase
/// to match the JSON the client sent.
fn format_validation_errors(errors: validator::ValidationErrors) -> String {
    let mut messages: Vec<String> = errors
        .field_errors()
        .iter()
        .flat_map(|(field, errs)| {
            let field = camel_case(field);
            errs.iter().map(move |e| match &e.message {
                Some(message) => format!("{field}: {message}"),
                None => format!("{field}: invalid value"),
            })
        })
        .collect();
    // field_errors() is a HashMap; keep output stable
    messages.sort();
    messages.join("; ")
}

fn camel_case(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut upper = false;
    for c in field.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// Reject identifiers that are empty or contain control characters.
pub fn validate_identifier(value: &str) -> Result<(), validator::ValidationError> {
    if value.trim().is_empty() {
        return Err(validator::ValidationError::new("blank").with_message("must not be blank".into()));
    }
    if value.chars().any(char::is_control) {
        return Err(validator::ValidationError::new("control_characters")
            .with_message("must not contain control characters".into()));
    }
    Ok(())
}
