use crate::error::{AppError, AppResult};
use crate::models::PublishMessageRequest;

// =============================================================================
// Validation Constants
// =============================================================================

/// Maximum length for the location field.
pub const MAX_LOCATION_LENGTH: usize = 255;

/// Maximum length for the summary field.
pub const MAX_SUMMARY_LENGTH: usize = 512;

/// Validate a publish request before it is turned into a queue message.
///
/// The rules are abuse guards, not business rules: missing values already
/// fell back to defaults during deserialization, so only length and
/// control-character hygiene are enforced here.
pub fn validate_publish_request(request: &PublishMessageRequest) -> AppResult<()> {
    validate_text_field(&request.location, "Location", MAX_LOCATION_LENGTH)?;
    validate_text_field(&request.summary, "Summary", MAX_SUMMARY_LENGTH)?;
    Ok(())
}

/// Validate a free-text field: bounded length, no control characters.
fn validate_text_field(value: &str, field: &str, max_length: usize) -> AppResult<()> {
    if value.len() > max_length {
        return Err(AppError::BadRequest(format!(
            "{field} cannot exceed {max_length} characters (got {})",
            value.len()
        )));
    }

    if let Some(pos) = value.chars().position(|c| c.is_control()) {
        return Err(AppError::BadRequest(format!(
            "{field} contains invalid control character at position {pos}"
        )));
    }

    Ok(())
}
