//! Common validation utilities.

use validator::ValidationError;

/// Maximum number of recipients accepted in a single send request.
pub const MAX_RECIPIENTS_PER_REQUEST: usize = 1000;

/// Validates that a string contains something other than whitespace.
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("Value must not be blank".into());
        Err(err)
    } else {
        Ok(())
    }
}

/// Validates that an identifier is a positive database id.
pub fn validate_id(id: i64) -> Result<(), ValidationError> {
    if id > 0 {
        Ok(())
    } else {
        let mut err = ValidationError::new("id_range");
        err.message = Some("Identifier must be a positive number".into());
        Err(err)
    }
}

/// Validates a recipient id list: non-empty, bounded and all ids positive.
pub fn validate_recipient_ids(ids: &[i64]) -> Result<(), ValidationError> {
    if ids.is_empty() {
        let mut err = ValidationError::new("recipients_empty");
        err.message = Some("At least one recipient is required".into());
        return Err(err);
    }

    if ids.len() > MAX_RECIPIENTS_PER_REQUEST {
        let mut err = ValidationError::new("recipients_too_many");
        err.message = Some(
            format!(
                "At most {} recipients are allowed per request",
                MAX_RECIPIENTS_PER_REQUEST
            )
            .into(),
        );
        return Err(err);
    }

    ids.iter().try_for_each(|id| validate_id(*id))
}
