//! Input validation utilities

/// Minimum subject length for a new ticket
pub const MIN_SUBJECT_LENGTH: usize = 3;

/// Minimum message length
pub const MIN_MESSAGE_LENGTH: usize = 10;

/// Validate a ticket subject
pub fn validate_subject(subject: &str) -> Result<(), String> {
    if subject.trim().len() < MIN_SUBJECT_LENGTH {
        return Err(format!(
            "Subject must be at least {} characters long",
            MIN_SUBJECT_LENGTH
        ));
    }

    if subject.len() > 200 {
        return Err("Subject must be at most 200 characters long".to_string());
    }

    Ok(())
}

/// Validate a ticket message
pub fn validate_message(message: &str) -> Result<(), String> {
    if message.trim().len() < MIN_MESSAGE_LENGTH {
        return Err(format!(
            "Message must be at least {} characters long",
            MIN_MESSAGE_LENGTH
        ));
    }

    Ok(())
}

/// Validate a reopen reason
pub fn validate_reason(reason: &str) -> Result<(), String> {
    if reason.trim().is_empty() {
        return Err("A reason is required to reopen a ticket".to_string());
    }

    Ok(())
}
