pub mod chats;
pub mod friends;
pub mod matchmaking;
pub mod users;

use anyhow::anyhow;
use validator::ValidationErrors;

use crate::error::AppError;

/// Flatten validator errors into one `field: message` line.
pub(crate) fn validation_error(e: ValidationErrors) -> AppError {
    let mut error_messages = String::new();
    for (field, errors) in e.field_errors() {
        for error in errors {
            error_messages.push_str(&format!(
                "{}: {} ",
                field,
                error
                    .message
                    .as_ref()
                    .map_or("invalid value", |m| m.as_ref())
            ));
        }
    }
    AppError::BadRequest(anyhow!(error_messages.trim().to_string()))
}
