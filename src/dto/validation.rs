//! Validation helpers for DTOs.

use validator::ValidationError;

/// Maximum number of characters in a player name.
pub const MAX_PLAYER_NAME_CHARS: usize = 32;

/// Validates a player display name: 1 to 32 characters, not blank, no control characters.
///
/// # Examples
///
/// ```ignore
/// validate_player_name("Ann")        // Ok
/// validate_player_name("   ")        // Err - blank
/// validate_player_name("a\u{7}b")    // Err - control character
/// ```
pub fn validate_player_name(name: &str) -> Result<(), ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        let mut err = ValidationError::new("player_name_blank");
        err.message = Some("Player name must not be blank".into());
        return Err(err);
    }

    let chars = trimmed.chars().count();
    if chars > MAX_PLAYER_NAME_CHARS {
        let mut err = ValidationError::new("player_name_length");
        err.message = Some(
            format!("Player name must be at most {MAX_PLAYER_NAME_CHARS} characters (got {chars})")
                .into(),
        );
        return Err(err);
    }

    if trimmed.chars().any(char::is_control) {
        let mut err = ValidationError::new("player_name_format");
        err.message = Some("Player name must not contain control characters".into());
        return Err(err);
    }

    Ok(())
}
