//! Validation helpers for DTOs.

use validator::ValidationError;

/// Validates that a lobby code is 4-10 uppercase alphanumeric characters.
pub fn validate_lobby_code(code: &str) -> Result<(), ValidationError> {
    if !(4..=10).contains(&code.len()) {
        let mut err = ValidationError::new("lobby_code_length");
        err.message =
            Some(format!("Lobby code must be 4-10 characters (got {})", code.len()).into());
        return Err(err);
    }

    if !code
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
    {
        let mut err = ValidationError::new("lobby_code_format");
        err.message = Some("Lobby code must contain only A-Z and 0-9".into());
        return Err(err);
    }

    Ok(())
}

/// Validates that a display name is non-blank and at most 32 characters.
pub fn validate_display_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        let mut err = ValidationError::new("display_name_blank");
        err.message = Some("Display name must not be blank".into());
        return Err(err);
    }

    if name.chars().count() > 32 {
        let mut err = ValidationError::new("display_name_length");
        err.message = Some("Display name must be at most 32 characters".into());
        return Err(err);
    }

    Ok(())
}

/// Upper-case a client-provided lobby code before lookups, mirroring how
/// codes are generated.
pub fn normalize_lobby_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_lobby_code_valid() {
        assert!(validate_lobby_code("ABCD").is_ok());
        assert!(validate_lobby_code("AB12CD").is_ok());
        assert!(validate_lobby_code("0123456789").is_ok());
    }

    #[test]
    fn test_validate_lobby_code_invalid() {
        assert!(validate_lobby_code("ABC").is_err()); // too short
        assert!(validate_lobby_code("ABCDEFGHIJK").is_err()); // too long
        assert!(validate_lobby_code("abcd").is_err()); // lowercase
        assert!(validate_lobby_code("AB CD").is_err()); // space
    }

    #[test]
    fn test_validate_display_name() {
        assert!(validate_display_name("Alice").is_ok());
        assert!(validate_display_name("  ").is_err());
        assert!(validate_display_name(&"x".repeat(33)).is_err());
    }

    #[test]
    fn test_normalize_lobby_code() {
        assert_eq!(normalize_lobby_code(" abcd "), "ABCD");
    }
}
