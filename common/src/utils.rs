use std::borrow::Cow;

use chrono::{Datelike, Local};
use validator::ValidationError;

const MAX_CHAR_FIELD_LEN: usize = 255;
const MAX_USERNAME_LEN: usize = 150;

/// The calendar year on the local clock.
pub fn current_year() -> i32 {
    Local::now().year()
}

/// Rejects a publication year later than `current_year`.
pub fn validate_publication_year_at(year: i32, current_year: i32) -> Result<(), ValidationError> {
    if year > current_year {
        return Err(ValidationError::new("future_year")
            .with_message(Cow::Borrowed("Publication year cannot be in the future.")));
    }
    Ok(())
}

/// Rejects a publication year in the future, measured against today's date.
pub fn validate_publication_year(year: i32) -> Result<(), ValidationError> {
    validate_publication_year_at(year, current_year())
}

/// Shared check for free-text fields (book titles, author names): not blank
/// once trimmed, at most 255 characters.
pub fn validate_char_field(value: &str) -> Result<(), ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::new("blank")
            .with_message(Cow::Borrowed("This field may not be blank.")));
    }
    if value.chars().count() > MAX_CHAR_FIELD_LEN {
        return Err(ValidationError::new("max_length")
            .with_message(Cow::Borrowed("Ensure this field has no more than 255 characters.")));
    }
    Ok(())
}

/// Usernames are 1 to 150 characters of letters, digits and `@.+-_`.
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    let len = username.chars().count();
    if len == 0 || len > MAX_USERNAME_LEN {
        return Err(ValidationError::new("length")
            .with_message(Cow::Borrowed("Username must be between 1 and 150 characters.")));
    }
    let allowed = |c: char| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_');
    if !username.chars().all(allowed) {
        return Err(ValidationError::new("invalid_username").with_message(Cow::Borrowed(
            "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn future_year_is_rejected() {
        let err = validate_publication_year_at(2031, 2030).unwrap_err();
        assert_eq!(err.code, "future_year");
    }

    #[test]
    fn current_and_past_years_pass() {
        assert!(validate_publication_year_at(2030, 2030).is_ok());
        assert!(validate_publication_year_at(1958, 2030).is_ok());
        assert!(validate_publication_year_at(-500, 2030).is_ok());
    }

    #[test]
    fn next_year_fails_against_the_clock() {
        assert!(validate_publication_year(current_year() + 1).is_err());
        assert!(validate_publication_year(current_year()).is_ok());
    }

    #[test]
    fn blank_and_overlong_text_fails() {
        assert!(validate_char_field("   ").is_err());
        assert!(validate_char_field("\t\n").is_err());
        assert!(validate_char_field(&"x".repeat(256)).is_err());
        assert!(validate_char_field(&"x".repeat(255)).is_ok());
        assert!(validate_char_field(&format!("  {}  ", "x".repeat(255))).is_ok());
    }

    #[test]
    fn usernames() {
        assert!(validate_username("chinua.achebe+1@ng").is_ok());
        assert!(validate_username("has space").is_err());
        assert!(validate_username("").is_err());
        assert!(validate_username(&"a".repeat(151)).is_err());
    }
}
