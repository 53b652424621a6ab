use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::{Validate, ValidationErrors};

#[cfg(not(target_arch = "wasm32"))]
use sqlx::FromRow;

pub mod utils;

use utils::{validate_char_field, validate_publication_year, validate_username};

// --- Catalog ---

/// A book as returned by the API. The owning author is exposed by id.
#[cfg_attr(not(target_arch = "wasm32"), derive(FromRow))]
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, ToSchema)]
pub struct BookDto {
    pub id: i64,
    pub title: String,
    pub publication_year: i32,
    /// Id of the author who wrote the book.
    pub author: i64,
}

/// Body of a book create or full update. Every field is required.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, ToSchema)]
pub struct BookPayload {
    pub title: String,
    pub publication_year: i32,
    pub author: i64,
}

impl BookPayload {
    /// Strips surrounding whitespace from the title; it is stored trimmed.
    pub fn trimmed(mut self) -> Self {
        self.title = self.title.trim().to_owned();
        self
    }
}

// Field checks run in a fixed order and every failure is collected, so a
// client sees all of its mistakes in one response.
impl Validate for BookPayload {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Err(e) = validate_char_field(&self.title) {
            errors.add("title", e);
        }
        if let Err(e) = validate_publication_year(self.publication_year) {
            errors.add("publication_year", e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// An author together with every book they wrote.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, ToSchema)]
pub struct AuthorDto {
    pub id: i64,
    pub name: String,
    pub books: Vec<BookDto>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Validate, ToSchema)]
pub struct AuthorPayload {
    #[validate(custom(function = "validate_char_field"))]
    pub name: String,
}

impl AuthorPayload {
    pub fn trimmed(mut self) -> Self {
        self.name = self.name.trim().to_owned();
        self
    }
}

// --- Accounts ---

#[derive(Serialize, Deserialize, Clone, Debug, Validate, ToSchema)]
pub struct RegisterPayload {
    #[validate(custom(function = "validate_username"))]
    pub username: String,
    #[validate(email(message = "Enter a valid email address."))]
    #[serde(default)]
    pub email: Option<String>,
    #[validate(length(min = 8, message = "Password must be at least 8 characters."))]
    pub password: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Validate, ToSchema)]
pub struct Credentials {
    #[validate(length(min = 1, message = "This field may not be blank."))]
    pub username: String,
    #[validate(length(min = 1, message = "This field may not be blank."))]
    pub password: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, ToSchema)]
pub struct LoginResponse {
    pub token: String,
}

/// Public view of an account. The password hash never leaves the backend.
#[cfg_attr(not(target_arch = "wasm32"), derive(FromRow))]
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, ToSchema)]
pub struct UserDto {
    pub id: i64,
    pub username: String,
    pub email: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn book_payload_collects_every_field_error() {
        let payload = BookPayload {
            title: String::new(),
            publication_year: utils::current_year() + 1,
            author: 1,
        };

        let errors = payload.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("title"));
        assert!(fields.contains_key("publication_year"));
    }

    #[test]
    fn book_payload_accepts_this_year() {
        let payload = BookPayload {
            title: "Things Fall Apart".to_string(),
            publication_year: utils::current_year(),
            author: 1,
        };
        assert!(payload.validate().is_ok());
    }

    #[test]
    fn payloads_are_trimmed_before_validation() {
        let book = BookPayload {
            title: "  Dune  ".to_string(),
            publication_year: 1965,
            author: 1,
        }
        .trimmed();
        assert_eq!(book.title, "Dune");

        let blank = AuthorPayload {
            name: "   ".to_string(),
        }
        .trimmed();
        assert_eq!(blank.name, "");
        assert!(blank.validate().unwrap_err().field_errors().contains_key("name"));

        let author = AuthorPayload {
            name: " Frank Herbert\t".to_string(),
        }
        .trimmed();
        assert_eq!(author.name, "Frank Herbert");
        assert!(author.validate().is_ok());
    }

    #[test]
    fn author_name_of_spaces_is_blank_even_untrimmed() {
        let payload = AuthorPayload {
            name: "   ".to_string(),
        };
        assert!(payload.validate().is_err());
    }

    #[test]
    fn register_payload_rejects_short_password_and_bad_email() {
        let payload = RegisterPayload {
            username: "okonkwo".to_string(),
            email: Some("not-an-email".to_string()),
            password: "short".to_string(),
        };

        let errors = payload.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("password"));
        assert!(!fields.contains_key("username"));
    }

    #[test]
    fn register_payload_email_is_optional() {
        let payload: RegisterPayload =
            serde_json::from_str(r#"{"username": "okonkwo", "password": "password123"}"#).unwrap();
        assert_eq!(payload.email, None);
        assert!(payload.validate().is_ok());
    }

    #[test]
    fn book_dto_exposes_author_id_as_author() {
        let book = BookDto {
            id: 1,
            title: "1984".to_string(),
            publication_year: 1949,
            author: 2,
        };
        let value = serde_json::to_value(&book).unwrap();
        assert_eq!(value["author"], 2);
        assert!(value.get("author_id").is_none());
    }
}
