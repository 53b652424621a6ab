use axum::Json;
use common::{
    AuthorDto, AuthorPayload, BookDto, BookPayload, Credentials, LoginResponse, RegisterPayload,
    UserDto,
};
use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
    Modify, OpenApi,
};

use crate::{auth, authors, books};

#[derive(OpenApi)]
#[openapi(
    paths(
        books::list_books,
        books::get_book,
        books::create_book,
        books::update_book,
        books::delete_book,
        authors::list_authors,
        authors::get_author,
        authors::create_author,
        authors::update_author,
        authors::delete_author,
        auth::register,
        auth::login,
        auth::profile,
    ),
    components(schemas(
        BookDto,
        BookPayload,
        AuthorDto,
        AuthorPayload,
        RegisterPayload,
        Credentials,
        LoginResponse,
        UserDto,
    )),
    modifiers(&TokenAuthAddon),
    tags(
        (name = "books", description = "Book catalog"),
        (name = "authors", description = "Authors and their books"),
        (name = "accounts", description = "Registration, login and profile"),
    )
)]
pub struct ApiDoc;

/// Registers the `token_auth` scheme the protected paths refer to.
struct TokenAuthAddon;

impl Modify for TokenAuthAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "token_auth",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("Authorization"))),
            );
        }
    }
}

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
