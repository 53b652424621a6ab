use axum::{extract::State, http::StatusCode, Json};
use common::{BookDto, BookPayload};
use sqlx::QueryBuilder;
use std::borrow::Cow;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::db::{Db, DbPool};
use crate::error::AppError;
use crate::extractors::{AppJson, AppPath, AppQuery, AuthUser};
use crate::filters::{BookFilter, BookQuery};
use crate::web_server::AppState;

const BOOK_COLUMNS: &str = "b.id, b.title, b.publication_year, b.author_id AS author";

pub(crate) async fn fetch_book(db_pool: &DbPool, id: i64) -> Result<Option<BookDto>, AppError> {
    let book = sqlx::query_as::<_, BookDto>(&format!(
        "SELECT {BOOK_COLUMNS} FROM books b WHERE b.id = $1"
    ))
    .bind(id)
    .fetch_optional(db_pool)
    .await?;
    Ok(book)
}

async fn author_exists(db_pool: &DbPool, author_id: i64) -> Result<bool, AppError> {
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM authors WHERE id = $1")
        .bind(author_id)
        .fetch_optional(db_pool)
        .await?;
    Ok(found.is_some())
}

fn author_error(code: &'static str, message: String) -> AppError {
    let mut errors = ValidationErrors::new();
    errors.add("author", ValidationError::new(code).with_message(Cow::Owned(message)));
    errors.into()
}

/// A book must point at an existing author; a dangling id is a field error.
async fn ensure_author_exists(db_pool: &DbPool, author_id: i64) -> Result<(), AppError> {
    if !author_exists(db_pool, author_id).await? {
        return Err(author_error(
            "does_not_exist",
            format!("Invalid pk \"{author_id}\" - object does not exist."),
        ));
    }
    Ok(())
}

// --- API Handlers ---

/// ## List books
/// Filter by exact title, year or author, search title and author name, and order the result.
#[utoipa::path(
    get,
    path = "/api/books/",
    tag = "books",
    params(BookQuery),
    responses(
        (status = 200, description = "Matching books", body = Vec<BookDto>),
        (status = 400, description = "Bad numeric filter or unknown author"),
    )
)]
pub async fn list_books(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<BookQuery>,
) -> Result<Json<Vec<BookDto>>, AppError> {
    let filter = BookFilter::try_from(query)?;
    tracing::info!("Listing books with {:?}", filter);

    if let Some(author) = filter.author {
        if !author_exists(&state.db_pool, author).await? {
            return Err(author_error(
                "invalid_choice",
                "Select a valid choice. That choice is not one of the available choices."
                    .to_owned(),
            ));
        }
    }

    let mut qb = QueryBuilder::<Db>::new(format!(
        "SELECT {BOOK_COLUMNS} FROM books b JOIN authors a ON a.id = b.author_id"
    ));
    filter.push_clauses(&mut qb);

    let books = qb
        .build_query_as::<BookDto>()
        .fetch_all(&state.db_pool)
        .await?;

    Ok(Json(books))
}

#[utoipa::path(
    get,
    path = "/api/books/{id}/",
    tag = "books",
    params(("id" = i64, Path, description = "Book id")),
    responses(
        (status = 200, description = "The book", body = BookDto),
        (status = 404, description = "No book with this id"),
    )
)]
pub async fn get_book(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> Result<Json<BookDto>, AppError> {
    tracing::info!("Fetching single book with id: {}", id);

    fetch_book(&state.db_pool, id)
        .await?
        .map(Json)
        .ok_or(AppError::NotFound)
}

#[utoipa::path(
    post,
    path = "/api/books/create/",
    tag = "books",
    request_body = BookPayload,
    security(("token_auth" = [])),
    responses(
        (status = 201, description = "Book created", body = BookDto),
        (status = 400, description = "Invalid data"),
        (status = 401, description = "Invalid token"),
        (status = 403, description = "Authentication credentials were not provided"),
    )
)]
pub async fn create_book(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(payload): AppJson<BookPayload>,
) -> Result<(StatusCode, Json<BookDto>), AppError> {
    let payload = payload.trimmed();
    payload.validate()?;
    ensure_author_exists(&state.db_pool, payload.author).await?;

    tracing::info!("User {} creating book: {:?}", user.username, payload);
    let book = sqlx::query_as::<_, BookDto>(
        r#"
        INSERT INTO books (title, publication_year, author_id)
        VALUES ($1, $2, $3)
        RETURNING id, title, publication_year, author_id AS author
        "#,
    )
    .bind(&payload.title)
    .bind(payload.publication_year)
    .bind(payload.author)
    .fetch_one(&state.db_pool)
    .await?;

    Ok((StatusCode::CREATED, Json(book)))
}

/// ## Replace a book
/// All fields are required.
#[utoipa::path(
    put,
    path = "/api/books/update/{id}/",
    tag = "books",
    params(("id" = i64, Path, description = "Book id")),
    request_body = BookPayload,
    security(("token_auth" = [])),
    responses(
        (status = 200, description = "Book updated", body = BookDto),
        (status = 400, description = "Invalid data"),
        (status = 404, description = "No book with this id"),
    )
)]
pub async fn update_book(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(id): AppPath<i64>,
    AppJson(payload): AppJson<BookPayload>,
) -> Result<Json<BookDto>, AppError> {
    // An unknown id wins over a bad body.
    if fetch_book(&state.db_pool, id).await?.is_none() {
        return Err(AppError::NotFound);
    }
    let payload = payload.trimmed();
    payload.validate()?;
    ensure_author_exists(&state.db_pool, payload.author).await?;

    tracing::info!("User {} updating book with id: {}", user.username, id);
    let book = sqlx::query_as::<_, BookDto>(
        r#"
        UPDATE books
        SET title = $1, publication_year = $2, author_id = $3
        WHERE id = $4
        RETURNING id, title, publication_year, author_id AS author
        "#,
    )
    .bind(&payload.title)
    .bind(payload.publication_year)
    .bind(payload.author)
    .bind(id)
    .fetch_optional(&state.db_pool)
    .await?
    .ok_or(AppError::NotFound)?;

    Ok(Json(book))
}

#[utoipa::path(
    delete,
    path = "/api/books/delete/{id}/",
    tag = "books",
    params(("id" = i64, Path, description = "Book id")),
    security(("token_auth" = [])),
    responses(
        (status = 204, description = "Book deleted"),
        (status = 404, description = "No book with this id"),
    )
)]
pub async fn delete_book(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(id): AppPath<i64>,
) -> Result<StatusCode, AppError> {
    tracing::info!("User {} deleting book with id: {}", user.username, id);

    let result = sqlx::query("DELETE FROM books WHERE id = $1")
        .bind(id)
        .execute(&state.db_pool)
        .await?;

    if result.rows_affected() > 0 {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound)
    }
}
