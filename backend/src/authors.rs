use axum::{extract::State, http::StatusCode, Json};
use common::{AuthorDto, AuthorPayload, BookDto};
use std::collections::HashMap;
use validator::Validate;

use crate::db::DbPool;
use crate::error::AppError;
use crate::extractors::{AppJson, AppPath, AuthUser};
use crate::web_server::AppState;

#[derive(sqlx::FromRow, Debug)]
struct AuthorRow {
    id: i64,
    name: String,
}

impl AuthorRow {
    fn with_books(self, books: Vec<BookDto>) -> AuthorDto {
        AuthorDto {
            id: self.id,
            name: self.name,
            books,
        }
    }
}

async fn books_of(db_pool: &DbPool, author_id: i64) -> Result<Vec<BookDto>, AppError> {
    let books = sqlx::query_as::<_, BookDto>(
        "SELECT id, title, publication_year, author_id AS author
         FROM books WHERE author_id = $1 ORDER BY title, id",
    )
    .bind(author_id)
    .fetch_all(db_pool)
    .await?;
    Ok(books)
}

async fn fetch_author(db_pool: &DbPool, id: i64) -> Result<Option<AuthorDto>, AppError> {
    let row = sqlx::query_as::<_, AuthorRow>("SELECT id, name FROM authors WHERE id = $1")
        .bind(id)
        .fetch_optional(db_pool)
        .await?;

    match row {
        Some(row) => {
            let books = books_of(db_pool, row.id).await?;
            Ok(Some(row.with_books(books)))
        }
        None => Ok(None),
    }
}

// --- API Handlers ---

/// ## List authors
/// Every author with their books nested.
#[utoipa::path(
    get,
    path = "/api/authors/",
    tag = "authors",
    responses(
        (status = 200, description = "All authors", body = Vec<AuthorDto>),
    )
)]
pub async fn list_authors(
    State(state): State<AppState>,
) -> Result<Json<Vec<AuthorDto>>, AppError> {
    tracing::info!("Fetching all authors from database");

    let rows = sqlx::query_as::<_, AuthorRow>("SELECT id, name FROM authors ORDER BY name, id")
        .fetch_all(&state.db_pool)
        .await?;

    let books = sqlx::query_as::<_, BookDto>(
        "SELECT id, title, publication_year, author_id AS author FROM books ORDER BY title, id",
    )
    .fetch_all(&state.db_pool)
    .await?;

    let mut by_author: HashMap<i64, Vec<BookDto>> = HashMap::new();
    for book in books {
        by_author.entry(book.author).or_default().push(book);
    }

    let authors = rows
        .into_iter()
        .map(|row| {
            let books = by_author.remove(&row.id).unwrap_or_default();
            row.with_books(books)
        })
        .collect();

    Ok(Json(authors))
}

#[utoipa::path(
    get,
    path = "/api/authors/{id}/",
    tag = "authors",
    params(("id" = i64, Path, description = "Author id")),
    responses(
        (status = 200, description = "The author and their books", body = AuthorDto),
        (status = 404, description = "No author with this id"),
    )
)]
pub async fn get_author(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> Result<Json<AuthorDto>, AppError> {
    tracing::info!("Fetching single author with id: {}", id);

    fetch_author(&state.db_pool, id)
        .await?
        .map(Json)
        .ok_or(AppError::NotFound)
}

#[utoipa::path(
    post,
    path = "/api/authors/create/",
    tag = "authors",
    request_body = AuthorPayload,
    security(("token_auth" = [])),
    responses(
        (status = 201, description = "Author created", body = AuthorDto),
        (status = 400, description = "Invalid data"),
    )
)]
pub async fn create_author(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(payload): AppJson<AuthorPayload>,
) -> Result<(StatusCode, Json<AuthorDto>), AppError> {
    let payload = payload.trimmed();
    payload.validate()?;

    tracing::info!("User {} creating author: {}", user.username, payload.name);
    let row = sqlx::query_as::<_, AuthorRow>(
        "INSERT INTO authors (name) VALUES ($1) RETURNING id, name",
    )
    .bind(&payload.name)
    .fetch_one(&state.db_pool)
    .await?;

    Ok((StatusCode::CREATED, Json(row.with_books(Vec::new()))))
}

#[utoipa::path(
    put,
    path = "/api/authors/update/{id}/",
    tag = "authors",
    params(("id" = i64, Path, description = "Author id")),
    request_body = AuthorPayload,
    security(("token_auth" = [])),
    responses(
        (status = 200, description = "Author updated", body = AuthorDto),
        (status = 400, description = "Invalid data"),
        (status = 404, description = "No author with this id"),
    )
)]
pub async fn update_author(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(id): AppPath<i64>,
    AppJson(payload): AppJson<AuthorPayload>,
) -> Result<Json<AuthorDto>, AppError> {
    if fetch_author(&state.db_pool, id).await?.is_none() {
        return Err(AppError::NotFound);
    }
    let payload = payload.trimmed();
    payload.validate()?;

    tracing::info!("User {} updating author with id: {}", user.username, id);
    let result = sqlx::query("UPDATE authors SET name = $1 WHERE id = $2")
        .bind(&payload.name)
        .bind(id)
        .execute(&state.db_pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }

    fetch_author(&state.db_pool, id)
        .await?
        .map(Json)
        .ok_or(AppError::NotFound)
}

/// ## Delete an author
/// The author's books are deleted with them.
#[utoipa::path(
    delete,
    path = "/api/authors/delete/{id}/",
    tag = "authors",
    params(("id" = i64, Path, description = "Author id")),
    security(("token_auth" = [])),
    responses(
        (status = 204, description = "Author and their books deleted"),
        (status = 404, description = "No author with this id"),
    )
)]
pub async fn delete_author(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(id): AppPath<i64>,
) -> Result<StatusCode, AppError> {
    tracing::info!("User {} deleting author with id: {}", user.username, id);

    // books.author_id cascades
    let result = sqlx::query("DELETE FROM authors WHERE id = $1")
        .bind(id)
        .execute(&state.db_pool)
        .await?;

    if result.rows_affected() > 0 {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound)
    }
}
